use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

use super::doc_status::{DocStatus, DocStatusStore};
use super::prompt::{
    build_context_block, build_system_prompt, sanitize_for_prompt, select_within_budget,
    CONTEXT_TOKEN_BUDGET, NO_CONTEXT_RESPONSE,
};
use super::{QueryMode, RetrievalIndex};
use crate::config::RagConfig;
use crate::search::bm25::Bm25Index;
use crate::search::hybrid::rrf_fusion;
use crate::search::vector::VectorStore;
use crate::search::{ChunkHit, ChunkRecord};

/// Vector hits at or below this cosine similarity are dropped.
const COSINE_THRESHOLD: f32 = 0.2;

struct Storages {
    docs: Arc<DocStatusStore>,
    vectors: Arc<VectorStore>,
    keywords: Arc<Bm25Index>,
}

/// Progress of the insertion pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub busy: bool,
    pub docs_processed: usize,
    pub latest_message: String,
    pub updated_at: DateTime<Utc>,
}

/// Retrieval index backed by on-disk chunk stores in a working directory,
/// Ollama embeddings and an Ollama chat model.
///
/// Usable only after [`RagIndex::initialize_storages`] and
/// [`RagIndex::initialize_pipeline_status`] have both run.
pub struct RagIndex {
    config: RagConfig,
    working_dir: PathBuf,
    client: reqwest::Client,
    storages: OnceCell<Storages>,
    pipeline: RwLock<Option<PipelineStatus>>,
    insert_lock: Mutex<()>,
    llm_slots: Semaphore,
}

impl RagIndex {
    pub fn new(working_dir: impl Into<PathBuf>, config: RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let llm_slots = Semaphore::new(config.llm.max_async.max(1));

        Ok(Self {
            config,
            working_dir: working_dir.into(),
            client,
            storages: OnceCell::new(),
            pipeline: RwLock::new(None),
            insert_lock: Mutex::new(()),
            llm_slots,
        })
    }

    /// Open (or create) the document status, vector and keyword stores.
    pub async fn initialize_storages(&self) -> Result<()> {
        if self.storages.get().is_some() {
            anyhow::bail!("Storages are already initialized");
        }

        let dir = self.working_dir.clone();
        let storages = tokio::task::spawn_blocking(move || -> Result<Storages> {
            Ok(Storages {
                docs: Arc::new(DocStatusStore::open_or_create(&dir)?),
                vectors: Arc::new(VectorStore::open_or_create(&dir)?),
                keywords: Arc::new(Bm25Index::open_or_create(&dir.join("keyword_index"))?),
            })
        })
        .await?
        .with_context(|| format!("Failed to open storages in {}", self.working_dir.display()))?;

        tracing::info!(
            "Storages ready in {}: {} documents, {} chunk vectors",
            self.working_dir.display(),
            storages.docs.count(DocStatus::Processed),
            storages.vectors.entry_count()
        );

        self.storages
            .set(storages)
            .map_err(|_| anyhow::anyhow!("Storages are already initialized"))
    }

    /// Set up the pipeline status. Requires storages; repeated calls keep the
    /// existing status.
    pub async fn initialize_pipeline_status(&self) -> Result<()> {
        let storages = self.storages()?;
        let mut pipeline = self.pipeline.write();
        if pipeline.is_none() {
            *pipeline = Some(PipelineStatus {
                busy: false,
                docs_processed: storages.docs.count(DocStatus::Processed),
                latest_message: "Pipeline ready".to_string(),
                updated_at: Utc::now(),
            });
        }
        Ok(())
    }

    pub fn pipeline_status(&self) -> Option<PipelineStatus> {
        self.pipeline.read().clone()
    }

    fn storages(&self) -> Result<&Storages> {
        self.storages
            .get()
            .context("Storages are not initialized; call initialize_storages first")
    }

    fn ready_storages(&self) -> Result<&Storages> {
        let storages = self.storages()?;
        if self.pipeline.read().is_none() {
            anyhow::bail!(
                "Pipeline status is not initialized; call initialize_pipeline_status first"
            );
        }
        Ok(storages)
    }

    fn update_pipeline(&self, apply: impl FnOnce(&mut PipelineStatus)) {
        if let Some(status) = self.pipeline.write().as_mut() {
            apply(status);
            status.updated_at = Utc::now();
        }
    }

    /// Chunk, embed and store one document. Returns the chunk count.
    async fn index_document(&self, storages: &Storages, doc_id: &str, text: &str) -> Result<usize> {
        let text_owned = text.to_string();
        let chunk_size = self.config.chunk_token_size;
        let overlap = self.config.chunk_overlap_tokens;
        let embed_limit = self.config.embedding.max_token_size;
        let (chunks, texts) = tokio::task::spawn_blocking(move || -> Result<_> {
            let chunks = crate::chunking::chunk_by_tokens(&text_owned, chunk_size, overlap)?;
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            // Chunks already fit the embedding model unless chunks are larger
            // than its input limit
            let texts = if chunk_size > embed_limit {
                crate::llm::embeddings::fit_to_token_limit(texts, embed_limit)?
            } else {
                texts
            };
            Ok((chunks, texts))
        })
        .await??;

        if chunks.is_empty() {
            anyhow::bail!("Document {doc_id} produced no chunks");
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .map(|c| ChunkRecord {
                chunk_id: compute_id("chunk-", &c.content),
                doc_id: doc_id.to_string(),
                chunk_order_index: c.chunk_order_index,
                tokens: c.tokens,
                content: c.content,
            })
            .collect();
        tracing::info!("Document {doc_id}: {} chunks", records.len());

        let embeddings =
            crate::llm::embeddings::embed_batch(&self.client, &self.config.embedding, &texts)
                .await
                .with_context(|| format!("Embedding failed for {doc_id}"))?;

        let vectors = storages.vectors.clone();
        let keywords = storages.keywords.clone();
        tokio::task::spawn_blocking(move || -> Result<usize> {
            let added = vectors.upsert(&records, embeddings)?;
            keywords.index_chunks(&records)?;
            tracing::debug!("{added} new chunk vectors stored");
            Ok(records.len())
        })
        .await?
    }

    async fn vector_hits(&self, storages: &Storages, query: &str) -> Result<Vec<ChunkHit>> {
        let embedding =
            crate::llm::embeddings::embed_single(&self.client, &self.config.embedding, query)
                .await
                .context("Failed to embed query")?;
        Ok(storages
            .vectors
            .search(&embedding, self.config.top_k, COSINE_THRESHOLD))
    }

    async fn keyword_hits(&self, storages: &Storages, query: &str) -> Result<Vec<ChunkHit>> {
        let keywords = storages.keywords.clone();
        let query = query.to_string();
        let top_k = self.config.top_k;
        tokio::task::spawn_blocking(move || keywords.search(&query, top_k)).await?
    }

    async fn retrieve(&self, storages: &Storages, query: &str, mode: QueryMode) -> Result<Vec<ChunkHit>> {
        match mode {
            QueryMode::Naive => self.vector_hits(storages, query).await,
            QueryMode::Local => self.keyword_hits(storages, query).await,
            QueryMode::Hybrid | QueryMode::Mix => {
                let (keyword, vector) = tokio::try_join!(
                    self.keyword_hits(storages, query),
                    self.vector_hits(storages, query)
                )?;
                Ok(rrf_fusion(&keyword, &vector, self.config.top_k))
            }
            QueryMode::Bypass => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl RetrievalIndex for RagIndex {
    async fn insert(&self, text: &str) -> Result<()> {
        let storages = self.ready_storages()?;
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("Document is empty");
        }

        let doc_id = compute_id("doc-", text);
        let _guard = self.insert_lock.lock().await;

        if storages.docs.is_processed(&doc_id) {
            tracing::info!("Document {doc_id} is already indexed, skipping");
            return Ok(());
        }

        let docs = storages.docs.clone();
        let (id, content) = (doc_id.clone(), text.to_string());
        off_runtime(move || docs.start(&id, &content)).await?;
        self.update_pipeline(|p| {
            p.busy = true;
            p.latest_message = format!("Indexing {doc_id}");
        });

        let result = self.index_document(storages, &doc_id, text).await;

        match &result {
            Ok(chunks) => {
                self.update_pipeline(|p| {
                    p.busy = false;
                    p.docs_processed += 1;
                    p.latest_message = format!("Indexed {doc_id} ({chunks} chunks)");
                });
                let (docs, id, count) = (storages.docs.clone(), doc_id.clone(), *chunks);
                off_runtime(move || docs.finish(&id, count)).await?;
                tracing::info!("Document {doc_id} indexed ({chunks} chunks)");
            }
            Err(e) => {
                self.update_pipeline(|p| {
                    p.busy = false;
                    p.latest_message = format!("Failed to index {doc_id}");
                });
                let (docs, id, error) = (storages.docs.clone(), doc_id.clone(), format!("{e:#}"));
                if let Err(mark_err) = off_runtime(move || docs.fail(&id, &error)).await {
                    tracing::warn!("Could not record failure for {doc_id}: {mark_err:#}");
                }
            }
        }

        result.map(|_| ())
    }

    async fn query(&self, query: &str, mode: &str) -> Result<String> {
        let mode: QueryMode = mode.parse()?;
        let storages = self.ready_storages()?;
        let query = query.trim();
        if query.is_empty() {
            anyhow::bail!("Query must not be empty");
        }

        let system_prompt = if mode == QueryMode::Bypass {
            None
        } else {
            let hits = self.retrieve(storages, query, mode).await?;
            if hits.is_empty() {
                tracing::info!("No context found for {mode:?} query");
                return Ok(NO_CONTEXT_RESPONSE.to_string());
            }
            let selected = select_within_budget(&hits, CONTEXT_TOKEN_BUDGET);
            tracing::info!(
                "Answering {mode:?} query with {} of {} retrieved chunks",
                selected.len(),
                hits.len()
            );
            Some(build_system_prompt(&build_context_block(&selected)))
        };

        let _permit = self
            .llm_slots
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("LLM semaphore closed"))?;

        let answer = crate::llm::completion::complete(
            &self.client,
            &self.config.llm,
            system_prompt.as_deref(),
            &sanitize_for_prompt(query),
        )
        .await?;

        Ok(answer.trim().to_string())
    }
}

/// Run a synchronous store operation on the blocking pool.
async fn off_runtime<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

/// Content-addressed id: `prefix` followed by the SHA-256 of `content`.
pub fn compute_id(prefix: &str, content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{prefix}{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> RagConfig {
        let mut config = RagConfig::default();
        config.llm.base_url = "http://127.0.0.1:9".to_string();
        config.embedding.base_url = "http://127.0.0.1:9".to_string();
        config
    }

    #[test]
    fn test_compute_id_is_stable_and_prefixed() {
        let a = compute_id("doc-", "hello");
        let b = compute_id("doc-", "hello");
        assert_eq!(a, b);
        assert!(a.starts_with("doc-"));
        assert_eq!(a.len(), 4 + 64);
        assert_ne!(a, compute_id("doc-", "hello!"));
    }

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let index = RagIndex::new(dir.path(), offline_config()).unwrap();

        let err = index.insert("text").await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
        let err = index.query("q", "naive").await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));

        // Pipeline status needs storages first
        assert!(index.initialize_pipeline_status().await.is_err());

        index.initialize_storages().await.unwrap();
        let err = index.insert("text").await.unwrap_err();
        assert!(err.to_string().contains("Pipeline status is not initialized"));
    }

    #[tokio::test]
    async fn test_storages_initialize_once() {
        let dir = tempfile::tempdir().unwrap();
        let index = RagIndex::new(dir.path(), offline_config()).unwrap();
        index.initialize_storages().await.unwrap();
        assert!(index.initialize_storages().await.is_err());
        index.initialize_pipeline_status().await.unwrap();
        index.initialize_pipeline_status().await.unwrap();

        let status = index.pipeline_status().unwrap();
        assert!(!status.busy);
        assert_eq!(status.docs_processed, 0);
        assert!(dir.path().join("keyword_index").join("meta.json").exists());
    }

    #[tokio::test]
    async fn test_unsupported_mode_rejected_before_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        let index = RagIndex::new(dir.path(), offline_config()).unwrap();
        index.initialize_storages().await.unwrap();
        index.initialize_pipeline_status().await.unwrap();

        let err = index.query("q", "global").await.unwrap_err();
        assert!(err.to_string().contains("Unsupported query mode"));
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = RagIndex::new(dir.path(), offline_config()).unwrap();
        index.initialize_storages().await.unwrap();
        index.initialize_pipeline_status().await.unwrap();

        assert!(index.insert("   \n  ").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_embedding_backend_marks_doc_failed() {
        let dir = tempfile::tempdir().unwrap();
        let index = RagIndex::new(dir.path(), offline_config()).unwrap();
        index.initialize_storages().await.unwrap();
        index.initialize_pipeline_status().await.unwrap();

        let text = "fn main() { println!(\"hello\"); }";
        assert!(index.insert(text).await.is_err());

        let record = index.storages().unwrap().docs.get(&compute_id("doc-", text)).unwrap();
        assert_eq!(record.status, DocStatus::Failed);
        assert!(record.error.is_some());
        let status = index.pipeline_status().unwrap();
        assert!(!status.busy);
        assert_eq!(status.docs_processed, 0);
    }

    #[tokio::test]
    async fn test_local_query_without_matches_returns_no_context() {
        let dir = tempfile::tempdir().unwrap();
        let index = RagIndex::new(dir.path(), offline_config()).unwrap();
        index.initialize_storages().await.unwrap();
        index.initialize_pipeline_status().await.unwrap();

        // Keyword retrieval needs no model; with an empty index nothing matches
        let answer = index.query("anything at all", "local").await.unwrap();
        assert_eq!(answer, NO_CONTEXT_RESPONSE);
    }
}
