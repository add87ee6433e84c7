use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SUMMARY_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Processing,
    Processed,
    Failed,
}

/// Processing record for one inserted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocRecord {
    pub status: DocStatus,
    pub content_summary: String,
    pub content_length: usize,
    pub chunks_count: Option<usize>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent map of document id to processing record.
pub struct DocStatusStore {
    docs: RwLock<HashMap<String, DocRecord>>,
    persist_path: PathBuf,
}

impl DocStatusStore {
    pub fn open_or_create(working_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(working_dir)?;
        let persist_path = working_dir.join("kv_store_doc_status.json");

        let docs = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .context("Failed to read document status store")?;
            serde_json::from_str(&data).context("Failed to parse document status store")?
        } else {
            HashMap::new()
        };

        Ok(Self {
            docs: RwLock::new(docs),
            persist_path,
        })
    }

    pub fn get(&self, doc_id: &str) -> Option<DocRecord> {
        self.docs.read().get(doc_id).cloned()
    }

    pub fn is_processed(&self, doc_id: &str) -> bool {
        self.get(doc_id)
            .is_some_and(|d| d.status == DocStatus::Processed)
    }

    /// Record that `doc_id` has started processing.
    pub fn start(&self, doc_id: &str, content: &str) -> Result<()> {
        let now = Utc::now();
        let record = DocRecord {
            status: DocStatus::Processing,
            content_summary: content.chars().take(SUMMARY_CHARS).collect(),
            content_length: content.len(),
            chunks_count: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let mut docs = self.docs.write();
        docs.insert(doc_id.to_string(), record);
        self.persist(&docs)
    }

    pub fn finish(&self, doc_id: &str, chunks_count: usize) -> Result<()> {
        self.update(doc_id, |record| {
            record.status = DocStatus::Processed;
            record.chunks_count = Some(chunks_count);
            record.error = None;
        })
    }

    pub fn fail(&self, doc_id: &str, error: &str) -> Result<()> {
        self.update(doc_id, |record| {
            record.status = DocStatus::Failed;
            record.error = Some(error.to_string());
        })
    }

    pub fn count(&self, status: DocStatus) -> usize {
        self.docs.read().values().filter(|d| d.status == status).count()
    }

    fn update(&self, doc_id: &str, apply: impl FnOnce(&mut DocRecord)) -> Result<()> {
        let mut docs = self.docs.write();
        let record = docs
            .get_mut(doc_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown document {doc_id}"))?;
        apply(record);
        record.updated_at = Utc::now();
        self.persist(&docs)
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, docs: &HashMap<String, DocRecord>) -> Result<()> {
        let data = serde_json::to_string_pretty(docs)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data).context("Failed to write document status store")?;
        std::fs::rename(&tmp_path, &self.persist_path)
            .context("Failed to replace document status store")?;
        Ok(())
    }
}
