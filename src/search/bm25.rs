use anyhow::{Context, Result};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexWriter, ReloadPolicy};

use super::{ChunkHit, ChunkRecord};

/// BM25 keyword index over chunks, built on tantivy.
pub struct Bm25Index {
    index: Index,
    f_chunk_id: Field,
    f_doc_id: Field,
    f_chunk_order: Field,
    f_tokens: Field,
    f_content: Field,
}

impl Bm25Index {
    /// Create or open a keyword index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;

        let mut schema_builder = Schema::builder();
        let f_chunk_id = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let f_doc_id = schema_builder.add_text_field("doc_id", STRING | STORED);
        let f_chunk_order =
            schema_builder.add_u64_field("chunk_order_index", NumericOptions::default() | STORED);
        let f_tokens = schema_builder.add_u64_field("tokens", NumericOptions::default() | STORED);
        let f_content = schema_builder.add_text_field("content", TEXT | STORED);
        let schema = schema_builder.build();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?
        } else {
            Index::create_in_dir(index_dir, schema).context("Failed to create tantivy index")?
        };

        Ok(Self {
            index,
            f_chunk_id,
            f_doc_id,
            f_chunk_order,
            f_tokens,
            f_content,
        })
    }

    /// Index a batch of chunks.
    pub fn index_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
        let mut writer: IndexWriter = self
            .index
            .writer(50_000_000)
            .context("Failed to create index writer")?;

        for chunk in chunks {
            // Re-inserting a chunk replaces it
            writer.delete_term(tantivy::Term::from_field_text(self.f_chunk_id, &chunk.chunk_id));
            writer.add_document(doc!(
                self.f_chunk_id => chunk.chunk_id.clone(),
                self.f_doc_id => chunk.doc_id.clone(),
                self.f_chunk_order => chunk.chunk_order_index as u64,
                self.f_tokens => chunk.tokens as u64,
                self.f_content => chunk.content.clone(),
            ))?;
        }

        writer.commit().context("Failed to commit index")?;
        Ok(())
    }

    /// Search the index and return scored hits.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<ChunkHit>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create reader")?;

        let searcher = reader.searcher();

        // Natural-language questions are full of query-syntax characters
        let query_parser = QueryParser::for_index(&self.index, vec![self.f_content]);
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!("Lenient keyword query parse dropped {} fragment(s)", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit.max(1)))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let text = |field: Field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let number = |field: Field| {
                doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0) as usize
            };

            hits.push(ChunkHit {
                chunk_id: text(self.f_chunk_id),
                doc_id: text(self.f_doc_id),
                chunk_order_index: number(self.f_chunk_order),
                tokens: number(self.f_tokens),
                content: text(self.f_content),
                score,
            });
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, order: usize, content: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id.to_string(),
            doc_id: "doc-1".to_string(),
            chunk_order_index: order,
            tokens: 10,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_index_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::open_or_create(dir.path()).unwrap();
        index
            .index_chunks(&[
                record("c1", 0, "pub struct Database { pool: PgPool }"),
                record("c2", 1, "async fn health_check() -> &'static str"),
            ])
            .unwrap();

        let hits = index.search("database pool", 10).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "c1");
        assert_eq!(hits[0].doc_id, "doc-1");
        assert_eq!(hits[0].tokens, 10);
    }

    #[test]
    fn test_question_syntax_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::open_or_create(dir.path()).unwrap();
        index
            .index_chunks(&[record("c1", 0, "This repo is a command line tool")])
            .unwrap();

        let hits = index.search("What does this repo do? (in: short)", 5).unwrap();
        assert!(hits.iter().any(|h| h.chunk_id == "c1"));
    }

    #[test]
    fn test_reindexing_replaces_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::open_or_create(dir.path()).unwrap();
        index.index_chunks(&[record("c1", 0, "alpha")]).unwrap();
        index.index_chunks(&[record("c1", 0, "alpha")]).unwrap();

        let hits = index.search("alpha", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_reopen_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = Bm25Index::open_or_create(dir.path()).unwrap();
            index.index_chunks(&[record("c1", 0, "persisted words")]).unwrap();
        }
        let reopened = Bm25Index::open_or_create(dir.path()).unwrap();
        assert_eq!(reopened.search("persisted", 10).unwrap().len(), 1);
    }
}
