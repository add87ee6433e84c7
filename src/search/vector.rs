use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{ChunkHit, ChunkRecord};

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    #[serde(flatten)]
    chunk: ChunkRecord,
    embedding: Vec<f32>,
}

/// In-memory chunk vector store with disk persistence and cosine similarity search.
pub struct VectorStore {
    entries: RwLock<Vec<VectorEntry>>,
    persist_path: PathBuf,
}

impl VectorStore {
    pub fn open_or_create(working_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(working_dir)?;
        let persist_path = working_dir.join("vdb_chunks.json");

        let entries = if persist_path.exists() {
            let data =
                std::fs::read_to_string(&persist_path).context("Failed to read vector store")?;
            serde_json::from_str(&data).context("Failed to parse vector store")?
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    /// Add chunks with their embeddings. `embeddings` must be parallel with
    /// `chunks`; chunk ids already present are skipped. Returns how many were added.
    pub fn upsert(&self, chunks: &[ChunkRecord], embeddings: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let mut entries = self.entries.write();
        let mut known: HashSet<String> = entries.iter().map(|e| e.chunk.chunk_id.clone()).collect();
        let mut added = 0;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            if !known.insert(chunk.chunk_id.clone()) {
                continue;
            }
            entries.push(VectorEntry {
                chunk: chunk.clone(),
                embedding,
            });
            added += 1;
        }

        persist(&self.persist_path, &*entries)?;
        Ok(added)
    }

    /// Search by cosine similarity, keeping hits scoring above `threshold`.
    pub fn search(&self, query_embedding: &[f32], limit: usize, threshold: f32) -> Vec<ChunkHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score > threshold)
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| ChunkHit::from_record(&e.chunk, score))
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

/// Atomic write via temp file + rename.
fn persist(path: &Path, entries: &[VectorEntry]) -> Result<()> {
    let data = serde_json::to_string(entries)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data).context("Failed to write vector store")?;
    std::fs::rename(&tmp_path, path).context("Failed to replace vector store")?;
    Ok(())
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
