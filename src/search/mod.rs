pub mod bm25;
pub mod hybrid;
pub mod vector;

use serde::{Deserialize, Serialize};

/// A chunk as written to the stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub doc_id: String,
    pub chunk_order_index: usize,
    pub tokens: usize,
    pub content: String,
}

/// A retrieved chunk with the score of whichever retriever found it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub doc_id: String,
    pub chunk_order_index: usize,
    pub tokens: usize,
    pub content: String,
    pub score: f32,
}

impl ChunkHit {
    pub fn from_record(record: &ChunkRecord, score: f32) -> Self {
        Self {
            chunk_id: record.chunk_id.clone(),
            doc_id: record.doc_id.clone(),
            chunk_order_index: record.chunk_order_index,
            tokens: record.tokens,
            content: record.content.clone(),
            score,
        }
    }
}
