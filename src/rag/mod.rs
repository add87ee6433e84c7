//! Retrieval index: the seam the service inserts documents into and asks
//! questions of, plus the readiness slot that publishes it once initialized.

pub mod doc_status;
pub mod index;
pub mod prompt;

use anyhow::Result;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub use index::RagIndex;

/// Document store that answers questions about what was inserted.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Chunk, embed and index `text`.
    async fn insert(&self, text: &str) -> Result<()>;

    /// Answer `query` using the retrieval strategy named by `mode`.
    async fn query(&self, query: &str, mode: &str) -> Result<String>;
}

/// Retrieval strategy selected per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Vector similarity over chunks
    Naive,
    /// BM25 keyword match over chunks
    Local,
    /// Rank fusion of keyword and vector results
    Hybrid,
    /// Same as `Hybrid`
    Mix,
    /// No retrieval; the query goes straight to the model
    Bypass,
}

impl FromStr for QueryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "naive" => Ok(QueryMode::Naive),
            "local" => Ok(QueryMode::Local),
            "hybrid" => Ok(QueryMode::Hybrid),
            "mix" => Ok(QueryMode::Mix),
            "bypass" => Ok(QueryMode::Bypass),
            other => anyhow::bail!(
                "Unsupported query mode '{other}' (expected one of: naive, local, hybrid, mix, bypass)"
            ),
        }
    }
}

/// Shared slot holding the retrieval index once it is initialized.
#[derive(Clone, Default)]
pub struct IndexHandle {
    slot: Arc<OnceCell<Arc<dyn RetrievalIndex>>>,
}

impl IndexHandle {
    /// An empty handle; every lookup fails until [`IndexHandle::publish`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that is ready immediately.
    pub fn ready(index: Arc<dyn RetrievalIndex>) -> Self {
        Self {
            slot: Arc::new(OnceCell::new_with(Some(index))),
        }
    }

    pub fn publish(&self, index: Arc<dyn RetrievalIndex>) -> Result<()> {
        self.slot
            .set(index)
            .map_err(|_| anyhow::anyhow!("Retrieval index is already initialized"))
    }

    pub fn get(&self) -> Result<Arc<dyn RetrievalIndex>> {
        self.slot
            .get()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Retrieval index is not ready"))
    }

    pub fn is_ready(&self) -> bool {
        self.slot.initialized()
    }
}
