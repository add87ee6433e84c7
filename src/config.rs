use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Where the retrieval index keeps its storage files and hand-off documents
    pub working_dir: PathBuf,
    /// How the flattened document is handed from the fetcher to the indexer
    pub handoff: HandoffMode,
    /// Accept existing local directories as repository sources
    pub allow_local_paths: bool,
    /// Clone timeout in seconds
    pub clone_timeout_secs: u64,
    /// Git personal access token for cloning private repos
    pub git_token: Option<String>,
    /// Retrieval index settings
    pub rag: RagConfig,
}

/// Location of the flattened document between fetch and insert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMode {
    /// One file per task under `downloads/`.
    PerTask,
    /// A single `downloaded.md` overwritten by every request.
    Shared,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    /// Chunk size in tokens
    pub chunk_token_size: usize,
    /// Tokens shared between consecutive chunks
    pub chunk_overlap_tokens: usize,
    /// Chunks retrieved per query
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama server
    pub base_url: String,
    /// Model name for answering queries
    pub model: String,
    /// Maximum concurrent completion requests
    pub max_async: usize,
    /// Context window passed as `num_ctx`
    pub num_ctx: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the Ollama server
    pub base_url: String,
    /// Model name for embeddings
    pub model: String,
    /// Embedding vector dimension
    pub dim: usize,
    /// Maximum tokens per embedded input
    pub max_token_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            working_dir: PathBuf::from("./"),
            handoff: HandoffMode::PerTask,
            allow_local_paths: false,
            clone_timeout_secs: 300,
            git_token: None,
            rag: RagConfig::default(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunk_token_size: 1200,
            chunk_overlap_tokens: 100,
            top_k: 20,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ollama:11434".to_string(),
            model: "gemma3:1b".to_string(),
            max_async: 4,
            num_ctx: 32768,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ollama:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dim: 768,
            max_token_size: 8192,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REPO_RAG_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("REPO_RAG_WORKING_DIR") {
            config.working_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = std::env::var("REPO_RAG_HANDOFF") {
            match mode.as_str() {
                "per_task" => config.handoff = HandoffMode::PerTask,
                "shared" => config.handoff = HandoffMode::Shared,
                other => tracing::warn!("Ignoring unknown REPO_RAG_HANDOFF value: {other}"),
            }
        }
        if let Ok(val) = std::env::var("REPO_RAG_ALLOW_LOCAL_PATHS") {
            config.allow_local_paths = matches!(val.as_str(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("REPO_RAG_CLONE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.clone_timeout_secs = v;
            }
        }
        if let Ok(token) = std::env::var("REPO_RAG_GIT_TOKEN") {
            config.git_token = Some(token);
        }

        // Language model
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.rag.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.rag.llm.model = model;
        }
        if let Ok(val) = std::env::var("LLM_MAX_ASYNC") {
            if let Ok(v) = val.parse::<usize>() {
                config.rag.llm.max_async = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("LLM_NUM_CTX") {
            if let Ok(v) = val.parse() {
                config.rag.llm.num_ctx = v;
            }
        }

        // Embeddings
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            config.rag.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.rag.embedding.model = model;
        }
        if let Ok(val) = std::env::var("EMBEDDING_DIM") {
            if let Ok(v) = val.parse() {
                config.rag.embedding.dim = v;
            }
        }
        if let Ok(val) = std::env::var("EMBEDDING_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                config.rag.embedding.max_token_size = v;
            }
        }

        config
    }

    /// Path the fetcher writes to and the indexer reads from for `task_id`.
    pub fn handoff_path(&self, task_id: &uuid::Uuid) -> PathBuf {
        match self.handoff {
            HandoffMode::PerTask => self.downloads_dir().join(format!("{task_id}.md")),
            HandoffMode::Shared => self.working_dir.join("downloaded.md"),
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.working_dir.join("downloads")
    }
}
