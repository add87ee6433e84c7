use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use repo_rag::api;
use repo_rag::config::Config;
use repo_rag::git::GitFetcher;
use repo_rag::rag::{IndexHandle, RagIndex};
use repo_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Working directory: {}", config.working_dir.display());
    tracing::info!(
        "LLM: {} ({}), embeddings: {} ({})",
        config.rag.llm.model,
        config.rag.llm.base_url,
        config.rag.embedding.model,
        config.rag.embedding.base_url
    );

    let rag = RagIndex::new(&config.working_dir, config.rag.clone())?;
    rag.initialize_storages()
        .await
        .context("Failed to initialize retrieval storages")?;
    rag.initialize_pipeline_status().await?;

    let index = IndexHandle::new();
    index.publish(Arc::new(rag))?;

    let fetcher = Arc::new(GitFetcher::new(&config));
    let state = AppState::new(config.clone(), fetcher, index);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
