//! Ingestion orchestration: fetch a repository on the request path, then
//! insert the flattened document into the retrieval index in the background.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, HandoffMode};
use crate::git::RepoFetcher;
use crate::models::TaskStatus;
use crate::rag::{IndexHandle, RetrievalIndex};
use crate::tasks::{TaskId, TaskRegistry};

/// An accepted ingestion request.
pub struct Submission {
    pub task_id: TaskId,
    /// Resolves to the terminal status once background insertion ends.
    pub completion: JoinHandle<TaskStatus>,
}

pub struct Ingestor {
    config: Config,
    tasks: Arc<TaskRegistry>,
    fetcher: Arc<dyn RepoFetcher>,
    index: IndexHandle,
}

impl Ingestor {
    pub fn new(
        config: Config,
        tasks: Arc<TaskRegistry>,
        fetcher: Arc<dyn RepoFetcher>,
        index: IndexHandle,
    ) -> Self {
        Self {
            config,
            tasks,
            fetcher,
            index,
        }
    }

    /// Fetch `repo_url` to completion, register a task and spawn its insertion.
    ///
    /// Fetch failures propagate and leave no task behind.
    pub async fn process(&self, repo_url: &str) -> Result<Submission> {
        let index = self.index.get()?;

        let task_id = Uuid::new_v4();
        let handoff = self.config.handoff_path(&task_id);

        tracing::info!("Fetching {repo_url} for task {task_id}");
        self.fetcher
            .ingest(repo_url, &handoff)
            .await
            .with_context(|| format!("Failed to fetch repository {repo_url}"))?;

        self.tasks.register(task_id)?;

        let remove_after_read = self.config.handoff == HandoffMode::PerTask;
        let completion = tokio::spawn(run_insertion(
            self.tasks.clone(),
            index,
            task_id,
            handoff,
            remove_after_read,
        ));

        Ok(Submission {
            task_id,
            completion,
        })
    }
}

async fn run_insertion(
    tasks: Arc<TaskRegistry>,
    index: Arc<dyn RetrievalIndex>,
    task_id: TaskId,
    handoff: PathBuf,
    remove_after_read: bool,
) -> TaskStatus {
    let status = match insert_document(index, &handoff, remove_after_read).await {
        Ok(()) => {
            tracing::info!("Task {task_id} completed");
            TaskStatus::Completed
        }
        Err(e) => {
            tracing::error!("Task {task_id} failed: {e:#}");
            TaskStatus::Failed
        }
    };

    if let Err(e) = tasks.set(task_id, status) {
        tracing::warn!("Could not record status for task {task_id}: {e:#}");
    }
    status
}

async fn insert_document(
    index: Arc<dyn RetrievalIndex>,
    handoff: &Path,
    remove_after_read: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(handoff)
        .await
        .with_context(|| format!("Failed to read {}", handoff.display()))?;

    if remove_after_read {
        if let Err(e) = tokio::fs::remove_file(handoff).await {
            tracing::warn!("Failed to remove {}: {e}", handoff.display());
        }
    }

    // Separate task so a panic inside the index surfaces as a JoinError
    let insert = tokio::spawn(async move { index.insert(&text).await });
    match insert.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("Insert task aborted: {e}")),
    }
}
