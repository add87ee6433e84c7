use std::sync::Arc;

use crate::config::Config;
use crate::git::RepoFetcher;
use crate::ingest::Ingestor;
use crate::rag::IndexHandle;
use crate::tasks::TaskRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub tasks: Arc<TaskRegistry>,
    pub index: IndexHandle,
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn new(config: Config, fetcher: Arc<dyn RepoFetcher>, index: IndexHandle) -> Self {
        let tasks = Arc::new(TaskRegistry::new());
        let ingestor = Arc::new(Ingestor::new(
            config.clone(),
            tasks.clone(),
            fetcher,
            index.clone(),
        ));

        Self {
            config,
            tasks,
            index,
            ingestor,
        }
    }
}
