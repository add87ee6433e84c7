use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an ingestion task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ingesting,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `Completed` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Process-repo request
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRepoRequest {
    pub repo_url: String,
}

/// Process-repo response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRepoResponse {
    pub message: String,
    pub task_id: Uuid,
}

/// Task status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// Query request
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "naive".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(TaskStatus::Ingesting).unwrap(), "ingesting");
        assert_eq!(serde_json::to_value(TaskStatus::Completed).unwrap(), "completed");
        assert_eq!(serde_json::to_value(TaskStatus::Failed).unwrap(), "failed");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Ingesting.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_query_request_mode_defaults_to_naive() {
        let req: QueryRequest = serde_json::from_str(r#"{"query":"what is this?"}"#).unwrap();
        assert_eq!(req.mode, "naive");
    }

    #[test]
    fn test_query_request_keeps_literal_mode() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query":"q","mode":"something-else"}"#).unwrap();
        assert_eq!(req.mode, "something-else");
    }
}
