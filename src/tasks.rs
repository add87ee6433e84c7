//! In-memory registry of ingestion tasks.

use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::TaskStatus;

pub type TaskId = Uuid;

/// Maps task ids to their lifecycle state for the lifetime of the process.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, TaskStatus>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a task with a fresh id in the `ingesting` state.
    pub fn create(&self) -> TaskId {
        let id = Uuid::new_v4();
        self.tasks.write().insert(id, TaskStatus::Ingesting);
        id
    }

    /// Register a caller-generated id in the `ingesting` state.
    pub fn register(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&id) {
            anyhow::bail!("Task {id} already exists");
        }
        tasks.insert(id, TaskStatus::Ingesting);
        Ok(())
    }

    /// Overwrite the status of a task. Terminal states are final.
    pub fn set(&self, id: TaskId, status: TaskStatus) -> Result<()> {
        let mut tasks = self.tasks.write();
        let current = tasks
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Task {id} not found"))?;
        if current.is_terminal() && *current != status {
            anyhow::bail!("Task {id} already finished as {current:?}");
        }
        *current = status;
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.read().get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
