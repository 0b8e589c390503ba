//! Task store contract.
//!
//! The engine reports run lifecycle transitions through this trait; the
//! actual task-file format belongs to the caller.

use async_trait::async_trait;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn mark_in_progress(&self, task_id: &str, description: &str);
    async fn mark_done(&self, task_id: &str, description: &str);
    async fn mark_failed(&self, task_id: &str, description: &str, error: &str);
}

/// Task store that records nothing, for callers without task tracking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTaskStore;

#[async_trait]
impl TaskStore for NullTaskStore {
    async fn mark_in_progress(&self, task_id: &str, _description: &str) {
        tracing::debug!("Task {} in progress", task_id);
    }

    async fn mark_done(&self, task_id: &str, _description: &str) {
        tracing::debug!("Task {} done", task_id);
    }

    async fn mark_failed(&self, task_id: &str, _description: &str, error: &str) {
        tracing::debug!("Task {} failed: {}", task_id, error);
    }
}
