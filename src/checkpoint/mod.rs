//! Immutable per-step checkpoints with git-based rollback.
//!
//! One JSON document per checkpoint under a task-scoped directory. Checkpoints
//! are never edited; superseded state is represented by writing a new one.

mod store;

pub use store::{CheckpointInput, CheckpointStore, RollbackTarget};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// An immutable snapshot of task progress after one meaningful step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Monotonic id derived from a microsecond-resolution timestamp.
    pub id: u64,
    /// Task this checkpoint belongs to.
    pub task_id: String,
    /// Phase that produced the step.
    pub phase: String,
    /// Human-readable step description.
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Arbitrary state snapshot.
    #[serde(default)]
    pub state: HashMap<String, Value>,
    #[serde(default)]
    pub modified_files: Vec<String>,
    /// Short git commit hash at save time, if the workspace is a repository.
    pub git_commit: Option<String>,
    pub note: Option<String>,
}

/// Terminal step tag written when a workflow run succeeds.
pub const STEP_COMPLETE: &str = "complete";
/// Terminal step tag written when a workflow run fails.
pub const STEP_FAILED: &str = "failed";
