//! Test doubles for the engine's injected dependencies.
//!
//! Everything here is deterministic and process-free so workflow control
//! flow can be exercised without a real agent, shell, or git repository.

mod mocks;

pub use mocks::{MockAgentExecutor, RecordingTaskStore, ScriptedProcessRunner, TaskEvent};
