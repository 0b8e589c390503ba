//! # Maestro
//!
//! A workflow execution and recovery engine for driving long-running,
//! failure-prone AI agent invocations through multi-phase workflows.
//!
//! Maestro classifies a task's complexity, selects a phase plan (or loads one
//! from a YAML DSL), walks the phases to completion, and recovers from
//! failures automatically: transient errors are retried with backoff, test
//! failures bounce back to the implementation phase with diagnostic context,
//! and exhausted retries escalate with a full attempt history.
//!
//! ## Modules
//!
//! - `agent` - Contract for the external agent executor (the AI assistant CLI)
//! - `checkpoint` - Immutable per-step checkpoints with git-based rollback
//! - `classify` - Pattern-based error classification
//! - `complexity` - Task complexity classification (MINIMAL/STANDARD/FULL)
//! - `git` - Git collaborator layered on the subprocess abstraction
//! - `recovery` - Recovery strategy selection (Retry/Fix/Simplify/Escalate)
//! - `subprocess` - Unified subprocess abstraction layer for testing
//! - `tasks` - Task store contract consumed at run start/end
//! - `validation` - Test-framework detection, execution, and output parsing
//! - `workflow` - Workflow definitions, profiles, DSL, and the execution engine
//! - `testing` - Shared test doubles

pub mod agent;
pub mod checkpoint;
pub mod classify;
pub mod complexity;
pub mod git;
pub mod recovery;
pub mod subprocess;
pub mod tasks;
pub mod validation;
pub mod workflow;

pub mod testing;
