//! Workflow definitions and the phase execution engine.

pub mod context;
pub mod definition;
pub mod dsl;
pub mod executor;
pub mod phase;
pub mod profiles;
pub mod report;

pub use context::ExecutionContext;
pub use definition::{DefinitionError, WorkflowDefinition};
pub use dsl::{load_workflow, parse_workflow};
pub use executor::{WorkflowExecutor, WorkflowOutcome};
pub use phase::{LoopMode, PhaseCondition, PhaseDefinition, PhaseResult, PhaseTests};
pub use profiles::profile_for;
pub use report::{AttemptRecord, EscalationReport};
