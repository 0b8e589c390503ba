use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use super::phase::{LoopMode, PhaseDefinition};

pub const DEFAULT_MODEL: &str = "sonnet";
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(1800);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_MAX_TEST_RETRIES: u32 = 3;
pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Structural problems detected before any phase executes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("workflow has no phases")]
    EmptyPhases,

    #[error("phase at index {index} has no name")]
    MissingName { index: usize },

    #[error("phase '{phase}' has no prompt")]
    MissingPrompt { phase: String },

    #[error("duplicate phase name '{0}'")]
    DuplicatePhase(String),

    #[error("phase '{phase}' lists unknown parallel_with phase '{reference}'")]
    UnknownParallelRef { phase: String, reference: String },

    #[error("phase '{phase}': {message}")]
    InvalidCondition { phase: String, message: String },

    #[error("phase '{phase}' declares a loop with zero iterations")]
    ZeroLoopIterations { phase: String },

    #[error("workflow bounce target '{0}' is not a phase")]
    UnknownBounceTarget(String),
}

/// An ordered, validated list of phases plus workflow-level defaults.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: Option<String>,
    pub phases: Vec<PhaseDefinition>,
    pub default_model: String,
    pub default_timeout: Duration,
    pub default_max_retries: u32,
    pub fail_fast: bool,
    pub skip_optional_on_failure: bool,
    /// Allowed attempts for the implement↔test bounce.
    pub max_test_retries: u32,
    /// Allowed workflow-level recovery attempts per phase.
    pub max_recovery_attempts: u32,
    /// Phase the cursor rewinds to when a downstream test run fails.
    pub bounce_to: Option<String>,
}

impl WorkflowDefinition {
    /// Validate and construct. Every structural error has a distinct variant
    /// and is raised before any phase executes.
    pub fn new(name: &str, phases: Vec<PhaseDefinition>) -> Result<Self, DefinitionError> {
        let definition = Self {
            name: name.to_string(),
            description: None,
            phases,
            default_model: DEFAULT_MODEL.to_string(),
            default_timeout: DEFAULT_PHASE_TIMEOUT,
            default_max_retries: DEFAULT_MAX_RETRIES,
            fail_fast: true,
            skip_optional_on_failure: false,
            max_test_retries: DEFAULT_MAX_TEST_RETRIES,
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            bounce_to: None,
        };
        definition.validate()?;
        Ok(definition)
    }

    pub fn with_bounce_to(mut self, phase: &str) -> Result<Self, DefinitionError> {
        self.bounce_to = Some(phase.to_string());
        self.validate()?;
        Ok(self)
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if self.phases.is_empty() {
            return Err(DefinitionError::EmptyPhases);
        }

        let mut seen = HashSet::new();
        for (index, phase) in self.phases.iter().enumerate() {
            if phase.name.trim().is_empty() {
                return Err(DefinitionError::MissingName { index });
            }
            if phase.prompt.trim().is_empty() {
                return Err(DefinitionError::MissingPrompt {
                    phase: phase.name.clone(),
                });
            }
            if !seen.insert(phase.name.as_str()) {
                return Err(DefinitionError::DuplicatePhase(phase.name.clone()));
            }
            // Struct-literal construction can bypass the builder's floor
            if phase.loop_mode != LoopMode::None && phase.loop_max == 0 {
                return Err(DefinitionError::ZeroLoopIterations {
                    phase: phase.name.clone(),
                });
            }
        }

        let names: HashSet<&str> = self.phases.iter().map(|p| p.name.as_str()).collect();
        for phase in &self.phases {
            for reference in &phase.parallel_with {
                if !names.contains(reference.as_str()) {
                    return Err(DefinitionError::UnknownParallelRef {
                        phase: phase.name.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }

        if let Some(target) = &self.bounce_to {
            if !names.contains(target.as_str()) {
                return Err(DefinitionError::UnknownBounceTarget(target.clone()));
            }
        }

        Ok(())
    }

    pub fn phase_index(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name == name)
    }

    /// Model for a phase, falling back to the workflow default.
    pub fn model_for(&self, phase: &PhaseDefinition) -> String {
        phase
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    pub fn timeout_for(&self, phase: &PhaseDefinition) -> Duration {
        phase.timeout.unwrap_or(self.default_timeout)
    }

    pub fn max_retries_for(&self, phase: &PhaseDefinition) -> u32 {
        phase.max_retries.unwrap_or(self.default_max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(name: &str) -> PhaseDefinition {
        PhaseDefinition::new(name, "Do {task}")
    }

    #[test]
    fn test_empty_phases_rejected() {
        assert_eq!(
            WorkflowDefinition::new("wf", vec![]).unwrap_err(),
            DefinitionError::EmptyPhases
        );
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = WorkflowDefinition::new("wf", vec![phase("")]).unwrap_err();
        assert_eq!(err, DefinitionError::MissingName { index: 0 });
    }

    #[test]
    fn test_missing_prompt_rejected() {
        let err =
            WorkflowDefinition::new("wf", vec![PhaseDefinition::new("plan", "  ")]).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::MissingPrompt {
                phase: "plan".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err =
            WorkflowDefinition::new("wf", vec![phase("plan"), phase("plan")]).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicatePhase("plan".to_string()));
    }

    #[test]
    fn test_dangling_parallel_ref_rejected() {
        let mut lint = phase("lint");
        lint.parallel_with = vec!["typecheck".to_string()];
        let err = WorkflowDefinition::new("wf", vec![phase("plan"), lint]).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::UnknownParallelRef {
                phase: "lint".to_string(),
                reference: "typecheck".to_string(),
            }
        );
    }

    #[test]
    fn test_zero_iteration_loop_rejected() {
        let mut looping = phase("implement");
        looping.loop_mode = LoopMode::UntilTestsPass;
        looping.loop_max = 0;
        let err = WorkflowDefinition::new("wf", vec![looping]).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::ZeroLoopIterations {
                phase: "implement".to_string()
            }
        );
    }

    #[test]
    fn test_valid_definition() {
        let definition =
            WorkflowDefinition::new("wf", vec![phase("plan"), phase("implement")]).unwrap();
        assert_eq!(definition.phases.len(), 2);
        assert!(definition.fail_fast);
        assert_eq!(definition.phase_index("implement"), Some(1));
    }

    #[test]
    fn test_bounce_target_must_exist() {
        let definition = WorkflowDefinition::new("wf", vec![phase("implement")]).unwrap();
        assert!(definition.clone().with_bounce_to("implement").is_ok());
        assert_eq!(
            definition.with_bounce_to("missing").unwrap_err(),
            DefinitionError::UnknownBounceTarget("missing".to_string())
        );
    }

    #[test]
    fn test_defaults_fall_back() {
        let definition = WorkflowDefinition::new("wf", vec![phase("plan")]).unwrap();
        let p = &definition.phases[0];
        assert_eq!(definition.model_for(p), DEFAULT_MODEL);
        assert_eq!(definition.timeout_for(p), DEFAULT_PHASE_TIMEOUT);
        assert_eq!(definition.max_retries_for(p), DEFAULT_MAX_RETRIES);
    }
}
