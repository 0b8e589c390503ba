use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::validation::ValidationResult;

/// Gate deciding whether a phase runs at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PhaseCondition {
    #[default]
    Always,
    HasChanges,
    TestsPassed,
    TestsFailed,
    FileExists(String),
    EnvSet(String),
}

impl PhaseCondition {
    /// Parse a DSL condition string, either `type` or `type:value`.
    ///
    /// The value is everything after the first `:`, so values containing
    /// colons pass through unchanged. A colon-bearing condition type would be
    /// ambiguous, but none exists.
    pub fn parse(input: &str) -> Result<Self, String> {
        let (kind, value) = match input.split_once(':') {
            Some((kind, value)) => (kind, Some(value)),
            None => (input, None),
        };

        match (kind.trim(), value) {
            ("always", None) => Ok(PhaseCondition::Always),
            ("has_changes", None) => Ok(PhaseCondition::HasChanges),
            ("tests_passed", None) => Ok(PhaseCondition::TestsPassed),
            ("tests_failed", None) => Ok(PhaseCondition::TestsFailed),
            ("file_exists", Some(value)) if !value.is_empty() => {
                Ok(PhaseCondition::FileExists(value.to_string()))
            }
            ("env_set", Some(value)) if !value.is_empty() => {
                Ok(PhaseCondition::EnvSet(value.to_string()))
            }
            _ => Err(format!("unrecognized condition: {input:?}")),
        }
    }
}

/// How a phase repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    None,
    /// Re-run until the phase itself succeeds, up to `loop_max`.
    UntilSuccess,
    /// Re-run until the post-phase test run passes, up to `loop_max`.
    UntilTestsPass,
    /// Run exactly `loop_max` times; the last result wins.
    FixedCount,
}

/// Test command attached to a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTests {
    /// Auto-detect the framework at run time.
    Auto,
    /// Run this shell command.
    Command(String),
}

/// One named unit of work in a workflow. Immutable after load.
#[derive(Debug, Clone)]
pub struct PhaseDefinition {
    pub name: String,
    /// Prompt template; `{task}` and `{task_id}` placeholders are substituted.
    pub prompt: String,
    pub model: Option<String>,
    pub required: bool,
    pub timeout: Option<Duration>,
    /// Local retries for transient agent failures, distinct from the
    /// workflow-level test-retry loop.
    pub max_retries: Option<u32>,
    pub tests: Option<PhaseTests>,
    pub test_timeout: Option<Duration>,
    pub condition: PhaseCondition,
    pub loop_mode: LoopMode,
    pub loop_max: u32,
    /// Sibling phase names to run concurrently with this one.
    pub parallel_with: Vec<String>,
}

impl PhaseDefinition {
    pub fn new(name: &str, prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            prompt: prompt.to_string(),
            model: None,
            required: true,
            timeout: None,
            max_retries: None,
            tests: None,
            test_timeout: None,
            condition: PhaseCondition::Always,
            loop_mode: LoopMode::None,
            loop_max: 1,
            parallel_with: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_tests(mut self, tests: PhaseTests) -> Self {
        self.tests = Some(tests);
        self
    }

    pub fn with_condition(mut self, condition: PhaseCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_loop(mut self, mode: LoopMode, max: u32) -> Self {
        self.loop_mode = mode;
        self.loop_max = max.max(1);
        self
    }
}

/// Result of one phase, recorded after it has been attempted.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub phase: String,
    pub success: bool,
    pub skipped: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub validation: Option<ValidationResult>,
    /// Loop iterations actually used.
    pub iterations: u32,
}

impl PhaseResult {
    pub fn skipped(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            success: true,
            skipped: true,
            output: String::new(),
            error: None,
            duration: Duration::ZERO,
            validation: None,
            iterations: 0,
        }
    }
}
