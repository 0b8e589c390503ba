use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::detect::{detect_framework, TestFramework};
use super::parse::parse_output;
use super::ValidationResult;
use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessRunner};

const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(600);

/// How the test command is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TestCommand {
    /// Auto-detect the framework from the working directory.
    #[default]
    Auto,
    /// Run this shell command verbatim.
    Explicit(String),
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// When no framework is found: skip with success (default) or fail.
    pub fail_when_missing: bool,
    pub default_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            fail_when_missing: false,
            default_timeout: DEFAULT_TEST_TIMEOUT,
        }
    }
}

/// Runs test suites through the process runner and parses their output.
#[derive(Clone)]
pub struct TestValidator {
    runner: Arc<dyn ProcessRunner>,
    config: ValidatorConfig,
}

impl TestValidator {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the test suite for `working_dir` and parse the outcome.
    pub async fn validate(
        &self,
        working_dir: &Path,
        command: &TestCommand,
        timeout: Option<Duration>,
    ) -> Result<ValidationResult> {
        let (shell_command, framework) = match command {
            TestCommand::Explicit(cmd) => (cmd.clone(), TestFramework::Generic),
            TestCommand::Auto => match detect_framework(working_dir) {
                Some(framework) => (framework.command().to_string(), framework),
                None if self.config.fail_when_missing => {
                    anyhow::bail!("No test framework detected in {:?}", working_dir)
                }
                None => {
                    debug!("No test framework detected in {:?}; skipping", working_dir);
                    return Ok(ValidationResult::skipped());
                }
            },
        };

        // An explicit command may still be a known framework invocation
        let framework = match command {
            TestCommand::Explicit(cmd) => infer_framework(cmd).unwrap_or(framework),
            TestCommand::Auto => framework,
        };

        let timeout = timeout.unwrap_or(self.config.default_timeout);
        info!("Running tests: {} (timeout {:?})", shell_command, timeout);

        let process = ProcessCommandBuilder::new("sh")
            .arg("-c")
            .arg(&shell_command)
            .current_dir(working_dir)
            .timeout(timeout)
            .build();

        let output = match self.runner.run(process).await {
            Ok(output) => output,
            Err(ProcessError::Timeout(duration)) => {
                warn!("Test run timed out after {:?}", duration);
                return Ok(ValidationResult {
                    command: Some(shell_command),
                    timed_out: true,
                    success: false,
                    skipped_no_framework: false,
                    duration,
                    ..ValidationResult::skipped()
                });
            }
            Err(e) => return Err(e.into()),
        };

        let counts = parse_output(framework, &output.stdout, &output.stderr);
        let exit_ok = output.status.success();

        // Parsed counts take precedence; exit code decides unrecognized output
        let success = if counts.recognized {
            counts.failed == 0 && counts.errors == 0 && exit_ok
        } else {
            exit_ok
        };

        Ok(ValidationResult {
            command: Some(shell_command),
            passed: counts.passed,
            failed: counts.failed,
            skipped: counts.skipped,
            errors: counts.errors,
            failures: counts.failures,
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: false,
            skipped_no_framework: false,
            success,
            duration: output.duration,
        })
    }
}

fn infer_framework(command: &str) -> Option<TestFramework> {
    let command = command.trim();
    if command.starts_with("cargo") {
        Some(TestFramework::Cargo)
    } else if command.starts_with("pytest") || command.contains("-m pytest") {
        Some(TestFramework::Pytest)
    } else if command.starts_with("npm") || command.contains("jest") {
        Some(TestFramework::Jest)
    } else if command.starts_with("go test") {
        Some(TestFramework::GoTest)
    } else {
        None
    }
}
