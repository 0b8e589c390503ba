//! Test validation adapter.
//!
//! Runs a project's test suite (explicit command or auto-detected framework),
//! parses the output into structured counts and named failures, and renders a
//! bounded retry-context block for injection into the next agent prompt.

mod detect;
mod parse;
mod runner;

pub use detect::{detect_framework, TestFramework};
pub use runner::{TestCommand, TestValidator, ValidatorConfig};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum named failures included in a retry context.
const RETRY_CONTEXT_MAX_FAILURES: usize = 5;
/// Trailing stderr lines included in a retry context.
const RETRY_CONTEXT_STDERR_LINES: usize = 15;

/// One named test failure, with location when the framework reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestFailure {
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// Structured result of one test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub command: Option<String>,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: u32,
    pub failures: Vec<TestFailure>,
    pub stdout: String,
    pub stderr: String,
    /// The run exceeded its timeout. Distinct from test failures.
    pub timed_out: bool,
    /// No test framework was found and the run was skipped.
    pub skipped_no_framework: bool,
    pub success: bool,
    pub duration: Duration,
}

impl ValidationResult {
    /// A pass-through result for projects with no detectable test setup.
    pub fn skipped() -> Self {
        Self {
            command: None,
            passed: 0,
            failed: 0,
            skipped: 0,
            errors: 0,
            failures: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
            skipped_no_framework: true,
            success: true,
            duration: Duration::ZERO,
        }
    }

    /// Render a bounded, prompt-ready description of the failure: a summary
    /// line, up to a handful of named failures, and the tail of stderr.
    pub fn to_retry_context(&self) -> String {
        if self.timed_out {
            return format!(
                "Test run timed out before completing (command: {}). \
                 The suite may hang or be far too slow; investigate before re-running.",
                self.command.as_deref().unwrap_or("auto"),
            );
        }

        let mut block = format!(
            "Test run failed: {} passed, {} failed, {} skipped, {} errors.",
            self.passed, self.failed, self.skipped, self.errors
        );

        if !self.failures.is_empty() {
            block.push_str("\nFailing tests:");
            for failure in self.failures.iter().take(RETRY_CONTEXT_MAX_FAILURES) {
                block.push_str("\n  - ");
                block.push_str(&failure.name);
                if let Some(file) = &failure.file {
                    block.push_str(&format!(" ({file}"));
                    if let Some(line) = failure.line {
                        block.push_str(&format!(":{line}"));
                    }
                    block.push(')');
                }
            }
            if self.failures.len() > RETRY_CONTEXT_MAX_FAILURES {
                block.push_str(&format!(
                    "\n  … and {} more",
                    self.failures.len() - RETRY_CONTEXT_MAX_FAILURES
                ));
            }
        }

        let stderr_tail: Vec<&str> = self
            .stderr
            .lines()
            .rev()
            .take(RETRY_CONTEXT_STDERR_LINES)
            .collect();
        if !stderr_tail.is_empty() {
            block.push_str("\nRecent test output:\n");
            for line in stderr_tail.into_iter().rev() {
                block.push_str(line);
                block.push('\n');
            }
        }

        block.push_str("Fix the failures above, then the tests will be re-run.");
        block
    }
}
