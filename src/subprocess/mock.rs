//! In-memory [`ProcessRunner`] for tests.
//!
//! Expectations are registered per program with an optional argument
//! predicate and an invocation budget. Every call is recorded so tests can
//! assert on what was (or was not) spawned.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

type ArgsPredicate = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

enum MockReply {
    Output(ProcessOutput),
    Timeout,
}

struct Expectation {
    matches_args: Option<ArgsPredicate>,
    reply: MockReply,
    /// Invocations left before the expectation is exhausted. `None` means
    /// unlimited.
    remaining: Option<usize>,
}

impl Expectation {
    fn accepts(&self, args: &[String]) -> bool {
        self.matches_args.as_ref().map_or(true, |m| m(args))
    }
}

#[derive(Default)]
struct MockState {
    expectations: HashMap<String, Vec<Expectation>>,
    seen: Vec<ProcessCommand>,
}

#[derive(Clone, Default)]
pub struct MockProcessRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start describing how invocations of `program` should behave. The
    /// returned builder registers nothing until `finish()` is called.
    pub fn expect_command(&mut self, program: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            runner: self.clone(),
            program: program.to_string(),
            matches_args: None,
            status: ExitStatus::Success,
            stdout: String::new(),
            stderr: String::new(),
            times_out: false,
            remaining: None,
        }
    }

    /// True when `program` was invoked exactly `times` times.
    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        let state = self.state.lock().unwrap();
        state.seen.iter().filter(|c| c.program == program).count() == times
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let mut state = self.state.lock().unwrap();
        state.seen.push(command.clone());

        let mut exhausted = false;
        if let Some(expectations) = state.expectations.get_mut(&command.program) {
            for expectation in expectations.iter_mut() {
                if !expectation.accepts(&command.args) {
                    continue;
                }
                if expectation.remaining == Some(0) {
                    exhausted = true;
                    continue;
                }
                if let Some(remaining) = &mut expectation.remaining {
                    *remaining -= 1;
                }
                return match &expectation.reply {
                    MockReply::Output(output) => Ok(output.clone()),
                    MockReply::Timeout => Err(ProcessError::Timeout(Duration::from_secs(1))),
                };
            }
        }

        let reason = if exhausted {
            format!(
                "'{}' invoked more times than its expectation allows",
                command.program
            )
        } else {
            format!(
                "no expectation matches: {} {:?}",
                command.program, command.args
            )
        };
        Err(ProcessError::MockExpectationNotMet(reason))
    }
}

/// Builder returned by [`MockProcessRunner::expect_command`].
pub struct ExpectationBuilder {
    runner: MockProcessRunner,
    program: String,
    matches_args: Option<ArgsPredicate>,
    status: ExitStatus,
    stdout: String,
    stderr: String,
    times_out: bool,
    remaining: Option<usize>,
}

impl ExpectationBuilder {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.matches_args = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn returns_success(mut self) -> Self {
        self.status = ExitStatus::Success;
        self
    }

    pub fn returns_timeout(mut self) -> Self {
        self.times_out = true;
        self
    }

    /// Allow at most `n` matching invocations; later calls fail the test.
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    pub fn finish(self) {
        let reply = if self.times_out {
            MockReply::Timeout
        } else {
            MockReply::Output(ProcessOutput {
                status: self.status,
                stdout: self.stdout,
                stderr: self.stderr,
                duration: Duration::from_millis(5),
            })
        };
        let expectation = Expectation {
            matches_args: self.matches_args,
            reply,
            remaining: self.remaining,
        };
        self.runner
            .state
            .lock()
            .unwrap()
            .expectations
            .entry(self.program)
            .or_default()
            .push(expectation);
    }
}
