use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{AgentExecutor, AgentRequest, AgentResponse};
use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessRunner};

/// Agent executor shelling out to the claude CLI in non-interactive mode.
pub struct ClaudeAgentExecutor {
    runner: Arc<dyn ProcessRunner>,
}

impl ClaudeAgentExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Whether the claude CLI is installed and responding.
    pub async fn check_availability(&self) -> Result<bool, ProcessError> {
        let result = self
            .runner
            .run(
                ProcessCommandBuilder::new("claude")
                    .args(["--version"])
                    .build(),
            )
            .await;

        match result {
            Ok(output) => Ok(output.status.success()),
            Err(ProcessError::CommandNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AgentExecutor for ClaudeAgentExecutor {
    async fn run(&self, request: AgentRequest) -> Result<AgentResponse, ProcessError> {
        debug!(
            "Invoking agent (model {}, timeout {:?})",
            request.model, request.timeout
        );

        let command = ProcessCommandBuilder::new("claude")
            .arg("--print")
            .arg("--model")
            .arg(&request.model)
            .arg("--dangerously-skip-permissions")
            .current_dir(&request.working_dir)
            .timeout(request.timeout)
            .stdin(request.prompt.clone())
            .build();

        let output = match self.runner.run(command).await {
            Ok(output) => output,
            // A timed-out agent call is a failed attempt, not a crash
            Err(ProcessError::Timeout(duration)) => {
                return Ok(AgentResponse::failed(format!(
                    "Agent call timed out after {duration:?}"
                )))
            }
            Err(e) => return Err(e),
        };

        if output.status.success() {
            Ok(AgentResponse::succeeded(output.stdout))
        } else {
            let error = if output.stderr.trim().is_empty() {
                format!(
                    "Agent exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                output.stderr.trim().to_string()
            };
            Ok(AgentResponse::failed(error))
        }
    }
}
