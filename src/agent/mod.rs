//! Contract for the external agent executor.
//!
//! The engine treats the agent as an opaque black box: a prompt goes in, a
//! success flag plus output text comes out. Production uses the claude CLI
//! via the subprocess layer; tests inject a scripted mock.

mod claude;

pub use claude::ClaudeAgentExecutor;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::subprocess::ProcessError;

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub model: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn succeeded(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn run(&self, request: AgentRequest) -> Result<AgentResponse, ProcessError>;
}
