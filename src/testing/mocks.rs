use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::agent::{AgentExecutor, AgentRequest, AgentResponse};
use crate::subprocess::{ProcessCommand, ProcessError, ProcessOutput, ProcessRunner};
use crate::tasks::TaskStore;

/// Agent double that replays a scripted sequence of responses.
///
/// Responses are consumed in queue order; once the script runs out, every
/// further call succeeds with a fixed output. All requests are recorded for
/// assertions on prompts, models, and call counts.
#[derive(Clone, Default)]
pub struct MockAgentExecutor {
    script: Arc<Mutex<VecDeque<Result<AgentResponse, ProcessError>>>>,
    requests: Arc<Mutex<Vec<AgentRequest>>>,
}

impl MockAgentExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_success(&self, output: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(AgentResponse::succeeded(output.to_string())));
        self
    }

    pub fn queue_failure(&self, error: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(AgentResponse::failed(error.to_string())));
        self
    }

    pub fn queue_error(&self, error: ProcessError) -> &Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Prompt of the `n`th call (0-based).
    pub fn prompt(&self, n: usize) -> Option<String> {
        self.requests.lock().unwrap().get(n).map(|r| r.prompt.clone())
    }
}

#[async_trait]
impl AgentExecutor for MockAgentExecutor {
    async fn run(&self, request: AgentRequest) -> Result<AgentResponse, ProcessError> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Ok(AgentResponse::succeeded("done".to_string())),
        }
    }
}

/// Process runner that replays outputs strictly in call order, regardless of
/// the command. Complements [`crate::subprocess::MockProcessRunner`], whose
/// per-command expectations cannot express "same command, different result
/// on the next call".
#[derive(Clone, Default)]
pub struct ScriptedProcessRunner {
    script: Arc<Mutex<VecDeque<Result<ProcessOutput, ProcessError>>>>,
    fallback: Arc<Mutex<Option<ProcessOutput>>>,
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

impl ScriptedProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_output(&self, output: ProcessOutput) -> &Self {
        self.script.lock().unwrap().push_back(Ok(output));
        self
    }

    pub fn queue_error(&self, error: ProcessError) -> &Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Response for calls past the end of the script. Without one, such
    /// calls fail loudly.
    pub fn fallback(&self, output: ProcessOutput) -> &Self {
        *self.fallback.lock().unwrap() = Some(output);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(command.clone());
        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted;
        }
        match self.fallback.lock().unwrap().clone() {
            Some(output) => Ok(output),
            None => Err(ProcessError::MockExpectationNotMet(format!(
                "Script exhausted; unexpected command: {} {:?}",
                command.program, command.args
            ))),
        }
    }
}

/// Lifecycle events observed by [`RecordingTaskStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    InProgress(String),
    Done(String),
    Failed { task_id: String, error: String },
}

/// Task store that records every lifecycle call.
#[derive(Clone, Default)]
pub struct RecordingTaskStore {
    events: Arc<Mutex<Vec<TaskEvent>>>,
}

impl RecordingTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn marked_done(&self, task_id: &str) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, TaskEvent::Done(id) if id == task_id))
    }

    pub fn marked_failed(&self, task_id: &str) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, TaskEvent::Failed { task_id: id, .. } if id == task_id))
    }
}

#[async_trait]
impl TaskStore for RecordingTaskStore {
    async fn mark_in_progress(&self, task_id: &str, _description: &str) {
        self.events
            .lock()
            .unwrap()
            .push(TaskEvent::InProgress(task_id.to_string()));
    }

    async fn mark_done(&self, task_id: &str, _description: &str) {
        self.events
            .lock()
            .unwrap()
            .push(TaskEvent::Done(task_id.to_string()));
    }

    async fn mark_failed(&self, task_id: &str, _description: &str, error: &str) {
        self.events.lock().unwrap().push(TaskEvent::Failed {
            task_id: task_id.to_string(),
            error: error.to_string(),
        });
    }
}
