use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::phase::PhaseResult;

/// Per-run state shared across phases.
///
/// The mutable portion sits behind a mutex so parallel phase groups can
/// record results concurrently.
#[derive(Debug)]
pub struct ExecutionContext {
    pub task: String,
    pub task_id: String,
    pub working_dir: PathBuf,
    shared: Mutex<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    /// Outcome of the most recent test run, if any ran.
    last_test_passed: Option<bool>,
    /// Whether the working tree had uncommitted changes at last check.
    has_changes: bool,
    results: HashMap<String, PhaseResult>,
}

impl ExecutionContext {
    pub fn new(task: &str, task_id: &str, working_dir: &Path) -> Self {
        Self {
            task: task.to_string(),
            task_id: task_id.to_string(),
            working_dir: working_dir.to_path_buf(),
            shared: Mutex::new(SharedState::default()),
        }
    }

    pub fn record_result(&self, result: PhaseResult) {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(validation) = &result.validation {
            if !validation.skipped_no_framework {
                shared.last_test_passed = Some(validation.success);
            }
        }
        shared.results.insert(result.phase.clone(), result);
    }

    pub fn set_has_changes(&self, has_changes: bool) {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.has_changes = has_changes;
    }

    pub fn set_last_test_passed(&self, passed: bool) {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.last_test_passed = Some(passed);
    }

    pub fn has_changes(&self) -> bool {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .has_changes
    }

    pub fn last_test_passed(&self) -> Option<bool> {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_test_passed
    }

    pub fn result_for(&self, phase: &str) -> Option<PhaseResult> {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .results
            .get(phase)
            .cloned()
    }

    /// Drain recorded results in no particular order; the executor re-sorts
    /// them into phase order for the final outcome.
    pub fn take_results(&self) -> HashMap<String, PhaseResult> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut shared.results)
    }

    /// Substitute `{task}` and `{task_id}` placeholders in a prompt template.
    pub fn render_prompt(&self, template: &str) -> String {
        template
            .replace("{task}", &self.task)
            .replace("{task_id}", &self.task_id)
    }
}
