//! Phase execution engine.
//!
//! Walks a [`WorkflowDefinition`] phase by phase: evaluates conditions,
//! invokes the agent, validates with the test adapter, and routes failures
//! through the implement↔test bounce or the recovery strategy selector.
//! Dependencies arrive by injection so the whole state machine is testable
//! without spawning a single process.

use anyhow::Result;
use futures::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::{AgentExecutor, AgentRequest, AgentResponse};
use crate::checkpoint::{CheckpointInput, CheckpointStore, STEP_COMPLETE, STEP_FAILED};
use crate::classify::{classify_error, ErrorClass};
use crate::complexity::{classify_complexity, TaskSignals};
use crate::git::GitOps;
use crate::recovery::{backoff_delay, RecoverySelector, StrategyKind};
use crate::tasks::TaskStore;
use crate::validation::{TestCommand, TestValidator, ValidationResult};

use super::context::ExecutionContext;
use super::definition::WorkflowDefinition;
use super::phase::{LoopMode, PhaseCondition, PhaseDefinition, PhaseResult, PhaseTests};
use super::profiles::profile_for;
use super::report::{AttemptRecord, EscalationReport};

/// Subdirectory of the working tree where escalation reports land.
const ESCALATION_DIR: &str = ".maestro/escalations";

/// Terminal result of one workflow run.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub success: bool,
    /// First required phase whose final result was a failure.
    pub failing_phase: Option<String>,
    pub error: Option<String>,
    /// Final results in phase declaration order. Bounced phases appear once,
    /// with their last attempt's result.
    pub results: Vec<PhaseResult>,
    /// Failed test-validation attempts that triggered a rewind or escalation.
    pub test_retry_count: u32,
    pub escalation: Option<EscalationReport>,
}

/// The engine. One instance can run many workflows.
pub struct WorkflowExecutor {
    agent: Arc<dyn AgentExecutor>,
    validator: TestValidator,
    checkpoints: Arc<CheckpointStore>,
    tasks: Arc<dyn TaskStore>,
    recovery: RecoverySelector,
    git: GitOps,
}

impl WorkflowExecutor {
    pub fn new(
        agent: Arc<dyn AgentExecutor>,
        validator: TestValidator,
        checkpoints: Arc<CheckpointStore>,
        tasks: Arc<dyn TaskStore>,
        git: GitOps,
    ) -> Self {
        Self {
            agent,
            validator,
            checkpoints,
            tasks,
            recovery: RecoverySelector::new(),
            git,
        }
    }

    pub fn with_recovery(mut self, recovery: RecoverySelector) -> Self {
        self.recovery = recovery;
        self
    }

    /// Classify the task and run the matching built-in profile.
    pub async fn run_adaptive(
        &self,
        context: &ExecutionContext,
        signals: &TaskSignals<'_>,
    ) -> Result<WorkflowOutcome> {
        let complexity = classify_complexity(&context.task, signals);
        info!(
            "Task {} classified as {}; running built-in profile",
            context.task_id, complexity
        );
        let definition = profile_for(complexity);
        self.run(&definition, context).await
    }

    /// Run a workflow definition to completion or terminal failure.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        context: &ExecutionContext,
    ) -> Result<WorkflowOutcome> {
        info!(
            "Starting workflow '{}' for task {} ({} phases)",
            definition.name,
            context.task_id,
            definition.phases.len()
        );
        self.tasks
            .mark_in_progress(&context.task_id, &context.task)
            .await;

        let groups = parallel_groups(definition);
        let bounce_group = definition
            .bounce_to
            .as_deref()
            .and_then(|target| definition.phase_index(target))
            .and_then(|idx| groups.iter().position(|g| g.contains(&idx)));

        let mut cursor = 0usize;
        let mut bounce_failures = 0u32;
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut recovery_attempts: HashMap<String, u32> = HashMap::new();
        let mut pending_context: Option<String> = None;
        let mut required_failure: Option<(String, String)> = None;
        let mut escalation: Option<EscalationReport> = None;

        'groups: while cursor < groups.len() {
            let group = &groups[cursor];

            if required_failure.is_some()
                && definition.skip_optional_on_failure
                && group.iter().all(|&i| !definition.phases[i].required)
            {
                for &i in group {
                    let name = &definition.phases[i].name;
                    debug!("Suppressing optional phase '{}' after required failure", name);
                    context.record_result(PhaseResult::skipped(name));
                }
                cursor += 1;
                continue;
            }

            let results = if group.len() == 1 {
                let phase = &definition.phases[group[0]];
                vec![
                    self.run_phase(definition, phase, context, pending_context.take())
                        .await,
                ]
            } else {
                let extra = pending_context.take();
                join_all(group.iter().map(|&i| {
                    self.run_phase(definition, &definition.phases[i], context, extra.clone())
                }))
                .await
            };

            context
                .set_has_changes(self.git.has_changes(&context.working_dir).await);

            for result in &results {
                self.checkpoint_phase(context, result).await;
                context.record_result(result.clone());
            }

            let failed_required = results
                .iter()
                .find(|r| !r.success && is_required(definition, &r.phase));

            let Some(failed) = failed_required else {
                cursor += 1;
                continue;
            };

            let error_text = failed
                .error
                .clone()
                .unwrap_or_else(|| format!("phase '{}' failed", failed.phase));

            // Test-validation failures route through the bounce, not generic
            // recovery, when the workflow declares a bounce target.
            let failed_validation = failed
                .validation
                .as_ref()
                .filter(|v| !v.success && !v.skipped_no_framework);
            if let (Some(validation), Some(target_group)) = (failed_validation, bounce_group) {
                bounce_failures += 1;
                let exhausted = bounce_failures >= definition.max_test_retries;
                attempts.push(AttemptRecord {
                    attempt: bounce_failures,
                    phase: failed.phase.clone(),
                    error: error_text.clone(),
                    strategy: if exhausted {
                        StrategyKind::Escalate.to_string()
                    } else {
                        StrategyKind::Fix.to_string()
                    },
                    duration: failed.duration,
                });

                if exhausted {
                    warn!(
                        "Tests still failing after {} attempt(s); escalating task {}",
                        bounce_failures, context.task_id
                    );
                    // Fires the escalation hook and logs the decision
                    self.recovery.select(
                        &error_text,
                        bounce_failures + 1,
                        definition.max_test_retries,
                    );
                    let report = self
                        .escalate(context, &failed.phase, &error_text, &attempts)
                        .await;
                    // The outcome carries the first failing required phase;
                    // later failures under fail_fast=false do not replace it.
                    if required_failure.is_none() {
                        escalation = Some(report);
                        required_failure = Some((failed.phase.clone(), error_text));
                    }
                    break 'groups;
                }

                info!(
                    "Test run failed (attempt {}/{}); rewinding to '{}'",
                    bounce_failures,
                    definition.max_test_retries,
                    definition.bounce_to.as_deref().unwrap_or_default()
                );
                pending_context = Some(validation.to_retry_context());
                cursor = target_group;
                continue;
            }

            // Generic workflow-level recovery
            let attempt = recovery_attempts
                .entry(failed.phase.clone())
                .and_modify(|a| *a += 1)
                .or_insert(1);
            let decision =
                self.recovery
                    .select(&error_text, *attempt, definition.max_recovery_attempts);
            attempts.push(AttemptRecord {
                attempt: *attempt,
                phase: failed.phase.clone(),
                error: error_text.clone(),
                strategy: decision.kind.to_string(),
                duration: failed.duration,
            });

            if decision.should_continue {
                if decision.kind == StrategyKind::Simplify {
                    // Keep partial progress recoverable before narrowing scope
                    self.checkpoints.preserve_wip(&context.task_id).await;
                }
                if let Some(wait) = decision.wait {
                    debug!("Backing off {:?} before re-running '{}'", wait, failed.phase);
                    tokio::time::sleep(wait).await;
                }
                pending_context = Some(decision.retry_context);
                continue 'groups; // same group again
            }

            let report = self
                .escalate(context, &failed.phase, &error_text, &attempts)
                .await;
            if required_failure.is_none() {
                escalation = Some(report);
                required_failure = Some((failed.phase.clone(), error_text));
            }
            if definition.fail_fast {
                break 'groups;
            }
            cursor += 1;
        }

        self.finish(definition, context, required_failure, bounce_failures, escalation)
            .await
    }

    async fn finish(
        &self,
        definition: &WorkflowDefinition,
        context: &ExecutionContext,
        required_failure: Option<(String, String)>,
        bounce_failures: u32,
        escalation: Option<EscalationReport>,
    ) -> Result<WorkflowOutcome> {
        let success = required_failure.is_none();
        let (failing_phase, error) = match required_failure {
            Some((phase, error)) => (Some(phase), Some(error)),
            None => (None, None),
        };

        let mut by_phase = context.take_results();
        let results: Vec<PhaseResult> = definition
            .phases
            .iter()
            .filter_map(|p| by_phase.remove(&p.name))
            .collect();

        let terminal_phase = failing_phase
            .clone()
            .or_else(|| results.last().map(|r| r.phase.clone()))
            .unwrap_or_else(|| definition.name.clone());
        let step = if success { STEP_COMPLETE } else { STEP_FAILED };
        let input = CheckpointInput {
            state: HashMap::from([
                ("workflow".to_string(), json!(definition.name)),
                ("test_retry_count".to_string(), json!(bounce_failures)),
            ]),
            modified_files: self.snapshot_files(context).await,
            note: error.clone(),
        };
        if let Err(e) = self
            .checkpoints
            .save(&context.task_id, &terminal_phase, step, success, input)
            .await
        {
            warn!("Failed to save terminal checkpoint: {e:#}");
        }

        if success {
            info!("Workflow '{}' completed for task {}", definition.name, context.task_id);
            self.tasks.mark_done(&context.task_id, &context.task).await;
        } else {
            let message = error.as_deref().unwrap_or("unknown error");
            warn!(
                "Workflow '{}' failed for task {} at phase {:?}: {}",
                definition.name, context.task_id, failing_phase, message
            );
            self.tasks
                .mark_failed(&context.task_id, &context.task, message)
                .await;
        }

        Ok(WorkflowOutcome {
            success,
            failing_phase,
            error,
            results,
            test_retry_count: bounce_failures,
            escalation,
        })
    }

    /// Run one phase: condition check, agent call(s), optional validation,
    /// and loop handling. Never returns an error; failures are data.
    async fn run_phase(
        &self,
        definition: &WorkflowDefinition,
        phase: &PhaseDefinition,
        context: &ExecutionContext,
        extra_context: Option<String>,
    ) -> PhaseResult {
        if !self.condition_met(&phase.condition, context).await {
            debug!("Condition unmet for phase '{}'; skipping", phase.name);
            return PhaseResult::skipped(&phase.name);
        }

        let started = Instant::now();
        let loop_cap = match phase.loop_mode {
            LoopMode::None => 1,
            _ => phase.loop_max,
        };
        let mut carried = extra_context;
        let mut iterations = 0u32;
        let mut response = AgentResponse::failed("phase never ran".to_string());
        let mut validation: Option<ValidationResult> = None;

        while iterations < loop_cap {
            iterations += 1;
            let mut prompt = context.render_prompt(&phase.prompt);
            if let Some(extra) = &carried {
                prompt.push_str("\n\n");
                prompt.push_str(extra);
            }

            debug!(
                "Phase '{}' iteration {}/{} (task {})",
                phase.name, iterations, loop_cap, context.task_id
            );
            response = self.invoke_agent(definition, phase, context, prompt).await;

            validation = match (response.success, &phase.tests) {
                (true, Some(tests)) => Some(self.run_tests(phase, tests, context).await),
                _ => None,
            };
            if let Some(v) = &validation {
                if !v.skipped_no_framework {
                    context.set_last_test_passed(v.success);
                }
            }

            let tests_passed = validation.as_ref().map_or(true, |v| v.success);
            let done = match phase.loop_mode {
                LoopMode::None => true,
                LoopMode::UntilSuccess => response.success,
                LoopMode::UntilTestsPass => response.success && tests_passed,
                LoopMode::FixedCount => false, // always runs out the cap
            };
            if done {
                break;
            }

            carried = Some(match (response.success, &validation) {
                (true, Some(v)) if !v.success => v.to_retry_context(),
                _ => retry_context_for_error(
                    response.error.as_deref().unwrap_or("no output"),
                ),
            });
        }

        let tests_passed = validation.as_ref().map_or(true, |v| v.success);
        let success = response.success && tests_passed;
        let error = if success {
            None
        } else if let Some(v) = validation.as_ref().filter(|v| !v.success) {
            Some(v.to_retry_context())
        } else {
            response.error.clone()
        };

        PhaseResult {
            phase: phase.name.clone(),
            success,
            skipped: false,
            output: response.output,
            error,
            duration: started.elapsed(),
            validation,
            iterations,
        }
    }

    /// Agent call with phase-local retries for transient failures. These
    /// retries are invisible to the workflow-level recovery loop.
    async fn invoke_agent(
        &self,
        definition: &WorkflowDefinition,
        phase: &PhaseDefinition,
        context: &ExecutionContext,
        prompt: String,
    ) -> AgentResponse {
        let max_retries = definition.max_retries_for(phase);
        let model = definition.model_for(phase);
        let timeout = definition.timeout_for(phase);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let request = AgentRequest {
                prompt: prompt.clone(),
                model: model.clone(),
                working_dir: context.working_dir.clone(),
                timeout,
            };
            let response = match self.agent.run(request).await {
                Ok(response) => response,
                Err(e) => AgentResponse::failed(e.to_string()),
            };
            if response.success || attempt > max_retries {
                return response;
            }

            let error = response.error.clone().unwrap_or_default();
            if classify_error(&error).class != ErrorClass::Retriable {
                return response;
            }
            let delay = backoff_delay(attempt);
            warn!(
                "Transient agent failure in phase '{}' (attempt {}): {}; retrying in {:?}",
                phase.name, attempt, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_tests(
        &self,
        phase: &PhaseDefinition,
        tests: &PhaseTests,
        context: &ExecutionContext,
    ) -> ValidationResult {
        let command = match tests {
            PhaseTests::Auto => TestCommand::Auto,
            PhaseTests::Command(cmd) => TestCommand::Explicit(cmd.clone()),
        };
        match self
            .validator
            .validate(&context.working_dir, &command, phase.test_timeout)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                // Validator errors (e.g. framework required but missing) are
                // failures of the phase, not of the engine.
                let mut result = ValidationResult::skipped();
                result.skipped_no_framework = false;
                result.success = false;
                result.stderr = format!("{e:#}");
                result
            }
        }
    }

    async fn condition_met(&self, condition: &PhaseCondition, context: &ExecutionContext) -> bool {
        match condition {
            PhaseCondition::Always => true,
            PhaseCondition::HasChanges => self.git.has_changes(&context.working_dir).await,
            PhaseCondition::TestsPassed => context.last_test_passed() == Some(true),
            PhaseCondition::TestsFailed => context.last_test_passed() == Some(false),
            PhaseCondition::FileExists(path) => context.working_dir.join(path).exists(),
            PhaseCondition::EnvSet(name) => {
                std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
            }
        }
    }

    async fn checkpoint_phase(&self, context: &ExecutionContext, result: &PhaseResult) {
        let step = if result.skipped {
            "skipped"
        } else if result.success {
            "phase complete"
        } else {
            "phase failed"
        };
        let mut state = HashMap::new();
        state.insert("iterations".to_string(), json!(result.iterations));
        if let Some(v) = &result.validation {
            state.insert("tests_passed".to_string(), json!(v.success));
        }
        let input = CheckpointInput {
            state,
            modified_files: self.snapshot_files(context).await,
            note: result.error.clone(),
        };
        if let Err(e) = self
            .checkpoints
            .save(&context.task_id, &result.phase, step, result.success, input)
            .await
        {
            warn!("Failed to checkpoint phase '{}': {e:#}", result.phase);
        }
    }

    async fn snapshot_files(&self, context: &ExecutionContext) -> Vec<String> {
        match self.git.status(&context.working_dir).await {
            Some(status) => status
                .modified_files
                .into_iter()
                .chain(status.untracked_files)
                .collect(),
            None => Vec::new(),
        }
    }

    async fn escalate(
        &self,
        context: &ExecutionContext,
        failing_phase: &str,
        error: &str,
        attempts: &[AttemptRecord],
    ) -> EscalationReport {
        let report = EscalationReport::new(&context.task_id, failing_phase, error, attempts.to_vec());
        warn!("{}", report.summary());
        let dir = context.working_dir.join(ESCALATION_DIR);
        match report.write_to(&dir).await {
            Ok(path) => info!("Escalation report written to {path:?}"),
            Err(e) => warn!("Failed to write escalation report: {e:#}"),
        }
        report
    }
}

fn is_required(definition: &WorkflowDefinition, phase: &str) -> bool {
    definition
        .phase_index(phase)
        .map(|i| definition.phases[i].required)
        .unwrap_or(true)
}

fn retry_context_for_error(error: &str) -> String {
    format!(
        "The previous attempt at this phase failed:\n{error}\n\n\
         Address the failure and complete the phase."
    )
}

/// Partition phase indices into ordered execution groups. Phases whose
/// `parallel_with` sets connect them (directly or transitively) share a
/// group; everything else runs alone. Groups keep declaration order by
/// their earliest member.
fn parallel_groups(definition: &WorkflowDefinition) -> Vec<Vec<usize>> {
    let n = definition.phases.len();
    let mut group_of: Vec<usize> = (0..n).collect();

    fn find(group_of: &mut Vec<usize>, i: usize) -> usize {
        let mut root = i;
        while group_of[root] != root {
            root = group_of[root];
        }
        let mut cur = i;
        while group_of[cur] != root {
            let next = group_of[cur];
            group_of[cur] = root;
            cur = next;
        }
        root
    }

    for (i, phase) in definition.phases.iter().enumerate() {
        for reference in &phase.parallel_with {
            if let Some(j) = definition.phase_index(reference) {
                let (a, b) = (find(&mut group_of, i), find(&mut group_of, j));
                if a != b {
                    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                    group_of[hi] = lo;
                }
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut placed: HashMap<usize, usize> = HashMap::new();
    for i in 0..n {
        let root = find(&mut group_of, i);
        match placed.get(&root) {
            Some(&slot) => groups[slot].push(i),
            None => {
                placed.insert(root, groups.len());
                groups.push(vec![i]);
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::super::phase::PhaseDefinition;
    use super::*;

    fn definition(phases: Vec<PhaseDefinition>) -> WorkflowDefinition {
        WorkflowDefinition::new("wf", phases).unwrap()
    }

    fn phase(name: &str) -> PhaseDefinition {
        PhaseDefinition::new(name, "prompt")
    }

    fn phase_parallel(name: &str, with: &[&str]) -> PhaseDefinition {
        let mut p = phase(name);
        p.parallel_with = with.iter().map(|s| s.to_string()).collect();
        p
    }

    #[test]
    fn test_groups_default_to_singletons() {
        let d = definition(vec![phase("a"), phase("b"), phase("c")]);
        assert_eq!(parallel_groups(&d), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_mutual_references_form_one_group() {
        let d = definition(vec![
            phase("setup"),
            phase_parallel("lint", &["typecheck"]),
            phase_parallel("typecheck", &["lint"]),
            phase("done"),
        ]);
        assert_eq!(parallel_groups(&d), vec![vec![0], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_one_sided_reference_still_groups() {
        let d = definition(vec![phase_parallel("a", &["b"]), phase("b")]);
        assert_eq!(parallel_groups(&d), vec![vec![0, 1]]);
    }

    #[test]
    fn test_transitive_references_merge() {
        let d = definition(vec![
            phase_parallel("a", &["b"]),
            phase_parallel("b", &["c"]),
            phase("c"),
        ]);
        assert_eq!(parallel_groups(&d), vec![vec![0, 1, 2]]);
    }
}
