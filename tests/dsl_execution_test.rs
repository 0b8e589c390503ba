//! Running a DSL-defined workflow through the executor.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use maestro::checkpoint::CheckpointStore;
use maestro::subprocess::{ExitStatus, ProcessOutput, SubprocessManager};
use maestro::testing::{MockAgentExecutor, RecordingTaskStore, ScriptedProcessRunner};
use maestro::validation::TestValidator;
use maestro::workflow::{parse_workflow, ExecutionContext, WorkflowExecutor};

mod common;

const WORKFLOW: &str = r#"
name: ship-it
description: Implement with custom tests, then conditionally document
default_model: sonnet
max_test_retries: 2
bounce_to: implement
phases:
  - name: implement
    prompt: "Implement {task}"
    tests: "cargo test --lib"
  - name: document
    prompt: "Document {task}"
    required: false
    condition: file_exists:README.md
"#;

struct Harness {
    _tmp: TempDir,
    agent: MockAgentExecutor,
    tests: ScriptedProcessRunner,
    tasks: RecordingTaskStore,
    executor: WorkflowExecutor,
    workdir: PathBuf,
}

fn harness() -> Harness {
    common::init_logging();
    let tmp = TempDir::new().unwrap();
    let workdir = tmp.path().join("project");
    fs::create_dir_all(&workdir).unwrap();

    let agent = MockAgentExecutor::new();
    let tests = ScriptedProcessRunner::new();
    let tasks = RecordingTaskStore::new();
    let processes = SubprocessManager::new(Arc::new(ScriptedProcessRunner::new()));
    let git = processes.git();
    let checkpoints = Arc::new(CheckpointStore::new(
        tmp.path().join("checkpoints"),
        workdir.clone(),
        git.clone(),
    ));
    let executor = WorkflowExecutor::new(
        Arc::new(agent.clone()),
        TestValidator::new(Arc::new(tests.clone())),
        checkpoints,
        Arc::new(tasks.clone()),
        git,
    );

    Harness {
        _tmp: tmp,
        agent,
        tests,
        tasks,
        executor,
        workdir,
    }
}

fn passing_tests() -> ProcessOutput {
    ProcessOutput {
        status: ExitStatus::Success,
        stdout: "test result: ok. 4 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out\n"
            .to_string(),
        stderr: String::new(),
        duration: Duration::from_millis(30),
    }
}

fn failing_tests() -> ProcessOutput {
    ProcessOutput {
        status: ExitStatus::Error(101),
        stdout: "test state::tests::save_round_trip ... FAILED\n\
                 test result: FAILED. 3 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out\n"
            .to_string(),
        stderr: String::new(),
        duration: Duration::from_millis(30),
    }
}

#[tokio::test]
async fn dsl_workflow_runs_explicit_test_command_and_condition() {
    let h = harness();
    fs::write(h.workdir.join("README.md"), "# project\n").unwrap();
    h.tests.fallback(passing_tests());

    let definition = parse_workflow(WORKFLOW).unwrap();
    let ctx = ExecutionContext::new("add a config flag", "task-dsl", &h.workdir);
    let outcome = h.executor.run(&definition, &ctx).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.results.len(), 2);
    assert!(!outcome.results[1].skipped);
    assert!(h.tasks.marked_done("task-dsl"));

    // The explicit command reaches the shell verbatim
    let calls = h.tests.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, vec!["-c", "cargo test --lib"]);
}

#[tokio::test]
async fn dsl_workflow_skips_conditional_phase_when_file_missing() {
    let h = harness();
    h.tests.fallback(passing_tests());

    let definition = parse_workflow(WORKFLOW).unwrap();
    let ctx = ExecutionContext::new("add a config flag", "task-dsl2", &h.workdir);
    let outcome = h.executor.run(&definition, &ctx).await.unwrap();

    assert!(outcome.success);
    assert!(outcome.results[1].skipped);
    assert_eq!(h.agent.call_count(), 1);
}

#[tokio::test]
async fn dsl_workflow_honors_custom_bounce_budget() {
    let h = harness();
    h.tests
        .queue_output(failing_tests())
        .queue_output(failing_tests())
        .fallback(passing_tests());

    let definition = parse_workflow(WORKFLOW).unwrap();
    assert_eq!(definition.max_test_retries, 2);

    let ctx = ExecutionContext::new("add a config flag", "task-dsl3", &h.workdir);
    let outcome = h.executor.run(&definition, &ctx).await.unwrap();

    // Two allowed attempts, both failed: escalate without a third run
    assert!(!outcome.success);
    assert_eq!(outcome.test_retry_count, 2);
    assert_eq!(h.agent.call_count(), 2);
    let report = outcome.escalation.expect("escalation report");
    assert_eq!(report.attempts.len(), 2);
    assert!(h.tasks.marked_failed("task-dsl3"));
}
