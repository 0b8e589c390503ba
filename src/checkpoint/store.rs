use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

use super::Checkpoint;
use crate::git::GitOps;

/// Which checkpoint a rollback should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// A specific checkpoint by id.
    Checkpoint(u64),
    /// The most recent successful checkpoint.
    LatestSuccessful,
}

/// Fields for one checkpoint save.
#[derive(Debug, Default)]
pub struct CheckpointInput {
    pub state: HashMap<String, Value>,
    pub modified_files: Vec<String>,
    pub note: Option<String>,
}

/// File-backed checkpoint store.
///
/// Checkpoints live under `<root>/<task_id>/<id>.json` where `id` is a
/// microsecond timestamp, so lexicographic filename order matches temporal
/// order. Writes go through a temp file and atomic rename.
pub struct CheckpointStore {
    root: PathBuf,
    working_dir: PathBuf,
    git: GitOps,
    // Guarantees save() never reuses an id within one process
    last_id: Mutex<u64>,
}

impl CheckpointStore {
    pub fn new(root: PathBuf, working_dir: PathBuf, git: GitOps) -> Self {
        Self {
            root,
            working_dir,
            git,
            last_id: Mutex::new(0),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id)
    }

    fn checkpoint_path(&self, task_id: &str, id: u64) -> PathBuf {
        self.task_dir(task_id).join(format!("{id:020}.json"))
    }

    fn next_id(&self) -> u64 {
        let now = Utc::now().timestamp_micros().max(0) as u64;
        let mut last = self.last_id.lock().unwrap();
        let id = now.max(*last + 1);
        *last = id;
        id
    }

    /// Save one immutable checkpoint, capturing the current git commit
    /// best-effort.
    pub async fn save(
        &self,
        task_id: &str,
        phase: &str,
        step: &str,
        success: bool,
        input: CheckpointInput,
    ) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            id: self.next_id(),
            task_id: task_id.to_string(),
            phase: phase.to_string(),
            step: step.to_string(),
            timestamp: Utc::now(),
            success,
            state: input.state,
            modified_files: input.modified_files,
            git_commit: self.git.head_commit(&self.working_dir).await,
            note: input.note,
        };

        let path = self.checkpoint_path(task_id, checkpoint.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create checkpoint directory")?;
        }

        let json = serde_json::to_string_pretty(&checkpoint)?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)
            .await
            .context("Failed to write checkpoint to temp file")?;
        fs::rename(&temp_path, &path)
            .await
            .context("Failed to move checkpoint to final location")?;

        info!(
            "Saved checkpoint {} for task {} ({}/{})",
            checkpoint.id, task_id, phase, step
        );

        Ok(checkpoint)
    }

    /// All checkpoints for a task, newest first.
    pub async fn list(&self, task_id: &str) -> Result<Vec<Checkpoint>> {
        let dir = self.task_dir(task_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut checkpoints = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Checkpoint>(&content) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => warn!("Skipping unreadable checkpoint {:?}: {}", path, e),
            }
        }

        // Ids tie-break equal timestamps; they are strictly monotonic
        checkpoints.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(checkpoints)
    }

    /// Most recent checkpoint, optionally restricted to successful ones.
    pub async fn latest(&self, task_id: &str, successful_only: bool) -> Result<Option<Checkpoint>> {
        let checkpoints = self.list(task_id).await?;
        Ok(checkpoints
            .into_iter()
            .find(|c| !successful_only || c.success))
    }

    /// Hard-reset the working tree to the commit recorded by the target
    /// checkpoint. Returns false when the target has no recorded commit or
    /// the reset itself fails.
    pub async fn rollback_to(&self, task_id: &str, target: RollbackTarget) -> Result<bool> {
        let checkpoint = match target {
            RollbackTarget::Checkpoint(id) => self
                .list(task_id)
                .await?
                .into_iter()
                .find(|c| c.id == id)
                .ok_or_else(|| anyhow!("No checkpoint {} for task {}", id, task_id))?,
            RollbackTarget::LatestSuccessful => self
                .latest(task_id, true)
                .await?
                .ok_or_else(|| anyhow!("No successful checkpoint for task {}", task_id))?,
        };

        let Some(commit) = checkpoint.git_commit else {
            warn!(
                "Checkpoint {} has no recorded commit; cannot roll back",
                checkpoint.id
            );
            return Ok(false);
        };

        debug!("Rolling back task {} to commit {}", task_id, commit);
        Ok(self.git.reset_hard(&self.working_dir, &commit).await)
    }

    /// Undo the entire task: reset to the parent of the earliest checkpoint's
    /// recorded commit.
    pub async fn rollback_all(&self, task_id: &str) -> Result<bool> {
        let checkpoints = self.list(task_id).await?;
        let Some(earliest) = checkpoints.last() else {
            return Ok(false);
        };

        let Some(commit) = &earliest.git_commit else {
            warn!("Earliest checkpoint has no recorded commit; cannot roll back");
            return Ok(false);
        };

        let Some(parent) = self.git.parent_commit(&self.working_dir, commit).await else {
            warn!("Commit {} has no resolvable parent; cannot roll back", commit);
            return Ok(false);
        };

        info!("Rolling back all of task {} to {}", task_id, parent);
        Ok(self.git.reset_hard(&self.working_dir, &parent).await)
    }

    /// Commit any uncommitted work before a risky retry.
    pub async fn preserve_wip(&self, task_id: &str) -> bool {
        self.git.commit_wip(&self.working_dir, task_id).await
    }

    /// Delete checkpoints older than `max_age`. Returns the number removed.
    pub async fn prune_older_than(
        &self,
        task_id: &str,
        max_age: std::time::Duration,
    ) -> Result<usize> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(max_age).context("Prune age out of range")?;
        let mut removed = 0;

        for checkpoint in self.list(task_id).await? {
            if checkpoint.timestamp < cutoff {
                let path = self.checkpoint_path(task_id, checkpoint.id);
                if fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!("Pruned {} aged checkpoints for task {}", removed, task_id);
        }
        Ok(removed)
    }

    /// Render a prompt-ready "where we left off" block from the latest
    /// checkpoint, for resuming an interrupted task.
    pub async fn resume_context(&self, task_id: &str) -> Result<Option<String>> {
        let Some(checkpoint) = self.latest(task_id, false).await? else {
            return Ok(None);
        };

        let mut block = format!(
            "Resuming task {task_id}. Last recorded step: {} (phase {}, {}).",
            checkpoint.step,
            checkpoint.phase,
            if checkpoint.success { "succeeded" } else { "failed" },
        );
        if !checkpoint.modified_files.is_empty() {
            block.push_str(&format!(
                "\nFiles touched so far: {}",
                checkpoint.modified_files.join(", ")
            ));
        }
        if let Some(note) = &checkpoint.note {
            block.push_str(&format!("\nNote: {note}"));
        }

        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::MockProcessRunner;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_with_git(dir: &TempDir, mock: &MockProcessRunner) -> CheckpointStore {
        CheckpointStore::new(
            dir.path().join("checkpoints"),
            dir.path().to_path_buf(),
            GitOps::new(Arc::new(mock.clone())),
        )
    }

    fn store_without_repo(dir: &TempDir) -> CheckpointStore {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .returns_stderr("fatal: not a git repository\n")
            .returns_exit_code(128)
            .finish();
        store_with_git(dir, &mock)
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);

        let mut state = HashMap::new();
        state.insert("iteration".to_string(), Value::from(2));
        let saved = store
            .save(
                "task-1",
                "implement",
                "wrote parser",
                true,
                CheckpointInput {
                    state,
                    modified_files: vec!["src/parser.rs".to_string()],
                    note: Some("second pass".to_string()),
                },
            )
            .await
            .unwrap();

        let listed = store.list("task-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], saved);
        assert_eq!(listed[0].state.get("iteration"), Some(&Value::from(2)));
        assert_eq!(listed[0].git_commit, None);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);

        for step in ["first", "second", "third"] {
            store
                .save("task-1", "plan", step, true, CheckpointInput::default())
                .await
                .unwrap();
        }

        let listed = store.list("task-1").await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].step, "third");
        assert_eq!(listed[2].step, "first");
        assert!(listed[0].timestamp >= listed[1].timestamp);
        assert!(listed[1].timestamp >= listed[2].timestamp);
    }

    #[tokio::test]
    async fn test_latest_successful_only() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);

        store
            .save("task-1", "implement", "good step", true, CheckpointInput::default())
            .await
            .unwrap();
        store
            .save("task-1", "test", "bad step", false, CheckpointInput::default())
            .await
            .unwrap();

        let latest = store.latest("task-1", false).await.unwrap().unwrap();
        assert_eq!(latest.step, "bad step");

        let latest_ok = store.latest("task-1", true).await.unwrap().unwrap();
        assert!(latest_ok.success);
        assert_eq!(latest_ok.step, "good step");
    }

    #[tokio::test]
    async fn test_ids_are_strictly_monotonic() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);

        let a = store
            .save("task-1", "plan", "a", true, CheckpointInput::default())
            .await
            .unwrap();
        let b = store
            .save("task-1", "plan", "b", true, CheckpointInput::default())
            .await
            .unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn test_rollback_to_latest_successful() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|args| args == ["rev-parse", "--short", "HEAD"])
            .returns_stdout("abc1234\n")
            .returns_success()
            .finish();
        mock.expect_command("git")
            .with_args(|args| args == ["reset", "--hard", "abc1234"])
            .returns_success()
            .finish();

        let store = store_with_git(&dir, &mock);
        store
            .save("task-1", "implement", "step", true, CheckpointInput::default())
            .await
            .unwrap();

        let ok = store
            .rollback_to("task-1", RollbackTarget::LatestSuccessful)
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_rollback_all_targets_parent_of_earliest() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("git")
            .with_args(|args| args == ["rev-parse", "--short", "HEAD"])
            .returns_stdout("abc1234\n")
            .returns_success()
            .finish();
        mock.expect_command("git")
            .with_args(|args| args == ["rev-parse", "--short", "abc1234^"])
            .returns_stdout("9876fed\n")
            .returns_success()
            .finish();
        mock.expect_command("git")
            .with_args(|args| args == ["reset", "--hard", "9876fed"])
            .returns_success()
            .finish();

        let store = store_with_git(&dir, &mock);
        store
            .save("task-1", "plan", "first", true, CheckpointInput::default())
            .await
            .unwrap();
        store
            .save("task-1", "implement", "second", true, CheckpointInput::default())
            .await
            .unwrap();

        let ok = store.rollback_all("task-1").await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_rollback_without_commit_degrades_to_false() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);
        store
            .save("task-1", "plan", "step", true, CheckpointInput::default())
            .await
            .unwrap();

        let ok = store
            .rollback_to("task-1", RollbackTarget::LatestSuccessful)
            .await
            .unwrap();
        assert!(!ok);
        assert!(!store.rollback_all("task-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_removes_aged_checkpoints() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);
        store
            .save("task-1", "plan", "recent", true, CheckpointInput::default())
            .await
            .unwrap();

        // Nothing is older than an hour
        let removed = store
            .prune_older_than("task-1", std::time::Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        // Everything is older than zero seconds
        let removed = store
            .prune_older_than("task-1", std::time::Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.list("task-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_context() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);

        assert!(store.resume_context("task-1").await.unwrap().is_none());

        store
            .save(
                "task-1",
                "implement",
                "halfway through parser",
                false,
                CheckpointInput {
                    modified_files: vec!["src/parser.rs".to_string()],
                    note: Some("tokenizer done".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let context = store.resume_context("task-1").await.unwrap().unwrap();
        assert!(context.contains("halfway through parser"));
        assert!(context.contains("src/parser.rs"));
        assert!(context.contains("tokenizer done"));
        assert!(context.contains("failed"));
    }

    #[tokio::test]
    async fn test_list_unknown_task_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_without_repo(&dir);
        assert!(store.list("no-such-task").await.unwrap().is_empty());
    }
}
