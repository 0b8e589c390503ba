//! Git collaborator for checkpoint capture and rollback.
//!
//! All operations shell out through the [`ProcessRunner`] abstraction and
//! degrade gracefully: a missing repository or a failed git call yields
//! `None`/`false`, never an error, because checkpointing must not take a
//! workflow down with it.

use std::path::Path;
use std::sync::Arc;

use crate::subprocess::{ProcessCommandBuilder, ProcessOutput, ProcessRunner};

#[derive(Debug, Clone)]
pub struct GitStatus {
    pub clean: bool,
    pub untracked_files: Vec<String>,
    pub modified_files: Vec<String>,
}

/// Parse a git status untracked file line (format: "?? filename")
#[inline]
fn parse_untracked_line(line: &str) -> Option<String> {
    line.strip_prefix("?? ").map(|file| file.to_string())
}

/// Parse a git status modified file line (any status code except untracked)
#[inline]
fn parse_modified_line(line: &str) -> Option<String> {
    if line.len() > 3 {
        Some(line[3..].to_string())
    } else {
        None
    }
}

/// Parse git status --porcelain output into (untracked, modified) file lists.
/// Pure function, no I/O.
fn parse_porcelain_output(output: &str) -> (Vec<String>, Vec<String>) {
    let mut untracked_files = Vec::new();
    let mut modified_files = Vec::new();

    for line in output.lines() {
        if let Some(file) = parse_untracked_line(line) {
            untracked_files.push(file);
            continue;
        }
        if let Some(file) = parse_modified_line(line) {
            modified_files.push(file);
        }
    }

    (untracked_files, modified_files)
}

#[derive(Clone)]
pub struct GitOps {
    runner: Arc<dyn ProcessRunner>,
}

impl GitOps {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Option<ProcessOutput> {
        let result = self
            .runner
            .run(
                ProcessCommandBuilder::new("git")
                    .args(args)
                    .current_dir(dir)
                    .build(),
            )
            .await;

        match result {
            Ok(output) if output.status.success() => Some(output),
            Ok(output) => {
                tracing::debug!(
                    "git {} failed with {:?}: {}",
                    args.join(" "),
                    output.status,
                    output.stderr.trim()
                );
                None
            }
            Err(e) => {
                tracing::debug!("git {} could not run: {}", args.join(" "), e);
                None
            }
        }
    }

    /// Short hash of HEAD, or `None` outside a git repository.
    pub async fn head_commit(&self, dir: &Path) -> Option<String> {
        self.git(dir, &["rev-parse", "--short", "HEAD"])
            .await
            .map(|out| out.stdout.trim().to_string())
            .filter(|hash| !hash.is_empty())
    }

    /// Short hash of the parent of the given commit.
    pub async fn parent_commit(&self, dir: &Path, commit: &str) -> Option<String> {
        let spec = format!("{commit}^");
        self.git(dir, &["rev-parse", "--short", &spec])
            .await
            .map(|out| out.stdout.trim().to_string())
            .filter(|hash| !hash.is_empty())
    }

    pub async fn status(&self, dir: &Path) -> Option<GitStatus> {
        let output = self.git(dir, &["status", "--porcelain"]).await?;
        let (untracked_files, modified_files) = parse_porcelain_output(&output.stdout);

        Some(GitStatus {
            clean: untracked_files.is_empty() && modified_files.is_empty(),
            untracked_files,
            modified_files,
        })
    }

    /// Whether the working tree has uncommitted changes. Outside a repository
    /// this is `false`.
    pub async fn has_changes(&self, dir: &Path) -> bool {
        self.status(dir).await.is_some_and(|s| !s.clean)
    }

    /// Hard-reset the working tree to the given commit. Returns success.
    pub async fn reset_hard(&self, dir: &Path, commit: &str) -> bool {
        self.git(dir, &["reset", "--hard", commit]).await.is_some()
    }

    /// Stage everything and commit any uncommitted work under a `[WIP]`
    /// message tagged with the task id. Returns true if a commit was made.
    pub async fn commit_wip(&self, dir: &Path, task_id: &str) -> bool {
        if !self.has_changes(dir).await {
            return false;
        }

        if self.git(dir, &["add", "-A"]).await.is_none() {
            return false;
        }

        let message = format!("[WIP] {task_id}: preserve partial progress");
        let committed = self.git(dir, &["commit", "-m", &message]).await.is_some();
        if committed {
            tracing::info!("Committed WIP changes for task {}", task_id);
        }
        committed
    }
}
