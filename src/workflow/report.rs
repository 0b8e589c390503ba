//! Escalation reporting.
//!
//! When recovery gives up, the engine hands the operator a structured report
//! of everything it tried, written to disk alongside the checkpoints.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// One failed attempt at a phase, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub phase: String,
    pub error: String,
    /// Recovery strategy applied after this attempt.
    pub strategy: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

/// Everything an operator needs to pick up where the engine stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationReport {
    pub correlation_id: Uuid,
    pub task_id: String,
    pub failing_phase: String,
    pub error: String,
    pub attempts: Vec<AttemptRecord>,
    pub created_at: DateTime<Utc>,
}

impl EscalationReport {
    pub fn new(task_id: &str, failing_phase: &str, error: &str, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            failing_phase: failing_phase.to_string(),
            error: error.to_string(),
            attempts,
            created_at: Utc::now(),
        }
    }

    /// Write the report as pretty JSON under `dir`, returning its path.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create report directory {dir:?}"))?;
        let path = dir.join(format!("escalation-{}.json", self.correlation_id));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report {path:?}"))?;
        Ok(path)
    }

    /// Human-readable summary for logs.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Escalation for task {} at phase '{}' after {} attempt(s): {}",
            self.task_id,
            self.failing_phase,
            self.attempts.len(),
            self.error
        )];
        for record in &self.attempts {
            lines.push(format!(
                "  attempt {}: {} -> {} ({}s)",
                record.attempt,
                record.error,
                record.strategy,
                record.duration.as_secs()
            ));
        }
        lines.join("\n")
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs_f64(f64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(attempt: u32, strategy: &str) -> AttemptRecord {
        AttemptRecord {
            attempt,
            phase: "implement".to_string(),
            error: "3 tests failed".to_string(),
            strategy: strategy.to_string(),
            duration: Duration::from_secs(12),
        }
    }

    #[tokio::test]
    async fn test_report_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let report = EscalationReport::new(
            "task-7",
            "test",
            "tests failed after 3 attempts",
            vec![record(1, "fix"), record(2, "fix"), record(3, "simplify")],
        );

        let path = report.write_to(dir.path()).await.unwrap();
        let loaded: EscalationReport =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();

        assert_eq!(loaded.correlation_id, report.correlation_id);
        assert_eq!(loaded.attempts.len(), 3);
        assert_eq!(loaded.attempts[2].strategy, "simplify");
    }

    #[test]
    fn test_summary_names_each_attempt() {
        let report = EscalationReport::new("task-7", "test", "boom", vec![record(1, "retry")]);
        let summary = report.summary();
        assert!(summary.contains("phase 'test'"));
        assert!(summary.contains("attempt 1"));
        assert!(summary.contains("retry"));
    }
}
