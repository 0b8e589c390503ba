use std::time::Duration;

use crate::classify::ErrorClassification;

const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Exponential backoff for retry attempt `attempt` (1-based), capped at
/// [`BACKOFF_MAX`].
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(exp))
        .min(BACKOFF_MAX)
}

/// The four recovery strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Retry,
    Fix,
    Simplify,
    Escalate,
}

impl StrategyKind {
    pub fn strategy(self) -> &'static dyn RecoveryStrategy {
        match self {
            StrategyKind::Retry => &RetryStrategy,
            StrategyKind::Fix => &FixStrategy,
            StrategyKind::Simplify => &SimplifyStrategy,
            StrategyKind::Escalate => &EscalateStrategy,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Retry => write!(f, "retry"),
            StrategyKind::Fix => write!(f, "fix"),
            StrategyKind::Simplify => write!(f, "simplify"),
            StrategyKind::Escalate => write!(f, "escalate"),
        }
    }
}

/// A recovery strategy renders the retry context injected into the next
/// attempt's prompt and decides whether and when to continue.
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_continue(&self) -> bool;

    /// Delay before the next attempt, if the strategy wants one.
    fn wait(&self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn retry_context(
        &self,
        error_text: &str,
        classification: &ErrorClassification,
        attempt: u32,
    ) -> String;
}

pub struct RetryStrategy;

impl RecoveryStrategy for RetryStrategy {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn should_continue(&self) -> bool {
        true
    }

    fn wait(&self, attempt: u32) -> Option<Duration> {
        Some(backoff_delay(attempt))
    }

    fn retry_context(
        &self,
        error_text: &str,
        classification: &ErrorClassification,
        attempt: u32,
    ) -> String {
        format!(
            "Previous attempt {attempt} hit a transient failure ({}):\n{}\n\
             Retry the same approach; the failure was environmental, not a code problem.",
            classification.reason,
            error_text.trim()
        )
    }
}

pub struct FixStrategy;

impl RecoveryStrategy for FixStrategy {
    fn name(&self) -> &'static str {
        "fix"
    }

    fn should_continue(&self) -> bool {
        true
    }

    fn retry_context(
        &self,
        error_text: &str,
        classification: &ErrorClassification,
        attempt: u32,
    ) -> String {
        format!(
            "Attempt {attempt} failed ({}):\n{}\n\
             Suggested action: {}.\n\
             Address the failure above, trying an alternative approach if the previous one \
             cannot be repaired.",
            classification.reason,
            error_text.trim(),
            classification.suggested_action
        )
    }
}

pub struct SimplifyStrategy;

impl RecoveryStrategy for SimplifyStrategy {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn should_continue(&self) -> bool {
        true
    }

    fn retry_context(
        &self,
        error_text: &str,
        classification: &ErrorClassification,
        attempt: u32,
    ) -> String {
        format!(
            "Attempt {attempt} failed and this is the last allowed attempt ({}):\n{}\n\
             Simplify: implement the smallest change that satisfies the core requirement. \
             Defer edge cases, cleanups, and optional work.",
            classification.reason,
            error_text.trim()
        )
    }
}

pub struct EscalateStrategy;

impl RecoveryStrategy for EscalateStrategy {
    fn name(&self) -> &'static str {
        "escalate"
    }

    fn should_continue(&self) -> bool {
        false
    }

    fn retry_context(
        &self,
        error_text: &str,
        classification: &ErrorClassification,
        _attempt: u32,
    ) -> String {
        format!(
            "Automated recovery exhausted ({}). Human attention required.\nLast error:\n{}",
            classification.reason,
            error_text.trim()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(6), Duration::from_secs(60));
        assert_eq!(backoff_delay(100), Duration::from_secs(60));
    }

    #[test]
    fn test_only_escalate_halts() {
        assert!(StrategyKind::Retry.strategy().should_continue());
        assert!(StrategyKind::Fix.strategy().should_continue());
        assert!(StrategyKind::Simplify.strategy().should_continue());
        assert!(!StrategyKind::Escalate.strategy().should_continue());
    }

    #[test]
    fn test_only_retry_waits() {
        assert!(StrategyKind::Retry.strategy().wait(1).is_some());
        assert!(StrategyKind::Fix.strategy().wait(1).is_none());
        assert!(StrategyKind::Simplify.strategy().wait(1).is_none());
        assert!(StrategyKind::Escalate.strategy().wait(1).is_none());
    }
}
