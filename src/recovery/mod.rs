//! Recovery strategy selection.
//!
//! Maps a classified failure and the current attempt number to one of four
//! strategies: Retry (same approach, with backoff), Fix (corrective context),
//! Simplify (narrow scope on the last allowed attempt), or Escalate (halt for
//! human attention).

mod strategies;

pub use strategies::{backoff_delay, RecoveryStrategy, StrategyKind};

use std::sync::Arc;
use std::time::Duration;

use crate::classify::{classify_error, ErrorClass, ErrorClassification};

/// Callback invoked when a failure escalates past automated recovery.
pub type EscalationHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// The outcome of strategy selection for one failed attempt.
#[derive(Debug, Clone)]
pub struct RecoveryDecision {
    pub kind: StrategyKind,
    /// Whether the workflow should attempt the phase again.
    pub should_continue: bool,
    /// Delay to wait before the next attempt, if any.
    pub wait: Option<Duration>,
    /// Prompt-ready context describing the failure and the chosen approach.
    pub retry_context: String,
    /// Classification that drove the decision.
    pub classification: ErrorClassification,
}

/// Selects recovery strategies, optionally notifying on escalation.
#[derive(Clone, Default)]
pub struct RecoverySelector {
    on_escalate: Option<EscalationHook>,
}

impl RecoverySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escalation_hook(mut self, hook: EscalationHook) -> Self {
        self.on_escalate = Some(hook);
        self
    }

    /// Select a strategy for the given failure.
    ///
    /// `attempt` is 1-based. Past `max_attempts` the only option is
    /// escalation; on the final allowed attempt the scope is narrowed
    /// (Simplify); otherwise the error classification decides.
    pub fn select(&self, error_text: &str, attempt: u32, max_attempts: u32) -> RecoveryDecision {
        let classification = classify_error(error_text);

        let kind = if attempt > max_attempts {
            StrategyKind::Escalate
        } else if attempt == max_attempts {
            StrategyKind::Simplify
        } else {
            match classification.class {
                ErrorClass::Retriable => StrategyKind::Retry,
                ErrorClass::Fixable => StrategyKind::Fix,
                ErrorClass::Fatal => StrategyKind::Escalate,
                ErrorClass::Unknown => {
                    if attempt <= 2 {
                        StrategyKind::Fix
                    } else {
                        StrategyKind::Simplify
                    }
                }
            }
        };

        let strategy = kind.strategy();
        let decision = RecoveryDecision {
            kind,
            should_continue: strategy.should_continue(),
            wait: strategy.wait(attempt),
            retry_context: strategy.retry_context(error_text, &classification, attempt),
            classification,
        };

        tracing::debug!(
            "Recovery attempt {}/{}: {} ({})",
            attempt,
            max_attempts,
            decision.kind,
            decision.classification.class
        );

        if decision.kind == StrategyKind::Escalate {
            if let Some(hook) = &self.on_escalate {
                hook(error_text, &decision.classification.reason);
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_attempt_past_max_escalates() {
        let selector = RecoverySelector::new();
        let decision = selector.select("rate limit exceeded", 4, 3);
        assert_eq!(decision.kind, StrategyKind::Escalate);
        assert!(!decision.should_continue);
    }

    #[test]
    fn test_final_attempt_simplifies() {
        let selector = RecoverySelector::new();
        let decision = selector.select("rate limit exceeded", 3, 3);
        assert_eq!(decision.kind, StrategyKind::Simplify);
        assert!(decision.should_continue);
        assert!(decision.retry_context.contains("Simplify"));
        assert!(decision.retry_context.contains("smallest change"));
    }

    #[test]
    fn test_retriable_retries_with_backoff() {
        let selector = RecoverySelector::new();
        let decision = selector.select("connection refused", 1, 3);
        assert_eq!(decision.kind, StrategyKind::Retry);
        assert!(decision.should_continue);
        assert!(decision.wait.is_some());
    }

    #[test]
    fn test_fixable_maps_to_fix() {
        let selector = RecoverySelector::new();
        let decision = selector.select("2 tests failed", 1, 3);
        assert_eq!(decision.kind, StrategyKind::Fix);
        assert!(decision.should_continue);
        assert!(decision.wait.is_none());
    }

    #[test]
    fn test_fatal_escalates_immediately() {
        let selector = RecoverySelector::new();
        let decision = selector.select("permission denied", 1, 5);
        assert_eq!(decision.kind, StrategyKind::Escalate);
        assert!(!decision.should_continue);
    }

    #[test]
    fn test_unknown_fixes_early_simplifies_later() {
        let selector = RecoverySelector::new();
        assert_eq!(selector.select("mystery failure", 1, 5).kind, StrategyKind::Fix);
        assert_eq!(selector.select("mystery failure", 2, 5).kind, StrategyKind::Fix);
        assert_eq!(selector.select("mystery failure", 3, 5).kind, StrategyKind::Simplify);
    }

    #[test]
    fn test_escalation_hook_fires() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let selector = RecoverySelector::new().with_escalation_hook(Arc::new(|_, _| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }));

        selector.select("permission denied", 1, 3);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        // Non-escalating decisions do not notify
        selector.select("rate limit", 1, 3);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_context_mentions_error() {
        let selector = RecoverySelector::new();
        let decision = selector.select("connection refused by host", 1, 3);
        assert!(decision.retry_context.contains("connection refused by host"));
    }
}
