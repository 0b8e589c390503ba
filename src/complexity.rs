//! Task complexity classification.
//!
//! Maps a task's text and metadata to a [`Complexity`] tier, which in turn
//! selects one of the built-in workflow profiles. Pure, total, and
//! deterministic: every input yields a tier, with no side effects.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Complexity tier controlling which phases run for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Minimal,
    Standard,
    Full,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Minimal => write!(f, "minimal"),
            Complexity::Standard => write!(f, "standard"),
            Complexity::Full => write!(f, "full"),
        }
    }
}

/// Metadata accompanying a task description.
#[derive(Debug, Clone, Default)]
pub struct TaskSignals<'a> {
    /// Priority tag, `p0` (most urgent) through `p3`.
    pub priority: Option<&'a str>,
    /// Free-form tags attached to the task.
    pub tags: &'a [String],
    /// Explicitly requested workflow name, if any.
    pub workflow: Option<&'a str>,
}

static FULL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(security|auth|authentication|authorization)\b",
        r"(?i)\b(architect|architecture|redesign|restructure)\b",
        r"(?i)\brefactor\b",
        r"(?i)\b(performance|optimi[sz]e|scalab)\w*",
        r"(?i)\bnew\s+(api|endpoint|service|database|schema|table)\b",
        r"(?i)\b(migration|migrate)\b",
        r"(?i)\b(critical|urgent|p0|blocker)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid full-signal pattern"))
    .collect()
});

static MINIMAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\btypo\b",
        r"(?i)\b(docs?|documentation|readme|comment)\b",
        r"(?i)\b(minor|small|trivial|quick)\s+(fix|change|tweak|update)\b",
        r"(?i)\b(bump|update)\s+(dependency|dependencies|version)\b",
        r"(?i)\bchore\b",
        r"(?i)\brename\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid minimal-signal pattern"))
    .collect()
});

/// Map an explicit workflow name to a tier. Unknown names fall through to the
/// remaining resolution steps.
fn workflow_override(name: &str) -> Option<Complexity> {
    match name.to_lowercase().as_str() {
        "simple" | "minimal" => Some(Complexity::Minimal),
        "standard" => Some(Complexity::Standard),
        "sdlc" | "full" => Some(Complexity::Full),
        _ => None,
    }
}

fn tag_override(tags: &[String]) -> Option<Complexity> {
    for tag in tags {
        match tag.to_lowercase().as_str() {
            "simple" | "minimal" => return Some(Complexity::Minimal),
            "sdlc" | "full" => return Some(Complexity::Full),
            _ => {}
        }
    }
    None
}

fn priority_override(priority: &str) -> Option<Complexity> {
    match priority.to_lowercase().as_str() {
        "p0" => Some(Complexity::Full),
        "p3" => Some(Complexity::Minimal),
        _ => None,
    }
}

/// Classify a task into a complexity tier.
///
/// Resolution order, first match wins: explicit workflow name, tag override,
/// priority override, full-signal patterns, minimal-signal patterns, and
/// finally the STANDARD default.
pub fn classify_complexity(text: &str, signals: &TaskSignals<'_>) -> Complexity {
    if let Some(tier) = signals.workflow.and_then(workflow_override) {
        tracing::debug!("Complexity {} from explicit workflow name", tier);
        return tier;
    }

    if let Some(tier) = tag_override(signals.tags) {
        tracing::debug!("Complexity {} from tag override", tier);
        return tier;
    }

    if let Some(tier) = signals.priority.and_then(priority_override) {
        tracing::debug!("Complexity {} from priority", tier);
        return tier;
    }

    if FULL_PATTERNS.iter().any(|re| re.is_match(text)) {
        return Complexity::Full;
    }

    if MINIMAL_PATTERNS.iter().any(|re| re.is_match(text)) {
        return Complexity::Minimal;
    }

    Complexity::Standard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Complexity {
        classify_complexity(text, &TaskSignals::default())
    }

    #[test]
    fn test_default_is_standard() {
        assert_eq!(classify("Add a helper for list pagination"), Complexity::Standard);
        assert_eq!(classify(""), Complexity::Standard);
    }

    #[test]
    fn test_full_signals() {
        assert_eq!(
            classify("Design and implement a new authentication subsystem"),
            Complexity::Full
        );
        assert_eq!(classify("Refactor the storage layer"), Complexity::Full);
        assert_eq!(classify("Fix critical performance regression"), Complexity::Full);
        assert_eq!(classify("Add new API endpoint for billing"), Complexity::Full);
    }

    #[test]
    fn test_minimal_signals() {
        assert_eq!(classify("Fix a typo in the README"), Complexity::Minimal);
        assert_eq!(classify("Small fix to the error message"), Complexity::Minimal);
        assert_eq!(classify("chore: bump dependency versions"), Complexity::Minimal);
    }

    #[test]
    fn test_full_beats_minimal_when_both_match() {
        // "refactor" (full signal) wins over "docs" (minimal signal)
        assert_eq!(classify("Refactor the docs generator"), Complexity::Full);
    }

    #[test]
    fn test_priority_overrides_text() {
        let signals = TaskSignals {
            priority: Some("p0"),
            ..Default::default()
        };
        assert_eq!(
            classify_complexity("Fix a typo in the README", &signals),
            Complexity::Full
        );

        let signals = TaskSignals {
            priority: Some("p3"),
            ..Default::default()
        };
        assert_eq!(
            classify_complexity("Design a new authentication subsystem", &signals),
            Complexity::Minimal
        );
    }

    #[test]
    fn test_tag_override_beats_priority() {
        let tags = vec!["sdlc".to_string()];
        let signals = TaskSignals {
            priority: Some("p3"),
            tags: &tags,
            ..Default::default()
        };
        assert_eq!(classify_complexity("anything", &signals), Complexity::Full);
    }

    #[test]
    fn test_workflow_name_wins_over_everything() {
        let tags = vec!["full".to_string()];
        let signals = TaskSignals {
            priority: Some("p0"),
            tags: &tags,
            workflow: Some("simple"),
        };
        assert_eq!(classify_complexity("critical security bug", &signals), Complexity::Minimal);
    }

    #[test]
    fn test_unknown_workflow_name_falls_through() {
        let signals = TaskSignals {
            workflow: Some("bespoke"),
            ..Default::default()
        };
        assert_eq!(
            classify_complexity("Fix a typo in the README", &signals),
            Complexity::Minimal
        );
    }

    #[test]
    fn test_deterministic() {
        let text = "Migrate the database schema";
        assert_eq!(classify(text), classify(text));
    }
}
