//! Pattern-based error classification.
//!
//! Turns raw error text from agent calls, test runs, and subprocesses into a
//! structured [`ErrorClassification`] used by the recovery strategy selector.
//! Pure and total: every input, including empty text, yields a classification.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Broad class of a failure, driving recovery strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient failures worth retrying as-is (network, rate limits, timeouts).
    Retriable,
    /// Code-level bugs the agent can be asked to fix (test/build/lint failures).
    Fixable,
    /// Environmental or configuration problems requiring human attention.
    Fatal,
    /// Nothing matched.
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Retriable => write!(f, "retriable"),
            ErrorClass::Fixable => write!(f, "fixable"),
            ErrorClass::Fatal => write!(f, "fatal"),
            ErrorClass::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub class: ErrorClass,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub reason: String,
    pub suggested_action: String,
}

struct ErrorPattern {
    regex: Regex,
    reason: &'static str,
    suggested_action: &'static str,
    confidence: f64,
}

fn pattern(
    regex: &str,
    reason: &'static str,
    suggested_action: &'static str,
    confidence: f64,
) -> ErrorPattern {
    ErrorPattern {
        regex: Regex::new(regex).expect("invalid error pattern"),
        reason,
        suggested_action,
        confidence,
    }
}

// Patterns match against lowercased text. Table order matters only for
// tie-breaking: FATAL is consulted first, then RETRIABLE, then FIXABLE.
static FATAL_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        pattern(
            r"permission denied|not authorized|unauthorized|forbidden",
            "Permission or authorization problem",
            "Check credentials and filesystem permissions",
            0.9,
        ),
        pattern(
            r"command not found|no such file or directory",
            "Missing command or file",
            "Verify required tools are installed and paths are correct",
            0.85,
        ),
        pattern(
            r"missing (required )?(config|configuration|environment|env var)",
            "Missing configuration",
            "Provide the missing configuration before retrying",
            0.85,
        ),
        pattern(
            r"disk full|no space left|out of memory|resource exhausted",
            "Resource exhaustion",
            "Free up resources on the host",
            0.95,
        ),
        pattern(
            r"merge conflict|detached head|uncommitted changes|dirty working tree",
            "Git state problem",
            "Resolve repository state manually",
            0.85,
        ),
        pattern(
            r"authentication failed|invalid (api )?key|token expired",
            "Authentication failure",
            "Re-authenticate the agent CLI",
            0.9,
        ),
        pattern(
            r"unsupported version|incompatible dependency|dependency conflict",
            "Dependency or version problem",
            "Fix the dependency environment",
            0.8,
        ),
    ]
});

static RETRIABLE_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        pattern(
            r"rate limit|too many requests|429",
            "API rate limit hit",
            "Wait and retry with backoff",
            0.95,
        ),
        pattern(
            r"timed? ?out|deadline exceeded",
            "Operation timed out",
            "Retry; consider a longer timeout",
            0.9,
        ),
        pattern(
            r"connection (refused|reset|closed)|network (error|unreachable)|broken pipe",
            "Network failure",
            "Retry once connectivity recovers",
            0.9,
        ),
        pattern(
            r"service unavailable|bad gateway|50[234]|temporar(y|ily) (failure|unavailable)",
            "Transient service failure",
            "Retry after a short delay",
            0.85,
        ),
        pattern(
            r"overloaded|capacity",
            "Service overloaded",
            "Retry with backoff",
            0.7,
        ),
    ]
});

static FIXABLE_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        pattern(
            r"test(s)? failed|assertion (failed|error)|\bfailures?:",
            "Test failures",
            "Fix the failing tests",
            0.9,
        ),
        pattern(
            r"syntax error|parse error|unexpected token",
            "Syntax error",
            "Correct the syntax error",
            0.9,
        ),
        pattern(
            r"type (error|mismatch)|mismatched types|cannot borrow|borrow checker",
            "Type error",
            "Fix the type error",
            0.85,
        ),
        pattern(
            r"(import|module) (error|not found)|unresolved import|undefined (symbol|reference|variable)",
            "Unresolved reference",
            "Fix imports or declarations",
            0.85,
        ),
        pattern(
            r"(compilation|build) (error|failed)|error\[e\d+\]",
            "Build failure",
            "Fix the compile errors",
            0.85,
        ),
        pattern(
            r"lint (error|failure)|clippy|warning treated as error",
            "Lint failure",
            "Address the lint findings",
            0.75,
        ),
    ]
});

const UNKNOWN_ACTION: &str = "Inspect the error and decide manually";

/// Classify an error string.
///
/// All three pattern tables are evaluated against the lowercased text; the
/// single highest-confidence match wins, with ties broken by table precedence
/// (fatal, retriable, fixable). Unmatched text yields UNKNOWN at 0.5; empty
/// text yields UNKNOWN at 0.0.
pub fn classify_error(text: &str) -> ErrorClassification {
    if text.trim().is_empty() {
        return ErrorClassification {
            class: ErrorClass::Unknown,
            confidence: 0.0,
            reason: "Empty error text".to_string(),
            suggested_action: UNKNOWN_ACTION.to_string(),
        };
    }

    let lowered = text.to_lowercase();

    let tables: [(&Lazy<Vec<ErrorPattern>>, ErrorClass); 3] = [
        (&FATAL_PATTERNS, ErrorClass::Fatal),
        (&RETRIABLE_PATTERNS, ErrorClass::Retriable),
        (&FIXABLE_PATTERNS, ErrorClass::Fixable),
    ];

    let mut best: Option<ErrorClassification> = None;
    for (table, class) in tables {
        for entry in table.iter() {
            if !entry.regex.is_match(&lowered) {
                continue;
            }
            // Strictly-greater keeps the earlier table on ties
            let better = best
                .as_ref()
                .map(|b| entry.confidence > b.confidence)
                .unwrap_or(true);
            if better {
                best = Some(ErrorClassification {
                    class,
                    confidence: entry.confidence,
                    reason: entry.reason.to_string(),
                    suggested_action: entry.suggested_action.to_string(),
                });
            }
        }
    }

    best.unwrap_or_else(|| ErrorClassification {
        class: ErrorClass::Unknown,
        confidence: 0.5,
        reason: "Unrecognized error".to_string(),
        suggested_action: UNKNOWN_ACTION.to_string(),
    })
}
