//! Framework-specific output parsers.
//!
//! Each parser extracts pass/fail/skip/error counts and named failures from
//! a framework's stdout/stderr. Counts fall back to exit-code-only results
//! when the output does not match the expected shape.

use once_cell::sync::Lazy;
use regex::Regex;

use super::detect::TestFramework;
use super::TestFailure;

#[derive(Debug, Default, Clone)]
pub(crate) struct ParsedCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: u32,
    pub failures: Vec<TestFailure>,
    /// Whether the output matched the framework's summary shape at all.
    pub recognized: bool,
}

// cargo test: "test result: ok. 5 passed; 1 failed; 2 ignored; ..."
static CARGO_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored")
        .expect("invalid cargo summary pattern")
});
static CARGO_FAILURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^test (\S+) \.\.\. FAILED$").expect("invalid cargo failure pattern"));
static CARGO_PANIC_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"panicked at ([^:\s]+\.rs):(\d+)").expect("invalid cargo panic pattern")
});

// pytest: "== 3 failed, 5 passed, 1 skipped, 2 errors in 0.5s =="
static PYTEST_PIECE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) (passed|failed|skipped|error(?:s)?)").expect("invalid pytest pattern"));
static PYTEST_SUMMARY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^=+ .*(passed|failed|error|skipped).* =+$").expect("invalid pytest summary"));
static PYTEST_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^FAILED ([^:\s]+)::(\S+)").expect("invalid pytest failure pattern")
});

// jest: "Tests:       1 failed, 5 passed, 6 total"
static JEST_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Tests:\s+(.+)").expect("invalid jest summary pattern"));
static JEST_PIECE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) (failed|passed|skipped|todo)").expect("invalid jest piece pattern"));
static JEST_FAILURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s+[✕x✗] (.+?)(?:\s+\(\d+ ?ms\))?$").expect("invalid jest failure"));

// go test: "--- FAIL: TestName (0.00s)" plus "ok"/"FAIL" package lines
static GO_FAILURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- FAIL: (\S+)").expect("invalid go failure pattern"));
static GO_PASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- PASS: (\S+)").expect("invalid go pass pattern"));
static GO_SKIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- SKIP: (\S+)").expect("invalid go skip pattern"));

pub(crate) fn parse_output(
    framework: TestFramework,
    stdout: &str,
    stderr: &str,
) -> ParsedCounts {
    match framework {
        TestFramework::Cargo => parse_cargo(stdout, stderr),
        TestFramework::Pytest => parse_pytest(stdout),
        TestFramework::Jest => parse_jest(stderr, stdout),
        TestFramework::GoTest => parse_go(stdout),
        TestFramework::Generic => ParsedCounts::default(),
    }
}

fn parse_cargo(stdout: &str, stderr: &str) -> ParsedCounts {
    let mut counts = ParsedCounts::default();

    // Multiple summary lines appear for multi-target runs; sum them
    for caps in CARGO_SUMMARY.captures_iter(stdout) {
        counts.recognized = true;
        counts.passed += caps[1].parse().unwrap_or(0);
        counts.failed += caps[2].parse().unwrap_or(0);
        counts.skipped += caps[3].parse().unwrap_or(0);
    }

    let location = CARGO_PANIC_LOCATION
        .captures(stdout)
        .or_else(|| CARGO_PANIC_LOCATION.captures(stderr));
    let (file, line) = location
        .map(|caps| (Some(caps[1].to_string()), caps[2].parse().ok()))
        .unwrap_or((None, None));

    for caps in CARGO_FAILURE.captures_iter(stdout) {
        counts.failures.push(TestFailure {
            name: caps[1].to_string(),
            // Panic location is per-run output, only attributable when a
            // single test failed
            file: if counts.failed == 1 { file.clone() } else { None },
            line: if counts.failed == 1 { line } else { None },
        });
    }

    counts
}

fn parse_pytest(stdout: &str) -> ParsedCounts {
    let mut counts = ParsedCounts::default();

    if let Some(summary) = PYTEST_SUMMARY_LINE.find(stdout) {
        counts.recognized = true;
        for caps in PYTEST_PIECE.captures_iter(summary.as_str()) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passed" => counts.passed = n,
                "failed" => counts.failed = n,
                "skipped" => counts.skipped = n,
                _ => counts.errors = n,
            }
        }
    }

    for caps in PYTEST_FAILURE.captures_iter(stdout) {
        counts.failures.push(TestFailure {
            name: caps[2].to_string(),
            file: Some(caps[1].to_string()),
            line: None,
        });
    }

    counts
}

fn parse_jest(stderr: &str, stdout: &str) -> ParsedCounts {
    let mut counts = ParsedCounts::default();

    // Jest writes its summary to stderr
    let combined = if JEST_SUMMARY.is_match(stderr) { stderr } else { stdout };
    if let Some(caps) = JEST_SUMMARY.captures(combined) {
        counts.recognized = true;
        for piece in JEST_PIECE.captures_iter(&caps[1]) {
            let n: u32 = piece[1].parse().unwrap_or(0);
            match &piece[2] {
                "passed" => counts.passed = n,
                "failed" => counts.failed = n,
                _ => counts.skipped += n,
            }
        }
    }

    for caps in JEST_FAILURE.captures_iter(combined) {
        counts.failures.push(TestFailure {
            name: caps[1].trim().to_string(),
            file: None,
            line: None,
        });
    }

    counts
}

fn parse_go(stdout: &str) -> ParsedCounts {
    let mut counts = ParsedCounts::default();

    counts.passed = GO_PASS.captures_iter(stdout).count() as u32;
    counts.skipped = GO_SKIP.captures_iter(stdout).count() as u32;

    for caps in GO_FAILURE.captures_iter(stdout) {
        counts.failed += 1;
        counts.failures.push(TestFailure {
            name: caps[1].to_string(),
            file: None,
            line: None,
        });
    }

    counts.recognized = counts.passed + counts.failed + counts.skipped > 0
        || stdout.lines().any(|l| l.starts_with("ok ") || l.starts_with("FAIL"));

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cargo_summary() {
        let stdout = "\
running 6 tests
test parser::tests::test_empty ... FAILED
test parser::tests::test_basic ... ok

failures:

---- parser::tests::test_empty stdout ----
thread 'parser::tests::test_empty' panicked at src/parser.rs:42:9:
assertion failed

test result: FAILED. 5 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out
";
        let counts = parse_output(TestFramework::Cargo, stdout, "");
        assert!(counts.recognized);
        assert_eq!(counts.passed, 5);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.failures.len(), 1);
        assert_eq!(counts.failures[0].name, "parser::tests::test_empty");
        assert_eq!(counts.failures[0].file.as_deref(), Some("src/parser.rs"));
        assert_eq!(counts.failures[0].line, Some(42));
    }

    #[test]
    fn test_parse_cargo_multiple_targets() {
        let stdout = "\
test result: ok. 3 passed; 0 failed; 1 ignored; 0 measured; 0 filtered out
test result: ok. 2 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out
";
        let counts = parse_output(TestFramework::Cargo, stdout, "");
        assert_eq!(counts.passed, 5);
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.skipped, 1);
    }

    #[test]
    fn test_parse_pytest_summary() {
        let stdout = "\
FAILED tests/test_auth.py::test_login - AssertionError
FAILED tests/test_auth.py::test_logout - AssertionError
=========== 2 failed, 7 passed, 1 skipped in 0.34s ===========
";
        let counts = parse_output(TestFramework::Pytest, stdout, "");
        assert!(counts.recognized);
        assert_eq!(counts.passed, 7);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.failures.len(), 2);
        assert_eq!(counts.failures[0].name, "test_login");
        assert_eq!(counts.failures[0].file.as_deref(), Some("tests/test_auth.py"));
    }

    #[test]
    fn test_parse_pytest_errors() {
        let stdout = "=========== 1 failed, 2 errors in 0.1s ===========\n";
        let counts = parse_output(TestFramework::Pytest, stdout, "");
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.errors, 2);
    }

    #[test]
    fn test_parse_jest_summary() {
        // Jest indents per-test result lines; spelled with \n so the
        // leading spaces survive.
        let stderr =
            "  ✕ renders the header (12 ms)\nTests:       1 failed, 5 passed, 6 total\n";
        let counts = parse_output(TestFramework::Jest, "", stderr);
        assert!(counts.recognized);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.passed, 5);
        assert_eq!(counts.failures.len(), 1);
        assert_eq!(counts.failures[0].name, "renders the header");
    }

    #[test]
    fn test_jest_column_zero_marker_is_not_a_test_line() {
        // Only indented markers are per-test results; a ✕ at column 0 is
        // some other output and must not produce a phantom failure.
        let stderr = "✕ not a test line\nTests:       1 failed, 5 passed, 6 total\n";
        let counts = parse_output(TestFramework::Jest, "", stderr);
        assert_eq!(counts.failed, 1);
        assert!(counts.failures.is_empty());
    }

    #[test]
    fn test_parse_go_output() {
        let stdout = "\
--- PASS: TestAdd (0.00s)
--- FAIL: TestSubtract (0.01s)
--- SKIP: TestNetwork (0.00s)
FAIL
FAIL\texample.com/calc\t0.015s
";
        let counts = parse_output(TestFramework::GoTest, stdout, "");
        assert!(counts.recognized);
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.failures[0].name, "TestSubtract");
    }

    #[test]
    fn test_generic_is_unrecognized() {
        let counts = parse_output(TestFramework::Generic, "all good\n", "");
        assert!(!counts.recognized);
        assert_eq!(counts.failed, 0);
    }

    #[test]
    fn test_garbage_output_is_unrecognized() {
        let counts = parse_output(TestFramework::Cargo, "lorem ipsum\n", "");
        assert!(!counts.recognized);
    }
}
