use std::path::Path;

/// Test frameworks the adapter knows how to run and parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFramework {
    Cargo,
    Pytest,
    Jest,
    GoTest,
    /// A bare `test` script with no parseable structure.
    Generic,
}

impl TestFramework {
    pub fn command(&self) -> &'static str {
        match self {
            TestFramework::Cargo => "cargo test",
            TestFramework::Pytest => "pytest",
            TestFramework::Jest => "npm test --silent",
            TestFramework::GoTest => "go test ./...",
            TestFramework::Generic => "./test.sh",
        }
    }
}

fn has_pytest_config(dir: &Path) -> bool {
    if dir.join("pytest.ini").exists() || dir.join("setup.cfg").exists() {
        return true;
    }
    // pyproject counts only when it carries a pytest config block
    std::fs::read_to_string(dir.join("pyproject.toml"))
        .map(|content| content.contains("[tool.pytest"))
        .unwrap_or(false)
}

fn has_npm_test_script(dir: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(dir.join("package.json")) else {
        return false;
    };
    serde_json::from_str::<serde_json::Value>(&content)
        .ok()
        .and_then(|json| json.get("scripts")?.get("test").cloned())
        .is_some()
}

fn has_python_test_dir(dir: &Path) -> bool {
    let tests = dir.join("tests");
    if !tests.is_dir() {
        return false;
    }
    std::fs::read_dir(&tests)
        .map(|entries| {
            entries.flatten().any(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("test_") && name.ends_with(".py"))
            })
        })
        .unwrap_or(false)
}

/// Auto-detect the test framework for a working directory.
///
/// Priority: explicit framework config files, then build files with test
/// config blocks, then test-directory heuristics, then a generic `test.sh`
/// fallback. Returns `None` when nothing is found.
pub fn detect_framework(dir: &Path) -> Option<TestFramework> {
    // Explicit config files
    if has_pytest_config(dir) {
        return Some(TestFramework::Pytest);
    }

    // Build files that imply a test runner
    if dir.join("Cargo.toml").exists() {
        return Some(TestFramework::Cargo);
    }
    if has_npm_test_script(dir) {
        return Some(TestFramework::Jest);
    }
    if dir.join("go.mod").exists() {
        return Some(TestFramework::GoTest);
    }

    // Directory heuristics
    if has_python_test_dir(dir) {
        return Some(TestFramework::Pytest);
    }

    // Generic fallback
    if dir.join("test.sh").exists() {
        return Some(TestFramework::Generic);
    }

    None
}
