//! YAML workflow DSL.
//!
//! An alternative to the built-in profiles: a user-authored document parsed
//! into the same [`WorkflowDefinition`] structures, with every structural
//! problem rejected before any phase executes.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::definition::{DefinitionError, WorkflowDefinition};
use super::phase::{LoopMode, PhaseCondition, PhaseDefinition, PhaseTests};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWorkflow {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<String>,
    #[serde(default)]
    default_model: Option<String>,
    /// Seconds.
    #[serde(default)]
    default_timeout: Option<u64>,
    #[serde(default)]
    default_max_retries: Option<u32>,
    #[serde(default)]
    fail_fast: Option<bool>,
    #[serde(default)]
    skip_optional_on_failure: Option<bool>,
    #[serde(default)]
    max_test_retries: Option<u32>,
    #[serde(default)]
    bounce_to: Option<String>,
    #[serde(default)]
    phases: Vec<RawPhase>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPhase {
    #[serde(default)]
    name: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    required: Option<bool>,
    /// Seconds.
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    max_retries: Option<u32>,
    /// `type` or `type:value`.
    #[serde(default)]
    condition: Option<String>,
    #[serde(default, rename = "loop")]
    loop_mode: Option<LoopMode>,
    #[serde(default)]
    loop_max: Option<u32>,
    /// `auto` or a shell command.
    #[serde(default)]
    tests: Option<String>,
    /// Seconds.
    #[serde(default)]
    test_timeout: Option<u64>,
    #[serde(default)]
    parallel_with: Vec<String>,
}

fn convert_phase(raw: RawPhase, index: usize) -> Result<PhaseDefinition> {
    // Name/prompt presence is re-checked structurally by the definition; the
    // condition string needs parsing here.
    let condition = match &raw.condition {
        Some(input) => PhaseCondition::parse(input).map_err(|message| {
            DefinitionError::InvalidCondition {
                phase: if raw.name.is_empty() {
                    format!("#{index}")
                } else {
                    raw.name.clone()
                },
                message,
            }
        })?,
        None => PhaseCondition::Always,
    };

    let tests = raw.tests.map(|t| {
        if t.trim().eq_ignore_ascii_case("auto") {
            PhaseTests::Auto
        } else {
            PhaseTests::Command(t)
        }
    });

    Ok(PhaseDefinition {
        name: raw.name,
        prompt: raw.prompt,
        model: raw.model,
        required: raw.required.unwrap_or(true),
        timeout: raw.timeout.map(Duration::from_secs),
        max_retries: raw.max_retries,
        tests,
        test_timeout: raw.test_timeout.map(Duration::from_secs),
        condition,
        loop_mode: raw.loop_mode.unwrap_or_default(),
        loop_max: raw.loop_max.unwrap_or(1).max(1),
        parallel_with: raw.parallel_with,
    })
}

/// Parse a workflow definition from YAML text.
pub fn parse_workflow(yaml: &str) -> Result<WorkflowDefinition> {
    let raw: RawWorkflow = serde_yaml::from_str(yaml).context("Failed to parse workflow YAML")?;

    let phases = raw
        .phases
        .into_iter()
        .enumerate()
        .map(|(index, phase)| convert_phase(phase, index))
        .collect::<Result<Vec<_>>>()?;

    let mut definition = WorkflowDefinition::new(&raw.name, phases)?;
    definition.description = raw.description;
    if let Some(model) = raw.default_model {
        definition.default_model = model;
    }
    if let Some(timeout) = raw.default_timeout {
        definition.default_timeout = Duration::from_secs(timeout);
    }
    if let Some(retries) = raw.default_max_retries {
        definition.default_max_retries = retries;
    }
    if let Some(fail_fast) = raw.fail_fast {
        definition.fail_fast = fail_fast;
    }
    if let Some(skip) = raw.skip_optional_on_failure {
        definition.skip_optional_on_failure = skip;
    }
    if let Some(retries) = raw.max_test_retries {
        definition.max_test_retries = retries;
    }
    if let Some(target) = raw.bounce_to {
        definition = definition.with_bounce_to(&target)?;
    }

    Ok(definition)
}

/// Load a workflow definition from a YAML file.
pub async fn load_workflow(path: &Path) -> Result<WorkflowDefinition> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read workflow file {path:?}"))?;
    parse_workflow(&content)
}
