//! Built-in adaptive workflow profiles, one per complexity tier.

use super::definition::WorkflowDefinition;
use super::phase::{PhaseDefinition, PhaseTests};
use crate::complexity::Complexity;

pub const PHASE_PLAN: &str = "plan";
pub const PHASE_IMPLEMENT: &str = "implement";
pub const PHASE_TEST: &str = "test";
pub const PHASE_REVIEW: &str = "review";
pub const PHASE_DOCUMENT: &str = "document";

const OPUS_MODEL: &str = "opus";

const PLAN_PROMPT: &str = "Plan the implementation of the following task. \
Identify the files to change and the approach to take. Do not write code yet.\n\nTask: {task}";

const IMPLEMENT_PROMPT: &str = "Implement the following task. \
Make the necessary code changes and keep them focused on the task.\n\nTask: {task}";

const TEST_PROMPT: &str = "Write or update tests covering the changes made for this task, \
then make sure the full test suite passes.\n\nTask: {task}";

const REVIEW_PROMPT: &str = "Review the changes made for this task for correctness, \
clarity, and unintended side effects. Fix any problems you find.\n\nTask: {task}";

const DOCUMENT_PROMPT: &str = "Update documentation affected by this task \
(README, doc comments, changelogs).\n\nTask: {task}";

/// Build the static profile for a complexity tier.
///
/// MINIMAL is a single required implement phase with no test validation.
/// STANDARD plans then implements, with post-implement test validation and
/// the implement↔test bounce. FULL adds dedicated test and review phases
/// (opus model for plan and review) and an optional document phase.
pub fn profile_for(complexity: Complexity) -> WorkflowDefinition {
    let definition = match complexity {
        Complexity::Minimal => WorkflowDefinition::new(
            "minimal",
            vec![PhaseDefinition::new(PHASE_IMPLEMENT, IMPLEMENT_PROMPT)],
        ),
        Complexity::Standard => WorkflowDefinition::new(
            "standard",
            vec![
                PhaseDefinition::new(PHASE_PLAN, PLAN_PROMPT),
                PhaseDefinition::new(PHASE_IMPLEMENT, IMPLEMENT_PROMPT)
                    .with_tests(PhaseTests::Auto),
            ],
        )
        .and_then(|d| d.with_bounce_to(PHASE_IMPLEMENT)),
        Complexity::Full => WorkflowDefinition::new(
            "full",
            vec![
                PhaseDefinition::new(PHASE_PLAN, PLAN_PROMPT).with_model(OPUS_MODEL),
                PhaseDefinition::new(PHASE_IMPLEMENT, IMPLEMENT_PROMPT),
                PhaseDefinition::new(PHASE_TEST, TEST_PROMPT).with_tests(PhaseTests::Auto),
                PhaseDefinition::new(PHASE_REVIEW, REVIEW_PROMPT).with_model(OPUS_MODEL),
                PhaseDefinition::new(PHASE_DOCUMENT, DOCUMENT_PROMPT).optional(),
            ],
        )
        .and_then(|d| d.with_bounce_to(PHASE_IMPLEMENT)),
    };

    // Profiles are static and validated by construction
    definition.expect("built-in profile failed validation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_profile() {
        let profile = profile_for(Complexity::Minimal);
        assert_eq!(profile.phases.len(), 1);
        assert_eq!(profile.phases[0].name, PHASE_IMPLEMENT);
        assert!(profile.phases[0].required);
        assert!(profile.phases[0].tests.is_none());
        assert!(profile.bounce_to.is_none());
    }

    #[test]
    fn test_standard_profile() {
        let profile = profile_for(Complexity::Standard);
        let names: Vec<&str> = profile.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![PHASE_PLAN, PHASE_IMPLEMENT]);
        assert_eq!(profile.phases[1].tests, Some(PhaseTests::Auto));
        assert_eq!(profile.bounce_to.as_deref(), Some(PHASE_IMPLEMENT));
        assert_eq!(profile.max_test_retries, 3);
    }

    #[test]
    fn test_full_profile() {
        let profile = profile_for(Complexity::Full);
        let names: Vec<&str> = profile.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![PHASE_PLAN, PHASE_IMPLEMENT, PHASE_TEST, PHASE_REVIEW, PHASE_DOCUMENT]
        );
        assert_eq!(profile.phases[0].model.as_deref(), Some(OPUS_MODEL));
        assert_eq!(profile.phases[3].model.as_deref(), Some(OPUS_MODEL));
        assert!(!profile.phases[4].required);
        assert_eq!(profile.phases[2].tests, Some(PhaseTests::Auto));
    }
}
