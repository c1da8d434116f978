//! Response Recovery Pipeline
//!
//! Turns raw model text into bounded, strictly-typed values:
//! - JSON recovery through the tiered [`LenientParser`]
//! - length enforcement over every recovered free-text field
//!
//! ## Design Philosophy
//! - Repair locally, fail as a value: the pipeline never panics and never
//!   throws on malformed input
//! - No caller ever observes an over-length description

mod enforce;
mod lenient;

pub use enforce::enforce;
pub use lenient::{LenientParser, RepairTier};

use crate::budget::LengthBudget;
use crate::types::{ExpectedShape, ParseOutcome};

/// Full normalization pipeline: lenient parse, then budget enforcement over
/// recovered text fields.
#[derive(Debug, Default)]
pub struct ResponseNormalizer {
    parser: LenientParser,
}

impl ResponseNormalizer {
    pub fn new() -> Self {
        Self {
            parser: LenientParser::new(),
        }
    }

    /// Normalize a raw response into the expected shape.
    ///
    /// On `Success` or `PartialSuccess`, every `description` field at any
    /// depth of the recovered value has already been trimmed to the budget.
    /// `Failure` propagates unchanged.
    pub fn normalize(
        &self,
        raw: &str,
        budget: &LengthBudget,
        shape: &ExpectedShape,
    ) -> ParseOutcome {
        self.normalize_with_tier(raw, budget, shape).0
    }

    /// Normalize, also reporting which repair tier produced the outcome.
    pub fn normalize_with_tier(
        &self,
        raw: &str,
        budget: &LengthBudget,
        shape: &ExpectedShape,
    ) -> (ParseOutcome, RepairTier) {
        let (mut outcome, tier) = self.parser.parse_with_tier(raw, shape);
        match &mut outcome {
            ParseOutcome::Success(value) | ParseOutcome::PartialSuccess(value, _) => {
                value.map_descriptions(|description| enforce(description, budget));
            }
            ParseOutcome::Failure(_) => {}
        }
        (outcome, tier)
    }

    /// Normalize a free-text (narrative) response: strip code fences and
    /// apply the budget. Used for project descriptions, where no structure
    /// is expected at all.
    pub fn normalize_text(&self, raw: &str, budget: &LengthBudget) -> String {
        enforce(strip_fences_for_text(raw), budget)
    }
}

/// Fence stripping for plain-text responses. Models occasionally fence prose
/// too; the inner text is what the caller wants.
fn strip_fences_for_text(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => "",
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest.trim_end();
    }
    text.trim()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::LengthBudget;
    use crate::types::RecoveredValue;

    fn tight_budget() -> LengthBudget {
        LengthBudget {
            max_sentences: 1,
            max_words: 5,
            max_output_tokens: 60,
        }
    }

    #[test]
    fn test_descriptions_enforced_in_array() {
        let raw = r#"[
            {"description": "one two three four five six seven eight"},
            {"description": "short"}
        ]"#;
        let outcome =
            ResponseNormalizer::new().normalize(raw, &tight_budget(), &ExpectedShape::array(5));
        let tasks = match outcome.value() {
            Some(RecoveredValue::Tasks(tasks)) => tasks,
            other => panic!("expected tasks, got {other:?}"),
        };
        assert_eq!(tasks[0].description, "one two three four five.");
        assert_eq!(tasks[1].description, "short");
    }

    #[test]
    fn test_description_enforced_in_single_object() {
        let raw = r#"{"description": "First sentence here. Second sentence that gets dropped."}"#;
        let outcome =
            ResponseNormalizer::new().normalize(raw, &tight_budget(), &ExpectedShape::single());
        let task = outcome.value().and_then(RecoveredValue::as_task).unwrap();
        assert_eq!(task.description, "First sentence here.");
    }

    #[test]
    fn test_other_fields_untouched() {
        let raw = r#"{"title": "a very long title kept exactly as it came in",
                      "description": "d", "laborPrice": 10}"#;
        let outcome =
            ResponseNormalizer::new().normalize(raw, &tight_budget(), &ExpectedShape::single());
        let task = outcome.value().and_then(RecoveredValue::as_task).unwrap();
        assert_eq!(
            task.title.as_deref(),
            Some("a very long title kept exactly as it came in")
        );
        assert_eq!(task.labor_price, Some(10.0));
    }

    #[test]
    fn test_failure_propagates_unchanged() {
        let outcome =
            ResponseNormalizer::new().normalize("", &tight_budget(), &ExpectedShape::single());
        assert!(outcome.is_failure());
    }

    #[test]
    fn test_partial_success_keeps_warning_and_enforces() {
        let raw = "each task need 1 paint box cost 20 euro, 2 tasks, 1 day";
        let outcome =
            ResponseNormalizer::new().normalize(raw, &tight_budget(), &ExpectedShape::single());
        assert!(outcome.warning().is_some());
        let task = outcome.value().and_then(RecoveredValue::as_task).unwrap();
        assert!(task.description.split_whitespace().count() <= 5);
    }

    #[test]
    fn test_normalize_text_strips_fences_and_enforces() {
        let raw = "```\nThis narrative has more than five words in total. And a second sentence.\n```";
        let result = ResponseNormalizer::new().normalize_text(raw, &tight_budget());
        assert_eq!(result, "This narrative has more than.");
    }

    #[test]
    fn test_normalize_text_empty() {
        let result = ResponseNormalizer::new().normalize_text("", &tight_budget());
        assert_eq!(result, "");
    }
}
