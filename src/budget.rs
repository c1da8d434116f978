//! Adaptive Length Budgeting
//!
//! Maps an input string to a deterministic output-size budget: how many
//! sentences and words a generated answer may carry, and how many output
//! tokens the model call should be allowed. Short inputs earn short answers;
//! the budget grows in fixed tiers with the input's word count.
//!
//! Pure and total over all inputs, including the empty string.

use crate::constants::budget as budget_constants;

/// Profile selecting which tier table applies.
///
/// The task profile's ceilings are >= the narrative profile's at every tier:
/// task suggestions carry structure (materials, prices) that a project
/// description does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetProfile {
    /// Free-text project descriptions
    Narrative,
    /// Structured task suggestions
    Task,
}

/// Output-size ceiling derived from an input's word count.
///
/// Immutable after creation; created per call and discarded after use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBudget {
    pub max_sentences: u32,
    pub max_words: u32,
    pub max_output_tokens: u32,
}

/// Compute the budget for a single-value request.
pub fn compute_budget(input: &str, profile: BudgetProfile) -> LengthBudget {
    let tier = tier_index(word_count(input));
    let (max_sentences, max_words) = match profile {
        BudgetProfile::Narrative => budget_constants::NARRATIVE_TIERS[tier],
        BudgetProfile::Task => budget_constants::TASK_TIERS[tier],
    };
    let (floor, ceil) = match profile {
        BudgetProfile::Narrative => (
            budget_constants::NARRATIVE_TOKEN_FLOOR,
            budget_constants::NARRATIVE_TOKEN_CEIL,
        ),
        BudgetProfile::Task => (
            budget_constants::TASK_TOKEN_FLOOR,
            budget_constants::TASK_TOKEN_CEIL,
        ),
    };
    LengthBudget {
        max_sentences,
        max_words,
        max_output_tokens: words_to_tokens(max_words).clamp(floor, ceil),
    }
}

/// Compute the budget for an array-of-tasks request.
///
/// Sentence and word caps apply per element and follow the task profile;
/// the token ceiling scales with the number of requested elements.
pub fn compute_array_budget(input: &str, requested_items: u32) -> LengthBudget {
    let per_element = compute_budget(input, BudgetProfile::Task);
    let tokens = budget_constants::TOKENS_PER_ARRAY_ITEM.saturating_mul(requested_items.max(1));
    LengthBudget {
        max_output_tokens: tokens.clamp(
            budget_constants::ARRAY_TOKEN_FLOOR,
            budget_constants::ARRAY_TOKEN_CEIL,
        ),
        ..per_element
    }
}

fn word_count(input: &str) -> usize {
    input.split_whitespace().count()
}

fn tier_index(words: usize) -> usize {
    budget_constants::TIER_UPPER_BOUNDS
        .iter()
        .position(|&upper| words <= upper)
        .unwrap_or(budget_constants::TIER_UPPER_BOUNDS.len())
}

fn words_to_tokens(max_words: u32) -> u32 {
    (f64::from(max_words) * budget_constants::TOKENS_PER_WORD).round() as u32
}

// =============================================================================
// Tests
// =============================================================================
