//! Text Constraint Enforcement
//!
//! Trims a candidate output string to a budget's sentence and word caps.
//! Idempotent and never lengthening: the parser may hand this any recovered
//! free-text field and the caller will never observe an over-length result.

use crate::budget::LengthBudget;

/// Trim `text` to at most `budget.max_sentences` sentences and
/// `budget.max_words` words, preserving original order.
///
/// Sentence boundaries are `.`, `!` or `?` followed by whitespace or end of
/// string. When the word cap truncates mid-sentence, a period is appended so
/// the result still reads as a finished statement.
pub fn enforce(text: &str, budget: &LengthBudget) -> String {
    if text.is_empty() {
        return String::new();
    }

    let sentences = split_sentences(text);
    let kept: Vec<&str> = sentences
        .iter()
        .take(budget.max_sentences as usize)
        .map(|s| s.trim())
        .collect();
    let joined = kept.join(" ");

    let words: Vec<&str> = joined.split_whitespace().collect();
    if words.len() > budget.max_words as usize {
        let mut out = words[..budget.max_words as usize].join(" ");
        if !out.ends_with(['.', '!', '?']) {
            out.push('.');
        }
        out
    } else {
        words.join(" ")
    }
}

/// Split into sentences on end punctuation followed by whitespace or EOS.
///
/// The punctuation stays attached to its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            let end = i + ch.len_utf8();
            let at_boundary = match chars.peek() {
                None => true,
                Some(&(_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                let sentence = &text[start..end];
                if !sentence.trim().is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    if start < bytes.len() {
        let tail = &text[start..];
        if !tail.trim().is_empty() {
            sentences.push(tail);
        }
    }

    sentences
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn budget(max_sentences: u32, max_words: u32) -> LengthBudget {
        LengthBudget {
            max_sentences,
            max_words,
            max_output_tokens: 0,
        }
    }

    #[test]
    fn test_sentence_cap() {
        let text = "First one. Second one! Third one? Fourth one.";
        let result = enforce(text, &budget(2, 100));
        assert_eq!(result, "First one. Second one!");
    }

    #[test]
    fn test_word_cap_appends_period() {
        let text = "one two three four five six seven";
        let result = enforce(text, &budget(5, 4));
        assert_eq!(result, "one two three four.");
    }

    #[test]
    fn test_word_cap_keeps_existing_punctuation() {
        let text = "one two three four. five six";
        let result = enforce(text, &budget(5, 4));
        assert_eq!(result, "one two three four.");
    }

    #[test]
    fn test_empty_input_unchanged() {
        assert_eq!(enforce("", &budget(1, 1)), "");
    }

    #[test]
    fn test_under_budget_only_normalizes_whitespace() {
        let text = "Short  answer.";
        assert_eq!(enforce(text, &budget(3, 50)), "Short answer.");
    }

    #[test]
    fn test_abbreviation_counts_as_boundary() {
        // Heuristic splitter: "Dr. Smith" is two sentences. Accepted tradeoff.
        let result = enforce("Dr. Smith paints fences. He is fast.", &budget(2, 50));
        assert_eq!(result, "Dr. Smith paints fences.");
    }

    proptest! {
        #[test]
        fn prop_enforce_idempotent(text in ".{0,400}", s in 1u32..6, w in 1u32..80) {
            let b = budget(s, w);
            let once = enforce(&text, &b);
            let twice = enforce(&once, &b);
            prop_assert_eq!(&once, &twice);
        }

        #[test]
        fn prop_enforce_respects_caps(text in ".{0,400}", s in 1u32..6, w in 1u32..80) {
            let b = budget(s, w);
            let result = enforce(&text, &b);
            prop_assert!(result.split_whitespace().count() <= w as usize);
            prop_assert!(split_sentences(&result).len() <= s as usize + 1);
        }

        #[test]
        fn prop_enforce_never_lengthens_words(text in ".{0,400}") {
            let b = budget(2, 10);
            let result = enforce(&text, &b);
            prop_assert!(
                result.split_whitespace().count() <= text.split_whitespace().count().max(1)
            );
        }
    }
}
