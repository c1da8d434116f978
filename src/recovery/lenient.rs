//! Lenient Structure Parser
//!
//! Tiered repair parser for LLM output. Well-formed JSON parses immediately;
//! everything else walks an ordered chain of repair tiers, stopping at the
//! first tier whose result satisfies the expected shape:
//!
//! 1. Code fence stripping (leading and trailing, independently)
//! 2. Bound extraction (depth-counted `[...]` / `{...}` slice, truncation-aware)
//! 3. Lexical normalization (smart quotes, newlines, trailing commas, bare keys)
//! 4. Strict parse
//! 5. Single-quote to double-quote repair
//! 6. Truncation repair (close after the last complete top-level element)
//! 7. Keyed-subtree extraction (`"tasks": [...]` inside a wrapper object)
//! 8. Field-by-field regex extraction (single-object last resort)
//!
//! Earlier tiers always win; a later tier is never attempted once one
//! succeeds. Quoted numerics are coerced at assembly time, not here.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::parser as parser_constants;
use crate::types::{ExpectedShape, Material, ParseOutcome, RecoveredValue, TaskSuggestion};

// =============================================================================
// Repair Tier
// =============================================================================

/// Which tier produced an outcome. Earlier variants are cheaper repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepairTier {
    /// Parsed after fence stripping, bound extraction and lexical cleanup only
    Strict,
    /// Needed single-quote to double-quote conversion
    QuoteStyle,
    /// Needed closing after the last complete element
    Truncation,
    /// Recovered from a keyed array nested in a wrapper object
    KeyedSubtree,
    /// Assembled field-by-field with regexes
    FieldExtraction,
}

impl std::fmt::Display for RepairTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::QuoteStyle => write!(f, "quote-style"),
            Self::Truncation => write!(f, "truncation"),
            Self::KeyedSubtree => write!(f, "keyed-subtree"),
            Self::FieldExtraction => write!(f, "field-extraction"),
        }
    }
}

// =============================================================================
// Field Extraction Regexes
// =============================================================================

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""description"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
});
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:estimatedDurationMinutes|estimatedDuration)"\s*:\s*"?(\d+(?:\.\d+)?)"?"#)
        .expect("valid regex")
});
static LABOR_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""laborPrice"\s*:\s*"?(\d+(?:\.\d+)?)"?"#).expect("valid regex")
});
static BASIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"unitLaborBasis"\s*:\s*"(hour|task)""#).expect("valid regex")
});
static MATERIALS_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:suggestedMaterials|materials)"\s*:\s*\["#).expect("valid regex")
});

// =============================================================================
// Parser
// =============================================================================

/// Tiered repair parser. Stateless; safe to share.
#[derive(Debug, Default)]
pub struct LenientParser;

impl LenientParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw response into the expected shape.
    pub fn parse(&self, raw: &str, shape: &ExpectedShape) -> ParseOutcome {
        self.parse_with_tier(raw, shape).0
    }

    /// Parse, also reporting which repair tier produced the outcome.
    pub fn parse_with_tier(&self, raw: &str, shape: &ExpectedShape) -> (ParseOutcome, RepairTier) {
        let stripped = strip_code_fences(raw);
        self.run_tiers(&stripped, shape, true)
    }

    fn run_tiers(
        &self,
        text: &str,
        shape: &ExpectedShape,
        allow_subtree: bool,
    ) -> (ParseOutcome, RepairTier) {
        let bounded = extract_bounds(text, shape).unwrap_or_else(|| text.trim().to_string());
        let normalized = normalize_lexical(&bounded);

        if let Some(value) = strict_parse(&normalized, shape) {
            return (ParseOutcome::Success(value), RepairTier::Strict);
        }
        debug!("strict parse failed, advancing repair tiers");

        let requoted = requote_single_quotes(&normalized);
        if requoted != normalized
            && let Some(value) = strict_parse(&requoted, shape)
        {
            warn!("response recovered after quote-style repair");
            return (ParseOutcome::Success(value), RepairTier::QuoteStyle);
        }

        if let Some(closed) = close_truncated(&requoted)
            && let Some(value) = strict_parse(&closed, shape)
        {
            warn!("response recovered after truncation repair");
            return (ParseOutcome::Success(value), RepairTier::Truncation);
        }

        // Later tiers work on the whole response again: bound extraction may
        // have sliced away the very content they need.
        let full = normalize_lexical(text);

        if allow_subtree
            && matches!(shape, ExpectedShape::ObjectArray(..))
            && let Some(subtree) = find_keyed_array(&full)
        {
            let (outcome, _) = self.run_tiers(subtree, shape, false);
            if !outcome.is_failure() {
                warn!("response recovered from keyed subtree");
                return (outcome, RepairTier::KeyedSubtree);
            }
        }

        if matches!(shape, ExpectedShape::SingleObject(_)) {
            let full_requoted = requote_single_quotes(&full);
            return (
                extract_fields(&full_requoted, text),
                RepairTier::FieldExtraction,
            );
        }

        let preview: String = text
            .chars()
            .take(parser_constants::FAILURE_PREVIEW_CHARS)
            .collect();
        (
            ParseOutcome::Failure(format!("unparseable response: {preview}")),
            RepairTier::FieldExtraction,
        )
    }
}

/// Strict JSON parse plus shape check and schema assembly.
///
/// Returns None when the text does not parse, the cardinality does not match
/// the shape, or (for a single object) the minimum required fields are
/// missing. Arrays longer than the shape's `max_items` are truncated here.
fn strict_parse(text: &str, shape: &ExpectedShape) -> Option<RecoveredValue> {
    let value: Value = serde_json::from_str(text).ok()?;
    match shape {
        ExpectedShape::SingleObject(schema) => {
            let task = TaskSuggestion::from_value(&value, schema)?;
            Some(RecoveredValue::Task(task))
        }
        ExpectedShape::ObjectArray(schema, max_items) => {
            let arr = value.as_array()?;
            let mut tasks: Vec<TaskSuggestion> = arr
                .iter()
                .filter_map(|element| TaskSuggestion::from_value(element, schema))
                .collect();
            // A non-empty array where nothing assembles is the wrong array
            // (e.g. a decoy numeric list); let a later tier find the real one.
            if tasks.is_empty() && !arr.is_empty() {
                return None;
            }
            if tasks.len() > *max_items {
                warn!(
                    kept = max_items,
                    dropped = tasks.len() - max_items,
                    "array exceeded requested item count, truncating"
                );
                tasks.truncate(*max_items);
            }
            Some(RecoveredValue::Tasks(tasks))
        }
    }
}

// =============================================================================
// Tier 1: Fence Stripping
// =============================================================================

/// Strip markdown code fences from both ends independently; the trailing
/// fence may be absent on truncated output. An optional language tag after
/// the opening fence is discarded with its line.
fn strip_code_fences(s: &str) -> String {
    let mut result = s.trim();

    if result.starts_with("```") {
        result = match result.find('\n') {
            Some(newline) => &result[newline + 1..],
            // Opening fence with no content after it
            None => "",
        };
    }

    if result.trim_end().ends_with("```") {
        let trimmed = result.trim_end();
        result = trimmed[..trimmed.len() - 3].trim_end();
    }

    result.trim().to_string()
}

// =============================================================================
// Tier 2: Bound Extraction
// =============================================================================

/// Slice the first structure of the expected cardinality out of surrounding
/// prose, closing it if the response was cut off mid-stream.
fn extract_bounds(s: &str, shape: &ExpectedShape) -> Option<String> {
    match shape {
        ExpectedShape::ObjectArray(..) => extract_array_bounds(s),
        ExpectedShape::SingleObject(_) => extract_object_bounds(s),
    }
}

/// Slice from the first `[` outside any string literal to its depth-matched
/// `]`. If the closer never arrives (truncated output), cut after the last
/// complete `}` element and synthesize the `]`, discarding any trailing
/// partial element.
fn extract_array_bounds(s: &str) -> Option<String> {
    let start = find_unquoted(s, '[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    let mut last_complete_element: Option<usize> = None;

    for (i, ch) in s[start..].char_indices() {
        let pos = start + i;
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '[' | '{' if !in_string => depth += 1,
            ']' | '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 && ch == ']' {
                    return Some(s[start..=pos].to_string());
                }
                if depth == 1 && ch == '}' {
                    last_complete_element = Some(pos + 1);
                }
            }
            _ => {}
        }
    }

    // Truncated: keep the complete leading elements.
    match last_complete_element {
        Some(end) => Some(format!("{}]", &s[start..end])),
        None => Some("[]".to_string()),
    }
}

/// Slice the first top-level balanced `{...}` found by depth counting,
/// starting at the first `{` outside any string literal. If the object never
/// closes, take the rest of the string and balance it.
fn extract_object_bounds(s: &str) -> Option<String> {
    let start = find_unquoted(s, '{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s[start..].char_indices() {
        let pos = start + i;
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 && ch == '}' {
                    return Some(s[start..=pos].to_string());
                }
            }
            _ => {}
        }
    }

    Some(balance_closers(&s[start..]))
}

/// Position of the first `target` that is not inside a string literal.
fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            c if c == target && !in_string => return Some(i),
            _ => {}
        }
    }
    None
}

/// Close an unterminated string and append whatever closers the open
/// container stack still needs.
fn balance_closers(s: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for ch in s.chars() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => stack.push(ch),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut result = s.to_string();
    if in_string {
        result.push('"');
    }
    while let Some(opener) = stack.pop() {
        result.push(if opener == '{' { '}' } else { ']' });
    }
    result
}

// =============================================================================
// Tier 3: Lexical Normalization
// =============================================================================

/// Normalize lexical noise that breaks strict JSON without changing meaning:
/// smart quotes, embedded newlines, trailing commas and bare object keys.
fn normalize_lexical(s: &str) -> String {
    let straightened: String = s
        .chars()
        .map(|ch| match ch {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect();
    let keyed = quote_bare_keys(&straightened);
    strip_trailing_commas(&keyed)
}

/// Quote bare identifier keys: `{title: "x"}` -> `{"title": "x"}`.
///
/// String-aware; only positions where an object key can start (after `{` or
/// a `,` inside an object) are considered.
fn quote_bare_keys(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 16);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
                i += 1;
            }
            '{' | '[' => {
                stack.push(ch);
                out.push(ch);
                i += 1;
                if ch == '{' {
                    i = emit_quoted_key(&chars, i, &mut out);
                }
            }
            '}' | ']' => {
                stack.pop();
                out.push(ch);
                i += 1;
            }
            ',' => {
                out.push(ch);
                i += 1;
                if stack.last() == Some(&'{') {
                    i = emit_quoted_key(&chars, i, &mut out);
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

/// At a key position, copy leading whitespace and, if a bare identifier
/// followed by `:` sits there, emit it quoted. Returns the next index.
fn emit_quoted_key(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut j = start;
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }
    let ident_start = j;
    if j < chars.len() && (chars[j].is_ascii_alphabetic() || chars[j] == '_') {
        j += 1;
        while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
            j += 1;
        }
        let mut k = j;
        while k < chars.len() && chars[k].is_whitespace() {
            k += 1;
        }
        if k < chars.len() && chars[k] == ':' {
            for ch in &chars[start..ident_start] {
                out.push(*ch);
            }
            out.push('"');
            for ch in &chars[ident_start..j] {
                out.push(*ch);
            }
            out.push('"');
            return j;
        }
    }
    start
}

/// Remove commas that sit immediately before a closing `]` or `}`.
fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if ch == '"' {
            in_string = true;
            out.push(ch);
            i += 1;
            continue;
        }
        if ch == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == ']' || chars[j] == '}') {
                i += 1;
                continue;
            }
        }
        out.push(ch);
        i += 1;
    }
    out
}

// =============================================================================
// Tier 5: Quote-Style Repair
// =============================================================================

/// Convert single-quoted string literals to double-quoted, escaping embedded
/// double quotes. Text already inside double-quoted strings is untouched.
fn requote_single_quotes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 8);
    let mut in_double = false;
    let mut escape = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if in_double {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_double = false;
            }
            i += 1;
            continue;
        }
        match ch {
            '"' => {
                in_double = true;
                out.push(ch);
                i += 1;
            }
            '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() {
                    let c = chars[i];
                    if c == '\\' && i + 1 < chars.len() {
                        let next = chars[i + 1];
                        if next == '\'' {
                            out.push('\'');
                        } else {
                            out.push(c);
                            out.push(next);
                        }
                        i += 2;
                        continue;
                    }
                    if c == '\'' {
                        break;
                    }
                    if c == '"' {
                        out.push('\\');
                    }
                    out.push(c);
                    i += 1;
                }
                out.push('"');
                i += 1;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

// =============================================================================
// Tier 6: Truncation Repair
// =============================================================================

/// Cut the text right after the last complete element at depth 1, drop any
/// dangling comma, and close the structures that remain open. Returns None
/// when the text is already balanced or no complete element exists.
fn close_truncated(s: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut last_complete: Option<usize> = None;

    for (i, ch) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => stack.push(ch),
            '}' | ']' if !in_string => {
                stack.pop();
                if stack.len() == 1 {
                    last_complete = Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() {
        return None;
    }
    let cut = last_complete?;
    let mut candidate = s[..cut].trim_end().to_string();
    if candidate.ends_with(',') {
        candidate.pop();
    }
    Some(balance_closers(&candidate))
}

// =============================================================================
// Tier 7: Keyed-Subtree Extraction
// =============================================================================

/// Find a known array key (`"tasks": [...]` and friends) in a wrapper object
/// and return the substring starting at its `[`.
fn find_keyed_array(s: &str) -> Option<&str> {
    static KEYED_ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
        let keys = parser_constants::KNOWN_ARRAY_KEYS.join("|");
        Regex::new(&format!(r#""(?:{keys})"\s*:\s*\["#)).expect("valid regex")
    });
    let m = KEYED_ARRAY_RE.find(s)?;
    // Back up to the bracket itself; the caller re-runs bound extraction.
    Some(&s[m.end() - 1..])
}

// =============================================================================
// Tier 8: Field-by-Field Extraction
// =============================================================================

/// Last-resort single-object recovery: match known fields independently and
/// assemble whatever subset was found. When the response carries no structure
/// at all, plain prose becomes the description rather than a hard failure.
fn extract_fields(normalized: &str, original: &str) -> ParseOutcome {
    let description = DESCRIPTION_RE
        .captures(normalized)
        .map(|c| unescape_json_string(&c[1]));

    let description = match description {
        Some(d) if !d.trim().is_empty() => d,
        _ => {
            // No description field. Prose responses still carry usable text.
            let prose = original.split_whitespace().collect::<Vec<_>>().join(" ");
            if prose.is_empty() || original.contains('{') {
                let preview: String = original
                    .chars()
                    .take(parser_constants::FAILURE_PREVIEW_CHARS)
                    .collect();
                return ParseOutcome::Failure(format!("unparseable response: {preview}"));
            }
            warn!("no structure found, using prose as description");
            return ParseOutcome::PartialSuccess(
                RecoveredValue::Task(TaskSuggestion::from_description(prose)),
                "no structured fields found; raw text used as description".to_string(),
            );
        }
    };

    let mut task = TaskSuggestion::from_description(description);
    task.estimated_duration_minutes = DURATION_RE
        .captures(normalized)
        .and_then(|c| c[1].parse::<f64>().ok());
    task.labor_price = LABOR_PRICE_RE
        .captures(normalized)
        .and_then(|c| c[1].parse::<f64>().ok());
    task.unit_labor_basis = BASIS_RE.captures(normalized).and_then(|c| {
        match c[1].to_lowercase().as_str() {
            "hour" => Some(crate::types::LaborBasis::Hour),
            "task" => Some(crate::types::LaborBasis::Task),
            _ => None,
        }
    });
    task.suggested_materials = extract_materials_subarray(normalized);

    warn!("response assembled field-by-field");
    ParseOutcome::PartialSuccess(
        RecoveredValue::Task(task),
        "fields recovered individually from malformed response".to_string(),
    )
}

/// Pull a materials sub-array out of otherwise unparseable text by re-running
/// bound extraction on the slice after the materials key.
fn extract_materials_subarray(s: &str) -> Vec<Material> {
    let Some(m) = MATERIALS_KEY_RE.find(s) else {
        return Vec::new();
    };
    let Some(bounded) = extract_array_bounds(&s[m.end() - 1..]) else {
        return Vec::new();
    };
    let parsed = serde_json::from_str::<Value>(&bounded)
        .ok()
        .or_else(|| {
            close_truncated(&bounded).and_then(|closed| serde_json::from_str(&closed).ok())
        });
    parsed
        .as_ref()
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Material::from_value).collect())
        .unwrap_or_default()
}

/// Decode JSON string escapes from a regex capture.
fn unescape_json_string(captured: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{captured}\""))
        .unwrap_or_else(|_| captured.to_string())
}

// =============================================================================
// Tests
// =============================================================================
