//! Pure field/pattern matching primitives for Sigma selections.
//!
//! Matching is fail-closed: an invalid regex, undecodable base64 value, or
//! missing field is a non-match, never an error. Parsing of rule documents
//! (the fail-open side) lives in [`super::evaluator`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::{MatchModifier, SelectionField, SigmaSelection};

/// Split a raw field spec on `|` into path and modifier.
///
/// Returns `None` for an unknown modifier so rule compilation can reject
/// the rule instead of silently matching with the wrong semantics.
#[must_use]
pub fn parse_field_spec(raw: &str) -> Option<(String, MatchModifier)> {
    match raw.split_once('|') {
        None => Some((raw.to_owned(), MatchModifier::Exact)),
        Some((path, modifier)) => {
            let modifier = match modifier.trim().to_ascii_lowercase().as_str() {
                "" => MatchModifier::Exact,
                "contains" => MatchModifier::Contains,
                "startswith" => MatchModifier::StartsWith,
                "endswith" => MatchModifier::EndsWith,
                "base64" => MatchModifier::Base64,
                "base64offset" => MatchModifier::Base64Offset,
                "re" => MatchModifier::Regex,
                "all" => MatchModifier::All,
                _ => return None,
            };
            Some((path.to_owned(), modifier))
        }
    }
}

/// Look up a field path in a record object: direct key match first, then
/// dot-notation descent.
#[must_use]
pub fn lookup<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(direct) = root.get(path) {
        return Some(direct);
    }
    let mut current: Option<&Value> = None;
    for segment in path.split('.') {
        current = match current {
            None => root.get(segment),
            Some(value) => value.as_object()?.get(segment),
        };
        current?;
    }
    current
}

/// Render a field value as matchable text.
///
/// Scalars stringify naturally; composite values fall back to compact JSON
/// so substring modifiers still have something to bite on. `null` and
/// absent values yield `None` (non-match).
#[must_use]
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        composite => Some(composite.to_string()),
    }
}

/// Match a single value against a single pattern under a modifier.
#[must_use]
pub fn match_pattern(
    value: &str,
    pattern: &str,
    modifier: MatchModifier,
    case_sensitive: bool,
) -> bool {
    let fold = |s: &str| {
        if case_sensitive {
            s.to_owned()
        } else {
            s.to_lowercase()
        }
    };

    match modifier {
        MatchModifier::Exact => {
            if pattern.contains('*') || pattern.contains('?') {
                wildcard_match(value, pattern, case_sensitive)
            } else {
                fold(value) == fold(pattern)
            }
        }
        MatchModifier::Contains => fold(value).contains(&fold(pattern)),
        MatchModifier::StartsWith => fold(value).starts_with(&fold(pattern)),
        MatchModifier::EndsWith => fold(value).ends_with(&fold(pattern)),
        MatchModifier::Base64 => match BASE64.decode(value.trim()) {
            Ok(decoded) => {
                let text = String::from_utf8_lossy(&decoded);
                fold(&text).contains(&fold(pattern))
            }
            Err(_) => false,
        },
        MatchModifier::Base64Offset => base64_offset_match(value, &fold(pattern), case_sensitive),
        MatchModifier::Regex => match compile_regex(pattern, case_sensitive) {
            Some(re) => re.is_match(value),
            // Invalid pattern: non-match, never an error.
            None => false,
        },
        MatchModifier::All => {
            let haystack = fold(value);
            pattern
                .split_whitespace()
                .all(|token| haystack.contains(&fold(token)))
        }
    }
}

/// Match a field constraint: OR across its patterns.
#[must_use]
pub fn match_field(root: &Map<String, Value>, field: &SelectionField, case_sensitive: bool) -> bool {
    let Some(value) = lookup(root, &field.path).and_then(value_text) else {
        return false;
    };
    field
        .patterns
        .iter()
        .any(|pattern| match_pattern(&value, pattern, field.modifier, case_sensitive))
}

/// Match a whole selection: AND across fields; an empty selection matches
/// nothing.
#[must_use]
pub fn match_selection(
    root: &Map<String, Value>,
    selection: &SigmaSelection,
    case_sensitive: bool,
) -> bool {
    if selection.fields.is_empty() {
        return false;
    }
    selection
        .fields
        .iter()
        .all(|field| match_field(root, field, case_sensitive))
}

/// Translate a Sigma wildcard pattern (`*` any run, `?` one character) into
/// an anchored regex and match it.
fn wildcard_match(value: &str, pattern: &str, case_sensitive: bool) -> bool {
    let mut translated = String::with_capacity(pattern.len() + 8);
    if !case_sensitive {
        translated.push_str("(?i)");
    }
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated).map(|re| re.is_match(value)).unwrap_or(false)
}

fn compile_regex(pattern: &str, case_sensitive: bool) -> Option<Regex> {
    let adjusted = if case_sensitive {
        pattern.to_owned()
    } else {
        format!("(?i){pattern}")
    };
    Regex::new(&adjusted).ok()
}

/// Retry base64 decoding at byte offsets 0, 1 and 2, padding to a 4-byte
/// boundary, so windows that do not align to 3-byte groups still decode.
fn base64_offset_match(value: &str, folded_pattern: &str, case_sensitive: bool) -> bool {
    let bytes = value.trim().as_bytes();
    for offset in 0..=2usize {
        if offset >= bytes.len() {
            break;
        }
        let mut candidate = bytes[offset..].to_vec();
        while candidate.len() % 4 != 0 {
            candidate.push(b'=');
        }
        if let Ok(decoded) = BASE64.decode(&candidate) {
            let text = String::from_utf8_lossy(&decoded);
            let haystack = if case_sensitive {
                text.to_string()
            } else {
                text.to_lowercase()
            };
            if haystack.contains(folded_pattern) {
                return true;
            }
        }
    }
    false
}
