//! Sigma rule data model and detection events.
//!
//! These types are the *compiled* form of a Sigma rule document: field
//! specs are pre-split into path + modifier, and pattern scalars are
//! coerced to strings. Compilation lives in [`crate::sigma`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Severity a rule assigns to its detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Informational,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Pattern-matching modifier carried on a field path (`field|modifier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchModifier {
    /// No modifier: exact match, or wildcard match when the pattern
    /// contains `*` or `?`.
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    /// Decode the log value as base64, then substring-match the pattern
    /// against the decoded text.
    Base64,
    /// Like `Base64`, but retries decoding at byte offsets 0, 1 and 2 to
    /// catch windows that do not align to 3-byte boundaries.
    Base64Offset,
    /// The pattern is a regular expression.
    Regex,
    /// Every whitespace-delimited token of the pattern must appear in the
    /// value, in any order.
    All,
}

/// One field constraint inside a selection: a field path, an optional
/// modifier, and one or more patterns OR-ed together.
#[derive(Debug, Clone)]
pub struct SelectionField {
    /// Dot-notation field path (modifier suffix already stripped).
    pub path: String,
    pub modifier: MatchModifier,
    /// OR semantics: any pattern matching satisfies this field.
    pub patterns: Vec<String>,
}

/// A named group of field constraints. AND semantics across fields.
///
/// An empty selection matches nothing.
#[derive(Debug, Clone, Default)]
pub struct SigmaSelection {
    pub fields: Vec<SelectionField>,
}

/// The detection block of a rule: named selections plus the boolean
/// condition expression combining them.
#[derive(Debug, Clone)]
pub struct SigmaDetection {
    pub selections: BTreeMap<String, SigmaSelection>,
    pub condition: String,
}

/// A compiled Sigma rule.
#[derive(Debug, Clone)]
pub struct SigmaRule {
    pub id: String,
    pub title: String,
    pub severity: RuleSeverity,
    pub detection: SigmaDetection,
}

/// Emitted when a rule matches a canonical log record.
///
/// Immutable once created; ownership passes to the incident collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub rule_id: String,
    pub log_id: Uuid,
    /// Field paths of the selections that evaluated true.
    pub matched_fields: Vec<String>,
    pub severity: RuleSeverity,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_informational_lowest() {
        assert!(RuleSeverity::Informational < RuleSeverity::Low);
        assert!(RuleSeverity::High < RuleSeverity::Critical);
    }

    #[test]
    fn severity_default_is_medium() {
        assert_eq!(RuleSeverity::default(), RuleSeverity::Medium);
    }

    #[test]
    fn severity_deserializes_lowercase() {
        let s: RuleSeverity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(s, RuleSeverity::High);
    }
}
