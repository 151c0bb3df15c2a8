//! Sigma rule compilation and per-record evaluation.
//!
//! Rule documents are YAML; compilation is fail-closed per rule — a rule
//! with an unknown modifier, a bad condition, or an empty detection block
//! is rejected whole rather than loaded with weakened semantics. Evaluation
//! of a compiled rule against a record never fails: pattern-level problems
//! (bad regex, undecodable base64) are non-matches.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::condition::CompiledCondition;
use super::field::{match_selection, parse_field_spec};
use super::RuleError;
use crate::domain::{
    CanonicalLogRecord, DetectionEvent, RuleSeverity, SelectionField, SigmaDetection, SigmaRule,
    SigmaSelection,
};

/// A rule plus its pre-compiled condition.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: SigmaRule,
    condition: CompiledCondition,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    level: Option<String>,
    detection: serde_yaml::Value,
}

/// Compile one Sigma YAML document.
pub fn compile_rule(yaml: &str) -> Result<CompiledRule, RuleError> {
    let raw: RawRule = serde_yaml::from_str(yaml).map_err(|e| RuleError::Yaml(e.to_string()))?;

    let detection_map = raw
        .detection
        .as_mapping()
        .ok_or(RuleError::MissingDetection)?;

    let mut selections: BTreeMap<String, SigmaSelection> = BTreeMap::new();
    let mut condition: Option<String> = None;

    for (key, value) in detection_map {
        let Some(name) = key.as_str() else {
            return Err(RuleError::Yaml("detection keys must be strings".to_owned()));
        };
        if name.eq_ignore_ascii_case("condition") {
            condition = value.as_str().map(str::to_owned);
            continue;
        }
        selections.insert(name.to_owned(), parse_selection(name, value)?);
    }

    if selections.is_empty() {
        return Err(RuleError::MissingDetection);
    }

    let condition = match condition {
        Some(c) => c,
        // A single selection needs no explicit condition.
        None if selections.len() == 1 => selections.keys().next().cloned().unwrap_or_default(),
        None => return Err(RuleError::MissingCondition),
    };

    let names: BTreeSet<String> = selections.keys().cloned().collect();
    let compiled_condition = CompiledCondition::compile(&condition, &names)?;

    let severity = raw
        .level
        .as_deref()
        .map(parse_severity)
        .unwrap_or_default();

    let rule = SigmaRule {
        id: raw.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        title: raw.title.unwrap_or_else(|| "untitled rule".to_owned()),
        severity,
        detection: SigmaDetection {
            selections,
            condition,
        },
    };

    Ok(CompiledRule {
        rule,
        condition: compiled_condition,
    })
}

fn parse_selection(name: &str, value: &serde_yaml::Value) -> Result<SigmaSelection, RuleError> {
    let mapping = value.as_mapping().ok_or_else(|| {
        RuleError::Yaml(format!("selection '{name}' must be a mapping of field matchers"))
    })?;

    let mut fields = Vec::with_capacity(mapping.len());
    for (key, patterns) in mapping {
        let spec = key
            .as_str()
            .ok_or_else(|| RuleError::Yaml(format!("field keys in '{name}' must be strings")))?;

        let (path, modifier) = parse_field_spec(spec)
            .ok_or_else(|| RuleError::UnsupportedModifier(spec.to_owned()))?;

        let patterns = parse_patterns(spec, patterns)?;
        fields.push(SelectionField {
            path,
            modifier,
            patterns,
        });
    }

    Ok(SigmaSelection { fields })
}

/// A pattern value is a scalar or a list of scalars (OR semantics).
fn parse_patterns(spec: &str, value: &serde_yaml::Value) -> Result<Vec<String>, RuleError> {
    if let Some(seq) = value.as_sequence() {
        if seq.is_empty() {
            return Err(RuleError::Yaml(format!("pattern list for '{spec}' is empty")));
        }
        return seq.iter().map(|item| coerce_scalar(spec, item)).collect();
    }
    Ok(vec![coerce_scalar(spec, value)?])
}

fn coerce_scalar(spec: &str, value: &serde_yaml::Value) -> Result<String, RuleError> {
    if let Some(s) = value.as_str() {
        Ok(s.to_owned())
    } else if let Some(n) = value.as_i64() {
        Ok(n.to_string())
    } else if let Some(f) = value.as_f64() {
        Ok(f.to_string())
    } else if let Some(b) = value.as_bool() {
        Ok(b.to_string())
    } else {
        Err(RuleError::Yaml(format!(
            "pattern for '{spec}' must be a scalar or a list of scalars"
        )))
    }
}

fn parse_severity(raw: &str) -> RuleSeverity {
    match raw.trim().to_ascii_lowercase().as_str() {
        "informational" | "info" => RuleSeverity::Informational,
        "low" => RuleSeverity::Low,
        "high" => RuleSeverity::High,
        "critical" => RuleSeverity::Critical,
        _ => RuleSeverity::Medium,
    }
}

/// Flatten a canonical record into the object Sigma field paths are looked
/// up in: canonical fields and metadata keys at top level (canonical fields
/// win on collision), with the metadata object also reachable under
/// `metadata.` for explicit nesting.
#[must_use]
pub fn flatten_record(record: &CanonicalLogRecord) -> Map<String, Value> {
    let mut root = Map::new();
    for (key, value) in &record.metadata {
        root.insert(key.clone(), value.clone());
    }
    root.insert("service".to_owned(), Value::String(record.service.clone()));
    root.insert(
        "level".to_owned(),
        Value::String(record.level.as_str().to_owned()),
    );
    root.insert("message".to_owned(), Value::String(record.message.clone()));
    if let Some(trace_id) = &record.trace_id {
        root.insert("trace_id".to_owned(), Value::String(trace_id.clone()));
    }
    if let Some(span_id) = &record.span_id {
        root.insert("span_id".to_owned(), Value::String(span_id.clone()));
    }
    root.insert(
        "metadata".to_owned(),
        Value::Object(record.metadata.clone().into_iter().collect()),
    );
    root
}

/// Evaluate a compiled rule against a flattened record.
///
/// Returns a detection event when the rule's condition holds, carrying the
/// field paths of every selection that evaluated true.
#[must_use]
pub fn evaluate(
    flat: &Map<String, Value>,
    record: &CanonicalLogRecord,
    compiled: &CompiledRule,
) -> Option<DetectionEvent> {
    let mut results: BTreeMap<String, bool> = BTreeMap::new();
    for (name, selection) in &compiled.rule.detection.selections {
        results.insert(name.clone(), match_selection(flat, selection, false));
    }

    if !compiled.condition.evaluate(&results) {
        return None;
    }

    let mut matched_fields: Vec<String> = Vec::new();
    for (name, matched) in &results {
        if !matched {
            continue;
        }
        if let Some(selection) = compiled.rule.detection.selections.get(name) {
            for field in &selection.fields {
                if !matched_fields.contains(&field.path) {
                    matched_fields.push(field.path.clone());
                }
            }
        }
    }

    Some(DetectionEvent {
        rule_id: compiled.rule.id.clone(),
        log_id: record.id,
        matched_fields,
        severity: compiled.rule.severity,
        timestamp: Utc::now(),
    })
}

/// Convenience wrapper: flatten and evaluate one record against one rule.
#[must_use]
pub fn evaluate_record(
    record: &CanonicalLogRecord,
    compiled: &CompiledRule,
) -> Option<DetectionEvent> {
    evaluate(&flatten_record(record), record, compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;
    use serde_json::json;

    fn record_with(metadata: Value, message: &str, level: LogLevel) -> CanonicalLogRecord {
        let mut record =
            CanonicalLogRecord::new(Utc::now(), "sshd".to_owned(), level, message.to_owned());
        record.metadata = metadata
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        record
    }

    const BRUTE_FORCE_RULE: &str = r#"
title: SSH brute force attempt
id: 7a4c3e1f-0f0a-4c5e-8e1d-1b2f3c4d5e6f
level: high
detection:
  selection:
    service: sshd
    message|contains: "Failed password"
  condition: selection
"#;

    #[test]
    fn compiles_and_matches_simple_rule() {
        let compiled = compile_rule(BRUTE_FORCE_RULE).unwrap();
        assert_eq!(compiled.rule.severity, RuleSeverity::High);
        assert_eq!(compiled.rule.title, "SSH brute force attempt");

        let record = record_with(
            json!({}),
            "Failed password for root from 10.0.0.1",
            LogLevel::Warn,
        );
        let event = evaluate_record(&record, &compiled).unwrap();
        assert_eq!(event.rule_id, "7a4c3e1f-0f0a-4c5e-8e1d-1b2f3c4d5e6f");
        assert_eq!(event.log_id, record.id);
        assert_eq!(event.severity, RuleSeverity::High);
        assert!(event.matched_fields.contains(&"service".to_owned()));
        assert!(event.matched_fields.contains(&"message".to_owned()));

        let clean = record_with(json!({}), "Accepted publickey for deploy", LogLevel::Info);
        assert!(evaluate_record(&clean, &compiled).is_none());
    }

    #[test]
    fn selection_and_pattern_array_or() {
        let rule = r#"
title: field and, pattern or
detection:
  selection:
    a:
      - x
      - y
    b: z
  condition: selection
"#;
        let compiled = compile_rule(rule).unwrap();
        let matches = |a: &str, b: &str| {
            let record = record_with(json!({"a": a, "b": b}), "", LogLevel::Info);
            evaluate_record(&record, &compiled).is_some()
        };
        assert!(matches("x", "z"));
        assert!(matches("y", "z"));
        assert!(!matches("q", "z"));
        assert!(!matches("x", "w"));
    }

    #[test]
    fn condition_with_filter() {
        let rule = r#"
title: suspicious exec minus maintenance window
detection:
  exec:
    message|contains: "/bin/sh"
  maintenance:
    service: backup-agent
  condition: exec and not maintenance
"#;
        let compiled = compile_rule(rule).unwrap();

        let suspicious = record_with(json!({}), "spawned /bin/sh -c id", LogLevel::Info);
        assert!(evaluate_record(&suspicious, &compiled).is_some());

        let mut benign = record_with(json!({}), "spawned /bin/sh -c id", LogLevel::Info);
        benign.service = "backup-agent".to_owned();
        assert!(evaluate_record(&benign, &compiled).is_none());
    }

    #[test]
    fn dot_path_into_metadata() {
        let rule = r#"
title: nested lookup
detection:
  selection:
    http.status: "500"
  condition: selection
"#;
        let compiled = compile_rule(rule).unwrap();
        let record = record_with(json!({"http": {"status": 500}}), "", LogLevel::Info);
        assert!(evaluate_record(&record, &compiled).is_some());
    }

    #[test]
    fn canonical_fields_win_metadata_collisions() {
        let record = record_with(json!({"service": "spoofed"}), "m", LogLevel::Info);
        let flat = flatten_record(&record);
        assert_eq!(flat.get("service"), Some(&json!("sshd")));
        assert_eq!(flat["metadata"]["service"], json!("spoofed"));
    }

    #[test]
    fn missing_detection_is_rejected() {
        assert!(matches!(
            compile_rule("title: no detection\n"),
            Err(RuleError::Yaml(_))
        ));
        assert!(matches!(
            compile_rule("detection: {}\n"),
            Err(RuleError::MissingDetection)
        ));
    }

    #[test]
    fn unknown_modifier_is_rejected() {
        let rule = r#"
detection:
  selection:
    message|xor: "x"
  condition: selection
"#;
        assert!(matches!(
            compile_rule(rule),
            Err(RuleError::UnsupportedModifier(_))
        ));
    }

    #[test]
    fn missing_condition_with_single_selection_defaults() {
        let rule = r#"
detection:
  selection:
    service: sshd
"#;
        let compiled = compile_rule(rule).unwrap();
        assert_eq!(compiled.rule.detection.condition, "selection");
    }

    #[test]
    fn missing_condition_with_multiple_selections_is_rejected() {
        let rule = r#"
detection:
  a:
    service: sshd
  b:
    service: nginx
"#;
        assert!(matches!(compile_rule(rule), Err(RuleError::MissingCondition)));
    }

    #[test]
    fn rule_without_id_gets_one() {
        let rule = r#"
detection:
  selection:
    service: sshd
"#;
        let compiled = compile_rule(rule).unwrap();
        assert!(!compiled.rule.id.is_empty());
    }

    #[test]
    fn numeric_patterns_coerce_to_strings() {
        let rule = r#"
detection:
  selection:
    status: 500
  condition: selection
"#;
        let compiled = compile_rule(rule).unwrap();
        let record = record_with(json!({"status": 500}), "", LogLevel::Info);
        assert!(evaluate_record(&record, &compiled).is_some());
    }
}
