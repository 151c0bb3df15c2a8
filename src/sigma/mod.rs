//! Sigma detection engine: field matching, condition grammar, rule
//! compilation, and the per-project rule registry.

pub mod condition;
pub mod evaluator;
pub mod field;

pub use condition::{CompiledCondition, ConditionError};
pub use evaluator::{CompiledRule, compile_rule, evaluate, evaluate_record, flatten_record};
pub use field::{match_pattern, match_selection, parse_field_spec};

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

/// Why a rule document failed to compile. Rules fail closed: a rule that
/// cannot be compiled faithfully is not loaded at all.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("invalid rule YAML: {0}")]
    Yaml(String),

    #[error("rule has no detection block with selections")]
    MissingDetection,

    #[error("rule with multiple selections requires a condition")]
    MissingCondition,

    #[error("unsupported field modifier: {0}")]
    UnsupportedModifier(String),

    #[error(transparent)]
    Condition(#[from] ConditionError),
}

/// Active rules per project, swapped atomically on reload.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, Arc<Vec<CompiledRule>>>>,
}

impl RuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a project's active rule set.
    pub fn replace_project(&self, project_id: &str, rules: Vec<CompiledRule>) {
        let mut guard = self.rules.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(project_id.to_owned(), Arc::new(rules));
    }

    /// The project's active rules; empty when none are loaded.
    #[must_use]
    pub fn active_rules(&self, project_id: &str) -> Arc<Vec<CompiledRule>> {
        let guard = self.rules.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(project_id).cloned().unwrap_or_default()
    }

    /// Compile a set of YAML documents for a project. Documents that fail
    /// to compile are skipped and reported; the rest become active.
    pub fn load_documents(&self, project_id: &str, documents: &[String]) -> Vec<RuleError> {
        let mut compiled = Vec::with_capacity(documents.len());
        let mut failures = Vec::new();
        for document in documents {
            match compile_rule(document) {
                Ok(rule) => compiled.push(rule),
                Err(e) => failures.push(e),
            }
        }
        info!(
            project_id,
            loaded = compiled.len(),
            failed = failures.len(),
            "Loaded sigma rules"
        );
        self.replace_project(project_id, compiled);
        failures
    }

    /// Load every `*.yml`/`*.yaml` file under a directory into a project's
    /// rule set. Unreadable files and uncompilable rules are logged and
    /// skipped; a missing directory loads nothing.
    pub fn load_dir(&self, project_id: &str, dir: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(dir) else {
            warn!(path = %dir.display(), "Rules directory not readable, loading no rules");
            return 0;
        };

        let mut documents = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));
            if !is_yaml {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(document) => documents.push(document),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable rule file"),
            }
        }

        let failures = self.load_documents(project_id, &documents);
        for failure in &failures {
            warn!(project_id, error = %failure, "Skipping invalid sigma rule");
        }
        documents.len() - failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_RULE: &str = r#"
title: valid
detection:
  selection:
    service: sshd
  condition: selection
"#;

    const BROKEN_RULE: &str = r#"
title: broken
detection:
  selection:
    message|xor: nope
  condition: selection
"#;

    #[test]
    fn registry_swaps_rule_sets() {
        let registry = RuleRegistry::new();
        assert!(registry.active_rules("p1").is_empty());

        let failures =
            registry.load_documents("p1", &[VALID_RULE.to_owned(), BROKEN_RULE.to_owned()]);
        assert_eq!(failures.len(), 1);
        assert_eq!(registry.active_rules("p1").len(), 1);
        assert!(registry.active_rules("p2").is_empty());

        registry.replace_project("p1", Vec::new());
        assert!(registry.active_rules("p1").is_empty());
    }
}
