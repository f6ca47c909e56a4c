//! Template lookup and non-blocking payload validation
//!
//! Validation never fails the message path: findings come back as a list
//! of human-readable strings and a warning log, and the caller decides.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{Registry, Template, TemplateMatch};

/// Maximum `extends` chain depth before the walk gives up
const MAX_EXTENDS_DEPTH: usize = 8;

/// Normalize a template key: slash and dot forms are equivalent
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.replace('/', ".")
}

/// Template lookup with hierarchical fallback and payload validation
pub struct TemplateManager {
    registry: Arc<Registry>,
    missing: Mutex<BTreeSet<String>>,
    validation_failures: AtomicU64,
}

impl TemplateManager {
    /// Create a manager over the given registry
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            missing: Mutex::new(BTreeSet::new()),
            validation_failures: AtomicU64::new(0),
        }
    }

    /// Look up a template by key
    ///
    /// Accepts both `a/b/c` and `a.b.c` forms. When the exact key is
    /// absent, falls back hierarchically (`a.b.c` → `a.b` → `a`).
    /// Returns `None` and records the key when nothing matches.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Template> {
        let normalized = normalize_key(key);
        let templates = self.registry.templates();

        if let Some(template) = templates.get(&normalized) {
            return Some(template.clone());
        }

        // hierarchical fallback: trim trailing segments
        let mut prefix = normalized.as_str();
        while let Some(pos) = prefix.rfind('.') {
            prefix = &prefix[..pos];
            if let Some(template) = templates.get(prefix) {
                tracing::debug!(key = %normalized, fallback = %prefix, "template fallback");
                return Some(template.clone());
            }
        }

        self.record_missing(&normalized);
        None
    }

    /// Effective match constraints for a key, merging its `extends` chain
    ///
    /// Required fields are the union over the chain; `command_enum` and
    /// per-field enums come from the most derived template that sets them.
    #[must_use]
    pub fn effective_matcher(&self, key: &str) -> Option<TemplateMatch> {
        let templates = self.registry.templates();
        let mut merged = TemplateMatch::default();
        let mut current = normalize_key(key);

        for depth in 0.. {
            if depth >= MAX_EXTENDS_DEPTH {
                tracing::warn!(key = %key, "extends chain too deep, truncating");
                break;
            }
            let Some(template) = templates.get(&current) else {
                if depth == 0 {
                    return self.get(key).map(|t| t.matcher);
                }
                break;
            };
            for field in &template.matcher.required_fields {
                if !merged.required_fields.contains(field) {
                    merged.required_fields.push(field.clone());
                }
            }
            if merged.command_enum.is_none() {
                merged.command_enum = template.matcher.command_enum.clone();
            }
            for (field, values) in &template.matcher.enums {
                merged
                    .enums
                    .entry(field.clone())
                    .or_insert_with(|| values.clone());
            }
            match &template.extends {
                Some(parent) => current = normalize_key(parent),
                None => break,
            }
        }
        Some(merged)
    }

    /// Validate a payload against a template, non-blocking
    ///
    /// Returns a list of human-readable findings; an empty list means the
    /// payload satisfies every declared constraint. A missing template
    /// yields a single `Template missing: <key>` finding.
    #[must_use]
    pub fn validate_payload(&self, key: &str, payload: &Value) -> Vec<String> {
        let normalized = normalize_key(key);
        let Some(matcher) = self.effective_matcher(&normalized) else {
            self.record_missing(&normalized);
            return vec![format!("Template missing: {normalized}")];
        };

        let mut findings = Vec::new();

        for field in &matcher.required_fields {
            if lookup_path(payload, field).is_none() {
                findings.push(format!("Missing required field: {field}"));
            }
        }

        if let Some(allowed) = &matcher.command_enum {
            let command = lookup_path(payload, "command")
                .or_else(|| lookup_path(payload, "action.command"));
            if let Some(Value::String(command)) = command {
                if !allowed.contains(command) {
                    findings.push(format!(
                        "Command not in enum: {command} (allowed: {})",
                        allowed.join(", ")
                    ));
                }
            }
        }

        for (field, allowed) in &matcher.enums {
            if let Some(Value::String(value)) = lookup_path(payload, field) {
                if !allowed.contains(value) {
                    findings.push(format!(
                        "Field {field} not in enum: {value} (allowed: {})",
                        allowed.join(", ")
                    ));
                }
            }
        }

        if !findings.is_empty() {
            self.validation_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                template = %normalized,
                findings = ?findings,
                "payload validation findings"
            );
        }
        findings
    }

    /// Keys looked up but never resolved
    #[must_use]
    pub fn missing_templates(&self) -> Vec<String> {
        self.missing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of payloads that produced at least one finding
    #[must_use]
    pub fn validation_failures(&self) -> u64 {
        self.validation_failures.load(Ordering::Relaxed)
    }

    /// Mapping entries whose template key resolves to nothing
    ///
    /// Each dangling reference comes back as `(route, template_key)`,
    /// where `route` is the entry's exact topic or pattern. Resolution
    /// goes through [`TemplateManager::get`], so an entry served by the
    /// hierarchical fallback at runtime does not count as dangling.
    #[must_use]
    pub fn dangling_mapping_refs(&self) -> Vec<(String, String)> {
        let mapping = self.registry.mapping();
        let mut dangling = Vec::new();
        for entry in &mapping.mappings {
            if self.get(&entry.template).is_none() {
                let route = entry
                    .topic
                    .clone()
                    .or_else(|| entry.pattern.clone())
                    .unwrap_or_default();
                dangling.push((route, normalize_key(&entry.template)));
            }
        }
        dangling
    }

    fn record_missing(&self, key: &str) {
        let mut missing = self
            .missing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if missing.insert(key.to_string()) {
            tracing::warn!(template = %key, "template missing");
        }
    }
}

/// Resolve a dotted path (`action.metadata.priority`) inside a payload
fn lookup_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn registry_with_templates(files: &[(&str, &str)]) -> (Arc<Registry>, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.yml"), "version: \"1.0.0\"").unwrap();
        let tpl_dir = dir.path().join("templates");
        fs::create_dir(&tpl_dir).unwrap();
        for (name, body) in files {
            fs::write(tpl_dir.join(format!("{name}.yml")), body).unwrap();
        }
        let registry = Registry::load(dir.path()).unwrap();
        (Arc::new(registry), dir)
    }

    #[test]
    fn slash_and_dot_forms_resolve_identically() {
        let (registry, _dir) = registry_with_templates(&[(
            "module.order",
            "match:\n  required_fields: [serialNumber]\n",
        )]);
        let manager = TemplateManager::new(registry);

        assert!(manager.get("module.order").is_some());
        assert!(manager.get("module/order").is_some());
    }

    #[test]
    fn hierarchical_fallback_trims_segments() {
        let (registry, _dir) =
            registry_with_templates(&[("module.state", "match:\n  required_fields: [state]\n")]);
        let manager = TemplateManager::new(registry);

        let template = manager.get("module.state.hbw_inventory");
        assert!(template.is_some());
        assert!(manager.missing_templates().is_empty());
    }

    #[test]
    fn missing_key_recorded_once() {
        let (registry, _dir) = registry_with_templates(&[]);
        let manager = TemplateManager::new(registry);

        assert!(manager.get("nowhere.to.be.found").is_none());
        assert!(manager.get("nowhere.to.be.found").is_none());
        assert_eq!(manager.missing_templates().len(), 1);
    }

    #[test]
    fn validate_reports_missing_template() {
        let (registry, _dir) = registry_with_templates(&[]);
        let manager = TemplateManager::new(registry);

        let findings = manager.validate_payload("ghost", &json!({}));
        assert_eq!(findings, vec!["Template missing: ghost".to_string()]);
    }

    #[test]
    fn validate_required_fields_and_command_enum() {
        let (registry, _dir) = registry_with_templates(&[(
            "module.order",
            r"
match:
  required_fields: [serialNumber, orderId, action.command]
  command_enum: [PICK, DRILL, DROP]
",
        )]);
        let manager = TemplateManager::new(registry);

        let good = json!({
            "serialNumber": "SVR4H76449",
            "orderId": "6b9e8c3a-0000-4000-8000-000000000000",
            "action": {"command": "DRILL"}
        });
        assert!(manager.validate_payload("module.order", &good).is_empty());

        let bad = json!({
            "serialNumber": "SVR4H76449",
            "action": {"command": "EXPLODE"}
        });
        let findings = manager.validate_payload("module.order", &bad);
        assert_eq!(findings.len(), 2);
        assert!(findings[0].contains("orderId"));
        assert!(findings[1].contains("EXPLODE"));
        assert_eq!(manager.validation_failures(), 1);
    }

    #[test]
    fn extends_chain_merges_required_fields() {
        let (registry, _dir) = registry_with_templates(&[
            ("base", "match:\n  required_fields: [timestamp]\n"),
            (
                "module.order",
                "extends: base\nmatch:\n  required_fields: [serialNumber]\n",
            ),
        ]);
        let manager = TemplateManager::new(registry);

        let matcher = manager.effective_matcher("module.order").unwrap();
        assert!(matcher.required_fields.contains(&"serialNumber".to_string()));
        assert!(matcher.required_fields.contains(&"timestamp".to_string()));
    }

    #[test]
    fn dangling_mapping_refs_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.yml"), "version: \"1.0.0\"").unwrap();
        fs::create_dir(dir.path().join("mappings")).unwrap();
        fs::write(
            dir.path().join("mappings/topic_template.yml"),
            r"
mappings:
  - pattern: module/v1/ff/{module_id}/order
    template: module.order
  - topic: ccu/order/request
    template: ccu.order.requestt
",
        )
        .unwrap();
        let tpl_dir = dir.path().join("templates");
        fs::create_dir(&tpl_dir).unwrap();
        fs::write(
            tpl_dir.join("module.order.yml"),
            "match:\n  required_fields: [serialNumber]\n",
        )
        .unwrap();
        let manager = TemplateManager::new(Arc::new(Registry::load(dir.path()).unwrap()));

        let dangling = manager.dangling_mapping_refs();
        assert_eq!(
            dangling,
            vec![(
                "ccu/order/request".to_string(),
                "ccu.order.requestt".to_string()
            )]
        );
    }

    #[test]
    fn command_in_enum_yields_no_findings() {
        let (registry, _dir) = registry_with_templates(&[(
            "module.order",
            "match:\n  command_enum: [PICK, MILL, DROP]\n",
        )]);
        let manager = TemplateManager::new(registry);

        for command in ["PICK", "MILL", "DROP"] {
            let payload = json!({"command": command});
            assert!(manager.validate_payload("module.order", &payload).is_empty());
        }
    }
}
