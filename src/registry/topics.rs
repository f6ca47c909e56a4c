//! Concrete topic → template resolution
//!
//! Resolution is two deterministic passes over the mapping file: exact
//! entries first in declaration order, then pattern entries in declaration
//! order. A `{name}` pattern variable matches exactly one MQTT level and
//! produces a named capture. `route` never errors; unknown topics are
//! recorded once and logged once to bound noise.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use regex::Regex;

use super::{Direction, MappingFile, Registry};

/// Result of resolving a concrete topic
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Template key the topic maps to
    pub template: String,

    /// Message direction
    pub direction: Direction,

    /// Variables extracted from a pattern match (empty for exact)
    pub vars: BTreeMap<String, String>,

    /// Metadata carried on the mapping entry
    pub meta: Option<serde_yaml::Value>,
}

/// Compiled view of one mapping file generation
struct Compiled {
    /// Source mapping; pointer identity detects hot reload
    mapping: Arc<MappingFile>,

    /// (topic, entry index) for exact entries
    exact: Vec<(String, usize)>,

    /// (regex, entry index) for pattern entries
    patterns: Vec<(Regex, usize)>,
}

/// Topic resolver with unknown-topic telemetry
pub struct TopicResolver {
    registry: Arc<Registry>,
    compiled: Mutex<Option<Compiled>>,
    unknown: Mutex<BTreeSet<String>>,
}

impl TopicResolver {
    /// Create a resolver over the given registry
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            compiled: Mutex::new(None),
            unknown: Mutex::new(BTreeSet::new()),
        }
    }

    /// Resolve a concrete topic, exact entries before patterns
    ///
    /// Returns `None` for unknown topics; never errors.
    #[must_use]
    pub fn route(&self, topic: &str) -> Option<RouteMatch> {
        let mapping = self.registry.mapping();
        let mut guard = self
            .compiled
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let stale = guard
            .as_ref()
            .is_none_or(|c| !Arc::ptr_eq(&c.mapping, &mapping));
        if stale {
            *guard = Some(compile(mapping));
        }
        let compiled = guard.as_ref()?;

        // exact pass
        for (exact_topic, idx) in &compiled.exact {
            if exact_topic == topic {
                let entry = &compiled.mapping.mappings[*idx];
                return Some(RouteMatch {
                    template: entry.template.clone(),
                    direction: entry
                        .direction
                        .unwrap_or(compiled.mapping.default_direction),
                    vars: BTreeMap::new(),
                    meta: entry.meta.clone(),
                });
            }
        }

        // pattern pass
        for (regex, idx) in &compiled.patterns {
            if let Some(captures) = regex.captures(topic) {
                let entry = &compiled.mapping.mappings[*idx];
                let mut vars = BTreeMap::new();
                for name in regex.capture_names().flatten() {
                    if let Some(value) = captures.name(name) {
                        vars.insert(name.to_string(), value.as_str().to_string());
                    }
                }
                return Some(RouteMatch {
                    template: entry.template.clone(),
                    direction: entry
                        .direction
                        .unwrap_or(compiled.mapping.default_direction),
                    vars,
                    meta: entry.meta.clone(),
                });
            }
        }

        drop(guard);
        self.record_unknown(topic);
        None
    }

    /// Topics seen but never resolved
    #[must_use]
    pub fn unknown_topics(&self) -> Vec<String> {
        self.unknown
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn record_unknown(&self, topic: &str) {
        let mut unknown = self
            .unknown
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if unknown.insert(topic.to_string()) {
            tracing::warn!(topic = %topic, "no mapping for topic");
        }
    }
}

/// Split a mapping generation into exact and compiled-pattern passes
fn compile(mapping: Arc<MappingFile>) -> Compiled {
    let mut exact = Vec::new();
    let mut patterns = Vec::new();

    for (idx, entry) in mapping.mappings.iter().enumerate() {
        if let Some(topic) = &entry.topic {
            exact.push((topic.clone(), idx));
        } else if let Some(pattern) = &entry.pattern {
            let source = pattern_to_regex(pattern).unwrap_or_else(|| {
                tracing::warn!(pattern = %pattern, "malformed pattern variables, matching literally");
                format!("^{}$", regex::escape(pattern))
            });
            match Regex::new(&source) {
                Ok(regex) => patterns.push((regex, idx)),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "pattern failed to compile, skipping");
                }
            }
        } else {
            tracing::warn!(template = %entry.template, "mapping entry without topic or pattern, skipping");
        }
    }

    Compiled {
        mapping,
        exact,
        patterns,
    }
}

/// Translate `{name}` variables into anchored named captures
///
/// A variable matches one MQTT level (`[^/]+`). Returns `None` when the
/// variable syntax is malformed (unclosed brace, empty or non-identifier
/// name); the caller then falls back to a literal match.
fn pattern_to_regex(pattern: &str) -> Option<String> {
    let mut out = String::from("^");
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        out.push_str(&regex::escape(&rest[..open]));
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        let name = &after[..close];
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return None;
        }
        out.push_str("(?P<");
        out.push_str(name);
        out.push_str(">[^/]+)");
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return None;
    }
    out.push_str(&regex::escape(rest));
    out.push('$');
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn resolver_with_mapping(yaml: &str) -> (TopicResolver, TempDir) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest.yml"), "version: \"1.0.0\"").unwrap();
        fs::create_dir(dir.path().join("mappings")).unwrap();
        fs::write(dir.path().join("mappings/topic_template.yml"), yaml).unwrap();
        let registry = Registry::load(dir.path()).unwrap();
        (TopicResolver::new(Arc::new(registry)), dir)
    }

    const MAPPING: &str = r"
mappings:
  - topic: module/v1/ff/SVR3QA0022/state
    template: module.state.hbw_inventory
  - pattern: module/v1/ff/{module_id}/state
    template: module.state
  - pattern: module/v1/ff/{module_id}/order
    template: module.order
    direction: outbound
  - topic: ccu/order/request
    template: ccu.order.request
    direction: outbound
";

    #[test]
    fn exact_wins_over_matching_pattern() {
        let (resolver, _dir) = resolver_with_mapping(MAPPING);

        let hbw = resolver.route("module/v1/ff/SVR3QA0022/state").unwrap();
        assert_eq!(hbw.template, "module.state.hbw_inventory");
        assert!(hbw.vars.is_empty());

        let drill = resolver.route("module/v1/ff/SVR4H76449/state").unwrap();
        assert_eq!(drill.template, "module.state");
        assert_eq!(drill.vars["module_id"], "SVR4H76449");
    }

    #[test]
    fn pattern_variable_matches_single_level() {
        let (resolver, _dir) = resolver_with_mapping(MAPPING);
        assert!(resolver.route("module/v1/ff/a/b/state").is_none());
    }

    #[test]
    fn direction_defaults_to_inbound() {
        let (resolver, _dir) = resolver_with_mapping(MAPPING);

        let state = resolver.route("module/v1/ff/SVR4H76449/state").unwrap();
        assert_eq!(state.direction, Direction::Inbound);

        let order = resolver.route("module/v1/ff/SVR4H76449/order").unwrap();
        assert_eq!(order.direction, Direction::Outbound);
    }

    #[test]
    fn unknown_topics_recorded_once() {
        let (resolver, _dir) = resolver_with_mapping(MAPPING);

        assert!(resolver.route("never/mapped").is_none());
        assert!(resolver.route("never/mapped").is_none());
        assert!(resolver.route("also/unmapped").is_none());
        assert_eq!(resolver.unknown_topics().len(), 2);
    }

    #[test]
    fn malformed_pattern_falls_back_to_literal() {
        let (resolver, _dir) = resolver_with_mapping(
            r"
mappings:
  - pattern: broken/{un closed/state
    template: broken.literal
",
        );

        // the pattern only matches itself, literally
        assert!(resolver.route("broken/x/state").is_none());
        let literal = resolver.route("broken/{un closed/state").unwrap();
        assert_eq!(literal.template, "broken.literal");
    }

    #[test]
    fn pattern_to_regex_shapes() {
        assert_eq!(
            pattern_to_regex("module/v1/ff/{id}/state").unwrap(),
            "^module/v1/ff/(?P<id>[^/]+)/state$"
        );
        assert!(pattern_to_regex("a/{bad name}/b").is_none());
        assert!(pattern_to_regex("a/{}/b").is_none());
        assert!(pattern_to_regex("a/{unclosed/b").is_none());
    }
}
