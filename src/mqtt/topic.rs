//! MQTT topic filter matching
//!
//! `+` matches exactly one level and never crosses a `/`; `#` is valid
//! only as the final element and matches any tail, including the empty
//! one. Filters with a misplaced `#` match nothing.

/// Does `topic` match the subscription `filter`?
#[must_use]
pub fn matches(topic: &str, filter: &str) -> bool {
    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // multi-level wildcard: only valid as the last element
            (Some("#"), _) => return filter_levels.next().is_none(),
            // single-level wildcard consumes exactly one existing level
            (Some("+"), Some(_)) => {}
            (Some(filter_level), Some(topic_level)) if filter_level == topic_level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn exact_match() {
        assert!(matches("ccu/state", "ccu/state"));
        assert!(!matches("ccu/state", "ccu/status"));
    }

    #[test]
    fn plus_matches_exactly_one_level() {
        assert!(matches("module/v1/ff/SVR4H76449/state", "module/v1/ff/+/state"));
        assert!(!matches("module/v1/ff/a/b/state", "module/v1/ff/+/state"));
        assert!(!matches("module/v1/ff/state", "module/v1/ff/+/state"));
    }

    #[test]
    fn hash_matches_any_tail() {
        assert!(matches("t/x", "t/#"));
        assert!(matches("t/x/y/z", "t/#"));
        assert!(matches("t", "t/#"), "hash includes the parent level");
        assert!(matches("anything/at/all", "#"));
    }

    #[test]
    fn hash_only_valid_as_last_element() {
        assert!(!matches("t/x/y", "t/#/y"));
    }

    #[test]
    fn leading_slash_levels_are_significant() {
        assert!(matches("/j1/txt/1/i/ldr", "/j1/txt/1/i/+"));
        assert!(!matches("j1/txt/1/i/ldr", "/j1/txt/1/i/+"));
    }

    #[test]
    fn plus_does_not_cross_levels() {
        assert!(matches("fts/v1/ff/5iO4/state", "fts/v1/ff/+/state"));
        assert!(!matches("fts/v1/ff/5iO4/extra/state", "fts/v1/ff/+/state"));
    }
}
