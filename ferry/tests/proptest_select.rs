//! Property tests for selector monotonicity and path sanitization.

use proptest::prelude::*;

use ferry::tree::safe_component;
use ferry::SelectionPolicy;

fn title_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 /_-]{0,24}"
}

fn titles_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(title_strategy(), 0..6)
}

proptest! {
    /// Widening the include list never unselects a container.
    #[test]
    fn prop_widening_include_is_monotone(
        title in title_strategy(),
        include in titles_strategy(),
        extra in title_strategy(),
        exclude in titles_strategy(),
    ) {
        let narrow = SelectionPolicy::new(include.clone(), exclude.clone());
        let mut widened = include;
        widened.push(extra);
        let wide = SelectionPolicy::new(widened, exclude);
        if narrow.selected(&title) {
            prop_assert!(wide.selected(&title));
        }
    }

    /// Shrinking the exclude list never unselects a container.
    #[test]
    fn prop_narrowing_exclude_is_monotone(
        title in title_strategy(),
        include in titles_strategy(),
        exclude in titles_strategy(),
    ) {
        let with_excludes = SelectionPolicy::new(include.clone(), exclude);
        let without_excludes = SelectionPolicy::new(include, vec![]);
        if with_excludes.selected(&title) {
            prop_assert!(without_excludes.selected(&title));
        }
    }

    /// Selection is insensitive to title casing.
    #[test]
    fn prop_selection_ignores_case(
        title in title_strategy(),
        include in titles_strategy(),
        exclude in titles_strategy(),
    ) {
        let policy = SelectionPolicy::new(include, exclude);
        prop_assert_eq!(
            policy.selected(&title),
            policy.selected(&title.to_uppercase())
        );
    }

    /// Sanitized components are always safe path segments.
    #[test]
    fn prop_safe_component_has_no_hostile_chars(name in ".{0,200}") {
        let safe = safe_component(&name);
        prop_assert!(!safe.is_empty());
        prop_assert!(safe.chars().count() <= 100);
        for c in safe.chars() {
            prop_assert!(c != '/' && c != '\\' && c != '"' && c != '\'');
            prop_assert!(!c.is_whitespace());
        }
    }
}
