//! Per-object conflict resolution against a target.

use crate::kind::ObjectKind;
use crate::model::{ConfigObject, Container};

/// What the importer does with one object. Terminal in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    SkipExists,
    SkipProvenance,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::SkipExists => "skip (exists)",
            Action::SkipProvenance => "skip (provenance)",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decide the action for one object.
///
/// Total function: provenance wins over everything (never fight a
/// reconciling controller), then absence means create, then the kind's
/// re-import policy decides between update and skip. Dashboards update
/// only when `overwrite_dashboards` is set.
pub fn resolve(
    object: &ConfigObject,
    existing: Option<&ConfigObject>,
    target_container: Option<&Container>,
    overwrite_dashboards: bool,
) -> Action {
    if target_container.and_then(|c| c.provenance.as_deref()).is_some()
        || object.provenance.is_some()
    {
        return Action::SkipProvenance;
    }

    match existing {
        None => Action::Create,
        Some(_) => {
            let replace = object.kind.replaceable()
                || (object.kind == ObjectKind::Dashboard && overwrite_dashboards);
            if replace {
                Action::Update
            } else {
                Action::SkipExists
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(kind: ObjectKind) -> ConfigObject {
        ConfigObject::new(kind, "thing", "Prod", json!({}))
    }

    #[test]
    fn test_absent_object_is_created() {
        let obj = object(ObjectKind::ContactPoint);
        assert_eq!(resolve(&obj, None, None, false), Action::Create);
    }

    #[test]
    fn test_existing_replaceable_kind_is_updated() {
        for kind in [
            ObjectKind::ContactPoint,
            ObjectKind::MuteTiming,
            ObjectKind::Template,
            ObjectKind::NotificationPolicy,
            ObjectKind::RuleGroup,
            ObjectKind::AlertRule,
        ] {
            let obj = object(kind);
            let existing = object(kind);
            assert_eq!(
                resolve(&obj, Some(&existing), None, false),
                Action::Update,
                "{} should replace",
                kind
            );
        }
    }

    #[test]
    fn test_existing_dashboard_skips_unless_overwrite() {
        let obj = object(ObjectKind::Dashboard);
        let existing = object(ObjectKind::Dashboard);
        assert_eq!(resolve(&obj, Some(&existing), None, false), Action::SkipExists);
        assert_eq!(resolve(&obj, Some(&existing), None, true), Action::Update);
    }

    #[test]
    fn test_provenance_on_target_container_always_skips() {
        let obj = object(ObjectKind::RuleCrd);
        let ns = crate::model::Container::namespace("prometheus").with_provenance("helm");
        // even an absent object is skipped, not created
        assert_eq!(resolve(&obj, None, Some(&ns), false), Action::SkipProvenance);
        let existing = object(ObjectKind::RuleCrd);
        assert_eq!(
            resolve(&obj, Some(&existing), Some(&ns), true),
            Action::SkipProvenance
        );
    }

    #[test]
    fn test_provenance_on_object_itself_skips() {
        let obj = object(ObjectKind::RuleCrd).with_provenance("helm");
        assert_eq!(resolve(&obj, None, None, false), Action::SkipProvenance);
    }
}
