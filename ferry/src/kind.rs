//! Configuration object kinds: on-disk layout metadata and import ordering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::ContainerKind;

/// The kinds of configuration objects the engine can back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    Dashboard,
    AlertRule,
    ContactPoint,
    NotificationPolicy,
    MuteTiming,
    Template,
    RuleGroup,
    RuleCrd,
}

/// How a kind's objects are laid out inside a backup tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStyle {
    /// One file per object: `<kind-dir>/<container>/<identity>.<ext>`
    PerObject,
    /// One file per container holding a list of payloads:
    /// `<kind-dir>/<container>.<ext>`
    PerContainer,
    /// A single root-level file holding a list of payloads: `<kind-dir>.<ext>`
    RootList,
    /// One file per object in a container directory at the tree root:
    /// `<container>/<identity>.<ext>`
    RootPerObject,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 8] = [
        ObjectKind::Dashboard,
        ObjectKind::AlertRule,
        ObjectKind::ContactPoint,
        ObjectKind::NotificationPolicy,
        ObjectKind::MuteTiming,
        ObjectKind::Template,
        ObjectKind::RuleGroup,
        ObjectKind::RuleCrd,
    ];

    /// Stable kind name, also used in manifests and reports.
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Dashboard => "dashboard",
            ObjectKind::AlertRule => "alert-rule",
            ObjectKind::ContactPoint => "contact-point",
            ObjectKind::NotificationPolicy => "notification-policy",
            ObjectKind::MuteTiming => "mute-timing",
            ObjectKind::Template => "template",
            ObjectKind::RuleGroup => "rule-group",
            ObjectKind::RuleCrd => "rule-crd",
        }
    }

    /// Directory (or root file stem) this kind occupies in the backup tree.
    /// `RuleCrd` has none: its namespace directories live at the tree root.
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            ObjectKind::Dashboard => Some("dashboards"),
            ObjectKind::AlertRule | ObjectKind::RuleGroup => Some("alert-rules-by-folder"),
            ObjectKind::ContactPoint => Some("contact-points"),
            ObjectKind::NotificationPolicy => Some("notification-policies"),
            ObjectKind::MuteTiming => Some("mute-timings"),
            ObjectKind::Template => Some("templates"),
            ObjectKind::RuleCrd => None,
        }
    }

    pub fn storage_style(&self) -> StorageStyle {
        match self {
            ObjectKind::Dashboard => StorageStyle::PerObject,
            ObjectKind::AlertRule | ObjectKind::RuleGroup => StorageStyle::PerContainer,
            ObjectKind::ContactPoint
            | ObjectKind::NotificationPolicy
            | ObjectKind::MuteTiming
            | ObjectKind::Template => StorageStyle::RootList,
            ObjectKind::RuleCrd => StorageStyle::RootPerObject,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ObjectKind::RuleCrd => "yaml",
            _ => "json",
        }
    }

    /// The grouping unit this kind's containers belong to.
    pub fn container_kind(&self) -> ContainerKind {
        match self {
            ObjectKind::RuleCrd => ContainerKind::Namespace,
            _ => ContainerKind::Folder,
        }
    }

    /// Sentinel container for objects that carry none of their own.
    pub fn sentinel_container(&self) -> &'static str {
        match self.container_kind() {
            ContainerKind::Folder => "General",
            ContainerKind::Namespace => "default",
        }
    }

    /// Whether the container must exist at the target before this kind's
    /// objects can be applied.
    pub fn requires_container(&self) -> bool {
        matches!(
            self,
            ObjectKind::Dashboard
                | ObjectKind::AlertRule
                | ObjectKind::RuleGroup
                | ObjectKind::RuleCrd
        )
    }

    /// Whether re-import replaces an existing object of this kind.
    /// Dashboards are immutable-by-convention unless the overwrite flag is
    /// set; everything else supports idempotent replace.
    pub fn replaceable(&self) -> bool {
        !matches!(self, ObjectKind::Dashboard)
    }

    /// Rank in the fixed import partial order. Kinds referenced by others
    /// come first; `None` means the kind is outside the fixed order and is
    /// appended last, lexicographically.
    fn order_rank(&self) -> Option<u8> {
        match self {
            ObjectKind::MuteTiming => Some(0),
            ObjectKind::Template => Some(1),
            ObjectKind::ContactPoint => Some(2),
            ObjectKind::NotificationPolicy => Some(3),
            ObjectKind::AlertRule | ObjectKind::RuleGroup => Some(4),
            ObjectKind::Dashboard | ObjectKind::RuleCrd => None,
        }
    }

    /// Import sequence for the kinds present in a backup tree.
    ///
    /// Deterministic: fixed-order kinds first by rank, then the rest by
    /// kind name. Getting this wrong is not fatal (out-of-order imports
    /// surface as ordinary per-object failures), it just avoids them.
    pub fn sequence(present: &BTreeSet<ObjectKind>) -> Vec<ObjectKind> {
        let mut kinds: Vec<ObjectKind> = present.iter().copied().collect();
        kinds.sort_by_key(|k| (k.order_rank().unwrap_or(u8::MAX), k.name()));
        kinds
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dashboard" | "dashboards" => Ok(ObjectKind::Dashboard),
            "alert-rule" | "alert-rules" => Ok(ObjectKind::AlertRule),
            "contact-point" | "contact-points" => Ok(ObjectKind::ContactPoint),
            "notification-policy" | "notification-policies" => Ok(ObjectKind::NotificationPolicy),
            "mute-timing" | "mute-timings" => Ok(ObjectKind::MuteTiming),
            "template" | "templates" => Ok(ObjectKind::Template),
            "rule-group" | "rule-groups" => Ok(ObjectKind::RuleGroup),
            "rule-crd" | "rule-crds" => Ok(ObjectKind::RuleCrd),
            _ => Err(format!("Unknown object kind '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(kinds: &[ObjectKind]) -> BTreeSet<ObjectKind> {
        kinds.iter().copied().collect()
    }

    #[test]
    fn test_sequence_fixed_order() {
        let present = set(&[
            ObjectKind::NotificationPolicy,
            ObjectKind::ContactPoint,
            ObjectKind::MuteTiming,
            ObjectKind::Template,
        ]);
        assert_eq!(
            ObjectKind::sequence(&present),
            vec![
                ObjectKind::MuteTiming,
                ObjectKind::Template,
                ObjectKind::ContactPoint,
                ObjectKind::NotificationPolicy,
            ]
        );
    }

    #[test]
    fn test_sequence_appends_unordered_kinds_lexicographically() {
        let present = set(&[
            ObjectKind::RuleCrd,
            ObjectKind::Dashboard,
            ObjectKind::ContactPoint,
        ]);
        // dashboard < rule-crd by name; both come after the fixed order
        assert_eq!(
            ObjectKind::sequence(&present),
            vec![
                ObjectKind::ContactPoint,
                ObjectKind::Dashboard,
                ObjectKind::RuleCrd,
            ]
        );
    }

    #[test]
    fn test_sequence_is_deterministic() {
        let present = set(&ObjectKind::ALL);
        let a = ObjectKind::sequence(&present);
        let b = ObjectKind::sequence(&present);
        assert_eq!(a, b);
        // Contact points strictly precede notification policies
        let cp = a.iter().position(|k| *k == ObjectKind::ContactPoint).unwrap();
        let np = a
            .iter()
            .position(|k| *k == ObjectKind::NotificationPolicy)
            .unwrap();
        assert!(cp < np);
    }

    #[test]
    fn test_kind_name_round_trip() {
        for kind in ObjectKind::ALL {
            assert_eq!(kind.name().parse::<ObjectKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_rule_kinds_share_layout() {
        assert_eq!(
            ObjectKind::AlertRule.dir_name(),
            ObjectKind::RuleGroup.dir_name()
        );
        assert_eq!(
            ObjectKind::AlertRule.storage_style(),
            ObjectKind::RuleGroup.storage_style()
        );
    }
}
