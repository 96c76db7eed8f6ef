//! Core data model: containers, configuration objects, and the thin
//! kind-specific payload adapters.
//!
//! Payloads are opaque `serde_json::Value` documents. The adapters below are
//! the only code that looks inside one, and only far enough to recover an
//! object's natural key and owning container.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::ObjectKind;

/// The grouping unit a service organizes configuration under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Folder,
    Namespace,
}

/// A folder (dashboards/alerting) or a namespace (rule CRDs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub title: String,
    /// Source-assigned uid. Not stable across instances; never used for
    /// cross-instance matching.
    #[serde(default)]
    pub uid: String,
    pub kind: ContainerKind,
    /// Marker meaning "owned by an automated reconciler, do not overwrite".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
}

impl Container {
    pub fn folder(title: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uid: uid.into(),
            kind: ContainerKind::Folder,
            provenance: None,
        }
    }

    pub fn namespace(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uid: String::new(),
            kind: ContainerKind::Namespace,
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, marker: impl Into<String>) -> Self {
        self.provenance = Some(marker.into());
        self
    }
}

/// The unit of backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigObject {
    pub kind: ObjectKind,
    /// Kind-specific natural key: title for dashboards, name for alerting
    /// primitives, group name for rule groups, resource name for rule CRDs.
    pub identity: String,
    /// Owning folder title or namespace. May be the kind's sentinel.
    pub container: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
}

impl ConfigObject {
    pub fn new(
        kind: ObjectKind,
        identity: impl Into<String>,
        container: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            identity: identity.into(),
            container: container.into(),
            payload,
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, marker: impl Into<String>) -> Self {
        self.provenance = Some(marker.into());
        self
    }

    /// Rebuild an object from a payload read back out of a backup tree.
    /// Identity and container fall back to the on-disk names when the
    /// payload does not carry them.
    pub fn from_payload(
        kind: ObjectKind,
        payload: Value,
        fallback_identity: &str,
        fallback_container: &str,
    ) -> Self {
        let identity =
            identity_from_payload(kind, &payload).unwrap_or_else(|| fallback_identity.to_string());
        let container = container_from_payload(kind, &payload)
            .unwrap_or_else(|| fallback_container.to_string());
        let provenance = provenance_from_payload(&payload);
        Self {
            kind,
            identity,
            container,
            payload,
            provenance,
        }
    }
}

fn non_empty(value: &Value) -> Option<String> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// Extract an object's natural key from its payload.
pub fn identity_from_payload(kind: ObjectKind, payload: &Value) -> Option<String> {
    match kind {
        ObjectKind::Dashboard => non_empty(&payload["dashboard"]["title"])
            .or_else(|| non_empty(&payload["title"])),
        ObjectKind::ContactPoint
        | ObjectKind::MuteTiming
        | ObjectKind::Template
        | ObjectKind::AlertRule
        | ObjectKind::RuleGroup => non_empty(&payload["name"]),
        // The notification policy is a singleton routing tree
        ObjectKind::NotificationPolicy => {
            non_empty(&payload["name"]).or_else(|| Some("policy".to_string()))
        }
        ObjectKind::RuleCrd => non_empty(&payload["metadata"]["name"]),
    }
}

/// Extract an object's owning container title from its payload.
pub fn container_from_payload(kind: ObjectKind, payload: &Value) -> Option<String> {
    match kind {
        ObjectKind::Dashboard => non_empty(&payload["meta"]["folderTitle"])
            .or_else(|| non_empty(&payload["folderTitle"])),
        ObjectKind::AlertRule | ObjectKind::RuleGroup => non_empty(&payload["folder"])
            .or_else(|| non_empty(&payload["folderTitle"])),
        ObjectKind::RuleCrd => non_empty(&payload["metadata"]["namespace"]),
        _ => None,
    }
}

/// Detect an externally-managed marker inside a payload. Observed on
/// operator- and Helm-managed rule CRDs.
pub fn provenance_from_payload(payload: &Value) -> Option<String> {
    let labels = &payload["metadata"]["labels"];
    if let Some(managed_by) = non_empty(&labels["app.kubernetes.io/managed-by"]) {
        return Some(managed_by.to_lowercase());
    }
    if non_empty(&payload["metadata"]["annotations"]["meta.helm.sh/release-name"]).is_some() {
        return Some("helm".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dashboard_identity_and_folder() {
        let payload = json!({
            "dashboard": { "title": "Latency", "uid": "abc123" },
            "meta": { "folderTitle": "Prod" }
        });
        assert_eq!(
            identity_from_payload(ObjectKind::Dashboard, &payload),
            Some("Latency".to_string())
        );
        assert_eq!(
            container_from_payload(ObjectKind::Dashboard, &payload),
            Some("Prod".to_string())
        );
    }

    #[test]
    fn test_contact_point_identity() {
        let payload = json!({ "name": "oncall-slack", "type": "slack" });
        assert_eq!(
            identity_from_payload(ObjectKind::ContactPoint, &payload),
            Some("oncall-slack".to_string())
        );
        assert_eq!(container_from_payload(ObjectKind::ContactPoint, &payload), None);
    }

    #[test]
    fn test_notification_policy_defaults_to_singleton_identity() {
        let payload = json!({ "receiver": "oncall-slack", "routes": [] });
        assert_eq!(
            identity_from_payload(ObjectKind::NotificationPolicy, &payload),
            Some("policy".to_string())
        );
    }

    #[test]
    fn test_rule_crd_identity_namespace_and_provenance() {
        let payload = json!({
            "metadata": {
                "name": "node-alerts",
                "namespace": "prometheus",
                "labels": { "app.kubernetes.io/managed-by": "Helm" }
            },
            "spec": { "groups": [] }
        });
        assert_eq!(
            identity_from_payload(ObjectKind::RuleCrd, &payload),
            Some("node-alerts".to_string())
        );
        assert_eq!(
            container_from_payload(ObjectKind::RuleCrd, &payload),
            Some("prometheus".to_string())
        );
        assert_eq!(provenance_from_payload(&payload), Some("helm".to_string()));
    }

    #[test]
    fn test_from_payload_falls_back_to_disk_names() {
        let obj = ConfigObject::from_payload(
            ObjectKind::Dashboard,
            json!({ "panels": [] }),
            "latency",
            "prod",
        );
        assert_eq!(obj.identity, "latency");
        assert_eq!(obj.container, "prod");
        assert!(obj.provenance.is_none());
    }

    #[test]
    fn test_blank_identity_is_not_extracted() {
        let payload = json!({ "name": "   " });
        assert_eq!(identity_from_payload(ObjectKind::ContactPoint, &payload), None);
    }
}
