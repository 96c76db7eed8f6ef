//! Grafana-compatible REST implementation of [`ConfigStore`].
//!
//! Covers the folder-scoped kinds (dashboards, alerting provisioning).
//! Rule CRDs live behind a cluster API and are reported as unsupported
//! here; the engine stays agnostic.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::kind::ObjectKind;
use crate::model::{ConfigObject, Container, ContainerKind};

use super::{ConfigStore, StoreError};

/// Authentication for the service API.
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl Auth {
    fn header_value(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Bearer(token) => Some(format!("Bearer {}", token)),
            Auth::Basic { username, password } => {
                let raw = format!("{}:{}", username, password);
                Some(format!("Basic {}", BASE64.encode(raw.as_bytes())))
            }
        }
    }
}

/// HTTP-backed configuration store.
pub struct HttpStore {
    client: Client,
    base: Url,
    auth: Auth,
    name: String,
}

#[derive(Deserialize)]
struct FolderHit {
    uid: String,
    title: String,
}

#[derive(Deserialize)]
struct SearchHit {
    uid: String,
}

#[derive(Serialize)]
struct DashboardWrite<'a> {
    dashboard: &'a Value,
    #[serde(rename = "folderUid")]
    folder_uid: &'a str,
    overwrite: bool,
    message: &'a str,
}

#[derive(Deserialize)]
struct CreatedUid {
    uid: String,
}

/// Map a non-success status onto a typed store error. Never matches on
/// response text; the body only rides along in the message.
fn map_status(status: StatusCode, context: &str, body: &str) -> StoreError {
    match status.as_u16() {
        401 | 403 => StoreError::Auth {
            status: status.as_u16(),
        },
        404 => StoreError::NotFound(context.to_string()),
        409 | 412 => StoreError::Conflict(format!("{}: {}", context, body)),
        400 | 422 => StoreError::Validation(format!("{}: {}", context, body)),
        _ => StoreError::Connectivity(format!("{} ({}): {}", context, status, body)),
    }
}

fn unsupported(kind: ObjectKind, store: &str) -> StoreError {
    StoreError::Unsupported(format!("{} objects are not served by {}", kind, store))
}

impl HttpStore {
    pub fn new(base_url: &str, auth: Auth, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| StoreError::Connectivity(format!("invalid url '{}': {}", base_url, e)))?;
        let name = base.host_str().unwrap_or("remote").to_string();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            auth,
            name,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base.as_str().trim_end_matches('/'), path);
        let mut req = self.client.request(method, url);
        if let Some(header) = self.auth.header_value() {
            req = req.header("Authorization", header);
        }
        req
    }

    /// Alerting provisioning writes carry this header so the target treats
    /// them as editable rather than file-provisioned.
    fn provisioning(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path).header("X-Disable-Provenance", "true")
    }

    async fn check(response: Response, context: &str) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, context, &body))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, StoreError> {
        let response = self.request(Method::GET, path).send().await?;
        let response = Self::check(response, path).await?;
        Ok(response.json().await?)
    }

    async fn folder_uid_by_title(&self, title: &str) -> Result<Option<String>, StoreError> {
        if title.is_empty() || title.eq_ignore_ascii_case("general") {
            // the default folder is addressed by the "general" pseudo-uid
            return Ok(Some("general".to_string()));
        }
        let folders: Vec<FolderHit> = self.get_json("/api/folders").await?;
        Ok(folders
            .into_iter()
            .find(|f| f.title.eq_ignore_ascii_case(title))
            .map(|f| f.uid))
    }

    async fn list_dashboards(&self, container: &Container) -> Result<Vec<ConfigObject>, StoreError> {
        let folder_uid = if container.uid.is_empty() {
            "general".to_string()
        } else {
            container.uid.clone()
        };
        let path = format!("/api/search?type=dash-db&folderUIDs={}", folder_uid);
        let hits: Vec<SearchHit> = self.get_json(&path).await?;

        let mut objects = Vec::new();
        for hit in hits {
            let envelope: Value = self
                .get_json(&format!("/api/dashboards/uid/{}", hit.uid))
                .await?;
            objects.push(ConfigObject::from_payload(
                ObjectKind::Dashboard,
                envelope,
                &hit.uid,
                &container.title,
            ));
        }
        Ok(objects)
    }

    /// Alert rules come back flat; the backup unit is the rule group, so
    /// rules are regrouped per (folder, group) before leaving this store.
    async fn list_rule_groups(&self, container: &Container) -> Result<Vec<ConfigObject>, StoreError> {
        let rules: Vec<Value> = self.get_json("/api/v1/provisioning/alert-rules").await?;
        let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
        for rule in rules {
            let folder_uid = rule["folderUID"].as_str().unwrap_or_default();
            if folder_uid != container.uid {
                continue;
            }
            let group_name = rule["ruleGroup"].as_str().unwrap_or("default").to_string();
            match groups.iter_mut().find(|(name, _)| *name == group_name) {
                Some((_, members)) => members.push(rule),
                None => groups.push((group_name, vec![rule])),
            }
        }
        Ok(groups
            .into_iter()
            .map(|(name, members)| {
                let payload = json!({
                    "name": name,
                    "folder": container.title,
                    "rules": members,
                });
                ConfigObject::new(ObjectKind::RuleGroup, name, container.title.clone(), payload)
            })
            .collect())
    }

    async fn list_provisioning_kind(
        &self,
        kind: ObjectKind,
        container: &Container,
        path: &str,
    ) -> Result<Vec<ConfigObject>, StoreError> {
        let body: Value = self.get_json(path).await?;
        let payloads = match body {
            Value::Array(items) => items,
            // the notification policy endpoint returns a single tree
            single @ Value::Object(_) => vec![single],
            _ => Vec::new(),
        };
        Ok(payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let fallback = format!("{}-{}", kind, i);
                ConfigObject::from_payload(kind, payload, &fallback, &container.title)
            })
            .collect())
    }

    async fn find_by_identity(
        &self,
        kind: ObjectKind,
        container: &str,
        identity: &str,
        path: &str,
    ) -> Result<Option<ConfigObject>, StoreError> {
        let container = Container::folder(container, "");
        let objects = self.list_provisioning_kind(kind, &container, path).await?;
        Ok(objects
            .into_iter()
            .find(|o| o.identity.eq_ignore_ascii_case(identity)))
    }

    async fn write_dashboard(
        &self,
        object: &ConfigObject,
        overwrite: bool,
    ) -> Result<String, StoreError> {
        let folder_uid = self
            .folder_uid_by_title(&object.container)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("folder '{}'", object.container)))?;

        // the payload may be a raw dashboard or a get-by-uid envelope
        let mut dashboard = if object.payload["dashboard"].is_object() {
            object.payload["dashboard"].clone()
        } else {
            object.payload.clone()
        };
        if let Some(map) = dashboard.as_object_mut() {
            // target-internal numeric id never carries over
            map.remove("id");
        }

        let body = DashboardWrite {
            dashboard: &dashboard,
            folder_uid: &folder_uid,
            overwrite,
            message: "imported by ferry",
        };
        let response = self
            .request(Method::POST, "/api/dashboards/db")
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, "/api/dashboards/db").await?;
        let created: Value = response.json().await.unwrap_or(Value::Null);
        Ok(created["uid"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| object.identity.clone()))
    }

    async fn write_rule_group(&self, object: &ConfigObject) -> Result<(), StoreError> {
        let folder_uid = self
            .folder_uid_by_title(&object.container)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("folder '{}'", object.container)))?;
        let path = format!(
            "/api/v1/provisioning/folder/{}/rule-groups/{}",
            folder_uid, object.identity
        );
        let response = self
            .provisioning(Method::PUT, &path)
            .json(&object.payload)
            .send()
            .await?;
        Self::check(response, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for HttpStore {
    async fn list_containers(&self, kind: ContainerKind) -> Result<Vec<Container>, StoreError> {
        match kind {
            ContainerKind::Folder => {
                let folders: Vec<FolderHit> = self.get_json("/api/folders").await?;
                Ok(folders
                    .into_iter()
                    .map(|f| Container::folder(f.title, f.uid))
                    .collect())
            }
            ContainerKind::Namespace => Err(StoreError::Unsupported(format!(
                "{} serves folders only",
                self.name
            ))),
        }
    }

    async fn list_objects(
        &self,
        kind: ObjectKind,
        container: &Container,
    ) -> Result<Vec<ConfigObject>, StoreError> {
        match kind {
            ObjectKind::Dashboard => self.list_dashboards(container).await,
            ObjectKind::AlertRule | ObjectKind::RuleGroup => {
                self.list_rule_groups(container).await
            }
            ObjectKind::ContactPoint => {
                self.list_provisioning_kind(kind, container, "/api/v1/provisioning/contact-points")
                    .await
            }
            ObjectKind::NotificationPolicy => {
                self.list_provisioning_kind(kind, container, "/api/v1/provisioning/policies")
                    .await
            }
            ObjectKind::MuteTiming => {
                self.list_provisioning_kind(kind, container, "/api/v1/provisioning/mute-timings")
                    .await
            }
            ObjectKind::Template => {
                self.list_provisioning_kind(kind, container, "/api/v1/provisioning/templates")
                    .await
            }
            ObjectKind::RuleCrd => Err(unsupported(kind, &self.name)),
        }
    }

    async fn get_object(
        &self,
        kind: ObjectKind,
        container: &str,
        identity: &str,
    ) -> Result<Option<ConfigObject>, StoreError> {
        match kind {
            ObjectKind::Dashboard => {
                let folder_uid = match self.folder_uid_by_title(container).await? {
                    Some(uid) => uid,
                    None => return Ok(None),
                };
                let folder = Container::folder(container, folder_uid);
                let dashboards = self.list_dashboards(&folder).await?;
                Ok(dashboards
                    .into_iter()
                    .find(|d| d.identity.eq_ignore_ascii_case(identity)))
            }
            ObjectKind::ContactPoint => {
                self.find_by_identity(kind, container, identity, "/api/v1/provisioning/contact-points")
                    .await
            }
            ObjectKind::NotificationPolicy => {
                // the routing tree always exists; re-import is an update
                self.find_by_identity(kind, container, identity, "/api/v1/provisioning/policies")
                    .await
            }
            ObjectKind::MuteTiming => {
                self.find_by_identity(kind, container, identity, "/api/v1/provisioning/mute-timings")
                    .await
            }
            ObjectKind::Template => {
                self.find_by_identity(kind, container, identity, "/api/v1/provisioning/templates")
                    .await
            }
            ObjectKind::AlertRule | ObjectKind::RuleGroup => {
                let folder_uid = match self.folder_uid_by_title(container).await? {
                    Some(uid) => uid,
                    None => return Ok(None),
                };
                let path = format!(
                    "/api/v1/provisioning/folder/{}/rule-groups/{}",
                    folder_uid, identity
                );
                match self.get_json::<Value>(&path).await {
                    Ok(payload) => Ok(Some(ConfigObject::from_payload(
                        ObjectKind::RuleGroup,
                        payload,
                        identity,
                        container,
                    ))),
                    Err(StoreError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            ObjectKind::RuleCrd => Err(unsupported(kind, &self.name)),
        }
    }

    async fn create_object(&self, object: &ConfigObject) -> Result<String, StoreError> {
        match object.kind {
            ObjectKind::Dashboard => self.write_dashboard(object, false).await,
            ObjectKind::ContactPoint => {
                let response = self
                    .provisioning(Method::POST, "/api/v1/provisioning/contact-points")
                    .json(&object.payload)
                    .send()
                    .await?;
                Self::check(response, "/api/v1/provisioning/contact-points").await?;
                Ok(object.identity.clone())
            }
            ObjectKind::NotificationPolicy => {
                self.update_object(object).await?;
                Ok(object.identity.clone())
            }
            ObjectKind::MuteTiming => {
                let response = self
                    .provisioning(Method::POST, "/api/v1/provisioning/mute-timings")
                    .json(&object.payload)
                    .send()
                    .await?;
                Self::check(response, "/api/v1/provisioning/mute-timings").await?;
                Ok(object.identity.clone())
            }
            ObjectKind::Template => {
                self.update_object(object).await?;
                Ok(object.identity.clone())
            }
            ObjectKind::AlertRule | ObjectKind::RuleGroup => {
                self.write_rule_group(object).await?;
                Ok(object.identity.clone())
            }
            ObjectKind::RuleCrd => Err(unsupported(object.kind, &self.name)),
        }
    }

    async fn update_object(&self, object: &ConfigObject) -> Result<(), StoreError> {
        match object.kind {
            ObjectKind::Dashboard => {
                self.write_dashboard(object, true).await?;
                Ok(())
            }
            ObjectKind::ContactPoint => {
                let uid = object.payload["uid"].as_str().ok_or_else(|| {
                    StoreError::Validation(format!(
                        "contact point '{}' has no uid to update",
                        object.identity
                    ))
                })?;
                let path = format!("/api/v1/provisioning/contact-points/{}", uid);
                let response = self
                    .provisioning(Method::PUT, &path)
                    .json(&object.payload)
                    .send()
                    .await?;
                Self::check(response, &path).await?;
                Ok(())
            }
            ObjectKind::NotificationPolicy => {
                let response = self
                    .provisioning(Method::PUT, "/api/v1/provisioning/policies")
                    .json(&object.payload)
                    .send()
                    .await?;
                Self::check(response, "/api/v1/provisioning/policies").await?;
                Ok(())
            }
            ObjectKind::MuteTiming => {
                let path = format!("/api/v1/provisioning/mute-timings/{}", object.identity);
                let response = self
                    .provisioning(Method::PUT, &path)
                    .json(&object.payload)
                    .send()
                    .await?;
                Self::check(response, &path).await?;
                Ok(())
            }
            ObjectKind::Template => {
                let path = format!("/api/v1/provisioning/templates/{}", object.identity);
                let content = object.payload["template"].clone();
                let response = self
                    .provisioning(Method::PUT, &path)
                    .json(&json!({ "template": content }))
                    .send()
                    .await?;
                Self::check(response, &path).await?;
                Ok(())
            }
            ObjectKind::AlertRule | ObjectKind::RuleGroup => self.write_rule_group(object).await,
            ObjectKind::RuleCrd => Err(unsupported(object.kind, &self.name)),
        }
    }

    async fn create_container(
        &self,
        kind: ContainerKind,
        title: &str,
    ) -> Result<String, StoreError> {
        match kind {
            ContainerKind::Folder => {
                let response = self
                    .request(Method::POST, "/api/folders")
                    .json(&json!({ "title": title }))
                    .send()
                    .await?;
                let response = Self::check(response, "/api/folders").await?;
                let created: CreatedUid = response.json().await?;
                Ok(created.uid)
            }
            ContainerKind::Namespace => Err(StoreError::Unsupported(format!(
                "{} cannot create namespaces",
                self.name
            ))),
        }
    }

    fn store_name(&self) -> &str {
        &self.name
    }
}
