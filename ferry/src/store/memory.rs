//! In-memory [`ConfigStore`] used by the test suite and dry runs.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::kind::ObjectKind;
use crate::model::{ConfigObject, Container, ContainerKind};

use super::{ConfigStore, StoreError};

#[derive(Default)]
struct Inner {
    /// keyed by (kind, lowercased title)
    containers: BTreeMap<(ContainerKind, String), Container>,
    /// keyed by (kind, lowercased container, lowercased identity)
    objects: BTreeMap<(ObjectKind, String, String), ConfigObject>,
    /// kinds in the order writes were applied, for ordering assertions
    applied_kinds: Vec<ObjectKind>,
    /// identities that fail on write, for failure-isolation tests
    failing: BTreeSet<String>,
    /// containers whose listing fails, for fetch-failure tests
    failing_containers: BTreeSet<String>,
}

/// An in-memory configuration service.
pub struct MemoryStore {
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn add_container(&self, container: Container) {
        let key = (container.kind, container.title.to_lowercase());
        self.inner.lock().containers.insert(key, container);
    }

    pub fn add_object(&self, object: ConfigObject) {
        let key = (
            object.kind,
            object.container.to_lowercase(),
            object.identity.to_lowercase(),
        );
        self.inner.lock().objects.insert(key, object);
    }

    /// Make every subsequent write of `identity` fail with a validation
    /// error.
    pub fn fail_writes_for(&self, identity: impl Into<String>) {
        self.inner.lock().failing.insert(identity.into().to_lowercase());
    }

    /// Make listing objects of `container` fail with a connectivity error.
    pub fn fail_listing_for(&self, container: impl Into<String>) {
        self.inner
            .lock()
            .failing_containers
            .insert(container.into().to_lowercase());
    }

    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().containers.len()
    }

    pub fn has_container(&self, kind: ContainerKind, title: &str) -> bool {
        self.inner
            .lock()
            .containers
            .contains_key(&(kind, title.to_lowercase()))
    }

    pub fn get(&self, kind: ObjectKind, container: &str, identity: &str) -> Option<ConfigObject> {
        self.inner
            .lock()
            .objects
            .get(&(kind, container.to_lowercase(), identity.to_lowercase()))
            .cloned()
    }

    /// Kinds in apply order, deduplicated to their first appearance.
    pub fn applied_kind_order(&self) -> Vec<ObjectKind> {
        let mut seen = BTreeSet::new();
        self.inner
            .lock()
            .applied_kinds
            .iter()
            .copied()
            .filter(|k| seen.insert(*k))
            .collect()
    }

    fn check_failing(inner: &Inner, object: &ConfigObject) -> Result<(), StoreError> {
        if inner.failing.contains(&object.identity.to_lowercase()) {
            return Err(StoreError::Validation(format!(
                "target rejected '{}'",
                object.identity
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_containers(&self, kind: ContainerKind) -> Result<Vec<Container>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .containers
            .values()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_objects(
        &self,
        kind: ObjectKind,
        container: &Container,
    ) -> Result<Vec<ConfigObject>, StoreError> {
        let title = container.title.to_lowercase();
        let inner = self.inner.lock();
        if inner.failing_containers.contains(&title) {
            return Err(StoreError::Connectivity(format!(
                "listing '{}' failed",
                container.title
            )));
        }
        Ok(inner
            .objects
            .values()
            .filter(|o| o.kind == kind && o.container.to_lowercase() == title)
            .cloned()
            .collect())
    }

    async fn get_object(
        &self,
        kind: ObjectKind,
        container: &str,
        identity: &str,
    ) -> Result<Option<ConfigObject>, StoreError> {
        Ok(self.get(kind, container, identity))
    }

    async fn create_object(&self, object: &ConfigObject) -> Result<String, StoreError> {
        let key = (
            object.kind,
            object.container.to_lowercase(),
            object.identity.to_lowercase(),
        );
        let mut inner = self.inner.lock();
        Self::check_failing(&inner, object)?;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::Exists(format!(
                "{} '{}' in '{}'",
                object.kind, object.identity, object.container
            )));
        }
        inner.objects.insert(key, object.clone());
        inner.applied_kinds.push(object.kind);
        Ok(object.identity.clone())
    }

    async fn update_object(&self, object: &ConfigObject) -> Result<(), StoreError> {
        let key = (
            object.kind,
            object.container.to_lowercase(),
            object.identity.to_lowercase(),
        );
        let mut inner = self.inner.lock();
        Self::check_failing(&inner, object)?;
        if !inner.objects.contains_key(&key) {
            return Err(StoreError::NotFound(format!(
                "{} '{}' in '{}'",
                object.kind, object.identity, object.container
            )));
        }
        inner.objects.insert(key, object.clone());
        inner.applied_kinds.push(object.kind);
        Ok(())
    }

    async fn create_container(
        &self,
        kind: ContainerKind,
        title: &str,
    ) -> Result<String, StoreError> {
        let key = (kind, title.to_lowercase());
        let mut inner = self.inner.lock();
        if inner.containers.contains_key(&key) {
            return Err(StoreError::Exists(format!("container '{}'", title)));
        }
        let uid = Uuid::new_v4().to_string();
        inner.containers.insert(
            key,
            Container {
                title: title.to_string(),
                uid: uid.clone(),
                kind,
                provenance: None,
            },
        );
        Ok(uid)
    }

    fn store_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dashboard(identity: &str, container: &str) -> ConfigObject {
        ConfigObject::new(
            ObjectKind::Dashboard,
            identity,
            container,
            json!({"title": identity}),
        )
    }

    #[tokio::test]
    async fn test_create_then_duplicate_create_is_exists() {
        let store = MemoryStore::new("mem");
        store.create_object(&dashboard("Latency", "Prod")).await.unwrap();
        let err = store
            .create_object(&dashboard("latency", "prod"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Exists(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new("mem");
        let err = store.update_object(&dashboard("Latency", "Prod")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_object_matches_case_insensitively() {
        let store = MemoryStore::new("mem");
        store.add_object(dashboard("Latency", "Prod"));
        let found = store
            .get_object(ObjectKind::Dashboard, "PROD", "LATENCY")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_injected_failure_rejects_writes() {
        let store = MemoryStore::new("mem");
        store.fail_writes_for("Latency");
        let err = store.create_object(&dashboard("Latency", "Prod")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
