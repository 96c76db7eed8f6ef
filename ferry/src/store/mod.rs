//! The source/target collaborator interface.
//!
//! The engine reaches a live service only through [`ConfigStore`]; transport
//! and authentication live behind it. Outcomes the engine branches on
//! (exists, not found, conflict) are typed variants, never matched out of
//! response text.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::kind::ObjectKind;
use crate::model::{ConfigObject, Container, ContainerKind};

pub use http::{Auth, HttpStore};
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("authentication failed (status {status})")]
    Auth { status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Exists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation rejected: {0}")]
    Validation(String),

    #[error("unsupported by this store: {0}")]
    Unsupported(String),
}

/// Minimal operations the engine consumes from a source or target service.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Containers of the given grouping unit. Stores that do not organize
    /// anything under `kind` return [`StoreError::Unsupported`].
    async fn list_containers(&self, kind: ContainerKind) -> Result<Vec<Container>, StoreError>;

    /// All objects of `kind` inside `container` (export walk).
    async fn list_objects(
        &self,
        kind: ObjectKind,
        container: &Container,
    ) -> Result<Vec<ConfigObject>, StoreError>;

    /// Fetch one object by natural key, `None` when absent. Used for the
    /// create-path probe on import, so absence is not an error.
    async fn get_object(
        &self,
        kind: ObjectKind,
        container: &str,
        identity: &str,
    ) -> Result<Option<ConfigObject>, StoreError>;

    /// Create a new object; returns the target-assigned identity.
    async fn create_object(&self, object: &ConfigObject) -> Result<String, StoreError>;

    /// Replace an existing object in place.
    async fn update_object(&self, object: &ConfigObject) -> Result<(), StoreError>;

    /// Create a container; returns the target-assigned uid.
    async fn create_container(
        &self,
        kind: ContainerKind,
        title: &str,
    ) -> Result<String, StoreError>;

    /// Human-readable store name for logs and reports.
    fn store_name(&self) -> &str;
}
