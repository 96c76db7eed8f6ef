//! Export pass: walk a live source and write a backup tree.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::kind::{ObjectKind, StorageStyle};
use crate::model::{Container, ContainerKind};
use crate::report::{NoopProgress, ObjectOutcome, Outcome, RunProgress, RunReport};
use crate::select::SelectionPolicy;
use crate::store::{ConfigStore, StoreError};
use crate::tree::{BackupTree, ExportManifest, TREE_FORMAT};

/// Kinds an export pass walks, one entry per on-disk layout. Alert rules
/// travel as rule groups.
const EXPORT_KINDS: [ObjectKind; 7] = [
    ObjectKind::Dashboard,
    ObjectKind::RuleGroup,
    ObjectKind::ContactPoint,
    ObjectKind::NotificationPolicy,
    ObjectKind::MuteTiming,
    ObjectKind::Template,
    ObjectKind::RuleCrd,
];

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub policy: SelectionPolicy,
    /// Bound on in-flight container walks within one kind.
    pub concurrency: usize,
    /// Per-call timeout for source API calls.
    pub timeout: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            concurrency: 8,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Walks the source's object hierarchy and produces a [`BackupTree`].
pub struct Exporter {
    opts: ExportOptions,
    cancel: CancellationToken,
    progress: Arc<dyn RunProgress>,
}

impl Exporter {
    pub fn new(opts: ExportOptions) -> Self {
        Self {
            opts,
            cancel: CancellationToken::new(),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn RunProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Token that stops new work when cancelled. In-flight calls finish or
    /// time out normally; recorded outcomes remain valid.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the export. Only engine-setup failures (bad destination,
    /// unreachable source) abort; per-object failures land in the report.
    pub async fn run(&self, store: &dyn ConfigStore, dest: &Path) -> Result<RunReport> {
        let tree = BackupTree::create(dest)?;
        info!(
            source = store.store_name(),
            dest = %dest.display(),
            "starting export"
        );

        let folders = self.list_containers(store, ContainerKind::Folder).await?;
        let namespaces = self.list_containers(store, ContainerKind::Namespace).await?;

        // Container manifest covers everything discovered, before any
        // filtering, so import can recreate empty containers.
        let mut manifest_containers = folders.clone().unwrap_or_default();
        manifest_containers.extend(namespaces.clone().unwrap_or_default());
        tree.write_folders_manifest(&manifest_containers)?;

        let mut report = RunReport::new();
        for kind in EXPORT_KINDS {
            let containers = match self.containers_for_kind(kind, &folders, &namespaces) {
                Some(containers) => containers,
                None => {
                    debug!(kind = kind.name(), "source has no containers for kind, skipping");
                    continue;
                }
            };

            let semaphore = Semaphore::new(self.opts.concurrency.max(1));
            let semaphore = &semaphore;
            let tree_ref = &tree;
            let mut workers = Vec::new();
            for container in &containers {
                if self.cancel.is_cancelled() {
                    info!(kind = kind.name(), "cancelled, not enqueueing further containers");
                    break;
                }
                if !self.opts.policy.selected(&container.title) {
                    info!(
                        kind = kind.name(),
                        container = %container.title,
                        "container skipped by filter"
                    );
                    let outcome = ObjectOutcome::new(
                        kind,
                        container.title.clone(),
                        "*",
                        Outcome::SkippedFilter,
                    )
                    .with_reason("container filtered");
                    self.progress.on_object(&outcome);
                    report.record(outcome);
                    continue;
                }
                workers.push(async move {
                    let _permit = semaphore.acquire().await.ok();
                    self.export_container(store, tree_ref, kind, container).await
                });
            }

            // barrier: one kind finishes before the next starts
            for outcomes in futures::future::join_all(workers).await {
                report.record_all(outcomes);
            }
            self.progress.on_kind_complete(kind);
        }

        let mut counts = BTreeMap::new();
        for kind in report.kinds().collect::<Vec<_>>() {
            let exported = report.count(kind, Outcome::Exported);
            if exported > 0 {
                counts.insert(kind.name().to_string(), exported);
            }
        }
        let checksum = tree.checksum()?;
        tree.write_export_manifest(&ExportManifest {
            format: TREE_FORMAT.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            counts,
            checksum: Some(checksum),
        })?;

        info!(
            exported = report.total(Outcome::Exported),
            failed = report.total(Outcome::Failed),
            "export complete"
        );
        Ok(report)
    }

    /// `Ok(None)` when the store does not organize anything under `kind`;
    /// a hard listing failure aborts the run (source unreachable).
    async fn list_containers(
        &self,
        store: &dyn ConfigStore,
        kind: ContainerKind,
    ) -> Result<Option<Vec<Container>>> {
        match self.with_timeout(store.list_containers(kind)).await {
            Ok(containers) => Ok(Some(containers)),
            Err(Error::Store(StoreError::Unsupported(reason))) => {
                debug!(%reason, "container kind unsupported by source");
                Ok(None)
            }
            // no object has been attempted yet: this is an engine-level
            // failure, not a per-object one
            Err(e) => Err(Error::Connectivity(format!(
                "cannot enumerate containers at {}: {}",
                store.store_name(),
                e
            ))),
        }
    }

    fn containers_for_kind(
        &self,
        kind: ObjectKind,
        folders: &Option<Vec<Container>>,
        namespaces: &Option<Vec<Container>>,
    ) -> Option<Vec<Container>> {
        match kind.storage_style() {
            StorageStyle::PerObject | StorageStyle::PerContainer => {
                let mut containers = folders.clone()?;
                let sentinel = kind.sentinel_container();
                if !containers
                    .iter()
                    .any(|c| c.title.eq_ignore_ascii_case(sentinel))
                {
                    containers.push(Container::folder(sentinel, ""));
                }
                Some(containers)
            }
            // instance-global kinds hang off the sentinel container, which
            // is subject to the selector like any other title
            StorageStyle::RootList => {
                folders.as_ref()?;
                Some(vec![Container::folder(kind.sentinel_container(), "")])
            }
            StorageStyle::RootPerObject => namespaces.clone(),
        }
    }

    async fn export_container(
        &self,
        store: &dyn ConfigStore,
        tree: &BackupTree,
        kind: ObjectKind,
        container: &Container,
    ) -> Vec<ObjectOutcome> {
        let objects = match self.with_timeout(store.list_objects(kind, container)).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(
                    kind = kind.name(),
                    container = %container.title,
                    error = %e,
                    "failed to list objects"
                );
                let outcome =
                    ObjectOutcome::new(kind, container.title.clone(), "*", Outcome::Failed)
                        .with_reason(e.to_string());
                self.progress.on_object(&outcome);
                return vec![outcome];
            }
        };

        let mut outcomes = Vec::new();
        match kind.storage_style() {
            StorageStyle::PerObject | StorageStyle::RootPerObject => {
                for object in objects {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let outcome = match tree.write_object(&object) {
                        Ok(_) => ObjectOutcome::new(
                            kind,
                            object.container.clone(),
                            object.identity.clone(),
                            Outcome::Exported,
                        ),
                        Err(e) => ObjectOutcome::new(
                            kind,
                            object.container.clone(),
                            object.identity.clone(),
                            Outcome::Failed,
                        )
                        .with_reason(e.to_string()),
                    };
                    outcomes.push(outcome);
                }
            }
            StorageStyle::PerContainer | StorageStyle::RootList => {
                if objects.is_empty() {
                    return outcomes;
                }
                let payloads: Vec<serde_json::Value> =
                    objects.iter().map(|o| o.payload.clone()).collect();
                let written = match kind.storage_style() {
                    StorageStyle::PerContainer => {
                        tree.write_container_list(kind, &container.title, &payloads)
                    }
                    _ => tree.write_root_list(kind, &payloads),
                };
                for object in &objects {
                    let outcome = match &written {
                        Ok(_) => ObjectOutcome::new(
                            kind,
                            object.container.clone(),
                            object.identity.clone(),
                            Outcome::Exported,
                        ),
                        Err(e) => ObjectOutcome::new(
                            kind,
                            object.container.clone(),
                            object.identity.clone(),
                            Outcome::Failed,
                        )
                        .with_reason(e.to_string()),
                    };
                    outcomes.push(outcome);
                }
            }
        }

        for outcome in &outcomes {
            self.progress.on_object(outcome);
        }
        outcomes
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.opts.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::Store(e)),
            Err(_) => Err(Error::Timeout(self.opts.timeout)),
        }
    }
}
