//! Import pass: apply a backup tree to a target.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conflict::{self, Action};
use crate::error::{Error, Result};
use crate::kind::ObjectKind;
use crate::model::{ConfigObject, Container, ContainerKind};
use crate::report::{NoopProgress, ObjectOutcome, Outcome, RunProgress, RunReport};
use crate::select::SelectionPolicy;
use crate::store::{ConfigStore, StoreError};
use crate::tree::{safe_component, BackupTree};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub policy: SelectionPolicy,
    /// Bound on in-flight container passes within one kind.
    pub concurrency: usize,
    /// Per-call timeout for target API calls.
    pub timeout: Duration,
    /// Replace existing dashboards instead of skipping them.
    pub overwrite_dashboards: bool,
    /// Redirect every object to one container, for cross-namespace
    /// migration. `None` keeps each object's recorded container.
    pub target_container: Option<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            concurrency: 8,
            timeout: Duration::from_secs(30),
            overwrite_dashboards: false,
            target_container: None,
        }
    }
}

/// Target-side container cache: listed once up front, extended as
/// containers are created, shared by the per-container workers.
struct ContainerCache {
    known: Mutex<BTreeMap<(ContainerKind, String), Container>>,
}

impl ContainerCache {
    fn new() -> Self {
        Self {
            known: Mutex::new(BTreeMap::new()),
        }
    }

    fn fill(&self, containers: Vec<Container>) {
        let mut known = self.known.lock();
        for container in containers {
            known.insert((container.kind, container.title.to_lowercase()), container);
        }
    }

    fn get(&self, kind: ContainerKind, title: &str) -> Option<Container> {
        self.known.lock().get(&(kind, title.to_lowercase())).cloned()
    }

    fn insert(&self, container: Container) {
        self.known
            .lock()
            .insert((container.kind, container.title.to_lowercase()), container);
    }
}

/// Applies a [`BackupTree`] to a target, consuming the Selector, the kind
/// sequencer, and the conflict resolver.
pub struct Importer {
    opts: ImportOptions,
    cancel: CancellationToken,
    progress: Arc<dyn RunProgress>,
}

impl Importer {
    pub fn new(opts: ImportOptions) -> Self {
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

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the import. Idempotent: re-running over an unchanged target
    /// turns creates into updates or skips, never duplicates.
    pub async fn run(&self, store: &dyn ConfigStore, src: &Path) -> Result<RunReport> {
        let tree = BackupTree::open(src)?;
        let kinds = tree.present_kinds()?;
        let sequence = ObjectKind::sequence(&kinds);
        info!(
            target = store.store_name(),
            src = %src.display(),
            kinds = sequence.len(),
            "starting import"
        );

        let cache = ContainerCache::new();
        // reaching the target at all is an engine-setup concern; per-object
        // failures later are not
        match self.with_timeout(store.list_containers(ContainerKind::Folder)).await {
            Ok(folders) => cache.fill(folders),
            Err(Error::Store(StoreError::Unsupported(_))) => {}
            Err(e) => {
                return Err(Error::Connectivity(format!(
                    "cannot reach target {}: {}",
                    store.store_name(),
                    e
                )))
            }
        }
        match self.with_timeout(store.list_containers(ContainerKind::Namespace)).await {
            Ok(namespaces) => cache.fill(namespaces),
            Err(Error::Store(StoreError::Unsupported(_))) => {}
            Err(e) => {
                return Err(Error::Connectivity(format!(
                    "cannot reach target {}: {}",
                    store.store_name(),
                    e
                )))
            }
        }

        let manifest = tree.read_folders_manifest()?;
        if self.opts.target_container.is_none() {
            self.recreate_manifest_containers(store, &cache, &manifest).await;
        }

        let mut report = RunReport::new();
        for kind in sequence {
            let containers = match tree.containers_for(kind) {
                Ok(containers) => containers,
                Err(e) => {
                    warn!(kind = kind.name(), error = %e, "cannot enumerate kind, aborting its pass");
                    report.record(
                        ObjectOutcome::new(kind, "*", "*", Outcome::Failed)
                            .with_reason(format!("kind enumeration failed: {}", e)),
                    );
                    continue;
                }
            };

            let semaphore = Semaphore::new(self.opts.concurrency.max(1));
            let semaphore = &semaphore;
            let tree_ref = &tree;
            let cache_ref = &cache;
            let manifest_ref = &manifest;
            let mut workers = Vec::new();
            for dir_name in &containers {
                if self.cancel.is_cancelled() {
                    info!(kind = kind.name(), "cancelled, not enqueueing further containers");
                    break;
                }
                let title = resolve_title(manifest_ref, dir_name);
                if !self.opts.policy.selected(&title) {
                    debug!(kind = kind.name(), container = %title, "container skipped by filter");
                    let outcome =
                        ObjectOutcome::new(kind, title.clone(), "*", Outcome::SkippedFilter)
                            .with_reason("container filtered");
                    self.progress.on_object(&outcome);
                    report.record(outcome);
                    continue;
                }
                workers.push(async move {
                    let _permit = semaphore.acquire().await.ok();
                    self.import_container(store, tree_ref, cache_ref, kind, dir_name, &title)
                        .await
                });
            }

            // barrier: the next kind starts only after this one fully lands
            for outcomes in futures::future::join_all(workers).await {
                report.record_all(outcomes);
            }
            self.progress.on_kind_complete(kind);
        }

        info!(
            created = report.total(Outcome::Created),
            updated = report.total(Outcome::Updated),
            failed = report.total(Outcome::Failed),
            "import complete"
        );
        Ok(report)
    }

    /// Recreate manifest-listed containers so folders that were empty at
    /// the source exist at the target too. Controller-owned containers are
    /// left alone.
    async fn recreate_manifest_containers(
        &self,
        store: &dyn ConfigStore,
        cache: &ContainerCache,
        manifest: &[Container],
    ) {
        for container in manifest {
            if container.provenance.is_some() {
                continue;
            }
            if !self.opts.policy.selected(&container.title) {
                continue;
            }
            if cache.get(container.kind, &container.title).is_some() {
                continue;
            }
            match self
                .with_timeout(store.create_container(container.kind, &container.title))
                .await
            {
                Ok(uid) => {
                    info!(container = %container.title, "recreated container");
                    cache.insert(Container {
                        title: container.title.clone(),
                        uid,
                        kind: container.kind,
                        provenance: None,
                    });
                }
                Err(Error::Store(StoreError::Exists(_))) => {
                    cache.insert(Container {
                        title: container.title.clone(),
                        uid: String::new(),
                        kind: container.kind,
                        provenance: None,
                    });
                }
                Err(Error::Store(StoreError::Unsupported(reason))) => {
                    debug!(%reason, "target cannot create this container kind");
                }
                Err(e) => {
                    warn!(container = %container.title, error = %e, "failed to recreate container");
                }
            }
        }
    }

    async fn import_container(
        &self,
        store: &dyn ConfigStore,
        tree: &BackupTree,
        cache: &ContainerCache,
        kind: ObjectKind,
        dir_name: &str,
        title: &str,
    ) -> Vec<ObjectOutcome> {
        let entries = match tree.read_objects(kind, dir_name) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    kind = kind.name(),
                    container = %title,
                    error = %e,
                    "cannot read container from tree"
                );
                let outcome = ObjectOutcome::new(kind, title, "*", Outcome::Failed)
                    .with_reason(e.to_string());
                self.progress.on_object(&outcome);
                return vec![outcome];
            }
        };

        let mut outcomes = Vec::new();
        for (name, entry) in entries {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = match entry {
                Ok(object) => self.apply_object(store, cache, object).await,
                Err(e) => ObjectOutcome::new(kind, title, name, Outcome::Failed)
                    .with_reason(e.to_string()),
            };
            self.progress.on_object(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Apply one object: resolve its target container, probe for an
    /// existing counterpart, let the conflict resolver pick the action,
    /// execute it. Errors never escape the object boundary.
    async fn apply_object(
        &self,
        store: &dyn ConfigStore,
        cache: &ContainerCache,
        mut object: ConfigObject,
    ) -> ObjectOutcome {
        let kind = object.kind;
        if let Some(override_title) = &self.opts.target_container {
            object.container = override_title.clone();
        }
        let container_title = object.container.clone();
        let identity = object.identity.clone();
        let fail = |reason: String| {
            ObjectOutcome::new(kind, container_title.clone(), identity.clone(), Outcome::Failed)
                .with_reason(reason)
        };

        let target_container = match self.ensure_container(store, cache, &object).await {
            Ok(container) => container,
            Err(e) => return fail(e.to_string()),
        };

        let existing = match self
            .with_timeout(store.get_object(kind, &object.container, &object.identity))
            .await
        {
            Ok(existing) => existing,
            Err(e) => return fail(format!("conflict probe failed: {}", e)),
        };

        let action = conflict::resolve(
            &object,
            existing.as_ref(),
            target_container.as_ref(),
            self.opts.overwrite_dashboards,
        );
        debug!(
            kind = kind.name(),
            container = %object.container,
            identity = %object.identity,
            action = %action,
            "resolved"
        );

        match action {
            Action::Create => {
                match self.with_timeout(store.create_object(&object)).await {
                    Ok(_) => ObjectOutcome::new(kind, container_title, identity, Outcome::Created),
                    // a concurrent writer got there first; re-running is
                    // expected to land here and stay quiet
                    Err(Error::Store(StoreError::Exists(_))) => {
                        ObjectOutcome::new(kind, container_title, identity, Outcome::SkippedExists)
                    }
                    Err(e) => fail(e.to_string()),
                }
            }
            Action::Update => match self.with_timeout(store.update_object(&object)).await {
                Ok(()) => ObjectOutcome::new(kind, container_title, identity, Outcome::Updated),
                Err(e) => fail(e.to_string()),
            },
            Action::SkipExists => {
                ObjectOutcome::new(kind, container_title, identity, Outcome::SkippedExists)
            }
            Action::SkipProvenance => ObjectOutcome::new(
                kind,
                container_title,
                identity,
                Outcome::SkippedProvenance,
            )
            .with_reason("container is externally managed"),
        }
    }

    /// Look up the object's target container, creating it when the kind
    /// needs one and it does not exist yet. Returns the target's view of
    /// the container (provenance included) when it has one.
    async fn ensure_container(
        &self,
        store: &dyn ConfigStore,
        cache: &ContainerCache,
        object: &ConfigObject,
    ) -> Result<Option<Container>> {
        let container_kind = object.kind.container_kind();
        if let Some(existing) = cache.get(container_kind, &object.container) {
            return Ok(Some(existing));
        }
        if !object.kind.requires_container() {
            return Ok(None);
        }
        match self
            .with_timeout(store.create_container(container_kind, &object.container))
            .await
        {
            Ok(uid) => {
                info!(container = %object.container, "created container");
                let container = Container {
                    title: object.container.clone(),
                    uid,
                    kind: container_kind,
                    provenance: None,
                };
                cache.insert(container.clone());
                Ok(Some(container))
            }
            Err(Error::Store(StoreError::Exists(_))) => {
                let container = Container {
                    title: object.container.clone(),
                    uid: String::new(),
                    kind: container_kind,
                    provenance: None,
                };
                cache.insert(container.clone());
                Ok(Some(container))
            }
            Err(e) => Err(e),
        }
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

/// Map an on-disk container name back to its real title via the manifest;
/// names sanitize one way, so the manifest is the reverse index.
fn resolve_title(manifest: &[Container], dir_name: &str) -> String {
    manifest
        .iter()
        .find(|c| safe_component(&c.title) == dir_name)
        .map(|c| c.title.clone())
        .unwrap_or_else(|| dir_name.to_string())
}
