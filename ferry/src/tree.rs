//! The on-disk backup tree: the sole contract between export and import.
//!
//! Layout (root-relative):
//!
//! ```text
//! folders.json                              container manifest
//! ferry-manifest.json                       export metadata + checksum
//! dashboards/<container>/<title>.json       one file per dashboard
//! alert-rules-by-folder/<container>.json    one file per folder, list of groups
//! contact-points.json                       root-level list
//! notification-policies.json                root-level list
//! mute-timings.json                         root-level list
//! templates.json                            root-level list
//! <namespace>/<rule-name>.yaml              one file per rule CRD
//! ```
//!
//! A tree is written by one export pass and never mutated afterwards.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::kind::{ObjectKind, StorageStyle};
use crate::model::{ConfigObject, Container};

pub const TREE_FORMAT: &str = "ferry-tree-v1";
const FOLDERS_MANIFEST: &str = "folders.json";
const EXPORT_MANIFEST: &str = "ferry-manifest.json";

/// Root-level directories and files that are never namespace directories.
const RESERVED: [&str; 8] = [
    FOLDERS_MANIFEST,
    EXPORT_MANIFEST,
    "dashboards",
    "alert-rules-by-folder",
    "contact-points.json",
    "notification-policies.json",
    "mute-timings.json",
    "templates.json",
];

/// Export metadata written alongside the objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub format: String,
    pub engine_version: String,
    /// RFC 3339
    pub exported_at: String,
    /// Exported object count per kind name
    pub counts: BTreeMap<String, u64>,
    /// SHA-256 over every object file, hex-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Normalize a container title or object identity into a path component.
///
/// Path separators, quotes and whitespace become `_`; the result is capped
/// at 100 characters for filesystem limits. Two names that collide after
/// normalization map to the same file and the later write wins.
pub fn safe_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' | '\'' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .take(100)
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Handle to a backup tree on disk.
#[derive(Debug, Clone)]
pub struct BackupTree {
    root: PathBuf,
}

impl BackupTree {
    /// Create the tree root for an export. The directory is created if
    /// absent; a pre-existing non-directory path fails the run.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(Error::Tree(format!(
                "{} exists and is not a directory",
                root.display()
            )));
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open an existing tree for an import.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Tree(format!(
                "{} is not a backup tree directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -- write side (export) -------------------------------------------------

    /// Path an object will be written to. Only meaningful for per-object
    /// storage styles.
    pub fn object_path(&self, object: &ConfigObject) -> PathBuf {
        let container = safe_component(&object.container);
        let identity = safe_component(&object.identity);
        let file = format!("{}.{}", identity, object.kind.extension());
        match object.kind.storage_style() {
            StorageStyle::RootPerObject => self.root.join(container).join(file),
            _ => {
                let dir = object.kind.dir_name().unwrap_or_default();
                self.root.join(dir).join(container).join(file)
            }
        }
    }

    /// Write one object file (per-object styles). Returns the serialized
    /// bytes so the caller can fold them into a checksum.
    pub fn write_object(&self, object: &ConfigObject) -> Result<Vec<u8>> {
        let path = self.object_path(object);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = match object.kind.extension() {
            "yaml" => serde_yaml::to_string(&object.payload)?.into_bytes(),
            _ => {
                let mut b = serde_json::to_vec_pretty(&object.payload)?;
                b.push(b'\n');
                b
            }
        };
        fs::write(&path, &bytes)?;
        Ok(bytes)
    }

    /// Write a per-container list file (`alert-rules-by-folder/<c>.json`).
    pub fn write_container_list(
        &self,
        kind: ObjectKind,
        container: &str,
        payloads: &[Value],
    ) -> Result<Vec<u8>> {
        let dir = self
            .root
            .join(kind.dir_name().expect("per-container kind has a directory"));
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.{}", safe_component(container), kind.extension()));
        let mut bytes = serde_json::to_vec_pretty(payloads)?;
        bytes.push(b'\n');
        fs::write(&path, &bytes)?;
        Ok(bytes)
    }

    /// Write a root-level list file (`contact-points.json` and friends).
    pub fn write_root_list(&self, kind: ObjectKind, payloads: &[Value]) -> Result<Vec<u8>> {
        let stem = kind.dir_name().expect("root-list kind has a file stem");
        let path = self.root.join(format!("{}.{}", stem, kind.extension()));
        let mut bytes = serde_json::to_vec_pretty(payloads)?;
        bytes.push(b'\n');
        fs::write(&path, &bytes)?;
        Ok(bytes)
    }

    /// Write the container manifest. Lists every container discovered at
    /// the source, independent of object filtering, so import can recreate
    /// empty containers.
    pub fn write_folders_manifest(&self, containers: &[Container]) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(containers)?;
        bytes.push(b'\n');
        fs::write(self.root.join(FOLDERS_MANIFEST), bytes)?;
        Ok(())
    }

    pub fn read_folders_manifest(&self) -> Result<Vec<Container>> {
        let path = self.root.join(FOLDERS_MANIFEST);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write_export_manifest(&self, manifest: &ExportManifest) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(manifest)?;
        bytes.push(b'\n');
        fs::write(self.root.join(EXPORT_MANIFEST), bytes)?;
        Ok(())
    }

    pub fn read_export_manifest(&self) -> Result<Option<ExportManifest>> {
        let path = self.root.join(EXPORT_MANIFEST);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// SHA-256 over every object file (relative path + contents), in path
    /// order. The export manifest itself is excluded.
    pub fn checksum(&self) -> Result<String> {
        let mut files = Vec::new();
        collect_files(&self.root, &self.root, &mut files)?;
        files.retain(|rel| rel != Path::new(EXPORT_MANIFEST));
        files.sort();
        let mut hasher = Sha256::new();
        for rel in files {
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(fs::read(self.root.join(&rel))?);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    // -- read side (import) --------------------------------------------------

    /// Kinds present in this tree, derived from the layout alone.
    /// `alert-rules-by-folder` reads back as `RuleGroup`, the canonical
    /// kind for grouped alert rules.
    pub fn present_kinds(&self) -> Result<BTreeSet<ObjectKind>> {
        let mut kinds = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                match name.as_str() {
                    "dashboards" => {
                        kinds.insert(ObjectKind::Dashboard);
                    }
                    "alert-rules-by-folder" => {
                        kinds.insert(ObjectKind::RuleGroup);
                    }
                    _ => {
                        kinds.insert(ObjectKind::RuleCrd);
                    }
                }
            } else {
                match name.as_str() {
                    // a kind directory replaced by a file is a corrupt
                    // layout; surface it to the kind's pass instead of
                    // silently dropping the kind
                    "dashboards" => {
                        kinds.insert(ObjectKind::Dashboard);
                    }
                    "alert-rules-by-folder" => {
                        kinds.insert(ObjectKind::RuleGroup);
                    }
                    "contact-points.json" => {
                        kinds.insert(ObjectKind::ContactPoint);
                    }
                    "notification-policies.json" => {
                        kinds.insert(ObjectKind::NotificationPolicy);
                    }
                    "mute-timings.json" => {
                        kinds.insert(ObjectKind::MuteTiming);
                    }
                    "templates.json" => {
                        kinds.insert(ObjectKind::Template);
                    }
                    _ => {}
                }
            }
        }
        Ok(kinds)
    }

    /// On-disk container names for a kind. For root-list kinds this is the
    /// kind's sentinel; real titles are recovered from payloads or the
    /// folder manifest by the importer.
    pub fn containers_for(&self, kind: ObjectKind) -> Result<Vec<String>> {
        let mut names = Vec::new();
        match kind.storage_style() {
            StorageStyle::PerObject => {
                let dir = self.root.join(kind.dir_name().unwrap_or_default());
                if dir.exists() {
                    for entry in fs::read_dir(dir)? {
                        let entry = entry?;
                        if entry.file_type()?.is_dir() {
                            names.push(entry.file_name().to_string_lossy().into_owned());
                        }
                    }
                }
            }
            StorageStyle::PerContainer => {
                let dir = self.root.join(kind.dir_name().unwrap_or_default());
                if dir.exists() {
                    for entry in fs::read_dir(dir)? {
                        let entry = entry?;
                        let path = entry.path();
                        if path.extension().and_then(|e| e.to_str()) == Some(kind.extension()) {
                            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                                names.push(stem.to_string());
                            }
                        }
                    }
                }
            }
            StorageStyle::RootList => names.push(kind.sentinel_container().to_string()),
            StorageStyle::RootPerObject => {
                for entry in fs::read_dir(&self.root)? {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type()?.is_dir() && !RESERVED.contains(&name.as_str()) {
                        names.push(name);
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read every object recorded for `kind` in `container` (an on-disk
    /// container name from [`containers_for`]).
    ///
    /// The outer `Err` is an enumeration failure and aborts the kind; an
    /// inner `Err` is one unreadable object file and is recorded as a
    /// per-object failure by the caller.
    pub fn read_objects(
        &self,
        kind: ObjectKind,
        container: &str,
    ) -> Result<Vec<(String, Result<ConfigObject>)>> {
        match kind.storage_style() {
            StorageStyle::PerObject | StorageStyle::RootPerObject => {
                self.read_object_dir(kind, container)
            }
            StorageStyle::PerContainer => {
                let dir = self.root.join(kind.dir_name().unwrap_or_default());
                let path = dir.join(format!("{}.{}", container, kind.extension()));
                Ok(read_list_file(kind, container, &path))
            }
            StorageStyle::RootList => {
                let stem = kind.dir_name().unwrap_or_default();
                let path = self.root.join(format!("{}.{}", stem, kind.extension()));
                Ok(read_list_file(kind, container, &path))
            }
        }
    }

    fn read_object_dir(
        &self,
        kind: ObjectKind,
        container: &str,
    ) -> Result<Vec<(String, Result<ConfigObject>)>> {
        let dir = match kind.storage_style() {
            StorageStyle::RootPerObject => self.root.join(container),
            _ => self
                .root
                .join(kind.dir_name().unwrap_or_default())
                .join(container),
        };
        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
                p.is_file() && (ext == kind.extension() || (kind.extension() == "yaml" && ext == "yml"))
            })
            .collect();
        entries.sort();

        let mut objects = Vec::new();
        for path in entries {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("object")
                .to_string();
            objects.push((stem.clone(), read_object_file(kind, &path, &stem, container)));
        }
        Ok(objects)
    }
}

fn read_object_file(
    kind: ObjectKind,
    path: &Path,
    stem: &str,
    container: &str,
) -> Result<ConfigObject> {
    let text = fs::read_to_string(path)?;
    let payload: Value = match kind.extension() {
        "yaml" => serde_yaml::from_str(&text)?,
        _ => serde_json::from_str(&text)?,
    };
    Ok(ConfigObject::from_payload(kind, payload, stem, container))
}

fn read_list_file(
    kind: ObjectKind,
    container: &str,
    path: &Path,
) -> Vec<(String, Result<ConfigObject>)> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => return vec![(name, Err(e.into()))],
    };
    let payloads: Vec<Value> = match serde_json::from_str(&text) {
        Ok(Value::Array(items)) => items,
        // a bare object reads as a one-element list (the notification
        // policy tree is written this way by older backup scripts)
        Ok(single @ Value::Object(_)) => vec![single],
        Ok(_) => return vec![(name.clone(), Err(Error::Tree(format!("{}: not a list", name))))],
        Err(e) => return vec![(name, Err(e.into()))],
    };
    payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| {
            let fallback = format!("{}-{}", container, i);
            let obj = ConfigObject::from_payload(kind, payload, &fallback, container);
            (obj.identity.clone(), Ok(obj))
        })
        .collect()
}

fn collect_files(dir: &Path, base: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, base, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_safe_component_normalizes_hostile_chars() {
        assert_eq!(safe_component("Prod/EU \"west\""), "Prod_EU__west_");
        assert_eq!(safe_component("a'b\\c"), "a_b_c");
        assert_eq!(safe_component(""), "_");
    }

    #[test]
    fn test_safe_component_caps_length() {
        let long = "x".repeat(250);
        assert_eq!(safe_component(&long).chars().count(), 100);
    }

    #[test]
    fn test_create_rejects_non_directory_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();
        assert!(BackupTree::create(&file).is_err());
    }

    #[test]
    fn test_dashboard_layout_path() {
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        let obj = ConfigObject::new(
            ObjectKind::Dashboard,
            "API Latency",
            "Prod",
            json!({"title": "API Latency"}),
        );
        let path = tree.object_path(&obj);
        assert!(path.ends_with("dashboards/Prod/API_Latency.json"), "{:?}", path);
    }

    #[test]
    fn test_rule_crd_lives_in_namespace_dir_at_root() {
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        let obj = ConfigObject::new(
            ObjectKind::RuleCrd,
            "node-alerts",
            "prometheus",
            json!({"metadata": {"name": "node-alerts", "namespace": "prometheus"}}),
        );
        tree.write_object(&obj).unwrap();
        assert!(tree.root().join("prometheus/node-alerts.yaml").is_file());

        let kinds = tree.present_kinds().unwrap();
        assert!(kinds.contains(&ObjectKind::RuleCrd));
        assert_eq!(tree.containers_for(ObjectKind::RuleCrd).unwrap(), vec!["prometheus"]);
    }

    #[test]
    fn test_write_and_read_per_object_round_trip() {
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        let obj = ConfigObject::new(
            ObjectKind::Dashboard,
            "Latency",
            "Prod",
            json!({"dashboard": {"title": "Latency"}, "meta": {"folderTitle": "Prod"}}),
        );
        tree.write_object(&obj).unwrap();

        let read = tree.read_objects(ObjectKind::Dashboard, "Prod").unwrap();
        assert_eq!(read.len(), 1);
        let got = read[0].1.as_ref().unwrap();
        assert_eq!(got.identity, "Latency");
        assert_eq!(got.container, "Prod");
    }

    #[test]
    fn test_root_list_round_trip() {
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        tree.write_root_list(
            ObjectKind::ContactPoint,
            &[json!({"name": "oncall"}), json!({"name": "low-prio"})],
        )
        .unwrap();

        assert!(tree.root().join("contact-points.json").is_file());
        let read = tree
            .read_objects(ObjectKind::ContactPoint, "General")
            .unwrap();
        let identities: Vec<&str> = read
            .iter()
            .map(|(_, o)| o.as_ref().unwrap().identity.as_str())
            .collect();
        assert_eq!(identities, vec!["oncall", "low-prio"]);
    }

    #[test]
    fn test_per_container_round_trip() {
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        tree.write_container_list(
            ObjectKind::RuleGroup,
            "Prod",
            &[json!({"name": "cpu", "folder": "Prod", "rules": []})],
        )
        .unwrap();

        assert!(tree.root().join("alert-rules-by-folder/Prod.json").is_file());
        assert_eq!(tree.containers_for(ObjectKind::RuleGroup).unwrap(), vec!["Prod"]);
        let read = tree.read_objects(ObjectKind::RuleGroup, "Prod").unwrap();
        assert_eq!(read[0].1.as_ref().unwrap().identity, "cpu");
    }

    #[test]
    fn test_colliding_identities_overwrite_one_file() {
        // "a/b" and "a_b" normalize to the same component. Known limitation:
        // the second write wins.
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        let first = ConfigObject::new(ObjectKind::Dashboard, "a/b", "Prod", json!({"v": 1}));
        let second = ConfigObject::new(ObjectKind::Dashboard, "a_b", "Prod", json!({"v": 2}));
        assert_eq!(tree.object_path(&first), tree.object_path(&second));

        tree.write_object(&first).unwrap();
        tree.write_object(&second).unwrap();
        let read = tree.read_objects(ObjectKind::Dashboard, "Prod").unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].1.as_ref().unwrap().payload["v"], json!(2));
    }

    #[test]
    fn test_manifests_round_trip() {
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        let containers = vec![
            Container::folder("Prod", "uid-1"),
            Container::folder("Test", "uid-2"),
        ];
        tree.write_folders_manifest(&containers).unwrap();
        assert_eq!(tree.read_folders_manifest().unwrap(), containers);

        let manifest = ExportManifest {
            format: TREE_FORMAT.to_string(),
            engine_version: "0.0.0".to_string(),
            exported_at: "2026-01-01T00:00:00Z".to_string(),
            counts: BTreeMap::from([("dashboard".to_string(), 2)]),
            checksum: Some(tree.checksum().unwrap()),
        };
        tree.write_export_manifest(&manifest).unwrap();
        let read = tree.read_export_manifest().unwrap().unwrap();
        assert_eq!(read.counts.get("dashboard"), Some(&2));
        // manifest excludes itself from the checksum, so it stays stable
        assert_eq!(read.checksum, Some(tree.checksum().unwrap()));
    }

    #[test]
    fn test_unreadable_container_file_is_one_inner_error() {
        let temp = TempDir::new().unwrap();
        let tree = BackupTree::create(temp.path().join("backup")).unwrap();
        let dir = tree.root().join("alert-rules-by-folder");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Prod.json"), "{ not json").unwrap();

        let read = tree.read_objects(ObjectKind::RuleGroup, "Prod").unwrap();
        assert_eq!(read.len(), 1);
        assert!(read[0].1.is_err());
    }
}
