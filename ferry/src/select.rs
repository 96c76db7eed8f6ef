//! Container selection by include/exclude lists.

use serde::{Deserialize, Serialize};

/// Include/exclude filter over container titles.
///
/// An empty list means no restriction on that side. When both are set,
/// include is evaluated first; exclude only narrows the included set.
/// Matching is case-insensitive exact equality on the container title,
/// not a pattern match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl SelectionPolicy {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Whether a container participates in export or import.
    ///
    /// Pure. Exporter and Importer call this identically, so an import
    /// policy can only narrow what an export policy already produced.
    pub fn selected(&self, container_title: &str) -> bool {
        let title = container_title.to_lowercase();
        let included = self.include.is_empty()
            || self.include.iter().any(|c| c.to_lowercase() == title);
        let excluded = self.exclude.iter().any(|c| c.to_lowercase() == title);
        included && !excluded
    }
}
