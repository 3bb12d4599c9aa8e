//! Identity registry: local-only mapping from local identifiers to remote URIs.
//!
//! The registry is persisted next to the RO metadata but is never part of the
//! RO content. It is not listed, compared or uploaded.
//!
//! # File Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "entries": [
//!     { "kind": "resource", "id": "a.txt", "uri": "http://.../a.txt",
//!       "marker": "\"3f2a...\"", "synced_at": "2024-01-01T00:00:00Z" }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::model::ItemKind;

const FORMAT_VERSION: u32 = 1;

/// Remote identity of one local item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Remote URI of the item.
    pub uri: String,
    /// Last-known remote state token (ETag), if the remote provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// When the item was last synchronized.
    pub synced_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    entries: Vec<RegistryRecord>,
}

/// Flat form of an entry, as returned by [`IdentityRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub kind: ItemKind,
    pub id: String,
    #[serde(flatten)]
    pub entry: RegistryEntry,
}

/// Mapping `(identifier, kind) -> remote URI + marker`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRegistry {
    entries: BTreeMap<(ItemKind, String), RegistryEntry>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: &str, kind: ItemKind) -> Option<&RegistryEntry> {
        self.entries.get(&(kind, id.to_string()))
    }

    /// Inserts or replaces the entry for `(id, kind)`.
    pub fn record(
        &mut self,
        id: impl Into<String>,
        kind: ItemKind,
        uri: impl Into<String>,
        marker: Option<String>,
    ) {
        self.entries.insert(
            (kind, id.into()),
            RegistryEntry {
                uri: uri.into(),
                marker,
                synced_at: Utc::now(),
            },
        );
    }

    /// Removes an entry. Returns the removed entry, if any.
    pub fn forget(&mut self, id: &str, kind: ItemKind) -> Option<RegistryEntry> {
        self.entries.remove(&(kind, id.to_string()))
    }

    /// Drops every entry of `kind` whose identifier is not in `keep`.
    pub fn prune(&mut self, kind: ItemKind, keep: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(k, id), _| *k != kind || keep.contains(id));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full mapping, sorted by kind then identifier.
    pub fn snapshot(&self) -> Vec<RegistryRecord> {
        self.entries
            .iter()
            .map(|((kind, id), entry)| RegistryRecord {
                kind: *kind,
                id: id.clone(),
                entry: entry.clone(),
            })
            .collect()
    }

    /// Loads a registry from disk. A missing file is an empty registry.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(SyncError::io(path, e)),
        };
        let file: RegistryFile =
            serde_json::from_slice(&bytes).map_err(|e| SyncError::Manifest {
                path: path.to_path_buf(),
                source: e,
            })?;
        if file.version != FORMAT_VERSION {
            tracing::warn!(
                "Registry {} has version {}, expected {}",
                path.display(),
                file.version,
                FORMAT_VERSION
            );
        }
        let entries = file
            .entries
            .into_iter()
            .map(|r| ((r.kind, r.id), r.entry))
            .collect();
        Ok(Self { entries })
    }

    /// Saves the registry, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        let file = RegistryFile {
            version: FORMAT_VERSION,
            entries: self.snapshot(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| SyncError::Manifest {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(|e| SyncError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_lookup() {
        let mut registry = IdentityRegistry::new();
        registry.record("a.txt", ItemKind::Resource, "http://x/ro/a.txt", None);

        let entry = registry.lookup("a.txt", ItemKind::Resource).unwrap();
        assert_eq!(entry.uri, "http://x/ro/a.txt");
        assert!(registry.lookup("a.txt", ItemKind::Annotation).is_none());
    }

    #[test]
    fn test_record_is_upsert() {
        let mut registry = IdentityRegistry::new();
        registry.record("a.txt", ItemKind::Resource, "http://x/1", None);
        registry.record("a.txt", ItemKind::Resource, "http://x/2", Some("\"e\"".into()));

        assert_eq!(registry.len(), 1);
        let entry = registry.lookup("a.txt", ItemKind::Resource).unwrap();
        assert_eq!(entry.uri, "http://x/2");
        assert_eq!(entry.marker.as_deref(), Some("\"e\""));
    }

    #[test]
    fn test_forget() {
        let mut registry = IdentityRegistry::new();
        registry.record("a.txt", ItemKind::Resource, "http://x/a", None);
        assert!(registry.forget("a.txt", ItemKind::Resource).is_some());
        assert!(registry.forget("a.txt", ItemKind::Resource).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prune_only_touches_kind() {
        let mut registry = IdentityRegistry::new();
        registry.record("a.txt", ItemKind::Resource, "u1", None);
        registry.record("gone.txt", ItemKind::Resource, "u2", None);
        registry.record("gone.txt", ItemKind::Annotation, "u3", None);

        let keep: HashSet<String> = ["a.txt".to_string()].into_iter().collect();
        assert_eq!(registry.prune(ItemKind::Resource, &keep), 1);
        assert!(registry.lookup("a.txt", ItemKind::Resource).is_some());
        assert!(registry.lookup("gone.txt", ItemKind::Annotation).is_some());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = IdentityRegistry::load(&temp.path().join("none.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".ro").join("registries.json");

        let mut registry = IdentityRegistry::new();
        registry.record("b.txt", ItemKind::Resource, "u-b", Some("\"1\"".into()));
        registry.record("k", ItemKind::Annotation, "u-k", None);
        registry.save(&path).unwrap();

        let loaded = IdentityRegistry::load(&path).unwrap();
        assert_eq!(loaded, registry);
        let kinds: Vec<ItemKind> = loaded.snapshot().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ItemKind::Resource, ItemKind::Annotation]);
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registries.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            IdentityRegistry::load(&path),
            Err(SyncError::Manifest { .. })
        ));
    }
}
