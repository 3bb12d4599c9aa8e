//! Local RO store: a Research Object rooted at a directory.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── .ro/
//! │   ├── manifest.json      # RO name and annotations
//! │   └── registries.json    # identity registry (local only)
//! ├── a.txt                  # aggregated resources
//! └── subdir/b.txt
//! ```
//!
//! Everything under `.ro/` is bookkeeping and never appears in the
//! resource listing.

mod manifest;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{SyncError, SyncResult};
use crate::model::{Annotation, ResourceId, METADATA_DIR};
use crate::registry::IdentityRegistry;

pub use manifest::Manifest;

/// Manifest file name inside the metadata directory.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Identity registry file name inside the metadata directory.
pub const REGISTRY_FILE: &str = "registries.json";

/// Returns true if a path relative to the RO root is bookkeeping rather than content.
pub fn is_bookkeeping(relative: &Path) -> bool {
    relative
        .components()
        .next()
        .is_some_and(|c| c.as_os_str() == METADATA_DIR)
}

/// A Research Object stored in a local directory.
#[derive(Debug, Clone)]
pub struct LocalRo {
    root: PathBuf,
    manifest: Manifest,
}

impl LocalRo {
    /// Initializes a new RO in `root`, creating the directory if needed.
    ///
    /// Fails with `AlreadyExists` if `root` already holds an RO.
    pub fn create(root: impl Into<PathBuf>, name: impl Into<String>) -> SyncResult<Self> {
        let root = root.into();
        let manifest_path = Self::manifest_path_in(&root);
        if manifest_path.exists() {
            return Err(SyncError::AlreadyExists(manifest_path));
        }
        fs::create_dir_all(&root).map_err(|e| SyncError::io(&root, e))?;

        let ro = Self {
            root,
            manifest: Manifest::new(name),
        };
        ro.save_manifest()?;
        Ok(ro)
    }

    /// Creates an empty RO for a checkout.
    ///
    /// Fails with `AlreadyExists` if `root` exists and is not empty, unless
    /// `overwrite` is set, in which case the directory is emptied first.
    pub fn create_fresh(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        overwrite: bool,
    ) -> SyncResult<Self> {
        let root = root.into();
        match fs::read_dir(&root) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    if !overwrite {
                        return Err(SyncError::AlreadyExists(root));
                    }
                    tracing::info!("Overwriting {}", root.display());
                    fs::remove_dir_all(&root).map_err(|e| SyncError::io(&root, e))?;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::io(&root, e)),
        }
        Self::create(root, name)
    }

    /// Opens an existing RO.
    pub fn open(root: impl Into<PathBuf>) -> SyncResult<Self> {
        let root = root.into();
        let manifest = Manifest::load(&Self::manifest_path_in(&root))?.ok_or_else(|| {
            SyncError::NotFound(format!("no research object at {}", root.display()))
        })?;
        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    fn manifest_path_in(root: &Path) -> PathBuf {
        root.join(METADATA_DIR).join(MANIFEST_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        Self::manifest_path_in(&self.root)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(METADATA_DIR).join(REGISTRY_FILE)
    }

    /// Full path of a resource in the local tree.
    pub fn resource_path(&self, id: &ResourceId) -> PathBuf {
        self.root.join(id.to_relative_path())
    }

    /// Enumerates aggregated resources, sorted by identifier.
    pub fn list_resources(&self) -> SyncResult<Vec<ResourceId>> {
        let root = &self.root;
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .map_or(true, |relative| !is_bookkeeping(relative))
            });

        let mut ids = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                SyncError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            match ResourceId::from_relative_path(relative) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resource_path(id).is_file()
    }

    pub fn read_resource(&self, id: &ResourceId) -> SyncResult<Vec<u8>> {
        let path = self.resource_path(id);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SyncError::NotFound(id.to_string()),
            _ => SyncError::io(path, e),
        })
    }

    /// Writes resource content, creating parent directories and replacing
    /// existing content.
    pub fn materialize(&self, id: &ResourceId, bytes: &[u8]) -> SyncResult<()> {
        let path = self.resource_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        fs::write(&path, bytes).map_err(|e| SyncError::io(path, e))
    }

    /// Deletes a resource. Deleting an absent resource is a no-op.
    pub fn remove(&self, id: &ResourceId) -> SyncResult<()> {
        let path = self.resource_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    pub fn annotations(&self) -> &BTreeSet<Annotation> {
        &self.manifest.annotations
    }

    /// Adds an annotation and saves the manifest.
    ///
    /// Returns false if the annotation was already present. Fails with
    /// `InvalidSubject` if the subject is a resource that does not exist.
    pub fn add_annotation(&mut self, annotation: Annotation) -> SyncResult<bool> {
        if let Some(id) = annotation.subject.resource() {
            if !self.contains(id) {
                return Err(SyncError::InvalidSubject(id.to_string()));
            }
        }
        let added = self.manifest.annotations.insert(annotation);
        if added {
            self.save_manifest()?;
        }
        Ok(added)
    }

    pub fn remove_annotation(&mut self, annotation: &Annotation) -> SyncResult<bool> {
        let removed = self.manifest.annotations.remove(annotation);
        if removed {
            self.save_manifest()?;
        }
        Ok(removed)
    }

    /// Replaces the whole annotation set and saves the manifest.
    pub fn replace_annotations(
        &mut self,
        annotations: impl IntoIterator<Item = Annotation>,
    ) -> SyncResult<()> {
        self.manifest.annotations = annotations.into_iter().collect();
        self.save_manifest()
    }

    fn save_manifest(&self) -> SyncResult<()> {
        self.manifest.save(&self.manifest_path())
    }

    pub fn load_registry(&self) -> SyncResult<IdentityRegistry> {
        IdentityRegistry::load(&self.registry_path())
    }

    pub fn save_registry(&self, registry: &IdentityRegistry) -> SyncResult<()> {
        registry.save(&self.registry_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemKind, Subject};
    use tempfile::TempDir;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn test_ro() -> (LocalRo, TempDir) {
        let temp = TempDir::new().unwrap();
        let ro = LocalRo::create(temp.path().join("ro"), "Test RO").unwrap();
        (ro, temp)
    }

    #[test]
    fn test_create_writes_manifest() {
        let (ro, _temp) = test_ro();
        assert!(ro.manifest_path().is_file());
        assert_eq!(LocalRo::open(ro.root()).unwrap().name(), "Test RO");
    }

    #[test]
    fn test_create_twice_fails() {
        let (ro, _temp) = test_ro();
        assert!(matches!(
            LocalRo::create(ro.root(), "again"),
            Err(SyncError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            LocalRo::open(temp.path()),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_resources_excludes_bookkeeping() {
        let (ro, _temp) = test_ro();
        ro.materialize(&id("a.txt"), b"a").unwrap();
        ro.materialize(&id("subdir/b.txt"), b"b").unwrap();
        ro.save_registry(&{
            let mut r = IdentityRegistry::new();
            r.record("a.txt", ItemKind::Resource, "u", None);
            r
        })
        .unwrap();
        fs::create_dir_all(ro.root().join("empty")).unwrap();

        let ids = ro.list_resources().unwrap();
        assert_eq!(ids, vec![id("a.txt"), id("subdir/b.txt")]);
        assert!(ro.registry_path().is_file());
    }

    #[test]
    fn test_is_bookkeeping() {
        assert!(is_bookkeeping(Path::new(".ro")));
        assert!(is_bookkeeping(Path::new(".ro/registries.json")));
        assert!(!is_bookkeeping(Path::new("a/.ro/x")));
        assert!(!is_bookkeeping(Path::new(".rox")));
    }

    #[test]
    fn test_read_missing_resource() {
        let (ro, _temp) = test_ro();
        assert!(matches!(
            ro.read_resource(&id("nope.txt")),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn test_materialize_overwrites() {
        let (ro, _temp) = test_ro();
        ro.materialize(&id("d/e/f.txt"), b"one").unwrap();
        ro.materialize(&id("d/e/f.txt"), b"two").unwrap();
        assert_eq!(ro.read_resource(&id("d/e/f.txt")).unwrap(), b"two");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (ro, _temp) = test_ro();
        ro.materialize(&id("a.txt"), b"a").unwrap();
        ro.remove(&id("a.txt")).unwrap();
        ro.remove(&id("a.txt")).unwrap();
        assert!(!ro.contains(&id("a.txt")));
    }

    #[test]
    fn test_add_annotation_validates_subject() {
        let (mut ro, _temp) = test_ro();
        let missing = Annotation::new(Subject::Resource(id("x.txt")), "type", "t");
        assert!(matches!(
            ro.add_annotation(missing),
            Err(SyncError::InvalidSubject(_))
        ));

        ro.materialize(&id("x.txt"), b"x").unwrap();
        let ann = Annotation::new(Subject::Resource(id("x.txt")), "type", "t");
        assert!(ro.add_annotation(ann.clone()).unwrap());
        assert!(!ro.add_annotation(ann).unwrap());
        assert!(ro
            .add_annotation(Annotation::new(Subject::Ro, "title", "T"))
            .unwrap());

        let reopened = LocalRo::open(ro.root()).unwrap();
        assert_eq!(reopened.annotations().len(), 2);
    }

    #[test]
    fn test_remove_annotation() {
        let (mut ro, _temp) = test_ro();
        let ann = Annotation::new(Subject::Ro, "title", "T");
        ro.add_annotation(ann.clone()).unwrap();
        assert!(ro.remove_annotation(&ann).unwrap());
        assert!(!ro.remove_annotation(&ann).unwrap());
        assert!(LocalRo::open(ro.root()).unwrap().annotations().is_empty());
    }

    #[test]
    fn test_create_fresh_rejects_non_empty() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), b"old").unwrap();

        assert!(matches!(
            LocalRo::create_fresh(&target, "ro", false),
            Err(SyncError::AlreadyExists(_))
        ));

        let ro = LocalRo::create_fresh(&target, "ro", true).unwrap();
        assert!(ro.list_resources().unwrap().is_empty());
    }

    #[test]
    fn test_create_fresh_accepts_empty_dir() {
        let temp = TempDir::new().unwrap();
        let ro = LocalRo::create_fresh(temp.path(), "ro", false).unwrap();
        assert_eq!(ro.name(), "ro");
    }
}
