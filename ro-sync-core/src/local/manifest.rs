//! On-disk RO manifest (`.ro/manifest.json`).
//!
//! The manifest holds the RO name and its annotation set. It is written
//! deterministically so a checked-out copy is byte-identical to the source.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::model::Annotation;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeSet<Annotation>,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: BTreeSet::new(),
        }
    }

    /// Returns `Ok(None)` if the manifest file does not exist.
    pub fn load(path: &Path) -> SyncResult<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SyncError::Manifest {
                    path: path.to_path_buf(),
                    source: e,
                }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        let mut json = serde_json::to_string_pretty(self).map_err(|e| SyncError::Manifest {
            path: path.to_path_buf(),
            source: e,
        })?;
        json.push('\n');
        fs::write(path, json).map_err(|e| SyncError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subject;
    use tempfile::TempDir;

    #[test]
    fn test_output_is_independent_of_insertion_order() {
        let a = Annotation::new(Subject::Ro, "title", "x");
        let b = Annotation::new(Subject::parse("a.txt").unwrap(), "type", "y");

        let mut first = Manifest::new("ro");
        first.annotations.insert(a.clone());
        first.annotations.insert(b.clone());
        let mut second = Manifest::new("ro");
        second.annotations.insert(b);
        second.annotations.insert(a);

        let temp = TempDir::new().unwrap();
        let p1 = temp.path().join("1.json");
        let p2 = temp.path().join("2.json");
        first.save(&p1).unwrap();
        second.save(&p2).unwrap();
        assert_eq!(fs::read(p1).unwrap(), fs::read(p2).unwrap());
    }

    #[test]
    fn test_load_missing() {
        let temp = TempDir::new().unwrap();
        assert!(Manifest::load(&temp.path().join("manifest.json"))
            .unwrap()
            .is_none());
    }
}
