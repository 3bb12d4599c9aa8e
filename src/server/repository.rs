//! In-memory Research Object repository.
//!
//! Holds every RO served by `rosync-server`:
//! ```text
//! <slug>/
//!   name
//!   resources:   <resource id> -> bytes, content type, etag
//!   annotations: <annotation key> -> (subject, property, value)
//! ```
//!
//! Nothing is persisted; the repository lives as long as the process.

use std::collections::BTreeMap;

use ro_sync_core::remote::{RemoteAnnotation, RemoteResource, RoDocument, RoUri, RosrsClient};
use ro_sync_core::{Annotation, ResourceId};
use sha2::{Digest, Sha256};

/// Errors from repository operations.
#[derive(Debug, PartialEq, Eq)]
pub enum RepositoryError {
    /// No RO with this slug.
    RoNotFound(String),
    /// An RO with this slug already exists.
    RoExists(String),
    /// No such resource or annotation in the RO.
    ItemNotFound(String),
    /// Slug is empty or contains a path separator.
    InvalidSlug(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::RoNotFound(slug) => write!(f, "Research object not found: {}", slug),
            RepositoryError::RoExists(slug) => {
                write!(f, "Research object already exists: {}", slug)
            }
            RepositoryError::ItemNotFound(item) => write!(f, "Not found: {}", item),
            RepositoryError::InvalidSlug(slug) => write!(f, "Invalid RO slug: '{}'", slug),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Stored content of one resource.
#[derive(Debug, Clone)]
pub struct StoredResource {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub etag: String,
}

#[derive(Debug, Default)]
struct StoredRo {
    name: String,
    resources: BTreeMap<ResourceId, StoredResource>,
    annotations: BTreeMap<String, Annotation>,
}

/// Quoted SHA-256 of the content.
pub fn content_etag(bytes: &[u8]) -> String {
    format!("\"{:x}\"", Sha256::digest(bytes))
}

/// URI of the RO `slug` under `base` (scheme and authority, no trailing slash).
pub fn ro_uri(base: &str, slug: &str) -> RoUri {
    RoUri::new(format!("{}/ROs/{}/", base, urlencoding::encode(slug)))
}

#[derive(Debug, Default)]
pub struct Repository {
    ros: BTreeMap<String, StoredRo>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ros.is_empty()
    }

    fn ro(&self, slug: &str) -> Result<&StoredRo, RepositoryError> {
        self.ros
            .get(slug)
            .ok_or_else(|| RepositoryError::RoNotFound(slug.to_string()))
    }

    fn ro_mut(&mut self, slug: &str) -> Result<&mut StoredRo, RepositoryError> {
        self.ros
            .get_mut(slug)
            .ok_or_else(|| RepositoryError::RoNotFound(slug.to_string()))
    }

    pub fn create_ro(&mut self, slug: &str, name: &str) -> Result<(), RepositoryError> {
        if slug.is_empty() || slug.contains('/') || slug == "." || slug == ".." {
            return Err(RepositoryError::InvalidSlug(slug.to_string()));
        }
        if self.ros.contains_key(slug) {
            return Err(RepositoryError::RoExists(slug.to_string()));
        }
        self.ros.insert(
            slug.to_string(),
            StoredRo {
                name: name.to_string(),
                ..StoredRo::default()
            },
        );
        Ok(())
    }

    pub fn delete_ro(&mut self, slug: &str) -> Result<(), RepositoryError> {
        self.ros
            .remove(slug)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::RoNotFound(slug.to_string()))
    }

    /// Describes the RO with URIs rooted at `base`.
    pub fn document(&self, base: &str, slug: &str) -> Result<RoDocument, RepositoryError> {
        let stored = self.ro(slug)?;
        let uri = ro_uri(base, slug);
        let resources = stored
            .resources
            .iter()
            .map(|(id, resource)| RemoteResource {
                id: id.clone(),
                uri: RosrsClient::resource_uri(&uri, id),
                etag: Some(resource.etag.clone()),
            })
            .collect();
        let annotations = stored
            .annotations
            .values()
            .map(|annotation| RemoteAnnotation {
                uri: RosrsClient::annotation_uri(&uri, annotation),
                annotation: annotation.clone(),
            })
            .collect();
        Ok(RoDocument {
            uri: uri.to_string(),
            name: stored.name.clone(),
            resources,
            annotations,
        })
    }

    /// Creates or replaces a resource. Returns true if it was created, and
    /// the new etag.
    pub fn put_resource(
        &mut self,
        slug: &str,
        id: ResourceId,
        bytes: Vec<u8>,
        content_type: String,
    ) -> Result<(bool, String), RepositoryError> {
        let stored = self.ro_mut(slug)?;
        let etag = content_etag(&bytes);
        let previous = stored.resources.insert(
            id,
            StoredResource {
                bytes,
                content_type,
                etag: etag.clone(),
            },
        );
        Ok((previous.is_none(), etag))
    }

    pub fn resource(&self, slug: &str, id: &ResourceId) -> Result<&StoredResource, RepositoryError> {
        self.ro(slug)?
            .resources
            .get(id)
            .ok_or_else(|| RepositoryError::ItemNotFound(id.to_string()))
    }

    pub fn delete_resource(&mut self, slug: &str, id: &ResourceId) -> Result<(), RepositoryError> {
        self.ro_mut(slug)?
            .resources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::ItemNotFound(id.to_string()))
    }

    /// Stores an annotation under `key`. Returns true if it was created.
    pub fn put_annotation(
        &mut self,
        slug: &str,
        key: &str,
        annotation: Annotation,
    ) -> Result<bool, RepositoryError> {
        let stored = self.ro_mut(slug)?;
        Ok(stored
            .annotations
            .insert(key.to_string(), annotation)
            .is_none())
    }

    pub fn annotation(&self, slug: &str, key: &str) -> Result<&Annotation, RepositoryError> {
        self.ro(slug)?
            .annotations
            .get(key)
            .ok_or_else(|| RepositoryError::ItemNotFound(key.to_string()))
    }

    pub fn delete_annotation(&mut self, slug: &str, key: &str) -> Result<(), RepositoryError> {
        self.ro_mut(slug)?
            .annotations
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::ItemNotFound(key.to_string()))
    }
}
