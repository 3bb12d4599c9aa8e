//! Remote RO client: access to Research Objects held by a digital library service.
//!
//! [`RemoteStore`] abstracts the service so the sync engine can run against
//! the HTTP client ([`RosrsClient`]) or an in-process store ([`MemoryRemote`]).

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::model::{Annotation, ResourceId};

pub use http::{ClientConfig, CreateRoRequest, RoDocument, RosrsClient, DEFAULT_TIMEOUT};
pub use memory::{CallCounts, MemoryRemote};

/// URI of a remote Research Object, always ending in `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoUri(String);

impl RoUri {
    pub fn new(uri: impl Into<String>) -> Self {
        let mut uri = uri.into();
        if !uri.ends_with('/') {
            uri.push('/');
        }
        Self(uri)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, used as the default local directory name.
    pub fn slug(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

impl std::fmt::Display for RoUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts an RO name into the path segment used on the remote service.
pub fn ro_slug(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Remote URI and state token returned by a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub uri: String,
    pub etag: Option<String>,
}

/// A resource as listed by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub id: ResourceId,
    pub uri: String,
    #[serde(default)]
    pub etag: Option<String>,
}

/// An annotation as listed by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAnnotation {
    pub uri: String,
    #[serde(flatten)]
    pub annotation: Annotation,
}

/// Summary of a remote RO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRoInfo {
    pub uri: RoUri,
    pub name: String,
}

/// Operations the sync engine needs from the remote service.
///
/// Writes are idempotent: uploading the same identifier or pushing the same
/// annotation twice yields one remote item. Deletes of absent items return
/// `SyncError::NotFound`, which callers treat as success.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Resolves an RO name or absolute URI to the RO's URI.
    fn resolve(&self, name_or_uri: &str) -> RoUri;

    /// Creates an empty RO named `name`.
    async fn create_ro(&self, name: &str) -> SyncResult<RoUri>;

    /// Fails with `NotFound` if the RO does not exist.
    async fn describe(&self, ro: &RoUri) -> SyncResult<RemoteRoInfo>;

    /// Lists aggregated resources in a stable order.
    async fn list_resources(&self, ro: &RoUri) -> SyncResult<Vec<RemoteResource>>;

    async fn fetch_resource(&self, ro: &RoUri, resource: &RemoteResource)
        -> SyncResult<Vec<u8>>;

    /// Creates or replaces a resource.
    async fn upload_resource(
        &self,
        ro: &RoUri,
        id: &ResourceId,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> SyncResult<RemoteEntry>;

    async fn delete_resource(&self, ro: &RoUri, uri: &str) -> SyncResult<()>;

    async fn list_annotations(&self, ro: &RoUri) -> SyncResult<Vec<RemoteAnnotation>>;

    /// Creates or replaces an annotation.
    async fn push_annotation(&self, ro: &RoUri, annotation: &Annotation)
        -> SyncResult<RemoteEntry>;

    async fn retract_annotation(&self, ro: &RoUri, uri: &str) -> SyncResult<()>;

    /// Removes the RO and everything in it.
    async fn delete_ro(&self, ro: &RoUri) -> SyncResult<()>;
}
