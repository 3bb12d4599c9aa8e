//! In-process remote store for testing.
//!
//! Mirrors the URI layout of [`RosrsClient`](super::RosrsClient) and can
//! simulate transport failures, outages, token rejection and slow responses.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ro_slug, RemoteAnnotation, RemoteEntry, RemoteResource, RemoteRoInfo, RemoteStore, RoUri,
    RosrsClient,
};
use crate::error::{SyncError, SyncResult};
use crate::model::{Annotation, ResourceId};

#[derive(Debug, Default)]
struct StoredRo {
    name: String,
    resources: BTreeMap<ResourceId, (Vec<u8>, String)>,
    annotations: BTreeMap<String, Annotation>,
}

/// Counts of write operations received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub uploads: usize,
    pub deletes: usize,
    pub annotation_pushes: usize,
    pub retractions: usize,
}

#[derive(Debug, Default)]
struct State {
    ros: BTreeMap<String, StoredRo>,
    failing_uploads: HashSet<ResourceId>,
    offline: bool,
    reject_token: bool,
    delay: Option<Duration>,
    revision: u64,
    calls: CallCounts,
}

/// A [`RemoteStore`] that keeps everything in memory.
#[derive(Debug)]
pub struct MemoryRemote {
    base_uri: String,
    state: Mutex<State>,
}

impl MemoryRemote {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let mut base_uri = base_uri.into();
        if !base_uri.ends_with('/') {
            base_uri.push('/');
        }
        Self {
            base_uri,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every upload of `id` fail with a transport error.
    pub fn fail_uploads_of(&self, id: &ResourceId) {
        self.lock().failing_uploads.insert(id.clone());
    }

    /// Simulates a service that cannot be reached.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Simulates a service that rejects the access token.
    pub fn set_reject_token(&self, reject: bool) {
        self.lock().reject_token = reject;
    }

    /// Delays every call by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }

    pub fn contains_ro(&self, ro: &RoUri) -> bool {
        self.lock().ros.contains_key(ro.slug())
    }

    /// Identifiers of the resources in `ro`, in listing order.
    pub fn resource_ids(&self, ro: &RoUri) -> Vec<String> {
        self.lock()
            .ros
            .get(ro.slug())
            .map(|stored| stored.resources.keys().map(|id| id.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn content(&self, ro: &RoUri, id: &ResourceId) -> Option<Vec<u8>> {
        self.lock()
            .ros
            .get(ro.slug())
            .and_then(|stored| stored.resources.get(id))
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn annotations(&self, ro: &RoUri) -> Vec<Annotation> {
        self.lock()
            .ros
            .get(ro.slug())
            .map(|stored| stored.annotations.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes a resource directly, as another client would.
    pub fn insert_resource(&self, ro: &RoUri, id: &ResourceId, bytes: &[u8]) {
        let mut state = self.lock();
        state.revision += 1;
        let etag = format!("\"{}\"", state.revision);
        let stored = state.ros.entry(ro.slug().to_string()).or_default();
        stored.resources.insert(id.clone(), (bytes.to_vec(), etag));
    }

    async fn enter(&self) -> SyncResult<()> {
        let delay = {
            let state = self.lock();
            if state.offline {
                return Err(SyncError::RemoteUnavailable(format!(
                    "{}: connection refused",
                    self.base_uri
                )));
            }
            if state.reject_token {
                return Err(SyncError::Unauthorized(self.base_uri.clone()));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

fn missing(ro: &RoUri) -> SyncError {
    SyncError::NotFound(ro.to_string())
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn resolve(&self, name_or_uri: &str) -> RoUri {
        if name_or_uri.starts_with("http://") || name_or_uri.starts_with("https://") {
            RoUri::new(name_or_uri)
        } else {
            let slug = ro_slug(name_or_uri);
            RoUri::new(format!(
                "{}{}",
                self.base_uri,
                urlencoding::encode(&slug)
            ))
        }
    }

    async fn create_ro(&self, name: &str) -> SyncResult<RoUri> {
        self.enter().await?;
        let ro = self.resolve(name);
        self.lock()
            .ros
            .entry(ro.slug().to_string())
            .or_insert_with(|| StoredRo {
                name: name.to_string(),
                ..StoredRo::default()
            });
        Ok(ro)
    }

    async fn describe(&self, ro: &RoUri) -> SyncResult<RemoteRoInfo> {
        self.enter().await?;
        let state = self.lock();
        let stored = state.ros.get(ro.slug()).ok_or_else(|| missing(ro))?;
        Ok(RemoteRoInfo {
            uri: ro.clone(),
            name: stored.name.clone(),
        })
    }

    async fn list_resources(&self, ro: &RoUri) -> SyncResult<Vec<RemoteResource>> {
        self.enter().await?;
        let state = self.lock();
        let stored = state.ros.get(ro.slug()).ok_or_else(|| missing(ro))?;
        Ok(stored
            .resources
            .iter()
            .map(|(id, (_, etag))| RemoteResource {
                id: id.clone(),
                uri: RosrsClient::resource_uri(ro, id),
                etag: Some(etag.clone()),
            })
            .collect())
    }

    async fn fetch_resource(
        &self,
        ro: &RoUri,
        resource: &RemoteResource,
    ) -> SyncResult<Vec<u8>> {
        self.enter().await?;
        self.content(ro, &resource.id)
            .ok_or_else(|| SyncError::NotFound(resource.uri.clone()))
    }

    async fn upload_resource(
        &self,
        ro: &RoUri,
        id: &ResourceId,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> SyncResult<RemoteEntry> {
        self.enter().await?;
        let mut state = self.lock();
        if state.failing_uploads.contains(id) {
            return Err(SyncError::RemoteUnavailable(format!(
                "simulated transport error uploading {}",
                id
            )));
        }
        state.calls.uploads += 1;
        state.revision += 1;
        let etag = format!("\"{}\"", state.revision);
        let stored = state.ros.get_mut(ro.slug()).ok_or_else(|| missing(ro))?;
        stored.resources.insert(id.clone(), (bytes, etag.clone()));
        Ok(RemoteEntry {
            uri: RosrsClient::resource_uri(ro, id),
            etag: Some(etag),
        })
    }

    async fn delete_resource(&self, ro: &RoUri, uri: &str) -> SyncResult<()> {
        self.enter().await?;
        let mut state = self.lock();
        state.calls.deletes += 1;
        let stored = state.ros.get_mut(ro.slug()).ok_or_else(|| missing(ro))?;
        let id = stored
            .resources
            .keys()
            .find(|id| RosrsClient::resource_uri(ro, id) == uri)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(uri.to_string()))?;
        stored.resources.remove(&id);
        Ok(())
    }

    async fn list_annotations(&self, ro: &RoUri) -> SyncResult<Vec<RemoteAnnotation>> {
        self.enter().await?;
        let state = self.lock();
        let stored = state.ros.get(ro.slug()).ok_or_else(|| missing(ro))?;
        Ok(stored
            .annotations
            .values()
            .map(|annotation| RemoteAnnotation {
                uri: RosrsClient::annotation_uri(ro, annotation),
                annotation: annotation.clone(),
            })
            .collect())
    }

    async fn push_annotation(
        &self,
        ro: &RoUri,
        annotation: &Annotation,
    ) -> SyncResult<RemoteEntry> {
        self.enter().await?;
        let mut state = self.lock();
        state.calls.annotation_pushes += 1;
        let stored = state.ros.get_mut(ro.slug()).ok_or_else(|| missing(ro))?;
        stored
            .annotations
            .insert(annotation.key(), annotation.clone());
        Ok(RemoteEntry {
            uri: RosrsClient::annotation_uri(ro, annotation),
            etag: None,
        })
    }

    async fn retract_annotation(&self, ro: &RoUri, uri: &str) -> SyncResult<()> {
        self.enter().await?;
        let mut state = self.lock();
        state.calls.retractions += 1;
        let stored = state.ros.get_mut(ro.slug()).ok_or_else(|| missing(ro))?;
        let key = stored
            .annotations
            .values()
            .find(|annotation| RosrsClient::annotation_uri(ro, annotation) == uri)
            .map(Annotation::key)
            .ok_or_else(|| SyncError::NotFound(uri.to_string()))?;
        stored.annotations.remove(&key);
        Ok(())
    }

    async fn delete_ro(&self, ro: &RoUri) -> SyncResult<()> {
        self.enter().await?;
        self.lock()
            .ros
            .remove(ro.slug())
            .map(|_| ())
            .ok_or_else(|| missing(ro))
    }
}
