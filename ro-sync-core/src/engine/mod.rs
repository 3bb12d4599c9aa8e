//! Sync engine: pushes a local RO to the remote service and checks remote
//! ROs out into fresh local directories.
//!
//! A push runs in four phases (uploads, annotation pushes, retractions,
//! deletions). Each phase dispatches at most `workers` items at a time and
//! the loop consuming the results is the only writer of the identity
//! registry. A failed item is recorded in the report and does not stop the
//! rest of the plan; only authentication failures abort.

mod plan;
mod report;

pub use plan::{SyncOp, SyncPlan};
pub use report::{CheckoutReport, ItemFailure, OpKind, PushReport};

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::pin::pin;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::local::LocalRo;
use crate::model::{Annotation, ItemKind, ResourceId};
use crate::registry::IdentityRegistry;
use crate::remote::{ro_slug, RemoteAnnotation, RemoteEntry, RemoteResource, RemoteStore, RoUri};

/// Default number of items in flight per phase.
pub const DEFAULT_WORKERS: usize = 4;

/// Default time allowed for a single item.
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub workers: usize,
    pub item_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            item_timeout: DEFAULT_ITEM_TIMEOUT,
        }
    }
}

impl SyncOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }
}

/// Runs `op` for each item unless `cancel` fired before the item was
/// dispatched, bounding each run by `timeout`. Yields the item with its
/// result so the consumer can attribute failures.
fn guarded<'a, T, O, F, Fut>(
    items: Vec<T>,
    cancel: &'a CancellationToken,
    timeout: Duration,
    op: F,
) -> impl Stream<Item = impl Future<Output = (T, SyncResult<O>)> + 'a> + 'a
where
    T: Clone + 'a,
    O: 'a,
    F: Fn(T) -> Fut + 'a,
    Fut: Future<Output = SyncResult<O>> + 'a,
{
    stream::iter(items).map(move |item| {
        let pending = (!cancel.is_cancelled()).then(|| op(item.clone()));
        async move {
            let result = match pending {
                None => Err(SyncError::Cancelled),
                Some(fut) => tokio::time::timeout(timeout, fut)
                    .await
                    .unwrap_or_else(|_| Err(SyncError::Timeout(timeout))),
            };
            (item, result)
        }
    })
}

/// Records an item failure, or returns the error if it must abort the run.
fn absorb(
    failures: &mut Vec<ItemFailure>,
    op: OpKind,
    item: String,
    error: SyncError,
) -> SyncResult<()> {
    if error.is_fatal() {
        return Err(error);
    }
    if matches!(error, SyncError::Cancelled) {
        debug!("{} of {} not dispatched", op, item);
    } else {
        warn!("{} of {} failed: {}", op, item, error);
    }
    failures.push(ItemFailure::new(op, item, error));
    Ok(())
}

/// Fallback directory name when neither the slug nor the RO name is usable.
const FALLBACK_DIR_NAME: &str = "research_object";

/// True if `name` is a single path component that stays inside its parent.
fn is_single_component(name: &str) -> bool {
    !matches!(name, "" | "." | "..") && !name.contains(['/', '\\'])
}

/// Directory name for a checkout of `ro`. Always a single component, so the
/// checkout lands directly under the base directory.
fn checkout_dir_name(ro: &RoUri, name: &str) -> String {
    let decoded = urlencoding::decode(ro.slug())
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| ro.slug().to_string());
    if is_single_component(&decoded) {
        return decoded;
    }
    let renamed = ro_slug(name).replace(['/', '\\'], "_");
    if is_single_component(&renamed) {
        renamed
    } else {
        FALLBACK_DIR_NAME.to_string()
    }
}

pub struct SyncEngine<R> {
    remote: R,
    options: SyncOptions,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(remote: R) -> Self {
        Self::with_options(remote, SyncOptions::default())
    }

    pub fn with_options(remote: R, options: SyncOptions) -> Self {
        Self { remote, options }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    fn workers(&self) -> usize {
        self.options.workers.max(1)
    }

    /// Makes the remote RO named after `local` mirror it, creating the
    /// remote RO if needed.
    ///
    /// `registry` is updated for every completed item and pruned of
    /// identifiers that exist on neither side; persisting it is up to the
    /// caller.
    pub async fn push(
        &self,
        local: &LocalRo,
        registry: &mut IdentityRegistry,
        cancel: &CancellationToken,
    ) -> SyncResult<PushReport> {
        let local_resources = local.list_resources()?;
        let mut ro = self.remote.resolve(local.name());
        let (remote_resources, remote_annotations) = match self.remote.list_resources(&ro).await
        {
            Ok(resources) => (resources, self.remote.list_annotations(&ro).await?),
            Err(e) if e.is_not_found() => {
                info!("Creating remote RO {}", ro);
                ro = self.remote.create_ro(local.name()).await?;
                (Vec::new(), Vec::new())
            }
            Err(e) => return Err(e),
        };

        let plan = SyncPlan::compute(
            &local_resources,
            local.annotations(),
            &remote_resources,
            &remote_annotations,
            registry,
        );
        for id in &plan.drifted {
            warn!("{} changed in {} since the last sync, overwriting", id, ro);
        }
        info!(
            "Pushing {} to {}: {} operation(s)",
            local.root().display(),
            ro,
            plan.len()
        );
        for op in plan.ops() {
            debug!("Planned {}", op);
        }

        let SyncPlan {
            uploads,
            annotation_pushes,
            retractions,
            deletions,
            ..
        } = plan;
        let timeout = self.options.item_timeout;
        let mut report = PushReport::new(ro.clone());

        let mut failed_uploads = HashSet::new();
        {
            let results = guarded(uploads, cancel, timeout, |id| self.upload(&ro, local, id))
                .buffer_unordered(self.workers());
            let mut results = pin!(results);
            while let Some((id, result)) = results.next().await {
                match result {
                    Ok(entry) => {
                        debug!("Uploaded {}", id);
                        registry.record(id.as_str(), ItemKind::Resource, entry.uri, entry.etag);
                        report.uploaded.push(id);
                    }
                    Err(e) => {
                        failed_uploads.insert(id.clone());
                        absorb(&mut report.failures, OpKind::Upload, id.to_string(), e)?;
                    }
                }
            }
        }

        let local_ids: HashSet<&ResourceId> = local_resources.iter().collect();
        let mut pushable = Vec::new();
        for annotation in annotation_pushes {
            let blocked = match annotation.subject.resource() {
                Some(id) if failed_uploads.contains(id) => {
                    Some(SyncError::SubjectUnavailable(id.to_string()))
                }
                Some(id) if !local_ids.contains(id) => {
                    Some(SyncError::InvalidSubject(id.to_string()))
                }
                _ => None,
            };
            match blocked {
                Some(e) => absorb(
                    &mut report.failures,
                    OpKind::PushAnnotation,
                    annotation.to_string(),
                    e,
                )?,
                None => pushable.push(annotation),
            }
        }
        {
            let results = guarded(pushable, cancel, timeout, |annotation| {
                self.push_annotation(&ro, annotation)
            })
            .buffer_unordered(self.workers());
            let mut results = pin!(results);
            while let Some((annotation, result)) = results.next().await {
                match result {
                    Ok(entry) => {
                        registry.record(
                            annotation.key(),
                            ItemKind::Annotation,
                            entry.uri,
                            entry.etag,
                        );
                        report.annotations_pushed.push(annotation);
                    }
                    Err(e) => absorb(
                        &mut report.failures,
                        OpKind::PushAnnotation,
                        annotation.to_string(),
                        e,
                    )?,
                }
            }
        }

        let mut kept_annotations: HashSet<String> =
            local.annotations().iter().map(|a| a.key()).collect();
        {
            let results = guarded(retractions, cancel, timeout, |remote| self.retract(&ro, remote))
                .buffer_unordered(self.workers());
            let mut results = pin!(results);
            while let Some((remote, result)) = results.next().await {
                let key = remote.annotation.key();
                match result {
                    Ok(()) => {
                        registry.forget(&key, ItemKind::Annotation);
                        report.annotations_retracted.push(remote.annotation);
                    }
                    Err(e) => {
                        kept_annotations.insert(key);
                        absorb(
                            &mut report.failures,
                            OpKind::RetractAnnotation,
                            remote.annotation.to_string(),
                            e,
                        )?;
                    }
                }
            }
        }

        let mut kept_resources: HashSet<String> =
            local_resources.iter().map(|id| id.to_string()).collect();
        {
            let results = guarded(deletions, cancel, timeout, |remote| self.delete(&ro, remote))
                .buffer_unordered(self.workers());
            let mut results = pin!(results);
            while let Some((remote, result)) = results.next().await {
                match result {
                    Ok(()) => {
                        registry.forget(remote.id.as_str(), ItemKind::Resource);
                        report.deleted.push(remote.id);
                    }
                    Err(e) => {
                        kept_resources.insert(remote.id.to_string());
                        absorb(&mut report.failures, OpKind::Delete, remote.id.to_string(), e)?;
                    }
                }
            }
        }

        let pruned = registry.prune(ItemKind::Resource, &kept_resources)
            + registry.prune(ItemKind::Annotation, &kept_annotations);
        if pruned > 0 {
            debug!("Pruned {} stale registry entries", pruned);
        }

        report.cancelled = cancel.is_cancelled();
        info!("Push to {} finished: {}", ro, report.summary());
        Ok(report)
    }

    /// Materializes the remote RO `name_or_uri` in a new directory under
    /// `base`, named after the RO.
    ///
    /// Fails with `AlreadyExists` if that directory is not empty, unless
    /// `overwrite` is set. The returned registry maps everything checked out
    /// and is not written to disk.
    pub async fn checkout(
        &self,
        name_or_uri: &str,
        base: &Path,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> SyncResult<CheckoutReport> {
        let ro = self.remote.resolve(name_or_uri);
        let info = self.remote.describe(&ro).await?;
        let resources = self.remote.list_resources(&ro).await?;
        let remote_annotations = self.remote.list_annotations(&ro).await?;

        let target = base.join(checkout_dir_name(&info.uri, &info.name));
        let mut local = LocalRo::create_fresh(&target, &info.name, overwrite)?;
        info!(
            "Checking out {} ({} resource(s)) into {}",
            ro,
            resources.len(),
            target.display()
        );

        let mut report = CheckoutReport::new(ro.clone(), target);
        let listed: HashSet<ResourceId> = resources.iter().map(|r| r.id.clone()).collect();
        let mut failed = HashSet::new();
        {
            let destination = &local;
            let results = guarded(resources, cancel, self.options.item_timeout, |resource| {
                self.fetch(&ro, destination, resource)
            })
            .buffered(self.workers());
            let mut results = pin!(results);
            while let Some((resource, result)) = results.next().await {
                match result {
                    Ok(()) => {
                        report.registry.record(
                            resource.id.as_str(),
                            ItemKind::Resource,
                            resource.uri,
                            resource.etag,
                        );
                        report.resources.push(resource.id);
                    }
                    Err(e) => {
                        failed.insert(resource.id.clone());
                        absorb(&mut report.failures, OpKind::Fetch, resource.id.to_string(), e)?;
                    }
                }
            }
        }

        let mut annotations = Vec::new();
        for remote in remote_annotations {
            let blocked = match remote.annotation.subject.resource() {
                Some(id) if failed.contains(id) => {
                    Some(SyncError::SubjectUnavailable(id.to_string()))
                }
                Some(id) if !listed.contains(id) => {
                    Some(SyncError::InvalidSubject(id.to_string()))
                }
                _ => None,
            };
            match blocked {
                Some(e) => absorb(
                    &mut report.failures,
                    OpKind::Fetch,
                    remote.annotation.to_string(),
                    e,
                )?,
                None => {
                    report.registry.record(
                        remote.annotation.key(),
                        ItemKind::Annotation,
                        remote.uri,
                        None,
                    );
                    annotations.push(remote.annotation);
                }
            }
        }
        report.annotations = annotations.len();
        local.replace_annotations(annotations)?;

        report.cancelled = cancel.is_cancelled();
        info!(
            "Checked out {} resource(s) and {} annotation(s) from {}",
            report.resources.len(),
            report.annotations,
            ro
        );
        Ok(report)
    }

    async fn upload(&self, ro: &RoUri, local: &LocalRo, id: ResourceId) -> SyncResult<RemoteEntry> {
        let bytes = local.read_resource(&id)?;
        let content_type = mime_guess::from_path(id.as_str()).first_or_octet_stream();
        self.remote
            .upload_resource(ro, &id, bytes, content_type.as_ref())
            .await
    }

    async fn push_annotation(&self, ro: &RoUri, annotation: Annotation) -> SyncResult<RemoteEntry> {
        self.remote.push_annotation(ro, &annotation).await
    }

    async fn fetch(&self, ro: &RoUri, local: &LocalRo, resource: RemoteResource) -> SyncResult<()> {
        let bytes = self.remote.fetch_resource(ro, &resource).await?;
        local.materialize(&resource.id, &bytes)
    }

    async fn retract(&self, ro: &RoUri, remote: RemoteAnnotation) -> SyncResult<()> {
        match self.remote.retract_annotation(ro, &remote.uri).await {
            Err(e) if e.is_not_found() => {
                debug!("{} already retracted", remote.uri);
                Ok(())
            }
            other => other,
        }
    }

    async fn delete(&self, ro: &RoUri, remote: RemoteResource) -> SyncResult<()> {
        match self.remote.delete_resource(ro, &remote.uri).await {
            Err(e) if e.is_not_found() => {
                debug!("{} already deleted", remote.uri);
                Ok(())
            }
            other => other,
        }
    }
}
