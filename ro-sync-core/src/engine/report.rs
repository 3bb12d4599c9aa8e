//! Results of push and checkout operations.

use std::fmt;
use std::path::PathBuf;

use crate::error::{SyncError, SyncResult};
use crate::model::{Annotation, ResourceId};
use crate::registry::IdentityRegistry;
use crate::remote::RoUri;

/// Kind of plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Upload,
    Delete,
    PushAnnotation,
    RetractAnnotation,
    Fetch,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Upload => write!(f, "upload"),
            OpKind::Delete => write!(f, "delete"),
            OpKind::PushAnnotation => write!(f, "annotation push"),
            OpKind::RetractAnnotation => write!(f, "annotation retraction"),
            OpKind::Fetch => write!(f, "fetch"),
        }
    }
}

/// A plan item that did not complete.
#[derive(Debug)]
pub struct ItemFailure {
    pub op: OpKind,
    pub item: String,
    pub error: SyncError,
}

impl ItemFailure {
    pub fn new(op: OpKind, item: impl Into<String>, error: SyncError) -> Self {
        Self {
            op,
            item: item.into(),
            error,
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} failed: {}", self.op, self.item, self.error)
    }
}

fn check_failures(failures: &[ItemFailure], succeeded: usize) -> SyncResult<()> {
    if failures.is_empty() {
        return Ok(());
    }
    Err(SyncError::PartialSync {
        failed: failures.len(),
        total: failures.len() + succeeded,
    })
}

/// Outcome of a push.
#[derive(Debug)]
pub struct PushReport {
    pub ro: RoUri,
    pub uploaded: Vec<ResourceId>,
    pub deleted: Vec<ResourceId>,
    pub annotations_pushed: Vec<Annotation>,
    pub annotations_retracted: Vec<Annotation>,
    pub failures: Vec<ItemFailure>,
    /// True if the push was cancelled before every item was dispatched.
    pub cancelled: bool,
}

impl PushReport {
    pub fn new(ro: RoUri) -> Self {
        Self {
            ro,
            uploaded: Vec::new(),
            deleted: Vec::new(),
            annotations_pushed: Vec::new(),
            annotations_retracted: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.uploaded.len()
            + self.deleted.len()
            + self.annotations_pushed.len()
            + self.annotations_retracted.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Err(PartialSync)` if any item failed or was cancelled.
    pub fn check(&self) -> SyncResult<()> {
        check_failures(&self.failures, self.succeeded())
    }

    pub fn into_result(self) -> SyncResult<Self> {
        self.check().map(|()| self)
    }

    pub fn summary(&self) -> String {
        format!(
            "uploaded: {}, deleted: {}, annotations pushed: {}, annotations retracted: {}",
            self.uploaded.len(),
            self.deleted.len(),
            self.annotations_pushed.len(),
            self.annotations_retracted.len()
        )
    }
}

/// Outcome of a checkout.
#[derive(Debug)]
pub struct CheckoutReport {
    pub ro: RoUri,
    /// Local root the RO was written to.
    pub root: PathBuf,
    /// Checked-out resources, in remote listing order.
    pub resources: Vec<ResourceId>,
    pub annotations: usize,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
    /// Identity mapping for everything checked out.
    pub registry: IdentityRegistry,
}

impl CheckoutReport {
    pub fn new(ro: RoUri, root: PathBuf) -> Self {
        Self {
            ro,
            root,
            resources: Vec::new(),
            annotations: 0,
            failures: Vec::new(),
            cancelled: false,
            registry: IdentityRegistry::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn check(&self) -> SyncResult<()> {
        check_failures(&self.failures, self.resources.len() + self.annotations)
    }

    pub fn into_result(self) -> SyncResult<Self> {
        self.check().map(|()| self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_format() {
        let mut report = PushReport::new(RoUri::new("http://x/ROs/r/"));
        report.uploaded.push(ResourceId::new("a.txt").unwrap());
        assert_eq!(
            report.summary(),
            "uploaded: 1, deleted: 0, annotations pushed: 0, annotations retracted: 0"
        );
        assert!(report.check().is_ok());
    }

    #[test]
    fn test_check_counts_failures() {
        let mut report = PushReport::new(RoUri::new("http://x/ROs/r/"));
        report.uploaded.push(ResourceId::new("a.txt").unwrap());
        report.failures.push(ItemFailure::new(
            OpKind::Upload,
            "b.txt",
            SyncError::RemoteUnavailable("refused".into()),
        ));
        match report.check() {
            Err(SyncError::PartialSync { failed, total }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failure_display() {
        let failure = ItemFailure::new(OpKind::Fetch, "a.txt", SyncError::Cancelled);
        assert_eq!(failure.to_string(), "fetch of a.txt failed: Sync cancelled");
    }
}
