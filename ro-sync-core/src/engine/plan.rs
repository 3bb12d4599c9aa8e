//! Push planning: what has to change remotely for it to mirror the local RO.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::report::OpKind;
use crate::model::{Annotation, ItemKind, ResourceId};
use crate::registry::IdentityRegistry;
use crate::remote::{RemoteAnnotation, RemoteResource};

/// A single remote mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOp {
    Upload(ResourceId),
    PushAnnotation(Annotation),
    RetractAnnotation(RemoteAnnotation),
    Delete(RemoteResource),
}

impl SyncOp {
    pub fn kind(&self) -> OpKind {
        match self {
            SyncOp::Upload(_) => OpKind::Upload,
            SyncOp::PushAnnotation(_) => OpKind::PushAnnotation,
            SyncOp::RetractAnnotation(_) => OpKind::RetractAnnotation,
            SyncOp::Delete(_) => OpKind::Delete,
        }
    }
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOp::Upload(id) => write!(f, "{} {}", self.kind(), id),
            SyncOp::PushAnnotation(ann) => write!(f, "{} {}", self.kind(), ann),
            SyncOp::RetractAnnotation(remote) => {
                write!(f, "{} {}", self.kind(), remote.annotation)
            }
            SyncOp::Delete(remote) => write!(f, "{} {}", self.kind(), remote.id),
        }
    }
}

/// Operations for one push, grouped by phase.
///
/// Phases run in field order. Every local resource is uploaded since local
/// modification times are not tracked; deletions only target identifiers
/// missing from the local listing.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub uploads: Vec<ResourceId>,
    pub annotation_pushes: Vec<Annotation>,
    pub retractions: Vec<RemoteAnnotation>,
    pub deletions: Vec<RemoteResource>,
    /// Resources whose remote state token no longer matches the registry.
    pub drifted: Vec<ResourceId>,
}

impl SyncPlan {
    pub fn compute(
        local_resources: &[ResourceId],
        local_annotations: &BTreeSet<Annotation>,
        remote_resources: &[RemoteResource],
        remote_annotations: &[RemoteAnnotation],
        registry: &IdentityRegistry,
    ) -> Self {
        let local: HashSet<&ResourceId> = local_resources.iter().collect();

        let mut deletions = Vec::new();
        let mut drifted = Vec::new();
        for remote in remote_resources {
            if !local.contains(&remote.id) {
                deletions.push(remote.clone());
                continue;
            }
            let recorded = registry
                .lookup(remote.id.as_str(), ItemKind::Resource)
                .and_then(|entry| entry.marker.as_ref());
            if let (Some(recorded), Some(current)) = (recorded, remote.etag.as_ref()) {
                if recorded != current {
                    drifted.push(remote.id.clone());
                }
            }
        }

        let mut seen = HashSet::new();
        let retractions = remote_annotations
            .iter()
            .filter(|remote| !local_annotations.contains(&remote.annotation))
            .filter(|remote| seen.insert(remote.uri.clone()))
            .cloned()
            .collect();

        Self {
            uploads: local_resources.to_vec(),
            annotation_pushes: local_annotations.iter().cloned().collect(),
            retractions,
            deletions,
            drifted,
        }
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
            + self.annotation_pushes.len()
            + self.retractions.len()
            + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All operations in execution order.
    pub fn ops(&self) -> Vec<SyncOp> {
        let uploads = self.uploads.iter().cloned().map(SyncOp::Upload);
        let pushes = self
            .annotation_pushes
            .iter()
            .cloned()
            .map(SyncOp::PushAnnotation);
        let retractions = self
            .retractions
            .iter()
            .cloned()
            .map(SyncOp::RetractAnnotation);
        let deletions = self.deletions.iter().cloned().map(SyncOp::Delete);
        uploads
            .chain(pushes)
            .chain(retractions)
            .chain(deletions)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subject;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn remote(s: &str, etag: &str) -> RemoteResource {
        RemoteResource {
            id: id(s),
            uri: format!("http://x/ROs/r/{}", s),
            etag: Some(etag.to_string()),
        }
    }

    #[test]
    fn test_empty_remote_uploads_everything() {
        let local = vec![id("a.txt"), id("subdir/b.txt")];
        let mut annotations = BTreeSet::new();
        annotations.insert(Annotation::new(Subject::Ro, "title", "T"));

        let plan = SyncPlan::compute(&local, &annotations, &[], &[], &IdentityRegistry::new());

        assert_eq!(plan.uploads, local);
        assert_eq!(plan.annotation_pushes.len(), 1);
        assert!(plan.deletions.is_empty());
        assert!(plan.retractions.is_empty());
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_remote_only_resources_are_deleted() {
        let local = vec![id("a.txt")];
        let remote = vec![remote("a.txt", "\"1\""), remote("old.txt", "\"2\"")];

        let plan = SyncPlan::compute(
            &local,
            &BTreeSet::new(),
            &remote,
            &[],
            &IdentityRegistry::new(),
        );

        assert_eq!(plan.deletions.len(), 1);
        assert_eq!(plan.deletions[0].id, id("old.txt"));
    }

    #[test]
    fn test_stale_annotations_are_retracted() {
        let kept = Annotation::new(Subject::Ro, "title", "T");
        let stale = Annotation::new(Subject::Ro, "title", "Old");
        let local: BTreeSet<_> = [kept.clone()].into_iter().collect();
        let remote = vec![
            RemoteAnnotation {
                uri: "http://x/ROs/r/.ro/annotations/1".into(),
                annotation: kept,
            },
            RemoteAnnotation {
                uri: "http://x/ROs/r/.ro/annotations/2".into(),
                annotation: stale.clone(),
            },
        ];

        let plan = SyncPlan::compute(&[], &local, &[], &remote, &IdentityRegistry::new());

        assert_eq!(plan.retractions.len(), 1);
        assert_eq!(plan.retractions[0].annotation, stale);
    }

    #[test]
    fn test_drift_detected_from_registry_marker() {
        let mut registry = IdentityRegistry::new();
        registry.record(
            "a.txt",
            ItemKind::Resource,
            "http://x/ROs/r/a.txt",
            Some("\"1\"".into()),
        );
        registry.record(
            "b.txt",
            ItemKind::Resource,
            "http://x/ROs/r/b.txt",
            Some("\"2\"".into()),
        );
        let local = vec![id("a.txt"), id("b.txt")];
        let remote = vec![remote("a.txt", "\"1\""), remote("b.txt", "\"7\"")];

        let plan = SyncPlan::compute(&local, &BTreeSet::new(), &remote, &[], &registry);

        assert_eq!(plan.drifted, vec![id("b.txt")]);
    }

    #[test]
    fn test_ops_follow_phase_order() {
        let plan = SyncPlan {
            uploads: vec![id("a.txt")],
            annotation_pushes: vec![Annotation::new(Subject::Ro, "title", "T")],
            deletions: vec![remote("old.txt", "\"1\"")],
            ..SyncPlan::default()
        };

        let kinds: Vec<OpKind> = plan.ops().iter().map(SyncOp::kind).collect();
        assert_eq!(
            kinds,
            vec![OpKind::Upload, OpKind::PushAnnotation, OpKind::Delete]
        );
        assert_eq!(plan.ops()[0].to_string(), "upload a.txt");
    }
}
