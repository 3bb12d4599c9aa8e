//! Research Object data model: resource identifiers, annotation subjects and annotations.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{SyncError, SyncResult};

/// Name of the per-RO metadata directory. Nothing below it is an aggregated resource.
pub const METADATA_DIR: &str = ".ro";

/// String form of the RO itself when used as an annotation subject.
pub const RO_SUBJECT: &str = ".";

/// Identifier of an aggregated resource: a case-sensitive relative path
/// using `/` as separator on every platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Validates and wraps an identifier.
    pub fn new(id: impl Into<String>) -> SyncResult<Self> {
        let id = id.into();
        if let Some(reason) = Self::invalid_reason(&id) {
            return Err(SyncError::InvalidIdentifier { id, reason });
        }
        Ok(Self(id))
    }

    fn invalid_reason(id: &str) -> Option<&'static str> {
        if id.is_empty() {
            return Some("identifier is empty");
        }
        if id.starts_with('/') {
            return Some("identifier must be relative");
        }
        if id.contains('\\') {
            return Some("identifier must use '/' separators");
        }
        let mut segments = id.split('/');
        if segments.clone().next() == Some(METADATA_DIR) {
            return Some("identifier is inside the reserved metadata directory");
        }
        if segments.any(|s| s.is_empty() || s == "." || s == "..") {
            return Some("identifier contains an empty, '.' or '..' segment");
        }
        None
    }

    /// Builds an identifier from a path relative to the RO root.
    pub fn from_relative_path(path: &Path) -> SyncResult<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(segment) => match segment.to_str() {
                    Some(s) => segments.push(s),
                    None => {
                        return Err(SyncError::InvalidIdentifier {
                            id: path.to_string_lossy().into_owned(),
                            reason: "path is not valid UTF-8",
                        })
                    }
                },
                _ => {
                    return Err(SyncError::InvalidIdentifier {
                        id: path.to_string_lossy().into_owned(),
                        reason: "identifier must be relative",
                    })
                }
            }
        }
        Self::new(segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Platform path of the resource relative to the RO root.
    pub fn to_relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl TryFrom<String> for ResourceId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an annotation is about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Subject {
    /// The Research Object as a whole.
    Ro,
    /// A single aggregated resource.
    Resource(ResourceId),
}

impl Subject {
    /// Parses `"."` as the RO and anything else as a resource identifier.
    pub fn parse(s: &str) -> SyncResult<Self> {
        if s == RO_SUBJECT {
            Ok(Subject::Ro)
        } else {
            ResourceId::new(s).map(Subject::Resource)
        }
    }

    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Subject::Ro => None,
            Subject::Resource(id) => Some(id),
        }
    }
}

impl TryFrom<String> for Subject {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        match subject {
            Subject::Ro => RO_SUBJECT.to_string(),
            Subject::Resource(id) => id.into(),
        }
    }
}

impl From<ResourceId> for Subject {
    fn from(id: ResourceId) -> Self {
        Subject::Resource(id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Ro => f.write_str(RO_SUBJECT),
            Subject::Resource(id) => id.fmt(f),
        }
    }
}

/// A metadata statement `(subject, property, value)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Annotation {
    pub subject: Subject,
    pub property: String,
    pub value: String,
}

impl Annotation {
    pub fn new(subject: Subject, property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            subject,
            property: property.into(),
            value: value.into(),
        }
    }

    /// Stable identifier of the annotation, used for registry entries and remote URIs.
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.subject.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(self.property.as_bytes());
        hasher.update([0]);
        hasher.update(self.value.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.subject, self.property)
    }
}

/// Kind of item tracked by the identity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Resource,
    Annotation,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Resource => write!(f, "resource"),
            ItemKind::Annotation => write!(f, "annotation"),
        }
    }
}
