//! RO Sync Core Library
//!
//! Local Research Object storage, a remote RO client and the engine that
//! keeps the two in step.

pub mod engine;
pub mod error;
pub mod local;
pub mod model;
pub mod registry;
pub mod remote;

pub use engine::{
    CheckoutReport, ItemFailure, OpKind, PushReport, SyncEngine, SyncOp, SyncOptions, SyncPlan,
};
pub use error::{SyncError, SyncResult};
pub use local::{LocalRo, Manifest};
pub use model::{Annotation, ItemKind, ResourceId, Subject};
pub use registry::{IdentityRegistry, RegistryEntry};
pub use remote::{
    ClientConfig, MemoryRemote, RemoteStore, RoDocument, RoUri, RosrsClient,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
