//! rosync: a small Research Object repository.
//!
//! Serves the RO collection interface used by the `ro` client, keeping
//! every RO in memory.

pub mod server;

pub use server::{router, AppState, ServerConfig, TokenStore};
