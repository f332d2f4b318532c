//! wakeel-core - Core library for Wakeel
//!
//! This crate contains the entity models, the durable local store, and
//! the offline-first sync engine that reconciles the store with a hosted
//! backend (relational tables plus object storage for case documents).

pub mod config;
pub mod error;
pub mod mapper;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use config::RemoteConfig;
pub use error::{Error, Result};
pub use models::{Entity, EntityKind, LocalRecord};
pub use remote::{HttpRemote, MemoryRemote, RemoteAdapter};
pub use store::LocalStore;
pub use sync::{DocumentReport, SyncEngine, SyncReport, SyncState};
