//! brief-core - Core library for Brief
//!
//! This crate contains the history models, the offline mutation queue, the
//! conflict resolver, credential coordination and the sync state machine
//! shared by every Brief client.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod models;
pub mod monitor;
pub mod queue;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{PendingEntry, Record, RecordId, RemoteRecord};
pub use sync::{SyncCoordinator, SyncState};
