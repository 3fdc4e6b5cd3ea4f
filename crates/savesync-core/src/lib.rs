//! savesync-core - save discovery, snapshot caching and sync
//!
//! This crate holds the per-console path resolvers and save handlers, the
//! content-addressed snapshot cache, the retryable sync queue and the
//! conflict resolver used by every savesync front-end.

pub mod archive;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod fs;
pub mod handlers;
pub mod models;
pub mod paths;
pub mod queue;
pub mod remote;
pub mod services;
pub mod util;

pub use error::{Error, Result};
pub use models::{SnapshotEntry, SnapshotKind, SyncQueueEntry, SyncStatus, SyncStatusRecord};
