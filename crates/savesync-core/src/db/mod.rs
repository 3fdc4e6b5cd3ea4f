//! Database layer for savesync

mod connection;
mod migrations;
mod queue_repository;
mod snapshot_repository;
mod sync_status_repository;

pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use snapshot_repository::{LibSqlSnapshotRepository, SnapshotRepository};
pub use sync_status_repository::{LibSqlSyncStatusRepository, SyncStatusRepository};
