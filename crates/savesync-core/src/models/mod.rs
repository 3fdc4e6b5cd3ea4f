//! Data models for savesync

mod queue;
mod save;
mod snapshot;
mod sync_status;

pub use queue::{
    QueueStatus, SaveFilePayload, SaveStatePayload, SyncDirection, SyncPriority, SyncQueueEntry,
    SyncType,
};
pub use save::{ExtractResult, PreparedSave, SaveContext};
pub use snapshot::{CaptureOutcome, SnapshotEntry, SnapshotKind};
pub use sync_status::{ConflictResolution, SyncStatus, SyncStatusChange, SyncStatusRecord};
