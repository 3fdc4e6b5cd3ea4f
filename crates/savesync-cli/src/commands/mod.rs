pub mod capture;
pub mod common;
pub mod completions;
pub mod discover;
pub mod evict;
pub mod queue;
pub mod snapshots;
pub mod status;
