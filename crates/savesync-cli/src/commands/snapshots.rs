use std::path::Path;

use savesync_core::models::SnapshotKind;
use tracing::info;

use crate::commands::common::{format_snapshot_lines, print_json, Runtime};
use crate::error::CliError;

pub const fn snapshot_kind(states: bool) -> SnapshotKind {
    if states {
        SnapshotKind::State
    } else {
        SnapshotKind::Save
    }
}

pub async fn run_snapshots(
    runtime: &Runtime,
    game_id: i64,
    states: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let entries = runtime.cache.list(snapshot_kind(states), game_id).await?;

    if as_json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No snapshots cached for game {game_id}");
    }
    for line in format_snapshot_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_restore(runtime: &Runtime, id: i64, dest: &Path, states: bool) -> Result<(), CliError> {
    let kind = snapshot_kind(states);
    if runtime.cache.get(kind, id).await?.is_none() {
        return Err(CliError::SnapshotNotFound(id));
    }

    let entry = runtime.cache.restore(kind, id, dest).await?;
    info!(id, game_id = entry.game_id, dest = %dest.display(), "Restored snapshot");
    println!("Restored snapshot {id} to {}", dest.display());
    Ok(())
}
