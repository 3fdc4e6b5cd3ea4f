use std::path::PathBuf;

use savesync_core::models::{QueueStatus, SaveFilePayload, SyncDirection, SyncType};
use tracing::info;

use crate::cli::ContextArgs;
use crate::commands::common::{format_queue_lines, print_json, Runtime};
use crate::error::CliError;

pub async fn run_queue_counts(runtime: &Runtime, as_json: bool) -> Result<(), CliError> {
    let counts = runtime.queue.counts().await?;
    if as_json {
        return print_json(&counts);
    }
    println!("pending      {}", counts.pending);
    println!("in progress  {}", counts.in_progress);
    println!("completed    {}", counts.completed);
    println!("failed       {} ({} retryable)", counts.failed, counts.retryable);
    println!(
        "waiting      {} save file(s), {} save state(s)",
        counts.pending_save_files, counts.pending_save_states
    );
    Ok(())
}

pub async fn run_queue_list(
    runtime: &Runtime,
    status: QueueStatus,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let entries = runtime.queue.list(status, limit).await?;
    if as_json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No {} entries", status.as_str().to_lowercase());
    }
    for line in format_queue_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

/// Payload for `savesync queue enqueue`
pub fn build_payload(
    args: &ContextArgs,
    download: bool,
    channel: Option<String>,
    path: Option<PathBuf>,
) -> SaveFilePayload {
    SaveFilePayload {
        emulator_id: args.emulator.clone(),
        platform_slug: args.platform.clone(),
        channel_name: channel,
        direction: if download {
            SyncDirection::Download
        } else {
            SyncDirection::Upload
        },
        rom_path: args.rom.as_ref().map(|rom| rom.display().to_string()),
        title_id: args.title_id.clone(),
        emulator_package: args.package.clone(),
        game_title: args.title.clone(),
        local_save_path: path.map(|path| path.display().to_string()),
        ..SaveFilePayload::default()
    }
}

pub async fn run_queue_enqueue(
    runtime: &Runtime,
    args: &ContextArgs,
    download: bool,
    channel: Option<String>,
    path: Option<PathBuf>,
) -> Result<(), CliError> {
    let payload = build_payload(args, download, channel, path);
    let entry = runtime
        .queue
        .enqueue_save_file(args.game_id, &payload)
        .await?;
    info!(id = entry.id, game_id = entry.game_id, "Queued save-file sync");
    println!("Queued entry {}", entry.id);
    Ok(())
}

pub async fn run_queue_retry(runtime: &Runtime, id: Option<i64>) -> Result<(), CliError> {
    match id {
        Some(id) => {
            let entry = runtime.queue.retry(id).await?;
            println!(
                "Entry {} queued again ({}/{} retries used)",
                entry.id, entry.retry_count, entry.max_retries
            );
        }
        None => {
            let count = runtime.queue.retry_all().await?;
            println!("Queued {count} failed entr{} again", if count == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}

pub async fn run_queue_cancel(runtime: &Runtime, id: i64) -> Result<(), CliError> {
    if !runtime.queue.cancel(id).await? {
        return Err(savesync_core::Error::NotFound(format!("queue entry {id}")).into());
    }
    println!("Cancelled entry {id}");
    Ok(())
}

pub async fn run_queue_cleanup(runtime: &Runtime, as_json: bool) -> Result<(), CliError> {
    let report = runtime.queue.cleanup().await?;
    if as_json {
        return print_json(&report);
    }
    println!(
        "Removed {} completed and {} exhausted entries",
        report.completed, report.exhausted
    );
    Ok(())
}

pub async fn run_queue_drain(
    runtime: &Runtime,
    sync_type: Option<SyncType>,
    as_json: bool,
) -> Result<(), CliError> {
    runtime.queue.recover_interrupted().await?;

    let worker = runtime.worker();
    let reports = match sync_type {
        Some(sync_type) => vec![worker.drain(sync_type).await?],
        None => worker.drain_all().await?,
    };

    if as_json {
        return print_json(&reports);
    }
    for report in &reports {
        println!(
            "{:<10}  {} completed, {} failed, {} exhausted",
            report.sync_type.as_str(),
            report.completed,
            report.failed,
            report.exhausted
        );
    }
    Ok(())
}
