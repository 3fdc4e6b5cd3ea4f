use std::path::Path;

use savesync_core::cache::CaptureRequest;
use savesync_core::models::CaptureOutcome;

use crate::commands::common::{format_snapshot_lines, print_json, Runtime};
use crate::error::CliError;

/// Options for `savesync capture`
#[derive(Debug, Default)]
pub struct CaptureOptions {
    pub channel: Option<String>,
    pub slot: Option<i32>,
    pub emulator: Option<String>,
    pub note: Option<String>,
}

pub fn build_request(game_id: i64, options: CaptureOptions) -> CaptureRequest {
    let mut request = options
        .slot
        .map_or_else(|| CaptureRequest::save(game_id), |slot| CaptureRequest::state(game_id, slot))
        .with_channel(options.channel);
    if let Some(emulator) = options.emulator {
        request = request.with_emulator(emulator);
    }
    if let Some(note) = options.note {
        request = request.with_note(note);
    }
    request
}

pub async fn run_capture(
    runtime: &Runtime,
    game_id: i64,
    path: &Path,
    options: CaptureOptions,
    as_json: bool,
) -> Result<(), CliError> {
    let outcome = runtime
        .cache
        .capture(path, build_request(game_id, options))
        .await?;

    if as_json {
        return print_json(&outcome);
    }
    match outcome {
        CaptureOutcome::Stored { entry, evicted } => {
            for line in format_snapshot_lines(std::slice::from_ref(&entry)) {
                println!("{line}");
            }
            if evicted > 0 {
                println!("Evicted {evicted} older snapshot(s)");
            }
        }
        CaptureOutcome::Duplicate { existing_id } => {
            println!("Unchanged, already cached as snapshot {existing_id}");
        }
    }
    Ok(())
}
