use serde::Serialize;
use savesync_core::models::{SyncStatusChange, SyncStatusRecord};

use crate::commands::common::{format_history_lines, format_status_lines, print_json, Runtime};
use crate::error::CliError;

const HISTORY_LIMIT: usize = 20;

#[derive(Serialize)]
struct StatusReport {
    game_id: i64,
    lineages: Vec<SyncStatusRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<Vec<SyncStatusChange>>,
}

pub async fn run_status(
    runtime: &Runtime,
    game_id: i64,
    with_history: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let lineages = runtime.resolver.status_for_game(game_id).await?;
    let history = if with_history {
        Some(runtime.resolver.history(game_id, HISTORY_LIMIT).await?)
    } else {
        None
    };

    if as_json {
        return print_json(&StatusReport {
            game_id,
            lineages,
            history,
        });
    }

    if lineages.is_empty() {
        println!("No sync status recorded for game {game_id}");
    }
    for line in format_status_lines(&lineages) {
        println!("{line}");
    }
    if let Some(history) = history {
        if !history.is_empty() {
            println!();
            println!("History:");
            for line in format_history_lines(&history) {
                println!("  {line}");
            }
        }
    }
    Ok(())
}
