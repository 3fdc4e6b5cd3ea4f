use serde::Serialize;

use crate::commands::common::{format_snapshot_lines, print_json, Runtime};
use crate::commands::snapshots::snapshot_kind;
use crate::error::CliError;

#[derive(Serialize)]
struct EvictReport {
    game_id: i64,
    requested: usize,
    evicted: Vec<i64>,
}

pub async fn run_evict(
    runtime: &Runtime,
    game_id: i64,
    count: usize,
    states: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let evicted = runtime
        .cache
        .evict(snapshot_kind(states), game_id, count)
        .await?;

    if as_json {
        return print_json(&EvictReport {
            game_id,
            requested: count,
            evicted: evicted.iter().map(|entry| entry.id).collect(),
        });
    }
    println!("Evicted {} of {count} requested", evicted.len());
    for line in format_snapshot_lines(&evicted) {
        println!("  {line}");
    }
    Ok(())
}
