//! savesync - find, snapshot and sync emulator saves from the terminal

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, QueueCommands};
use crate::commands::capture::{run_capture, CaptureOptions};
use crate::commands::common::{load_config, Runtime};
use crate::commands::completions::run_completions;
use crate::commands::discover::{run_discover, run_extract, run_prepare};
use crate::commands::evict::run_evict;
use crate::commands::queue::{
    run_queue_cancel, run_queue_cleanup, run_queue_counts, run_queue_drain, run_queue_enqueue, run_queue_list,
    run_queue_retry,
};
use crate::commands::snapshots::{run_restore, run_snapshots};
use crate::commands::status::run_status;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "savesync_core=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Completions never touch the database
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = load_config(cli.config, cli.db_path)?;
    let runtime = Runtime::open(config).await?;

    match cli.command {
        Commands::Queue { command } => match command {
            QueueCommands::Counts { json } => run_queue_counts(&runtime, json).await,
            QueueCommands::List {
                status,
                limit,
                json,
            } => run_queue_list(&runtime, status.into(), limit, json).await,
            QueueCommands::Enqueue {
                context,
                download,
                channel,
                path,
            } => run_queue_enqueue(&runtime, &context, download, channel, path).await,
            QueueCommands::Retry { id } => run_queue_retry(&runtime, id).await,
            QueueCommands::Cancel { id } => run_queue_cancel(&runtime, id).await,
            QueueCommands::Cleanup { json } => run_queue_cleanup(&runtime, json).await,
            QueueCommands::Drain { sync_type, json } => {
                run_queue_drain(&runtime, sync_type.map(Into::into), json).await
            }
        },
        Commands::Status {
            game_id,
            history,
            json,
        } => run_status(&runtime, game_id, history, json).await,
        Commands::Snapshots {
            game_id,
            states,
            json,
        } => run_snapshots(&runtime, game_id, states, json).await,
        Commands::Discover { context, json } => run_discover(&runtime, &context, json).await,
        Commands::Prepare { path, context } => run_prepare(&runtime, &path, &context).await,
        Commands::Extract { file, context } => run_extract(&runtime, &file, &context).await,
        Commands::Capture {
            game_id,
            path,
            channel,
            slot,
            emulator,
            note,
            json,
        } => {
            let options = CaptureOptions {
                channel,
                slot,
                emulator,
                note,
            };
            run_capture(&runtime, game_id, &path, options, json).await
        }
        Commands::Restore { id, dest, states } => run_restore(&runtime, id, &dest, states).await,
        Commands::Evict {
            game_id,
            count,
            states,
            json,
        } => run_evict(&runtime, game_id, count, states, json).await,
        Commands::Completions { .. } => Ok(()),
    }
}
