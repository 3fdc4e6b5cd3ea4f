use std::path::Path;

use serde::Serialize;
use savesync_core::handlers::{PlatformHandler, SaveHandler};
use tracing::debug;

use crate::cli::ContextArgs;
use crate::commands::common::{print_json, Runtime};
use crate::error::CliError;

#[derive(Serialize)]
struct DiscoverReport<'a> {
    platform: &'a str,
    emulator: &'a str,
    path: String,
    is_directory: bool,
}

fn describe(args: &ContextArgs) -> String {
    args.title.as_ref().map_or_else(
        || format!("{} on {}", args.platform, args.emulator),
        |title| format!("{title} ({} on {})", args.platform, args.emulator),
    )
}

pub async fn run_discover(runtime: &Runtime, args: &ContextArgs, as_json: bool) -> Result<(), CliError> {
    let context = args.to_context();
    let handler = PlatformHandler::for_platform(&args.platform, runtime.env.clone());
    let Some(path) = handler.discover(&context).await else {
        return Err(CliError::SaveNotFound(describe(args)));
    };
    debug!(path = %path.display(), "Discovered save");

    if as_json {
        return print_json(&DiscoverReport {
            platform: &args.platform,
            emulator: &args.emulator,
            is_directory: runtime.env.fs.is_directory(&path),
            path: path.display().to_string(),
        });
    }
    println!("{}", path.display());
    Ok(())
}

pub async fn run_prepare(runtime: &Runtime, path: &Path, args: &ContextArgs) -> Result<(), CliError> {
    let context = args.to_context();
    let handler = PlatformHandler::for_platform(&args.platform, runtime.env.clone());
    let Some(prepared) = handler.prepare_for_upload(path, &context).await else {
        return Err(CliError::SaveNotFound(path.display().to_string()));
    };

    println!("{}", prepared.file.display());
    if prepared.is_temporary {
        eprintln!("(temporary bundle of {} path(s))", prepared.original_paths.len());
    }
    Ok(())
}

pub async fn run_extract(runtime: &Runtime, file: &Path, args: &ContextArgs) -> Result<(), CliError> {
    if !file.is_file() {
        return Err(CliError::SaveNotFound(file.display().to_string()));
    }
    let context = args.to_context();
    let handler = PlatformHandler::for_platform(&args.platform, runtime.env.clone());
    let result = handler.extract_download(file, &context).await;

    match (result.success, result.target_path) {
        (true, Some(target)) => {
            println!("{}", target.display());
            Ok(())
        }
        _ => Err(CliError::ExtractFailed(
            result.error.unwrap_or_else(|| "no target path".to_string()),
        )),
    }
}
