use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use savesync_core::cache::SnapshotCache;
use savesync_core::clock::{Clock, SystemClock};
use savesync_core::config::EngineConfig;
use savesync_core::conflict::ConflictResolver;
use savesync_core::handlers::HandlerEnv;
use savesync_core::models::{SnapshotEntry, SyncQueueEntry, SyncStatusChange, SyncStatusRecord};
use savesync_core::queue::{SaveSyncProcessor, SyncQueue, SyncWorker};
use savesync_core::remote::DirectoryRemote;
use savesync_core::services::DatabaseService;

use crate::error::CliError;

pub const CONFIG_ENV: &str = "SAVESYNC_CONFIG";

/// Every engine component, built once per invocation
pub struct Runtime {
    pub config: EngineConfig,
    pub db: DatabaseService,
    pub env: HandlerEnv,
    pub clock: Arc<dyn Clock>,
    pub cache: SnapshotCache,
    pub resolver: ConflictResolver,
    pub queue: SyncQueue,
}

impl Runtime {
    pub async fn open(config: EngineConfig) -> Result<Self, CliError> {
        let db = DatabaseService::open_path(&config.database_path).await?;
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: EngineConfig, db: DatabaseService) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let env = config.handler_env();
        let cache = SnapshotCache::new(
            db.clone(),
            env.clone(),
            clock.clone(),
            config.cache_dir.clone(),
            config.snapshot_cap,
        );
        let resolver = ConflictResolver::new(db.clone(), env.clone(), clock.clone());
        let queue = SyncQueue::new(db.clone(), clock.clone(), config.max_retries);
        Self {
            config,
            db,
            env,
            clock,
            cache,
            resolver,
            queue,
        }
    }

    /// Queue worker backed by the configured remote directory
    pub fn worker(&self) -> SyncWorker<SaveSyncProcessor<DirectoryRemote>> {
        let remote = DirectoryRemote::new(self.config.remote_dir.clone(), self.clock.clone());
        let processor = SaveSyncProcessor::new(
            self.env.clone(),
            remote,
            self.cache.clone(),
            self.resolver.clone(),
        );
        SyncWorker::new(self.db.clone(), self.clock.clone(), processor)
    }
}

/// `--config`, then `$SAVESYNC_CONFIG`, then the per-user config dir
pub fn resolve_config_path(
    cli_config: Option<PathBuf>,
    env_config: Option<PathBuf>,
    default_config: Option<PathBuf>,
) -> Option<PathBuf> {
    cli_config.or(env_config).or(default_config)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("savesync").join("config.json"))
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("savesync")
}

/// Load the engine config the CLI should run with
pub fn load_config(cli_config: Option<PathBuf>, db_path: Option<PathBuf>) -> Result<EngineConfig, CliError> {
    let explicit = cli_config.is_some();
    let path = resolve_config_path(
        cli_config,
        env::var_os(CONFIG_ENV).map(PathBuf::from),
        default_config_path(),
    );

    let mut config = match path {
        Some(path) if path.exists() => EngineConfig::load(&path)?,
        Some(path) if explicit => {
            return Err(CliError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        _ => EngineConfig::with_data_dir(default_data_dir()),
    };
    if let Some(db_path) = db_path {
        config.database_path = db_path;
    }
    Ok(config)
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_size(bytes: i64) -> String {
    const KIB: i64 = 1024;
    const MIB: i64 = 1024 * KIB;
    if bytes >= MIB {
        format!("{}.{} MiB", bytes / MIB, (bytes % MIB) * 10 / MIB)
    } else if bytes >= KIB {
        format!("{}.{} KiB", bytes / KIB, (bytes % KIB) * 10 / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn channel_label(channel: Option<&str>) -> &str {
    channel.unwrap_or("default")
}

pub fn format_snapshot_lines(entries: &[SnapshotEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "{:>5}  {}  {:<10}  {:>10}  {}",
                entry.id,
                format_timestamp(entry.captured_at),
                channel_label(entry.channel_name.as_deref()),
                format_size(entry.size_bytes),
                &entry.content_hash[..entry.content_hash.len().min(12)],
            );
            if let Some(slot) = entry.slot_number {
                line.push_str(&format!("  slot {slot}"));
            }
            if entry.is_locked {
                line.push_str("  [locked]");
            }
            if let Some(note) = &entry.note {
                line.push_str(&format!("  \"{note}\""));
            }
            line
        })
        .collect()
}

pub fn format_queue_lines(entries: &[SyncQueueEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "{:>5}  game {:<6}  {:<10}  {:<11}  p{}  {}/{}",
                entry.id,
                entry.game_id,
                entry.sync_type.as_str(),
                entry.status.as_str(),
                entry.priority.0,
                entry.retry_count,
                entry.max_retries,
            );
            if let Some(error) = &entry.last_error {
                line.push_str(&format!("  {error}"));
            }
            line
        })
        .collect()
}

pub fn format_status_lines(records: &[SyncStatusRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let mut line = format!(
                "{:<12}  {:<10}  {}",
                record.emulator_id,
                channel_label(record.channel_name.as_deref()),
                record.sync_status,
            );
            if let Some(synced_at) = record.last_synced_at {
                line.push_str(&format!("  synced {}", format_timestamp(synced_at)));
            }
            if let Some(error) = &record.last_sync_error {
                line.push_str(&format!("  error: {error}"));
            }
            line
        })
        .collect()
}

pub fn format_history_lines(changes: &[SyncStatusChange]) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            let old = change
                .old_status
                .map_or_else(|| "-".to_string(), |status| status.to_string());
            format!(
                "{}  {old} -> {}  {}",
                format_timestamp(change.changed_at),
                change.new_status,
                change.reason
            )
        })
        .collect()
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
