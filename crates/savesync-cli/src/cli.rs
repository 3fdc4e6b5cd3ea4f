use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use savesync_core::models::{QueueStatus, SaveContext, SyncType};

#[derive(Parser)]
#[command(name = "savesync")]
#[command(about = "Find, snapshot and sync emulator saves")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine config file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and drive the sync queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Show sync status for a game
    Status {
        game_id: i64,
        /// Include recent status transitions
        #[arg(long)]
        history: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cached snapshots for a game
    Snapshots {
        game_id: i64,
        /// List save states instead of save files
        #[arg(long)]
        states: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Locate the on-device save for a game
    Discover {
        #[command(flatten)]
        context: ContextArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Package a local save into one transferable file
    Prepare {
        /// Local save file or folder
        path: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Write a downloaded save file into place
    Extract {
        /// Downloaded file
        file: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Capture a save or state into the snapshot cache
    Capture {
        game_id: i64,
        /// Save file or folder to capture
        path: PathBuf,
        /// Channel name (default channel when omitted)
        #[arg(long)]
        channel: Option<String>,
        /// Capture as a save state in this slot
        #[arg(long)]
        slot: Option<i32>,
        /// Emulator that produced the save
        #[arg(long)]
        emulator: Option<String>,
        /// Attach a note (locks the snapshot)
        #[arg(long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore a cached snapshot to a path
    Restore {
        id: i64,
        /// Destination file or folder
        dest: PathBuf,
        /// Restore a save state
        #[arg(long)]
        states: bool,
    },
    /// Evict the oldest unlocked snapshots for a game
    Evict {
        game_id: i64,
        count: usize,
        /// Evict save states instead of save files
        #[arg(long)]
        states: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Pending, failed and retryable counts
    Counts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queue entries
    List {
        /// Only entries in this state
        #[arg(long, value_enum, default_value_t = StatusArg::Pending)]
        status: StatusArg,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue a save-file sync
    Enqueue {
        #[command(flatten)]
        context: ContextArgs,
        /// Download instead of upload
        #[arg(long)]
        download: bool,
        /// Channel name (default channel when omitted)
        #[arg(long)]
        channel: Option<String>,
        /// Local save path, skips discovery
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Re-queue failed entries
    Retry {
        /// Entry to retry (all eligible entries when omitted)
        id: Option<i64>,
    },
    /// Drop one entry from the queue
    Cancel { id: i64 },
    /// Remove completed and exhausted entries
    Cleanup {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Process pending entries
    Drain {
        /// Only drain one sync type
        #[arg(long = "type", value_enum)]
        sync_type: Option<SyncTypeArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Game identity shared by discovery and transfer commands
#[derive(Args, Clone, Debug)]
pub struct ContextArgs {
    /// Platform slug (snes, ngc, 3ds, switch, psp, vita...)
    #[arg(long)]
    pub platform: String,
    /// Emulator id (retroarch, dolphin, citra, eden...)
    #[arg(long)]
    pub emulator: String,
    #[arg(long, default_value_t = 0)]
    pub game_id: i64,
    /// Game title
    #[arg(long)]
    pub title: Option<String>,
    /// ROM file path
    #[arg(long)]
    pub rom: Option<PathBuf>,
    /// Console title id
    #[arg(long)]
    pub title_id: Option<String>,
    /// Installed emulator package
    #[arg(long)]
    pub package: Option<String>,
}

impl ContextArgs {
    pub fn to_context(&self) -> SaveContext {
        let mut context = SaveContext::new(self.game_id, &self.platform, &self.emulator);
        if let Some(title) = &self.title {
            context = context.with_title(title.as_str());
        }
        if let Some(rom) = &self.rom {
            context = context.with_rom_path(rom.as_path());
        }
        if let Some(title_id) = &self.title_id {
            context = context.with_title_id(title_id.as_str());
        }
        if let Some(package) = &self.package {
            context = context.with_package(package.as_str());
        }
        context
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<StatusArg> for QueueStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => Self::Pending,
            StatusArg::InProgress => Self::InProgress,
            StatusArg::Completed => Self::Completed,
            StatusArg::Failed => Self::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncTypeArg {
    SaveFile,
    SaveState,
}

impl From<SyncTypeArg> for SyncType {
    fn from(value: SyncTypeArg) -> Self {
        match value {
            SyncTypeArg::SaveFile => Self::SaveFile,
            SyncTypeArg::SaveState => Self::SaveState,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
