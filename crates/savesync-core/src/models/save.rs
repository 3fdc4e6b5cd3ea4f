//! Ephemeral values passed through platform handlers

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Console-specific identity of the save being moved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveContext {
    pub game_id: i64,
    pub game_title: String,
    pub platform_slug: String,
    pub emulator_id: String,
    pub emulator_package: Option<String>,
    pub rom_path: Option<PathBuf>,
    /// Console title id (3DS, Switch, PSP, Vita)
    pub title_id: Option<String>,
    /// Path remembered from an earlier sync
    pub local_save_path: Option<PathBuf>,
}

impl SaveContext {
    pub fn new(
        game_id: i64,
        platform_slug: impl Into<String>,
        emulator_id: impl Into<String>,
    ) -> Self {
        Self {
            game_id,
            platform_slug: platform_slug.into(),
            emulator_id: emulator_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.game_title = title.into();
        self
    }

    #[must_use]
    pub fn with_rom_path(mut self, rom_path: impl Into<PathBuf>) -> Self {
        self.rom_path = Some(rom_path.into());
        self
    }

    #[must_use]
    pub fn with_title_id(mut self, title_id: impl Into<String>) -> Self {
        self.title_id = Some(title_id.into());
        self
    }

    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.emulator_package = Some(package.into());
        self
    }
}

/// Transferable artifact produced by `prepare_for_upload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSave {
    pub file: PathBuf,
    /// The caller must delete `file` after the transfer
    pub is_temporary: bool,
    pub original_paths: Vec<PathBuf>,
}

/// Outcome of `extract_download`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractResult {
    pub success: bool,
    pub target_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl ExtractResult {
    pub const fn ok(target_path: PathBuf) -> Self {
        Self {
            success: true,
            target_path: Some(target_path),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            target_path: None,
            error: Some(reason.into()),
        }
    }
}
