//! Engine configuration.
//!
//! One `EngineConfig` is loaded at start-up (from JSON) and turned into the
//! collaborators the engine needs: the path registry, frozen storage
//! capabilities and the file-access layer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fs::{FileAccess, LocalFileAccess, StorageCapabilities};
use crate::handlers::HandlerEnv;
use crate::paths::{PathEnvironment, SavePathRegistry};

pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_SNAPSHOT_CAP: usize = 10;
const DEFAULT_EXT_STORAGE: &str = "/storage/emulated/0";

/// Runtime settings for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Shared storage root substituted for `{extStorage}`
    pub ext_storage: PathBuf,
    /// App-private root substituted for `{filesDir}`
    pub files_dir: Option<PathBuf>,
    /// Root of cached snapshot files
    pub cache_dir: PathBuf,
    /// Prepared bundles and staging folders
    pub temp_dir: PathBuf,
    pub database_path: PathBuf,
    /// Directory backing the file-based remote
    pub remote_dir: PathBuf,
    pub max_retries: i32,
    /// Unlocked snapshots kept per game
    pub snapshot_cap: usize,
    /// Emulator id to user-chosen save directory
    pub path_overrides: BTreeMap<String, PathBuf>,
    /// Emulator id to installed package name
    pub emulator_packages: BTreeMap<String, String>,
    /// Fallback root for restricted storage paths
    pub alternate_storage_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_data_dir(std::env::temp_dir().join("savesync"))
    }
}

impl EngineConfig {
    /// Defaults with every engine-owned file under `data_dir`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            ext_storage: PathBuf::from(DEFAULT_EXT_STORAGE),
            files_dir: None,
            cache_dir: data_dir.join("cache"),
            temp_dir: data_dir.join("tmp"),
            database_path: data_dir.join("savesync.db"),
            remote_dir: data_dir.join("remote"),
            max_retries: DEFAULT_MAX_RETRIES,
            snapshot_cap: DEFAULT_SNAPSHOT_CAP,
            path_overrides: BTreeMap::new(),
            emulator_packages: BTreeMap::new(),
            alternate_storage_root: None,
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries < 0 {
            return Err(Error::InvalidInput(format!(
                "max_retries must not be negative, got {}",
                self.max_retries
            )));
        }
        if self.snapshot_cap == 0 {
            return Err(Error::InvalidInput("snapshot_cap must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Registry with the configured overrides and packages applied
    pub fn registry(&self) -> SavePathRegistry {
        let env = PathEnvironment {
            ext_storage: self.ext_storage.clone(),
            files_dir: self.files_dir.clone(),
        };
        let registry = self
            .path_overrides
            .iter()
            .fold(SavePathRegistry::new(env), |registry, (id, path)| {
                registry.with_override(id.clone(), path.clone())
            });
        self.emulator_packages
            .iter()
            .fold(registry, |registry, (id, package)| {
                registry.with_package(id.clone(), package.clone())
            })
    }

    /// Detect storage once; the result is shared, never re-detected
    pub fn capabilities(&self) -> Arc<StorageCapabilities> {
        let restricted = vec![
            self.ext_storage.join("Android/data"),
            self.ext_storage.join("Android/obb"),
        ];
        Arc::new(StorageCapabilities::detect(
            restricted,
            self.alternate_storage_root.clone(),
        ))
    }

    pub fn file_access(&self) -> Arc<dyn FileAccess> {
        Arc::new(LocalFileAccess::new(self.capabilities()))
    }

    /// Handler collaborators built from this config
    pub fn handler_env(&self) -> HandlerEnv {
        HandlerEnv::new(self.file_access(), Arc::new(self.registry()), self.temp_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json(r#"{"ext_storage": "/sdcard"}"#).unwrap();
        assert_eq!(config.ext_storage, PathBuf::from("/sdcard"));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.snapshot_cap, DEFAULT_SNAPSHOT_CAP);
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = EngineConfig::from_json(r#"{"ext_storge": "/sdcard"}"#).unwrap_err();
        assert!(matches!(error, Error::Serialization(_)));
    }

    #[test]
    fn rejects_zero_cap() {
        let error = EngineConfig::from_json(r#"{"snapshot_cap": 0}"#).unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[test]
    fn registry_carries_overrides_and_packages() {
        let config = EngineConfig::from_json(
            r#"{
                "ext_storage": "/sdcard",
                "path_overrides": {"melonds": "/sdcard/melon"},
                "emulator_packages": {"eden": "dev.eden.eden_emulator.nightly"}
            }"#,
        )
        .unwrap();
        let registry = config.registry();
        assert_eq!(
            registry.user_override("melonds"),
            Some(&PathBuf::from("/sdcard/melon"))
        );
        let eden = registry.config("eden").unwrap();
        assert_eq!(
            registry.package_for(eden, None).as_deref(),
            Some("dev.eden.eden_emulator.nightly")
        );
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().max_retries, 5);
    }
}
