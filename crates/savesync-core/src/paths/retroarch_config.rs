//! `retroarch.cfg` reader for save and state directory settings

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fs::FileAccess;

/// Where RetroArch puts save files (or states) for a given install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetroArchDirConfig {
    /// Configured directory, `None` when left at `default`
    pub directory: Option<PathBuf>,
    pub in_content_dir: bool,
    pub sort_by_content_dir: bool,
    pub sort_by_core: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirKind {
    Saves,
    States,
}

impl DirKind {
    const fn keys(self) -> [&'static str; 4] {
        match self {
            Self::Saves => [
                "savefile_directory",
                "savefiles_in_content_dir",
                "sort_savefiles_by_content_enable",
                "sort_savefiles_enable",
            ],
            Self::States => [
                "savestate_directory",
                "savestates_in_content_dir",
                "sort_savestates_by_content_enable",
                "sort_savestates_enable",
            ],
        }
    }

    const fn default_dir(self) -> &'static str {
        match self {
            Self::Saves => "RetroArch/saves",
            Self::States => "RetroArch/states",
        }
    }
}

/// Parse `key = "value"` lines; comments and malformed lines are skipped
pub fn parse_cfg(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

fn dir_config(values: &BTreeMap<String, String>, kind: DirKind) -> RetroArchDirConfig {
    let [dir_key, content_key, sort_content_key, sort_core_key] = kind.keys();
    let flag = |key: &str| values.get(key).is_some_and(|value| value == "true");

    RetroArchDirConfig {
        directory: values
            .get(dir_key)
            .filter(|value| !value.trim().is_empty() && value.as_str() != "default")
            .map(PathBuf::from),
        in_content_dir: flag(content_key),
        sort_by_content_dir: flag(sort_content_key),
        sort_by_core: flag(sort_core_key),
    }
}

/// Reads RetroArch's own configuration through the file-access layer
pub struct RetroArchConfigParser<'a> {
    fs: &'a dyn FileAccess,
    ext_storage: &'a Path,
}

impl<'a> RetroArchConfigParser<'a> {
    pub const fn new(fs: &'a dyn FileAccess, ext_storage: &'a Path) -> Self {
        Self { fs, ext_storage }
    }

    fn package_config_path(&self, package: &str) -> PathBuf {
        self.ext_storage
            .join("Android/data")
            .join(package)
            .join("files/retroarch.cfg")
    }

    /// Package-specific config, then the portable install, then any known path
    pub fn find_config_file(&self, package: &str) -> Option<PathBuf> {
        let portable = self.ext_storage.join("RetroArch/retroarch.cfg");
        let mut candidates = Vec::new();
        if matches!(package, "com.retroarch" | "com.retroarch.aarch64") {
            candidates.push(self.package_config_path(package));
        }
        candidates.push(portable);
        candidates.push(self.package_config_path("com.retroarch"));
        candidates.push(self.package_config_path("com.retroarch.aarch64"));

        candidates.into_iter().find(|path| self.fs.is_file(path))
    }

    fn load(&self, package: &str) -> Option<BTreeMap<String, String>> {
        let Some(path) = self.find_config_file(package) else {
            tracing::debug!(package, "No retroarch.cfg found");
            return None;
        };
        match self.fs.read_bytes(&path) {
            Ok(bytes) => {
                tracing::debug!(path = %path.display(), "Parsing retroarch.cfg");
                Some(parse_cfg(&String::from_utf8_lossy(&bytes)))
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Failed to read retroarch.cfg");
                None
            }
        }
    }

    pub fn save_config(&self, package: &str) -> Option<RetroArchDirConfig> {
        self.load(package).map(|values| dir_config(&values, DirKind::Saves))
    }

    pub fn state_config(&self, package: &str) -> Option<RetroArchDirConfig> {
        self.load(package).map(|values| dir_config(&values, DirKind::States))
    }

    /// Save directories for one game
    ///
    /// `system` is the content directory name used when sorting by content
    /// directory; `core` is the core's save folder name.
    pub fn resolve_save_paths(
        &self,
        package: &str,
        system: Option<&str>,
        core: Option<&str>,
        content_dir: Option<&Path>,
        base_override: Option<&Path>,
    ) -> Vec<PathBuf> {
        let config = self.save_config(package).unwrap_or_default();
        self.resolve(&config, DirKind::Saves, system, core, content_dir, base_override)
    }

    /// State directories for one game; states are never sorted by content dir
    pub fn resolve_state_paths(
        &self,
        package: &str,
        core: Option<&str>,
        content_dir: Option<&Path>,
        base_override: Option<&Path>,
    ) -> Vec<PathBuf> {
        let mut config = self.state_config(package).unwrap_or_default();
        config.sort_by_content_dir = false;
        self.resolve(&config, DirKind::States, None, core, content_dir, base_override)
    }

    fn resolve(
        &self,
        config: &RetroArchDirConfig,
        kind: DirKind,
        system: Option<&str>,
        core: Option<&str>,
        content_dir: Option<&Path>,
        base_override: Option<&Path>,
    ) -> Vec<PathBuf> {
        if base_override.is_none() && config.in_content_dir {
            if let Some(content_dir) = content_dir {
                return vec![content_dir.to_path_buf()];
            }
        }

        let mut path = base_override
            .map(Path::to_path_buf)
            .or_else(|| config.directory.clone())
            .unwrap_or_else(|| self.ext_storage.join(kind.default_dir()));

        if config.sort_by_content_dir {
            if let Some(system) = system {
                path.push(system);
            }
        }
        if config.sort_by_core {
            if let Some(core) = core {
                path.push(core);
            }
        }

        tracing::debug!(
            path = %path.display(),
            sort_by_content_dir = config.sort_by_content_dir,
            sort_by_core = config.sort_by_core,
            "Resolved RetroArch directory"
        );
        vec![path]
    }
}
