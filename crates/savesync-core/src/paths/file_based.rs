//! Single-file saves named after the ROM (RetroArch and standalone cores)

use std::path::{Path, PathBuf};

use super::registry::retroarch_core;
use super::retroarch_config::RetroArchConfigParser;
use crate::fs::{FileAccess, file_name};
use crate::models::SaveContext;
use crate::util::sanitize_file_stem;

/// Extensions RetroArch writes battery saves with, in lookup order
pub const RETROARCH_EXTENSIONS: [&str; 2] = ["srm", "sav"];

/// Save file stem: the ROM's file stem, else the sanitized game title
pub fn save_base_name(rom_path: Option<&Path>, game_title: &str) -> String {
    rom_path
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| sanitize_file_stem(game_title))
}

/// Installed package behind a RetroArch emulator id
pub fn retroarch_package(emulator_id: &str) -> &'static str {
    if emulator_id == "retroarch_64" {
        "com.retroarch.aarch64"
    } else {
        "com.retroarch"
    }
}

pub struct FileSaveResolver<'a> {
    fs: &'a dyn FileAccess,
}

impl<'a> FileSaveResolver<'a> {
    pub const fn new(fs: &'a dyn FileAccess) -> Self {
        Self { fs }
    }

    /// First existing `dir/base.ext`, directories outermost
    pub fn find_by_base_name(
        &self,
        dirs: &[PathBuf],
        base_name: &str,
        extensions: &[&str],
    ) -> Option<PathBuf> {
        for dir in dirs {
            for ext in extensions.iter().filter(|ext| **ext != "*") {
                let candidate = dir.join(format!("{base_name}.{ext}"));
                if self.fs.is_file(&candidate) {
                    tracing::debug!(path = %candidate.display(), "Found save by name");
                    return Some(candidate);
                }
            }
        }
        tracing::debug!(base_name, dirs = dirs.len(), "No save found by name");
        None
    }

    /// Save named after a game title, exact sanitized name before a
    /// case-insensitive scan of the directory
    pub fn find_by_title(&self, dir: &Path, game_title: &str, extensions: &[&str]) -> Option<PathBuf> {
        if !self.fs.is_directory(dir) {
            return None;
        }
        let sanitized = sanitize_file_stem(game_title);
        if let Some(found) = self.find_by_base_name(&[dir.to_path_buf()], &sanitized, extensions) {
            return Some(found);
        }

        let wanted = game_title.to_lowercase();
        let any_extension = extensions.contains(&"*");
        self.fs.list_files(dir).into_iter().find(|file| {
            if !self.fs.is_file(file) {
                return false;
            }
            let name = file_name(file);
            let (stem, ext) = name.rsplit_once('.').unwrap_or((name.as_str(), ""));
            (any_extension || extensions.contains(&ext.to_lowercase().as_str()))
                && stem.to_lowercase() == wanted
        })
    }

    /// Existing RetroArch save for a game, honouring `retroarch.cfg`
    pub fn discover_retroarch(
        &self,
        ext_storage: &Path,
        context: &SaveContext,
        base_override: Option<&Path>,
    ) -> Option<PathBuf> {
        let Some(core) = retroarch_core(&context.platform_slug) else {
            tracing::debug!(platform = %context.platform_slug, "No RetroArch core mapping");
            return None;
        };
        let parser = RetroArchConfigParser::new(self.fs, ext_storage);
        let content_dir = context.rom_path.as_deref().and_then(Path::parent);
        let dirs = parser.resolve_save_paths(
            retroarch_package(&context.emulator_id),
            Some(&context.platform_slug),
            Some(core),
            content_dir,
            base_override,
        );
        let base_name = save_base_name(context.rom_path.as_deref(), &context.game_title);
        self.find_by_base_name(&dirs, &base_name, &RETROARCH_EXTENSIONS)
    }

    /// Where a new RetroArch save would be written: `saveDir/core/base.srm`
    pub fn construct_retroarch(
        &self,
        ext_storage: &Path,
        context: &SaveContext,
        base_override: Option<&Path>,
    ) -> Option<PathBuf> {
        let core = retroarch_core(&context.platform_slug)?;
        let parser = RetroArchConfigParser::new(self.fs, ext_storage);
        let save_dir = base_override
            .map(Path::to_path_buf)
            .or_else(|| {
                parser
                    .save_config(retroarch_package(&context.emulator_id))
                    .and_then(|config| config.directory)
            })
            .unwrap_or_else(|| ext_storage.join("RetroArch/saves"));
        let base_name = save_base_name(context.rom_path.as_deref(), &context.game_title);
        Some(save_dir.join(core).join(format!("{base_name}.srm")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileAccess;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn base_name_prefers_rom_stem() {
        assert_eq!(
            save_base_name(Some(Path::new("/roms/snes/Chrono Trigger (USA).sfc")), "x"),
            "Chrono Trigger (USA)"
        );
        assert_eq!(save_base_name(None, "Zelda: Link's Awakening"), "Zelda__Link_s_Awakening");
    }

    #[test]
    fn srm_is_checked_before_sav_in_each_dir() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        fs.write_bytes(&tmp.path().join("b/game.sav"), b"1").unwrap();
        fs.write_bytes(&tmp.path().join("b/game.srm"), b"1").unwrap();
        fs.write_bytes(&tmp.path().join("c/game.srm"), b"1").unwrap();

        let resolver = FileSaveResolver::new(&fs);
        let dirs = [tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("c")];
        assert_eq!(
            resolver.find_by_base_name(&dirs, "game", &RETROARCH_EXTENSIONS),
            Some(tmp.path().join("b/game.srm"))
        );
    }

    #[test]
    fn title_lookup_falls_back_to_case_insensitive_scan() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        fs.write_bytes(&tmp.path().join("METROID FUSION.sav"), b"1").unwrap();

        let resolver = FileSaveResolver::new(&fs);
        assert_eq!(
            resolver.find_by_title(tmp.path(), "Metroid Fusion", &["sav"]),
            Some(tmp.path().join("METROID FUSION.sav"))
        );
        assert_eq!(resolver.find_by_title(tmp.path(), "Metroid Fusion", &["dsv"]), None);
    }

    #[test]
    fn retroarch_discover_and_construct() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        let context = SaveContext::new(7, "gba", "retroarch_64")
            .with_rom_path("/roms/gba/Golden Sun.gba")
            .with_title("Golden Sun");
        let resolver = FileSaveResolver::new(&fs);

        assert_eq!(resolver.discover_retroarch(tmp.path(), &context, None), None);
        assert_eq!(
            resolver.construct_retroarch(tmp.path(), &context, None),
            Some(tmp.path().join("RetroArch/saves/mGBA/Golden Sun.srm"))
        );

        fs.write_bytes(&tmp.path().join("RetroArch/saves/Golden Sun.sav"), b"1")
            .unwrap();
        assert_eq!(
            resolver.discover_retroarch(tmp.path(), &context, None),
            Some(tmp.path().join("RetroArch/saves/Golden Sun.sav"))
        );
    }
}
