use std::path::{Path, PathBuf};

use super::{HandlerEnv, Staging};
use crate::archive;
use crate::fs::file_name;
use crate::models::{ExtractResult, PreparedSave, SaveContext};
use crate::paths::gamecube::{GameCubeGameInfo, GameCubeResolver, gci_path, parse_gci_header};
use crate::paths::{parent_dir, select_base};

/// GameCube memory-card exports (`.gci`), bundled flat for transfer
#[derive(Clone)]
pub struct GciSaveHandler {
    env: HandlerEnv,
}

impl GciSaveHandler {
    pub const fn new(env: HandlerEnv) -> Self {
        Self { env }
    }

    fn resolver(&self) -> GameCubeResolver<'_> {
        GameCubeResolver::new(self.env.fs.as_ref())
    }

    fn game_info(&self, context: &SaveContext) -> Option<GameCubeGameInfo> {
        let rom_path = context.rom_path.as_deref()?;
        self.resolver().read_rom_info(rom_path)
    }

    /// Every `.gci` for the context's game across all candidate bases
    pub fn discover_all(&self, context: &SaveContext) -> Vec<PathBuf> {
        let Some(game) = self.game_info(context) else {
            return Vec::new();
        };
        self.resolver()
            .discover_all(&self.env.candidates(context), &game)
    }

    pub fn discover(&self, context: &SaveContext) -> Option<PathBuf> {
        self.discover_all(context).into_iter().next()
    }

    pub fn prepare(&self, local_path: &Path, context: &SaveContext) -> Option<PreparedSave> {
        let mut paths = self.discover_all(context);
        if paths.is_empty() && self.env.fs.is_file(local_path) {
            paths.push(local_path.to_path_buf());
        }
        if paths.is_empty() {
            tracing::debug!(game_id = context.game_id, "No GCI files found");
            return None;
        }

        let staging = Staging::new(self.env.temp_path("gci_stage", "")).ok()?;
        let mut staged = Vec::with_capacity(paths.len());
        for path in &paths {
            let target = staging.path().join(file_name(path));
            let bytes = match self.env.fs.read_bytes(path) {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "Failed to read GCI file");
                    return None;
                }
            };
            std::fs::write(&target, bytes).ok()?;
            staged.push(target);
        }

        let output = self.env.temp_path("gci_bundle", "zip");
        if let Err(error) = archive::zip_files(&staged, &output) {
            tracing::warn!(%error, "Failed to create GCI bundle");
            return None;
        }
        tracing::debug!(files = paths.len(), bundle = %output.display(), "GCI bundle created");
        Some(PreparedSave {
            file: output,
            is_temporary: true,
            original_paths: paths,
        })
    }

    pub fn extract(&self, temp_file: &Path, context: &SaveContext) -> ExtractResult {
        if context.rom_path.is_none() {
            return ExtractResult::failed("ROM path required for GCI extraction");
        }
        let Some(game) = self.game_info(context) else {
            return ExtractResult::failed("Failed to parse ROM header");
        };
        let Some(base) = select_base(self.env.fs.as_ref(), &self.env.candidates(context)) else {
            return ExtractResult::failed("No writable base path for GCI saves");
        };

        match archive::is_zip_file(temp_file) {
            Ok(true) => self.extract_bundle(temp_file, &base, &game),
            Ok(false) => self.extract_single(temp_file, &base, &game),
            Err(error) => ExtractResult::failed(format!("Cannot read download: {error}")),
        }
    }

    /// Replace every save of the game with the bundle's contents
    ///
    /// The bundle is fully unpacked to staging before anything on device is
    /// touched. Existing saves are deleted first; if a write then fails, the
    /// files already written are removed so no old/new mix remains.
    fn extract_bundle(&self, bundle: &Path, base: &Path, game: &GameCubeGameInfo) -> ExtractResult {
        let staging = match Staging::new(self.env.temp_path("gci_extract", "")) {
            Ok(staging) => staging,
            Err(error) => return ExtractResult::failed(format!("Cannot create staging dir: {error}")),
        };
        let staged = archive::unzip_selected(bundle, |name| {
            let entry_name = name.rsplit('/').next().unwrap_or(name);
            (entry_name.to_ascii_lowercase().ends_with(".gci"))
                .then(|| staging.path().join(entry_name))
        });
        let staged = match staged {
            Ok(staged) if !staged.is_empty() => staged,
            Ok(_) => return ExtractResult::failed("GCI bundle contains no saves"),
            Err(error) => return ExtractResult::failed(format!("GCI bundle extraction failed: {error}")),
        };

        let existing = self.resolver().find_gci_files_in_path(base, game);
        for path in &existing {
            if let Err(error) = self.env.fs.delete(path) {
                return ExtractResult::failed(format!(
                    "Failed to remove existing save {}: {error}",
                    path.display()
                ));
            }
            tracing::debug!(path = %path.display(), "Deleted existing GCI");
        }

        let mut written = Vec::<PathBuf>::with_capacity(staged.len());
        for source in &staged {
            let target = gci_path(base, game.region, &file_name(source));
            let result = parent_dir(&target)
                .map_or(Ok(()), |parent| self.env.fs.mkdirs(parent))
                .and_then(|()| self.env.fs.copy_file(source, &target));
            if let Err(error) = result {
                tracing::warn!(target = %target.display(), %error, "GCI write failed, rolling back");
                for path in &written {
                    if let Err(error) = self.env.fs.delete(path) {
                        tracing::warn!(path = %path.display(), %error, "Rollback delete failed");
                    }
                }
                return ExtractResult::failed(format!("Failed to write {}: {error}", target.display()));
            }
            written.push(target);
        }

        tracing::debug!(files = written.len(), "GCI bundle extracted");
        written
            .into_iter()
            .next()
            .map_or_else(|| ExtractResult::failed("GCI bundle extraction failed"), ExtractResult::ok)
    }

    fn extract_single(&self, file: &Path, base: &Path, game: &GameCubeGameInfo) -> ExtractResult {
        let header = match self.env.fs.read_prefix(file, 0x40) {
            Ok(header) => header,
            Err(error) => return ExtractResult::failed(format!("Cannot read GCI: {error}")),
        };
        let Some(info) = parse_gci_header(&header) else {
            return ExtractResult::failed("Failed to parse GCI header");
        };

        let target = gci_path(base, game.region, &info.file_name());
        let result = parent_dir(&target)
            .map_or(Ok(()), |parent| self.env.fs.mkdirs(parent))
            .and_then(|()| self.env.fs.copy_file(file, &target));
        match result {
            Ok(_) => {
                tracing::debug!(target = %target.display(), "Extracted single GCI");
                ExtractResult::ok(target)
            }
            Err(error) => ExtractResult::failed(format!("Single GCI extraction failed: {error}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::device;
    use super::super::{PlatformHandler, SaveHandler};
    use crate::models::SaveContext;
    use crate::paths::gamecube::tests::{gci_bytes, iso_header};
    use pretty_assertions::assert_eq;

    fn setup() -> (super::super::tests::Device, SaveContext, std::path::PathBuf) {
        let device = device();
        let rom = device.root.path().join("roms/melee.iso");
        device
            .env
            .fs
            .write_bytes(&rom, &iso_header("GALE01", "Melee"))
            .unwrap();
        let base = device
            .ext()
            .join("Android/data/org.dolphinemu.dolphinemu/files/GC");
        let context = SaveContext::new(42, "gc", "dolphin").with_rom_path(rom);
        (device, context, base)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bundle_round_trip_restores_all_cards() {
        let (device, context, base) = setup();
        let fs = device.env.fs.clone();
        let first = base.join("USA/Card A/GALE01_SuperSmash.gci");
        let second = base.join("USA/GALE01_Settings.gci");
        fs.write_bytes(&first, &gci_bytes("GALE01", "SuperSmash")).unwrap();
        fs.write_bytes(&second, &gci_bytes("GALE01", "Settings")).unwrap();

        let handler = PlatformHandler::for_platform("ngc", device.env.clone());
        let prepared = handler.prepare_for_upload(&first, &context).await.unwrap();
        assert!(prepared.is_temporary);
        assert_eq!(prepared.original_paths, vec![first.clone(), second.clone()]);

        fs.write_bytes(&second, b"stale").unwrap();
        let result = handler.extract_download(&prepared.file, &context).await;
        assert!(result.success, "{:?}", result.error);

        assert!(!fs.exists(&first));
        assert_eq!(
            fs.read_bytes(&base.join("USA/GALE01_SuperSmash.gci")).unwrap(),
            gci_bytes("GALE01", "SuperSmash")
        );
        assert_eq!(fs.read_bytes(&second).unwrap(), gci_bytes("GALE01", "Settings"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_gci_uses_header_file_name() {
        let (device, context, base) = setup();
        let download = device.root.path().join("download.gci");
        std::fs::write(&download, gci_bytes("GALE01", "SuperSmash")).unwrap();

        let handler = PlatformHandler::for_platform("gc", device.env.clone());
        let result = handler.extract_download(&download, &context).await;
        assert_eq!(
            result.target_path,
            Some(base.join("USA/GALE01_SuperSmash.gci"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_rom_is_reported() {
        let (device, _, _) = setup();
        let handler = PlatformHandler::for_platform("gc", device.env.clone());
        let context = SaveContext::new(42, "gc", "dolphin");
        let download = device.root.path().join("d.gci");
        std::fs::write(&download, b"x").unwrap();

        let result = handler.extract_download(&download, &context).await;
        assert_eq!(result.error.as_deref(), Some("ROM path required for GCI extraction"));
        assert!(handler.prepare_for_upload(&download, &context).await.is_some());
    }
}
