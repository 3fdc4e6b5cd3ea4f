use std::path::{Path, PathBuf};

use super::HandlerEnv;
use crate::models::{ExtractResult, PreparedSave, SaveContext};
use crate::paths::file_based::{FileSaveResolver, save_base_name};
use crate::paths::{existing_dirs, parent_dir, select_base};

/// Single-file saves, uploaded as-is
#[derive(Clone)]
pub struct FileSaveHandler {
    env: HandlerEnv,
}

impl FileSaveHandler {
    pub const fn new(env: HandlerEnv) -> Self {
        Self { env }
    }

    fn is_retroarch(context: &SaveContext) -> bool {
        matches!(context.emulator_id.as_str(), "retroarch" | "retroarch_64")
    }

    pub fn discover(&self, context: &SaveContext) -> Option<PathBuf> {
        let config = self.env.config_for(context)?;
        let resolver = FileSaveResolver::new(self.env.fs.as_ref());
        let ext_storage = &self.env.registry.environment().ext_storage;
        let user_override = self.env.user_override(context);

        if Self::is_retroarch(context) {
            if let Some(found) =
                resolver.discover_retroarch(ext_storage, context, user_override.as_deref())
            {
                return Some(found);
            }
        }

        let dirs = existing_dirs(self.env.fs.as_ref(), &self.env.candidates(context));
        if context.rom_path.is_some() {
            let base_name = save_base_name(context.rom_path.as_deref(), &context.game_title);
            return resolver.find_by_base_name(&dirs, &base_name, config.save_extensions);
        }
        dirs.iter()
            .find_map(|dir| resolver.find_by_title(dir, &context.game_title, config.save_extensions))
    }

    /// Destination for a save that does not exist yet
    pub fn construct(&self, context: &SaveContext) -> Option<PathBuf> {
        let config = self.env.config_for(context)?;
        if Self::is_retroarch(context) {
            let resolver = FileSaveResolver::new(self.env.fs.as_ref());
            return resolver.construct_retroarch(
                &self.env.registry.environment().ext_storage,
                context,
                self.env.user_override(context).as_deref(),
            );
        }
        let base = select_base(self.env.fs.as_ref(), &self.env.candidates(context))?;
        let extension = config
            .save_extensions
            .iter()
            .find(|ext| **ext != "*")
            .unwrap_or(&"sav");
        let base_name = save_base_name(context.rom_path.as_deref(), &context.game_title);
        Some(base.join(format!("{base_name}.{extension}")))
    }

    pub fn prepare(&self, local_path: &Path, _context: &SaveContext) -> Option<PreparedSave> {
        if !self.env.fs.is_file(local_path) {
            tracing::debug!(path = %local_path.display(), "Save file does not exist");
            return None;
        }
        tracing::debug!(
            path = %local_path.display(),
            size = self.env.fs.length(local_path),
            "Using save file directly"
        );
        Some(PreparedSave {
            file: local_path.to_path_buf(),
            is_temporary: false,
            original_paths: vec![local_path.to_path_buf()],
        })
    }

    pub fn extract(&self, temp_file: &Path, context: &SaveContext) -> ExtractResult {
        let Some(target) = context
            .local_save_path
            .clone()
            .or_else(|| self.discover(context))
            .or_else(|| self.construct(context))
        else {
            return ExtractResult::failed("Cannot resolve save path");
        };

        if let Some(parent) = parent_dir(&target) {
            if let Err(error) = self.env.fs.mkdirs(parent) {
                return ExtractResult::failed(format!("Cannot create save directory: {error}"));
            }
        }
        match self.env.fs.copy_file(temp_file, &target) {
            Ok(bytes) => {
                tracing::debug!(target = %target.display(), bytes, "Save file written");
                ExtractResult::ok(target)
            }
            Err(error) => {
                tracing::warn!(target = %target.display(), %error, "Failed to write save file");
                ExtractResult::failed(format!("Failed to copy save: {error}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{device, device_with};
    use super::super::{PlatformHandler, SaveHandler};
    use crate::models::SaveContext;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn retroarch_round_trip_is_byte_identical() {
        let device = device();
        let fs = device.env.fs.clone();
        let save = device.ext().join("RetroArch/saves/Metroid Fusion.srm");
        fs.write_bytes(&save, &[7u8; 128]).unwrap();

        let context = SaveContext::new(3, "gba", "retroarch")
            .with_rom_path("/roms/gba/Metroid Fusion.gba")
            .with_title("Metroid Fusion");
        let handler = PlatformHandler::for_platform("gba", device.env.clone());

        assert_eq!(handler.discover(&context).await, Some(save.clone()));
        let prepared = handler.prepare_for_upload(&save, &context).await.unwrap();
        assert!(!prepared.is_temporary);
        assert_eq!(prepared.original_paths, vec![save.clone()]);

        let download = device.root.path().join("download.bin");
        std::fs::write(&download, [9u8; 128]).unwrap();
        let result = handler.extract_download(&download, &context).await;
        assert!(result.success);
        assert_eq!(result.target_path, Some(save.clone()));
        assert_eq!(fs.read_bytes(&save).unwrap(), vec![9u8; 128]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_save_constructs_core_path() {
        let device = device();
        let context = SaveContext::new(3, "snes", "retroarch_64")
            .with_rom_path("/roms/snes/Earthbound.sfc");
        let handler = PlatformHandler::for_platform("snes", device.env.clone());

        assert!(handler
            .prepare_for_upload(&device.ext().join("missing.srm"), &context)
            .await
            .is_none());

        let download = device.root.path().join("download.bin");
        std::fs::write(&download, b"save").unwrap();
        let result = handler.extract_download(&download, &context).await;
        assert_eq!(
            result.target_path,
            Some(device.ext().join("RetroArch/saves/Snes9x/Earthbound.srm"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn standalone_emulator_uses_override_dir() {
        let external = tempfile::tempdir().unwrap();
        let override_dir = external.path().join("melon");
        let device = device_with(|registry| registry.with_override("melonds", override_dir.clone()));
        let fs = device.env.fs.clone();
        let context = SaveContext::new(4, "nds", "melonds").with_title("Pokemon Black");
        fs.write_bytes(&override_dir.join("pokemon black.sav"), b"1").unwrap();

        let handler = PlatformHandler::for_platform("nds", device.env.clone());
        assert_eq!(
            handler.discover(&context).await,
            Some(override_dir.join("pokemon black.sav"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_emulator_cannot_extract() {
        let device = device();
        let context = SaveContext::new(5, "snes", "nonexistent");
        let handler = PlatformHandler::for_platform("snes", device.env.clone());
        let download = device.root.path().join("d.bin");
        std::fs::write(&download, b"x").unwrap();

        let result = handler.extract_download(&download, &context).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Cannot resolve save path"));
    }
}
