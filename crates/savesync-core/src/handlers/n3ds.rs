use std::path::{Path, PathBuf};

use super::{BundleLayout, HandlerEnv, bundle_folder, restore_folder};
use crate::models::{ExtractResult, PreparedSave, SaveContext};
use crate::paths::n3ds::{N3dsResolver, N3dsTitle, normalize_base_override};
use crate::paths::select_base;

/// 3DS `data` folders, zipped with the folder name as root
#[derive(Clone)]
pub struct N3dsSaveHandler {
    env: HandlerEnv,
}

impl N3dsSaveHandler {
    pub const fn new(env: HandlerEnv) -> Self {
        Self { env }
    }

    fn base_candidates(&self, context: &SaveContext) -> Vec<PathBuf> {
        match self.env.user_override(context) {
            Some(path) => vec![normalize_base_override(&path)],
            None => self.env.candidates(context),
        }
    }

    pub fn discover(&self, context: &SaveContext) -> Option<PathBuf> {
        let title = N3dsTitle::parse(context.title_id.as_deref()?)?;
        let resolver = N3dsResolver::new(self.env.fs.as_ref());
        self.base_candidates(context)
            .iter()
            .find_map(|base| resolver.find_save_folder(base, &title))
    }

    pub fn prepare(&self, local_path: &Path, _context: &SaveContext) -> Option<PreparedSave> {
        if !self.env.fs.is_directory(local_path) {
            tracing::debug!(path = %local_path.display(), "3DS save folder does not exist");
            return None;
        }
        let bundle = bundle_folder(&self.env, local_path, "3ds")?;
        Some(PreparedSave {
            file: bundle,
            is_temporary: true,
            original_paths: vec![local_path.to_path_buf()],
        })
    }

    pub fn extract(&self, temp_file: &Path, context: &SaveContext) -> ExtractResult {
        let target = match &context.local_save_path {
            Some(path) => path.clone(),
            None => {
                let Some(base) = select_base(self.env.fs.as_ref(), &self.base_candidates(context)) else {
                    return ExtractResult::failed("No base path for 3DS saves");
                };
                let Some(title) = context.title_id.as_deref().and_then(N3dsTitle::parse) else {
                    return ExtractResult::failed("No title ID for 3DS save");
                };
                let resolver = N3dsResolver::new(self.env.fs.as_ref());
                let found = resolver
                    .find_save_folder(&base, &title)
                    .or_else(|| resolver.construct_save_path(&base, &title));
                let Some(target) = found else {
                    return ExtractResult::failed(
                        "Cannot construct 3DS save path (missing id0/id1 structure)",
                    );
                };
                target
            }
        };
        restore_folder(&self.env, temp_file, &target, BundleLayout::SingleFolder)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{device, device_with};
    use super::super::{PlatformHandler, SaveHandler};
    use crate::models::SaveContext;
    use pretty_assertions::assert_eq;

    const CITRA_ROOT: &str = "Android/data/org.citra.citra_emu/files/sdmc/Nintendo 3DS";

    #[tokio::test(flavor = "multi_thread")]
    async fn folder_round_trip_restores_tree() {
        let device = device();
        let fs = device.env.fs.clone();
        let data = device
            .ext()
            .join(CITRA_ROOT)
            .join("id0/id1/title/00040000/00030700/data");
        fs.write_bytes(&data.join("00000001/main"), b"progress").unwrap();
        fs.write_bytes(&data.join("extdata.bin"), b"extra").unwrap();

        let context = SaveContext::new(9, "3ds", "citra").with_title_id("0004000000030700");
        let handler = PlatformHandler::for_platform("3ds", device.env.clone());
        assert_eq!(handler.discover(&context).await, Some(data.clone()));

        let prepared = handler.prepare_for_upload(&data, &context).await.unwrap();
        assert!(prepared.is_temporary);
        assert_eq!(
            crate::archive::peek_root_folder_name(&prepared.file).unwrap().as_deref(),
            Some("data")
        );

        fs.write_bytes(&data.join("00000001/main"), b"overwritten").unwrap();
        fs.write_bytes(&data.join("stray"), b"stray").unwrap();
        let result = handler.extract_download(&prepared.file, &context).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.target_path, Some(data.clone()));
        assert_eq!(fs.read_bytes(&data.join("00000001/main")).unwrap(), b"progress");
        assert_eq!(fs.read_bytes(&data.join("extdata.bin")).unwrap(), b"extra");
        assert!(!fs.exists(&data.join("stray")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_id0_means_extraction_fails() {
        let device = device();
        let context = SaveContext::new(9, "3ds", "citra").with_title_id("0004000000030700");
        let handler = PlatformHandler::for_platform("3ds", device.env.clone());
        let download = device.root.path().join("d.zip");
        std::fs::write(&download, b"PK\x03\x04").unwrap();

        assert_eq!(handler.discover(&context).await, None);
        let result = handler.extract_download(&download, &context).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Cannot construct 3DS save path (missing id0/id1 structure)")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn override_gets_sdmc_suffix() {
        let external = tempfile::tempdir().unwrap();
        let device = device_with(|registry| registry.with_override("citra", external.path()));
        let fs = device.env.fs.clone();
        let data = external
            .path()
            .join("sdmc/Nintendo 3DS/a/b/title/00040000/00030700/data");
        fs.write_bytes(&data.join("main"), b"1").unwrap();

        let context = SaveContext::new(9, "3ds", "citra").with_title_id("0004000000030700");
        let handler = PlatformHandler::for_platform("3ds", device.env.clone());
        assert_eq!(handler.discover(&context).await, Some(data));
    }
}
