use std::path::{Path, PathBuf};

use super::{BundleLayout, HandlerEnv, bundle_folder, restore_folder};
use crate::archive;
use crate::models::{ExtractResult, PreparedSave, SaveContext};
use crate::paths::select_base;
use crate::paths::switch::{
    JKSV_META_FILE, SwitchResolver, is_valid_cached_save_path, is_valid_title_id, parse_jksv_meta,
};
use crate::util::is_hex_of_len;

/// Switch title save folders, zipped with the title id as root folder
#[derive(Clone)]
pub struct SwitchSaveHandler {
    env: HandlerEnv,
}

/// Title id carried by a downloaded bundle and how to unpack it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BundleIdentity {
    pub title_id: String,
    pub jksv: bool,
}

impl SwitchSaveHandler {
    pub const fn new(env: HandlerEnv) -> Self {
        Self { env }
    }

    fn resolver(&self) -> SwitchResolver<'_> {
        SwitchResolver::new(self.env.fs.as_ref())
    }

    fn base(&self, context: &SaveContext) -> Option<PathBuf> {
        select_base(self.env.fs.as_ref(), &self.env.candidates(context))
    }

    pub fn discover(&self, context: &SaveContext) -> Option<PathBuf> {
        let title_id = context.title_id.as_deref()?;
        if !is_valid_title_id(&title_id.to_ascii_uppercase()) {
            tracing::debug!(title_id, "Not a Switch application title id");
            return None;
        }
        let resolver = self.resolver();
        self.env
            .candidates(context)
            .iter()
            .find_map(|base| resolver.find_save_folder_by_title_id(base, title_id))
    }

    pub fn prepare(&self, local_path: &Path, _context: &SaveContext) -> Option<PreparedSave> {
        if !self.env.fs.is_directory(local_path) {
            tracing::debug!(path = %local_path.display(), "Switch save folder does not exist");
            return None;
        }
        let bundle = bundle_folder(&self.env, local_path, "switch")?;
        Some(PreparedSave {
            file: bundle,
            is_temporary: true,
            original_paths: vec![local_path.to_path_buf()],
        })
    }

    /// Title id from the bundle's root folder, else from a JKSV marker
    pub(crate) fn bundle_identity(bundle: &Path) -> Option<BundleIdentity> {
        if let Ok(Some(root)) = archive::peek_root_folder_name(bundle) {
            if is_hex_of_len(&root, 16) {
                return Some(BundleIdentity {
                    title_id: root.to_ascii_uppercase(),
                    jksv: false,
                });
            }
        }
        let meta = archive::entry_names(bundle)
            .ok()?
            .into_iter()
            .find(|name| name.rsplit('/').next() == Some(JKSV_META_FILE))?;
        let bytes = archive::read_entry(bundle, &meta).ok()??;
        parse_jksv_meta(&bytes).map(|title_id| BundleIdentity {
            title_id,
            jksv: true,
        })
    }

    fn is_jksv(bundle: &Path) -> bool {
        archive::entry_names(bundle).is_ok_and(|names| {
            names
                .iter()
                .any(|name| name.rsplit('/').next() == Some(JKSV_META_FILE))
        })
    }

    /// Destination for a bundle whose title id can be read from the bundle
    pub fn resolve_save_target_path(&self, bundle: &Path, context: &SaveContext) -> Option<PathBuf> {
        let Some(identity) = Self::bundle_identity(bundle) else {
            tracing::debug!("No title id in Switch bundle");
            return None;
        };
        let base = self.base(context)?;
        let target = self.resolver().construct_save_path(&base, &identity.title_id, true);
        tracing::debug!(target = %target.display(), jksv = identity.jksv, "Resolved Switch save target");
        Some(target)
    }

    pub fn extract(&self, temp_file: &Path, context: &SaveContext) -> ExtractResult {
        let target = match context
            .local_save_path
            .clone()
            .filter(|path| is_valid_cached_save_path(path))
            .or_else(|| self.resolve_save_target_path(temp_file, context))
        {
            Some(target) => target,
            None => {
                let Some(base) = self.base(context) else {
                    return ExtractResult::failed("No base path for Switch saves");
                };
                let Some(title_id) = context.title_id.as_deref() else {
                    return ExtractResult::failed("No title ID for Switch save");
                };
                self.resolver().construct_save_path(&base, title_id, true)
            }
        };

        let layout = if Self::is_jksv(temp_file) {
            tracing::debug!("JKSV bundle detected, preserving structure");
            BundleLayout::Preserving(&[JKSV_META_FILE])
        } else {
            BundleLayout::SingleFolder
        };
        restore_folder(&self.env, temp_file, &target, layout)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::super::tests::device;
    use super::super::{PlatformHandler, SaveHandler};
    use super::*;
    use crate::paths::switch::{ZERO_PROFILE, ZERO_USER};
    use pretty_assertions::assert_eq;
    use zip::write::SimpleFileOptions;

    const EDEN_SAVE: &str = "Android/data/dev.eden.eden_emulator/files/nand/user/save";
    const PROFILE: &str = "ABCDEFABCDEFABCDEFABCDEFABCDEF12";

    #[tokio::test(flavor = "multi_thread")]
    async fn bundle_root_names_title_and_device_saves_use_zero_profile() {
        let device = device();
        let fs = device.env.fs.clone();
        let base = device.ext().join(EDEN_SAVE);
        fs.mkdirs(&base.join(ZERO_USER).join(PROFILE)).unwrap();
        let source = base.join(ZERO_USER).join(PROFILE).join("01006F8002326000");
        fs.write_bytes(&source.join("main.dat"), b"island").unwrap();

        let context = SaveContext::new(1, "switch", "eden");
        let handler = PlatformHandler::for_platform("switch", device.env.clone());
        let prepared = handler.prepare_for_upload(&source, &context).await.unwrap();
        assert_eq!(
            SwitchSaveHandler::bundle_identity(&prepared.file),
            Some(BundleIdentity {
                title_id: "01006F8002326000".to_string(),
                jksv: false
            })
        );

        let result = handler.extract_download(&prepared.file, &context).await;
        let expected = base.join(ZERO_USER).join(ZERO_PROFILE).join("01006F8002326000");
        assert_eq!(result.target_path, Some(expected.clone()));
        assert_eq!(fs.read_bytes(&expected.join("main.dat")).unwrap(), b"island");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn jksv_bundle_preserves_structure_without_marker() {
        let device = device();
        let fs = device.env.fs.clone();
        let base = device.ext().join(EDEN_SAVE);
        fs.write_bytes(&base.join(ZERO_USER).join(PROFILE).join("x/old"), b"1")
            .unwrap();

        let bundle = device.root.path().join("jksv.zip");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&bundle).unwrap());
        let options = SimpleFileOptions::default();
        let mut meta = b"JKSV\0".to_vec();
        meta.extend_from_slice(&0x0100_ABCD_0000_0000_u64.to_le_bytes());
        zip.start_file(JKSV_META_FILE, options).unwrap();
        zip.write_all(&meta).unwrap();
        zip.start_file("slot/progress.bin", options).unwrap();
        zip.write_all(b"data").unwrap();
        zip.finish().unwrap();

        let context = SaveContext::new(2, "switch", "eden");
        let handler = PlatformHandler::for_platform("switch", device.env.clone());
        let result = handler.extract_download(&bundle, &context).await;
        let target = base.join(ZERO_USER).join(PROFILE).join("0100ABCD00000000");
        assert_eq!(result.target_path, Some(target.clone()));
        assert_eq!(fs.read_bytes(&target.join("slot/progress.bin")).unwrap(), b"data");
        assert!(!fs.exists(&target.join(JKSV_META_FILE)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn discover_rejects_non_application_ids() {
        let device = device();
        let handler = PlatformHandler::for_platform("switch", device.env.clone());
        let context = SaveContext::new(3, "switch", "eden").with_title_id("0200000000000000");
        assert_eq!(handler.discover(&context).await, None);
    }
}
