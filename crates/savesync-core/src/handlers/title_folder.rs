use std::path::{Path, PathBuf};

use super::{BundleLayout, HandlerEnv, bundle_folder, restore_folder};
use crate::archive;
use crate::models::{ExtractResult, PreparedSave, SaveContext};
use crate::paths::psp_vita::{TitleFolderResolver, TitleMatch};
use crate::paths::select_base;

/// PSP and Vita saves: one folder per title under a shared base
#[derive(Clone)]
pub struct TitleFolderSaveHandler {
    env: HandlerEnv,
    mode: TitleMatch,
}

impl TitleFolderSaveHandler {
    pub const fn new(env: HandlerEnv, mode: TitleMatch) -> Self {
        Self { env, mode }
    }

    const fn label(&self) -> &'static str {
        match self.mode {
            TitleMatch::Prefix => "PSP",
            TitleMatch::Exact => "Vita",
        }
    }

    fn resolver(&self) -> TitleFolderResolver<'_> {
        TitleFolderResolver::new(self.env.fs.as_ref(), self.mode)
    }

    pub fn discover(&self, context: &SaveContext) -> Option<PathBuf> {
        let title_id = context.title_id.as_deref()?;
        let resolver = self.resolver();
        self.env
            .candidates(context)
            .iter()
            .find_map(|base| resolver.find_save_folder(base, title_id))
    }

    pub fn prepare(&self, local_path: &Path, _context: &SaveContext) -> Option<PreparedSave> {
        if !self.env.fs.is_directory(local_path) {
            tracing::debug!(path = %local_path.display(), "{} save folder does not exist", self.label());
            return None;
        }
        let prefix = self.label().to_ascii_lowercase();
        let bundle = bundle_folder(&self.env, local_path, &prefix)?;
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
                let Some(base) = select_base(self.env.fs.as_ref(), &self.env.candidates(context)) else {
                    return ExtractResult::failed(format!("No base path for {} saves", self.label()));
                };
                // PSP bundles carry the slot folder name, which is more than the title id
                let folder = archive::peek_root_folder_name(temp_file)
                    .ok()
                    .flatten()
                    .or_else(|| context.title_id.clone());
                let Some(folder) = folder else {
                    return ExtractResult::failed(format!("No title ID for {} save", self.label()));
                };
                TitleFolderResolver::construct_save_path(&base, &folder)
            }
        };
        restore_folder(&self.env, temp_file, &target, BundleLayout::SingleFolder)
    }
}
