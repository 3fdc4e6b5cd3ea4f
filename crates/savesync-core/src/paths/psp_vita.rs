//! PSP and Vita save folders, one first-level folder per title

use std::path::{Path, PathBuf};

use crate::fs::{FileAccess, file_name};

/// How a title id is compared against save folder names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleMatch {
    /// Vita: folder name equals the title id
    Exact,
    /// PSP: folder names carry slot suffixes after the title id
    Prefix,
}

impl TitleMatch {
    pub fn matches(self, folder: &str, title_id: &str) -> bool {
        let folder = folder.to_ascii_uppercase();
        let title_id = title_id.to_ascii_uppercase();
        match self {
            Self::Exact => folder == title_id,
            Self::Prefix => folder.starts_with(&title_id),
        }
    }
}

pub struct TitleFolderResolver<'a> {
    fs: &'a dyn FileAccess,
    mode: TitleMatch,
}

impl<'a> TitleFolderResolver<'a> {
    pub const fn new(fs: &'a dyn FileAccess, mode: TitleMatch) -> Self {
        Self { fs, mode }
    }

    /// Every matching save folder directly under `base`, sorted by name
    pub fn find_all(&self, base: &Path, title_id: &str) -> Vec<PathBuf> {
        if !self.fs.is_directory(base) {
            tracing::debug!(base = %base.display(), "Save base path does not exist");
            return Vec::new();
        }
        self.fs
            .list_files(base)
            .into_iter()
            .filter(|child| self.fs.is_directory(child))
            .filter(|child| self.mode.matches(&file_name(child), title_id))
            .collect()
    }

    pub fn find_save_folder(&self, base: &Path, title_id: &str) -> Option<PathBuf> {
        let found = self.find_all(base, title_id).into_iter().next();
        match &found {
            Some(path) => tracing::debug!(path = %path.display(), "Save folder found"),
            None => tracing::debug!(base = %base.display(), title_id, "No save folder found"),
        }
        found
    }

    pub fn construct_save_path(base: &Path, folder_name: &str) -> PathBuf {
        base.join(folder_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileAccess;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn psp_matches_slot_suffixed_folders() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        fs.mkdirs(&tmp.path().join("ULUS10041DATA00")).unwrap();
        fs.mkdirs(&tmp.path().join("ULUS10041SYSDATA")).unwrap();
        fs.mkdirs(&tmp.path().join("ULES00001")).unwrap();

        let resolver = TitleFolderResolver::new(&fs, TitleMatch::Prefix);
        assert_eq!(
            resolver.find_all(tmp.path(), "ulus10041"),
            vec![
                tmp.path().join("ULUS10041DATA00"),
                tmp.path().join("ULUS10041SYSDATA")
            ]
        );
    }

    #[test]
    fn vita_requires_exact_name() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        fs.mkdirs(&tmp.path().join("PCSE00000X")).unwrap();
        fs.mkdirs(&tmp.path().join("PCSE00000")).unwrap();

        let resolver = TitleFolderResolver::new(&fs, TitleMatch::Exact);
        assert_eq!(
            resolver.find_save_folder(tmp.path(), "pcse00000"),
            Some(tmp.path().join("PCSE00000"))
        );
        assert_eq!(resolver.find_save_folder(&tmp.path().join("nope"), "PCSE00000"), None);
    }
}
