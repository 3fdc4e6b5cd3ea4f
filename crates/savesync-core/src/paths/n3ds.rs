//! 3DS save layout: `{id0}/{id1}/title/{category}/{shortId}/data`

use std::path::{Path, PathBuf};

use crate::fs::{FileAccess, file_name, newest_file_time};

const DEFAULT_CATEGORY: &str = "00040000";
const SDMC_SUFFIX: &str = "sdmc/Nintendo 3DS";

/// Normalized 3DS title identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct N3dsTitle {
    pub title_id: String,
    pub category: String,
    pub short_id: String,
}

impl N3dsTitle {
    pub fn parse(title_id: &str) -> Option<Self> {
        let title_id = title_id.trim().to_ascii_uppercase();
        if title_id.is_empty() || !title_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let category = if title_id.len() >= 16 {
            title_id[..8].to_string()
        } else {
            DEFAULT_CATEGORY.to_string()
        };
        let short_id = if title_id.len() > 8 {
            title_id[title_id.len() - 8..].to_string()
        } else {
            title_id.clone()
        };
        Some(Self {
            title_id,
            category,
            short_id,
        })
    }
}

/// Turn a user-chosen emulator folder into the `Nintendo 3DS` root
pub fn normalize_base_override(path: &Path) -> PathBuf {
    if path.ends_with(SDMC_SUFFIX) {
        path.to_path_buf()
    } else {
        path.join(SDMC_SUFFIX)
    }
}

pub struct N3dsResolver<'a> {
    fs: &'a dyn FileAccess,
}

impl<'a> N3dsResolver<'a> {
    pub const fn new(fs: &'a dyn FileAccess) -> Self {
        Self { fs }
    }

    fn subdirs(&self, dir: &Path) -> Vec<PathBuf> {
        self.fs
            .list_files(dir)
            .into_iter()
            .filter(|child| self.fs.is_directory(child))
            .collect()
    }

    /// Existing `data` folder for a title; newest contents win across ids
    pub fn find_save_folder(&self, base: &Path, title: &N3dsTitle) -> Option<PathBuf> {
        if !self.fs.is_directory(base) {
            tracing::debug!(path = %base.display(), "3DS base path does not exist");
            return None;
        }

        let mut best: Option<(i64, PathBuf)> = None;
        for id0 in self.subdirs(base) {
            for id1 in self.subdirs(&id0) {
                let title_root = id1.join("title");
                if !self.fs.is_directory(&title_root) {
                    continue;
                }
                for category in self.subdirs(&title_root) {
                    let Some(folder) = self
                        .subdirs(&category)
                        .into_iter()
                        .find(|dir| file_name(dir).eq_ignore_ascii_case(&title.short_id))
                    else {
                        continue;
                    };
                    let data = folder.join("data");
                    if !self.fs.is_directory(&data) {
                        continue;
                    }
                    let modified = newest_file_time(self.fs, &data).unwrap_or(0);
                    tracing::debug!(path = %data.display(), modified, "3DS save candidate");
                    if best.as_ref().is_none_or(|(time, _)| modified > *time) {
                        best = Some((modified, data));
                    }
                }
            }
        }
        best.map(|(_, path)| path)
    }

    /// Save path built from the first existing `id0`/`id1` pair
    ///
    /// Returns `None` rather than inventing filesystem ids.
    pub fn construct_save_path(&self, base: &Path, title: &N3dsTitle) -> Option<PathBuf> {
        let Some(id0) = self.subdirs(base).into_iter().next() else {
            tracing::debug!(base = %base.display(), "No id0 folder found");
            return None;
        };
        let Some(id1) = self.subdirs(&id0).into_iter().next() else {
            tracing::debug!(id0 = %id0.display(), "No id1 folder found");
            return None;
        };
        let path = id1
            .join("title")
            .join(&title.category)
            .join(&title.short_id)
            .join("data");
        tracing::debug!(path = %path.display(), "Constructed 3DS save path");
        Some(path)
    }
}
