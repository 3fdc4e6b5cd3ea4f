//! Save location resolution per console family
//!
//! Resolvers never fail: an unparsable identity or an unusable directory
//! yields `None` (or an empty list) and the caller treats the context as
//! unsupported.

pub mod file_based;
pub mod gamecube;
pub mod n3ds;
pub mod psp_vita;
pub mod registry;
pub mod retroarch_config;
pub mod switch;

use std::path::{Path, PathBuf};

use crate::fs::FileAccess;

pub use registry::{
    PathEnvironment, SavePathConfig, SavePathRegistry, canonical_platform, config_id_for_package,
    retroarch_core,
};

/// First candidate that is an existing directory, else the first candidate
/// so writers can create it
pub fn select_base(fs: &dyn FileAccess, candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|path| fs.is_directory(path))
        .or_else(|| candidates.first())
        .cloned()
}

/// Existing directories among `candidates`, in order
pub fn existing_dirs(fs: &dyn FileAccess, candidates: &[PathBuf]) -> Vec<PathBuf> {
    candidates
        .iter()
        .filter(|path| fs.is_directory(path))
        .cloned()
        .collect()
}

pub(crate) fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileAccess;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn select_base_prefers_existing_then_first() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        let missing = tmp.path().join("missing");
        let present = tmp.path().join("present");
        fs.mkdirs(&present).unwrap();

        assert_eq!(
            select_base(&fs, &[missing.clone(), present.clone()]),
            Some(present.clone())
        );
        assert_eq!(select_base(&fs, &[missing.clone()]), Some(missing.clone()));
        assert_eq!(select_base(&fs, &[]), None);
        assert_eq!(existing_dirs(&fs, &[missing, present.clone()]), vec![present]);
    }
}
