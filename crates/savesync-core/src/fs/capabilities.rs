//! Storage capability flags, detected once at start-up

use std::path::{Path, PathBuf};

/// Frozen answer to "which storage access paths work on this device".
///
/// Built once by [`StorageCapabilities::detect`] and shared behind an `Arc`;
/// nothing re-detects after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageCapabilities {
    restricted_roots: Vec<PathBuf>,
    alternate_root: Option<PathBuf>,
    alternate_usable: bool,
}

impl StorageCapabilities {
    /// Check whether `alternate_root` can stand in for the restricted roots.
    pub fn detect(restricted_roots: Vec<PathBuf>, alternate_root: Option<PathBuf>) -> Self {
        let alternate_usable = alternate_root
            .as_deref()
            .is_some_and(|root| std::fs::read_dir(root).is_ok());

        if alternate_root.is_some() && !alternate_usable {
            tracing::warn!(
                "Alternate storage root is not readable, restricted paths will be accessed directly"
            );
        } else if alternate_usable {
            tracing::debug!(
                roots = restricted_roots.len(),
                "Alternate storage access enabled"
            );
        }

        Self {
            restricted_roots,
            alternate_root,
            alternate_usable,
        }
    }

    pub const fn alternate_usable(&self) -> bool {
        self.alternate_usable
    }

    /// Path under the alternate root that mirrors `path`, when one applies
    pub fn alternate_path(&self, path: &Path) -> Option<PathBuf> {
        if !self.alternate_usable {
            return None;
        }
        let alternate_root = self.alternate_root.as_ref()?;
        self.restricted_roots.iter().find_map(|root| {
            path.strip_prefix(root)
                .ok()
                .map(|relative| alternate_root.join(relative))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unreadable_alternate_root_is_disabled() {
        let caps = StorageCapabilities::detect(
            vec![PathBuf::from("/storage/emulated/0/Android/data")],
            Some(PathBuf::from("/definitely/not/here")),
        );
        assert!(!caps.alternate_usable());
        assert_eq!(
            caps.alternate_path(Path::new("/storage/emulated/0/Android/data/x/save.srm")),
            None
        );
    }

    #[test]
    fn maps_restricted_paths_onto_alternate_root() {
        let alt = tempdir().unwrap();
        let caps = StorageCapabilities::detect(
            vec![PathBuf::from("/storage/emulated/0/Android/data")],
            Some(alt.path().to_path_buf()),
        );
        assert!(caps.alternate_usable());
        assert_eq!(
            caps.alternate_path(Path::new(
                "/storage/emulated/0/Android/data/org.ppsspp.ppsspp/files"
            )),
            Some(alt.path().join("org.ppsspp.ppsspp/files"))
        );
        assert_eq!(caps.alternate_path(Path::new("/storage/emulated/0/RetroArch")), None);
    }
}
