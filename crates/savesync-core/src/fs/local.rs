//! `std::fs` backed file access with restricted-path fallback

use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use super::{FileAccess, StorageCapabilities};

/// Local filesystem access.
///
/// Every operation is tried on the requested path first. A permission
/// failure under a restricted root is retried on the mirrored alternate path
/// when the capabilities allow it.
#[derive(Debug, Clone, Default)]
pub struct LocalFileAccess {
    capabilities: Arc<StorageCapabilities>,
}

impl LocalFileAccess {
    pub const fn new(capabilities: Arc<StorageCapabilities>) -> Self {
        Self { capabilities }
    }

    fn with_fallback<T>(&self, path: &Path, op: impl Fn(&Path) -> io::Result<T>) -> io::Result<T> {
        match op(path) {
            Err(error) if error.kind() == ErrorKind::PermissionDenied => {
                match self.capabilities.alternate_path(path) {
                    Some(alternate) => {
                        tracing::debug!(
                            path = %path.display(),
                            alternate = %alternate.display(),
                            "Direct access denied, using alternate storage path"
                        );
                        op(&alternate)
                    }
                    None => Err(error),
                }
            }
            other => other,
        }
    }

    fn metadata(&self, path: &Path) -> Option<fs::Metadata> {
        self.with_fallback(path, |target| fs::metadata(target)).ok()
    }
}

impl FileAccess for LocalFileAccess {
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_some()
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.metadata(path).is_some_and(|meta| meta.is_dir())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.metadata(path).is_some_and(|meta| meta.is_file())
    }

    fn length(&self, path: &Path) -> u64 {
        self.metadata(path).map_or(0, |meta| meta.len())
    }

    fn last_modified(&self, path: &Path) -> Option<i64> {
        let modified = self.metadata(path)?.modified().ok()?;
        let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
        i64::try_from(millis).ok()
    }

    fn list_files(&self, path: &Path) -> Vec<PathBuf> {
        let listed = self.with_fallback(path, |dir| {
            let mut names = Vec::new();
            for entry in fs::read_dir(dir)? {
                names.push(entry?.file_name());
            }
            Ok(names)
        });

        // children are reported under the requested path, not the alternate one
        let mut children: Vec<PathBuf> = listed
            .unwrap_or_default()
            .into_iter()
            .map(|name| path.join(name))
            .collect();
        children.sort();
        children
    }

    fn mkdirs(&self, path: &Path) -> io::Result<()> {
        self.with_fallback(path, |target| fs::create_dir_all(target))
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        self.with_fallback(path, |target| {
            if fs::symlink_metadata(target)?.is_dir() {
                fs::remove_dir_all(target)
            } else {
                fs::remove_file(target)
            }
        })
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.with_fallback(path, |target| fs::read(target))
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.with_fallback(path, |target| {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, bytes)
        })
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut reader = self.open_read(from)?;
        let mut writer = self.open_write(to)?;
        let copied = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(copied)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let file = self.with_fallback(path, |target| fs::File::open(target))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let file = self.with_fallback(path, |target| {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::File::create(target)
        })?;
        Ok(Box::new(io::BufWriter::new(file)))
    }
}
