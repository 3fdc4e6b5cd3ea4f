//! File access over device storage roots
//!
//! Handlers and resolvers never touch `std::fs` directly. They go through
//! [`FileAccess`] so restricted storage can fall back to an alternate access
//! path without the caller knowing which one succeeded.

mod capabilities;
mod local;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub use capabilities::StorageCapabilities;
pub use local::LocalFileAccess;

/// Byte-level access to arbitrary absolute paths
pub trait FileAccess: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_directory(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    /// File size in bytes, 0 when unknown
    fn length(&self, path: &Path) -> u64;

    /// Modification time in Unix ms
    fn last_modified(&self, path: &Path) -> Option<i64>;

    /// Direct children of a directory, sorted by name
    fn list_files(&self, path: &Path) -> Vec<PathBuf>;

    fn mkdirs(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or a whole directory tree
    fn delete(&self, path: &Path) -> io::Result<()>;

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Copy `from` over `to`, creating parents of `to`
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Read at most `len` bytes from the start of a file
    fn read_prefix(&self, path: &Path, len: usize) -> io::Result<Vec<u8>> {
        let reader = self.open_read(path)?;
        let mut buf = Vec::with_capacity(len);
        reader.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Newest file modification time anywhere under `dir`
pub fn newest_file_time(fs: &dyn FileAccess, dir: &Path) -> Option<i64> {
    let mut newest: Option<i64> = None;
    for child in fs.list_files(dir) {
        let time = if fs.is_directory(&child) {
            newest_file_time(fs, &child)
        } else {
            fs.last_modified(&child)
        };
        if let Some(time) = time {
            newest = Some(newest.map_or(time, |current| current.max(time)));
        }
    }
    newest
}

/// Every regular file under `dir`, depth first
pub fn list_files_recursive(fs: &dyn FileAccess, dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for child in fs.list_files(dir) {
        if fs.is_directory(&child) {
            files.extend(list_files_recursive(fs, &child));
        } else {
            files.push(child);
        }
    }
    files
}

/// Lowercased file name of `path`
pub(crate) fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// File name of `path` as an owned string
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
