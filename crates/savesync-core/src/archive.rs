//! Save bundles and content hashing
//!
//! Bundles are plain zip files. Folder bundles carry the folder name as their
//! single root entry (`0100ABCD00000000/...`), which is the convention other
//! save managers for the same consoles use. Multi-file bundles are flat.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

const HARDCORE_MAGIC: &[u8; 8] = b"ARGOSY\x01\x00";
const HARDCORE_PAYLOAD: &[u8] = br#"{"h":true,"v":1}"#;

/// Check for a zip local-header, empty-archive or spanned-archive signature.
pub fn is_zip_bytes(header: &[u8]) -> bool {
    matches!(
        header,
        [b'P', b'K', 0x03, 0x04, ..] | [b'P', b'K', 0x05, 0x06, ..] | [b'P', b'K', 0x07, 0x08, ..]
    )
}

/// Sniff the first bytes of `path` for a zip signature.
pub fn is_zip_file(path: &Path) -> Result<bool> {
    let mut header = [0u8; 4];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;
    Ok(is_zip_bytes(&header[..read]))
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Relative path with `/` separators, as stored in zip entries.
fn zip_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Zip `source_dir` into `dest`, keeping the folder name as the root entry.
pub fn zip_folder(source_dir: &Path, dest: &Path) -> Result<()> {
    let root = source_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidInput(format!("no folder name: {}", source_dir.display())))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(File::create(dest)?);
    let options = file_options();
    zip.add_directory(format!("{root}/"), options)?;

    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| Error::InvalidInput(entry.path().display().to_string()))?;
        let name = format!("{root}/{}", zip_name(relative));

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else {
            zip.start_file(name, options)?;
            let mut reader = BufReader::new(File::open(entry.path())?);
            io::copy(&mut reader, &mut zip)?;
        }
    }

    zip.finish()?;
    Ok(())
}

/// Zip `files` flat into `dest`, each under its own file name.
pub fn zip_files(files: &[PathBuf], dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(File::create(dest)?);
    let options = file_options();

    for path in files {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidInput(format!("no file name: {}", path.display())))?;
        zip.start_file(name, options)?;
        let mut reader = BufReader::new(File::open(path)?);
        io::copy(&mut reader, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    Ok(ZipArchive::new(BufReader::new(File::open(path)?))?)
}

/// Name of the first entry's top-level folder, if the bundle has one.
pub fn peek_root_folder_name(path: &Path) -> Result<Option<String>> {
    let mut archive = open_archive(path)?;
    if archive.is_empty() {
        return Ok(None);
    }
    let first = archive.by_index(0)?;
    Ok(first
        .name()
        .split_once('/')
        .map(|(root, _)| root.to_string())
        .filter(|root| !root.is_empty()))
}

/// Read one entry by exact name.
pub fn read_entry(path: &Path, entry_name: &str) -> Result<Option<Vec<u8>>> {
    let mut archive = open_archive(path)?;
    let result = match archive.by_name(entry_name) {
        Ok(mut entry) => {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            Some(bytes)
        }
        Err(zip::result::ZipError::FileNotFound) => None,
        Err(error) => return Err(error.into()),
    };
    Ok(result)
}

/// Names of every entry in archive order.
pub fn entry_names(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_archive(path)?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        names.push(archive.by_index(index)?.name().to_string());
    }
    Ok(names)
}

/// Join `relative` under `dest`, refusing anything that escapes it.
fn safe_join(dest: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let escapes = relative.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || relative.as_os_str().is_empty() {
        None
    } else {
        Some(dest.join(relative))
    }
}

fn extract_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    dest: &Path,
    rename: impl Fn(&str) -> Option<String>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest)?;
    let mut written = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = rename(entry.name()) else {
            continue;
        };
        let Some(target) = safe_join(dest, &relative) else {
            tracing::warn!(entry = entry.name(), "Skipping zip entry outside destination");
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        out.flush()?;
        written.push(target);
    }

    Ok(written)
}

/// Extract a folder bundle into `dest`, stripping the bundle's root folder.
pub fn unzip_single_folder(path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open_archive(path)?;

    let mut root: Option<String> = None;
    for index in 0..archive.len() {
        let name = archive.by_index(index)?.name().to_string();
        if let Some((first, _)) = name.split_once('/') {
            root = Some(format!("{first}/"));
            break;
        }
    }

    extract_entries(&mut archive, dest, |name| {
        let stripped = match &root {
            Some(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(name),
            None => name,
        };
        let stripped = stripped.trim_end_matches('/');
        (!stripped.is_empty()).then(|| stripped.to_string())
    })
}

/// Extract a bundle into `dest` keeping its structure, minus skipped entries.
pub fn unzip_preserving(
    path: &Path,
    dest: &Path,
    skip: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>> {
    let mut archive = open_archive(path)?;
    extract_entries(&mut archive, dest, |name| {
        let trimmed = name.trim_end_matches('/');
        (!skip(name) && !trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Extract entries accepted by `select`, each to the path it returns.
pub fn unzip_selected(
    path: &Path,
    select: impl Fn(&str) -> Option<PathBuf>,
) -> Result<Vec<PathBuf>> {
    let mut archive = open_archive(path)?;
    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(target) = select(entry.name()) else {
            continue;
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        out.flush()?;
        written.push(target);
    }
    Ok(written)
}

fn sha256_reader(mut reader: impl Read) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex digest of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex digest of a file's bytes.
pub fn hash_file(path: &Path) -> Result<String> {
    sha256_reader(BufReader::new(File::open(path)?))
}

fn hash_listing(mut lines: Vec<(String, String)>) -> String {
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    let listing = lines
        .iter()
        .map(|(name, digest)| format!("{name}:{digest}"))
        .collect::<Vec<_>>()
        .join("\n");
    hash_bytes(listing.as_bytes())
}

/// Digest of a bundle's contents, independent of compression and entry order.
pub fn hash_zip(path: &Path) -> Result<String> {
    let mut archive = open_archive(path)?;
    let mut lines = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        lines.push((name, sha256_reader(entry)?));
    }
    Ok(hash_listing(lines))
}

/// Same digest [`hash_zip`] would give for `zip_folder(dir)`, without zipping.
pub fn hash_folder(dir: &Path) -> Result<String> {
    let root = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut lines = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| Error::InvalidInput(entry.path().display().to_string()))?;
        lines.push((
            format!("{root}/{}", zip_name(relative)),
            hash_file(entry.path())?,
        ));
    }
    Ok(hash_listing(lines))
}

/// Digest of whatever `path` is: folder, bundle or plain file.
pub fn content_hash(path: &Path) -> Result<String> {
    if path.is_dir() {
        hash_folder(path)
    } else if is_zip_file(path)? {
        hash_zip(path)
    } else {
        hash_file(path)
    }
}

/// Append the hardcore-mode trailer to a save file.
pub fn append_hardcore_trailer(path: &Path) -> Result<()> {
    let mut file = fs::OpenOptions::new().append(true).open(path)?;
    let len = u32::try_from(HARDCORE_PAYLOAD.len()).unwrap_or(u32::MAX);
    file.write_all(HARDCORE_PAYLOAD)?;
    file.write_all(&len.to_le_bytes())?;
    file.write_all(HARDCORE_MAGIC)?;
    Ok(())
}

/// Byte length of the trailer at the end of `bytes`, if one is present.
fn trailer_len(bytes: &[u8]) -> Option<usize> {
    let magic_start = bytes.len().checked_sub(HARDCORE_MAGIC.len())?;
    if &bytes[magic_start..] != HARDCORE_MAGIC {
        return None;
    }
    let len_start = magic_start.checked_sub(4)?;
    let len_bytes: [u8; 4] = bytes[len_start..magic_start].try_into().ok()?;
    let payload_len = usize::try_from(u32::from_le_bytes(len_bytes)).ok()?;
    len_start.checked_sub(payload_len)?;
    Some(payload_len + 4 + HARDCORE_MAGIC.len())
}

/// Whether the save was produced under hardcore achievement rules.
pub fn has_hardcore_trailer(bytes: &[u8]) -> bool {
    trailer_len(bytes).is_some()
}

/// Remove the hardcore trailer in place; returns whether one was removed.
pub fn strip_hardcore_trailer(path: &Path) -> Result<bool> {
    let bytes = fs::read(path)?;
    match trailer_len(&bytes) {
        Some(len) => {
            fs::write(path, &bytes[..bytes.len() - len])?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn zip_magic_detection() {
        assert!(is_zip_bytes(b"PK\x03\x04rest"));
        assert!(is_zip_bytes(b"PK\x05\x06"));
        assert!(!is_zip_bytes(b"PK"));
        assert!(!is_zip_bytes(b"GALE01"));
    }

    #[test]
    fn folder_bundle_keeps_root_and_restores_tree() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("0100ABCD00000000");
        write(&source.join("save.dat"), b"main");
        write(&source.join("sub/extra.bin"), b"extra");

        let bundle = tmp.path().join("bundle.zip");
        zip_folder(&source, &bundle).unwrap();

        assert_eq!(
            peek_root_folder_name(&bundle).unwrap().as_deref(),
            Some("0100ABCD00000000")
        );
        assert_eq!(hash_zip(&bundle).unwrap(), hash_folder(&source).unwrap());
        assert_eq!(content_hash(&bundle).unwrap(), content_hash(&source).unwrap());

        let dest = tmp.path().join("restored");
        unzip_single_folder(&bundle, &dest).unwrap();
        assert_eq!(fs::read(dest.join("save.dat")).unwrap(), b"main");
        assert_eq!(fs::read(dest.join("sub/extra.bin")).unwrap(), b"extra");
    }

    #[test]
    fn flat_bundle_has_no_root_folder() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("USA/Card A/01-GALE-a.gci");
        let b = tmp.path().join("USA/01-GALE-b.gci");
        write(&a, b"a");
        write(&b, b"b");

        let bundle = tmp.path().join("gc.zip");
        zip_files(&[a, b], &bundle).unwrap();
        assert_eq!(peek_root_folder_name(&bundle).unwrap(), None);
        assert_eq!(
            entry_names(&bundle).unwrap(),
            vec!["01-GALE-a.gci".to_string(), "01-GALE-b.gci".to_string()]
        );
        assert_eq!(read_entry(&bundle, "01-GALE-b.gci").unwrap().unwrap(), b"b");
        assert_eq!(read_entry(&bundle, "missing").unwrap(), None);
    }

    #[test]
    fn unzip_preserving_skips_entries() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("0100ABCD00000000");
        write(&source.join(".nx_save_meta.bin"), b"JKSV");
        write(&source.join("save.dat"), b"x");
        let bundle = tmp.path().join("jksv.zip");
        zip_folder(&source, &bundle).unwrap();

        let dest = tmp.path().join("out");
        unzip_preserving(&bundle, &dest, |name| name.ends_with(".nx_save_meta.bin")).unwrap();
        assert!(dest.join("0100ABCD00000000/save.dat").exists());
        assert!(!dest.join("0100ABCD00000000/.nx_save_meta.bin").exists());
    }

    #[test]
    fn traversal_entries_are_rejected() {
        let tmp = tempdir().unwrap();
        assert_eq!(safe_join(tmp.path(), "../evil"), None);
        assert_eq!(safe_join(tmp.path(), "/etc/passwd"), None);
        assert_eq!(safe_join(tmp.path(), "ok/file"), Some(tmp.path().join("ok/file")));
    }

    #[test]
    fn hash_is_stable_for_identical_bytes() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.srm");
        let b = tmp.path().join("b.srm");
        write(&a, &[7u8; 128]);
        write(&b, &[7u8; 128]);
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        assert_eq!(hash_file(&a).unwrap(), hash_bytes(&[7u8; 128]));
    }

    #[test]
    fn hardcore_trailer_append_detect_strip() {
        let tmp = tempdir().unwrap();
        let save = tmp.path().join("game.srm");
        write(&save, b"savedata");

        append_hardcore_trailer(&save).unwrap();
        assert!(has_hardcore_trailer(&fs::read(&save).unwrap()));

        assert!(strip_hardcore_trailer(&save).unwrap());
        assert_eq!(fs::read(&save).unwrap(), b"savedata");
        assert!(!strip_hardcore_trailer(&save).unwrap());
    }
}
