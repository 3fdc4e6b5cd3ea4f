//! Platform save handlers
//!
//! [`PlatformHandler`] is the closed set of console families. Each one turns
//! an on-device save into a single transferable file and writes a downloaded
//! file back into place. Handler failures never escape as `Err`: preparation
//! yields `None` and extraction yields a failed [`ExtractResult`].

mod file_based;
mod gamecube;
mod n3ds;
mod switch;
mod title_folder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use file_based::FileSaveHandler;
pub use gamecube::GciSaveHandler;
pub use n3ds::N3dsSaveHandler;
pub use switch::SwitchSaveHandler;
pub use title_folder::TitleFolderSaveHandler;

use crate::fs::{FileAccess, list_files_recursive};
use crate::models::{ExtractResult, PreparedSave, SaveContext};
use crate::paths::psp_vita::TitleMatch;
use crate::paths::{SavePathConfig, SavePathRegistry, canonical_platform, config_id_for_package};

/// The two operations every console family supports
#[allow(async_fn_in_trait)]
pub trait SaveHandler {
    /// Package the on-device save at `local_path` into one file
    ///
    /// Returns `None` when there is no local save for this context.
    async fn prepare_for_upload(&self, local_path: &Path, context: &SaveContext) -> Option<PreparedSave>;

    /// Write a downloaded file to its on-device destination
    async fn extract_download(&self, temp_file: &Path, context: &SaveContext) -> ExtractResult;
}

/// Shared collaborators for every handler
#[derive(Clone)]
pub struct HandlerEnv {
    pub fs: Arc<dyn FileAccess>,
    pub registry: Arc<SavePathRegistry>,
    /// Where prepared bundles and staging folders are written
    pub temp_dir: PathBuf,
}

impl HandlerEnv {
    pub fn new(fs: Arc<dyn FileAccess>, registry: Arc<SavePathRegistry>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            registry,
            temp_dir: temp_dir.into(),
        }
    }

    /// Registry entry for the context, by installed package before emulator id
    pub fn config_for(&self, context: &SaveContext) -> Option<&'static SavePathConfig> {
        context
            .emulator_package
            .as_deref()
            .and_then(config_id_for_package)
            .and_then(|id| self.registry.config(id))
            .or_else(|| self.registry.config(&context.emulator_id))
    }

    /// Candidate directories for the context, user override first
    pub fn candidates(&self, context: &SaveContext) -> Vec<PathBuf> {
        self.config_for(context).map_or_else(Vec::new, |config| {
            self.registry.resolve_candidates(
                config,
                &context.platform_slug,
                context.emulator_package.as_deref(),
            )
        })
    }

    pub fn user_override(&self, context: &SaveContext) -> Option<PathBuf> {
        let config = self.config_for(context)?;
        self.registry.user_override(config.emulator_id).cloned()
    }

    /// Fresh path under the temp dir
    pub fn temp_path(&self, prefix: &str, extension: &str) -> PathBuf {
        let name = format!("{prefix}_{}", uuid::Uuid::now_v7().simple());
        let name = if extension.is_empty() {
            name
        } else {
            format!("{name}.{extension}")
        };
        self.temp_dir.join(name)
    }

    /// Copy a save folder into a local staging dir so it can be archived
    pub(crate) fn stage_folder(&self, source: &Path) -> std::io::Result<Staging> {
        let staging = Staging::new(self.temp_path("stage", ""))?;
        let root = staging.path().join(source.file_name().unwrap_or(source.as_os_str()));
        std::fs::create_dir_all(&root)?;
        for file in list_files_recursive(self.fs.as_ref(), source) {
            let Ok(relative) = file.strip_prefix(source) else {
                continue;
            };
            let bytes = self.fs.read_bytes(&file)?;
            let target = root.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, bytes)?;
        }
        for dir in walk_dirs(self.fs.as_ref(), source) {
            if let Ok(relative) = dir.strip_prefix(source) {
                std::fs::create_dir_all(root.join(relative))?;
            }
        }
        Ok(staging)
    }

    /// Copy every file under a staged folder into `dest`, keeping layout
    pub(crate) fn install_tree(&self, staged: &Path, dest: &Path) -> std::io::Result<Vec<PathBuf>> {
        self.fs.mkdirs(dest)?;
        let mut written = Vec::new();
        for entry in walkdir::WalkDir::new(staged).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::other)?;
            let Ok(relative) = entry.path().strip_prefix(staged) else {
                continue;
            };
            let target = dest.join(relative);
            if entry.file_type().is_dir() {
                self.fs.mkdirs(&target)?;
            } else {
                self.fs.write_bytes(&target, &std::fs::read(entry.path())?)?;
                written.push(target);
            }
        }
        Ok(written)
    }
}

fn walk_dirs(fs: &dyn FileAccess, dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for child in fs.list_files(dir) {
        if fs.is_directory(&child) {
            dirs.extend(walk_dirs(fs, &child));
            dirs.push(child);
        }
    }
    dirs
}

/// Temporary local directory removed on drop
pub(crate) struct Staging {
    path: PathBuf,
}

impl Staging {
    pub(crate) fn new(path: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_dir_all(&self.path) {
            tracing::debug!(path = %self.path.display(), %error, "Failed to remove staging dir");
        }
    }
}

/// Console family selected by platform slug
#[derive(Clone)]
pub enum PlatformHandler {
    GameCube(GciSaveHandler),
    N3ds(N3dsSaveHandler),
    Switch(SwitchSaveHandler),
    Psp(TitleFolderSaveHandler),
    Vita(TitleFolderSaveHandler),
    File(FileSaveHandler),
}

impl PlatformHandler {
    /// Handler for a platform slug; anything unrecognized is file based
    pub fn for_platform(platform_slug: &str, env: HandlerEnv) -> Self {
        match canonical_platform(platform_slug).as_str() {
            "gc" => Self::GameCube(GciSaveHandler::new(env)),
            "3ds" => Self::N3ds(N3dsSaveHandler::new(env)),
            "switch" => Self::Switch(SwitchSaveHandler::new(env)),
            "psp" => Self::Psp(TitleFolderSaveHandler::new(env, TitleMatch::Prefix)),
            "psvita" => Self::Vita(TitleFolderSaveHandler::new(env, TitleMatch::Exact)),
            _ => Self::File(FileSaveHandler::new(env)),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::GameCube(_) => "gamecube",
            Self::N3ds(_) => "3ds",
            Self::Switch(_) => "switch",
            Self::Psp(_) => "psp",
            Self::Vita(_) => "vita",
            Self::File(_) => "file",
        }
    }

    /// Locate the existing on-device save for a context
    pub async fn discover(&self, context: &SaveContext) -> Option<PathBuf> {
        let handler = self.clone();
        let context = context.clone();
        run_blocking(move || handler.discover_blocking(&context))
            .await
            .flatten()
    }

    fn discover_blocking(&self, context: &SaveContext) -> Option<PathBuf> {
        match self {
            Self::GameCube(handler) => handler.discover(context),
            Self::N3ds(handler) => handler.discover(context),
            Self::Switch(handler) => handler.discover(context),
            Self::Psp(handler) | Self::Vita(handler) => handler.discover(context),
            Self::File(handler) => handler.discover(context),
        }
    }

    fn prepare_blocking(&self, local_path: &Path, context: &SaveContext) -> Option<PreparedSave> {
        match self {
            Self::GameCube(handler) => handler.prepare(local_path, context),
            Self::N3ds(handler) => handler.prepare(local_path, context),
            Self::Switch(handler) => handler.prepare(local_path, context),
            Self::Psp(handler) | Self::Vita(handler) => handler.prepare(local_path, context),
            Self::File(handler) => handler.prepare(local_path, context),
        }
    }

    fn extract_blocking(&self, temp_file: &Path, context: &SaveContext) -> ExtractResult {
        match self {
            Self::GameCube(handler) => handler.extract(temp_file, context),
            Self::N3ds(handler) => handler.extract(temp_file, context),
            Self::Switch(handler) => handler.extract(temp_file, context),
            Self::Psp(handler) | Self::Vita(handler) => handler.extract(temp_file, context),
            Self::File(handler) => handler.extract(temp_file, context),
        }
    }
}

impl SaveHandler for PlatformHandler {
    async fn prepare_for_upload(&self, local_path: &Path, context: &SaveContext) -> Option<PreparedSave> {
        let handler = self.clone();
        let local_path = local_path.to_path_buf();
        let context = context.clone();
        run_blocking(move || handler.prepare_blocking(&local_path, &context))
            .await
            .flatten()
    }

    async fn extract_download(&self, temp_file: &Path, context: &SaveContext) -> ExtractResult {
        let handler = self.clone();
        let temp_file = temp_file.to_path_buf();
        let context = context.clone();
        run_blocking(move || handler.extract_blocking(&temp_file, &context))
            .await
            .unwrap_or_else(|| ExtractResult::failed("Extraction task did not complete"))
    }
}

/// Run handler I/O on the blocking pool
async fn run_blocking<T, F>(work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(%error, "Save handler task failed");
            None
        }
    }
}

/// Zip a staged copy of `folder` into a temp bundle named after the folder
pub(crate) fn bundle_folder(env: &HandlerEnv, folder: &Path, prefix: &str) -> Option<PathBuf> {
    let staging = match env.stage_folder(folder) {
        Ok(staging) => staging,
        Err(error) => {
            tracing::warn!(path = %folder.display(), %error, "Failed to stage save folder");
            return None;
        }
    };
    let staged = staging.path().join(folder.file_name()?);
    let output = env.temp_path(prefix, "zip");
    match crate::archive::zip_folder(&staged, &output) {
        Ok(()) => Some(output),
        Err(error) => {
            tracing::warn!(path = %folder.display(), %error, "Failed to zip save folder");
            None
        }
    }
}

/// How a folder bundle maps onto its destination
#[derive(Debug, Clone, Copy)]
pub(crate) enum BundleLayout {
    /// One root folder whose contents become the destination
    SingleFolder,
    /// Entries land as-is, minus the named marker files
    Preserving(&'static [&'static str]),
}

/// Replace the folder at `target` with the contents of a folder bundle
///
/// The bundle is unpacked to staging first, so a corrupt download leaves
/// the existing save untouched.
pub(crate) fn restore_folder(
    env: &HandlerEnv,
    bundle: &Path,
    target: &Path,
    layout: BundleLayout,
) -> ExtractResult {
    let staging = match Staging::new(env.temp_path("restore", "")) {
        Ok(staging) => staging,
        Err(error) => return ExtractResult::failed(format!("Cannot create staging dir: {error}")),
    };
    let unpacked = match layout {
        BundleLayout::SingleFolder => crate::archive::unzip_single_folder(bundle, staging.path()),
        BundleLayout::Preserving(skip) => crate::archive::unzip_preserving(bundle, staging.path(), |name| {
            skip.iter().any(|marker| name.rsplit('/').next() == Some(*marker))
        }),
    };
    if let Err(error) = unpacked {
        tracing::warn!(bundle = %bundle.display(), %error, "Unzip failed");
        return ExtractResult::failed(format!("Failed to extract save bundle: {error}"));
    }

    if env.fs.exists(target) {
        if let Err(error) = env.fs.delete(target) {
            return ExtractResult::failed(format!("Failed to clear {}: {error}", target.display()));
        }
    }
    match env.install_tree(staging.path(), target) {
        Ok(written) => {
            tracing::debug!(target = %target.display(), files = written.len(), "Save folder restored");
            ExtractResult::ok(target.to_path_buf())
        }
        Err(error) => ExtractResult::failed(format!("Failed to write save folder: {error}")),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fs::LocalFileAccess;
    use crate::paths::PathEnvironment;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    pub(crate) struct Device {
        pub root: TempDir,
        pub env: HandlerEnv,
    }

    impl Device {
        pub(crate) fn ext(&self) -> PathBuf {
            self.root.path().join("sdcard")
        }
    }

    pub(crate) fn device_with(registry: impl FnOnce(SavePathRegistry) -> SavePathRegistry) -> Device {
        let root = tempfile::tempdir().unwrap();
        let ext = root.path().join("sdcard");
        let temp = root.path().join("tmp");
        std::fs::create_dir_all(&ext).unwrap();
        std::fs::create_dir_all(&temp).unwrap();
        let registry = registry(SavePathRegistry::new(PathEnvironment {
            ext_storage: ext,
            files_dir: Some(root.path().join("files")),
        }));
        let env = HandlerEnv::new(Arc::new(LocalFileAccess::default()), Arc::new(registry), temp);
        Device { root, env }
    }

    pub(crate) fn device() -> Device {
        device_with(|registry| registry)
    }

    #[test]
    fn routing_by_platform_slug() {
        let device = device();
        let name = |slug: &str| PlatformHandler::for_platform(slug, device.env.clone()).name();
        assert_eq!(name("ngc"), "gamecube");
        assert_eq!(name("3ds"), "3ds");
        assert_eq!(name("switch"), "switch");
        assert_eq!(name("psp"), "psp");
        assert_eq!(name("vita"), "vita");
        assert_eq!(name("snes"), "file");
    }

    #[test]
    fn config_lookup_prefers_package() {
        let device = device();
        let context = SaveContext::new(1, "gc", "dolphin").with_package("org.dolphinemu.mmjr");
        assert_eq!(device.env.config_for(&context).unwrap().emulator_id, "dolphin_mmjr");
        let context = SaveContext::new(1, "gc", "dolphin");
        assert_eq!(device.env.config_for(&context).unwrap().emulator_id, "dolphin");
    }

    #[test]
    fn stage_and_install_round_trip() {
        let device = device();
        let fs = device.env.fs.clone();
        let source = device.ext().join("save/0100ABCD00000000");
        fs.write_bytes(&source.join("a.bin"), b"a").unwrap();
        fs.write_bytes(&source.join("sub/b.bin"), b"b").unwrap();
        fs.mkdirs(&source.join("empty")).unwrap();

        let staging = device.env.stage_folder(&source).unwrap();
        let staged = staging.path().join("0100ABCD00000000");
        let dest = device.ext().join("restored");
        let written = device.env.install_tree(&staged, &dest).unwrap();

        assert_eq!(written, vec![dest.join("a.bin"), dest.join("sub/b.bin")]);
        assert!(fs.is_directory(&dest.join("empty")));
        let staging_path = staging.path().to_path_buf();
        drop(staging);
        assert!(!staging_path.exists());
    }
}
