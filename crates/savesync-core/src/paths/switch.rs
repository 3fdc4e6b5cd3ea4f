//! Switch NAND save layout: `{base}/{user16}/{profile}/{titleId}`

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::fs::{FileAccess, file_name, newest_file_time};
use crate::util::is_hex_of_len;

/// Titles whose saves belong to the device rather than a user account
pub const DEVICE_SAVE_TITLE_IDS: [&str; 9] = [
    "01006F8002326000",
    "0100D2F00D5C0000",
    "01000320000CC000",
    "01002FF008C24000",
    "0100C4B0034B2000",
    "01009AB0034E0000",
    "01001E9003502000",
    "0100165003504000",
    "0100C1800A9B6000",
];

pub const ZERO_USER: &str = "0000000000000000";
pub const ZERO_PROFILE: &str = "00000000000000000000000000000000";

/// Per-file metadata marker written by JKSV bundles
pub const JKSV_META_FILE: &str = ".nx_save_meta.bin";
const JKSV_MAGIC: &[u8] = b"JKSV";
const JKSV_TITLE_ID_OFFSETS: [usize; 3] = [5, 4, 6];

const NAND_SAVE_SUFFIX: &str = "nand/user/save";

pub fn is_valid_title_id(title_id: &str) -> bool {
    is_hex_of_len(title_id, 16) && title_id.starts_with("01")
}

pub fn is_valid_user_folder(name: &str) -> bool {
    is_hex_of_len(name, 16)
}

pub fn is_valid_profile_folder(name: &str) -> bool {
    is_hex_of_len(name, 16) || is_hex_of_len(name, 32)
}

pub fn is_device_save(title_id: &str) -> bool {
    let upper = title_id.to_ascii_uppercase();
    DEVICE_SAVE_TITLE_IDS.contains(&upper.as_str())
}

/// Whether a remembered path still has the `<user>/<profile>/<titleId>` shape
pub fn is_valid_cached_save_path(path: &Path) -> bool {
    let parts: Vec<String> = path
        .components()
        .rev()
        .take(3)
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    let [title_id, profile, user] = parts.as_slice() else {
        return false;
    };
    let valid = is_valid_user_folder(user)
        && is_valid_profile_folder(profile)
        && is_valid_title_id(&title_id.to_ascii_uppercase());
    if !valid {
        tracing::debug!(path = %path.display(), "Cached Switch save path has unexpected shape");
    }
    valid
}

/// Title id embedded in a JKSV metadata file
pub fn parse_jksv_meta(bytes: &[u8]) -> Option<String> {
    if !bytes.starts_with(JKSV_MAGIC) {
        tracing::debug!("Invalid JKSV magic");
        return None;
    }
    JKSV_TITLE_ID_OFFSETS.iter().find_map(|&offset| {
        let raw: [u8; 8] = bytes.get(offset..offset + 8)?.try_into().ok()?;
        let formatted = format!("{:016X}", u64::from_le_bytes(raw));
        formatted.starts_with("01").then_some(formatted)
    })
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: Vec<ProfileEntry>,
    #[serde(default)]
    last_opened: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileEntry {
    user_id: String,
    #[serde(default)]
    account_state: Option<String>,
}

/// Active account id from a Ryujinx-family `Profiles.json`
pub fn parse_active_profile(contents: &str) -> Option<String> {
    let file: ProfilesFile = serde_json::from_str(contents).ok()?;
    let id = file
        .last_opened
        .filter(|id| !id.trim().is_empty())
        .or_else(|| {
            file.profiles
                .into_iter()
                .find(|profile| profile.account_state.as_deref() == Some("Open"))
                .map(|profile| profile.user_id)
        })?;
    let id = id.replace('-', "").to_ascii_uppercase();
    is_valid_profile_folder(&id).then_some(id)
}

pub struct SwitchResolver<'a> {
    fs: &'a dyn FileAccess,
}

impl<'a> SwitchResolver<'a> {
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

    /// Account id the emulator itself reports as active
    pub fn emulator_active_profile(&self, base: &Path) -> Option<String> {
        let base_str = base.to_string_lossy();
        let data_path = base_str
            .strip_suffix(NAND_SAVE_SUFFIX)
            .or_else(|| base_str.strip_suffix(&format!("{NAND_SAVE_SUFFIX}/")))
            .map_or_else(|| base.to_path_buf(), PathBuf::from);
        let profiles = data_path.join("system/Profiles.json");
        let bytes = self.fs.read_bytes(&profiles).ok()?;
        parse_active_profile(&String::from_utf8_lossy(&bytes))
    }

    /// Profile folder for user saves
    ///
    /// Tries the emulator's configured account, then the non-zero profile
    /// with the newest file, then the first non-zero profile, then `base`.
    pub fn find_active_profile_folder(&self, base: &Path, use_emulator_config: bool) -> PathBuf {
        if !self.fs.is_directory(base) {
            tracing::debug!(base = %base.display(), "Switch save base does not exist");
            return base.to_path_buf();
        }

        if use_emulator_config {
            if let Some(profile) = self.emulator_active_profile(base) {
                let path = base.join(ZERO_USER).join(&profile);
                if self.fs.is_directory(&path) {
                    tracing::debug!(profile, "Using profile from emulator config");
                    return path;
                }
                tracing::debug!(path = %path.display(), "Configured profile folder does not exist");
            }
        }

        let mut newest: Option<(i64, PathBuf)> = None;
        let mut first_non_zero: Option<PathBuf> = None;
        for user in self.subdirs(base) {
            if !is_valid_user_folder(&file_name(&user)) {
                continue;
            }
            for profile in self.subdirs(&user) {
                let name = file_name(&profile);
                if !is_valid_profile_folder(&name) || name.chars().all(|c| c == '0') {
                    continue;
                }
                if first_non_zero.is_none() {
                    first_non_zero = Some(profile.clone());
                }
                if let Some(time) = newest_file_time(self.fs, &profile) {
                    if newest.as_ref().is_none_or(|(best, _)| time > *best) {
                        newest = Some((time, profile));
                    }
                }
            }
        }

        let selected = newest
            .map(|(_, path)| path)
            .or(first_non_zero)
            .unwrap_or_else(|| base.to_path_buf());
        tracing::debug!(selected = %selected.display(), "Selected Switch profile folder");
        selected
    }

    /// The all-zero user/profile pair, created when missing
    pub fn find_or_create_zero_profile(&self, base: &Path) -> PathBuf {
        let path = base.join(ZERO_USER).join(ZERO_PROFILE);
        if !self.fs.exists(&path) {
            if let Err(error) = self.fs.mkdirs(&path) {
                tracing::warn!(path = %path.display(), %error, "Failed to create zero profile folder");
            }
        }
        path
    }

    /// Where a title's save belongs, device saves always under the zero profile
    pub fn construct_save_path(&self, base: &Path, title_id: &str, use_emulator_config: bool) -> PathBuf {
        let title_id = title_id.to_ascii_uppercase();
        let profile = if is_device_save(&title_id) {
            self.find_or_create_zero_profile(base)
        } else {
            self.find_active_profile_folder(base, use_emulator_config)
        };
        profile.join(title_id)
    }

    /// Existing save folder for a title; newest contents win across profiles
    pub fn find_save_folder_by_title_id(&self, base: &Path, title_id: &str) -> Option<PathBuf> {
        if !self.fs.is_directory(base) {
            return None;
        }
        let title_id = title_id.to_ascii_uppercase();
        let mut best: Option<(i64, PathBuf)> = None;

        for user in self.subdirs(base) {
            let user_name = file_name(&user);
            if user_name.eq_ignore_ascii_case(&title_id) || !is_valid_user_folder(&user_name) {
                continue;
            }
            for profile in self.subdirs(&user) {
                if !is_valid_profile_folder(&file_name(&profile)) {
                    continue;
                }
                let Some(folder) = self
                    .subdirs(&profile)
                    .into_iter()
                    .find(|dir| file_name(dir).eq_ignore_ascii_case(&title_id))
                else {
                    continue;
                };
                let time = newest_file_time(self.fs, &folder).unwrap_or(0);
                tracing::debug!(path = %folder.display(), time, "Switch save candidate");
                if best.as_ref().is_none_or(|(current, _)| time > *current) {
                    best = Some((time, folder));
                }
            }
        }
        best.map(|(_, path)| path)
    }
}
