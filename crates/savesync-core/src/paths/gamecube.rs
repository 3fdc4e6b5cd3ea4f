//! GameCube disc header and memory-card (GCI) layout

use std::path::{Path, PathBuf};

use crate::fs::{FileAccess, file_name, file_name_lower};

const RVZ_MAGIC: &[u8] = b"RVZ";
const RVZ_GAME_ID_OFFSET: usize = 0x58;
const RVZ_GAME_NAME_OFFSET: usize = 0x78;
const ISO_GAME_ID_OFFSET: usize = 0x00;
const ISO_GAME_NAME_OFFSET: usize = 0x20;
const GAME_NAME_LEN: usize = 64;

const GCI_MIN_LEN: usize = 0x40;
const GCI_MAKER_OFFSET: usize = 0x04;
const GCI_FILENAME_OFFSET: usize = 0x08;
const GCI_FILENAME_LEN: usize = 32;

/// Bytes needed from the start of a disc image to parse its header
pub const ROM_HEADER_LEN: usize = RVZ_GAME_NAME_OFFSET + GAME_NAME_LEN;

pub const REGIONS: [&str; 4] = ["USA", "EUR", "JAP", "KOR"];

/// Identity read from a disc image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameCubeGameInfo {
    /// Four-character game id, e.g. `GALE`
    pub game_id: String,
    pub maker_code: String,
    pub region: &'static str,
    pub game_name: Option<String>,
}

impl GameCubeGameInfo {
    /// Six-character product code, e.g. `GALE01`
    pub fn product_code(&self) -> String {
        format!("{}{}", self.game_id, self.maker_code)
    }
}

/// Header of a single exported memory-card file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GciSaveInfo {
    pub game_id: String,
    pub maker_code: String,
    pub internal_filename: String,
    pub region: &'static str,
}

impl GciSaveInfo {
    /// File name Dolphin uses for this save: `{id4}{maker2}_{internal}.gci`
    pub fn file_name(&self) -> String {
        format!(
            "{}{}_{}.gci",
            self.game_id, self.maker_code, self.internal_filename
        )
    }

    pub fn matches(&self, game: &GameCubeGameInfo) -> bool {
        let code = format!("{}{}", self.game_id, self.maker_code);
        code.eq_ignore_ascii_case(&game.product_code())
            || self.game_id.eq_ignore_ascii_case(&game.game_id)
    }
}

/// Region folder for a game id, keyed on its last character
pub fn region_for(game_id: &str) -> &'static str {
    match game_id.chars().last() {
        Some('P') => "EUR",
        Some('J') => "JAP",
        Some('K') => "KOR",
        _ => "USA",
    }
}

fn ascii_field(bytes: &[u8], offset: usize, len: usize) -> Option<String> {
    let field = bytes.get(offset..offset + len)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    Some(String::from_utf8_lossy(&field[..end]).trim().to_string())
}

/// Parse an ISO/GCM or RVZ header from the first [`ROM_HEADER_LEN`] bytes
pub fn parse_rom_header(header: &[u8]) -> Option<GameCubeGameInfo> {
    let (id_offset, name_offset) = if header.starts_with(RVZ_MAGIC) {
        (RVZ_GAME_ID_OFFSET, RVZ_GAME_NAME_OFFSET)
    } else {
        (ISO_GAME_ID_OFFSET, ISO_GAME_NAME_OFFSET)
    };

    let game_id = ascii_field(header, id_offset, 4)?;
    let maker_code = ascii_field(header, id_offset + 4, 2)?;
    if game_id.len() != 4 || !game_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let game_name = header
        .get(name_offset..)
        .and_then(|rest| ascii_field(rest, 0, GAME_NAME_LEN.min(rest.len())))
        .filter(|name| !name.is_empty());

    Some(GameCubeGameInfo {
        region: region_for(&game_id),
        game_id,
        maker_code,
        game_name,
    })
}

/// Parse the header of a `.gci` export
pub fn parse_gci_header(bytes: &[u8]) -> Option<GciSaveInfo> {
    if bytes.len() < GCI_MIN_LEN {
        return None;
    }
    let game_id = ascii_field(bytes, 0, 4)?;
    Some(GciSaveInfo {
        region: region_for(&game_id),
        maker_code: ascii_field(bytes, GCI_MAKER_OFFSET, 2)?,
        internal_filename: ascii_field(bytes, GCI_FILENAME_OFFSET, GCI_FILENAME_LEN)?,
        game_id,
    })
}

pub fn gci_path(base: &Path, region: &str, file_name: &str) -> PathBuf {
    base.join(region).join(file_name)
}

/// Whether a flat-scan hit sits in a region or `Card*` folder
pub fn is_valid_gci_path(path: &Path) -> bool {
    let name = file_name(path);
    if name.contains(".deleted") || !file_name_lower(path).ends_with(".gci") {
        return false;
    }
    path.parent().map(file_name).is_some_and(|parent| {
        REGIONS.contains(&parent.as_str()) || parent.to_ascii_lowercase().starts_with("card")
    })
}

/// Memory-card discovery over the file-access layer
pub struct GameCubeResolver<'a> {
    fs: &'a dyn FileAccess,
}

impl<'a> GameCubeResolver<'a> {
    pub const fn new(fs: &'a dyn FileAccess) -> Self {
        Self { fs }
    }

    pub fn read_rom_info(&self, rom_path: &Path) -> Option<GameCubeGameInfo> {
        if !self.fs.is_file(rom_path) {
            tracing::debug!(path = %rom_path.display(), "ROM file does not exist");
            return None;
        }
        let header = self.fs.read_prefix(rom_path, ROM_HEADER_LEN).ok()?;
        let info = parse_rom_header(&header);
        match &info {
            Some(info) => tracing::debug!(
                game_id = %info.game_id,
                region = info.region,
                name = ?info.game_name,
                "Parsed GameCube ROM header"
            ),
            None => tracing::debug!(path = %rom_path.display(), "Failed to parse ROM header"),
        }
        info
    }

    pub fn read_gci_info(&self, path: &Path) -> Option<GciSaveInfo> {
        let bytes = self.fs.read_prefix(path, GCI_MIN_LEN).ok()?;
        parse_gci_header(&bytes)
    }

    fn search_directory(&self, dir: &Path, game: &GameCubeGameInfo, results: &mut Vec<PathBuf>) {
        for file in self.fs.list_files(dir) {
            if !self.fs.is_file(&file) {
                continue;
            }
            let name = file_name(&file);
            if name.contains(".deleted") || !file_name_lower(&file).ends_with(".gci") {
                continue;
            }
            let name_matches = name
                .to_ascii_uppercase()
                .contains(&game.game_id.to_ascii_uppercase());
            let matches = name_matches
                || self
                    .read_gci_info(&file)
                    .is_some_and(|info| info.matches(game));
            if matches && !results.contains(&file) {
                results.push(file);
            }
        }
    }

    /// Every save for `game` under one base directory
    ///
    /// Region folders are searched first (their `Card*` subfolders, then the
    /// region folder itself). Only when that finds nothing is the base folder
    /// scanned directly, keeping structurally valid hits.
    pub fn find_gci_files_in_path(&self, base: &Path, game: &GameCubeGameInfo) -> Vec<PathBuf> {
        let mut results = Vec::new();
        for region in REGIONS {
            let region_dir = base.join(region);
            if !self.fs.is_directory(&region_dir) {
                continue;
            }
            for card_dir in self.fs.list_files(&region_dir) {
                if self.fs.is_directory(&card_dir)
                    && file_name_lower(&card_dir).starts_with("card")
                {
                    self.search_directory(&card_dir, game, &mut results);
                }
            }
            self.search_directory(&region_dir, game, &mut results);
        }

        if results.is_empty() {
            self.search_directory(base, game, &mut results);
            results.retain(|path| is_valid_gci_path(path));
        }
        results
    }

    /// Saves for `game` collected across every existing base directory
    pub fn discover_all(&self, bases: &[PathBuf], game: &GameCubeGameInfo) -> Vec<PathBuf> {
        let mut all = Vec::new();
        for base in bases {
            if !self.fs.is_directory(base) {
                tracing::debug!(path = %base.display(), "GameCube save dir does not exist");
                continue;
            }
            for path in self.find_gci_files_in_path(base, game) {
                if !all.contains(&path) {
                    all.push(path);
                }
            }
        }
        tracing::debug!(count = all.len(), game_id = %game.game_id, "Discovered GCI saves");
        all
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fs::LocalFileAccess;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    pub(crate) fn iso_header(code: &str, name: &str) -> Vec<u8> {
        let mut header = vec![0u8; ROM_HEADER_LEN];
        header[..6].copy_from_slice(code.as_bytes());
        header[0x20..0x20 + name.len()].copy_from_slice(name.as_bytes());
        header
    }

    pub(crate) fn gci_bytes(code: &str, internal: &str) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x80];
        bytes[..6].copy_from_slice(code.as_bytes());
        bytes[8..8 + internal.len()].copy_from_slice(internal.as_bytes());
        bytes
    }

    fn game() -> GameCubeGameInfo {
        parse_rom_header(&iso_header("GALE01", "Super Smash Bros Melee")).unwrap()
    }

    #[test]
    fn parses_iso_and_rvz_headers() {
        let info = game();
        assert_eq!(info.game_id, "GALE");
        assert_eq!(info.maker_code, "01");
        assert_eq!(info.product_code(), "GALE01");
        assert_eq!(info.region, "USA");
        assert_eq!(info.game_name.as_deref(), Some("Super Smash Bros Melee"));

        let mut rvz = vec![0u8; ROM_HEADER_LEN];
        rvz[..3].copy_from_slice(b"RVZ");
        rvz[0x58..0x5E].copy_from_slice(b"GZLP01");
        let info = parse_rom_header(&rvz).unwrap();
        assert_eq!(info.game_id, "GZLP");
        assert_eq!(info.region, "EUR");
        assert_eq!(info.game_name, None);
    }

    #[test]
    fn gci_header_builds_dolphin_file_name() {
        let info = parse_gci_header(&gci_bytes("GALE01", "SuperSmashBros0110")).unwrap();
        assert_eq!(info.file_name(), "GALE01_SuperSmashBros0110.gci");
        assert!(parse_gci_header(&[0u8; 0x20]).is_none());
    }

    #[test]
    fn region_folders_are_searched_before_flat_scan() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        let base = tmp.path();
        fs.write_bytes(&base.join("USA/Card A/01-GALE-SuperSmash.gci"), b"a")
            .unwrap();
        fs.write_bytes(&base.join("USA/GALE01_other.gci"), b"b").unwrap();
        fs.write_bytes(&base.join("USA/GALE01_old.gci.deleted"), b"c")
            .unwrap();
        fs.write_bytes(&base.join("GALE01_flat.gci"), b"d").unwrap();

        let resolver = GameCubeResolver::new(&fs);
        let found = resolver.find_gci_files_in_path(base, &game());
        assert_eq!(
            found,
            vec![
                base.join("USA/Card A/01-GALE-SuperSmash.gci"),
                base.join("USA/GALE01_other.gci"),
            ]
        );
    }

    #[test]
    fn flat_scan_keeps_only_valid_paths_and_uses_headers() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        let base = tmp.path().join("Card A");
        fs.write_bytes(&base.join("GALE01_flat.gci"), b"d").unwrap();
        fs.write_bytes(&base.join("x.gci"), &gci_bytes("GALE01", "melee"))
            .unwrap();
        fs.write_bytes(&base.join("GALE01_old.gci.deleted"), b"e")
            .unwrap();

        let resolver = GameCubeResolver::new(&fs);
        let found = resolver.find_gci_files_in_path(&base, &game());
        assert_eq!(found, vec![base.join("GALE01_flat.gci"), base.join("x.gci")]);
    }

    #[test]
    fn flat_scan_ignores_exports_outside_card_folders() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        let base = tmp.path().join("saves");
        fs.write_bytes(&base.join("GALE01_stray.gci"), b"d").unwrap();

        let resolver = GameCubeResolver::new(&fs);
        assert!(resolver.find_gci_files_in_path(&base, &game()).is_empty());
        assert!(!is_valid_gci_path(&base.join("GALE01_stray.gci")));
        assert!(is_valid_gci_path(&tmp.path().join("EUR/GALE01_a.gci")));
    }

    #[test]
    fn discovery_collects_all_bases() {
        let tmp = tempdir().unwrap();
        let fs = LocalFileAccess::default();
        let first = tmp.path().join("one");
        let second = tmp.path().join("two");
        fs.write_bytes(&first.join("USA/GALE01_a.gci"), b"a").unwrap();
        fs.write_bytes(&second.join("USA/GALE01_b.gci"), b"b").unwrap();

        let resolver = GameCubeResolver::new(&fs);
        let found = resolver.discover_all(
            &[first.clone(), tmp.path().join("missing"), second.clone()],
            &game(),
        );
        assert_eq!(
            found,
            vec![first.join("USA/GALE01_a.gci"), second.join("USA/GALE01_b.gci")]
        );
    }
}
