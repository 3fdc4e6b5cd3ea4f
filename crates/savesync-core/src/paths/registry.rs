//! Per-emulator save location registry
//!
//! Each entry lists path templates in priority order. Templates may use
//! `{extStorage}`, `{package}`, `{core}` and `{filesDir}`.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// How and where one emulator stores its saves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePathConfig {
    pub emulator_id: &'static str,
    pub default_paths: &'static [&'static str],
    pub save_extensions: &'static [&'static str],
    pub uses_core: bool,
    pub uses_folder_based_saves: bool,
    pub uses_game_id_subfolder: bool,
    pub uses_shared_memory_card: bool,
    pub uses_package_template: bool,
    pub uses_internal_storage: bool,
    pub uses_gci_format: bool,
    pub supported: bool,
}

impl SavePathConfig {
    const fn file(
        emulator_id: &'static str,
        default_paths: &'static [&'static str],
        save_extensions: &'static [&'static str],
    ) -> Self {
        Self {
            emulator_id,
            default_paths,
            save_extensions,
            uses_core: false,
            uses_folder_based_saves: false,
            uses_game_id_subfolder: false,
            uses_shared_memory_card: false,
            uses_package_template: false,
            uses_internal_storage: false,
            uses_gci_format: false,
            supported: true,
        }
    }

    const fn folder(emulator_id: &'static str, default_paths: &'static [&'static str]) -> Self {
        let mut config = Self::file(emulator_id, default_paths, &["*"]);
        config.uses_folder_based_saves = true;
        config
    }

    const fn package_folder(emulator_id: &'static str) -> Self {
        let mut config = Self::folder(emulator_id, SWITCH_PATHS);
        config.uses_package_template = true;
        config
    }

    const fn gci(emulator_id: &'static str, default_paths: &'static [&'static str]) -> Self {
        let mut config = Self::file(emulator_id, default_paths, &["gci"]);
        config.uses_gci_format = true;
        config
    }

    const fn core(mut self) -> Self {
        self.uses_core = true;
        self
    }

    const fn game_id_subfolder(mut self) -> Self {
        self.uses_game_id_subfolder = true;
        self
    }

    const fn shared_memory_card(mut self) -> Self {
        self.uses_shared_memory_card = true;
        self.supported = false;
        self
    }

    const fn internal(mut self) -> Self {
        self.uses_internal_storage = true;
        self
    }

    const fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }
}

const SWITCH_PATHS: &[&str] = &["{extStorage}/Android/data/{package}/files/nand/user/save"];

/// Emulator id of the in-app libretro runner
pub const BUILTIN_EMULATOR_ID: &str = "builtin";

static CONFIGS: &[SavePathConfig] = &[
    SavePathConfig::file(
        "retroarch",
        &[
            "{extStorage}/RetroArch/saves/{core}",
            "{extStorage}/Android/data/com.retroarch/files/saves/{core}",
            "/data/data/com.retroarch/saves/{core}",
        ],
        &["srm", "sav"],
    )
    .core(),
    SavePathConfig::file(
        "retroarch_64",
        &[
            "{extStorage}/RetroArch/saves/{core}",
            "{extStorage}/Android/data/com.retroarch.aarch64/files/saves/{core}",
            "/data/data/com.retroarch.aarch64/saves/{core}",
        ],
        &["srm", "sav"],
    )
    .core(),
    SavePathConfig::file(
        "mupen64plus_fz",
        &["{extStorage}/Android/data/org.mupen64plusae.v3.fzurita/files/GameData"],
        &["sra", "eep", "fla", "mpk"],
    )
    .game_id_subfolder(),
    SavePathConfig::file(
        "m64pro_fzx_plus",
        &["{extStorage}/Android/data/com.m64.fx.plus.emulate/files/GameData"],
        &["sra", "eep", "fla", "mpk"],
    )
    .game_id_subfolder(),
    SavePathConfig::gci(
        "dolphin",
        &[
            "{extStorage}/Android/data/org.dolphinemu.dolphinemu/files/GC",
            "{extStorage}/Android/data/org.dolphinemu.handheld/files/GC",
            "{extStorage}/dolphin-emu/GC",
        ],
    ),
    SavePathConfig::gci(
        "dolphin_mmjr",
        &[
            "{extStorage}/Android/data/org.dolphinemu.mmjr/files/GC",
            "{extStorage}/mmjr/GC",
            "{extStorage}/mmjr2-vbi/GC",
        ],
    ),
    SavePathConfig::gci(
        "retroarch_dolphin",
        &[
            "{extStorage}/RetroArch/saves/dolphin-emu/User/GC",
            "{extStorage}/Android/data/com.retroarch/files/saves/dolphin-emu/User/GC",
            "{extStorage}/Android/data/com.retroarch.aarch64/files/saves/dolphin-emu/User/GC",
        ],
    ),
    SavePathConfig::folder(
        "dolphin_wii",
        &[
            "{extStorage}/Android/data/org.dolphinemu.dolphinemu/files/Wii/title/00010000",
            "{extStorage}/Android/data/org.dolphinemu.handheld/files/Wii/title/00010000",
            "{extStorage}/dolphin-emu/Wii/title/00010000",
        ],
    ),
    SavePathConfig::folder(
        "dolphin_mmjr_wii",
        &[
            "{extStorage}/Android/data/org.dolphinemu.mmjr/files/Wii/title/00010000",
            "{extStorage}/mmjr/Wii/title/00010000",
            "{extStorage}/mmjr2-vbi/Wii/title/00010000",
        ],
    ),
    SavePathConfig::folder(
        "citra",
        &["{extStorage}/Android/data/org.citra.citra_emu/files/sdmc/Nintendo 3DS"],
    ),
    SavePathConfig::folder(
        "citra_mmj",
        &["{extStorage}/Android/data/org.citra.emu/files/sdmc/Nintendo 3DS"],
    ),
    SavePathConfig::folder(
        "lime3ds",
        &["{extStorage}/Android/data/io.github.lime3ds.android/files/sdmc/Nintendo 3DS"],
    ),
    SavePathConfig::folder(
        "azahar",
        &["{extStorage}/Android/data/io.github.azahar_emu.azahar/files/sdmc/Nintendo 3DS"],
    ),
    SavePathConfig::folder(
        "borked3ds",
        &["{extStorage}/Android/data/io.github.borked3ds.android/files/sdmc/Nintendo 3DS"],
    ),
    SavePathConfig::package_folder("yuzu"),
    SavePathConfig::package_folder("ryujinx"),
    SavePathConfig::package_folder("citron"),
    SavePathConfig::package_folder("strato"),
    SavePathConfig::package_folder("eden"),
    SavePathConfig::package_folder("skyline"),
    SavePathConfig::package_folder("sudachi"),
    SavePathConfig::package_folder("kenjinx"),
    SavePathConfig::file(
        "drastic",
        &[
            "{extStorage}/DraStic/backup",
            "{extStorage}/Android/data/com.dsemu.drastic/files/backup",
        ],
        &["dsv", "sav"],
    ),
    SavePathConfig::file(
        "melonds",
        &[
            "{extStorage}/melonDS/saves",
            "{extStorage}/Android/data/me.magnum.melonds/files/saves",
        ],
        &["sav"],
    ),
    SavePathConfig::file(
        "pizza_boy_gba",
        &[
            "{extStorage}/PizzaBoyGBA/saves",
            "{extStorage}/Android/data/it.dbtecno.pizzaboygba/files/saves",
        ],
        &["sav"],
    ),
    SavePathConfig::file(
        "pizza_boy_gb",
        &[
            "{extStorage}/PizzaBoy/saves",
            "{extStorage}/Android/data/it.dbtecno.pizzaboy/files/saves",
        ],
        &["sav"],
    ),
    SavePathConfig::file(
        "duckstation",
        &[
            "{extStorage}/Android/data/com.github.stenzek.duckstation/files/memcards",
            "{extStorage}/duckstation/memcards",
        ],
        &["mcd", "mcr"],
    )
    .shared_memory_card(),
    SavePathConfig::file(
        "aethersx2",
        &["{extStorage}/Android/data/xyz.aethersx2.android/files/memcards"],
        &["ps2"],
    )
    .shared_memory_card(),
    SavePathConfig::file(
        "nethersx2",
        &["{extStorage}/Android/data/xyz.aethersx2.android/files/memcards"],
        &["ps2"],
    )
    .shared_memory_card(),
    SavePathConfig::file(
        "pcsx2",
        &["{extStorage}/Android/data/net.pcsx2.emulator/files/memcards"],
        &["ps2"],
    )
    .shared_memory_card(),
    SavePathConfig::folder(
        "ppsspp",
        &[
            "{extStorage}/PSP/SAVEDATA",
            "{extStorage}/Android/data/org.ppsspp.ppsspp/files/PSP/SAVEDATA",
        ],
    ),
    SavePathConfig::folder(
        "ppsspp_gold",
        &[
            "{extStorage}/PSP/SAVEDATA",
            "{extStorage}/Android/data/org.ppsspp.ppssppgold/files/PSP/SAVEDATA",
        ],
    ),
    SavePathConfig::folder(
        "vita3k",
        &["{extStorage}/Android/data/org.vita3k.emulator/files/VITA/ux0/user/00/savedata"],
    ),
    SavePathConfig::folder(
        "cemu",
        &["{extStorage}/Android/data/info.cemu.cemu/files/mlc01/usr/save/00050000"],
    ),
    SavePathConfig::file(
        "redream",
        &["{extStorage}/Android/data/io.recompiled.redream/files"],
        &["bin"],
    )
    .shared_memory_card(),
    SavePathConfig::file(
        "flycast",
        &[
            "{extStorage}/Android/data/com.flycast.emulator/files/data",
            "{extStorage}/Flycast/data",
        ],
        &["bin"],
    )
    .shared_memory_card(),
    SavePathConfig::file(
        "md_emu",
        &["{extStorage}/Android/data/com.explusalpha.MdEmu/files"],
        &["srm", "sav"],
    ),
    SavePathConfig::file(
        "saturn_emu",
        &["{extStorage}/Android/data/com.explusalpha.SaturnEmu/files"],
        &["srm", "sav"],
    )
    .unsupported(),
    SavePathConfig::file(
        "mame4droid",
        &["{extStorage}/Android/data/com.seleuco.mame4droid/files/nvram"],
        &["nv"],
    )
    .unsupported(),
    SavePathConfig::file(
        "scummvm",
        &["{extStorage}/Android/data/org.scummvm.scummvm/files/saves"],
        &["*"],
    )
    .unsupported(),
    SavePathConfig::file(
        BUILTIN_EMULATOR_ID,
        &["{filesDir}/libretro/saves"],
        &["srm"],
    )
    .internal(),
];

static PACKAGE_TO_CONFIG: &[(&str, &str)] = &[
    ("org.dolphinemu.dolphinemu", "dolphin"),
    ("org.dolphinemu.mmjr", "dolphin_mmjr"),
    ("org.dolphinemu.handheld", "dolphin"),
    ("com.retroarch", "retroarch"),
    ("com.retroarch.aarch64", "retroarch_64"),
    ("org.ppsspp.ppsspp", "ppsspp"),
    ("org.ppsspp.ppssppgold", "ppsspp_gold"),
    ("org.mupen64plusae.v3.fzurita", "mupen64plus_fz"),
    ("com.m64.fx.plus.emulate", "m64pro_fzx_plus"),
    ("me.magnum.melonds", "melonds"),
    ("com.dsemu.drastic", "drastic"),
    ("it.dbtecno.pizzaboygba", "pizza_boy_gba"),
    ("it.dbtecno.pizzaboy", "pizza_boy_gb"),
    ("info.cemu.cemu", "cemu"),
    ("org.vita3k.emulator", "vita3k"),
    ("org.citra.citra_emu", "citra"),
    ("io.github.lime3ds.android", "lime3ds"),
    ("io.github.azahar_emu.azahar", "azahar"),
];

static PACKAGE_PREFIX_TO_CONFIG: &[(&str, &str)] = &[
    ("org.dolphinemu.mmjr", "dolphin_mmjr"),
    ("org.dolphinemu", "dolphin"),
];

/// Package used for `{package}` when none is installed or configured
static DEFAULT_PACKAGES: &[(&str, &str)] = &[
    ("yuzu", "org.yuzu.yuzu_emu"),
    ("ryujinx", "org.ryujinx.android"),
    ("citron", "org.citron.citron_emu"),
    ("strato", "org.stratoemu.strato"),
    ("eden", "dev.eden.eden_emulator"),
    ("skyline", "skyline.emu"),
    ("sudachi", "org.sudachi.sudachi_emu"),
    ("kenjinx", "org.kenjinx.android"),
];

/// Save-directory name RetroArch uses per platform when sorting by core
static RETROARCH_CORES: &[(&str, &str)] = &[
    ("nes", "FCEUmm"),
    ("snes", "Snes9x"),
    ("n64", "Mupen64Plus-Next"),
    ("gb", "Gambatte"),
    ("gbc", "Gambatte"),
    ("gba", "mGBA"),
    ("nds", "melonDS DS"),
    ("genesis", "Genesis Plus GX"),
    ("sms", "Genesis Plus GX"),
    ("gg", "Genesis Plus GX"),
    ("segacd", "Genesis Plus GX"),
    ("32x", "PicoDrive"),
    ("psx", "Beetle PSX HW"),
    ("psp", "PPSSPP"),
    ("pce", "Beetle PCE Fast"),
    ("ngp", "Beetle NeoPop"),
    ("ws", "Beetle Cygne"),
    ("lynx", "Handy"),
    ("atari2600", "Stella"),
    ("arcade", "FinalBurn Neo"),
    ("saturn", "Beetle Saturn"),
    ("dreamcast", "Flycast"),
];

/// Map platform slug aliases onto the slugs used throughout the engine
pub fn canonical_platform(slug: &str) -> String {
    let lower = slug.trim().to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "ngc" | "gamecube" | "gcn" => "gc",
        "n3ds" | "new3ds" => "3ds",
        "nsw" | "ns" => "switch",
        "vita" | "psv" => "psvita",
        "ps1" | "playstation" => "psx",
        "megadrive" | "md" => "genesis",
        "sfc" => "snes",
        "fc" | "famicom" => "nes",
        _ => return lower,
    };
    canonical.to_string()
}

/// Expansion inputs for path templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathEnvironment {
    /// Shared storage root (`{extStorage}`)
    pub ext_storage: PathBuf,
    /// App-private files root (`{filesDir}`)
    pub files_dir: Option<PathBuf>,
}

/// Registry of save locations merged with user configuration
#[derive(Debug, Clone, Default)]
pub struct SavePathRegistry {
    env: PathEnvironment,
    overrides: BTreeMap<String, PathBuf>,
    packages: BTreeMap<String, String>,
}

impl SavePathRegistry {
    pub const fn new(env: PathEnvironment) -> Self {
        Self {
            env,
            overrides: BTreeMap::new(),
            packages: BTreeMap::new(),
        }
    }

    /// User-chosen save directory for an emulator; always tried first
    #[must_use]
    pub fn with_override(mut self, emulator_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(emulator_id.into(), path.into());
        self
    }

    /// Installed package for an emulator, used for `{package}`
    #[must_use]
    pub fn with_package(mut self, emulator_id: impl Into<String>, package: impl Into<String>) -> Self {
        self.packages.insert(emulator_id.into(), package.into());
        self
    }

    pub const fn environment(&self) -> &PathEnvironment {
        &self.env
    }

    pub fn user_override(&self, emulator_id: &str) -> Option<&PathBuf> {
        self.overrides.get(emulator_id)
    }

    /// Supported config for an emulator id
    pub fn config(&self, emulator_id: &str) -> Option<&'static SavePathConfig> {
        self.config_including_unsupported(emulator_id)
            .filter(|config| config.supported)
    }

    pub fn config_including_unsupported(&self, emulator_id: &str) -> Option<&'static SavePathConfig> {
        CONFIGS.iter().find(|config| config.emulator_id == emulator_id)
    }

    /// Whether saves for this emulator may be synced under the given settings
    pub fn can_sync(&self, emulator_id: &str, sync_enabled: bool, folder_sync_enabled: bool) -> bool {
        if !sync_enabled {
            return false;
        }
        let Some(config) = self.config(emulator_id) else {
            return false;
        };
        !config.uses_folder_based_saves || folder_sync_enabled
    }

    /// Package substituted into `{package}` for a config
    pub fn package_for(&self, config: &SavePathConfig, package_override: Option<&str>) -> Option<String> {
        package_override
            .map(str::to_string)
            .or_else(|| self.packages.get(config.emulator_id).cloned())
            .or_else(|| {
                DEFAULT_PACKAGES
                    .iter()
                    .find(|(id, _)| *id == config.emulator_id)
                    .map(|(_, package)| (*package).to_string())
            })
    }

    fn expand(&self, template: &str, package: Option<&str>, core: Option<&str>) -> Option<PathBuf> {
        let mut result = template.replace("{extStorage}", &self.env.ext_storage.to_string_lossy());
        if let Some(package) = package {
            result = result.replace("{package}", package);
        }
        if let Some(core) = core {
            result = result.replace("{core}", core);
        }
        if let Some(files_dir) = &self.env.files_dir {
            result = result.replace("{filesDir}", &files_dir.to_string_lossy());
        }
        if result.contains('{') {
            tracing::debug!(template, "Dropping path template with unresolved placeholders");
            return None;
        }
        Some(PathBuf::from(result))
    }

    /// Registry paths for a platform; core-specific paths precede core-less ones
    pub fn resolve_path(&self, config: &SavePathConfig, platform_slug: &str) -> Vec<PathBuf> {
        let core = if config.uses_core {
            retroarch_core(platform_slug)
        } else {
            None
        };

        let mut paths: Vec<PathBuf> = config
            .default_paths
            .iter()
            .filter_map(|template| self.expand(template, None, core))
            .collect();

        if core.is_some() || config.uses_core {
            paths.extend(config.default_paths.iter().filter_map(|template| {
                let without_core = template.replace("/{core}", "").replace("{core}", "");
                self.expand(&without_core, None, None)
            }));
        }
        paths
    }

    /// Registry paths with `{package}` substituted
    pub fn resolve_path_with_package(
        &self,
        config: &SavePathConfig,
        package_override: Option<&str>,
    ) -> Vec<PathBuf> {
        let package = if config.uses_package_template {
            self.package_for(config, package_override)
        } else {
            None
        };
        config
            .default_paths
            .iter()
            .filter_map(|template| self.expand(template, package.as_deref(), None))
            .collect()
    }

    /// Ordered candidate directories: user override first, then the registry
    pub fn resolve_candidates(
        &self,
        config: &SavePathConfig,
        platform_slug: &str,
        package_override: Option<&str>,
    ) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = self.overrides.get(config.emulator_id) {
            candidates.push(path.clone());
        }

        let registry_paths = if config.uses_package_template {
            self.resolve_path_with_package(config, package_override)
        } else {
            self.resolve_path(config, platform_slug)
        };
        for path in registry_paths {
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }
        candidates
    }
}

/// Registry id for an installed package, exact match before prefix match
pub fn config_id_for_package(package: &str) -> Option<&'static str> {
    PACKAGE_TO_CONFIG
        .iter()
        .find(|(name, _)| *name == package)
        .or_else(|| {
            PACKAGE_PREFIX_TO_CONFIG
                .iter()
                .find(|(prefix, _)| package.starts_with(prefix))
        })
        .map(|(_, id)| *id)
}

/// RetroArch core save-directory name for a platform
pub fn retroarch_core(platform_slug: &str) -> Option<&'static str> {
    let canonical = canonical_platform(platform_slug);
    RETROARCH_CORES
        .iter()
        .find(|(slug, _)| *slug == canonical)
        .map(|(_, core)| *core)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> SavePathRegistry {
        SavePathRegistry::new(PathEnvironment {
            ext_storage: PathBuf::from("/sdcard"),
            files_dir: Some(PathBuf::from("/data/app/files")),
        })
    }

    #[test]
    fn core_paths_come_before_coreless_paths() {
        let registry = registry();
        let config = registry.config("retroarch_64").unwrap();
        let paths = registry.resolve_path(config, "snes");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/sdcard/RetroArch/saves/Snes9x"),
                PathBuf::from("/sdcard/Android/data/com.retroarch.aarch64/files/saves/Snes9x"),
                PathBuf::from("/data/data/com.retroarch.aarch64/saves/Snes9x"),
                PathBuf::from("/sdcard/RetroArch/saves"),
                PathBuf::from("/sdcard/Android/data/com.retroarch.aarch64/files/saves"),
                PathBuf::from("/data/data/com.retroarch.aarch64/saves"),
            ]
        );
    }

    #[test]
    fn user_override_is_always_first() {
        let registry = registry().with_override("dolphin", "/mnt/usb/GC");
        let config = registry.config("dolphin").unwrap();
        let candidates = registry.resolve_candidates(config, "gc", None);
        assert_eq!(candidates[0], PathBuf::from("/mnt/usb/GC"));
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn package_template_uses_installed_package() {
        let registry = registry().with_package("eden", "dev.eden.eden_emulator.nightly");
        let config = registry.config("eden").unwrap();
        assert_eq!(
            registry.resolve_candidates(config, "switch", None),
            vec![PathBuf::from(
                "/sdcard/Android/data/dev.eden.eden_emulator.nightly/files/nand/user/save"
            )]
        );
        assert_eq!(
            registry.resolve_candidates(config, "switch", Some("org.other")),
            vec![PathBuf::from("/sdcard/Android/data/org.other/files/nand/user/save")]
        );
    }

    #[test]
    fn unsupported_emulators_are_hidden() {
        let registry = registry();
        assert!(registry.config("duckstation").is_none());
        assert!(registry.config_including_unsupported("duckstation").is_some());
        assert!(!registry.can_sync("duckstation", true, true));
    }

    #[test]
    fn folder_saves_need_folder_sync_flag() {
        let registry = registry();
        assert!(registry.can_sync("retroarch", true, false));
        assert!(!registry.can_sync("ppsspp", true, false));
        assert!(registry.can_sync("ppsspp", true, true));
        assert!(!registry.can_sync("retroarch", false, true));
    }

    #[test]
    fn package_lookup_prefers_exact_match() {
        assert_eq!(config_id_for_package("org.dolphinemu.handheld"), Some("dolphin"));
        assert_eq!(config_id_for_package("org.dolphinemu.mmjr.beta"), Some("dolphin_mmjr"));
        assert_eq!(config_id_for_package("org.dolphinemu.custom"), Some("dolphin"));
        assert_eq!(config_id_for_package("com.unknown"), None);
    }

    #[test]
    fn builtin_uses_files_dir() {
        let registry = registry();
        let config = registry.config(BUILTIN_EMULATOR_ID).unwrap();
        assert_eq!(
            registry.resolve_path(config, "gba"),
            vec![PathBuf::from("/data/app/files/libretro/saves")]
        );
    }

    #[test]
    fn platform_aliases_canonicalize() {
        assert_eq!(canonical_platform("NGC"), "gc");
        assert_eq!(canonical_platform("vita"), "psvita");
        assert_eq!(canonical_platform("gba"), "gba");
        assert_eq!(retroarch_core("megadrive"), Some("Genesis Plus GX"));
    }
}
