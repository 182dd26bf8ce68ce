use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Classic green DMG shades, lightest first.
pub const DMG_PALETTE: [u32; 4] = [0x009BBC0F, 0x008BAC0F, 0x00306230, 0x000F380F];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub boot_rom: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
    pub frames: u32,
    /// 0xRRGGBB per shade, lightest first.
    pub palette: [u32; 4],
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            boot_rom: None,
            save_dir: None,
            frames: 60,
            palette: DMG_PALETTE,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dotmatrix").join("cli.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("dotmatrix")
            .join("cli.toml");
    }

    PathBuf::from("cli.toml")
}

pub fn load_from_file(path: &Path) -> CliConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            debug!("No config at {}: {e}", path.display());
            return CliConfig::default();
        }
    };

    match toml::from_str::<CliConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            CliConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_keys_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(&path, "frames = 5\nsave_dir = \"saves\"\n").unwrap();
        let cfg = load_from_file(&path);
        assert_eq!(cfg.frames, 5);
        assert_eq!(cfg.save_dir, Some(PathBuf::from("saves")));
        assert_eq!(cfg.boot_rom, None);
        assert_eq!(cfg.palette, DMG_PALETTE);
    }

    #[test]
    fn palette_from_hex_integers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(
            &path,
            "palette = [0xFFFFFF, 0xAAAAAA, 0x555555, 0x000000]\n",
        )
        .unwrap();
        let cfg = load_from_file(&path);
        assert_eq!(cfg.palette, [0xFFFFFF, 0xAAAAAA, 0x555555, 0x000000]);
    }

    #[test]
    fn unparseable_or_missing_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(&path, "frames = \"many\"").unwrap();
        assert_eq!(load_from_file(&path), CliConfig::default());
        assert_eq!(
            load_from_file(&dir.path().join("absent.toml")),
            CliConfig::default()
        );
    }
}
