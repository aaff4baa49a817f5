use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use dotmatrix_core::{Cartridge, LoopConfig, Model};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmulationMode {
    #[default]
    Auto,
    ForceDmg,
    ForceCgb,
}

impl EmulationMode {
    pub fn model_for(self, cart: &Cartridge) -> Model {
        match self {
            Self::Auto => Model::for_cartridge(cart),
            Self::ForceDmg => Model::Dmg,
            Self::ForceCgb => Model::Cgb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub emulation_mode: EmulationMode,
    pub input_samples_per_frame: u32,
    pub pacing: bool,
    pub save_battery: bool,
}

impl Default for Config {
    fn default() -> Self {
        let loop_config = LoopConfig::default();
        Self {
            emulation_mode: EmulationMode::default(),
            input_samples_per_frame: loop_config.input_samples_per_frame,
            pacing: loop_config.pacing,
            save_battery: true,
        }
    }
}

impl Config {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            input_samples_per_frame: self.input_samples_per_frame,
            pacing: self.pacing,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("dotmatrix").join("config.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dotmatrix").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("dotmatrix")
            .join("config.toml");
    }

    PathBuf::from("config.toml")
}

pub fn load_from_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };

    match toml::from_str::<Config>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            Config::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &Config) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
