//! Compositor configuration.
//!
//! Loaded from `~/.config/opal/config.toml`; a default file is written
//! on first run so there is something to edit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub shell: ShellConfig,
    pub compositor: CompositorConfig,
}

/// How to launch the shell host process at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    pub command: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command: vec!["opal-shell-host".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// RGBA frame clear color.
    pub clear_color: [f32; 4],
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.1, 1.0],
        }
    }
}

impl Config {
    /// Load configuration from file, or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("config not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("failed to create default config: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("failed to read config file")?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;
        info!("configuration loaded from {:?}", config_path);
        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("no config directory")?
            .join("opal");
        Ok(config_dir.join("config.toml"))
    }

    fn save_default(path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        let toml_string =
            toml::to_string_pretty(&Self::default()).context("failed to serialize defaults")?;
        fs::write(path, toml_string).context("failed to write default config")?;
        info!("created default config at {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrips() {
        let toml_string = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.shell.command, vec!["opal-shell-host".to_string()]);
        assert_eq!(parsed.compositor.clear_color, [0.1, 0.1, 0.1, 1.0]);
    }

    #[test]
    fn test_partial_config_rejected() {
        // Missing sections are an error, not silently defaulted; the
        // generated file always carries every section.
        assert!(toml::from_str::<Config>("[shell]\n").is_err());
    }
}
