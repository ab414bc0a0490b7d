//! Settings persistence for ~/.config/compose-pilot/config.toml

use std::path::{Path, PathBuf};

use cpilot_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = "compose-pilot";

/// The settings file path under the platform config directory.
pub fn config_file_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join(CONFIG_DIR).join(CONFIG_FILENAME)
}

/// Load settings, falling back to defaults when no file exists yet.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&config_file_path())
}

/// Load settings from an explicit path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!("no settings file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|e| Error::config(format!("invalid settings file: {e}")))
}

/// Save settings to the default location, creating the directory as needed.
pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &config_file_path())
}

/// Save settings to an explicit path.
pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("failed to serialize settings: {e}")))?;
    std::fs::write(path, contents)?;
    info!("settings saved to {}", path.display());
    Ok(())
}
