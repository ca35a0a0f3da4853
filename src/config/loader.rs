//! Settings file loader and serialization.

use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

use super::DeployerSettings;

const APP_DIR: &str = "lumia-deployer";

/// Get the global settings path: <config dir>/lumia-deployer/settings.json
pub fn get_global_settings_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .ok_or_else(|| {
            ConfigError::ValidationFailed("Cannot determine configuration directory".to_string())
        })?;

    Ok(config_dir.join(APP_DIR).join("settings.json"))
}

/// Load settings from a JSON file.
pub fn load_settings_from_file(path: &Path) -> Result<DeployerSettings, ConfigError> {
    validate_settings_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.display().to_string())
        } else {
            ConfigError::from(e)
        }
    })?;

    Ok(serde_json::from_str(&content)?)
}

/// Save settings to a JSON file.
///
/// Writes to a sibling temp file first and renames it into place, so a crash
/// mid-write never leaves a truncated settings file.
pub fn save_settings_to_file(settings: &DeployerSettings, path: &Path) -> Result<(), ConfigError> {
    validate_settings_path(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json_content = serde_json::to_string_pretty(settings)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json_content)?;
    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Validate settings path (.json extension required).
pub fn validate_settings_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Settings path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "json" => Ok(()),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Settings file must have .json extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Settings file must have .json extension".to_string(),
        )),
    }
}
