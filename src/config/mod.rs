//! Configuration module for the deployer.
//!
//! # Settings Management
//!
//! The `SettingsService` provides thread-safe access to `DeployerSettings`:
//! - Uses `RwLock<DeployerSettings>` for parallel reads
//! - Persists state to `<config dir>/lumia-deployer/settings.json`
//! - Falls back to defaults when the file is missing or unreadable

pub mod loader;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Persistent deployer settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeployerSettings {
    // Phone volumes as mounted on the host (mass storage mode)
    pub device_root: PathBuf,
    pub efiesp_root: PathBuf,
    /// Where the new Windows partition gets mounted
    pub windows_root: PathBuf,
    /// Disk number of the phone as reported by diskpart
    pub disk_number: u32,
    pub windows_partition_label: String,

    // Host-side locations
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
    pub gpu_driver_path: PathBuf,

    // Defaults offered by the front-ends
    pub default_image_index: u32,
    pub default_reserved_gb: f64,

    // External tools
    pub dism_path: String,
    pub bcdedit_path: String,
    pub bcdboot_path: String,
    pub diskpart_path: String,
}

impl Default for DeployerSettings {
    fn default() -> Self {
        DeployerSettings {
            device_root: PathBuf::from(r"D:\"),
            efiesp_root: PathBuf::from(r"D:\EFIESP"),
            windows_root: PathBuf::from(r"W:\"),
            disk_number: 1,
            windows_partition_label: "WindowsARM".to_string(),
            backup_dir: PathBuf::from("Backups"),
            log_dir: PathBuf::from("Logs"),
            gpu_driver_path: PathBuf::from(r"Drivers\GPU"),
            default_image_index: 1,
            default_reserved_gb: 18.0,
            dism_path: "dism".to_string(),
            bcdedit_path: "bcdedit".to_string(),
            bcdboot_path: "bcdboot".to_string(),
            diskpart_path: "diskpart".to_string(),
        }
    }
}

impl DeployerSettings {
    /// Path of the BCD store on the EFIESP partition.
    pub fn bcd_store(&self) -> PathBuf {
        self.efiesp_root.join("efi").join("Microsoft").join("Boot").join("BCD")
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed("device_root is empty".to_string()));
        }
        if self.efiesp_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed("efiesp_root is empty".to_string()));
        }
        if self.default_image_index == 0 {
            return Err(ConfigError::InvalidImageIndex(0));
        }
        for (name, tool) in [
            ("dism_path", &self.dism_path),
            ("bcdedit_path", &self.bcdedit_path),
            ("bcdboot_path", &self.bcdboot_path),
            ("diskpart_path", &self.diskpart_path),
        ] {
            if tool.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!("{} is empty", name)));
            }
        }
        Ok(())
    }
}

/// Loads and persists [`DeployerSettings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    path: PathBuf,
}

impl SettingsManager {
    pub fn new(path: PathBuf) -> Self {
        SettingsManager { path }
    }

    /// Manager for the per-user settings file.
    pub fn global() -> Result<Self, ConfigError> {
        Ok(SettingsManager::new(loader::get_global_settings_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, or return defaults if the file doesn't exist.
    ///
    /// A file that fails to parse also yields defaults (with a warning) so a
    /// format change never bricks startup. Settings that parse but fail
    /// validation are an error.
    pub fn load(&self) -> Result<DeployerSettings, ConfigError> {
        let settings = match loader::load_settings_from_file(&self.path) {
            Ok(settings) => settings,
            Err(ConfigError::FileNotFound(_)) => DeployerSettings::default(),
            Err(ConfigError::InvalidJson(e)) => {
                eprintln!(
                    "[Config] [WARNING] Failed to parse {}, falling back to defaults: {}",
                    self.path.display(),
                    e
                );
                DeployerSettings::default()
            }
            Err(e) => return Err(e),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, settings: &DeployerSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        loader::save_settings_to_file(settings, &self.path)
    }
}

/// Settings singleton shared by the composition root, device backend and UI.
#[derive(Debug)]
pub struct SettingsService {
    manager: SettingsManager,
    current: RwLock<DeployerSettings>,
}

impl SettingsService {
    pub fn load(manager: SettingsManager) -> Result<Self, ConfigError> {
        let current = manager.load()?;
        Ok(SettingsService {
            manager,
            current: RwLock::new(current),
        })
    }

    /// In-memory service (tests, first run) that still persists to `manager` on save.
    pub fn with_settings(manager: SettingsManager, settings: DeployerSettings) -> Self {
        SettingsService {
            manager,
            current: RwLock::new(settings),
        }
    }

    pub fn get(&self) -> DeployerSettings {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a change, validate it and persist it. On failure the previous settings stay in effect.
    pub fn update<F>(&self, change: F) -> Result<DeployerSettings, ConfigError>
    where
        F: FnOnce(&mut DeployerSettings),
    {
        let mut next = self.get();
        change(&mut next);
        self.manager.save(&next)?;

        let mut guard = self
            .current
            .write()
            .map_err(|e| ConfigError::ValidationFailed(format!("settings lock poisoned: {}", e)))?;
        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = DeployerSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.bcd_store().ends_with("BCD"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = tempfile::tempdir().expect("temp dir");
        let manager = SettingsManager::new(temp.path().join("settings.json"));
        assert_eq!(manager.load().expect("defaults"), DeployerSettings::default());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{ not json").expect("write");
        let manager = SettingsManager::new(path);
        assert_eq!(manager.load().expect("defaults"), DeployerSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{ "disk_number": 4 }"#).expect("write");
        let loaded = SettingsManager::new(path).load().expect("load");
        assert_eq!(loaded.disk_number, 4);
        assert_eq!(loaded.dism_path, "dism");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{ "dism_path": "  " }"#).expect("write");
        assert!(SettingsManager::new(path).load().is_err());
    }

    #[test]
    fn test_service_update_persists() {
        let temp = tempfile::tempdir().expect("temp dir");
        let manager = SettingsManager::new(temp.path().join("settings.json"));
        let service = SettingsService::load(manager.clone()).expect("service");

        service
            .update(|s| s.default_reserved_gb = 24.0)
            .expect("update");
        assert_eq!(service.get().default_reserved_gb, 24.0);
        assert_eq!(manager.load().expect("reload").default_reserved_gb, 24.0);

        // Rejected update leaves state untouched
        assert!(service.update(|s| s.default_image_index = 0).is_err());
        assert_eq!(service.get().default_image_index, 1);
    }
}
