//! Lumia backend: a phone in mass storage mode, driven with the Windows imaging tools.
//!
//! # Tool usage
//!
//! | Operation         | Tool                                                     |
//! |-------------------|----------------------------------------------------------|
//! | detect            | filesystem checks on the MainOS/EFIESP mounts            |
//! | backup            | copy of `EFIESP\efi` to a timestamped backup directory   |
//! | apply image       | `diskpart /s` then `dism /Apply-Image`                   |
//! | finalize          | `bcdboot` then `bcdedit /set {default} description`      |
//! | dual boot         | `bcdedit /enum {bootmgr}`, `/set {bootmgr} displaybootmenu` |
//! | drivers           | `dism /Add-Driver /Recurse`                              |

use chrono::Local;
use futures::future::{BoxFuture, FutureExt};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::bcd::{parse_display_boot_menu, parse_identifiers, yes_no};
use super::tools::{parse_dism_progress, run_tool};
use super::{Device, DeviceInfo};
use crate::config::{DeployerSettings, SettingsService};
use crate::error::DeviceError;
use crate::models::{ValidatedOptions, WINDOWS_BOOT_LABEL};
use crate::progress::OperationProgress;

/// Extract the drive letter of a Windows-style path ("W:\" -> 'W').
pub fn drive_letter(path: &Path) -> Option<char> {
    let text = path.to_str()?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => Some(letter.to_ascii_uppercase()),
        _ => None,
    }
}

/// diskpart script that creates and mounts the Windows partition.
pub fn diskpart_script(settings: &DeployerSettings, size_mb: u64, letter: char) -> String {
    format!(
        "select disk {}\r\ncreate partition primary size={}\r\nformat quick fs=ntfs label=\"{}\"\r\nassign letter={}\r\nexit\r\n",
        settings.disk_number, size_mb, settings.windows_partition_label, letter
    )
}

/// Recursively copy `source` into `target`. Returns the number of files copied.
fn copy_tree(source: &Path, target: &Path) -> io::Result<usize> {
    fs::create_dir_all(target)?;
    let mut copied = 0;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_tree(&entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Device backend for a Lumia phone exposed to the host in mass storage mode.
pub struct LumiaDevice {
    settings: Arc<SettingsService>,
}

impl LumiaDevice {
    pub fn new(settings: Arc<SettingsService>) -> Self {
        LumiaDevice { settings }
    }

    async fn detect_impl(&self) -> Result<DeviceInfo, DeviceError> {
        let settings = self.settings.get();

        for (volume, path) in [("MainOS", &settings.device_root), ("EFIESP", &settings.efiesp_root)] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(DeviceError::NotPresent(format!(
                    "{} volume is not mounted at {}",
                    volume,
                    path.display()
                )));
            }
        }

        let store = settings.bcd_store();
        if !tokio::fs::try_exists(&store).await.unwrap_or(false) {
            return Err(DeviceError::NotPresent(format!("no BCD store at {}", store.display())));
        }

        log::info!(
            "[Lumia] Found phone on disk {} (MainOS {}, EFIESP {})",
            settings.disk_number,
            settings.device_root.display(),
            settings.efiesp_root.display()
        );

        Ok(DeviceInfo {
            name: format!("Lumia on disk {}", settings.disk_number),
            main_os: settings.device_root,
            efiesp: settings.efiesp_root,
        })
    }

    async fn backup_impl(&self) -> Result<PathBuf, DeviceError> {
        let settings = self.settings.get();
        let source = settings.efiesp_root.join("efi");
        let target = settings
            .backup_dir
            .join(format!("EFIESP-{}", Local::now().format("%Y%m%d-%H%M%S")));

        let worker_target = target.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &worker_target))
            .await
            .map_err(|e| DeviceError::Io(format!("backup worker failed: {}", e)))??;

        log::info!("[Lumia] Backed up {} boot files to {}", copied, target.display());
        Ok(target)
    }

    async fn apply_image_impl(
        &self,
        options: &ValidatedOptions,
        progress: &OperationProgress,
    ) -> Result<(), DeviceError> {
        let settings = self.settings.get();
        let letter = drive_letter(&settings.windows_root).ok_or_else(|| {
            DeviceError::Parse(format!(
                "windows_root must be a drive root like W:\\, got {}",
                settings.windows_root.display()
            ))
        })?;

        // Partition
        let script_path = std::env::temp_dir().join(format!("lumia-deployer-diskpart-{}.txt", std::process::id()));
        tokio::fs::write(
            &script_path,
            diskpart_script(&settings, options.reserved_size().megabytes(), letter),
        )
        .await?;
        log::info!(
            "[Lumia] Creating {} Windows partition on disk {}",
            options.reserved_size(),
            settings.disk_number
        );
        let partitioned = run_tool(
            &settings.diskpart_path,
            [Path::new("/s").as_os_str(), script_path.as_os_str()],
            |line| log::trace!("[diskpart] {}", line),
        )
        .await;
        let _ = tokio::fs::remove_file(&script_path).await;
        partitioned?;

        // Image
        progress.reset();
        log::info!(
            "[Lumia] Applying {} (index {}) to {}",
            options.image_path().display(),
            options.image_index(),
            settings.windows_root.display()
        );
        run_tool(
            &settings.dism_path,
            [
                "/Apply-Image".to_string(),
                format!("/ImageFile:{}", options.image_path().display()),
                format!("/Index:{}", options.image_index()),
                format!("/ApplyDir:{}", settings.windows_root.display()),
            ],
            |line| match parse_dism_progress(line) {
                Some(percent) => progress.report(percent),
                None => log::trace!("[dism] {}", line),
            },
        )
        .await?;
        progress.report(100.0);
        Ok(())
    }

    async fn finalize_impl(&self) -> Result<(), DeviceError> {
        let settings = self.settings.get();
        let store = settings.bcd_store();
        let windows_dir = settings.windows_root.join("Windows");

        run_tool(
            &settings.bcdboot_path,
            [
                windows_dir.as_os_str(),
                Path::new("/s").as_os_str(),
                settings.efiesp_root.as_os_str(),
                Path::new("/f").as_os_str(),
                Path::new("UEFI").as_os_str(),
            ],
            |line| log::trace!("[bcdboot] {}", line),
        )
        .await?;

        run_tool(
            &settings.bcdedit_path,
            [
                "/store".to_string(),
                store.display().to_string(),
                "/set".to_string(),
                "{default}".to_string(),
                "description".to_string(),
                WINDOWS_BOOT_LABEL.to_string(),
            ],
            |line| log::trace!("[bcdedit] {}", line),
        )
        .await?;

        let listing = self.bcdedit_enum(&settings, "{default}").await?;
        if parse_identifiers(&listing).is_empty() {
            return Err(DeviceError::Parse("bcdboot did not create a default boot entry".to_string()));
        }
        log::info!("[Lumia] Boot entry '{}' created", WINDOWS_BOOT_LABEL);
        Ok(())
    }

    async fn bcdedit_enum(&self, settings: &DeployerSettings, object: &str) -> Result<String, DeviceError> {
        let output = run_tool(
            &settings.bcdedit_path,
            [
                "/store".to_string(),
                settings.bcd_store().display().to_string(),
                "/enum".to_string(),
                object.to_string(),
            ],
            |_| {},
        )
        .await?;
        Ok(output.stdout)
    }

    async fn dual_boot_enabled_impl(&self) -> Result<bool, DeviceError> {
        let settings = self.settings.get();
        let listing = self.bcdedit_enum(&settings, "{bootmgr}").await?;
        parse_display_boot_menu(&listing)
    }

    async fn set_dual_boot_impl(&self, enable: bool) -> Result<(), DeviceError> {
        let settings = self.settings.get();
        run_tool(
            &settings.bcdedit_path,
            [
                "/store".to_string(),
                settings.bcd_store().display().to_string(),
                "/set".to_string(),
                "{bootmgr}".to_string(),
                "displaybootmenu".to_string(),
                yes_no(enable).to_string(),
            ],
            |line| log::trace!("[bcdedit] {}", line),
        )
        .await?;
        Ok(())
    }

    async fn install_drivers_impl(&self, package: &Path, progress: &OperationProgress) -> Result<(), DeviceError> {
        let settings = self.settings.get();
        progress.reset();
        run_tool(
            &settings.dism_path,
            [
                format!("/Image:{}", settings.windows_root.display()),
                "/Add-Driver".to_string(),
                format!("/Driver:{}", package.display()),
                "/Recurse".to_string(),
            ],
            |line| match parse_dism_progress(line) {
                Some(percent) => progress.report(percent),
                None if line.contains("Installing") => log::info!("[dism] {}", line.trim()),
                None => log::trace!("[dism] {}", line),
            },
        )
        .await?;
        progress.report(100.0);
        Ok(())
    }
}

impl Device for LumiaDevice {
    fn describe(&self) -> String {
        format!("Lumia (disk {})", self.settings.get().disk_number)
    }

    fn detect(&self) -> BoxFuture<'_, Result<DeviceInfo, DeviceError>> {
        self.detect_impl().boxed()
    }

    fn backup_boot_configuration(&self) -> BoxFuture<'_, Result<PathBuf, DeviceError>> {
        self.backup_impl().boxed()
    }

    fn apply_image<'a>(
        &'a self,
        options: &'a ValidatedOptions,
        progress: &'a OperationProgress,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.apply_image_impl(options, progress).boxed()
    }

    fn finalize_boot_entries(&self) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.finalize_impl().boxed()
    }

    fn dual_boot_enabled(&self) -> BoxFuture<'_, Result<bool, DeviceError>> {
        self.dual_boot_enabled_impl().boxed()
    }

    fn set_dual_boot(&self, enable: bool) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.set_dual_boot_impl(enable).boxed()
    }

    fn install_drivers<'a>(
        &'a self,
        package: &'a Path,
        progress: &'a OperationProgress,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.install_drivers_impl(package, progress).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsManager;

    fn device_with(settings: DeployerSettings, dir: &Path) -> LumiaDevice {
        let manager = SettingsManager::new(dir.join("settings.json"));
        LumiaDevice::new(Arc::new(SettingsService::with_settings(manager, settings)))
    }

    #[test]
    fn test_drive_letter() {
        assert_eq!(drive_letter(Path::new(r"W:\")), Some('W'));
        assert_eq!(drive_letter(Path::new("e:")), Some('E'));
        assert_eq!(drive_letter(Path::new("/mnt/windows")), None);
    }

    #[test]
    fn test_diskpart_script() {
        let settings = DeployerSettings::default();
        let script = diskpart_script(&settings, 30 * 1024, 'W');
        assert!(script.starts_with("select disk 1\r\n"));
        assert!(script.contains("create partition primary size=30720"));
        assert!(script.contains("label=\"WindowsARM\""));
        assert!(script.contains("assign letter=W"));
    }

    #[tokio::test]
    async fn test_detect_reports_missing_volume() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut settings = DeployerSettings::default();
        settings.device_root = temp.path().join("MainOS");
        settings.efiesp_root = temp.path().join("EFIESP");

        let device = device_with(settings, temp.path());
        let err = device.detect().await.unwrap_err();
        assert!(matches!(err, DeviceError::NotPresent(ref m) if m.contains("MainOS")));
    }

    #[tokio::test]
    async fn test_detect_and_backup_on_mounted_layout() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut settings = DeployerSettings::default();
        settings.device_root = temp.path().join("MainOS");
        settings.efiesp_root = temp.path().join("EFIESP");
        settings.backup_dir = temp.path().join("Backups");
        fs::create_dir_all(&settings.device_root).expect("mainos");
        let boot_dir = settings.efiesp_root.join("efi").join("Microsoft").join("Boot");
        fs::create_dir_all(&boot_dir).expect("boot dir");
        fs::write(boot_dir.join("BCD"), b"bcd").expect("bcd");
        fs::write(settings.efiesp_root.join("efi").join("bootarm.efi"), b"efi").expect("efi");

        let device = device_with(settings.clone(), temp.path());
        let info = device.detect().await.expect("detected");
        assert_eq!(info.efiesp, settings.efiesp_root);

        let backup = device.backup_boot_configuration().await.expect("backup");
        assert!(backup.starts_with(&settings.backup_dir));
        assert!(backup.join("Microsoft").join("Boot").join("BCD").exists());
        assert!(backup.join("bootarm.efi").exists());
    }
}
