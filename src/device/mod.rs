//! Device backends: the only code that touches the phone.
//!
//! The orchestrator drives a [`Device`] through its deployment steps and never
//! talks to dism/bcdedit/diskpart directly. Tests substitute a recording double.

pub mod bcd;
pub mod lumia;
pub mod tools;

pub use lumia::LumiaDevice;

use futures::future::BoxFuture;
use std::path::{Path, PathBuf};

use crate::error::DeviceError;
use crate::models::ValidatedOptions;
use crate::progress::OperationProgress;

/// What detection found on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub main_os: PathBuf,
    pub efiesp: PathBuf,
}

/// Hardware operations needed by the orchestrator and its sections.
///
/// Each mutating call must leave the device recoverable when it fails.
pub trait Device: Send + Sync {
    /// Short human-readable name of the backend.
    fn describe(&self) -> String;

    /// Check that the target device is attached and its volumes are reachable.
    fn detect(&self) -> BoxFuture<'_, Result<DeviceInfo, DeviceError>>;

    /// Copy the boot configuration somewhere safe. Returns the backup location.
    fn backup_boot_configuration(&self) -> BoxFuture<'_, Result<PathBuf, DeviceError>>;

    /// Carve out `reserved_size` for Windows and apply the image into it.
    fn apply_image<'a>(
        &'a self,
        options: &'a ValidatedOptions,
        progress: &'a OperationProgress,
    ) -> BoxFuture<'a, Result<(), DeviceError>>;

    /// Create the boot entries for the freshly applied image.
    fn finalize_boot_entries(&self) -> BoxFuture<'_, Result<(), DeviceError>>;

    /// Whether the boot menu is currently shown.
    fn dual_boot_enabled(&self) -> BoxFuture<'_, Result<bool, DeviceError>>;

    fn set_dual_boot(&self, enable: bool) -> BoxFuture<'_, Result<(), DeviceError>>;

    /// Inject every driver found (recursively) under `package` into the Windows image.
    fn install_drivers<'a>(
        &'a self,
        package: &'a Path,
        progress: &'a OperationProgress,
    ) -> BoxFuture<'a, Result<(), DeviceError>>;
}
