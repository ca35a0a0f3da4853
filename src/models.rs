//! Core data types for Lumia Deployer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, DeployError};

/// Byte count used for partition sizing.
///
/// Gigabytes are binary (1 GB = 1024^3 bytes), matching what diskpart expects
/// when sizes are handed over in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const MB: u64 = 1024 * 1024;
    pub const GB: u64 = 1024 * 1024 * 1024;

    pub const fn from_bytes(bytes: u64) -> Self {
        ByteSize(bytes)
    }

    /// Convert a (possibly fractional) gigabyte count. Negative and NaN inputs saturate to zero.
    pub fn from_gigabytes(gb: f64) -> Self {
        ByteSize((gb * Self::GB as f64).round() as u64)
    }

    pub const fn bytes(&self) -> u64 {
        self.0
    }

    pub fn megabytes(&self) -> u64 {
        self.0 / Self::MB
    }

    pub fn gigabytes(&self) -> f64 {
        self.0 as f64 / Self::GB as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= Self::GB {
            write!(f, "{:.2} GB", self.gigabytes())
        } else {
            write!(f, "{} MB", self.megabytes())
        }
    }
}

/// Parameters of one deployment run, as captured by a front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Path to the WIM image
    pub image_path: PathBuf,
    /// 1-based index of the image inside the WIM
    pub image_index: u32,
    /// Space carved out of the phone storage for Windows
    pub reserved_size: ByteSize,
}

impl InstallOptions {
    pub fn new(image_path: impl Into<PathBuf>, image_index: u32, reserved_size: ByteSize) -> Self {
        InstallOptions {
            image_path: image_path.into(),
            image_index,
            reserved_size,
        }
    }

    /// Check every field. The first problem found is reported.
    pub fn validate(&self) -> Result<ValidatedOptions, ConfigError> {
        let errors = self.validation_errors();
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(ValidatedOptions(self.clone())),
        }
    }

    /// All validation problems, in field order.
    pub fn validation_errors(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.image_path.as_os_str().is_empty() {
            errors.push(ConfigError::ImagePathMissing);
        }
        if self.image_index == 0 {
            errors.push(ConfigError::InvalidImageIndex(self.image_index));
        }
        // diskpart sizes partitions in whole megabytes
        if self.reserved_size.megabytes() == 0 {
            errors.push(ConfigError::InvalidReservedSize);
        }
        errors
    }
}

/// Options that passed validation. The deployment pipeline only accepts this type.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOptions(InstallOptions);

impl ValidatedOptions {
    pub fn image_path(&self) -> &Path {
        &self.0.image_path
    }

    pub fn image_index(&self) -> u32 {
        self.0.image_index
    }

    pub fn reserved_size(&self) -> ByteSize {
        self.0.reserved_size
    }

    pub fn into_inner(self) -> InstallOptions {
        self.0
    }
}

/// The three orchestrator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Deploy,
    ToggleDualBoot,
    InstallGpu,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deploy => "deploy",
            OperationKind::ToggleDualBoot => "toggle-dual-boot",
            OperationKind::InstallGpu => "install-gpu",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dual boot state before and after a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualBootChange {
    pub previous: bool,
    pub current: bool,
}

impl DualBootChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Successful outcome of an orchestrator operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentReport {
    pub operation: OperationKind,
    pub run_id: u64,
    /// Steps that ran to completion, in execution order
    pub completed_steps: Vec<String>,
    pub dual_boot: Option<DualBootChange>,
}

/// Returned synchronously to whoever invoked the operation. Never persisted.
pub type DeploymentResult = Result<DeploymentReport, DeployError>;

/// Boot entry description written during finalization.
pub const WINDOWS_BOOT_LABEL: &str = "Windows 10 ARM";
