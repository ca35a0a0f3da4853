//! Unified error type hierarchy for Lumia Deployer
//!
//! Provides structured error handling with ConfigError, DeviceError, DeployError
//! and CompositionError.

use std::io;
use thiserror::Error;

use crate::models::OperationKind;
use crate::sections::SectionKind;

/// Option and settings validation errors.
///
/// Raised before any device mutation happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No deployment options have been provided")]
    OptionsMissing,

    #[error("Image path is missing")]
    ImagePathMissing,

    #[error("Image index must be a positive number, got {0}")]
    InvalidImageIndex(u32),

    #[error("Size reserved for Windows must be at least 1 MB")]
    InvalidReservedSize,

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in settings: {0}")]
    InvalidJson(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    Io(String),
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::InvalidJson(e.to_string())
    }
}

/// Errors raised by a device backend or a section while touching the phone.
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotPresent(String),

    /// External tool failed (dism, bcdedit, bcdboot, diskpart)
    #[error("Command '{cmd}' failed: {reason}")]
    Command { cmd: String, reason: String },

    #[error("Unexpected tool output: {0}")]
    Parse(String),

    #[error("Driver package error: {0}")]
    DriverPackage(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for DeviceError {
    fn from(e: io::Error) -> Self {
        DeviceError::Io(e.to_string())
    }
}

/// Failure of an orchestrator operation.
#[derive(Error, Debug, Clone)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("No {kind} section was registered")]
    CapabilityNotFound { kind: SectionKind },

    #[error("Another operation is already running on the device: {running}")]
    OperationInProgress { running: OperationKind },

    #[error("Step '{step}' failed: {cause}")]
    StepFailed {
        step: String,
        #[source]
        cause: DeviceError,
    },

    #[error("Operation cancelled after step '{after_step}'")]
    Cancelled { after_step: String },
}

impl DeployError {
    /// Identity of the failing step, if the error came from the pipeline.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            DeployError::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }

    /// True when the error was raised before any device step ran.
    pub fn is_pre_device(&self) -> bool {
        matches!(
            self,
            DeployError::Configuration(_)
                | DeployError::CapabilityNotFound { .. }
                | DeployError::OperationInProgress { .. }
        )
    }

    /// Get a user-facing error message suitable for UI display
    pub fn user_message(&self) -> String {
        match self {
            DeployError::Configuration(e) => format!("Please check the deployment options: {}", e),
            DeployError::CapabilityNotFound { kind } => {
                format!("This deployer has no {} support installed", kind)
            }
            DeployError::OperationInProgress { running } => {
                format!("Please wait until '{}' finishes", running)
            }
            DeployError::StepFailed { step, cause } => {
                format!("Deployment stopped at '{}': {}", step, cause)
            }
            DeployError::Cancelled { after_step } => {
                format!("Cancelled. The device was left consistent after '{}'", after_step)
            }
        }
    }
}

/// Startup failure. Fatal: the process never runs partially composed.
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("Failed to construct service '{service}': {reason}")]
    Service { service: &'static str, reason: String },

    #[error("Failed to construct section '{section}': {reason}")]
    Section { section: &'static str, reason: String },

    #[error("Section id '{0}' registered twice")]
    DuplicateSection(&'static str),

    #[error("Settings could not be loaded: {0}")]
    Settings(#[from] ConfigError),
}

/// Top-level result type for startup code.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failure_display() {
        let err = DeployError::StepFailed {
            step: "apply-image".to_string(),
            cause: DeviceError::Command {
                cmd: "dism".to_string(),
                reason: "exit code 2".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Step 'apply-image' failed: Command 'dism' failed: exit code 2"
        );
        assert_eq!(err.failed_step(), Some("apply-image"));
        assert!(!err.is_pre_device());
    }

    #[test]
    fn test_config_error_is_pre_device() {
        let err: DeployError = ConfigError::OptionsMissing.into();
        assert!(err.is_pre_device());
        assert!(err.failed_step().is_none());
    }

    #[test]
    fn test_capability_not_found_message() {
        let err = DeployError::CapabilityNotFound { kind: SectionKind::Gpu };
        assert_eq!(err.to_string(), "No GPU section was registered");
        assert!(err.user_message().contains("GPU"));
    }
}
