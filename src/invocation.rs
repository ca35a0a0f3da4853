//! Front-end adapter: one external invocation, exactly one orchestrator call.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{ByteSize, DeploymentResult, InstallOptions};
use crate::options::OptionsProvider;
use crate::orchestrator::AutoDeployer;

/// Raw deploy arguments as typed by the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployArgs {
    pub wim: Option<PathBuf>,
    pub index: Option<i64>,
    pub reserved_gb: Option<f64>,
}

/// The four things a front-end can ask for.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Deploy(DeployArgs),
    EnableDualBoot,
    DisableDualBoot,
    InstallGpu,
}

impl Invocation {
    pub fn verb(&self) -> &'static str {
        match self {
            Invocation::Deploy(_) => "deploy",
            Invocation::EnableDualBoot => "enable-dual-boot",
            Invocation::DisableDualBoot => "disable-dual-boot",
            Invocation::InstallGpu => "install-gpu",
        }
    }
}

/// The invocation was rejected before reaching the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationError {
    #[error("Invalid arguments: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl InvocationError {
    pub fn messages(&self) -> &[String] {
        match self {
            InvocationError::Invalid(messages) => messages,
        }
    }
}

/// Turn raw deploy arguments into options, collecting every problem.
pub fn validate_deploy_args(args: &DeployArgs) -> Result<InstallOptions, Vec<String>> {
    let mut messages = Vec::new();

    let wim = match args.wim {
        None => {
            messages.push("--wim is required: path to the Windows image".to_string());
            None
        }
        Some(ref path) if path.as_os_str().is_empty() => {
            messages.push("--wim must not be empty".to_string());
            None
        }
        Some(ref path) if !path.is_file() => {
            messages.push(format!("Image file not found: {}", path.display()));
            None
        }
        Some(ref path) => Some(path.clone()),
    };

    let index = match args.index {
        None => {
            messages.push("--index is required: image index inside the WIM".to_string());
            None
        }
        Some(index) if index <= 0 || index > u32::MAX as i64 => {
            messages.push(format!("--index must be a positive number, got {}", index));
            None
        }
        Some(index) => Some(index as u32),
    };

    let reserved = match args.reserved_gb {
        None => {
            messages.push("--reserved-gb is required: space to reserve for Windows".to_string());
            None
        }
        Some(gb) if !gb.is_finite() || gb <= 0.0 => {
            messages.push(format!("--reserved-gb must be greater than zero, got {}", gb));
            None
        }
        Some(gb) if ByteSize::from_gigabytes(gb).megabytes() == 0 => {
            messages.push(format!("--reserved-gb must be at least 1 MB, got {}", gb));
            None
        }
        Some(gb) => Some(ByteSize::from_gigabytes(gb)),
    };

    match (wim, index, reserved) {
        (Some(wim), Some(index), Some(reserved)) if messages.is_empty() => {
            let options = InstallOptions::new(wim, index, reserved);
            // Values that pass the checks above but still fail model validation
            match options.validate() {
                Ok(_) => Ok(options),
                Err(e) => Err(vec![e.to_string()]),
            }
        }
        _ => Err(messages),
    }
}

/// Make the single orchestrator call for `invocation`.
///
/// Deploy fills `options` first and then calls [`AutoDeployer::deploy`].
pub async fn dispatch(
    deployer: &dyn AutoDeployer,
    options: &OptionsProvider,
    invocation: Invocation,
) -> Result<DeploymentResult, InvocationError> {
    let result = match invocation {
        Invocation::Deploy(ref args) => {
            let install_options = validate_deploy_args(args).map_err(InvocationError::Invalid)?;
            options
                .set(install_options)
                .map_err(|e| InvocationError::Invalid(vec![e.to_string()]))?;
            deployer.deploy().await
        }
        Invocation::EnableDualBoot => deployer.toggle_dual_boot(true).await,
        Invocation::DisableDualBoot => deployer.toggle_dual_boot(false).await,
        Invocation::InstallGpu => deployer.install_gpu().await,
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_arguments_are_all_reported() {
        let messages = validate_deploy_args(&DeployArgs::default()).unwrap_err();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("--wim"));
        assert!(messages[1].contains("--index"));
        assert!(messages[2].contains("--reserved-gb"));
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        let args = DeployArgs {
            wim: Some(temp.path().to_path_buf()),
            index: Some(0),
            reserved_gb: Some(-1.0),
        };
        let messages = validate_deploy_args(&args).unwrap_err();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("got 0"));
        assert!(messages[1].contains("got -1"));
    }

    #[test]
    fn test_reserved_size_below_one_megabyte_rejected() {
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        let args = DeployArgs {
            wim: Some(temp.path().to_path_buf()),
            index: Some(1),
            reserved_gb: Some(0.0005),
        };
        let messages = validate_deploy_args(&args).unwrap_err();
        assert_eq!(messages, vec!["--reserved-gb must be at least 1 MB, got 0.0005".to_string()]);

        let args = DeployArgs {
            reserved_gb: Some(1.0 / 1024.0),
            ..args
        };
        let options = validate_deploy_args(&args).expect("exactly 1 MB");
        assert_eq!(options.reserved_size.megabytes(), 1);
    }

    #[test]
    fn test_missing_image_file_rejected() {
        let args = DeployArgs {
            wim: Some(PathBuf::from("/no/such/install.wim")),
            index: Some(1),
            reserved_gb: Some(30.0),
        };
        let messages = validate_deploy_args(&args).unwrap_err();
        assert_eq!(messages, vec!["Image file not found: /no/such/install.wim".to_string()]);
    }

    #[test]
    fn test_valid_arguments() {
        let temp = tempfile::NamedTempFile::new().expect("temp file");
        let args = DeployArgs {
            wim: Some(temp.path().to_path_buf()),
            index: Some(2),
            reserved_gb: Some(30.0),
        };
        let options = validate_deploy_args(&args).expect("valid");
        assert_eq!(options.image_index, 2);
        assert_eq!(options.reserved_size, ByteSize::from_gigabytes(30.0));
    }

    #[test]
    fn test_verbs() {
        assert_eq!(Invocation::Deploy(DeployArgs::default()).verb(), "deploy");
        assert_eq!(Invocation::DisableDualBoot.verb(), "disable-dual-boot");
    }
}
