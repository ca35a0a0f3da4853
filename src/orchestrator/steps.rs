//! Deployment steps and the context they run in.
//!
//! Deploy is the fixed sequence returned by [`deploy_pipeline`]; sections are
//! adapted into steps by [`SectionStep`]. Every step is atomic relative to the
//! pipeline: when it fails, nothing after it runs.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use super::state::PipelinePhase;
use crate::device::Device;
use crate::error::DeviceError;
use crate::events::{EventBus, LogEvent, LogLevel};
use crate::models::{OperationKind, ValidatedOptions};
use crate::progress::OperationProgress;
use crate::sections::Section;

/// What a running step can reach.
#[derive(Clone)]
pub struct StepContext {
    pub operation: OperationKind,
    pub run_id: u64,
    pub device: Arc<dyn Device>,
    pub bus: Arc<EventBus>,
    pub progress: Arc<OperationProgress>,
}

impl StepContext {
    /// Publish an event tagged with this run.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.bus
            .publish(LogEvent::new(level, message).for_run(self.operation, self.run_id));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Information, message);
    }

    pub fn verbose(&self, message: impl Into<String>) {
        self.log(LogLevel::Verbose, message);
    }
}

/// One unit of work in an operation pipeline.
pub trait DeploymentStep: Send + Sync {
    /// Stable identity reported in `StepFailed` and `Cancelled`.
    fn id(&self) -> &str;

    fn description(&self) -> String;

    fn phase(&self) -> PipelinePhase;

    /// Whether a pending cancellation may stop the pipeline right after this step.
    fn is_safe_checkpoint(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>>;
}

pub struct ValidateDeviceStep;

impl DeploymentStep for ValidateDeviceStep {
    fn id(&self) -> &str {
        "validate-device"
    }

    fn description(&self) -> String {
        "Looking for the phone".to_string()
    }

    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Validating
    }

    fn execute<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>> {
        async move {
            let info = ctx.device.detect().await?;
            ctx.info(format!("Found {}", info.name));
            Ok(())
        }
        .boxed()
    }
}

pub struct BackupBootConfigStep;

impl DeploymentStep for BackupBootConfigStep {
    fn id(&self) -> &str {
        "backup-boot-config"
    }

    fn description(&self) -> String {
        "Backing up the boot configuration".to_string()
    }

    fn phase(&self) -> PipelinePhase {
        PipelinePhase::BackingUp
    }

    fn execute<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>> {
        async move {
            let location = ctx.device.backup_boot_configuration().await?;
            ctx.info(format!("Boot configuration saved to {}", location.display()));
            Ok(())
        }
        .boxed()
    }
}

/// Partition commit and image apply. Not a safe checkpoint.
pub struct ApplyImageStep {
    options: ValidatedOptions,
}

impl ApplyImageStep {
    pub fn new(options: ValidatedOptions) -> Self {
        ApplyImageStep { options }
    }
}

impl DeploymentStep for ApplyImageStep {
    fn id(&self) -> &str {
        "apply-image"
    }

    fn description(&self) -> String {
        format!(
            "Applying image {} from {} ({} reserved for Windows)",
            self.options.image_index(),
            self.options.image_path().display(),
            self.options.reserved_size()
        )
    }

    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Applying
    }

    fn is_safe_checkpoint(&self) -> bool {
        false
    }

    fn execute<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>> {
        ctx.device.apply_image(&self.options, &ctx.progress)
    }
}

pub struct FinalizeBootEntriesStep;

impl DeploymentStep for FinalizeBootEntriesStep {
    fn id(&self) -> &str {
        "finalize-boot-entries"
    }

    fn description(&self) -> String {
        "Creating boot entries".to_string()
    }

    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Finalizing
    }

    fn execute<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>> {
        ctx.device.finalize_boot_entries()
    }
}

/// Runs a registered section as a pipeline step.
pub struct SectionStep {
    section: Arc<dyn Section>,
}

impl SectionStep {
    pub fn new(section: Arc<dyn Section>) -> Self {
        SectionStep { section }
    }
}

impl DeploymentStep for SectionStep {
    fn id(&self) -> &str {
        self.section.id()
    }

    fn description(&self) -> String {
        self.section.description()
    }

    fn phase(&self) -> PipelinePhase {
        PipelinePhase::RunningSection
    }

    fn execute<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.section.run(ctx)
    }
}

/// validate-device -> backup-boot-config -> apply-image -> finalize-boot-entries
pub fn deploy_pipeline(options: ValidatedOptions) -> Vec<Box<dyn DeploymentStep>> {
    vec![
        Box::new(ValidateDeviceStep),
        Box::new(BackupBootConfigStep),
        Box::new(ApplyImageStep::new(options)),
        Box::new(FinalizeBootEntriesStep),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ByteSize, InstallOptions};

    #[test]
    fn test_deploy_pipeline_order_and_checkpoints() {
        let options = InstallOptions::new("install.wim", 1, ByteSize::from_gigabytes(30.0))
            .validate()
            .expect("valid");
        let steps = deploy_pipeline(options);

        let ids: Vec<&str> = steps.iter().map(|s| s.id()).collect();
        assert_eq!(
            ids,
            vec!["validate-device", "backup-boot-config", "apply-image", "finalize-boot-entries"]
        );

        let checkpoints: Vec<bool> = steps.iter().map(|s| s.is_safe_checkpoint()).collect();
        assert_eq!(checkpoints, vec![true, true, false, true]);

        for pair in steps.windows(2) {
            assert!(pair[0].phase().can_transition_to(pair[1].phase()));
        }
        assert!(steps[2].description().contains("30.00 GB"));
    }
}
