//! Deployment orchestration: Deploy, ToggleDualBoot and InstallGpu against one device.
//!
//! Every operation:
//! - emits exactly one `Start` event and one terminal (`Success`/`Failure`) event,
//!   also when the caller drops the future before it completes
//! - holds the device lock for its whole duration; a concurrent call is rejected
//!   with `OperationInProgress` instead of queueing
//! - stops at the first failing step and never retries
//! - honours cancellation only at safe checkpoints; a request made during
//!   apply takes effect after finalize

pub mod cancel;
pub mod state;
pub mod steps;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use state::{PhaseSnapshot, PhaseTracker, PipelinePhase};
pub use steps::{deploy_pipeline, DeploymentStep, SectionStep, StepContext};

use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::Device;
use crate::error::{DeployError, DeviceError};
use crate::events::{EventBus, LifecycleMarker, LogEvent, LogLevel};
use crate::models::{DeploymentReport, DeploymentResult, DualBootChange, InstallOptions, OperationKind};
use crate::options::OptionsProvider;
use crate::progress::OperationProgress;
use crate::sections::{SectionKind, SectionRegistry};
use crate::services::Services;

/// The orchestrator contract front-ends program against.
pub trait AutoDeployer: Send + Sync {
    /// Deploy with the options currently held by the options provider (consumed).
    fn deploy(&self) -> BoxFuture<'_, DeploymentResult>;

    /// Deploy with explicitly supplied options.
    fn deploy_with(&self, options: InstallOptions) -> BoxFuture<'_, DeploymentResult>;

    /// Show or hide the boot menu. Idempotent.
    fn toggle_dual_boot(&self, enable: bool) -> BoxFuture<'_, DeploymentResult>;

    /// Run the registered GPU section.
    fn install_gpu(&self) -> BoxFuture<'_, DeploymentResult>;

    /// Ask the running operation to stop at its next safe checkpoint.
    fn cancel(&self);
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn lock_slot(slot: &Mutex<Option<OperationKind>>) -> MutexGuard<'_, Option<OperationKind>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Held for the duration of one operation.
///
/// The device lock is taken and released only while the `running` slot is
/// locked, so the slot always names the holder of the device lock.
struct OperationGuard<'a> {
    device: Option<tokio::sync::MutexGuard<'a, ()>>,
    running: &'a Mutex<Option<OperationKind>>,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock_slot(self.running);
        *slot = None;
        self.device.take();
    }
}

/// Lifecycle of one call: `Start` when created, then exactly one terminal event,
/// from [`finish`](Self::finish) or, if the caller drops the future, from `Drop`.
struct RunScope<'a> {
    bus: &'a EventBus,
    phase: &'a PhaseTracker,
    operation: OperationKind,
    run_id: u64,
    finished: bool,
}

impl RunScope<'_> {
    fn finish(mut self, result: DeploymentResult) -> DeploymentResult {
        self.finished = true;
        let event = match result {
            Ok(ref report) => LogEvent::new(
                LogLevel::Information,
                format!("{} completed ({} steps)", self.operation, report.completed_steps.len()),
            )
            .with_marker(LifecycleMarker::Success),
            Err(ref err) => {
                let level = match err {
                    DeployError::Cancelled { .. } => LogLevel::Warning,
                    _ => LogLevel::Error,
                };
                LogEvent::new(level, format!("{} failed: {}", self.operation, err.user_message()))
                    .with_exception(err.to_string())
                    .with_marker(LifecycleMarker::Failure)
            }
        };
        self.bus.publish(event.for_run(self.operation, self.run_id));
        result
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.phase.abandon(self.run_id);
        self.bus.publish(
            LogEvent::new(
                LogLevel::Warning,
                format!("{} abandoned before it finished", self.operation),
            )
            .for_run(self.operation, self.run_id)
            .with_marker(LifecycleMarker::Failure),
        );
    }
}

/// [`AutoDeployer`] over a single device.
pub struct Orchestrator {
    device: Arc<dyn Device>,
    bus: Arc<EventBus>,
    options: Arc<OptionsProvider>,
    progress: Arc<OperationProgress>,
    sections: SectionRegistry,

    /// One operation per device at a time
    device_lock: tokio::sync::Mutex<()>,
    running: Mutex<Option<OperationKind>>,

    next_run_id: AtomicU64,
    phase: Arc<PhaseTracker>,
    cancel: CancelHandle,
    cancel_token: CancelToken,
}

impl Orchestrator {
    /// Build an orchestrator over the composed services. The section registry is closed from here on.
    pub fn new(services: &Services, sections: SectionRegistry) -> Self {
        let (cancel, cancel_token) = cancel_pair();
        Orchestrator {
            device: Arc::clone(&services.device),
            bus: Arc::clone(&services.bus),
            options: Arc::clone(&services.options),
            progress: Arc::clone(&services.progress),
            sections,
            device_lock: tokio::sync::Mutex::new(()),
            running: Mutex::new(None),
            next_run_id: AtomicU64::new(1),
            phase: Arc::new(PhaseTracker::new()),
            cancel,
            cancel_token,
        }
    }

    pub fn sections(&self) -> &SectionRegistry {
        &self.sections
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn options(&self) -> &Arc<OptionsProvider> {
        &self.options
    }

    pub fn progress(&self) -> &Arc<OperationProgress> {
        &self.progress
    }

    pub fn phase(&self) -> PhaseSnapshot {
        self.phase.snapshot()
    }

    /// Handle a front-end can keep to cancel from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Operation currently holding the device, if any.
    pub fn running(&self) -> Option<OperationKind> {
        *lock_slot(&self.running)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    fn begin(&self, operation: OperationKind) -> RunScope<'_> {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        self.bus.publish(
            LogEvent::new(LogLevel::Information, format!("Starting {}", operation))
                .for_run(operation, run_id)
                .with_marker(LifecycleMarker::Start),
        );
        RunScope {
            bus: &self.bus,
            phase: &self.phase,
            operation,
            run_id,
            finished: false,
        }
    }

    /// Take the device or fail fast.
    fn acquire(&self, operation: OperationKind, run_id: u64) -> Result<OperationGuard<'_>, DeployError> {
        let mut slot = lock_slot(&self.running);
        if let Some(running) = *slot {
            return Err(DeployError::OperationInProgress { running });
        }
        // An empty slot means the device lock is free; both change only under the slot lock
        let device = self
            .device_lock
            .try_lock()
            .map_err(|_| DeployError::OperationInProgress { running: operation })?;

        // Clear stale requests before `cancel()` can see this operation as running
        self.cancel.reset();
        *slot = Some(operation);
        drop(slot);

        self.progress.reset();
        self.phase.begin(operation, run_id);

        Ok(OperationGuard {
            device: Some(device),
            running: &self.running,
        })
    }

    fn context(&self, operation: OperationKind, run_id: u64) -> StepContext {
        StepContext {
            operation,
            run_id,
            device: Arc::clone(&self.device),
            bus: Arc::clone(&self.bus),
            progress: Arc::clone(&self.progress),
        }
    }

    fn enter(&self, ctx: &StepContext, next: PipelinePhase) {
        if let Err(e) = self.phase.transition_to(next) {
            ctx.log(LogLevel::Debug, e);
        }
    }

    /// Report a failed step on the stream and turn it into the operation error.
    fn step_failed(&self, ctx: &StepContext, step: &str, cause: DeviceError) -> DeployError {
        self.enter(ctx, PipelinePhase::Failed);
        ctx.bus.publish(
            LogEvent::new(LogLevel::Error, format!("Step '{}' failed", step))
                .with_exception(cause.to_string())
                .for_run(ctx.operation, ctx.run_id),
        );
        DeployError::StepFailed {
            step: step.to_string(),
            cause,
        }
    }

    // =========================================================================
    // PIPELINE
    // =========================================================================

    /// Run `steps` in order, stopping at the first failure or at a safe checkpoint after a cancel.
    async fn run_pipeline(
        &self,
        ctx: &StepContext,
        steps: &[Box<dyn DeploymentStep>],
    ) -> Result<Vec<String>, DeployError> {
        let mut completed: Vec<String> = Vec::with_capacity(steps.len());
        let mut safe_to_stop = true;

        for (index, step) in steps.iter().enumerate() {
            if safe_to_stop && self.cancel_token.is_requested() {
                return Err(self.cancelled(ctx, &completed, steps.len() - index));
            }

            self.enter(ctx, step.phase());
            ctx.info(format!("[{}/{}] {}", index + 1, steps.len(), step.description()));

            if let Err(cause) = step.execute(ctx).await {
                return Err(self.step_failed(ctx, step.id(), cause));
            }

            ctx.verbose(format!("Step '{}' completed", step.id()));
            completed.push(step.id().to_string());
            safe_to_stop = step.is_safe_checkpoint();
        }

        // A request made during a step that was not safe to stop after is honoured here,
        // once the rest of the pipeline has left the device consistent
        if self.cancel_token.is_requested() {
            return Err(self.cancelled(ctx, &completed, 0));
        }
        self.enter(ctx, PipelinePhase::Completed);
        Ok(completed)
    }

    /// Stop on a pending cancel request. `skipped` steps never ran.
    fn cancelled(&self, ctx: &StepContext, completed: &[String], skipped: usize) -> DeployError {
        let after_step = completed.last().cloned().unwrap_or_else(|| "start".to_string());
        self.enter(ctx, PipelinePhase::Cancelled);
        ctx.log(
            LogLevel::Warning,
            format!("Cancelled after '{}'; {} step(s) skipped", after_step, skipped),
        );
        DeployError::Cancelled { after_step }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    async fn deploy_impl(&self, supplied: Option<InstallOptions>) -> DeploymentResult {
        let operation = OperationKind::Deploy;
        let scope = self.begin(operation);
        let result = self.run_deploy(scope.run_id, supplied).await;
        scope.finish(result)
    }

    async fn run_deploy(&self, run_id: u64, supplied: Option<InstallOptions>) -> DeploymentResult {
        let operation = OperationKind::Deploy;
        let _guard = self.acquire(operation, run_id)?;

        let options = match supplied {
            Some(options) => options.validate()?,
            None => self.options.take()?,
        };

        let ctx = self.context(operation, run_id);
        let steps = deploy_pipeline(options);
        let completed_steps = self.run_pipeline(&ctx, &steps).await?;

        Ok(DeploymentReport {
            operation,
            run_id,
            completed_steps,
            dual_boot: None,
        })
    }

    async fn toggle_dual_boot_impl(&self, enable: bool) -> DeploymentResult {
        let operation = OperationKind::ToggleDualBoot;
        let scope = self.begin(operation);
        let result = self.run_toggle_dual_boot(scope.run_id, enable).await;
        scope.finish(result)
    }

    async fn run_toggle_dual_boot(&self, run_id: u64, enable: bool) -> DeploymentResult {
        let operation = OperationKind::ToggleDualBoot;
        let _guard = self.acquire(operation, run_id)?;
        let ctx = self.context(operation, run_id);
        let mut completed_steps = Vec::with_capacity(3);

        self.enter(&ctx, PipelinePhase::TogglingDualBoot);

        let previous = self
            .device
            .dual_boot_enabled()
            .await
            .map_err(|cause| self.step_failed(&ctx, "read-dual-boot", cause))?;
        completed_steps.push("read-dual-boot".to_string());
        ctx.info(format!("Dual boot is currently {}", on_off(previous)));

        if previous != enable {
            self.device
                .set_dual_boot(enable)
                .await
                .map_err(|cause| self.step_failed(&ctx, "set-dual-boot", cause))?;
            completed_steps.push("set-dual-boot".to_string());
        }

        let current = self
            .device
            .dual_boot_enabled()
            .await
            .map_err(|cause| self.step_failed(&ctx, "verify-dual-boot", cause))?;
        if current != enable {
            return Err(self.step_failed(
                &ctx,
                "verify-dual-boot",
                DeviceError::Parse(format!("boot menu is still {} after the change", on_off(current))),
            ));
        }
        completed_steps.push("verify-dual-boot".to_string());

        let change = DualBootChange { previous, current };
        if change.changed() {
            ctx.info(format!(
                "Dual boot changed from {} to {}",
                on_off(previous),
                on_off(current)
            ));
        } else {
            ctx.info(format!("Dual boot already {}; nothing to change", on_off(current)));
        }

        self.enter(&ctx, PipelinePhase::Completed);
        Ok(DeploymentReport {
            operation,
            run_id,
            completed_steps,
            dual_boot: Some(change),
        })
    }

    async fn install_gpu_impl(&self) -> DeploymentResult {
        let operation = OperationKind::InstallGpu;
        let scope = self.begin(operation);
        let result = self.run_install_gpu(scope.run_id).await;
        scope.finish(result)
    }

    async fn run_install_gpu(&self, run_id: u64) -> DeploymentResult {
        let operation = OperationKind::InstallGpu;
        let section = self
            .sections
            .find_kind(SectionKind::Gpu)
            .ok_or(DeployError::CapabilityNotFound { kind: SectionKind::Gpu })?;

        let _guard = self.acquire(operation, run_id)?;
        let ctx = self.context(operation, run_id);
        let steps: Vec<Box<dyn DeploymentStep>> = vec![Box::new(SectionStep::new(section))];
        let completed_steps = self.run_pipeline(&ctx, &steps).await?;

        Ok(DeploymentReport {
            operation,
            run_id,
            completed_steps,
            dual_boot: None,
        })
    }
}

impl AutoDeployer for Orchestrator {
    fn deploy(&self) -> BoxFuture<'_, DeploymentResult> {
        self.deploy_impl(None).boxed()
    }

    fn deploy_with(&self, options: InstallOptions) -> BoxFuture<'_, DeploymentResult> {
        self.deploy_impl(Some(options)).boxed()
    }

    fn toggle_dual_boot(&self, enable: bool) -> BoxFuture<'_, DeploymentResult> {
        self.toggle_dual_boot_impl(enable).boxed()
    }

    fn install_gpu(&self) -> BoxFuture<'_, DeploymentResult> {
        self.install_gpu_impl().boxed()
    }

    fn cancel(&self) {
        if let Some(running) = self.running() {
            self.bus.warn(format!(
                "Cancellation of {} requested; stopping at the next safe checkpoint",
                running
            ));
            self.cancel.cancel();
        }
    }
}
