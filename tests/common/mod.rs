//! Shared fixtures: a recording device double and a composed deployer around it.

#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

use lumia_deployer::{
    ByteSize, CompositionRoot, Deployer, DeployerSettings, Device, DeviceError, DeviceInfo,
    InstallOptions, LifecycleMarker, LogEvent, MarkdownDisplayer, OperationProgress,
    SettingsManager, ValidatedOptions,
};

// Names recorded by FakeDevice, one per trait method
pub const DETECT: &str = "detect";
pub const BACKUP: &str = "backup-boot-config";
pub const APPLY: &str = "apply-image";
pub const FINALIZE: &str = "finalize-boot-entries";
pub const READ_DUAL_BOOT: &str = "dual-boot-enabled";
pub const SET_DUAL_BOOT: &str = "set-dual-boot";
pub const INSTALL_DRIVERS: &str = "install-drivers";

const MUTATING: &[&str] = &[BACKUP, APPLY, FINALIZE, SET_DUAL_BOOT, INSTALL_DRIVERS];

/// Pauses a device call until the test releases it.
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the device call reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// In-memory device that records every call.
pub struct FakeDevice {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, DeviceError>>,
    gates: Mutex<HashMap<&'static str, Arc<Gate>>>,
    dual_boot: Mutex<bool>,
    /// When set, `set_dual_boot` reports success without changing anything
    stuck_dual_boot: Mutex<bool>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeDevice {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            dual_boot: Mutex::new(false),
            stuck_dual_boot: Mutex::new(false),
        })
    }

    pub fn with_dual_boot(enabled: bool) -> Arc<Self> {
        let device = Self::new();
        *device.dual_boot.lock().unwrap() = enabled;
        device
    }

    /// Make `call` fail with `error` from now on.
    pub fn fail_at(&self, call: &'static str, error: DeviceError) {
        self.failures.lock().unwrap().insert(call, error);
    }

    /// Hold the next `call` until [`Gate::release`].
    pub fn hold_at(&self, call: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        self.gates.lock().unwrap().insert(call, Arc::clone(&gate));
        gate
    }

    pub fn ignore_dual_boot_writes(&self) {
        *self.stuck_dual_boot.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    /// Calls that would have changed the phone.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING.contains(&c.as_str()))
            .collect()
    }

    pub fn dual_boot(&self) -> bool {
        *self.dual_boot.lock().unwrap()
    }

    async fn enter(&self, call: &'static str) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(call.to_string());

        let gate = self.gates.lock().unwrap().remove(call);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        match self.failures.lock().unwrap().get(call) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Device for FakeDevice {
    fn describe(&self) -> String {
        "fake lumia".to_string()
    }

    fn detect(&self) -> BoxFuture<'_, Result<DeviceInfo, DeviceError>> {
        async move {
            self.enter(DETECT).await?;
            Ok(DeviceInfo {
                name: "Lumia 950 XL (fake)".to_string(),
                main_os: PathBuf::from("D:\\"),
                efiesp: PathBuf::from("D:\\EFIESP"),
            })
        }
        .boxed()
    }

    fn backup_boot_configuration(&self) -> BoxFuture<'_, Result<PathBuf, DeviceError>> {
        async move {
            self.enter(BACKUP).await?;
            Ok(PathBuf::from("Backups/EFIESP-test"))
        }
        .boxed()
    }

    fn apply_image<'a>(
        &'a self,
        _options: &'a ValidatedOptions,
        progress: &'a OperationProgress,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        async move {
            self.enter(APPLY).await?;
            progress.report(100.0);
            Ok(())
        }
        .boxed()
    }

    fn finalize_boot_entries(&self) -> BoxFuture<'_, Result<(), DeviceError>> {
        self.enter(FINALIZE).boxed()
    }

    fn dual_boot_enabled(&self) -> BoxFuture<'_, Result<bool, DeviceError>> {
        async move {
            self.enter(READ_DUAL_BOOT).await?;
            Ok(self.dual_boot())
        }
        .boxed()
    }

    fn set_dual_boot(&self, enable: bool) -> BoxFuture<'_, Result<(), DeviceError>> {
        async move {
            self.enter(SET_DUAL_BOOT).await?;
            if !*self.stuck_dual_boot.lock().unwrap() {
                *self.dual_boot.lock().unwrap() = enable;
            }
            Ok(())
        }
        .boxed()
    }

    fn install_drivers<'a>(
        &'a self,
        _package: &'a Path,
        _progress: &'a OperationProgress,
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        self.enter(INSTALL_DRIVERS).boxed()
    }
}

/// Markdown displayer that keeps what it was shown.
#[derive(Default)]
pub struct RecordingMarkdown {
    shown: Mutex<Vec<String>>,
}

impl RecordingMarkdown {
    pub fn titles(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

impl MarkdownDisplayer for RecordingMarkdown {
    fn display(&self, title: &str, _markdown: &str) {
        self.shown.lock().unwrap().push(title.to_string());
    }
}

/// A deployer composed around a [`FakeDevice`] inside a scratch directory.
pub struct Harness {
    pub deployer: Deployer,
    pub device: Arc<FakeDevice>,
    pub markdown: Arc<RecordingMarkdown>,
    pub temp: TempDir,
}

impl Harness {
    pub fn log_dir(&self) -> PathBuf {
        self.temp.path().join("Logs")
    }

    /// A WIM file that exists on disk.
    pub fn image(&self) -> PathBuf {
        self.temp.path().join("install.wim")
    }

    pub fn options(&self) -> InstallOptions {
        InstallOptions::new(self.image(), 1, ByteSize::from_gigabytes(18.0))
    }
}

/// Root preconfigured with scratch settings, a scratch log directory and `device`.
pub fn root_for(device: &Arc<FakeDevice>, temp: &TempDir) -> CompositionRoot {
    let gpu_dir = temp.path().join("Drivers").join("GPU");
    std::fs::create_dir_all(&gpu_dir).expect("gpu dir");
    std::fs::write(gpu_dir.join("qcdx.inf"), "[Version]").expect("inf file");
    std::fs::write(temp.path().join("install.wim"), b"MSWIM").expect("wim file");

    let settings = DeployerSettings {
        gpu_driver_path: gpu_dir,
        backup_dir: temp.path().join("Backups"),
        log_dir: temp.path().join("Logs"),
        ..DeployerSettings::default()
    };

    let device: Arc<dyn Device> = device.clone();
    CompositionRoot::new()
        .with_settings_manager(SettingsManager::new(temp.path().join("settings.json")))
        .with_settings(settings)
        .with_log_dir(temp.path().join("Logs"))
        .with_device(device)
}

pub fn harness() -> Harness {
    harness_with(FakeDevice::new(), |root| root)
}

pub fn harness_with(
    device: Arc<FakeDevice>,
    customize: impl FnOnce(CompositionRoot) -> CompositionRoot,
) -> Harness {
    let temp = tempfile::tempdir().expect("temp dir");
    let markdown = Arc::new(RecordingMarkdown::default());
    let displayer: Arc<dyn MarkdownDisplayer> = markdown.clone();
    let root = root_for(&device, &temp).with_markdown(displayer);
    let deployer = customize(root).compose().expect("composition");
    Harness {
        deployer,
        device,
        markdown,
        temp,
    }
}

/// Lifecycle markers of `events`, in order.
pub fn markers(events: &[Arc<LogEvent>]) -> Vec<LifecycleMarker> {
    events.iter().filter_map(|e| e.marker).collect()
}
