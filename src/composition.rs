//! Composition root: builds every singleton, the section registry and the orchestrator.
//!
//! Composition either succeeds completely or fails with a [`CompositionError`];
//! callers treat the error as fatal.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{DeployerSettings, SettingsManager, SettingsService};
use crate::console::{ConsoleDialogs, ConsoleFilePicker, ConsoleMarkdown};
use crate::device::{Device, LumiaDevice};
use crate::error::CompositionError;
use crate::events::EventBus;
use crate::log_collector::LogCollector;
use crate::options::OptionsProvider;
use crate::orchestrator::Orchestrator;
use crate::progress::OperationProgress;
use crate::sections::{SectionFactory, SectionRegistry, BUILTIN_SECTIONS};
use crate::services::{DialogService, FilePicker, MarkdownDisplayer, Services};

/// Builder for a fully wired [`Deployer`].
pub struct CompositionRoot {
    settings_manager: Option<SettingsManager>,
    settings: Option<DeployerSettings>,
    log_dir: Option<PathBuf>,
    durable_log: bool,
    device: Option<Arc<dyn Device>>,
    dialogs: Option<Arc<dyn DialogService>>,
    file_picker: Option<Arc<dyn FilePicker>>,
    markdown: Option<Arc<dyn MarkdownDisplayer>>,
    builtin_sections: bool,
    extra_sections: Vec<SectionFactory>,
}

impl Default for CompositionRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionRoot {
    pub fn new() -> Self {
        CompositionRoot {
            settings_manager: None,
            settings: None,
            log_dir: None,
            durable_log: true,
            device: None,
            dialogs: None,
            file_picker: None,
            markdown: None,
            builtin_sections: true,
            extra_sections: Vec::new(),
        }
    }

    /// Load settings through `manager` instead of the per-user settings file.
    pub fn with_settings_manager(mut self, manager: SettingsManager) -> Self {
        self.settings_manager = Some(manager);
        self
    }

    /// Start from these settings instead of loading them.
    pub fn with_settings(mut self, settings: DeployerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Override `DeployerSettings::log_dir`.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Compose without the file sink.
    pub fn without_durable_log(mut self) -> Self {
        self.durable_log = false;
        self
    }

    pub fn with_device(mut self, device: Arc<dyn Device>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_dialogs(mut self, dialogs: Arc<dyn DialogService>) -> Self {
        self.dialogs = Some(dialogs);
        self
    }

    pub fn with_file_picker(mut self, picker: Arc<dyn FilePicker>) -> Self {
        self.file_picker = Some(picker);
        self
    }

    pub fn with_markdown(mut self, markdown: Arc<dyn MarkdownDisplayer>) -> Self {
        self.markdown = Some(markdown);
        self
    }

    /// Register an additional section after the built-in ones.
    pub fn with_section(mut self, factory: SectionFactory) -> Self {
        self.extra_sections.push(factory);
        self
    }

    /// Skip [`BUILTIN_SECTIONS`]; only sections passed to [`with_section`](Self::with_section) are registered.
    pub fn without_builtin_sections(mut self) -> Self {
        self.builtin_sections = false;
        self
    }

    pub fn compose(self) -> Result<Deployer, CompositionError> {
        // Settings
        let manager = match self.settings_manager {
            Some(manager) => manager,
            None => SettingsManager::global()?,
        };
        let settings = Arc::new(match self.settings {
            Some(settings) => {
                settings.validate()?;
                SettingsService::with_settings(manager, settings)
            }
            None => SettingsService::load(manager)?,
        });

        // Durable sink + event bus
        let sink = if self.durable_log {
            let log_dir = self.log_dir.unwrap_or_else(|| settings.get().log_dir);
            let collector = LogCollector::new(log_dir).map_err(|reason| CompositionError::Service {
                service: "log sink",
                reason,
            })?;
            Some(collector)
        } else {
            None
        };
        let bus = Arc::new(EventBus::new(sink));

        let device: Arc<dyn Device> = match self.device {
            Some(device) => device,
            None => Arc::new(LumiaDevice::new(Arc::clone(&settings))),
        };

        let services = Services {
            settings,
            bus: Arc::clone(&bus),
            options: Arc::new(OptionsProvider::new()),
            progress: Arc::new(OperationProgress::new()),
            device,
            dialogs: self.dialogs.unwrap_or_else(|| Arc::new(ConsoleDialogs)),
            file_picker: self.file_picker.unwrap_or_else(|| Arc::new(ConsoleFilePicker)),
            markdown: self.markdown.unwrap_or_else(|| Arc::new(ConsoleMarkdown)),
        };

        // Sections: closed once the orchestrator exists
        let mut factories: Vec<SectionFactory> = Vec::new();
        if self.builtin_sections {
            factories.extend_from_slice(BUILTIN_SECTIONS);
        }
        factories.extend(self.extra_sections);
        let sections = SectionRegistry::build(&factories, &services).map_err(|e| {
            bus.fatal("Composition failed", &e);
            e
        })?;

        let orchestrator = Arc::new(Orchestrator::new(&services, sections));

        bus.info(format!(
            "Deployer ready: device {}, sections [{}]",
            services.device.describe(),
            orchestrator.sections().ids().join(", ")
        ));

        Ok(Deployer {
            services,
            orchestrator,
        })
    }
}

/// Fully composed application.
pub struct Deployer {
    services: Services,
    orchestrator: Arc<Orchestrator>,
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer").finish_non_exhaustive()
    }
}

impl Deployer {
    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.services.bus
    }

    /// Wait until the durable sink has written every event published so far.
    pub async fn shutdown(&self) {
        if let Some(sink) = self.services.bus.sink() {
            if let Err(e) = sink.wait_for_empty().await {
                eprintln!("[Main] WARNING: Failed to flush log sink: {}", e);
            }
        }
    }
}
