//! Lumia Deployer Rust Backend
//!
//! Deployment orchestration for Windows on ARM on Lumia phones: apply a Windows
//! image, toggle the dual boot menu and install GPU drivers, driven from either
//! the egui window or the console binary.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Options, reports and operation kinds
//! - **config**: Persistent settings (JSON)
//! - **options**: Options provider filled by front-ends before Deploy
//! - **events** / **log_collector**: Event stream and its durable, date-rolled sink
//! - **progress**: Percentage sink for long-running steps
//! - **device**: Device backends (Lumia via dism/bcdedit/bcdboot/diskpart)
//! - **sections**: Optional capabilities (GPU drivers) and their registry
//! - **orchestrator**: `AutoDeployer`, step pipelines, phases and cancellation
//! - **composition**: Composition root wiring everything at startup
//! - **invocation**: Front-end adapter (one invocation, one orchestrator call)
//! - **console** / **ui**: Console and egui front-ends

// Core foundational modules
pub mod error;
pub mod models;

// Configuration management
pub mod config;

pub mod options;
pub mod progress;

// Event stream and durable logging
pub mod events;
pub mod log_collector;

pub mod device;
pub mod sections;
pub mod services;

pub mod orchestrator;

pub mod composition;
pub mod invocation;

// Front-ends
pub mod console;
pub mod ui;

// Re-export the log crate for macro usage
pub use log;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{CompositionError, ConfigError, DeployError, DeviceError, Result};

pub use models::{
    ByteSize, DeploymentReport, DeploymentResult, DualBootChange, InstallOptions, OperationKind,
    ValidatedOptions,
};

pub use composition::{CompositionRoot, Deployer};
pub use config::{DeployerSettings, SettingsManager, SettingsService};
pub use device::{Device, DeviceInfo, LumiaDevice};
pub use events::{EventBus, EventSubscription, LifecycleMarker, LogBridge, LogEvent, LogLevel};
pub use invocation::{dispatch, DeployArgs, Invocation, InvocationError};
pub use log_collector::LogCollector;
pub use options::OptionsProvider;
pub use orchestrator::{AutoDeployer, CancelHandle, Orchestrator, PipelinePhase};
pub use progress::OperationProgress;
pub use sections::{Section, SectionFactory, SectionKind, SectionRegistry, BUILTIN_SECTIONS};
pub use services::{DialogLevel, DialogService, FileFilter, FilePicker, MarkdownDisplayer, Services};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
