//! Sections: optional deployment capabilities discovered at composition time.
//!
//! A section is any type implementing [`Section`]. Adding one to the deployer
//! means appending its constructor to [`BUILTIN_SECTIONS`] (or handing it to
//! `CompositionRoot::with_section`); nothing else has to be registered.

pub mod gpu;
pub mod registry;

pub use gpu::GpuSection;
pub use registry::{SectionFactory, SectionRegistry, BUILTIN_SECTIONS};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DeviceError;
use crate::orchestrator::steps::StepContext;

/// Capability a section provides. The orchestrator looks sections up by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Gpu,
    /// Anything without a dedicated orchestrator operation
    Extension,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Gpu => "GPU",
            SectionKind::Extension => "extension",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pluggable unit of deployment capability.
pub trait Section: Send + Sync {
    /// Stable identifier, unique within a registry.
    fn id(&self) -> &'static str;

    fn kind(&self) -> SectionKind;

    /// One-line description used in progress messages.
    fn description(&self) -> String;

    fn run<'a>(&'a self, ctx: &'a StepContext) -> BoxFuture<'a, Result<(), DeviceError>>;
}
