//! Closed registry of sections, built once from a static constructor list.

use std::fmt;
use std::sync::Arc;

use super::{gpu, Section, SectionKind};
use crate::error::CompositionError;
use crate::services::Services;

/// Constructor of a section. Failing is fatal to composition.
pub type SectionFactory = fn(&Services) -> Result<Arc<dyn Section>, CompositionError>;

/// Sections compiled into the deployer.
pub const BUILTIN_SECTIONS: &[SectionFactory] = &[gpu::create];

/// Sections available to the orchestrator, in registration order.
#[derive(Clone, Default)]
pub struct SectionRegistry {
    sections: Vec<Arc<dyn Section>>,
}

impl fmt::Debug for SectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl SectionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Run every factory. Stops at the first failure or duplicate id.
    pub fn build(factories: &[SectionFactory], services: &Services) -> Result<Self, CompositionError> {
        let mut sections: Vec<Arc<dyn Section>> = Vec::with_capacity(factories.len());

        for factory in factories {
            let section = factory(services)?;
            if sections.iter().any(|existing| existing.id() == section.id()) {
                return Err(CompositionError::DuplicateSection(section.id()));
            }
            services.bus.verbose(format!(
                "Registered section '{}' ({})",
                section.id(),
                section.kind()
            ));
            sections.push(section);
        }

        Ok(SectionRegistry { sections })
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Section>> {
        self.sections.iter().find(|s| s.id() == id).cloned()
    }

    /// First registered section of the given kind.
    pub fn find_kind(&self, kind: SectionKind) -> Option<Arc<dyn Section>> {
        self.sections.iter().find(|s| s.kind() == kind).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.sections.iter().map(|s| s.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Section>> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
