//! Options provider: the single slot a front-end fills before invoking Deploy.
//!
//! The GUI collects options across several widgets and only then presses
//! "Deploy", so the two-phase set-then-invoke flow is kept. Values are
//! validated on the way in and the slot is emptied when a run consumes it.

use std::sync::RwLock;

use crate::error::ConfigError;
use crate::models::{InstallOptions, ValidatedOptions};

/// Thread-safe holder for the next run's [`InstallOptions`].
#[derive(Debug, Default)]
pub struct OptionsProvider {
    slot: RwLock<Option<InstallOptions>>,
}

impl OptionsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store options for the next Deploy. Invalid options are rejected and the slot is left untouched.
    pub fn set(&self, options: InstallOptions) -> Result<(), ConfigError> {
        options.validate()?;
        let mut slot = self
            .slot
            .write()
            .map_err(|e| ConfigError::ValidationFailed(format!("options slot poisoned: {}", e)))?;
        *slot = Some(options);
        Ok(())
    }

    /// Read the current options without consuming them.
    pub fn get(&self) -> Result<InstallOptions, ConfigError> {
        self.slot
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(ConfigError::OptionsMissing)
    }

    /// Consume the options for a run.
    pub fn take(&self) -> Result<ValidatedOptions, ConfigError> {
        let taken = self.slot.write().ok().and_then(|mut slot| slot.take());
        taken.ok_or(ConfigError::OptionsMissing)?.validate()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ByteSize;

    fn sample() -> InstallOptions {
        InstallOptions::new("install.wim", 1, ByteSize::from_gigabytes(16.0))
    }

    #[test]
    fn test_get_before_set_fails() {
        let provider = OptionsProvider::new();
        assert_eq!(provider.get(), Err(ConfigError::OptionsMissing));
        assert!(!provider.is_set());
    }

    #[test]
    fn test_set_then_take_consumes() {
        let provider = OptionsProvider::new();
        provider.set(sample()).expect("valid options");
        assert_eq!(provider.get().expect("set"), sample());

        let taken = provider.take().expect("options present");
        assert_eq!(taken.image_index(), 1);
        assert!(!provider.is_set());
        assert_eq!(provider.take(), Err(ConfigError::OptionsMissing));
    }

    #[test]
    fn test_invalid_options_rejected_on_set() {
        let provider = OptionsProvider::new();
        provider.set(sample()).expect("valid options");

        let bad = InstallOptions::new("install.wim", 1, ByteSize::from_bytes(0));
        assert_eq!(provider.set(bad), Err(ConfigError::InvalidReservedSize));
        // The previous value survives a rejected write
        assert_eq!(provider.get().expect("still set"), sample());
    }

    #[test]
    fn test_clear() {
        let provider = OptionsProvider::new();
        provider.set(sample()).expect("valid options");
        provider.clear();
        assert!(!provider.is_set());
    }
}
