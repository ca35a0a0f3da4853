//! Singleton services handed to sections and front-ends behind narrow interfaces.
//!
//! Front-ends supply the interactive pieces (file pickers, dialogs, markdown
//! display); the composition root owns the rest and bundles everything in
//! [`Services`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SettingsService;
use crate::device::Device;
use crate::events::EventBus;
use crate::options::OptionsProvider;
use crate::progress::OperationProgress;

/// Name and extensions shown by a file picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFilter {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

/// Windows images accepted by Deploy.
pub const WIM_FILTER: FileFilter = FileFilter {
    name: "Windows images",
    extensions: &["wim", "esd"],
};

pub trait FilePicker: Send + Sync {
    /// Ask for an existing file. `None` when the user cancelled.
    fn pick_file(&self, title: &str, filter: &FileFilter) -> Option<PathBuf>;

    fn pick_folder(&self, title: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogLevel {
    Info,
    Warning,
    Error,
}

/// Modal notifications (operation results, fatal errors).
pub trait DialogService: Send + Sync {
    fn show(&self, level: DialogLevel, title: &str, message: &str);
}

/// Renders markdown notes that sections hand back to the user.
pub trait MarkdownDisplayer: Send + Sync {
    fn display(&self, title: &str, markdown: &str);
}

/// Everything the composition root wires together, shared by `Arc`.
#[derive(Clone)]
pub struct Services {
    pub settings: Arc<SettingsService>,
    pub bus: Arc<EventBus>,
    pub options: Arc<OptionsProvider>,
    pub progress: Arc<OperationProgress>,
    pub device: Arc<dyn Device>,
    pub dialogs: Arc<dyn DialogService>,
    pub file_picker: Arc<dyn FilePicker>,
    pub markdown: Arc<dyn MarkdownDisplayer>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("device", &self.device.describe())
            .field("bus", &self.bus)
            .field("options_set", &self.options.is_set())
            .finish_non_exhaustive()
    }
}
