//! GUI implementations of the interactive services, backed by rfd.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::services::{DialogLevel, DialogService, FileFilter, FilePicker, MarkdownDisplayer};

pub struct RfdFilePicker;

impl FilePicker for RfdFilePicker {
    fn pick_file(&self, title: &str, filter: &FileFilter) -> Option<PathBuf> {
        rfd::FileDialog::new()
            .set_title(title)
            .add_filter(filter.name, filter.extensions)
            .pick_file()
    }

    fn pick_folder(&self, title: &str) -> Option<PathBuf> {
        rfd::FileDialog::new().set_title(title).pick_folder()
    }
}

pub struct RfdDialogs;

impl DialogService for RfdDialogs {
    fn show(&self, level: DialogLevel, title: &str, message: &str) {
        let level = match level {
            DialogLevel::Info => rfd::MessageLevel::Info,
            DialogLevel::Warning => rfd::MessageLevel::Warning,
            DialogLevel::Error => rfd::MessageLevel::Error,
        };
        rfd::MessageDialog::new()
            .set_level(level)
            .set_title(title)
            .set_description(message)
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
    }
}

/// Markdown note waiting to be shown in the notes window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownNote {
    pub title: String,
    pub markdown: String,
}

/// Collects notes from sections (any thread); the app drains them every frame.
#[derive(Debug, Clone, Default)]
pub struct PanelMarkdown {
    notes: Arc<Mutex<Vec<MarkdownNote>>>,
}

impl PanelMarkdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_notes(&self) -> Vec<MarkdownNote> {
        match self.notes.lock() {
            Ok(mut notes) => std::mem::take(&mut *notes),
            Err(_) => Vec::new(),
        }
    }
}

impl MarkdownDisplayer for PanelMarkdown {
    fn display(&self, title: &str, markdown: &str) {
        if let Ok(mut notes) = self.notes.lock() {
            notes.push(MarkdownNote {
                title: title.to_string(),
                markdown: markdown.to_string(),
            });
        }
    }
}
