//! UI Module - egui front-end
//!
//! The window is a front-end adapter like the console: it fills the options
//! provider, dispatches one operation per click and renders the event stream.

pub mod app;
pub mod log_panel;
pub mod pickers;

pub use app::DeployerApp;
pub use log_panel::LogPanel;
pub use pickers::{MarkdownNote, PanelMarkdown, RfdDialogs, RfdFilePicker};
