//! Console front-end services: event writer, dialogs, markdown output.
//!
//! The console is non-interactive: file pickers always decline and dialogs
//! print instead of blocking.

use std::path::PathBuf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::events::{EventBus, LogEvent, LogLevel};
use crate::services::{DialogLevel, DialogService, FileFilter, FilePicker, MarkdownDisplayer};

/// One console line for an event (exception on the following line for errors).
pub fn format_console_line(event: &LogEvent) -> String {
    let mut line = format!(
        "{} [{}] {}",
        event.timestamp.format("%H:%M:%S"),
        event.level.short_code(),
        event.message
    );
    if event.level >= LogLevel::Error {
        if let Some(ref exception) = event.exception {
            line.push('\n');
            line.push_str("    ");
            line.push_str(exception);
        }
    }
    line
}

/// Subscriber that prints events at or above a level to stdout.
pub struct ConsoleWriter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

impl ConsoleWriter {
    pub fn spawn(bus: &EventBus, min_level: LogLevel) -> Self {
        let mut subscription = bus.subscribe();
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let print = |event: &LogEvent| {
                if event.level >= min_level {
                    println!("{}", format_console_line(event));
                }
            };

            loop {
                tokio::select! {
                    event = subscription.recv() => match event {
                        Some(event) => print(&event),
                        None => break,
                    },
                    _ = &mut stopped => {
                        // Print what was published before the stop request
                        for event in subscription.drain() {
                            print(&event);
                        }
                        break;
                    }
                }
            }
            subscription.dropped()
        });

        ConsoleWriter { stop, handle }
    }

    /// Print everything already published, then unsubscribe.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        match self.handle.await {
            Ok(dropped) if dropped > 0 => {
                eprintln!("[Console] {} log lines were skipped because output fell behind", dropped)
            }
            Ok(_) => {}
            Err(e) => eprintln!("[Console] Writer task failed: {}", e),
        }
    }
}

/// Prints dialogs to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDialogs;

impl DialogService for ConsoleDialogs {
    fn show(&self, level: DialogLevel, title: &str, message: &str) {
        match level {
            DialogLevel::Info => println!("{}: {}", title, message),
            DialogLevel::Warning => eprintln!("WARNING - {}: {}", title, message),
            DialogLevel::Error => eprintln!("ERROR - {}: {}", title, message),
        }
    }
}

/// Never picks anything; console options come from arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleFilePicker;

impl FilePicker for ConsoleFilePicker {
    fn pick_file(&self, title: &str, _filter: &FileFilter) -> Option<PathBuf> {
        log::debug!("[Console] File picker '{}' is not available in console mode", title);
        None
    }

    fn pick_folder(&self, title: &str) -> Option<PathBuf> {
        log::debug!("[Console] Folder picker '{}' is not available in console mode", title);
        None
    }
}

/// Prints markdown as-is, framed by its title.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMarkdown;

impl MarkdownDisplayer for ConsoleMarkdown {
    fn display(&self, title: &str, markdown: &str) {
        println!("==== {} ====", title);
        println!("{}", markdown.trim_end());
        println!("{}", "=".repeat(title.len() + 10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_line_shows_exception_for_errors_only() {
        let error = LogEvent::new(LogLevel::Error, "Step 'apply-image' failed").with_exception("dism exit code 2");
        let line = format_console_line(&error);
        assert!(line.contains("[ERR] Step 'apply-image' failed"));
        assert!(line.ends_with("    dism exit code 2"));

        let info = LogEvent::new(LogLevel::Information, "note").with_exception("ignored");
        assert!(!format_console_line(&info).contains("ignored"));
    }

    #[tokio::test]
    async fn test_writer_stops_cleanly() {
        let bus = EventBus::new(None);
        let writer = ConsoleWriter::spawn(&bus, LogLevel::Information);
        assert_eq!(bus.subscriber_count(), 1);
        bus.info("printed before stop");
        writer.stop().await;
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_console_picker_declines() {
        assert!(ConsoleFilePicker.pick_file("WIM", &crate::services::WIM_FILTER).is_none());
        assert!(ConsoleFilePicker.pick_folder("Drivers").is_none());
    }
}
