//! Live log panel: a bounded tail of the event stream.

use eframe::egui;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::events::{EventBus, EventSubscription, LogEvent, LogLevel};

const MAX_LOG_LINES: usize = 5000;

fn level_color(level: LogLevel) -> egui::Color32 {
    match level {
        LogLevel::Verbose | LogLevel::Debug => egui::Color32::GRAY,
        LogLevel::Information => egui::Color32::from_rgb(200, 200, 200),
        LogLevel::Warning => egui::Color32::from_rgb(255, 150, 0),
        LogLevel::Error | LogLevel::Fatal => egui::Color32::from_rgb(255, 100, 100),
    }
}

pub struct LogPanel {
    subscription: EventSubscription,
    lines: VecDeque<Arc<LogEvent>>,
    min_level: LogLevel,
}

impl LogPanel {
    pub fn new(bus: &EventBus, min_level: LogLevel) -> Self {
        LogPanel {
            subscription: bus.subscribe(),
            lines: VecDeque::with_capacity(256),
            min_level,
        }
    }

    /// Pull new events. Every level is kept; the level filter applies when drawing.
    pub fn poll(&mut self) -> bool {
        let mut added = false;
        for event in self.subscription.drain() {
            if self.lines.len() == MAX_LOG_LINES {
                self.lines.pop_front();
            }
            self.lines.push_back(event);
            added = true;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn show(&mut self, ui: &mut egui::Ui, log_file: Option<String>) {
        ui.horizontal(|ui| {
            ui.label("Log:");
            match log_file {
                Some(path) => {
                    ui.label(path);
                }
                None => {
                    ui.label("(no log file)");
                }
            }
            egui::ComboBox::from_id_source("log_level")
                .selected_text(self.min_level.short_code())
                .show_ui(ui, |ui| {
                    for level in [LogLevel::Verbose, LogLevel::Information, LogLevel::Warning] {
                        ui.selectable_value(&mut self.min_level, level, level.short_code());
                    }
                });
            if ui.button("Clear").clicked() {
                self.lines.clear();
            }
        });

        let dropped = self.subscription.dropped();
        if dropped > 0 {
            ui.colored_label(
                egui::Color32::from_rgb(255, 150, 0),
                format!("{} lines skipped in the panel; the log file has all of them", dropped),
            );
        }

        ui.separator();

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                if self.lines.is_empty() {
                    ui.label("Waiting for output...");
                }
                for event in self.lines.iter().filter(|e| e.level >= self.min_level) {
                    ui.colored_label(
                        level_color(event.level),
                        egui::RichText::new(format!(
                            "{} [{}] {}",
                            event.timestamp.format("%H:%M:%S"),
                            event.level.short_code(),
                            event.message
                        ))
                        .monospace(),
                    );
                    if let Some(ref exception) = event.exception {
                        ui.monospace(format!("    {}", exception));
                    }
                }
                ui.add_space(8.0);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_keeps_every_level() {
        let bus = EventBus::new(None);
        let mut panel = LogPanel::new(&bus, LogLevel::Information);
        bus.verbose("hidden");
        bus.info("shown");
        bus.warn("also shown");

        assert!(panel.poll());
        assert_eq!(panel.len(), 3);
        assert!(!panel.poll());
    }
}
