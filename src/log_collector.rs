//! Durable, date-partitioned log sink.
//!
//! Every event published on the [`EventBus`](crate::events::EventBus) is handed
//! to the collector, whether or not any live displayer is subscribed.
//!
//! # Architecture
//!
//! ```text
//! EventBus::publish
//!     |
//! [LogCollector] (non-blocking send)
//!     | (crossbeam unbounded channel - guaranteed delivery)
//!     v
//! [DiskPersister thread]
//!     |
//! Logs/Log-YYYYMMDD.txt   (rolls over when the event date changes)
//! ```
//!
//! The persister is an OS thread rather than a tokio task so that lines reach
//! disk regardless of which runtime (if any) the producer is running on.

use chrono::{DateTime, Local, NaiveDate};
use crossbeam_channel::{unbounded, Sender};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::events::LogEvent;

/// Internal log event or special marker
enum SinkMessage {
    Event(Arc<LogEvent>),
    /// Flush marker; the sender is signalled once everything before it is on disk
    Flush(FlushAck),
}

enum FlushAck {
    Blocking(std::sync::mpsc::Sender<()>),
    Async(tokio::sync::oneshot::Sender<()>),
}

impl FlushAck {
    fn signal(self) {
        match self {
            FlushAck::Blocking(tx) => {
                let _ = tx.send(());
            }
            FlushAck::Async(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

/// Get the default logs path relative to the current working directory: ./Logs
pub fn default_logs_path() -> Result<PathBuf, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to get current working directory: {}", e))?;
    Ok(cwd.join("Logs"))
}

/// File that holds every event of the given day.
pub fn log_file_for(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("Log-{}.txt", date.format("%Y%m%d")))
}

/// Format one event the way it lands on disk.
pub fn format_event(event: &LogEvent) -> String {
    let mut line = format!(
        "{} [{}] {}\n",
        event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f %:z"),
        event.level.short_code(),
        event.message
    );
    if let Some(ref exception) = event.exception {
        line.push_str(exception);
        line.push('\n');
    }
    line
}

/// Append-only, rolling file sink fed from any thread.
#[derive(Clone)]
pub struct LogCollector {
    /// Channel sender - crossbeam unbounded for cross-runtime reliability
    tx: Sender<SinkMessage>,
    log_dir: PathBuf,
}

impl std::fmt::Debug for LogCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCollector")
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl LogCollector {
    /// Create the log directory and spawn the disk persister.
    pub fn new(log_dir: PathBuf) -> Result<Self, String> {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| format!("Failed to create log dir {}: {}", log_dir.display(), e))?;

        let (tx, rx) = unbounded::<SinkMessage>();
        let persister_dir = log_dir.clone();

        std::thread::Builder::new()
            .name("log-persister".to_string())
            .spawn(move || {
                let mut current: Option<(NaiveDate, File)> = None;

                while let Ok(msg) = rx.recv() {
                    match msg {
                        SinkMessage::Event(event) => {
                            let date = event.timestamp.date_naive();
                            let needs_roll = current.as_ref().map_or(true, |(d, _)| *d != date);
                            if needs_roll {
                                let path = log_file_for(&persister_dir, date);
                                match OpenOptions::new().create(true).append(true).open(&path) {
                                    Ok(file) => current = Some((date, file)),
                                    Err(e) => {
                                        eprintln!(
                                            "[Log] [ROLL] Failed to open {}: {}",
                                            path.display(),
                                            e
                                        );
                                        current = None;
                                    }
                                }
                            }

                            if let Some((_, ref mut file)) = current {
                                let _ = file.write_all(format_event(&event).as_bytes());
                            }
                        }
                        SinkMessage::Flush(ack) => {
                            if let Some((_, ref mut file)) = current {
                                let _ = file.flush();
                                let _ = file.sync_data();
                            }
                            ack.signal();
                        }
                    }
                }
                eprintln!("[Log] Disk persister thread shutting down");
            })
            .map_err(|e| format!("Failed to spawn log persister: {}", e))?;

        Ok(LogCollector { tx, log_dir })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the file the given timestamp is written to.
    pub fn log_file_at(&self, timestamp: DateTime<Local>) -> PathBuf {
        log_file_for(&self.log_dir, timestamp.date_naive())
    }

    /// Queue an event for persistence. Never blocks.
    pub fn record(&self, event: Arc<LogEvent>) {
        let _ = self.tx.send(SinkMessage::Event(event));
    }

    /// Block until every event recorded before this call is on disk.
    pub fn flush(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.tx
            .send(SinkMessage::Flush(FlushAck::Blocking(tx)))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }

    /// Async flavour of [`flush`](Self::flush); call before shutdown so final events reach disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SinkMessage::Flush(FlushAck::Async(tx)))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.await
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LogEvent, LogLevel};
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_is_date_partitioned() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).expect("valid date");
        let path = log_file_for(Path::new("Logs"), date);
        assert_eq!(path, Path::new("Logs").join("Log-20260309.txt"));
    }

    #[test]
    fn test_format_event_includes_exception() {
        let mut event = LogEvent::new(LogLevel::Error, "Step failed")
            .with_exception("Command 'dism' failed: exit code 2");
        event.timestamp = Local
            .with_ymd_and_hms(2026, 3, 9, 10, 11, 12)
            .single()
            .expect("unambiguous time");
        let line = format_event(&event);
        assert!(line.contains("2026-03-09 10:11:12.000"));
        assert!(line.contains("[ERR] Step failed\n"));
        assert!(line.ends_with("exit code 2\n"));
    }

    #[tokio::test]
    async fn test_collector_persists_and_rolls_by_date() {
        let temp = tempfile::tempdir().expect("temp dir");
        let collector = LogCollector::new(temp.path().join("Logs")).expect("collector");

        let mut first = LogEvent::new(LogLevel::Information, "day one");
        first.timestamp = Local
            .with_ymd_and_hms(2026, 1, 1, 23, 59, 0)
            .single()
            .expect("unambiguous time");
        let mut second = LogEvent::new(LogLevel::Verbose, "day two");
        second.timestamp = Local
            .with_ymd_and_hms(2026, 1, 2, 0, 1, 0)
            .single()
            .expect("unambiguous time");

        let first_path = collector.log_file_at(first.timestamp);
        let second_path = collector.log_file_at(second.timestamp);
        collector.record(Arc::new(first));
        collector.record(Arc::new(second));
        collector.wait_for_empty().await.expect("flush");

        let day_one = std::fs::read_to_string(first_path).expect("day one file");
        let day_two = std::fs::read_to_string(second_path).expect("day two file");
        assert!(day_one.contains("day one"));
        assert!(!day_one.contains("day two"));
        assert!(day_two.contains("[VRB] day two"));
    }
}
