//! Progress/log stream shared by the orchestrator, its steps and every displayer.
//!
//! The [`EventBus`] is created once by the composition root and passed around
//! behind an `Arc`. Publishing never blocks: live subscribers sit on a tokio
//! `broadcast` channel (a lagging subscriber loses its oldest events) while the
//! durable [`LogCollector`] receives every event unconditionally.

use chrono::{DateTime, Local};
use log::{Log, Metadata, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::log_collector::LogCollector;
use crate::models::OperationKind;

/// Default number of events a subscriber may fall behind before it starts losing the oldest.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Event severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Verbose,
    Debug,
    Information,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// Three-letter code used in log files and on the console.
    pub fn short_code(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "VRB",
            LogLevel::Debug => "DBG",
            LogLevel::Information => "INF",
            LogLevel::Warning => "WRN",
            LogLevel::Error => "ERR",
            LogLevel::Fatal => "FTL",
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => LogLevel::Verbose,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Info => LogLevel::Information,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Error => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_code())
    }
}

/// Operation lifecycle boundary carried by start and terminal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleMarker {
    Start,
    Success,
    Failure,
}

impl LifecycleMarker {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleMarker::Start)
    }
}

/// One structured log event. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Emission order, assigned by the bus on publish
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
    /// Rendered error chain, when the event reports a failure
    pub exception: Option<String>,
    pub operation: Option<OperationKind>,
    pub run_id: Option<u64>,
    pub marker: Option<LifecycleMarker>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            sequence: 0,
            timestamp: Local::now(),
            level,
            message: message.into(),
            exception: None,
            operation: None,
            run_id: None,
            marker: None,
        }
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn for_run(mut self, operation: OperationKind, run_id: u64) -> Self {
        self.operation = Some(operation);
        self.run_id = Some(run_id);
        self
    }

    pub fn with_marker(mut self, marker: LifecycleMarker) -> Self {
        self.marker = Some(marker);
        self
    }
}

/// Multicast event stream with a durable sink behind it.
pub struct EventBus {
    tx: broadcast::Sender<Arc<LogEvent>>,
    sink: Option<LogCollector>,
    /// Serializes sequence assignment and fan-out so emission order is observed everywhere
    next_sequence: Mutex<u64>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .field("sink", &self.sink)
            .finish()
    }
}

impl EventBus {
    pub fn new(sink: Option<LogCollector>) -> Self {
        Self::with_capacity(sink, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacity(sink: Option<LogCollector>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus {
            tx,
            sink,
            next_sequence: Mutex::new(1),
        }
    }

    pub fn sink(&self) -> Option<&LogCollector> {
        self.sink.as_ref()
    }

    /// Publish an event. Returns the frozen copy every consumer sees.
    pub fn publish(&self, mut event: LogEvent) -> Arc<LogEvent> {
        let mut next = match self.next_sequence.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        event.sequence = *next;
        *next += 1;

        let event = Arc::new(event);
        if let Some(ref sink) = self.sink {
            sink.record(Arc::clone(&event));
        }
        // No subscribers is fine: the sink already has the event
        let _ = self.tx.send(Arc::clone(&event));
        event
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> Arc<LogEvent> {
        self.publish(LogEvent::new(level, message))
    }

    pub fn verbose(&self, message: impl Into<String>) -> Arc<LogEvent> {
        self.log(LogLevel::Verbose, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Arc<LogEvent> {
        self.log(LogLevel::Information, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> Arc<LogEvent> {
        self.log(LogLevel::Warning, message)
    }

    /// Record an unrecoverable error and block until the durable sink has it on disk.
    pub fn fatal(&self, message: impl Into<String>, error: impl fmt::Display) -> Arc<LogEvent> {
        let event = self.publish(LogEvent::new(LogLevel::Fatal, message).with_exception(error.to_string()));
        if let Some(ref sink) = self.sink {
            if let Err(e) = sink.flush() {
                eprintln!("[Log] Failed to flush the fatal event: {}", e);
            }
        }
        event
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live view of the stream. Dropping it unsubscribes.
pub struct EventSubscription {
    rx: broadcast::Receiver<Arc<LogEvent>>,
    dropped: u64,
}

impl EventSubscription {
    /// Next event, or `None` once the bus is gone. Lagged gaps are skipped and counted.
    pub async fn recv(&mut self) -> Option<Arc<LogEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => self.dropped += n,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for UI loops.
    pub fn try_recv(&mut self) -> Option<Arc<LogEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.dropped += n,
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<Arc<LogEvent>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Events this subscriber lost because it fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Implementation of the `log` crate's Log trait.
/// Wires `log::info!()`, `log::warn!()`, ... from device backends into the bus.
pub struct LogBridge {
    bus: Arc<EventBus>,
}

impl LogBridge {
    pub fn new(bus: Arc<EventBus>) -> Self {
        LogBridge { bus }
    }

    /// Register as the process-wide `log` backend.
    ///
    /// Every level is forwarded, `trace!` included: the durable sink keeps all of
    /// them and each subscriber filters for itself.
    pub fn install(bus: Arc<EventBus>) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(LogBridge::new(bus)))
            .map(|()| log::set_max_level(log::LevelFilter::Trace))
    }
}

impl Log for LogBridge {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.bus
                .log(record.level().into(), format!("{}", record.args()));
        }
    }

    fn flush(&self) {
        if let Some(sink) = self.bus.sink() {
            let _ = sink.flush();
        }
    }
}
