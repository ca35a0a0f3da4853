//! Progress sink for long-running steps (image apply, driver injection).

use tokio::sync::watch;

/// Percentage of the current operation, or `None` when idle/indeterminate.
#[derive(Debug)]
pub struct OperationProgress {
    tx: watch::Sender<Option<f32>>,
}

impl Default for OperationProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationProgress {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        OperationProgress { tx }
    }

    /// Report a percentage (0-100), clamped.
    pub fn report(&self, percent: f32) {
        let clamped = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        self.tx.send_replace(Some(clamped));
    }

    /// Switch to indeterminate (spinner) mode.
    pub fn reset(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<f32> {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<Option<f32>> {
        self.tx.subscribe()
    }
}
