//! Cancellation flag shared between front-ends and the orchestrator.
//!
//! A request is only honoured at step boundaries after a step that leaves the
//! device consistent; the pipeline polls [`CancelToken::is_requested`] there.

use tokio::sync::watch;

/// Front-end side: request cancellation of the running operation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

/// Orchestrator side: observe requests.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle {
            tx: std::sync::Arc::new(tx),
        },
        CancelToken { rx },
    )
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Clear a stale request before a new operation starts.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_and_reset() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_requested());
        handle.cancel();
        assert!(token.is_requested());
        assert!(handle.is_requested());
        handle.reset();
        assert!(!token.is_requested());
    }
}
