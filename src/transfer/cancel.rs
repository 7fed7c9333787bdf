//! Cooperative cancellation for batch operations

use std::sync::Arc;

use tokio::sync::watch;

use crate::sftp::error::SftpError;

#[derive(Debug)]
struct Signal {
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

/// Shared cancellation flag for one batch operation.
///
/// Clones observe the same flag. Once cancelled it stays cancelled; start a
/// new batch with a fresh token.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    signal: Arc<Signal>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            signal: Arc::new(Signal {
                cancel_tx,
                cancel_rx,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.cancel_rx.borrow()
    }

    pub fn cancel(&self) {
        self.signal.cancel_tx.send_replace(true);
    }

    /// Node-boundary check used by every recursive step
    pub fn check(&self) -> Result<(), SftpError> {
        if self.is_cancelled() {
            return Err(SftpError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.signal.cancel_rx.clone();
        // The sender lives inside `self`, so the channel cannot close here
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
