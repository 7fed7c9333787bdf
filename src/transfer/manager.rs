//! Transfer Manager for batch operations
//!
//! Tracks the cancellation token of every running batch and serializes
//! access to the SFTP connection: one batch holds the connection at a time,
//! later ones queue behind it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use crate::sftp::error::SftpError;

/// RAII permit for the connection; decrements the active count on drop
pub struct TransferPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
    active_count: Arc<AtomicUsize>,
}

impl Drop for TransferPermit {
    fn drop(&mut self) {
        let result = self
            .active_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match result {
            Ok(prev) => debug!("TransferPermit dropped, active count: {}", prev - 1),
            Err(_) => warn!("TransferPermit dropped with active_count already 0"),
        }
    }
}

/// RAII guard that unregisters a batch from [`TransferManager`] on drop.
///
/// Create one right after `register()` so the token entry cannot leak on an
/// early return.
pub struct TransferGuard {
    manager: Arc<TransferManager>,
    batch_id: String,
}

impl TransferGuard {
    pub fn new(manager: Arc<TransferManager>, batch_id: String) -> Self {
        Self { manager, batch_id }
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.batch_id);
    }
}

/// Per-connection registry of running batches
pub struct TransferManager {
    /// One permit: the SFTP client is used by one batch at a time
    semaphore: Arc<Semaphore>,
    controls: RwLock<HashMap<String, CancellationToken>>,
    active_count: Arc<AtomicUsize>,
}

impl TransferManager {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            controls: RwLock::new(HashMap::new()),
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register a new batch and get its fresh cancellation token
    pub fn register(&self, batch_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.controls
            .write()
            .insert(batch_id.to_string(), token.clone());
        info!("Registered batch: {}", batch_id);
        token
    }

    pub fn unregister(&self, batch_id: &str) {
        self.controls.write().remove(batch_id);
        debug!("Unregistered batch: {}", batch_id);
    }

    /// Wait for exclusive use of the connection.
    ///
    /// Fails with [`SftpError::Cancelled`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub async fn acquire_permit(&self) -> Result<TransferPermit, SftpError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SftpError::Cancelled)?;
        let new_count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Acquired transfer permit, active count: {}", new_count);
        Ok(TransferPermit {
            _permit: permit,
            active_count: self.active_count.clone(),
        })
    }

    /// Number of batches currently holding the connection (0 or 1)
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Number of registered (running or queued) batches
    pub fn registered_count(&self) -> usize {
        self.controls.read().len()
    }

    /// Cancel a specific batch
    pub fn cancel(&self, batch_id: &str) -> bool {
        if let Some(token) = self.controls.read().get(batch_id) {
            token.cancel();
            info!("Cancelled batch: {}", batch_id);
            true
        } else {
            warn!("Batch not found for cancel: {}", batch_id);
            false
        }
    }

    pub fn cancel_all(&self) {
        let controls = self.controls.read();
        for (id, token) in controls.iter() {
            token.cancel();
            info!("Cancelled batch: {}", id);
        }
    }

    /// Cancel everything and refuse new permits
    pub fn shutdown(&self) {
        self.cancel_all();
        self.semaphore.close();
    }
}

impl Default for TransferManager {
    fn default() -> Self {
        Self::new()
    }
}
