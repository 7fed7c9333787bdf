//! Progress reporting for batch operations
//!
//! The UI layer owns the gauge; the batch runner only tells it the total,
//! each completed unit and the final report.

use serde::Serialize;
use tokio::sync::mpsc;

use super::batch::BatchReport;

/// Gauge range for a total, never zero
pub fn gauge_range(total: u64) -> u64 {
    total.max(1)
}

/// Receiver of batch progress notifications.
///
/// Called from the batch's task; implementations must return quickly.
pub trait ProgressReporter: Send + Sync {
    /// The total is known; `range` is the gauge maximum to display
    fn begin(&self, total: u64, range: u64, message: &str);

    /// `done` units completed so far, clamped to `range`
    fn advance(&self, done: u64, range: u64, message: &str);

    /// The batch is over, successfully or not
    fn finish(&self, report: &BatchReport);
}

/// Events emitted by [`ChannelReporter`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        total: u64,
        range: u64,
        message: String,
    },
    Advanced {
        done: u64,
        range: u64,
        message: String,
    },
    Finished {
        report: BatchReport,
    },
}

/// Forwards progress to a channel consumed by the UI thread
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn begin(&self, total: u64, range: u64, message: &str) {
        // A dropped receiver means nobody is watching anymore
        let _ = self.tx.send(ProgressEvent::Started {
            total,
            range,
            message: message.to_string(),
        });
    }

    fn advance(&self, done: u64, range: u64, message: &str) {
        let _ = self.tx.send(ProgressEvent::Advanced {
            done: done.min(range),
            range,
            message: message.to_string(),
        });
    }

    fn finish(&self, report: &BatchReport) {
        let _ = self.tx.send(ProgressEvent::Finished {
            report: report.clone(),
        });
    }
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn begin(&self, _total: u64, _range: u64, _message: &str) {}
    fn advance(&self, _done: u64, _range: u64, _message: &str) {}
    fn finish(&self, _report: &BatchReport) {}
}
