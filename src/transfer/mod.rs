//! Recursive tree transfer engine
//!
//! Counting, upload, download and delete of whole trees, plus the batch
//! runner that drives them with progress and cooperative cancellation.

pub mod batch;
pub mod cancel;
pub mod counter;
pub mod engine;
pub mod manager;
pub mod progress;
pub mod tree;

pub use batch::{spawn_batch, run_batch, BatchHandle, BatchKind, BatchOutcome, BatchReport, BatchRequest};
pub use cancel::CancellationToken;
pub use counter::{count_leaves, count_local, count_remote};
pub use engine::{delete, delete_tree, download, upload, FileCallback, TreeTransfer};
pub use manager::{TransferGuard, TransferManager, TransferPermit};
pub use progress::{gauge_range, ChannelReporter, NullReporter, ProgressEvent, ProgressReporter};
pub use tree::{DownloadCopier, FileCopier, LocalTree, RemoteTree, TreeFs, UploadCopier};
