//! sftp-tree - recursive file tree transfers over SFTP
//!
//! Upload, download, copy and delete whole directory trees on a remote SSH
//! server, with progress reporting and cooperative cancellation.

pub mod config;
pub mod sftp;
pub mod ssh;
pub mod transfer;

pub use config::{ConfigStorage, TransferConfig};
pub use sftp::{RemoteFs, RusshRemoteFs, SftpError, SftpSession};
pub use ssh::{AuthMethod, SshClient, SshConfig, SshError};
pub use transfer::{
    BatchHandle, BatchOutcome, BatchReport, BatchRequest, CancellationToken, ChannelReporter,
    ProgressEvent, ProgressReporter,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this twice
/// panics, as with any global subscriber.
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
