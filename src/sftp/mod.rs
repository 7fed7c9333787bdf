//! SFTP client module
//!
//! Remote filesystem access over an SSH `sftp` subsystem channel, and the
//! per-connection session that runs batches against it.

pub mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod memory;
pub mod path_utils;
pub mod session;
pub mod types;

pub use client::{RemoteFs, RusshRemoteFs};
pub use error::{RemoteErrorCode, SftpError};
pub use session::SftpSession;
pub use types::*;
