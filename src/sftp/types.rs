//! SFTP data types

use serde::{Deserialize, Serialize};

/// Kind of a filesystem entry as seen by the transfer engine.
///
/// Remote entries are classified without following symbolic links. Local
/// links are followed, except when deleting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// Result of a remote `stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStat {
    pub kind: EntryKind,
    /// File size in bytes (0 when the server does not report one)
    pub size: u64,
}

impl RemoteStat {
    pub fn file(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            size,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
        }
    }
}

/// One row of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// SFTP protocol constants
pub mod constants {
    /// Chunk size for streamed file transfers (64 KB)
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

    /// Per-chunk I/O timeout in seconds, so a dead SSH connection fails the
    /// transfer instead of hanging it
    pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 300;
}
