//! Configuration types

use serde::{Deserialize, Serialize};

use crate::sftp::types::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_IO_TIMEOUT_SECS};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root of the persisted configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Schema version
    pub version: u32,

    /// Transfer engine settings
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            transfer: TransferConfig::default(),
        }
    }
}

/// Settings for batch transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Deadline for a whole batch operation in seconds (None = no deadline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_secs: Option<u64>,

    /// Timeout for a single remote read/write chunk in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// Buffer size for streamed file copies
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Name prefix for the session's local staging directories
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
}

fn default_io_timeout() -> u64 {
    DEFAULT_IO_TIMEOUT_SECS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_staging_prefix() -> String {
    "sftp-tree-".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: None,
            io_timeout_secs: default_io_timeout(),
            chunk_size: default_chunk_size(),
            staging_prefix: default_staging_prefix(),
        }
    }
}

impl TransferConfig {
    pub fn operation_timeout(&self) -> Option<std::time::Duration> {
        self.operation_timeout_secs
            .map(std::time::Duration::from_secs)
    }

    /// Per-chunk I/O timeout, at least one second
    pub fn io_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.io_timeout_secs.max(1))
    }

    /// Streaming buffer size, at least one byte
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}
