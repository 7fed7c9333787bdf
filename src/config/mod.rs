//! Configuration Management Module
//!
//! Handles persistent storage of transfer engine settings.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::{ConfigFile, TransferConfig, CONFIG_VERSION};
