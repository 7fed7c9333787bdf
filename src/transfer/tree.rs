//! Filesystem trees the engine walks
//!
//! Counting, copying and deleting are written once against [`TreeFs`]; the
//! local disk and the remote SFTP server are its two variants. Moving the
//! bytes of one file between the two sides is [`FileCopier`].

use async_trait::async_trait;

use crate::sftp::client::RemoteFs;
use crate::sftp::error::SftpError;
use crate::sftp::path_utils::{join_local_path, join_remote_path};
use crate::sftp::types::EntryKind;

/// Structural operations on one side of a transfer
#[async_trait]
pub trait TreeFs: Send + Sync {
    /// Entry kind. Local links are followed, remote links are not.
    async fn kind(&self, path: &str) -> Result<EntryKind, SftpError>;

    /// Entry kind without following links, so deletion removes a link
    /// instead of its target
    async fn own_kind(&self, path: &str) -> Result<EntryKind, SftpError> {
        self.kind(path).await
    }

    /// Names of the direct children of a directory
    async fn list(&self, path: &str) -> Result<Vec<String>, SftpError>;

    /// Create a directory, succeeding if it already exists
    async fn ensure_dir(&self, path: &str) -> Result<(), SftpError>;

    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError>;

    /// Path of child `name` inside directory `base`
    fn join(&self, base: &str, name: &str) -> String;
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTree;

#[async_trait]
impl TreeFs for LocalTree {
    async fn kind(&self, path: &str) -> Result<EntryKind, SftpError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SftpError::local(path, e))?;
        Ok(if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }

    async fn own_kind(&self, path: &str) -> Result<EntryKind, SftpError> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| SftpError::local(path, e))?;
        Ok(if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, SftpError> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| SftpError::local(path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SftpError::local(path, e))?
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), SftpError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| SftpError::local(path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| SftpError::local(path, e))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        tokio::fs::remove_dir(path)
            .await
            .map_err(|e| SftpError::local(path, e))
    }

    fn join(&self, base: &str, name: &str) -> String {
        join_local_path(base, name)
    }
}

/// The remote side, seen through a [`RemoteFs`] client
pub struct RemoteTree<'a> {
    client: &'a dyn RemoteFs,
}

impl<'a> RemoteTree<'a> {
    pub fn new(client: &'a dyn RemoteFs) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TreeFs for RemoteTree<'_> {
    async fn kind(&self, path: &str) -> Result<EntryKind, SftpError> {
        Ok(self.client.stat(path).await?.kind)
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, SftpError> {
        self.client.list(path).await
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), SftpError> {
        match self.client.mkdir(path).await {
            Err(e) if e.is_already_exists() => {
                tracing::debug!("Remote directory already exists: {}", path);
                Ok(())
            }
            other => other,
        }
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.client.remove_file(path).await
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.client.remove_dir(path).await
    }

    fn join(&self, base: &str, name: &str) -> String {
        join_remote_path(base, name)
    }
}

/// Copies the contents of one file from the source tree to the target tree
#[async_trait]
pub trait FileCopier: Send + Sync {
    async fn copy_file(&self, from: &str, to: &str) -> Result<u64, SftpError>;
}

/// Local → remote
pub struct UploadCopier<'a> {
    client: &'a dyn RemoteFs,
}

impl<'a> UploadCopier<'a> {
    pub fn new(client: &'a dyn RemoteFs) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileCopier for UploadCopier<'_> {
    async fn copy_file(&self, from: &str, to: &str) -> Result<u64, SftpError> {
        self.client.write_from_local(from, to).await
    }
}

/// Remote → local
pub struct DownloadCopier<'a> {
    client: &'a dyn RemoteFs,
}

impl<'a> DownloadCopier<'a> {
    pub fn new(client: &'a dyn RemoteFs) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileCopier for DownloadCopier<'_> {
    async fn copy_file(&self, from: &str, to: &str) -> Result<u64, SftpError> {
        self.client.read_to_local(from, to).await
    }
}
