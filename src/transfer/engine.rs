//! Recursive tree transfer and deletion
//!
//! Every recursive step checks the batch's [`CancellationToken`] before it
//! touches either filesystem, so a cancel request stops the walk at the next
//! node. A file copy that has already started is left to finish or fail.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use super::cancel::CancellationToken;
use super::tree::{DownloadCopier, FileCopier, LocalTree, RemoteTree, TreeFs, UploadCopier};
use crate::sftp::client::RemoteFs;
use crate::sftp::error::SftpError;

/// Per-file callback, invoked with the source path before the file's bytes move
pub type FileCallback<'c> = dyn FnMut(&str) + Send + 'c;

/// One directional copy between two trees
pub struct TreeTransfer<'a> {
    source: &'a dyn TreeFs,
    target: &'a dyn TreeFs,
    copier: &'a dyn FileCopier,
    token: &'a CancellationToken,
}

impl<'a> TreeTransfer<'a> {
    pub fn new(
        source: &'a dyn TreeFs,
        target: &'a dyn TreeFs,
        copier: &'a dyn FileCopier,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            source,
            target,
            copier,
            token,
        }
    }

    /// Copy `source_path` (file or directory tree) to `target_path`.
    ///
    /// Returns the number of files copied.
    pub async fn run(
        &self,
        source_path: &str,
        target_path: &str,
        on_file_done: &mut FileCallback<'_>,
    ) -> Result<u64, SftpError> {
        self.copy_node(source_path.to_string(), target_path.to_string(), on_file_done)
            .await
    }

    fn copy_node<'b, 'c: 'b>(
        &'b self,
        source_path: String,
        target_path: String,
        on_file_done: &'b mut FileCallback<'c>,
    ) -> BoxFuture<'b, Result<u64, SftpError>> {
        async move {
            self.token.check()?;

            if !self.source.kind(&source_path).await?.is_dir() {
                on_file_done(&source_path);
                self.copier.copy_file(&source_path, &target_path).await?;
                debug!("Copied {} -> {}", source_path, target_path);
                return Ok(1);
            }

            self.target.ensure_dir(&target_path).await?;

            let mut files = 0u64;
            for name in self.source.list(&source_path).await? {
                let child_source = self.source.join(&source_path, &name);
                let child_target = self.target.join(&target_path, &name);
                files += self
                    .copy_node(child_source, child_target, &mut *on_file_done)
                    .await?;
            }
            Ok(files)
        }
        .boxed()
    }
}

/// Upload a local file or directory tree to `remote_path`
pub async fn upload(
    client: &dyn RemoteFs,
    local_path: &str,
    remote_path: &str,
    on_file_done: &mut FileCallback<'_>,
    token: &CancellationToken,
) -> Result<u64, SftpError> {
    let remote = RemoteTree::new(client);
    let copier = UploadCopier::new(client);
    TreeTransfer::new(&LocalTree, &remote, &copier, token)
        .run(local_path, remote_path, on_file_done)
        .await
}

/// Download a remote file or directory tree to `local_path`
pub async fn download(
    client: &dyn RemoteFs,
    remote_path: &str,
    local_path: &str,
    on_file_done: &mut FileCallback<'_>,
    token: &CancellationToken,
) -> Result<u64, SftpError> {
    let remote = RemoteTree::new(client);
    let copier = DownloadCopier::new(client);
    TreeTransfer::new(&remote, &LocalTree, &copier, token)
        .run(remote_path, local_path, on_file_done)
        .await
}

/// Delete a file or directory tree, children before parents.
///
/// Returns the number of entries removed (files and directories). A failure
/// is reported once, as [`SftpError::Deletion`] naming the path that could
/// not be deleted.
pub fn delete_tree<'a>(
    tree: &'a dyn TreeFs,
    path: String,
    token: &'a CancellationToken,
) -> BoxFuture<'a, Result<u64, SftpError>> {
    async move {
        token.check()?;
        remove_entry(tree, &path, token)
            .await
            .map_err(|e| into_deletion_error(&path, e))
    }
    .boxed()
}

async fn remove_entry(
    tree: &dyn TreeFs,
    path: &str,
    token: &CancellationToken,
) -> Result<u64, SftpError> {
    if !tree.own_kind(path).await?.is_dir() {
        tree.remove_file(path).await?;
        debug!("Deleted file {}", path);
        return Ok(1);
    }

    let mut removed = 0u64;
    for name in tree.list(path).await? {
        removed += delete_tree(tree, tree.join(path, &name), token).await?;
    }
    tree.remove_dir(path).await?;
    debug!("Deleted directory {}", path);
    Ok(removed + 1)
}

/// Wrap at the innermost failing path only; cancellation is never wrapped
fn into_deletion_error(path: &str, err: SftpError) -> SftpError {
    match err {
        SftpError::Cancelled | SftpError::Deletion { .. } => err,
        other => SftpError::Deletion {
            path: path.to_string(),
            source: Box::new(other),
        },
    }
}

/// Delete a remote file or directory tree
pub async fn delete(
    client: &dyn RemoteFs,
    remote_path: &str,
    token: &CancellationToken,
) -> Result<u64, SftpError> {
    let tree = RemoteTree::new(client);
    delete_tree(&tree, remote_path.to_string(), token).await
}
