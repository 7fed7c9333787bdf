//! Leaf file counting for progress totals

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::cancel::CancellationToken;
use super::tree::{LocalTree, RemoteTree, TreeFs};
use crate::sftp::client::RemoteFs;
use crate::sftp::error::SftpError;

/// Count the non-directory entries reachable from `path`.
///
/// A directory adds nothing itself; an empty tree counts 0.
pub fn count_leaves<'a>(
    tree: &'a dyn TreeFs,
    path: String,
    token: &'a CancellationToken,
) -> BoxFuture<'a, Result<u64, SftpError>> {
    async move {
        token.check()?;

        if !tree.kind(&path).await?.is_dir() {
            return Ok(1);
        }

        let mut count = 0u64;
        for name in tree.list(&path).await? {
            count += count_leaves(tree, tree.join(&path, &name), token).await?;
        }
        Ok(count)
    }
    .boxed()
}

/// Count leaf files under a local path
pub async fn count_local(path: &str, token: &CancellationToken) -> Result<u64, SftpError> {
    count_leaves(&LocalTree, path.to_string(), token).await
}

/// Count leaf files under a remote path
pub async fn count_remote(
    client: &dyn RemoteFs,
    path: &str,
    token: &CancellationToken,
) -> Result<u64, SftpError> {
    let tree = RemoteTree::new(client);
    count_leaves(&tree, path.to_string(), token).await
}
