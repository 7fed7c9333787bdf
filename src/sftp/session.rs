//! SFTP session management
//!
//! One [`SftpSession`] per SSH connection. It owns the remote client, the
//! batches running against it, the files opened for remote editing and the
//! local staging directories those features need.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use russh::client;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::client::{RemoteFs, RusshRemoteFs};
use super::error::SftpError;
use super::path_utils::{
    flatten_remote_path, is_absolute_remote_path, join_local_path, join_remote_path,
};
use super::types::RemoteEntry;
use crate::config::TransferConfig;
use crate::transfer::batch::{spawn_batch, BatchHandle, BatchRequest};
use crate::transfer::cancel::CancellationToken;
use crate::transfer::manager::TransferManager;
use crate::transfer::progress::ProgressReporter;

pub struct SftpSession {
    session_id: String,
    client: Arc<dyn RemoteFs>,
    config: TransferConfig,
    manager: Arc<TransferManager>,
    last_path: RwLock<String>,
    /// Local copies of files opened for editing
    edit_dir: TempDir,
    open_edits: Mutex<HashSet<String>>,
    /// Staging directory of the most recent copy batch
    copy_dir: Mutex<Option<CopyStaging>>,
}

struct CopyStaging {
    dir: TempDir,
    token: CancellationToken,
}

impl SftpSession {
    /// Open the `sftp` subsystem on an authenticated SSH connection
    pub async fn open<H>(
        handle: &client::Handle<H>,
        session_id: String,
        config: TransferConfig,
    ) -> Result<Self, SftpError>
    where
        H: client::Handler,
    {
        info!("Opening SFTP subsystem for session {}", session_id);

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SftpError::ChannelError(e.to_string()))?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SftpError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SftpError::SubsystemNotAvailable(e.to_string()))?;

        info!("SFTP subsystem opened for session {}", session_id);

        let client = RusshRemoteFs::new(sftp, &config);
        let cwd = client.canonicalize(".").await?;

        Self::build(Arc::new(client), session_id, cwd, config)
    }

    /// Session over an already established client; browsing starts at `/`
    pub fn with_client(
        client: Arc<dyn RemoteFs>,
        session_id: String,
        config: TransferConfig,
    ) -> Result<Self, SftpError> {
        Self::build(client, session_id, "/".to_string(), config)
    }

    fn build(
        client: Arc<dyn RemoteFs>,
        session_id: String,
        cwd: String,
        config: TransferConfig,
    ) -> Result<Self, SftpError> {
        let edit_dir = staging_dir(&config)?;
        debug!(
            "Edit staging directory for session {}: {}",
            session_id,
            edit_dir.path().display()
        );

        Ok(Self {
            session_id,
            client,
            config,
            manager: Arc::new(TransferManager::new()),
            last_path: RwLock::new(cwd),
            edit_dir,
            open_edits: Mutex::new(HashSet::new()),
            copy_dir: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client(&self) -> Arc<dyn RemoteFs> {
        self.client.clone()
    }

    pub fn manager(&self) -> &Arc<TransferManager> {
        &self.manager
    }

    /// Last directory browsed on this connection
    pub fn last_path(&self) -> String {
        self.last_path.read().clone()
    }

    pub fn set_last_path(&self, path: impl Into<String>) {
        *self.last_path.write() = path.into();
    }

    /// Relative paths are taken from the last browsed directory
    pub fn resolve_path(&self, path: &str) -> String {
        if is_absolute_remote_path(path) {
            path.to_string()
        } else {
            join_remote_path(&self.last_path(), path)
        }
    }

    /// Directory listing with kind and size of each entry
    pub async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        let path = self.resolve_path(path);
        let _permit = self.manager.acquire_permit().await?;
        let entries = self.client.list_entries(&path).await?;
        debug!("Session {} listed {} ({} entries)", self.session_id, path, entries.len());
        Ok(entries)
    }

    /// Create an empty directory and return its absolute path
    pub async fn create_dir(&self, path: &str) -> Result<String, SftpError> {
        let path = self.resolve_path(path);
        let _permit = self.manager.acquire_permit().await?;
        self.client.mkdir(&path).await?;
        Ok(path)
    }

    /// Create an empty file and return its absolute path
    pub async fn create_file(&self, path: &str) -> Result<String, SftpError> {
        let path = self.resolve_path(path);
        let _permit = self.manager.acquire_permit().await?;
        self.client.create_file(&path).await?;
        Ok(path)
    }

    /// Local path where `remote_path` is staged while being edited
    pub fn edit_path(&self, remote_path: &str) -> String {
        join_local_path(
            &self.edit_dir.path().to_string_lossy(),
            &flatten_remote_path(remote_path),
        )
    }

    pub fn is_open_for_edit(&self, remote_path: &str) -> bool {
        self.open_edits.lock().contains(remote_path)
    }

    /// Download a remote file for local editing and return the local path
    pub async fn open_for_edit(&self, remote_path: &str) -> Result<String, SftpError> {
        if !self.open_edits.lock().insert(remote_path.to_string()) {
            return Err(SftpError::AlreadyOpen(remote_path.to_string()));
        }

        let local_path = self.edit_path(remote_path);
        let result = async {
            let _permit = self.manager.acquire_permit().await?;
            self.client.read_to_local(remote_path, &local_path).await
        }
        .await;

        match result {
            Ok(size) => {
                info!("Opened {} for editing ({} bytes)", remote_path, size);
                Ok(local_path)
            }
            Err(e) => {
                self.open_edits.lock().remove(remote_path);
                Err(e)
            }
        }
    }

    /// Upload the staged copy of an edited file back to the server
    pub async fn save_edit(&self, remote_path: &str) -> Result<u64, SftpError> {
        if !self.is_open_for_edit(remote_path) {
            return Err(SftpError::NotOpen(remote_path.to_string()));
        }

        let local_path = self.edit_path(remote_path);
        let _permit = self.manager.acquire_permit().await?;
        let size = self.client.write_from_local(&local_path, remote_path).await?;
        info!("Saved {} ({} bytes)", remote_path, size);
        Ok(size)
    }

    /// Stop tracking an edited file and drop its staged copy
    pub fn close_edit(&self, remote_path: &str) -> bool {
        if !self.open_edits.lock().remove(remote_path) {
            return false;
        }
        let local_path = self.edit_path(remote_path);
        if let Err(e) = std::fs::remove_file(&local_path) {
            warn!("Failed to remove staged edit {}: {}", local_path, e);
        }
        true
    }

    pub fn start_upload(
        &self,
        local_paths: Vec<String>,
        remote_dir: String,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BatchHandle {
        self.spawn(
            BatchRequest::Upload {
                local_paths,
                remote_dir,
            },
            reporter,
        )
    }

    pub fn start_download(
        &self,
        remote_paths: Vec<String>,
        local_dir: String,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BatchHandle {
        self.spawn(
            BatchRequest::Download {
                remote_paths,
                local_dir,
            },
            reporter,
        )
    }

    /// Copy remote entries into a fresh staging directory.
    ///
    /// The previous copy batch is cancelled. Its staging directory is removed
    /// once that batch no longer holds the connection.
    pub fn start_copy(
        &self,
        remote_paths: Vec<String>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<BatchHandle, SftpError> {
        let fresh = staging_dir(&self.config)?;
        let staging = fresh.path().to_string_lossy().to_string();

        let mut copy = self.copy_dir.lock();
        if let Some(previous) = copy.take() {
            previous.token.cancel();
            self.retire_staging(previous.dir);
        }

        let handle = self.spawn(
            BatchRequest::Copy {
                remote_paths,
                staging_dir: staging,
            },
            reporter,
        );
        *copy = Some(CopyStaging {
            dir: fresh,
            token: handle.token.clone(),
        });
        Ok(handle)
    }

    /// Local directory holding the results of the most recent copy
    pub fn copy_staging_dir(&self) -> Option<String> {
        self.copy_dir
            .lock()
            .as_ref()
            .map(|copy| copy.dir.path().to_string_lossy().to_string())
    }

    fn retire_staging(&self, dir: TempDir) {
        let manager = self.manager.clone();
        tokio::spawn(async move {
            // A cancelled batch writes nothing once it has released the permit
            let _permit = manager.acquire_permit().await;
            remove_staging(dir);
        });
    }

    pub fn start_delete(
        &self,
        remote_paths: Vec<String>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BatchHandle {
        self.spawn(BatchRequest::Delete { remote_paths }, reporter)
    }

    fn spawn(&self, request: BatchRequest, reporter: Arc<dyn ProgressReporter>) -> BatchHandle {
        let handle = spawn_batch(
            self.manager.clone(),
            self.client.clone(),
            request,
            reporter,
            self.config.operation_timeout(),
        );
        debug!(
            "Session {} started {:?} batch {}",
            self.session_id, handle.kind, handle.id
        );
        handle
    }

    pub fn cancel(&self, batch_id: &str) -> bool {
        self.manager.cancel(batch_id)
    }

    pub fn cancel_all(&self) {
        self.manager.cancel_all();
    }

    /// Cancel running batches, wait for the one holding the connection,
    /// close the channel and remove staging directories. Cleanup failures are
    /// logged.
    pub async fn close(self) {
        info!("Closing SFTP session {}", self.session_id);
        self.manager.cancel_all();
        let permit = self.manager.acquire_permit().await;
        self.manager.shutdown();

        if let Err(e) = self.client.close().await {
            warn!("Failed to close SFTP channel for {}: {}", self.session_id, e);
        }

        remove_staging(self.edit_dir);
        if let Some(copy) = self.copy_dir.into_inner() {
            remove_staging(copy.dir);
        }
        drop(permit);
    }
}

fn remove_staging(dir: TempDir) {
    let path = dir.path().display().to_string();
    match dir.close() {
        Ok(()) => debug!("Removed staging directory {}", path),
        Err(e) => warn!("Failed to remove staging directory {}: {}", path, e),
    }
}

fn staging_dir(config: &TransferConfig) -> Result<TempDir, SftpError> {
    tempfile::Builder::new()
        .prefix(&config.staging_prefix)
        .tempdir()
        .map_err(|e| SftpError::local(std::env::temp_dir().to_string_lossy(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::memory::{MemoryRemoteFs, Op};
    use crate::sftp::types::EntryKind;
    use crate::transfer::batch::BatchOutcome;
    use crate::transfer::progress::NullReporter;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn session(fs: &Arc<MemoryRemoteFs>) -> SftpSession {
        SftpSession::with_client(fs.clone(), "s1".to_string(), TransferConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_last_path() {
        let fs = Arc::new(MemoryRemoteFs::new());
        let session = session(&fs);
        assert_eq!(session.last_path(), "/");
        session.set_last_path("/home/u");
        assert_eq!(session.last_path(), "/home/u");
    }

    #[tokio::test]
    async fn test_edit_cycle() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_file("/etc/app.conf", b"old");
        let session = session(&fs);

        let local = session.open_for_edit("/etc/app.conf").await.unwrap();
        assert!(local.ends_with("_etc_app.conf"));
        assert_eq!(std::fs::read(&local).unwrap(), b"old");
        assert!(session.is_open_for_edit("/etc/app.conf"));

        assert!(matches!(
            session.open_for_edit("/etc/app.conf").await,
            Err(SftpError::AlreadyOpen(_))
        ));

        std::fs::write(&local, b"new content").unwrap();
        assert_eq!(session.save_edit("/etc/app.conf").await.unwrap(), 11);
        assert_eq!(fs.content("/etc/app.conf").unwrap(), b"new content");

        assert!(session.close_edit("/etc/app.conf"));
        assert!(!session.is_open_for_edit("/etc/app.conf"));
        assert!(!Path::new(&local).exists());
        assert!(!session.close_edit("/etc/app.conf"));
    }

    #[tokio::test]
    async fn test_failed_open_is_not_tracked() {
        let fs = Arc::new(MemoryRemoteFs::new());
        let session = session(&fs);

        assert!(session.open_for_edit("/missing").await.is_err());
        assert!(!session.is_open_for_edit("/missing"));
        assert!(matches!(
            session.save_edit("/missing").await,
            Err(SftpError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_start_copy_replaces_staging_dir() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_file("/srv/a.txt", b"aaa");
        let session = session(&fs);

        let first = session
            .start_copy(vec!["/srv/a.txt".to_string()], Arc::new(NullReporter))
            .unwrap()
            .wait()
            .await;
        let first_path = match first.outcome {
            BatchOutcome::Completed { local_paths, .. } => local_paths[0].clone(),
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(std::fs::read(&first_path).unwrap(), b"aaa");

        let second = session
            .start_copy(vec!["/srv/a.txt".to_string()], Arc::new(NullReporter))
            .unwrap()
            .wait()
            .await;
        assert!(matches!(second.outcome, BatchOutcome::Completed { files: 1, .. }));
        wait_until_removed(Path::new(&first_path)).await;
    }

    async fn wait_until_removed(path: &Path) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while path.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_start_copy_keeps_previous_staging_until_its_batch_ends() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_file("/srv/a.txt", b"aaa");
        let session = session(&fs);

        let held = session.manager().acquire_permit().await.unwrap();
        let first = session
            .start_copy(vec!["/srv/a.txt".to_string()], Arc::new(NullReporter))
            .unwrap();
        let first_dir = session.copy_staging_dir().unwrap();

        let second = session
            .start_copy(vec!["/srv/a.txt".to_string()], Arc::new(NullReporter))
            .unwrap();
        let second_dir = session.copy_staging_dir().unwrap();
        assert_ne!(first_dir, second_dir);
        assert!(first.token.is_cancelled());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(Path::new(&first_dir).exists());

        assert!(first.wait().await.is_cancelled());
        drop(held);

        let report = second.wait().await;
        match report.outcome {
            BatchOutcome::Completed { local_paths, .. } => {
                assert!(local_paths[0].starts_with(&second_dir));
                assert_eq!(std::fs::read(&local_paths[0]).unwrap(), b"aaa");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        wait_until_removed(Path::new(&first_dir)).await;
        assert!(Path::new(&second_dir).exists());
    }

    #[tokio::test]
    async fn test_list_entries_reports_kind_and_size() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_file("/srv/a.txt", b"hello");
        fs.add_dir("/srv/sub");
        let session = session(&fs);

        let mut entries = session.list_entries("/srv").await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                RemoteEntry {
                    name: "a.txt".to_string(),
                    kind: EntryKind::File,
                    size: 5,
                },
                RemoteEntry {
                    name: "sub".to_string(),
                    kind: EntryKind::Directory,
                    size: 0,
                },
            ]
        );
        assert_eq!(session.manager().active_count(), 0);
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_against_last_path() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_dir("/home/u");
        let session = session(&fs);
        session.set_last_path("/home/u");

        assert_eq!(session.resolve_path("/etc"), "/etc");
        assert_eq!(session.create_dir("docs").await.unwrap(), "/home/u/docs");
        assert_eq!(
            session.create_file("docs/notes.txt").await.unwrap(),
            "/home/u/docs/notes.txt"
        );

        let entries = session.list_entries("docs").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "notes.txt");
        assert_eq!(entries[0].kind, EntryKind::File);
    }

    #[tokio::test]
    async fn test_create_dir_and_file() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_file("/srv/old.txt", b"stale");
        let session = session(&fs);

        session.create_dir("/srv/new").await.unwrap();
        assert!(fs.exists("/srv/new"));
        assert!(fs.content("/srv/new").is_none());

        session.create_file("/srv/new/empty.txt").await.unwrap();
        assert_eq!(fs.content("/srv/new/empty.txt").unwrap(), b"");

        session.create_file("/srv/old.txt").await.unwrap();
        assert_eq!(fs.content("/srv/old.txt").unwrap(), b"");
    }

    #[tokio::test]
    async fn test_browsing_errors_propagate() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_dir("/srv/sub");
        let session = session(&fs);

        assert!(session.list_entries("/missing").await.is_err());
        assert!(session.create_file("/missing/f.txt").await.is_err());
        assert!(session.create_file("/srv/sub").await.is_err());

        fs.fail(Op::Mkdir, "/srv/denied");
        assert!(matches!(
            session.create_dir("/srv/denied").await,
            Err(SftpError::Remote { .. })
        ));
        assert!(!fs.exists("/srv/denied"));

        session.manager().shutdown();
        assert!(matches!(
            session.list_entries("/srv").await,
            Err(SftpError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_batches_run_in_order() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_dir("/dest");
        let session = session(&fs);
        let local = tempdir().unwrap();
        let file = local.path().join("f.txt");
        std::fs::write(&file, b"data").unwrap();

        let upload = session.start_upload(
            vec![file.to_string_lossy().to_string()],
            "/dest".to_string(),
            Arc::new(NullReporter),
        );
        let delete = session.start_delete(vec!["/dest/f.txt".to_string()], Arc::new(NullReporter));

        assert!(matches!(upload.wait().await.outcome, BatchOutcome::Completed { .. }));
        assert!(matches!(delete.wait().await.outcome, BatchOutcome::Completed { .. }));
        assert!(!fs.exists("/dest/f.txt"));
    }

    #[tokio::test]
    async fn test_close_removes_staging() {
        let fs = Arc::new(MemoryRemoteFs::new());
        fs.add_file("/srv/a.txt", b"aaa");
        let session = session(&fs);
        let edit = session.open_for_edit("/srv/a.txt").await.unwrap();
        let edit_dir = Path::new(&edit).parent().unwrap().to_path_buf();

        session.close().await;
        assert!(!edit_dir.exists());
    }
}
