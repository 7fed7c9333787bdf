//! Batch operations over several roots
//!
//! A batch counts its roots first, reports the total, then transfers (or
//! deletes) root by root while the engine's per-file callback drives the
//! gauge. Whatever happens, the reporter receives exactly one
//! [`ProgressReporter::finish`] call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::counter::{count_local, count_remote};
use super::engine::{delete, download, upload};
use super::manager::{TransferGuard, TransferManager};
use super::progress::{gauge_range, ProgressReporter};
use crate::sftp::client::RemoteFs;
use crate::sftp::error::SftpError;
use crate::sftp::path_utils::{join_local_path, join_remote_path, local_base_name, remote_base_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Upload,
    Download,
    Copy,
    Delete,
}

impl BatchKind {
    fn label(self) -> &'static str {
        match self {
            BatchKind::Upload => "Upload",
            BatchKind::Download => "Download",
            BatchKind::Copy => "Copy",
            BatchKind::Delete => "Delete",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            BatchKind::Upload => "Uploading",
            BatchKind::Download => "Downloading",
            BatchKind::Copy => "Copying",
            BatchKind::Delete => "Deleting",
        }
    }

    pub fn start_message(self) -> String {
        match self {
            BatchKind::Delete => "Starting deletion...".to_string(),
            other => format!("Starting {}...", other.label().to_lowercase()),
        }
    }

    fn item_message(self, name: &str) -> String {
        format!("{}: {}", self.verb(), name)
    }

    fn end_message(self, outcome: &BatchOutcome) -> String {
        match (self, outcome) {
            (BatchKind::Delete, BatchOutcome::Failed { .. }) => "Deletion failed.".to_string(),
            (kind, BatchOutcome::Completed { .. }) => format!("{} complete.", kind.label()),
            (kind, BatchOutcome::Cancelled) => format!("{} cancelled.", kind.label()),
            (kind, BatchOutcome::Failed { .. }) => format!("{} failed.", kind.label()),
        }
    }

    /// Whether the remote listing is stale after this batch ends
    pub fn changes_remote(self) -> bool {
        matches!(self, BatchKind::Upload | BatchKind::Delete)
    }
}

/// What a batch should do
#[derive(Debug, Clone)]
pub enum BatchRequest {
    Upload {
        local_paths: Vec<String>,
        remote_dir: String,
    },
    Download {
        remote_paths: Vec<String>,
        local_dir: String,
    },
    /// Download into a staging directory for a later local paste
    Copy {
        remote_paths: Vec<String>,
        staging_dir: String,
    },
    Delete {
        remote_paths: Vec<String>,
    },
}

impl BatchRequest {
    pub fn kind(&self) -> BatchKind {
        match self {
            BatchRequest::Upload { .. } => BatchKind::Upload,
            BatchRequest::Download { .. } => BatchKind::Download,
            BatchRequest::Copy { .. } => BatchKind::Copy,
            BatchRequest::Delete { .. } => BatchKind::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// `files` is the number of files moved, or of entries removed for a
    /// delete. `local_paths` lists the top-level local results of a download
    /// or copy.
    Completed { files: u64, local_paths: Vec<String> },
    Cancelled,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub id: String,
    pub kind: BatchKind,
    pub outcome: BatchOutcome,
    pub message: String,
    pub refresh_remote: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    fn new(id: &str, kind: BatchKind, outcome: BatchOutcome, started_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            message: kind.end_message(&outcome),
            outcome,
            refresh_remote: kind.changes_remote(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Cancelled)
    }
}

/// Run one batch to completion and report it.
///
/// `deadline` bounds the whole batch; running past it fails the batch with
/// [`SftpError::Timeout`].
pub async fn run_batch(
    id: &str,
    client: &dyn RemoteFs,
    request: &BatchRequest,
    token: &CancellationToken,
    reporter: &dyn ProgressReporter,
    deadline: Option<Duration>,
) -> BatchReport {
    let kind = request.kind();
    let started_at = Utc::now();
    info!("Batch {} started: {:?}", id, kind);

    let work = execute(client, request, token, reporter);
    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(SftpError::Timeout(limit)),
        },
        None => work.await,
    };

    let outcome = match result {
        Ok((files, local_paths)) => {
            info!("Batch {} completed: {} files", id, files);
            BatchOutcome::Completed { files, local_paths }
        }
        Err(e) if e.is_cancelled() => {
            info!("Batch {} cancelled", id);
            BatchOutcome::Cancelled
        }
        Err(e) => {
            warn!("Batch {} failed: {}", id, e);
            BatchOutcome::Failed {
                error: e.to_string(),
            }
        }
    };

    let report = BatchReport::new(id, kind, outcome, started_at);
    reporter.finish(&report);
    report
}

async fn execute(
    client: &dyn RemoteFs,
    request: &BatchRequest,
    token: &CancellationToken,
    reporter: &dyn ProgressReporter,
) -> Result<(u64, Vec<String>), SftpError> {
    let kind = request.kind();
    match request {
        BatchRequest::Upload {
            local_paths,
            remote_dir,
        } => {
            let mut total = 0u64;
            for root in local_paths {
                total += count_local(root, token).await?;
            }
            let range = gauge_range(total);
            reporter.begin(total, range, &kind.start_message());

            let mut done = 0u64;
            let mut on_file = |path: &str| {
                done += 1;
                reporter.advance(done, range, &kind.item_message(&local_base_name(path)));
            };

            let mut files = 0u64;
            for root in local_paths {
                token.check()?;
                let target = join_remote_path(remote_dir, &local_base_name(root));
                debug!("Uploading root {} -> {}", root, target);
                files += upload(client, root, &target, &mut on_file, token).await?;
            }
            Ok((files, Vec::new()))
        }
        BatchRequest::Download {
            remote_paths,
            local_dir,
        }
        | BatchRequest::Copy {
            remote_paths,
            staging_dir: local_dir,
        } => {
            let mut total = 0u64;
            for root in remote_paths {
                total += count_remote(client, root, token).await?;
            }
            let range = gauge_range(total);
            reporter.begin(total, range, &kind.start_message());

            let mut done = 0u64;
            let mut on_file = |path: &str| {
                done += 1;
                reporter.advance(done, range, &kind.item_message(remote_base_name(path)));
            };

            let mut files = 0u64;
            let mut local_paths = Vec::with_capacity(remote_paths.len());
            for root in remote_paths {
                token.check()?;
                let target = join_local_path(local_dir, remote_base_name(root));
                debug!("Downloading root {} -> {}", root, target);
                files += download(client, root, &target, &mut on_file, token).await?;
                local_paths.push(target);
            }
            Ok((files, local_paths))
        }
        BatchRequest::Delete { remote_paths } => {
            let total = remote_paths.len() as u64;
            let range = gauge_range(total);
            reporter.begin(total, range, &kind.start_message());

            let mut removed = 0u64;
            for (i, root) in remote_paths.iter().enumerate() {
                token.check()?;
                reporter.advance(i as u64 + 1, range, &kind.item_message(remote_base_name(root)));
                removed += delete(client, root, token).await?;
            }
            Ok((removed, Vec::new()))
        }
    }
}

/// A batch running on its own task
pub struct BatchHandle {
    pub id: String,
    pub kind: BatchKind,
    pub token: CancellationToken,
    started_at: DateTime<Utc>,
    join: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the final report
    pub async fn wait(self) -> BatchReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                warn!("Batch {} task aborted: {}", self.id, e);
                BatchReport::new(
                    &self.id,
                    self.kind,
                    BatchOutcome::Failed {
                        error: format!("batch task aborted: {}", e),
                    },
                    self.started_at,
                )
            }
        }
    }
}

/// Spawn a batch that queues for the connection behind earlier ones.
///
/// Cancelling while still queued ends the batch without touching the remote.
pub fn spawn_batch(
    manager: Arc<TransferManager>,
    client: Arc<dyn RemoteFs>,
    request: BatchRequest,
    reporter: Arc<dyn ProgressReporter>,
    deadline: Option<Duration>,
) -> BatchHandle {
    let id = uuid::Uuid::new_v4().to_string();
    let kind = request.kind();
    let token = manager.register(&id);
    let started_at = Utc::now();

    let join = {
        let id = id.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let _guard = TransferGuard::new(manager.clone(), id.clone());

            let permit = tokio::select! {
                permit = manager.acquire_permit() => permit,
                _ = token.cancelled() => Err(SftpError::Cancelled),
            };
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    info!("Batch {} cancelled while queued", id);
                    let report = BatchReport::new(&id, kind, BatchOutcome::Cancelled, started_at);
                    reporter.finish(&report);
                    return report;
                }
            };

            run_batch(&id, client.as_ref(), &request, &token, reporter.as_ref(), deadline).await
        })
    };

    BatchHandle {
        id,
        kind,
        token,
        started_at,
        join,
    }
}
