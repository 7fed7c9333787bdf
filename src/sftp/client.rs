//! Remote filesystem client
//!
//! [`RemoteFs`] is the capability set the transfer engine needs from an
//! established SFTP session. [`RusshRemoteFs`] implements it on top of
//! `russh_sftp`.

use std::time::Duration;

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::{OpenFlags, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::error::{RemoteErrorCode, SftpError};
use super::types::{EntryKind, RemoteEntry, RemoteStat};
use crate::config::TransferConfig;

/// Operations the engine performs against the remote side.
///
/// Implementations are not required to tolerate concurrent structural
/// operations; callers serialize access (see `TransferManager::acquire_permit`).
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Stat without following symbolic links
    async fn stat(&self, path: &str) -> Result<RemoteStat, SftpError>;

    /// Names of the direct children of a directory (no `.`/`..`)
    async fn list(&self, path: &str) -> Result<Vec<String>, SftpError>;

    /// Direct children of a directory with their kind and size
    async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError>;

    /// Create a directory. Fails with [`RemoteErrorCode::AlreadyExists`] if
    /// a directory already exists at `path`.
    async fn mkdir(&self, path: &str) -> Result<(), SftpError>;

    /// Create an empty file, truncating an existing one
    async fn create_file(&self, path: &str) -> Result<(), SftpError>;

    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    /// Remove an empty directory
    async fn remove_dir(&self, path: &str) -> Result<(), SftpError>;

    /// Copy a remote file to a local path, overwriting it
    async fn read_to_local(&self, remote_path: &str, local_path: &str) -> Result<u64, SftpError>;

    /// Copy a local file to a remote path, overwriting it
    async fn write_from_local(&self, local_path: &str, remote_path: &str)
        -> Result<u64, SftpError>;

    /// Release the underlying channel
    async fn close(&self) -> Result<(), SftpError> {
        Ok(())
    }
}

/// [`RemoteFs`] over a russh SFTP session
pub struct RusshRemoteFs {
    sftp: RusshSftpSession,
    chunk_size: usize,
    io_timeout: Duration,
}

impl RusshRemoteFs {
    pub fn new(sftp: RusshSftpSession, config: &TransferConfig) -> Self {
        Self {
            sftp,
            chunk_size: config.chunk_size(),
            io_timeout: config.io_timeout(),
        }
    }

    /// Resolve a path on the server (`.` gives the login directory)
    pub async fn canonicalize(&self, path: &str) -> Result<String, SftpError> {
        self.sftp
            .canonicalize(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }
}

#[async_trait]
impl RemoteFs for RusshRemoteFs {
    async fn stat(&self, path: &str) -> Result<RemoteStat, SftpError> {
        let metadata = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Ok(RemoteStat {
            kind,
            size: metadata.size.unwrap_or(0),
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, SftpError> {
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        let names: Vec<String> = read_dir
            .map(|entry| entry.file_name())
            .filter(|name| name != "." && name != "..")
            .collect();

        debug!("Listed {} entries in {}", names.len(), path);
        Ok(names)
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        let entries: Vec<RemoteEntry> = read_dir
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let metadata = entry.metadata();
                let (kind, size) = if metadata.is_dir() {
                    (EntryKind::Directory, 0)
                } else {
                    (EntryKind::File, metadata.size.unwrap_or(0))
                };
                RemoteEntry {
                    name: entry.file_name(),
                    kind,
                    size,
                }
            })
            .collect();

        debug!("Listed {} entries with attributes in {}", entries.len(), path);
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        match self.sftp.create_dir(path).await {
            Ok(()) => {
                info!("Created remote directory: {}", path);
                Ok(())
            }
            Err(e) => {
                // SFTPv3 has no dedicated status for an existing target, so look
                if let Ok(metadata) = self.sftp.symlink_metadata(path).await {
                    if metadata.is_dir() {
                        return Err(SftpError::remote(
                            path,
                            RemoteErrorCode::AlreadyExists,
                            "directory already exists",
                        ));
                    }
                }
                Err(map_sftp_error(e, path))
            }
        }
    }

    async fn create_file(&self, path: &str) -> Result<(), SftpError> {
        let mut file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        file.shutdown()
            .await
            .map_err(|e| remote_io_error(path, e))?;
        info!("Created remote file: {}", path);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn read_to_local(&self, remote_path: &str, local_path: &str) -> Result<u64, SftpError> {
        let mut remote_file = self
            .sftp
            .open(remote_path)
            .await
            .map_err(|e| map_sftp_error(e, remote_path))?;

        let mut local_file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| SftpError::local(local_path, e))?;

        let transferred = pump(&mut remote_file, &mut local_file, self.chunk_size, self.io_timeout)
            .await
            .map_err(|e| match e {
                PumpError::Read(e) => remote_io_error(remote_path, e),
                PumpError::Write(e) => SftpError::local(local_path, e),
                PumpError::ReadTimeout => stalled(remote_path, self.io_timeout),
                PumpError::WriteTimeout => SftpError::local(
                    local_path,
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "local write timed out"),
                ),
            })?;

        debug!("Downloaded {} bytes: {} -> {}", transferred, remote_path, local_path);
        Ok(transferred)
    }

    async fn write_from_local(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<u64, SftpError> {
        let mut local_file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| SftpError::local(local_path, e))?;

        let mut remote_file = self
            .sftp
            .open_with_flags(
                remote_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| map_sftp_error(e, remote_path))?;

        let transferred = pump(&mut local_file, &mut remote_file, self.chunk_size, self.io_timeout)
            .await
            .map_err(|e| match e {
                PumpError::Read(e) => SftpError::local(local_path, e),
                PumpError::Write(e) => remote_io_error(remote_path, e),
                PumpError::ReadTimeout => SftpError::local(
                    local_path,
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "local read timed out"),
                ),
                PumpError::WriteTimeout => stalled(remote_path, self.io_timeout),
            })?;

        // Closes the remote handle
        if let Err(e) = remote_file.shutdown().await {
            warn!("Failed to close remote file {}: {}", remote_path, e);
        }

        debug!("Uploaded {} bytes: {} -> {}", transferred, local_path, remote_path);
        Ok(transferred)
    }

    async fn close(&self) -> Result<(), SftpError> {
        self.sftp
            .close()
            .await
            .map_err(|e| map_sftp_error(e, "/"))
    }
}

/// Which side of a streamed copy failed
enum PumpError {
    Read(std::io::Error),
    Write(std::io::Error),
    ReadTimeout,
    WriteTimeout,
}

/// Stream `reader` into `writer` in chunks, bounding every read and write by
/// `io_timeout`, then flush.
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    io_timeout: Duration,
) -> Result<u64, PumpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; chunk_size];
    let mut transferred = 0u64;

    loop {
        let bytes_read = match tokio::time::timeout(io_timeout, reader.read(&mut buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(PumpError::Read(e)),
            Err(_) => return Err(PumpError::ReadTimeout),
        };

        if bytes_read == 0 {
            break;
        }

        match tokio::time::timeout(io_timeout, writer.write_all(&buffer[..bytes_read])).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(PumpError::Write(e)),
            Err(_) => return Err(PumpError::WriteTimeout),
        }

        transferred += bytes_read as u64;
    }

    match tokio::time::timeout(io_timeout, writer.flush()).await {
        Ok(Ok(())) => Ok(transferred),
        Ok(Err(e)) => Err(PumpError::Write(e)),
        Err(_) => Err(PumpError::WriteTimeout),
    }
}

fn remote_io_error(path: &str, err: std::io::Error) -> SftpError {
    SftpError::remote(path, RemoteErrorCode::Failure, err.to_string())
}

fn stalled(path: &str, io_timeout: Duration) -> SftpError {
    warn!("SFTP I/O on {} stalled for {:?}", path, io_timeout);
    SftpError::remote(
        path,
        RemoteErrorCode::ConnectionLost,
        format!("no progress for {:?} - SSH connection may be dead", io_timeout),
    )
}

/// Map russh-sftp errors to our error type
fn map_sftp_error(err: SftpErrorInner, path: &str) -> SftpError {
    let code = match &err {
        SftpErrorInner::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => RemoteErrorCode::NotFound,
            StatusCode::PermissionDenied => RemoteErrorCode::PermissionDenied,
            StatusCode::NoConnection | StatusCode::ConnectionLost => {
                RemoteErrorCode::ConnectionLost
            }
            StatusCode::OpUnsupported => RemoteErrorCode::Unsupported,
            _ => RemoteErrorCode::Failure,
        },
        SftpErrorInner::Timeout => RemoteErrorCode::ConnectionLost,
        _ => RemoteErrorCode::Failure,
    };
    SftpError::remote(path, code, err.to_string())
}
