//! SFTP and transfer error types

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Classification of a failure reported by the remote filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorCode {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    ConnectionLost,
    Unsupported,
    Failure,
}

impl std::fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemoteErrorCode::NotFound => "not found",
            RemoteErrorCode::PermissionDenied => "permission denied",
            RemoteErrorCode::AlreadyExists => "already exists",
            RemoteErrorCode::ConnectionLost => "connection lost",
            RemoteErrorCode::Unsupported => "operation unsupported",
            RemoteErrorCode::Failure => "failure",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum SftpError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Remote filesystem error on {path} ({code}): {message}")]
    Remote {
        path: String,
        code: RemoteErrorCode,
        message: String,
    },

    #[error("Local filesystem error on {path}: {source}")]
    Local {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    Deletion {
        path: String,
        #[source]
        source: Box<SftpError>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("SFTP subsystem not available: {0}")]
    SubsystemNotAvailable(String),

    #[error("File is already open for editing: {0}")]
    AlreadyOpen(String),

    #[error("File is not open for editing: {0}")]
    NotOpen(String),
}

impl SftpError {
    pub fn remote(path: impl Into<String>, code: RemoteErrorCode, message: impl Into<String>) -> Self {
        SftpError::Remote {
            path: path.into(),
            code,
            message: message.into(),
        }
    }

    pub fn local(path: impl Into<String>, source: std::io::Error) -> Self {
        SftpError::Local {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SftpError::Cancelled)
    }

    /// True for the "target already exists" outcome of a directory creation
    pub fn is_already_exists(&self) -> bool {
        match self {
            SftpError::Remote { code, .. } => *code == RemoteErrorCode::AlreadyExists,
            SftpError::Local { source, .. } => {
                source.kind() == std::io::ErrorKind::AlreadyExists
            }
            _ => false,
        }
    }
}

impl Serialize for SftpError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_detection() {
        let remote = SftpError::remote("/srv", RemoteErrorCode::AlreadyExists, "exists");
        assert!(remote.is_already_exists());

        let local = SftpError::local(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        );
        assert!(local.is_already_exists());

        let denied = SftpError::remote("/srv", RemoteErrorCode::PermissionDenied, "no");
        assert!(!denied.is_already_exists());
        assert!(!SftpError::Cancelled.is_already_exists());
    }

    #[test]
    fn test_deletion_error_names_path() {
        let err = SftpError::Deletion {
            path: "/a/b.txt".to_string(),
            source: Box::new(SftpError::remote(
                "/a/b.txt",
                RemoteErrorCode::PermissionDenied,
                "Permission denied",
            )),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to delete /a/b.txt"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_serializes_as_display_string() {
        let json = serde_json::to_string(&SftpError::Cancelled).unwrap();
        assert_eq!(json, "\"Operation cancelled\"");
    }
}
