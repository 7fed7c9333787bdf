//! Path utilities for local and remote trees
//!
//! Remote SFTP paths always use `/` as separator (per SFTP protocol), whatever
//! the local or remote OS. Local paths use the platform-native separator.
//! Neither side is normalized: `..` and duplicate separators inside a caller
//! supplied path are passed through untouched.

use std::path::{Path, PathBuf};

/// Check if a remote SFTP path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote SFTP path components using `/` separator.
///
/// A base that already ends in `/` (the root, typically) is not doubled.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Join local path components using platform-native separator.
///
/// - Windows: `C:\Users` + `file.txt` → `C:\Users\file.txt`
/// - Unix: `/home/user` + `file.txt` → `/home/user/file.txt`
pub fn join_local_path(base: &str, component: &str) -> String {
    let mut path = PathBuf::from(base);
    path.push(component);
    path.to_string_lossy().to_string()
}

/// Last segment of a remote path (`/home/u/docs` → `docs`).
///
/// Trailing slashes are ignored; the root yields an empty string.
pub fn remote_base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Last component of a local path, lossily converted to UTF-8.
pub fn local_base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Flatten a remote path into a single local file name (`/etc/hosts` → `_etc_hosts`).
pub fn flatten_remote_path(path: &str) -> String {
    path.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_absolute_remote_path() {
        assert!(is_absolute_remote_path("/home/user"));
        assert!(is_absolute_remote_path("/"));
        assert!(!is_absolute_remote_path("relative/path"));
        assert!(!is_absolute_remote_path("C:\\Windows"));
    }

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/home", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/home/", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/", "home"), "/home");
        // No normalization
        assert_eq!(join_remote_path("/a/../b", "c"), "/a/../b/c");
    }

    #[test]
    fn test_remote_base_name() {
        assert_eq!(remote_base_name("/home/u/docs"), "docs");
        assert_eq!(remote_base_name("/home/u/docs/"), "docs");
        assert_eq!(remote_base_name("file.txt"), "file.txt");
        assert_eq!(remote_base_name("/"), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_local_path_helpers() {
        assert_eq!(join_local_path("/tmp", "a.txt"), "/tmp/a.txt");
        assert_eq!(local_base_name("/tmp/docs"), "docs");
        assert_eq!(local_base_name("/"), "");
    }

    #[test]
    fn test_flatten_remote_path() {
        assert_eq!(flatten_remote_path("/etc/hosts"), "_etc_hosts");
    }
}
