//! In-memory [`RemoteFs`] used by the test suites

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::RemoteFs;
use super::error::{RemoteErrorCode, SftpError};
use super::types::{EntryKind, RemoteEntry, RemoteStat};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// Which remote operation a fault is injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Stat,
    List,
    Mkdir,
    RemoveFile,
    RemoveDir,
    CreateFile,
    Read,
    Write,
}

/// Flat path → node map. `/` always exists.
pub struct MemoryRemoteFs {
    nodes: Mutex<BTreeMap<String, Node>>,
    faults: Mutex<HashSet<(Op, String)>>,
    log: Mutex<Vec<(Op, String)>>,
}

impl MemoryRemoteFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes: Mutex::new(nodes),
            faults: Mutex::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Create a directory and its missing parents
    pub fn add_dir(&self, path: &str) {
        let mut nodes = self.nodes.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    /// Create a file (and its missing parents)
    pub fn add_file(&self, path: &str, content: &[u8]) {
        if let Some(parent) = parent_of(path) {
            self.add_dir(&parent);
        }
        self.nodes
            .lock()
            .insert(path.to_string(), Node::File(content.to_vec()));
    }

    pub fn fail(&self, op: Op, path: &str) {
        self.faults.lock().insert((op, path.to_string()));
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.lock().contains_key(path)
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Number of regular files stored
    pub fn file_count(&self) -> usize {
        self.nodes
            .lock()
            .values()
            .filter(|n| matches!(n, Node::File(_)))
            .count()
    }

    /// Every operation performed, in order
    pub fn calls(&self) -> Vec<(Op, String)> {
        self.log.lock().clone()
    }

    fn record(&self, op: Op, path: &str) -> Result<(), SftpError> {
        self.log.lock().push((op, path.to_string()));
        if self.faults.lock().contains(&(op, path.to_string())) {
            return Err(SftpError::remote(
                path,
                RemoteErrorCode::PermissionDenied,
                "Permission denied",
            ));
        }
        Ok(())
    }

    fn not_found(path: &str) -> SftpError {
        SftpError::remote(path, RemoteErrorCode::NotFound, "No such file")
    }

    fn children(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        nodes
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect()
    }
}

fn parent_of(path: &str) -> Option<String> {
    let idx = path.rfind('/')?;
    if idx == 0 {
        Some("/".to_string())
    } else {
        Some(path[..idx].to_string())
    }
}

#[async_trait]
impl RemoteFs for MemoryRemoteFs {
    async fn stat(&self, path: &str) -> Result<RemoteStat, SftpError> {
        self.record(Op::Stat, path)?;
        match self.nodes.lock().get(path) {
            Some(Node::Dir) => Ok(RemoteStat::directory()),
            Some(Node::File(data)) => Ok(RemoteStat::file(data.len() as u64)),
            None => Err(Self::not_found(path)),
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, SftpError> {
        self.record(Op::List, path)?;
        let nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Dir) => Ok(Self::children(&nodes, path)),
            Some(Node::File(_)) => Err(SftpError::remote(
                path,
                RemoteErrorCode::Failure,
                "Not a directory",
            )),
            None => Err(Self::not_found(path)),
        }
    }

    async fn list_entries(&self, path: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        let names = self.list(path).await?;
        let nodes = self.nodes.lock();
        Ok(names
            .into_iter()
            .map(|name| {
                let (kind, size) = match nodes.get(&super::path_utils::join_remote_path(path, &name)) {
                    Some(Node::File(data)) => (EntryKind::File, data.len() as u64),
                    _ => (EntryKind::Directory, 0),
                };
                RemoteEntry { name, kind, size }
            })
            .collect())
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        self.record(Op::Mkdir, path)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Dir) => Err(SftpError::remote(
                path,
                RemoteErrorCode::AlreadyExists,
                "directory already exists",
            )),
            Some(Node::File(_)) => Err(SftpError::remote(path, RemoteErrorCode::Failure, "Failure")),
            None => {
                let parent_ok = parent_of(path)
                    .map(|p| matches!(nodes.get(&p), Some(Node::Dir)))
                    .unwrap_or(false);
                if !parent_ok {
                    return Err(Self::not_found(path));
                }
                nodes.insert(path.to_string(), Node::Dir);
                Ok(())
            }
        }
    }

    async fn create_file(&self, path: &str) -> Result<(), SftpError> {
        self.record(Op::CreateFile, path)?;
        let mut nodes = self.nodes.lock();
        let parent_ok = parent_of(path)
            .map(|p| matches!(nodes.get(&p), Some(Node::Dir)))
            .unwrap_or(false);
        if !parent_ok {
            return Err(Self::not_found(path));
        }
        if matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(SftpError::remote(path, RemoteErrorCode::Failure, "Failure"));
        }
        nodes.insert(path.to_string(), Node::File(Vec::new()));
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.record(Op::RemoveFile, path)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::File(_)) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(SftpError::remote(path, RemoteErrorCode::Failure, "Failure")),
            None => Err(Self::not_found(path)),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.record(Op::RemoveDir, path)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(Node::Dir) => {
                if !Self::children(&nodes, path).is_empty() {
                    return Err(SftpError::remote(
                        path,
                        RemoteErrorCode::Failure,
                        "Directory not empty",
                    ));
                }
                nodes.remove(path);
                Ok(())
            }
            Some(Node::File(_)) => Err(SftpError::remote(path, RemoteErrorCode::Failure, "Failure")),
            None => Err(Self::not_found(path)),
        }
    }

    async fn read_to_local(&self, remote_path: &str, local_path: &str) -> Result<u64, SftpError> {
        self.record(Op::Read, remote_path)?;
        let data = match self.nodes.lock().get(remote_path) {
            Some(Node::File(data)) => data.clone(),
            Some(Node::Dir) => {
                return Err(SftpError::remote(remote_path, RemoteErrorCode::Failure, "Failure"))
            }
            None => return Err(Self::not_found(remote_path)),
        };
        tokio::fs::write(local_path, &data)
            .await
            .map_err(|e| SftpError::local(local_path, e))?;
        Ok(data.len() as u64)
    }

    async fn write_from_local(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<u64, SftpError> {
        self.record(Op::Write, remote_path)?;
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| SftpError::local(local_path, e))?;

        let mut nodes = self.nodes.lock();
        let parent_ok = parent_of(remote_path)
            .map(|p| matches!(nodes.get(&p), Some(Node::Dir)))
            .unwrap_or(false);
        if !parent_ok {
            return Err(Self::not_found(remote_path));
        }
        if matches!(nodes.get(remote_path), Some(Node::Dir)) {
            return Err(SftpError::remote(remote_path, RemoteErrorCode::Failure, "Failure"));
        }
        let size = data.len() as u64;
        nodes.insert(remote_path.to_string(), Node::File(data));
        Ok(size)
    }
}
