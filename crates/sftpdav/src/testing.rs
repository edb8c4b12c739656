//! In-memory remote for tests.
//!
//! [`MemoryRemote`] keeps a POSIX-like tree in memory and records every
//! call it receives, so tests can assert how many round-trips an operation
//! cost without a live SSH server.

use crate::error::ProtocolError;
use crate::metadata::RemoteMetadata;
use crate::path::{base_name, parent_of};
use crate::remote::{OpenFlags, RemoteFs};
use parking_lot::Mutex;
use russh_sftp::protocol::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

/// Link hops followed before giving up, like `ELOOP`.
const MAX_LINK_HOPS: usize = 8;

/// Kind of remote call, for call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `open`
    Open,
    /// `read_dir`
    ReadDir,
    /// `lstat`
    Lstat,
    /// `stat`
    Stat,
    /// `remove`
    Remove,
    /// `rename`
    Rename,
    /// `mkdir`
    Mkdir,
    /// `chmod`
    Chmod,
    /// Reads through an open file; never recorded, only failed on request
    Read,
    /// Writes through an open file; never recorded, only failed on request
    Write,
}

#[derive(Debug, Clone)]
struct Node {
    mode: u32,
    data: Vec<u8>,
    modified: SystemTime,
    link: Option<String>,
}

impl Node {
    fn is_dir(&self) -> bool {
        self.mode & 0o170_000 == S_IFDIR
    }

    fn metadata(&self, path: &str) -> RemoteMetadata {
        RemoteMetadata {
            name: base_name(path).to_string(),
            size: if self.is_dir() { 0 } else { self.data.len() as u64 },
            mode: self.mode,
            modified: self.modified,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    calls: Vec<(RemoteOp, String)>,
    failing: HashMap<RemoteOp, StatusCode>,
}

/// In-memory [`RemoteFs`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
}

impl MemoryRemote {
    /// Create a remote containing only `/`.
    pub fn new() -> Self {
        let remote = Self::default();
        remote.insert("/", S_IFDIR | 0o755, Vec::new());
        remote
    }

    /// Create a directory and any missing parents, without recording calls.
    #[must_use]
    pub fn with_dir(self, path: &str) -> Self {
        let mut missing = Vec::new();
        let mut current = path.to_string();
        while current != "/" && !self.state.lock().nodes.contains_key(&current) {
            missing.push(current.clone());
            current = parent_of(&current);
        }
        for dir in missing.into_iter().rev() {
            self.insert(&dir, S_IFDIR | 0o755, Vec::new());
        }
        self
    }

    /// Create a file (and its parent directories), without recording calls.
    #[must_use]
    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        let remote = self.with_dir(&parent_of(path));
        remote.insert(path, S_IFREG | 0o644, content.to_vec());
        remote
    }

    /// Create a symbolic link at `path` pointing to the absolute `target`.
    #[must_use]
    pub fn with_symlink(self, path: &str, target: &str) -> Self {
        let remote = self.with_dir(&parent_of(path));
        remote.state.lock().nodes.insert(
            path.to_string(),
            Node {
                mode: S_IFLNK | 0o777,
                data: Vec::new(),
                modified: SystemTime::now(),
                link: Some(target.to_string()),
            },
        );
        remote
    }

    fn insert(&self, path: &str, mode: u32, data: Vec<u8>) {
        self.state.lock().nodes.insert(
            path.to_string(),
            Node {
                mode,
                data,
                modified: SystemTime::now(),
                link: None,
            },
        );
    }

    /// Make every later call of `op` fail with a generic failure status.
    pub fn fail(&self, op: RemoteOp) {
        self.state.lock().failing.insert(op, StatusCode::Failure);
    }

    /// Make every later call of `op` fail with a permission-denied status.
    pub fn deny(&self, op: RemoteOp) {
        self.state.lock().failing.insert(op, StatusCode::PermissionDenied);
    }

    /// Number of calls of `op` received so far.
    pub fn count(&self, op: RemoteOp) -> usize {
        self.state.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Total number of calls received so far.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Every call received so far, with the path(s) it named.
    pub fn calls(&self) -> Vec<(RemoteOp, String)> {
        self.state.lock().calls.clone()
    }

    /// Current content of a file, bypassing call accounting.
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .nodes
            .get(path)
            .filter(|n| !n.is_dir())
            .map(|n| n.data.clone())
    }

    /// Whether `path` exists, bypassing call accounting.
    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(path)
    }

    /// Mode of `path`, bypassing call accounting.
    pub fn mode(&self, path: &str) -> Option<u32> {
        self.state.lock().nodes.get(path).map(|n| n.mode)
    }

    fn record(&self, op: RemoteOp, path: &str) -> Result<(), ProtocolError> {
        let mut state = self.state.lock();
        state.calls.push((op, path.to_string()));
        if let Some(code) = state.failing.get(&op) {
            return Err(ProtocolError::status(code.clone(), format!("{code:?}")));
        }
        Ok(())
    }

    /// Follow symbolic links from `path` to the node they end at.
    fn follow(state: &State, path: &str) -> Option<String> {
        let mut current = path.to_string();
        for _ in 0..MAX_LINK_HOPS {
            match &state.nodes.get(&current)?.link {
                Some(target) => current.clone_from(target),
                None => return Some(current),
            }
        }
        None
    }

    fn no_such_file(path: &str) -> ProtocolError {
        ProtocolError::status(StatusCode::NoSuchFile, format!("No such file: {path}"))
    }

    fn failure(message: impl Into<String>) -> ProtocolError {
        ProtocolError::status(StatusCode::Failure, message)
    }

    fn parent_is_dir(state: &State, path: &str) -> bool {
        state
            .nodes
            .get(&parent_of(path))
            .is_some_and(Node::is_dir)
    }
}

impl RemoteFs for MemoryRemote {
    type File = MemoryFile;

    async fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Self::File, ProtocolError> {
        self.record(RemoteOp::Open, path)?;
        let mut state = self.state.lock();

        let exists = state.nodes.contains_key(path);
        if exists && flags.contains(OpenFlags::EXCLUDE) {
            return Err(Self::failure(format!("File exists: {path}")));
        }
        if !exists {
            if !flags.contains(OpenFlags::CREATE) {
                return Err(Self::no_such_file(path));
            }
            if !Self::parent_is_dir(&state, path) {
                return Err(Self::no_such_file(path));
            }
            state.nodes.insert(
                path.to_string(),
                Node {
                    mode: S_IFREG | (mode & 0o7777),
                    data: Vec::new(),
                    modified: SystemTime::now(),
                    link: None,
                },
            );
        }

        let Some(node) = state.nodes.get_mut(path) else {
            return Err(Self::no_such_file(path));
        };
        if flags.contains(OpenFlags::TRUNCATE) && !node.is_dir() {
            node.data.clear();
        }
        let mut cursor = Cursor::new(node.data.clone());
        if flags.contains(OpenFlags::APPEND) {
            cursor.set_position(node.data.len() as u64);
        }

        Ok(MemoryFile {
            cursor,
            path: path.to_string(),
            dirty: false,
            state: Arc::clone(&self.state),
        })
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteMetadata>, ProtocolError> {
        self.record(RemoteOp::ReadDir, path)?;
        let state = self.state.lock();
        let dir = Self::follow(&state, path).ok_or_else(|| Self::no_such_file(path))?;
        match state.nodes.get(&dir) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(Self::failure(format!("Not a directory: {path}"))),
            None => return Err(Self::no_such_file(path)),
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && parent_of(p) == dir)
            .map(|(p, node)| node.metadata(p))
            .collect())
    }

    async fn lstat(&self, path: &str) -> Result<RemoteMetadata, ProtocolError> {
        self.record(RemoteOp::Lstat, path)?;
        let state = self.state.lock();
        state
            .nodes
            .get(path)
            .map(|node| node.metadata(path))
            .ok_or_else(|| Self::no_such_file(path))
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, ProtocolError> {
        self.record(RemoteOp::Stat, path)?;
        let state = self.state.lock();
        Self::follow(&state, path)
            .and_then(|target| state.nodes.get(&target))
            .map(|node| node.metadata(path))
            .ok_or_else(|| Self::no_such_file(path))
    }

    async fn remove(&self, path: &str) -> Result<(), ProtocolError> {
        self.record(RemoteOp::Remove, path)?;
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get(path) else {
            return Err(Self::no_such_file(path));
        };
        if node.is_dir() {
            let has_children = state
                .nodes
                .keys()
                .any(|p| p.as_str() != "/" && parent_of(p) == path);
            if has_children || path == "/" {
                return Err(Self::failure(format!("Directory not empty: {path}")));
            }
        }
        state.nodes.remove(path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ProtocolError> {
        self.record(RemoteOp::Rename, &format!("{from} -> {to}"))?;
        let mut state = self.state.lock();
        if !state.nodes.contains_key(from) {
            return Err(Self::no_such_file(from));
        }
        if state.nodes.contains_key(to) || !Self::parent_is_dir(&state, to) {
            return Err(Self::failure(format!("Cannot rename {from} to {to}")));
        }

        let prefix = format!("{}/", from.trim_end_matches('/'));
        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|p| p.as_str() == from || p.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = state.nodes.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                state.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<(), ProtocolError> {
        self.record(RemoteOp::Mkdir, path)?;
        let mut state = self.state.lock();
        if state.nodes.contains_key(path) {
            return Err(Self::failure(format!("File exists: {path}")));
        }
        if !Self::parent_is_dir(&state, path) {
            return Err(Self::no_such_file(path));
        }
        state.nodes.insert(
            path.to_string(),
            Node {
                mode: S_IFDIR | 0o777,
                data: Vec::new(),
                modified: SystemTime::now(),
                link: None,
            },
        );
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), ProtocolError> {
        self.record(RemoteOp::Chmod, path)?;
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| Self::no_such_file(path))?;
        node.mode = (node.mode & 0o170_000) | (mode & 0o7777);
        Ok(())
    }
}

/// Open file of a [`MemoryRemote`].
///
/// Reads and writes go to a private buffer that is published back to the
/// tree on flush and on shutdown.
#[derive(Debug)]
pub struct MemoryFile {
    cursor: Cursor<Vec<u8>>,
    path: String,
    dirty: bool,
    state: Arc<Mutex<State>>,
}

impl MemoryFile {
    fn publish(&mut self) {
        if !self.dirty {
            return;
        }
        if let Some(node) = self.state.lock().nodes.get_mut(&self.path) {
            node.data = self.cursor.get_ref().clone();
            node.modified = SystemTime::now();
        }
        self.dirty = false;
    }

    /// The error an injected failure of `op` surfaces as through tokio IO.
    fn injected(&self, op: RemoteOp) -> Option<io::Error> {
        let state = self.state.lock();
        let code = state.failing.get(&op)?;
        let kind = match code {
            StatusCode::PermissionDenied => io::ErrorKind::PermissionDenied,
            StatusCode::NoSuchFile => io::ErrorKind::NotFound,
            _ => io::ErrorKind::Other,
        };
        Some(io::Error::new(kind, format!("{code:?}: {}", self.path)))
    }
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(e) = self.injected(RemoteOp::Read) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.cursor).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryFile {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(e) = self.injected(RemoteOp::Write) {
            return Poll::Ready(Err(e));
        }
        self.dirty = true;
        Pin::new(&mut self.cursor).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.publish();
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.publish();
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemoryFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.cursor).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.cursor).poll_complete(cx)
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listing_is_sorted_and_direct_children_only() {
        let remote = MemoryRemote::new()
            .with_file("/root/b.txt", b"b")
            .with_file("/root/a.txt", b"a")
            .with_file("/root/sub/c.txt", b"c");

        let listing = remote.read_dir("/root").await.unwrap();
        let names: Vec<_> = listing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(remote.count(RemoteOp::ReadDir), 1);
    }

    #[tokio::test]
    async fn test_write_is_published_on_flush() {
        let remote = MemoryRemote::new().with_dir("/root");
        let mut file = remote
            .open("/root/new.txt", OpenFlags::WRITE | OpenFlags::CREATE, 0o600)
            .await
            .unwrap();
        file.write_all(b"hello").await.unwrap();
        file.flush().await.unwrap();

        assert_eq!(remote.content("/root/new.txt").unwrap(), b"hello");
        assert_eq!(remote.mode("/root/new.txt"), Some(S_IFREG | 0o600));

        let mut file = remote.open("/root/new.txt", OpenFlags::READ, 0).await.unwrap();
        let mut back = String::new();
        file.read_to_string(&mut back).await.unwrap();
        assert_eq!(back, "hello");
    }

    #[tokio::test]
    async fn test_remove_refuses_non_empty_directory() {
        let remote = MemoryRemote::new().with_file("/root/dir/x", b"x");
        assert!(remote.remove("/root/dir").await.is_err());
        remote.remove("/root/dir/x").await.unwrap();
        remote.remove("/root/dir").await.unwrap();
        assert!(!remote.exists("/root/dir"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let remote = MemoryRemote::new();
        remote.fail(RemoteOp::Mkdir);
        assert!(remote.mkdir("/x").await.is_err());
        assert_eq!(remote.count(RemoteOp::Mkdir), 1);
    }

    #[tokio::test]
    async fn test_injected_write_failure_is_permission_denied() {
        let remote = MemoryRemote::new().with_dir("/root");
        remote.deny(RemoteOp::Write);
        let mut file = remote
            .open("/root/new.txt", OpenFlags::WRITE | OpenFlags::CREATE, 0o644)
            .await
            .unwrap();
        let err = file.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_stat_follows_links_and_lstat_does_not() {
        let remote = MemoryRemote::new()
            .with_file("/data/alice/notes.txt", b"n")
            .with_symlink("/home/alice", "/data/alice");

        let followed = remote.stat("/home/alice").await.unwrap();
        assert!(followed.is_directory());
        assert_eq!(followed.name, "alice");

        let link = remote.lstat("/home/alice").await.unwrap();
        assert!(!link.is_directory());

        let listing = remote.read_dir("/home/alice").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "notes.txt");
    }
}
