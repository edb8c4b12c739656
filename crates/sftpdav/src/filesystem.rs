//! WebDAV filesystem implementation over a remote session.
//!
//! This module provides the `DavFileSystem` trait implementation that maps
//! WebDAV paths below the remote home directory onto SFTP calls, answering
//! metadata queries from cached directory listings where it can.

use crate::cache::CacheEntry;
use crate::dir_entry::RemoteDirEntry;
use crate::error::{AdaptorError, AdaptorResult};
use crate::file::ListingHandle;
use crate::metadata::RemoteMetadata;
use crate::path::{base_name, normalize_virtual, parent_of, self_key};
use crate::remote::{OpenFlags, RemoteFs, SftpClient};
use crate::session::RemoteSession;
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsFuture, FsStream, OpenOptions,
    ReadDirMeta,
};
use futures::stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Permission bits applied to directories created through WebDAV.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Permission bits applied to files created through WebDAV.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Permission bits used for entries created by WebDAV clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptorOptions {
    /// Mode for MKCOL.
    pub dir_mode: u32,
    /// Mode for files created by PUT.
    pub file_mode: u32,
}

impl Default for AdaptorOptions {
    fn default() -> Self {
        Self {
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

/// WebDAV filesystem backed by one remote session.
///
/// Every operation joins its path onto the session's home directory before
/// any remote call is made. Metadata is served from the session's
/// directory cache:
///
/// - the served root is stat'ed directly and cached under a key of its own
/// - any other path is looked up in the cached listing of its parent, which
///   is fetched with one listing call when absent
///
/// Writes never touch the cache. A listing stays authoritative until the
/// directory is listed again through [`ListingHandle::read_dir`].
pub struct SftpWebDav<R: RemoteFs = SftpClient> {
    /// Shared session (thread-safe via Arc).
    session: Arc<RemoteSession<R>>,
    /// Modes for newly created entries.
    options: AdaptorOptions,
}

impl<R: RemoteFs> Clone for SftpWebDav<R> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            options: self.options,
        }
    }
}

impl<R: RemoteFs> std::fmt::Debug for SftpWebDav<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpWebDav")
            .field("session", &self.session)
            .field("options", &self.options)
            .finish()
    }
}

impl<R: RemoteFs> SftpWebDav<R> {
    /// Create a filesystem with the default creation modes.
    pub fn new(session: RemoteSession<R>) -> Self {
        Self::with_options(session, AdaptorOptions::default())
    }

    /// Create a filesystem with explicit creation modes.
    pub fn with_options(session: RemoteSession<R>, options: AdaptorOptions) -> Self {
        Self {
            session: Arc::new(session),
            options,
        }
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<RemoteSession<R>> {
        &self.session
    }

    /// Creation modes in effect.
    pub fn options(&self) -> AdaptorOptions {
        self.options
    }

    /// Parse a WebDAV path to a normalized virtual path.
    fn parse_path(path: &DavPath) -> String {
        let raw = String::from_utf8_lossy(path.as_bytes());
        let normalized = normalize_virtual(&raw);
        trace!(raw_path = %raw, normalized = %normalized, "parse_path");
        normalized
    }

    /// Absolute remote path a WebDAV path refers to.
    pub fn remote_path(&self, path: &DavPath) -> String {
        self.session.resolve(&Self::parse_path(path))
    }

    /// Metadata for a virtual path.
    ///
    /// Issues at most one remote call: an attribute call for the served
    /// root on a cold cache, or a listing of the parent directory when that
    /// directory is not cached yet. A name missing from a cached listing is
    /// [`AdaptorError::NotFound`] without any remote call.
    pub async fn stat(&self, name: &str) -> AdaptorResult<RemoteMetadata> {
        let resolved = self.session.resolve(name);
        let dir = parent_of(&resolved);

        if normalize_virtual(name) == "/" {
            return self.stat_root(&resolved, &dir).await;
        }

        if let Some(meta) = self.lookup(&dir, &resolved)? {
            return Ok(meta);
        }

        debug!(dir = %dir, "Listing parent directory for stat");
        let listing = self.session.client().read_dir(&dir).await?;
        self.session.cache().put_listing(dir.clone(), listing);

        // Second and last pass; the listing was just stored
        self.lookup(&dir, &resolved)?
            .ok_or(AdaptorError::NotFound(resolved))
    }

    /// The home directory may itself be a link, so the attributes call
    /// follows links.
    async fn stat_root(&self, resolved: &str, dir: &str) -> AdaptorResult<RemoteMetadata> {
        let key = self_key(dir);
        if let Some(CacheEntry::Single(meta)) = self.session.cache().get(&key) {
            return Ok(meta);
        }

        let meta = self.session.client().stat(resolved).await?;
        self.session.cache().put(key, CacheEntry::Single(meta.clone()));
        Ok(meta)
    }

    /// Find `resolved` in the cached listing of `dir`.
    ///
    /// `Ok(None)` means `dir` is not cached at all.
    fn lookup(&self, dir: &str, resolved: &str) -> AdaptorResult<Option<RemoteMetadata>> {
        let Some(entry) = self.session.cache().get(dir) else {
            return Ok(None);
        };
        match entry.find(base_name(resolved)) {
            Some(meta) => Ok(Some(meta.clone())),
            None => Err(AdaptorError::NotFound(resolved.to_string())),
        }
    }

    /// Create a directory, then set its permission bits to `mode`.
    ///
    /// Not atomic: when setting the mode fails the directory stays behind
    /// and only that second error is reported.
    pub async fn mkdir(&self, name: &str, mode: u32) -> AdaptorResult<()> {
        let resolved = self.session.resolve(name);
        let client = self.session.client();
        client.mkdir(&resolved).await?;
        client.chmod(&resolved, mode).await?;
        Ok(())
    }

    /// Open a remote file; `mode` applies only when the file is created.
    pub async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> AdaptorResult<ListingHandle<R>> {
        let resolved = self.session.resolve(name);
        let file = self.session.client().open(&resolved, flags, mode).await?;
        Ok(ListingHandle::new(file, Arc::clone(&self.session), resolved))
    }

    /// Remove a file or an empty directory with one remote remove call.
    ///
    /// Directory contents are not removed first; a non-empty directory
    /// makes the remote call fail.
    pub async fn remove_all(&self, name: &str) -> AdaptorResult<()> {
        let resolved = self.session.resolve(name);
        self.session.client().remove(&resolved).await?;
        Ok(())
    }

    /// Rename `old` to `new`, both resolved against the home directory.
    pub async fn rename(&self, old: &str, new: &str) -> AdaptorResult<()> {
        let from = self.session.resolve(old);
        let to = self.session.resolve(new);
        self.session.client().rename(&from, &to).await?;
        Ok(())
    }
}

/// Map dav-server open options onto SFTP open flags.
///
/// The mode of a created file is never encoded here; it travels in the
/// permissions attribute of the open request.
pub(crate) fn open_flags(options: &OpenOptions) -> OpenFlags {
    let mut flags = OpenFlags::empty();
    if options.read {
        flags |= OpenFlags::READ;
    }
    if options.write || options.append {
        flags |= OpenFlags::WRITE;
    }
    if options.append {
        flags |= OpenFlags::APPEND;
    }
    if options.truncate {
        flags |= OpenFlags::TRUNCATE;
    }
    if options.create {
        flags |= OpenFlags::CREATE;
    }
    if options.create_new {
        flags |= OpenFlags::CREATE | OpenFlags::EXCLUDE;
    }
    if flags.is_empty() {
        flags = OpenFlags::READ;
    }
    flags
}

impl<R: RemoteFs> DavFileSystem for SftpWebDav<R> {
    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn open<'a>(
        &'a self,
        path: &'a DavPath,
        options: OpenOptions,
    ) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            let flags = open_flags(&options);
            debug!(name = %name, ?flags, "Opening file");

            let handle = self.open_file(&name, flags, self.options.file_mode).await?;
            Ok(Box::new(handle) as Box<dyn DavFile>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            debug!(name = %name, "Reading directory");

            let handle = self.open_file(&name, OpenFlags::READ, 0).await?;
            let listing = handle.read_dir(0).await?;
            trace!(count = listing.len(), "Directory entries found");

            let entries: Vec<Box<dyn DavDirEntry>> = listing
                .into_iter()
                .map(|meta| Box::new(RemoteDirEntry::new(meta)) as Box<dyn DavDirEntry>)
                .collect();
            Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))) as FsStream<_>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let meta = self.stat(&Self::parse_path(path)).await?;
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        })
    }

    fn symlink_metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        self.metadata(path)
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            debug!(name = %name, "Creating directory");
            Ok(self.mkdir(&name, self.options.dir_mode).await?)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            debug!(name = %name, "Removing directory");
            Ok(self.remove_all(&name).await?)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            debug!(name = %name, "Removing file");
            Ok(self.remove_all(&name).await?)
        })
    }

    #[instrument(
        level = "debug",
        skip(self),
        fields(from = %from.as_url_string(), to = %to.as_url_string())
    )]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from = Self::parse_path(from);
            let to = Self::parse_path(to);
            debug!(from = %from, to = %to, "Renaming");
            Ok(self.rename(&from, &to).await?)
        })
    }

    fn have_props<'a>(
        &'a self,
        _path: &'a DavPath,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async { false })
    }
}
