//! Remote filesystem protocol seam.
//!
//! [`RemoteFs`] is the set of remote calls the adaptor needs. The production
//! implementation is [`SftpClient`]; tests use
//! [`MemoryRemote`](crate::testing::MemoryRemote).

use crate::error::ProtocolError;
use crate::metadata::RemoteMetadata;
use crate::path::base_name;
use futures::TryFutureExt;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};
use tracing::{debug, trace};

pub use russh_sftp::protocol::OpenFlags;

/// Remote file operations over one authenticated session.
///
/// Implementations must accept concurrent calls from many tasks.
pub trait RemoteFs: Send + Sync + 'static {
    /// An open remote file.
    type File: AsyncRead + AsyncWrite + AsyncSeek + Unpin + Send + 'static;

    /// Open `path` with `flags`; `mode` is applied when the file is created.
    fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> impl Future<Output = Result<Self::File, ProtocolError>> + Send;

    /// List the immediate children of `path`, without `.` and `..`.
    fn read_dir(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<RemoteMetadata>, ProtocolError>> + Send;

    /// Attributes of `path` itself (links are not followed).
    fn lstat(&self, path: &str)
        -> impl Future<Output = Result<RemoteMetadata, ProtocolError>> + Send;

    /// Attributes of `path`, following links.
    fn stat(&self, path: &str)
        -> impl Future<Output = Result<RemoteMetadata, ProtocolError>> + Send;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Rename `from` to `to`.
    fn rename(&self, from: &str, to: &str)
        -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Create a directory.
    fn mkdir(&self, path: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Set the permission bits of `path`.
    fn chmod(&self, path: &str, mode: u32)
        -> impl Future<Output = Result<(), ProtocolError>> + Send;
}

/// Attributes sent with an OPEN request.
///
/// The mode only ever travels as permissions, and only when the request
/// may create the file.
pub(crate) fn open_attributes(flags: OpenFlags, mode: u32) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    if flags.contains(OpenFlags::CREATE) {
        attrs.permissions = Some(mode);
    }
    attrs
}

/// Run REMOVE, then RMDIR when REMOVE refused a path that exists.
///
/// REMOVE refuses directories and RMDIR only takes empty ones. When both
/// fail the REMOVE error is reported.
pub(crate) async fn remove_with_fallback<F, D, DF>(
    path: &str,
    remove_file: F,
    remove_dir: D,
) -> Result<(), ProtocolError>
where
    F: Future<Output = Result<(), ProtocolError>>,
    D: FnOnce() -> DF,
    DF: Future<Output = Result<(), ProtocolError>>,
{
    let file_err = match remove_file.await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if file_err.is_not_found() {
        return Err(file_err);
    }
    match remove_dir().await {
        Ok(()) => Ok(()),
        Err(dir_err) => {
            debug!(path = %path, error = %dir_err, "rmdir fallback failed");
            Err(file_err)
        }
    }
}

/// [`RemoteFs`] over an SFTP subsystem channel.
///
/// russh-sftp tags every request with an id, so calls from many tasks are
/// interleaved on the one channel rather than serialized.
pub struct SftpClient {
    sftp: SftpSession,
}

impl SftpClient {
    /// Wrap an established SFTP session.
    pub fn new(sftp: SftpSession) -> Self {
        Self { sftp }
    }
}

impl std::fmt::Debug for SftpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpClient").finish_non_exhaustive()
    }
}

impl RemoteFs for SftpClient {
    type File = russh_sftp::client::fs::File;

    async fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Self::File, ProtocolError> {
        trace!(path = %path, ?flags, mode = %format!("{mode:o}"), "sftp open");
        Ok(self
            .sftp
            .open_with_flags_and_attributes(path, flags, open_attributes(flags, mode))
            .await?)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteMetadata>, ProtocolError> {
        trace!(path = %path, "sftp readdir");
        let entries = self.sftp.read_dir(path).await?;
        let listing: Vec<RemoteMetadata> = entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| RemoteMetadata::from_attributes(entry.file_name(), &entry.metadata()))
            .collect();
        debug!(path = %path, count = listing.len(), "Listed remote directory");
        Ok(listing)
    }

    async fn lstat(&self, path: &str) -> Result<RemoteMetadata, ProtocolError> {
        trace!(path = %path, "sftp lstat");
        let attrs = self.sftp.symlink_metadata(path).await?;
        Ok(RemoteMetadata::from_attributes(base_name(path), &attrs))
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, ProtocolError> {
        trace!(path = %path, "sftp stat");
        let attrs = self.sftp.metadata(path).await?;
        Ok(RemoteMetadata::from_attributes(base_name(path), &attrs))
    }

    async fn remove(&self, path: &str) -> Result<(), ProtocolError> {
        trace!(path = %path, "sftp remove");
        remove_with_fallback(
            path,
            self.sftp.remove_file(path).map_err(ProtocolError::from),
            || self.sftp.remove_dir(path).map_err(ProtocolError::from),
        )
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ProtocolError> {
        trace!(from = %from, to = %to, "sftp rename");
        Ok(self.sftp.rename(from, to).await?)
    }

    async fn mkdir(&self, path: &str) -> Result<(), ProtocolError> {
        trace!(path = %path, "sftp mkdir");
        Ok(self.sftp.create_dir(path).await?)
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), ProtocolError> {
        trace!(path = %path, mode = %format!("{mode:o}"), "sftp setstat");
        let mut attrs = FileAttributes::empty();
        attrs.permissions = Some(mode);
        Ok(self.sftp.set_metadata(path, attrs).await?)
    }
}
