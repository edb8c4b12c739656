//! WebDAV file handle implementation.
//!
//! A [`ListingHandle`] wraps one open remote file. Besides the byte-level
//! operations dav-server needs, it can list the directory it was opened on;
//! every such listing replaces the cache entry for that directory.

use crate::error::{AdaptorResult, ProtocolError};
use crate::metadata::RemoteMetadata;
use crate::remote::{RemoteFs, SftpClient};
use crate::session::RemoteSession;
use bytes::{Buf, Bytes};
use dav_server::fs::{DavFile, DavMetaData, FsError, FsFuture};
use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// An open remote file, remembering the path it was opened against.
pub struct ListingHandle<R: RemoteFs = SftpClient> {
    /// The remote file (wrapped in Mutex for interior mutability).
    file: Mutex<R::File>,
    /// Session the file was opened through.
    session: Arc<RemoteSession<R>>,
    /// Absolute remote path; also the cache key refreshed by `read_dir`.
    path: String,
}

impl<R: RemoteFs> ListingHandle<R> {
    /// Wrap an open remote file.
    pub fn new(file: R::File, session: Arc<RemoteSession<R>>, path: impl Into<String>) -> Self {
        Self {
            file: Mutex::new(file),
            session,
            path: path.into(),
        }
    }

    /// Absolute remote path this handle was opened against.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// List the directory this handle was opened against.
    ///
    /// The full listing replaces the cache entry for the directory. At most
    /// `count` entries are returned when `count` is positive; otherwise all
    /// of them are.
    pub async fn read_dir(&self, count: usize) -> AdaptorResult<Vec<RemoteMetadata>> {
        let listing = self.session.client().read_dir(&self.path).await?;
        debug!(path = %self.path, entries = listing.len(), "Refreshing cached listing");

        let returned = if count > 0 && count < listing.len() {
            listing[..count].to_vec()
        } else {
            listing.clone()
        };
        self.session.cache().put_listing(self.path.clone(), listing);
        Ok(returned)
    }
}

/// Remote failures surface through tokio IO as `io::Error`; keep their kind.
fn io_to_fs_error(e: io::Error) -> FsError {
    ProtocolError::from(e).to_fs_error()
}

impl<R: RemoteFs> fmt::Debug for ListingHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<R: RemoteFs> DavFile for ListingHandle<R> {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let meta = self.session.client().stat(&self.path).await?;
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        Box::pin(async move {
            let mut file = self.file.lock().await;
            let mut buf = vec![0u8; count];
            let mut filled = 0;
            // Short reads are legal mid-file; keep going until EOF or full
            while filled < count {
                let n = file
                    .read(&mut buf[filled..])
                    .await
                    .map_err(io_to_fs_error)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            trace!(path = %self.path, requested = count, read = filled, "read_bytes");
            Ok(Bytes::from(buf))
        })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let mut file = self.file.lock().await;
            file.write_all(&buf)
                .await
                .map_err(io_to_fs_error)?;
            trace!(path = %self.path, len = buf.len(), "write_bytes");
            Ok(())
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let bytes = buf.copy_to_bytes(buf.remaining());
            self.write_bytes(bytes).await
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async move {
            let mut file = self.file.lock().await;
            file.seek(pos).await.map_err(io_to_fs_error)
        })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let mut file = self.file.lock().await;
            file.flush().await.map_err(io_to_fs_error)
        })
    }
}
