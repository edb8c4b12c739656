//! WebDAV directory entry for listing results.

use crate::metadata::RemoteMetadata;
use dav_server::fs::{DavDirEntry, DavMetaData, FsFuture};

/// One entry of a remote directory listing.
#[derive(Debug, Clone)]
pub struct RemoteDirEntry(RemoteMetadata);

impl RemoteDirEntry {
    /// Wrap listing metadata.
    pub fn new(meta: RemoteMetadata) -> Self {
        Self(meta)
    }
}

impl DavDirEntry for RemoteDirEntry {
    fn name(&self) -> Vec<u8> {
        self.0.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.0.clone();
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }

    fn is_dir(&self) -> FsFuture<'_, bool> {
        let is_dir = self.0.is_directory();
        Box::pin(async move { Ok(is_dir) })
    }

    fn is_file(&self) -> FsFuture<'_, bool> {
        let is_file = !self.0.is_directory();
        Box::pin(async move { Ok(is_file) })
    }

    fn is_symlink(&self) -> FsFuture<'_, bool> {
        Box::pin(async { Ok(false) })
    }
}
