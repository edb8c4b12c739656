//! WebDAV metadata implementation for remote entries.
//!
//! SFTP reports the full `st_mode` in the permissions attribute, so the
//! entry type is derived from the type bits rather than tracked separately.

use dav_server::fs::{DavMetaData, FsError};
use russh_sftp::protocol::FileAttributes;
use std::time::{Duration, SystemTime};

/// Mask selecting the file type bits of a POSIX mode.
const S_IFMT: u32 = 0o170_000;
/// Directory type bits.
const S_IFDIR: u32 = 0o040_000;
/// Symbolic link type bits.
const S_IFLNK: u32 = 0o120_000;
/// Regular file type bits.
const S_IFREG: u32 = 0o100_000;

/// Metadata for one remote entry, as reported by a listing or a stat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Entry name, unique within its listing.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Permission and type bits (`st_mode`).
    pub mode: u32,
    /// Modification time.
    pub modified: SystemTime,
}

impl RemoteMetadata {
    /// Build metadata from SFTP attributes.
    ///
    /// Missing attributes fall back to zero size, zero mode and the Unix
    /// epoch, matching what a server that omits them would imply.
    pub fn from_attributes(name: impl Into<String>, attrs: &FileAttributes) -> Self {
        let modified = attrs
            .mtime
            .map_or(SystemTime::UNIX_EPOCH, |secs| {
                SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(secs))
            });

        Self {
            name: name.into(),
            size: attrs.size.unwrap_or(0),
            mode: attrs.permissions.unwrap_or(0),
            modified,
        }
    }

    /// Metadata for a regular file.
    pub fn file(name: impl Into<String>, size: u64, perm: u32) -> Self {
        Self {
            name: name.into(),
            size,
            mode: S_IFREG | (perm & 0o7777),
            modified: SystemTime::now(),
        }
    }

    /// Metadata for a directory.
    pub fn directory(name: impl Into<String>, perm: u32) -> Self {
        Self {
            name: name.into(),
            size: 0,
            mode: S_IFDIR | (perm & 0o7777),
            modified: SystemTime::now(),
        }
    }

    /// Whether the type bits denote a directory.
    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Whether the type bits denote a symbolic link.
    pub fn is_link(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Permission bits without the type.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

impl DavMetaData for RemoteMetadata {
    fn len(&self) -> u64 {
        if self.is_directory() { 0 } else { self.size }
    }

    fn modified(&self) -> Result<SystemTime, FsError> {
        Ok(self.modified)
    }

    fn is_dir(&self) -> bool {
        self.is_directory()
    }

    fn is_file(&self) -> bool {
        !self.is_directory()
    }

    fn is_symlink(&self) -> bool {
        // WebDAV has no symlinks; links are served as plain entries
        false
    }

    fn executable(&self) -> Result<bool, FsError> {
        Ok(!self.is_directory() && self.mode & 0o111 != 0)
    }
}
