//! WebDAV server exposing a remote host's filesystem over SFTP.
//!
//! This crate bridges one SSH-reachable host into the `DavFileSystem`
//! interface of the `dav-server` crate, so any WebDAV client can browse and
//! edit the remote home directory.
//!
//! # How It Works
//!
//! 1. A [`RemoteSession`] dials the host with russh, authenticates with a
//!    password or a private key, resolves the login directory with
//!    `echo $PWD`, and opens an SFTP subsystem channel
//! 2. [`SftpWebDav`] translates WebDAV paths into absolute remote paths
//!    below that directory and maps filesystem calls onto SFTP requests
//! 3. Directory listings are cached per remote directory so that the
//!    PROPFIND-then-stat pattern of WebDAV clients costs one round-trip
//!    per directory instead of one per entry
//!
//! # Example
//!
//! ```ignore
//! use sftpdav::{ConnectOptions, RemoteSession, ServerConfig, SftpWebDav, WebDavServer};
//!
//! let options = ConnectOptions::new("alice@files.example.com")?;
//! let session = RemoteSession::connect(options).await?;
//! let server = WebDavServer::start(SftpWebDav::new(session), ServerConfig::default()).await?;
//!
//! println!("Mount via: {}", server.url());
//! ```
//!
//! # Caching
//!
//! The directory cache is never invalidated by writes made through this
//! server. A listing fetched before MKCOL, DELETE or MOVE keeps answering
//! metadata queries until the directory is listed again.

mod cache;
mod credentials;
mod descriptor;
mod dir_entry;
mod error;
mod file;
mod filesystem;
mod metadata;
mod path;
mod remote;
mod server;
mod session;

/// In-memory remote used by the test suites.
pub mod testing;

// Public exports
pub use cache::{CacheEntry, CacheStats, DirCache};
pub use credentials::{discover_private_key, Auth, Credentials};
pub use descriptor::{ConnectionDescriptor, DEFAULT_SSH_PORT};
pub use error::{AdaptorError, ProtocolError, SessionError};
pub use file::ListingHandle;
pub use filesystem::{AdaptorOptions, SftpWebDav, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
pub use metadata::RemoteMetadata;
pub use path::{base_name, parent_of, resolve, self_key};
pub use remote::{OpenFlags, RemoteFs, SftpClient};
pub use server::{ServerConfig, WebDavServer, DEFAULT_PORT};
pub use session::{ConnectOptions, RemoteSession};
