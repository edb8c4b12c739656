//! Remote session establishment.
//!
//! A [`RemoteSession`] owns the SSH transport, the SFTP client running on
//! it, the home directory every virtual path is joined onto, and the
//! directory cache shared by all operations issued through the session.
//! Establishing it is all-or-nothing: any failure is returned to the caller
//! and nothing is retried.

use crate::cache::DirCache;
use crate::credentials::{Auth, Credentials};
use crate::descriptor::ConnectionDescriptor;
use crate::error::SessionError;
use crate::path;
use crate::remote::{RemoteFs, SftpClient};
use russh::client::{self, Handle};
use russh::keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Command whose output is the login directory.
const HOME_COMMAND: &str = "echo $PWD";

/// Everything needed to open a session.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Parsed connection descriptor.
    pub descriptor: ConnectionDescriptor,
    /// Explicit user, used when the descriptor names none.
    pub user: Option<String>,
    /// Explicit private key path.
    pub key: Option<PathBuf>,
    /// Explicit password, used when the descriptor carries none.
    pub password: Option<String>,
}

impl ConnectOptions {
    /// Parse `descriptor` and start with no explicit overrides.
    pub fn new(descriptor: &str) -> Result<Self, SessionError> {
        Ok(Self {
            descriptor: ConnectionDescriptor::parse(descriptor)?,
            user: None,
            key: None,
            password: None,
        })
    }

    /// Set the explicit user.
    #[must_use]
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Set the explicit private key path.
    #[must_use]
    pub fn with_key(mut self, key: Option<PathBuf>) -> Self {
        self.key = key;
        self
    }

    /// Set the explicit password.
    #[must_use]
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Resolve the credentials these options lead to.
    pub fn credentials(&self) -> Credentials {
        Credentials::resolve(
            &self.descriptor,
            self.user.as_deref(),
            self.key.as_deref(),
            self.password.as_deref(),
        )
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("descriptor", &self.descriptor)
            .field("user", &self.user)
            .field("key", &self.key)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// russh client handler.
pub struct SshHandler;

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not pinned; log the fingerprint so it can be checked
        warn!(
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "Accepting server key without verification"
        );
        Ok(true)
    }
}

/// One authenticated session to the remote host.
pub struct RemoteSession<R: RemoteFs = SftpClient> {
    /// SSH connection; `None` for sessions built around a test remote.
    transport: Mutex<Option<Handle<SshHandler>>>,
    /// Remote protocol client.
    client: R,
    /// Login directory on the remote host.
    home: String,
    /// Listings cache shared by every operation on this session.
    cache: DirCache,
}

impl RemoteSession<SftpClient> {
    /// Dial, authenticate, open the SFTP subsystem and resolve the home
    /// directory.
    #[instrument(level = "info", skip_all, fields(address = %options.descriptor.address))]
    pub async fn connect(options: ConnectOptions) -> Result<Self, SessionError> {
        let credentials = options.credentials();
        let auth = credentials.auth.clone().ok_or_else(|| {
            SessionError::Connection(format!(
                "no password given and no unique private key found for user '{}'",
                credentials.user
            ))
        })?;

        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, options.descriptor.address.as_str(), SshHandler)
            .await
            .map_err(|e| {
                SessionError::Connection(format!("dial {}: {e}", options.descriptor.address))
            })?;
        debug!("Transport established, authenticating");

        authenticate(&mut handle, &credentials.user, auth).await?;
        info!(user = %credentials.user, "Authenticated");

        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        debug!("SFTP subsystem ready");

        let output = run_command(&handle, HOME_COMMAND).await?;
        let home = parse_home(&output)?;
        info!(home = %home, "Resolved remote home directory");

        Ok(Self {
            transport: Mutex::new(Some(handle)),
            client: SftpClient::new(sftp),
            home,
            cache: DirCache::new(),
        })
    }
}

impl<R: RemoteFs> RemoteSession<R> {
    /// Build a session around an already connected client.
    pub fn from_parts(client: R, home: impl Into<String>) -> Self {
        Self {
            transport: Mutex::new(None),
            client,
            home: home.into(),
            cache: DirCache::new(),
        }
    }

    /// The remote protocol client.
    pub fn client(&self) -> &R {
        &self.client
    }

    /// The remote home directory.
    pub fn home(&self) -> &str {
        &self.home
    }

    /// The directory listing cache.
    pub fn cache(&self) -> &DirCache {
        &self.cache
    }

    /// Map a virtual path to its absolute remote path.
    pub fn resolve(&self, virtual_path: &str) -> String {
        path::resolve(&self.home, virtual_path)
    }

    /// Close the SSH connection, if there is one.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.transport.lock().await.take()
            && let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "Session closed", "en")
                .await
        {
            warn!(error = %e, "Failed to disconnect cleanly");
        }
    }
}

impl<R: RemoteFs> fmt::Debug for RemoteSession<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("home", &self.home)
            .field("cached_dirs", &self.cache.len())
            .finish_non_exhaustive()
    }
}

async fn authenticate(
    handle: &mut Handle<SshHandler>,
    user: &str,
    auth: Auth,
) -> Result<(), SessionError> {
    let result = match auth {
        Auth::Password(password) => handle.authenticate_password(user, password).await?,
        Auth::Key(path) => {
            debug!(key = %path.display(), "Using private key");
            let key = load_private_key(&path)?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();
            handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                .await?
        }
    };

    if result.success() {
        Ok(())
    } else {
        Err(SessionError::Connection(format!(
            "authentication rejected for user '{user}'"
        )))
    }
}

/// Read and decode an unencrypted private key.
///
/// Failing to read the file is a local IO error; a file that is not a
/// usable key is a connection error.
fn load_private_key(path: &Path) -> Result<PrivateKey, SessionError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
    Ok(russh::keys::decode_secret_key(&text, None)?)
}

/// Run `command` on a fresh session channel and capture stdout and stderr.
async fn run_command(handle: &Handle<SshHandler>, command: &str) -> Result<Vec<u8>, SessionError> {
    let mut channel = handle.channel_open_session().await?;
    channel.exec(true, command).await?;

    let mut output = Vec::new();
    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } | ChannelMsg::ExtendedData { ref data, .. } => {
                output.extend_from_slice(data);
            }
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            _ => {}
        }
    }

    match exit_status {
        Some(0) | None => Ok(output),
        Some(code) => Err(SessionError::ConfigParse(format!(
            "'{command}' exited with status {code}"
        ))),
    }
}

/// Extract the home directory from the output of [`HOME_COMMAND`].
fn parse_home(output: &[u8]) -> Result<String, SessionError> {
    let text = std::str::from_utf8(output).map_err(|_| {
        SessionError::ConfigParse("home directory response is not valid UTF-8".to_string())
    })?;
    let home = text.strip_suffix('\n').unwrap_or(text);
    let home = home.strip_suffix('\r').unwrap_or(home);

    if home.is_empty() || !home.starts_with('/') || home.contains('\n') {
        return Err(SessionError::ConfigParse(format!(
            "unusable home directory response {text:?}"
        )));
    }
    Ok(home.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRemote;

    #[test]
    fn test_parse_home() {
        assert_eq!(parse_home(b"/root\n").unwrap(), "/root");
        assert_eq!(parse_home(b"/home/alice\r\n").unwrap(), "/home/alice");
        assert_eq!(parse_home(b"/srv").unwrap(), "/srv");
    }

    #[test]
    fn test_parse_home_rejects_garbage() {
        assert!(matches!(parse_home(b""), Err(SessionError::ConfigParse(_))));
        assert!(matches!(parse_home(b"\n"), Err(SessionError::ConfigParse(_))));
        assert!(matches!(
            parse_home(b"relative/dir\n"),
            Err(SessionError::ConfigParse(_))
        ));
        assert!(matches!(
            parse_home(b"motd line\n/root\n"),
            Err(SessionError::ConfigParse(_))
        ));
        assert!(matches!(
            parse_home(&[0xff, 0xfe]),
            Err(SessionError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_connect_options_builder() {
        let options = ConnectOptions::new("host:2200")
            .unwrap()
            .with_user(Some("bob".to_string()))
            .with_password(Some("pw".to_string()));
        let credentials = options.credentials();
        assert_eq!(credentials.user, "bob");
        assert_eq!(credentials.auth, Some(Auth::Password("pw".to_string())));
        assert_eq!(options.descriptor.address, "host:2200");
    }

    #[test]
    fn test_connect_options_rejects_bad_descriptor() {
        assert!(matches!(
            ConnectOptions::new("alice@"),
            Err(SessionError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_session_resolves_against_home() {
        let session = RemoteSession::from_parts(MemoryRemote::new(), "/root");
        assert_eq!(session.home(), "/root");
        assert_eq!(session.resolve("/foo.txt"), "/root/foo.txt");
        assert_eq!(session.resolve("/"), "/root");
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_unreadable_key_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("id_missing");

        match load_private_key(&missing) {
            Err(SessionError::Io(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::NotFound);
                assert!(e.to_string().contains("id_missing"));
            }
            other => panic!("expected an IO error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_key_is_connection_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("id_garbage");
        std::fs::write(&path, "not a private key").unwrap();

        assert!(matches!(
            load_private_key(&path),
            Err(SessionError::Connection(_))
        ));
    }
}
