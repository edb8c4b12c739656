//! Credential resolution for the SSH login.
//!
//! Values embedded in the connection descriptor win over explicit options,
//! which win over what can be discovered locally: the invoking account's
//! name and a lone private key in `~/.ssh`.

use crate::descriptor::ConnectionDescriptor;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How to authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Password authentication.
    Password(String),
    /// Public key authentication with the private key at this path.
    Key(PathBuf),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.write_str("Password(***)"),
            Auth::Key(path) => f.debug_tuple("Key").field(path).finish(),
        }
    }
}

/// Resolved login credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Remote user name.
    pub user: String,
    /// Authentication method, or `None` when nothing usable was found.
    pub auth: Option<Auth>,
}

impl Credentials {
    /// Resolve credentials from the descriptor, explicit options and the
    /// local account.
    pub fn resolve(
        descriptor: &ConnectionDescriptor,
        user: Option<&str>,
        key: Option<&Path>,
        password: Option<&str>,
    ) -> Self {
        Self::resolve_with(descriptor, user, key, password, default_ssh_dir().as_deref())
    }

    /// Like [`Credentials::resolve`], discovering keys in `ssh_dir`.
    pub fn resolve_with(
        descriptor: &ConnectionDescriptor,
        user: Option<&str>,
        key: Option<&Path>,
        password: Option<&str>,
        ssh_dir: Option<&Path>,
    ) -> Self {
        let user = descriptor
            .user
            .clone()
            .or_else(|| user.map(str::to_string))
            .unwrap_or_else(whoami::username);

        let password = descriptor
            .password
            .as_deref()
            .or(password)
            .filter(|p| !p.is_empty());

        let auth = if let Some(password) = password {
            Some(Auth::Password(password.to_string()))
        } else if let Some(key) = key {
            Some(Auth::Key(key.to_path_buf()))
        } else {
            ssh_dir.and_then(discover_private_key).map(Auth::Key)
        };

        if auth.is_none() {
            warn!(user = %user, "No password given and no unique private key found");
        }

        Self { user, auth }
    }
}

/// Find the private key in `ssh_dir`.
///
/// A private key is a file named `id_*` without a `.pub` suffix. Returns
/// `None` unless exactly one such file exists.
pub fn discover_private_key(ssh_dir: &Path) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(ssh_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %ssh_dir.display(), error = %e, "Cannot read SSH directory");
            return None;
        }
    };

    let keys: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("id_") && !name.ends_with(".pub")
        })
        .map(|entry| entry.path())
        .collect();

    match keys.as_slice() {
        [key] => {
            debug!(key = %key.display(), "Discovered private key");
            Some(key.clone())
        }
        [] => None,
        _ => {
            debug!(count = keys.len(), "Several private keys found, pass one explicitly");
            None
        }
    }
}

fn default_ssh_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn ssh_dir(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in files {
            fs::write(dir.path().join(name), b"key").unwrap();
        }
        dir
    }

    #[test]
    fn test_discover_single_key() {
        let dir = ssh_dir(&["id_ed25519", "id_ed25519.pub", "known_hosts", "config"]);
        assert_eq!(
            discover_private_key(dir.path()),
            Some(dir.path().join("id_ed25519"))
        );
    }

    #[test]
    fn test_discover_ambiguous() {
        let dir = ssh_dir(&["id_rsa", "id_rsa.pub", "id_ed25519"]);
        assert_eq!(discover_private_key(dir.path()), None);
    }

    #[test]
    fn test_discover_none() {
        let dir = ssh_dir(&["id_rsa.pub", "authorized_keys"]);
        assert_eq!(discover_private_key(dir.path()), None);
        assert_eq!(discover_private_key(&dir.path().join("missing")), None);
    }

    #[test]
    fn test_descriptor_password_wins() {
        let d = ConnectionDescriptor::parse("alice:secret@host").unwrap();
        let c = Credentials::resolve_with(
            &d,
            Some("bob"),
            Some(Path::new("/keys/id_rsa")),
            Some("other"),
            None,
        );
        assert_eq!(c.user, "alice");
        assert_eq!(c.auth, Some(Auth::Password("secret".to_string())));
    }

    #[test]
    fn test_explicit_password_beats_key() {
        let d = ConnectionDescriptor::parse("host").unwrap();
        let c = Credentials::resolve_with(
            &d,
            Some("bob"),
            Some(Path::new("/keys/id_rsa")),
            Some("pw"),
            None,
        );
        assert_eq!(c.user, "bob");
        assert_eq!(c.auth, Some(Auth::Password("pw".to_string())));
    }

    #[test]
    fn test_explicit_key_beats_discovery() {
        let dir = ssh_dir(&["id_ed25519"]);
        let d = ConnectionDescriptor::parse("bob@host").unwrap();
        let c = Credentials::resolve_with(
            &d,
            None,
            Some(Path::new("/keys/id_rsa")),
            None,
            Some(dir.path()),
        );
        assert_eq!(c.auth, Some(Auth::Key(PathBuf::from("/keys/id_rsa"))));
    }

    #[test]
    fn test_falls_back_to_discovery_and_account_name() {
        let dir = ssh_dir(&["id_ed25519"]);
        let d = ConnectionDescriptor::parse("host").unwrap();
        let c = Credentials::resolve_with(&d, None, None, None, Some(dir.path()));
        assert_eq!(c.user, whoami::username());
        assert_eq!(c.auth, Some(Auth::Key(dir.path().join("id_ed25519"))));
    }

    #[test]
    fn test_empty_password_is_ignored() {
        let d = ConnectionDescriptor::parse("alice:@host").unwrap();
        let c = Credentials::resolve_with(&d, None, None, None, None);
        assert_eq!(c.auth, None);
    }
}
