//! Connection descriptor parsing.
//!
//! A descriptor has the form `[user[:password]@]host[:port]`.

use crate::error::SessionError;
use std::fmt;

/// Port used when the descriptor names none.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A parsed connection descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// User embedded in the descriptor, if any.
    pub user: Option<String>,
    /// Password embedded in the descriptor, if any.
    pub password: Option<String>,
    /// `host:port`, with the default port appended when none was given.
    pub address: String,
}

impl ConnectionDescriptor {
    /// Parse a descriptor.
    ///
    /// Everything after the last `@` is the address. Before it, the last `:`
    /// separates user from password.
    pub fn parse(input: &str) -> Result<Self, SessionError> {
        let input = input.trim();
        let (credentials, address) = match input.rfind('@') {
            Some(idx) => (Some(&input[..idx]), &input[idx + 1..]),
            None => (None, input),
        };

        let (user, password) = match credentials {
            None => (None, None),
            Some(creds) => match creds.rfind(':') {
                Some(idx) => (
                    non_empty(&creds[..idx]),
                    Some(creds[idx + 1..].to_string()),
                ),
                None => (non_empty(creds), None),
            },
        };

        if address.is_empty() {
            return Err(SessionError::ConfigParse(format!(
                "missing host in connection descriptor '{input}'"
            )));
        }

        let address = if has_port(address) {
            validate_port(address)?;
            address.to_string()
        } else {
            format!("{address}:{DEFAULT_SSH_PORT}")
        };

        Ok(Self {
            user,
            password,
            address,
        })
    }

    /// Host part of the address, without the port.
    pub fn host(&self) -> &str {
        self.address
            .rsplit_once(':')
            .map_or(self.address.as_str(), |(host, _)| host)
    }
}

// Keep the password out of logs
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("address", &self.address)
            .finish()
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Whether the address already carries a port. Bracketed IPv6 literals
/// only carry one after the closing bracket.
fn has_port(address: &str) -> bool {
    match address.rfind(']') {
        Some(idx) => address[idx..].contains(':'),
        None => address.contains(':'),
    }
}

fn validate_port(address: &str) -> Result<(), SessionError> {
    let port = address.rsplit_once(':').map_or("", |(_, port)| port);
    port.parse::<u16>().map(|_| ()).map_err(|_| {
        SessionError::ConfigParse(format!("invalid port '{port}' in address '{address}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_password_and_port() {
        let d = ConnectionDescriptor::parse("alice:secret@host:2222").unwrap();
        assert_eq!(d.user.as_deref(), Some("alice"));
        assert_eq!(d.password.as_deref(), Some("secret"));
        assert_eq!(d.address, "host:2222");
        assert_eq!(d.host(), "host");
    }

    #[test]
    fn test_bare_host_gets_default_port() {
        let d = ConnectionDescriptor::parse("host").unwrap();
        assert_eq!(d.user, None);
        assert_eq!(d.password, None);
        assert_eq!(d.address, "host:22");
    }

    #[test]
    fn test_user_without_password() {
        let d = ConnectionDescriptor::parse("bob@files.example.com").unwrap();
        assert_eq!(d.user.as_deref(), Some("bob"));
        assert_eq!(d.password, None);
        assert_eq!(d.address, "files.example.com:22");
    }

    #[test]
    fn test_last_at_separates_address() {
        let d = ConnectionDescriptor::parse("carol:p@ss@host").unwrap();
        assert_eq!(d.user.as_deref(), Some("carol"));
        assert_eq!(d.password.as_deref(), Some("p@ss"));
        assert_eq!(d.address, "host:22");
    }

    #[test]
    fn test_ipv6_literal() {
        let d = ConnectionDescriptor::parse("[::1]").unwrap();
        assert_eq!(d.address, "[::1]:22");
        let d = ConnectionDescriptor::parse("[::1]:2200").unwrap();
        assert_eq!(d.address, "[::1]:2200");
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            ConnectionDescriptor::parse("alice@"),
            Err(SessionError::ConfigParse(_))
        ));
        assert!(matches!(
            ConnectionDescriptor::parse("host:ssh"),
            Err(SessionError::ConfigParse(_))
        ));
        assert!(matches!(
            ConnectionDescriptor::parse("host:70000"),
            Err(SessionError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let d = ConnectionDescriptor::parse("alice:secret@host").unwrap();
        let shown = format!("{d:?}");
        assert!(!shown.contains("secret"));
    }
}
