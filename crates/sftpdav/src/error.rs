//! Error handling and mapping for the SFTP-backed WebDAV server.
//!
//! Startup failures are reported as [`SessionError`] and end the process.
//! Steady-state failures are reported as [`AdaptorError`] and converted to
//! the `FsError` values that dav-server turns into HTTP statuses. Nothing in
//! this crate retries.

use dav_server::fs::FsError;
use russh_sftp::protocol::StatusCode;
use std::io;
use thiserror::Error;

/// Errors raised while establishing the remote session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport dial or authentication failure.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Malformed connection descriptor or unusable home-path response.
    #[error("Invalid configuration: {0}")]
    ConfigParse(String),

    /// Local IO failure (reading a private key).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<russh::Error> for SessionError {
    fn from(e: russh::Error) -> Self {
        SessionError::Connection(e.to_string())
    }
}

impl From<russh::keys::Error> for SessionError {
    fn from(e: russh::keys::Error) -> Self {
        SessionError::Connection(format!("unusable private key: {e}"))
    }
}

impl From<russh_sftp::client::error::Error> for SessionError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        SessionError::Connection(format!("SFTP subsystem: {e}"))
    }
}

/// A failed remote protocol call.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The server answered with an error status.
    #[error("{message} ({code:?})")]
    Status {
        /// SFTP status code.
        code: StatusCode,
        /// Server-supplied message.
        message: String,
    },

    /// The request could not be carried out on the channel.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server did not answer in time.
    #[error("Remote request timed out")]
    Timeout,
}

impl ProtocolError {
    /// Shorthand for a status error.
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        ProtocolError::Status {
            code,
            message: message.into(),
        }
    }

    /// Whether the server reported that the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProtocolError::Status {
                code: StatusCode::NoSuchFile,
                ..
            }
        )
    }

    /// Converts this error to a dav-server FsError.
    pub fn to_fs_error(&self) -> FsError {
        match self {
            ProtocolError::Status { code, .. } => match code {
                StatusCode::NoSuchFile => FsError::NotFound,
                StatusCode::PermissionDenied => FsError::Forbidden,
                StatusCode::OpUnsupported => FsError::NotImplemented,
                _ => FsError::GeneralFailure,
            },
            ProtocolError::Transport(_) | ProtocolError::Timeout => FsError::GeneralFailure,
        }
    }
}

impl From<russh_sftp::client::error::Error> for ProtocolError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        use russh_sftp::client::error::Error;

        match e {
            Error::Status(status) => ProtocolError::Status {
                code: status.status_code,
                message: status.error_message,
            },
            Error::Timeout => ProtocolError::Timeout,
            other => ProtocolError::Transport(other.to_string()),
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => ProtocolError::status(StatusCode::NoSuchFile, e.to_string()),
            io::ErrorKind::PermissionDenied => {
                ProtocolError::status(StatusCode::PermissionDenied, e.to_string())
            }
            io::ErrorKind::TimedOut => ProtocolError::Timeout,
            _ => ProtocolError::Transport(e.to_string()),
        }
    }
}

/// Errors surfaced by filesystem operations.
#[derive(Debug, Clone, Error)]
pub enum AdaptorError {
    /// A remote call failed; passed through unchanged.
    #[error("Remote call failed: {0}")]
    Protocol(#[from] ProtocolError),

    /// The name is absent from a cached listing of its directory.
    #[error("File does not exist: {0}")]
    NotFound(String),
}

impl AdaptorError {
    /// Converts this error to a dav-server FsError.
    pub fn to_fs_error(&self) -> FsError {
        match self {
            AdaptorError::Protocol(e) => e.to_fs_error(),
            AdaptorError::NotFound(_) => FsError::NotFound,
        }
    }
}

impl From<AdaptorError> for FsError {
    fn from(e: AdaptorError) -> Self {
        e.to_fs_error()
    }
}

impl From<ProtocolError> for FsError {
    fn from(e: ProtocolError) -> Self {
        e.to_fs_error()
    }
}

/// Result type for filesystem operations.
pub type AdaptorResult<T> = Result<T, AdaptorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptor_error_to_fs_error() {
        assert!(matches!(
            AdaptorError::NotFound("/root/x".to_string()).to_fs_error(),
            FsError::NotFound
        ));
        assert!(matches!(
            AdaptorError::Protocol(ProtocolError::Timeout).to_fs_error(),
            FsError::GeneralFailure
        ));
    }

    #[test]
    fn test_status_mapping() {
        let e = ProtocolError::status(StatusCode::NoSuchFile, "no such file");
        assert!(e.is_not_found());
        assert!(matches!(e.to_fs_error(), FsError::NotFound));

        let e = ProtocolError::status(StatusCode::PermissionDenied, "denied");
        assert!(!e.is_not_found());
        assert!(matches!(e.to_fs_error(), FsError::Forbidden));

        let e = ProtocolError::status(StatusCode::OpUnsupported, "unsupported");
        assert!(matches!(e.to_fs_error(), FsError::NotImplemented));

        let e = ProtocolError::status(StatusCode::Failure, "failure");
        assert!(matches!(e.to_fs_error(), FsError::GeneralFailure));
    }

    fn sftp_status(code: StatusCode, message: &str) -> russh_sftp::client::error::Error {
        russh_sftp::client::error::Error::Status(russh_sftp::protocol::Status {
            id: 7,
            status_code: code,
            error_message: message.to_string(),
            language_tag: "en-US".to_string(),
        })
    }

    #[test]
    fn test_sftp_error_mapping() {
        let e = ProtocolError::from(sftp_status(StatusCode::NoSuchFile, "no such file"));
        assert!(e.is_not_found());
        assert_eq!(e.to_string(), "no such file (NoSuchFile)");

        let e = ProtocolError::from(sftp_status(StatusCode::PermissionDenied, "denied"));
        assert!(matches!(e.to_fs_error(), FsError::Forbidden));

        let e = ProtocolError::from(russh_sftp::client::error::Error::Timeout);
        assert!(matches!(e, ProtocolError::Timeout));

        let e = ProtocolError::from(russh_sftp::client::error::Error::UnexpectedPacket);
        assert!(matches!(e, ProtocolError::Transport(_)));
        assert!(matches!(e.to_fs_error(), FsError::GeneralFailure));
    }

    #[test]
    fn test_io_error_mapping() {
        let e = ProtocolError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(e.is_not_found());

        let e = ProtocolError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(matches!(e.to_fs_error(), FsError::Forbidden));

        let e = ProtocolError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(e, ProtocolError::Transport(_)));
    }

    #[test]
    fn test_not_found_is_distinct_from_remote_not_found() {
        let local = AdaptorError::NotFound("/root/a".to_string());
        let remote = AdaptorError::from(ProtocolError::status(StatusCode::NoSuchFile, "x"));
        assert!(matches!(local, AdaptorError::NotFound(_)));
        assert!(matches!(remote, AdaptorError::Protocol(_)));
    }
}
