//! IMAP client errors.

use std::time::Duration;

use mailhook_core::SourceError;
use thiserror::Error;

/// Everything that can go wrong talking to the server.
#[derive(Debug, Error)]
pub enum Error {
    /// The socket failed or the server hung up.
    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),

    /// The host name cannot be used for certificate verification.
    #[error("Host is not a valid TLS server name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The command was refused (`NO`).
    #[error("Command refused: {0}")]
    No(String),

    /// The server did not understand the command (`BAD`).
    #[error("Command rejected as malformed: {0}")]
    Bad(String),

    /// The server closed the session (`BYE`).
    #[error("Server closed the session: {0}")]
    Bye(String),

    /// No answer within the configured timeout.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// Data that breaks the protocol, from the server or in a command
    /// argument.
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

/// Result alias for IMAP operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for SourceError {
    fn from(err: Error) -> Self {
        match err {
            Error::Auth(text) => Self::Auth(text),
            Error::No(_) | Error::Bad(_) | Error::Protocol(_) => Self::Protocol(err.to_string()),
            Error::Io(_) | Error::InvalidDnsName(_) | Error::Bye(_) | Error::Timeout(_) => {
                Self::Connection(err.to_string())
            }
        }
    }
}
