//! Mail source collaborator.
//!
//! The core never talks to a mail server directly. It asks a [`MailSource`]
//! for a bounded batch of messages and trusts the returned [`Message`] shape.

use std::fmt;
use std::future::Future;

/// Message identifier, monotonically increasing within a mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u32);

impl Uid {
    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Uid {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Read-only view of a message supplied by a [`MailSource`].
///
/// Fields the source could not decode are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Mailbox identifier.
    pub uid: Uid,
    /// Sender address.
    pub sender: String,
    /// Decoded subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Message {
    /// Creates a message.
    #[must_use]
    pub fn new(
        uid: u32,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            uid: Uid(uid),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Order in which a source returns a fetched window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchOrder {
    /// Most recent message first.
    #[default]
    NewestFirst,
    /// Oldest message of the window first.
    OldestFirst,
}

/// Errors reported by a mail source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The connection failed, timed out or was closed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server answered with something unexpected.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// A mailbox that can be asked for its most recent messages.
pub trait MailSource: Send + Sync {
    /// Fetches at most `limit` of the most recent messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be read.
    fn fetch(
        &self,
        limit: usize,
        order: FetchOrder,
    ) -> impl Future<Output = Result<Vec<Message>, SourceError>> + Send;
}
