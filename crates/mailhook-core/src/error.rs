//! Error types for the core library.

use thiserror::Error;

use crate::scheduler::PollStatus;
use crate::source::SourceError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The rule set is invalid. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The mailbox could not be reached or refused the request.
    #[error("Mail source error: {0}")]
    Source(#[from] SourceError),

    /// The execution log could not be read or written.
    #[error("Execution log error: {0}")]
    LogStore(#[from] sqlx::Error),

    /// A scheduler operation was requested in a state that does not allow it.
    #[error("Cannot {action} polling while {status}")]
    InvalidTransition {
        /// The requested operation.
        action: &'static str,
        /// The state the scheduler was in.
        status: PollStatus,
    },
}

impl Error {
    /// Returns true if the enclosing pass can continue after this error.
    ///
    /// Log store failures only affect the message being processed; source and
    /// configuration failures invalidate the whole pass.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::LogStore(_))
    }
}

/// Rule set validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A rule has an empty name.
    #[error("rule #{index} has an empty name")]
    EmptyName {
        /// Position of the rule in declaration order (0-based).
        index: usize,
    },

    /// Two rules share the same name.
    #[error("rule name '{0}' is used more than once")]
    DuplicateName(String),

    /// A rule has an empty action path.
    #[error("rule '{0}' has an empty action path")]
    EmptyAction(String),

    /// A pattern failed to compile.
    #[error("rule '{rule}': invalid {field} pattern: {source}")]
    InvalidPattern {
        /// Rule name.
        rule: String,
        /// Which pattern field (`sender` or `pattern`).
        field: &'static str,
        /// Compilation error.
        #[source]
        source: Box<regex::Error>,
    },

    /// An enumerated field holds an unknown value.
    #[error("rule '{rule}': invalid {field} '{value}' (expected one of: {expected})")]
    InvalidValue {
        /// Rule name.
        rule: String,
        /// Field name.
        field: &'static str,
        /// Value found in the configuration.
        value: String,
        /// Accepted spellings.
        expected: &'static str,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
