//! Where and how to reach the IMAP server.

use std::fmt;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain TCP. Only sensible for a server on the local machine.
    None,
    /// TLS from the first byte.
    #[default]
    Implicit,
}

impl Security {
    /// Well-known IMAP port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        if matches!(self, Self::Implicit) { 993 } else { 143 }
    }

    /// Reads a configuration value: `tls` (also `implicit`, `ssl`) or
    /// `plain` (also `none`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let value = s.trim();
        if ["tls", "implicit", "ssl"].iter().any(|v| value.eq_ignore_ascii_case(v)) {
            Some(Self::Implicit)
        } else if ["plain", "none"].iter().any(|v| value.eq_ignore_ascii_case(v)) {
            Some(Self::None)
        } else {
            None
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "plain",
            Self::Implicit => "tls",
        })
    }
}

/// Server address, security mode, timeouts and the mailbox to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname, also used for certificate verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security.
    pub security: Security,
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on each read or write; a long response may take longer overall.
    pub io_timeout: Duration,
    /// Mailbox selected before every fetch.
    pub mailbox: String,
}

impl Config {
    /// Reads `INBOX` on `host` over implicit TLS, port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_security(host, Security::default())
    }

    /// Reads `INBOX` on `host` using the standard port for `security`.
    #[must_use]
    pub fn with_security(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: security.default_port(),
            security,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            mailbox: "INBOX".to_string(),
        }
    }

    /// Overrides the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the mailbox.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }

    /// Overrides both timeouts.
    #[must_use]
    pub const fn timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }
}
