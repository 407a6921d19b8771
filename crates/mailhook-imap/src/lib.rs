//! # mailhook-imap
//!
//! A small async IMAP client covering what `mailhook` needs from a mailbox:
//! log in, select, list uids and download bodies without marking them read.
//!
//! ## Features
//!
//! - **TLS via rustls**: implicit TLS with the webpki root store, or plain
//!   TCP for local servers
//! - **Literal-aware framing**: message bodies arrive as `{n}` literals
//! - **Timeouts**: the connect and every socket read or write are bounded
//! - **Decoding**: MIME headers and bodies are decoded with `mail-parser`
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailhook_core::{FetchOrder, MailSource};
//! use mailhook_imap::{Config, ImapMailSource};
//!
//! let config = Config::new("imap.example.com");
//! let source = ImapMailSource::connect(&config, "user@example.com", "password").await?;
//! let newest = source.fetch(50, FetchOrder::NewestFirst).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod decode;
mod error;
pub mod response;
pub mod source;

pub use connection::{Config, ImapStream, Security, Session, Transport};
pub use decode::decode_message;
pub use error::{Error, Result};
pub use source::{FetchMode, ImapMailSource};
