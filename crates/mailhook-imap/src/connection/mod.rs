//! Connection management: configuration, transport, framing and sessions.

mod config;
mod framed;
mod session;
mod stream;

pub use config::{Config, Security};
pub use framed::FramedStream;
pub use session::Session;
pub use stream::{ImapStream, Transport, connect, tls_connector};
