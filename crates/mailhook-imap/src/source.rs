//! [`MailSource`] implementation backed by an IMAP session.

use std::collections::HashMap;

use mailhook_core::{FetchOrder, MailSource, Message, SourceError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::connection::{self, Config, ImapStream, Session};
use crate::decode::decode_message;

/// How message bodies are downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// One `UID FETCH` for the whole window.
    #[default]
    Batch,
    /// One `UID FETCH` per message, keeping a single body in memory at a time.
    OneByOne,
}

/// A mailbox read through one long-lived IMAP session.
///
/// Every fetch re-selects the mailbox so messages delivered since the last
/// fetch are visible. Messages are never marked `\Seen`.
pub struct ImapMailSource<S = ImapStream> {
    session: Mutex<Session<S>>,
    mailbox: String,
    mode: FetchMode,
}

impl ImapMailSource<ImapStream> {
    /// Connects, logs in and selects the configured mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`](crate::Error::Auth) if the credentials are
    /// rejected, or a connection error.
    pub async fn connect(config: &Config, username: &str, password: &str) -> Result<Self> {
        let stream = connection::connect(config).await?;
        let session = Session::from_stream(stream, config.io_timeout).await?;
        let source = Self::login(session, username, password, &config.mailbox).await?;
        info!(host = %config.host, mailbox = %config.mailbox, "Connected to mailbox");
        Ok(source)
    }
}

impl<S> ImapMailSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Logs in on an established session and selects `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns an error if login or selection fails.
    pub async fn login(
        mut session: Session<S>,
        username: &str,
        password: &str,
        mailbox: &str,
    ) -> Result<Self> {
        session.login(username, password).await?;
        session.select(mailbox).await?;
        Ok(Self {
            session: Mutex::new(session),
            mailbox: mailbox.to_string(),
            mode: FetchMode::default(),
        })
    }

    /// Sets how bodies are downloaded.
    #[must_use]
    pub const fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Logs out and closes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge LOGOUT.
    pub async fn logout(self) -> Result<()> {
        self.session.into_inner().logout().await?;
        Ok(())
    }

    async fn fetch_window(&self, limit: usize, order: FetchOrder) -> Result<Vec<Message>> {
        let mut session = self.session.lock().await;
        session.select(&self.mailbox).await?;

        let all = session.uid_search_all().await?;
        let mut window: Vec<u32> = all[all.len().saturating_sub(limit)..].to_vec();
        if order == FetchOrder::NewestFirst {
            window.reverse();
        }
        debug!(total = all.len(), window = window.len(), "Fetching messages");

        let mut bodies = HashMap::with_capacity(window.len());
        match self.mode {
            FetchMode::Batch => {
                for body in session.uid_fetch(&window).await? {
                    bodies.insert(body.uid, body.raw);
                }
            }
            FetchMode::OneByOne => {
                for &uid in &window {
                    for body in session.uid_fetch(&[uid]).await? {
                        bodies.insert(body.uid, body.raw);
                    }
                }
            }
        }

        let messages = window
            .into_iter()
            .filter_map(|uid| match bodies.remove(&uid) {
                Some(raw) => Some(decode_message(uid, &raw)),
                None => {
                    warn!(uid, "Message vanished before it could be fetched");
                    None
                }
            })
            .collect();
        Ok(messages)
    }
}

impl<S> MailSource for ImapMailSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn fetch(
        &self,
        limit: usize,
        order: FetchOrder,
    ) -> std::result::Result<Vec<Message>, SourceError> {
        Ok(self.fetch_window(limit, order).await?)
    }
}
