//! A logged-in IMAP session.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::framed::FramedStream;
use crate::command::Command;
use crate::response::{self, FetchedBody};
use crate::{Error, Result};

/// Sequential command/response exchange over one connection.
pub struct Session<S> {
    stream: FramedStream<S>,
    /// Number of commands sent so far; the next tag is derived from it.
    sent: u32,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a fresh connection and reads the server greeting.
    ///
    /// `io_timeout` bounds every single read and write, not a whole command.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing, late or a `BYE`.
    pub async fn from_stream(stream: S, io_timeout: Duration) -> Result<Self> {
        let mut stream = FramedStream::new(stream, io_timeout);
        let greeting = stream.read_response().await?;
        response::check_greeting(&greeting)?;

        Ok(Self { stream, sent: 0 })
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the server rejects the credentials.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        match self.execute(Command::Login { username, password }).await {
            Ok(_) => {
                debug!(username, "Logged in");
                Ok(())
            }
            Err(Error::No(text) | Error::Bad(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }

    /// Selects `mailbox`, returning its message count when the server
    /// reports one.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected.
    pub async fn select(&mut self, mailbox: &str) -> Result<Option<u32>> {
        let responses = self.execute(Command::Select { mailbox }).await?;
        let exists = response::parse_exists(&responses);
        debug!(mailbox, ?exists, "Mailbox selected");
        Ok(exists)
    }

    /// Returns every uid in the selected mailbox, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn uid_search_all(&mut self) -> Result<Vec<u32>> {
        let responses = self.execute(Command::UidSearchAll).await?;
        let mut uids = response::parse_search(&responses);
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Fetches full message bodies without setting `\Seen`.
    ///
    /// Bodies come back in server order; uids the server no longer has are
    /// simply absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    pub async fn uid_fetch(&mut self, uids: &[u32]) -> Result<Vec<FetchedBody>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let responses = self.execute(Command::UidFetch { uids }).await?;
        let bodies: Vec<FetchedBody> = responses
            .iter()
            .filter_map(|r| response::parse_fetch(r))
            .collect();
        if bodies.len() < uids.len() {
            warn!(
                requested = uids.len(),
                received = bodies.len(),
                "Server returned fewer messages than requested"
            );
        }
        Ok(bodies)
    }

    /// Ends the session and returns the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge LOGOUT.
    pub async fn logout(mut self) -> Result<S> {
        self.execute(Command::Logout).await?;
        debug!("Logged out");
        Ok(self.stream.into_inner())
    }

    /// Sends one command and collects its responses.
    async fn execute(&mut self, command: Command<'_>) -> Result<Vec<Vec<u8>>> {
        self.sent = self.sent.wrapping_add(1);
        let tag = format!("A{:04}", self.sent);
        debug!(tag = %tag, command = command.name(), "Sending command");

        self.stream.write_command(&command.serialize(&tag)?).await?;
        let responses = self.stream.read_until_tagged(&tag).await?;
        response::check_tagged_ok(&responses, &tag)?;
        Ok(responses)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_login_select_search() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN user@example.com secret\r\n")
            .read(b"A0001 OK LOGIN completed\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\n* 0 RECENT\r\nA0002 OK [READ-WRITE] SELECT completed\r\n")
            .write(b"A0003 UID SEARCH ALL\r\n")
            .read(b"* SEARCH 12 10 11\r\nA0003 OK SEARCH completed\r\n")
            .build();

        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();
        session.login("user@example.com", "secret").await.unwrap();
        assert_eq!(session.select("INBOX").await.unwrap(), Some(3));
        assert_eq!(session.uid_search_all().await.unwrap(), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 LOGIN user wrong\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();

        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();
        let err = session.login("user", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(text) if text.contains("Invalid credentials")));
    }

    #[tokio::test]
    async fn test_bye_greeting() {
        let mock = Builder::new().read(b"* BYE server full\r\n").build();
        assert!(matches!(
            Session::from_stream(mock, TIMEOUT).await,
            Err(Error::Bye(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_bodies() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 UID FETCH 10:11 (UID BODY.PEEK[])\r\n")
            .read(b"* 1 FETCH (UID 10 BODY[] {11}\r\n")
            .read(b"Subject: a\n)\r\n")
            .read(b"* 2 FETCH (UID 11 BODY[] {11}\r\n")
            .read(b"Subject: b\n)\r\n")
            .read(b"A0001 OK FETCH completed\r\n")
            .build();

        let mut session = Session::from_stream(mock, TIMEOUT).await.unwrap();
        let bodies = session.uid_fetch(&[11, 10]).await.unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].uid, 10);
        assert_eq!(bodies[1].raw, b"Subject: b\n");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        tokio::time::pause();
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 UID SEARCH ALL\r\n")
            .wait(Duration::from_secs(60))
            .build();

        let mut session = Session::from_stream(mock, Duration::from_secs(1)).await.unwrap();
        let err = session.uid_search_all().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_slow_fetch_is_not_cut_off() {
        tokio::time::pause();
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0001 UID FETCH 10:12 (UID BODY.PEEK[])\r\n")
            .read(b"* 1 FETCH (UID 10 BODY[] {11}\r\nSubject: a\n)\r\n")
            .wait(Duration::from_secs(40))
            .read(b"* 2 FETCH (UID 11 BODY[] {11}\r\nSubject: b\n)\r\n")
            .wait(Duration::from_secs(40))
            .read(b"* 3 FETCH (UID 12 BODY[] {11}\r\nSubject: c\n)\r\n")
            .wait(Duration::from_secs(40))
            .read(b"A0001 OK FETCH completed\r\n")
            .build();

        let mut session = Session::from_stream(mock, Duration::from_secs(60)).await.unwrap();
        let bodies = session.uid_fetch(&[10, 11, 12]).await.unwrap();
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[2].raw, b"Subject: c\n");
    }
}
