//! IMAP commands and their wire format.

use crate::{Error, Result};

/// The commands a mailhook session issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `LOGIN user password`
    Login {
        /// Username.
        username: &'a str,
        /// Password.
        password: &'a str,
    },
    /// `SELECT mailbox`
    Select {
        /// Mailbox name.
        mailbox: &'a str,
    },
    /// `UID SEARCH ALL`
    UidSearchAll,
    /// `UID FETCH <set> (UID BODY.PEEK[])`, which leaves `\Seen` untouched.
    UidFetch {
        /// Uids to fetch.
        uids: &'a [u32],
    },
    /// `LOGOUT`
    Logout,
}

impl Command<'_> {
    /// Serializes the command with `tag`, including the trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if an argument cannot be sent as an atom or
    /// quoted string.
    pub fn serialize(&self, tag: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username)?;
                buf.push(b' ');
                write_astring(&mut buf, password)?;
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox)?;
            }
            Self::UidSearchAll => buf.extend_from_slice(b"UID SEARCH ALL"),
            Self::UidFetch { uids } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(uid_set(uids).as_bytes());
                buf.extend_from_slice(b" (UID BODY.PEEK[])");
            }
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        Ok(buf)
    }

    /// Command name for logging. Never includes arguments.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::UidSearchAll => "UID SEARCH",
            Self::UidFetch { .. } => "UID FETCH",
            Self::Logout => "LOGOUT",
        }
    }
}

/// Writes an atom, or a quoted string when the value needs quoting.
///
/// # Errors
///
/// Returns [`Error::Protocol`] for NUL, CR, LF or non-ASCII bytes, which a
/// quoted string cannot carry. The value itself is not part of the message.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.bytes().any(|b| matches!(b, 0 | b'\r' | b'\n') || !b.is_ascii()) {
        return Err(Error::Protocol(
            "argument contains NUL, CR, LF or non-ASCII characters".to_string(),
        ));
    }
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
    Ok(())
}

/// Returns true if the byte cannot appear in an atom.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']')
        || b < 0x20
        || b == 0x7F
}

/// Formats uids as a compact sequence set, e.g. `1:3,7,9:10`.
///
/// Input order is irrelevant; duplicates are collapsed.
#[must_use]
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut end = start;

    for uid in iter {
        if end.checked_add(1) == Some(uid) {
            end = uid;
            continue;
        }
        parts.push(range(start, end));
        start = uid;
        end = uid;
    }
    parts.push(range(start, end));
    parts.join(",")
}

fn range(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}:{end}")
    }
}
