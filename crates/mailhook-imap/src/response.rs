//! Parsing of the few server responses a mailhook session needs.
//!
//! Responses are the raw byte blocks produced by
//! [`FramedStream::read_response`](crate::connection::FramedStream::read_response):
//! one CRLF line, plus any literals it announced.

use crate::{Error, Result};

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed.
    Bad,
}

/// A message body returned by `UID FETCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    /// Message uid.
    pub uid: u32,
    /// Raw RFC 5322 message.
    pub raw: Vec<u8>,
}

/// Parses the server greeting.
///
/// # Errors
///
/// Returns [`Error::Bye`] if the server refuses the connection, or
/// [`Error::Protocol`] for anything but `* OK` / `* PREAUTH`.
pub fn check_greeting(greeting: &[u8]) -> Result<()> {
    let line = text_of(greeting);
    if let Some(rest) = strip_keyword(&line, "* OK") {
        tracing::debug!(greeting = rest, "Server greeting");
        return Ok(());
    }
    if strip_keyword(&line, "* PREAUTH").is_some() {
        return Ok(());
    }
    if let Some(rest) = strip_keyword(&line, "* BYE") {
        return Err(Error::Bye(rest.to_string()));
    }
    Err(Error::Protocol(format!("unexpected greeting: {line}")))
}

/// Parses `tag STATUS text` if `response` is tagged with `tag`.
#[must_use]
pub fn tagged_status(response: &[u8], tag: &str) -> Option<(Status, String)> {
    let line = text_of(response);
    let rest = line.strip_prefix(tag)?.strip_prefix(' ')?;
    let (status, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match status.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        _ => return None,
    };
    Some((status, text.to_string()))
}

/// Checks that the command tagged `tag` completed with OK.
///
/// An untagged `BYE` before a missing completion is reported as
/// [`Error::Bye`].
///
/// # Errors
///
/// Returns [`Error::No`], [`Error::Bad`], [`Error::Bye`] or
/// [`Error::Protocol`] when the command did not succeed.
pub fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
    for response in responses.iter().rev() {
        if let Some((status, text)) = tagged_status(response, tag) {
            return match status {
                Status::Ok => Ok(()),
                Status::No => Err(Error::No(text)),
                Status::Bad => Err(Error::Bad(text)),
            };
        }
    }

    for response in responses {
        if let Some(rest) = strip_keyword(&text_of(response), "* BYE") {
            return Err(Error::Bye(rest.to_string()));
        }
    }
    Err(Error::Protocol("missing tagged response".to_string()))
}

/// Collects the uids of every untagged `SEARCH` response.
#[must_use]
pub fn parse_search(responses: &[Vec<u8>]) -> Vec<u32> {
    responses
        .iter()
        .filter_map(|response| {
            let line = text_of(response);
            strip_keyword(&line, "* SEARCH").map(str::to_string)
        })
        .flat_map(|rest| {
            rest.split_whitespace()
                .filter_map(|n| n.parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Returns the message count from an untagged `EXISTS` response.
#[must_use]
pub fn parse_exists(responses: &[Vec<u8>]) -> Option<u32> {
    responses.iter().find_map(|response| {
        let line = text_of(response);
        let rest = line.strip_prefix("* ")?;
        let (count, keyword) = rest.split_once(' ')?;
        keyword
            .eq_ignore_ascii_case("EXISTS")
            .then(|| count.parse().ok())
            .flatten()
    })
}

/// Extracts the uid and `BODY[]` literal from an untagged `FETCH` response.
///
/// Returns `None` for responses that are not a `FETCH` carrying both items,
/// such as flag updates the server pushes unprompted. A `BODY[] NIL` is
/// returned as an empty body.
#[must_use]
pub fn parse_fetch(response: &[u8]) -> Option<FetchedBody> {
    if !response.starts_with(b"* ") || find(response, b" FETCH (").is_none() {
        return None;
    }

    let marker = find(response, b"BODY[] ")?;
    let value_start = marker + b"BODY[] ".len();
    let value = &response[value_start..];

    let (raw, outside) = if value.starts_with(b"NIL") {
        (Vec::new(), response.to_vec())
    } else {
        let close = find(value, b"}\r\n")?;
        let len: usize = std::str::from_utf8(value.get(1..close)?).ok()?.parse().ok()?;
        let literal_start = value_start + close + 3;
        let literal_end = literal_start.checked_add(len)?;
        let raw = response.get(literal_start..literal_end)?.to_vec();
        let mut outside = response[..value_start].to_vec();
        outside.extend_from_slice(&response[literal_end..]);
        (raw, outside)
    };

    let uid = parse_uid_item(&outside)?;
    Some(FetchedBody { uid, raw })
}

fn parse_uid_item(data: &[u8]) -> Option<u32> {
    let start = find(data, b"UID ")? + 4;
    let digits: Vec<u8> = data[start..]
        .iter()
        .copied()
        .take_while(u8::is_ascii_digit)
        .collect();
    std::str::from_utf8(&digits).ok()?.parse().ok()
}

/// Returns the first line of a response as text, without the CRLF.
fn text_of(response: &[u8]) -> String {
    let end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(response.len());
    String::from_utf8_lossy(&response[..end]).into_owned()
}

/// Matches a case-insensitive keyword prefix followed by a space or the end
/// of the line, returning the remainder.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let head = line.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &line[keyword.len()..];
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix(' ')
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&[u8]]) -> Vec<Vec<u8>> {
        raw.iter().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn test_greeting() {
        assert!(check_greeting(b"* OK IMAP4rev1 ready\r\n").is_ok());
        assert!(check_greeting(b"* PREAUTH welcome\r\n").is_ok());
        assert!(matches!(
            check_greeting(b"* BYE too many connections\r\n"),
            Err(Error::Bye(text)) if text == "too many connections"
        ));
        assert!(matches!(check_greeting(b"hello\r\n"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_tagged_status() {
        assert_eq!(
            tagged_status(b"A0001 OK LOGIN completed\r\n", "A0001"),
            Some((Status::Ok, "LOGIN completed".to_string()))
        );
        assert_eq!(
            tagged_status(b"A0001 no [AUTHENTICATIONFAILED] Invalid\r\n", "A0001"),
            Some((Status::No, "[AUTHENTICATIONFAILED] Invalid".to_string()))
        );
        assert_eq!(tagged_status(b"A00012 OK\r\n", "A0001"), None);
        assert_eq!(tagged_status(b"* OK still here\r\n", "A0001"), None);
    }

    #[test]
    fn test_check_tagged_ok() {
        let ok = lines(&[b"* 3 EXISTS\r\n", b"A0002 OK [READ-WRITE] SELECT\r\n"]);
        assert!(check_tagged_ok(&ok, "A0002").is_ok());

        let bad = lines(&[b"A0002 BAD unknown command\r\n"]);
        assert!(matches!(check_tagged_ok(&bad, "A0002"), Err(Error::Bad(_))));

        let bye = lines(&[b"* BYE idle timeout\r\n"]);
        assert!(matches!(check_tagged_ok(&bye, "A0002"), Err(Error::Bye(_))));

        let missing = lines(&[b"* 3 EXISTS\r\n"]);
        assert!(matches!(
            check_tagged_ok(&missing, "A0002"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_search() {
        let responses = lines(&[
            b"* SEARCH 4 9 12\r\n",
            b"* SEARCH\r\n",
            b"A0003 OK SEARCH completed\r\n",
        ]);
        assert_eq!(parse_search(&responses), vec![4, 9, 12]);
        assert!(parse_search(&lines(&[b"A0003 OK\r\n"])).is_empty());
    }

    #[test]
    fn test_parse_exists() {
        let responses = lines(&[
            b"* FLAGS (\\Seen)\r\n",
            b"* 172 EXISTS\r\n",
            b"A0002 OK\r\n",
        ]);
        assert_eq!(parse_exists(&responses), Some(172));
        assert_eq!(parse_exists(&lines(&[b"A0002 OK\r\n"])), None);
    }

    #[test]
    fn test_parse_fetch_literal() {
        let response = b"* 2 FETCH (UID 41 BODY[] {12}\r\nSubject: hi\n)\r\n";
        let fetched = parse_fetch(response).unwrap();
        assert_eq!(fetched.uid, 41);
        assert_eq!(fetched.raw, b"Subject: hi\n");
    }

    #[test]
    fn test_parse_fetch_uid_after_body() {
        // Literal content mentioning "UID 99" must not be mistaken for the item.
        let response = b"* 2 FETCH (BODY[] {7}\r\nUID 99\n UID 41)\r\n";
        let fetched = parse_fetch(response).unwrap();
        assert_eq!(fetched.uid, 41);
        assert_eq!(fetched.raw, b"UID 99\n");
    }

    #[test]
    fn test_parse_fetch_nil_body() {
        let fetched = parse_fetch(b"* 2 FETCH (UID 41 BODY[] NIL)\r\n").unwrap();
        assert_eq!(fetched.uid, 41);
        assert!(fetched.raw.is_empty());
    }

    #[test]
    fn test_parse_fetch_ignores_flag_updates() {
        assert!(parse_fetch(b"* 2 FETCH (FLAGS (\\Seen) UID 41)\r\n").is_none());
        assert!(parse_fetch(b"A0004 OK FETCH completed\r\n").is_none());
    }
}
