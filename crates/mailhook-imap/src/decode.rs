//! Turning raw RFC 5322 messages into [`Message`] values.

use mail_parser::MessageParser;
use mailhook_core::{Message, Uid};
use tracing::debug;

/// Decodes a raw message.
///
/// Headers are MIME-decoded. The body is the first `text/plain` part, or the
/// first `text/html` part with tags stripped. Anything that cannot be decoded
/// is left empty rather than failing.
#[must_use]
pub fn decode_message(uid: u32, raw: &[u8]) -> Message {
    let Some(parsed) = MessageParser::default().parse(raw) else {
        debug!(uid, "Message could not be parsed, using empty fields");
        return Message {
            uid: Uid(uid),
            ..Message::default()
        };
    };

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|addr| addr.address())
        .unwrap_or_default()
        .to_string();
    let subject = parsed.subject().unwrap_or_default().to_string();
    let body = parsed
        .body_text(0)
        .map(|text| text.trim_end().to_string())
        .or_else(|| parsed.body_html(0).map(|html| strip_html(&html)))
        .unwrap_or_default();

    Message {
        uid: Uid(uid),
        sender,
        subject,
        body,
    }
}

/// Strips HTML tags and collapses whitespace.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_message() {
        let raw = b"From: Billing <billing@example.com>\r\n\
Subject: INVOICE #42\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Amount due: 10 EUR\r\n";
        let msg = decode_message(42, raw);
        assert_eq!(msg.uid, Uid(42));
        assert_eq!(msg.sender, "billing@example.com");
        assert_eq!(msg.subject, "INVOICE #42");
        assert_eq!(msg.body, "Amount due: 10 EUR");
    }

    #[test]
    fn test_decode_encoded_subject() {
        let raw = b"From: a@example.com\r\n\
Subject: =?UTF-8?B?UmVjaG51bmcgZsO8ciBNw6Ryeg==?=\r\n\
\r\n\
body\r\n";
        assert_eq!(decode_message(1, raw).subject, "Rechnung f\u{fc}r M\u{e4}rz");
    }

    #[test]
    fn test_decode_html_only_message() {
        let raw = b"From: alerts@example.com\r\n\
Subject: Alert\r\n\
Content-Type: text/html\r\n\
\r\n\
<html><body><p>Disk <b>full</b></p><p>on db1</p></body></html>\r\n";
        let body = decode_message(1, raw).body;
        assert!(body.contains("Disk"));
        assert!(body.contains("db1"));
        assert!(!body.contains('<'));
    }

    #[test]
    fn test_missing_headers_are_empty() {
        let msg = decode_message(5, b"\r\njust a body\r\n");
        assert_eq!(msg.uid, Uid(5));
        assert_eq!(msg.sender, "");
        assert_eq!(msg.subject, "");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
        assert_eq!(
            strip_html(r#"<a href="https://example.com">Link</a> text"#),
            "Link text"
        );
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
        assert_eq!(strip_html(""), "");
    }
}
