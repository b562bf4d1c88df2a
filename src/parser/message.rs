//! Raw record → [`Message`]: header block, content type, and MIME part tree.
//!
//! Structure comes from `mail-parser`. Header values and part payloads are
//! sliced from the raw record and kept in their encoded form; decoding is
//! left to [`crate::parser::header`] and [`crate::parser::body`].

use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::warn;

use crate::error::{MboxError, Result};
use crate::model::message::{Body, ContentType, Headers, Message};
use crate::parser::header::{decode_header_bytes, unfold};

/// Maximum depth for recursive multipart parsing (to prevent stack overflow on adversarial input).
const MAX_DEPTH: usize = 10;

/// Parse one raw MBOX record (or a bare RFC 5322 message) into a [`Message`].
///
/// Fails with [`MboxError::Malformed`] only when the record has no header
/// fields at all. A multipart without a usable boundary keeps its body as a
/// single payload.
pub fn parse_message(raw: &[u8]) -> Result<Message> {
    let data = skip_from_line(raw);
    let parsed = MessageParser::default()
        .parse(data)
        .ok_or_else(|| MboxError::Malformed("no header fields found".into()))?;

    let message = build_part(&parsed, 0, &ContentType::text_plain(), 0)?;
    if message.headers.is_empty() {
        return Err(MboxError::Malformed("no header fields found".into()));
    }
    Ok(message)
}

fn build_part(
    parsed: &mail_parser::Message<'_>,
    id: usize,
    default_type: &ContentType,
    depth: usize,
) -> Result<Message> {
    let raw: &[u8] = parsed.raw_message.as_ref();
    let part = parsed
        .parts
        .get(id)
        .ok_or_else(|| MboxError::Malformed(format!("MIME part {id} missing")))?;

    let headers = Headers::new(
        part.headers
            .iter()
            .map(|h| {
                let value = raw.get(h.offset_start..h.offset_end).unwrap_or_default();
                (
                    h.name.to_string().to_ascii_lowercase(),
                    unfold(&decode_header_bytes(value)),
                )
            })
            .collect(),
    );
    let content_type = content_type_of(part).unwrap_or_else(|| default_type.clone());

    let body = match &part.body {
        PartType::Multipart(ids) if depth < MAX_DEPTH => {
            let child_default = if content_type.is("multipart/digest") {
                ContentType::new("message/rfc822")
            } else {
                ContentType::text_plain()
            };
            let parts = ids
                .iter()
                .map(|&child| build_part(parsed, child, &child_default, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            Body::Multipart(parts)
        }
        PartType::Multipart(_) => {
            warn!(depth, "Multipart nesting too deep, keeping part as a single payload");
            Body::Single(raw_body(raw, part).to_vec())
        }
        _ => Body::Single(raw_body(raw, part).to_vec()),
    };

    Ok(Message {
        headers,
        content_type,
        body,
    })
}

/// Declared content type of a part, or `None` when absent or lacking a subtype.
fn content_type_of(part: &MessagePart<'_>) -> Option<ContentType> {
    let ct = part.content_type()?;
    let subtype = ct.subtype()?;
    let params = ct
        .attributes()
        .unwrap_or_default()
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
        .collect();
    Some(ContentType {
        mime_type: format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase(),
        params,
    })
}

/// Still-encoded payload of a part.
fn raw_body<'a>(raw: &'a [u8], part: &MessagePart<'_>) -> &'a [u8] {
    raw.get(part.offset_body..part.offset_end).unwrap_or_default()
}

/// Skip the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    // Handle BOM
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        return match data.iter().position(|&b| b == b'\n') {
            Some(pos) => &data[pos + 1..],
            None => &[],
        };
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(msg: &Message) -> &[u8] {
        match &msg.body {
            Body::Single(payload) => payload,
            Body::Multipart(_) => panic!("expected a single payload"),
        }
    }

    fn parts(msg: &Message) -> &[Message] {
        match &msg.body {
            Body::Multipart(parts) => parts,
            Body::Single(_) => panic!("expected multipart body"),
        }
    }

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let bare = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(bare), bare);
    }

    #[test]
    fn test_parse_simple_message_keeps_raw_headers() {
        let raw = b"From x@y Mon Jan 01 10:00:00 2024\n\
Subject: =?UTF-8?Q?Caf=C3=A9?=\nFrom: A <a@b.com>\nX-Long: first\n\tsecond\n\nHello\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.headers.get("subject"), Some("=?UTF-8?Q?Caf=C3=A9?="));
        assert_eq!(msg.headers.get("From"), Some("A <a@b.com>"));
        assert_eq!(msg.headers.get("x-long"), Some("first second"));
        assert!(msg.content_type.is("text/plain"));
        assert_eq!(single(&msg), b"Hello\n");
    }

    #[test]
    fn test_parse_crlf_message() {
        let raw = b"Subject: Hi\r\nContent-Type: text/plain; charset=\"ISO-8859-1\"\r\n\r\nBody\r\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.headers.get("subject"), Some("Hi"));
        assert_eq!(msg.charset().map(str::to_ascii_lowercase).as_deref(), Some("iso-8859-1"));
        assert_eq!(single(&msg), b"Body\r\n");
    }

    #[test]
    fn test_parse_multipart() {
        let raw = b"Subject: mp\nContent-Type: multipart/alternative; boundary=\"XX\"\n\n\
preamble\n--XX\nContent-Type: text/html\n\n<p>hi</p>\n--XX\n\nplain hi\n--XX--\nepilogue\n";
        let msg = parse_message(raw).unwrap();
        let parts = parts(&msg);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].content_type.is("text/html"));
        assert_eq!(single(&parts[0]), b"<p>hi</p>");
        // No Content-Type: defaults to text/plain
        assert!(parts[1].content_type.is("text/plain"));
        assert_eq!(single(&parts[1]), b"plain hi");
    }

    #[test]
    fn test_parse_keeps_transfer_encoded_payload() {
        let raw = b"Subject: qp\nContent-Type: multipart/mixed; boundary=b\n\n\
--b\nContent-Type: text/plain\nContent-Transfer-Encoding: quoted-printable\n\ncaf=C3=A9 =\nau lait\n--b--\n";
        let msg = parse_message(raw).unwrap();
        let part = &parts(&msg)[0];
        assert_eq!(part.transfer_encoding().as_deref(), Some("quoted-printable"));
        assert_eq!(single(part), b"caf=C3=A9 =\nau lait");
    }

    #[test]
    fn test_parse_nested_multipart() {
        let raw = b"Subject: nested\nContent-Type: multipart/mixed; boundary=outer\n\n\
--outer\nContent-Type: multipart/alternative; boundary=inner\n\n\
--inner\nContent-Type: text/plain\n\ndeep\n--inner--\n\
--outer\nContent-Type: application/pdf\n\nPDF\n--outer--\n";
        let msg = parse_message(raw).unwrap();
        let outer = parts(&msg);
        assert_eq!(outer.len(), 2);
        let inner = parts(&outer[0]);
        assert_eq!(single(&inner[0]), b"deep");
        assert!(outer[1].content_type.is("application/pdf"));
    }

    #[test]
    fn test_missing_closing_delimiter() {
        let raw = b"Subject: open\nContent-Type: multipart/mixed; boundary=b\n\n--b\n\ntext\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(single(&parts(&msg)[0]), b"text\n");
    }

    #[test]
    fn test_multipart_without_usable_boundary_is_single_payload() {
        let msg = parse_message(b"Subject: x\nContent-Type: multipart/mixed\n\nbody text\n").unwrap();
        assert_eq!(single(&msg), b"body text\n");

        let msg = parse_message(
            b"Subject: x\nContent-Type: multipart/mixed; boundary=zz\n\nbody text\n",
        )
        .unwrap();
        assert_eq!(single(&msg), b"body text\n");
    }

    #[test]
    fn test_records_without_headers_are_malformed() {
        for raw in [&b"From x@y\n\njust a body\n"[..], b"", b"From x@y\n"] {
            assert!(matches!(parse_message(raw), Err(MboxError::Malformed(_))));
        }
    }
}
