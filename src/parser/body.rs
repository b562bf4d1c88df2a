//! Body selection and decoding: pick the plain-text part, undo the
//! transfer encoding, convert the charset, and tidy blank lines.

use std::sync::LazyLock;

use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::message::{Body, Message};
use crate::parser::header::{decode_charset, hex_pair, LENIENT_BASE64};

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// How the transfer encoding of the selected part is undone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyMode {
    /// Follow the declared `Content-Transfer-Encoding`.
    #[default]
    Declared,
    /// Quoted-printable decode every payload, whatever it declares.
    Legacy,
}

/// Return the text to embed in the document, if any.
///
/// A single-payload message is always used. For multipart messages the
/// first direct part of type `text/plain` wins; without one there is no
/// body.
pub fn select_body(message: &Message, mode: BodyMode) -> Option<String> {
    match &message.body {
        Body::Single(payload) => Some(decode_part(message, payload, mode)),
        Body::Multipart(parts) => parts
            .iter()
            .find(|part| part.content_type.is("text/plain"))
            .and_then(|part| match &part.body {
                Body::Single(payload) => Some(decode_part(part, payload, mode)),
                Body::Multipart(_) => None,
            }),
    }
}

fn decode_part(part: &Message, payload: &[u8], mode: BodyMode) -> String {
    let bytes = match mode {
        BodyMode::Legacy => decode_quoted_printable(payload),
        BodyMode::Declared => match part.transfer_encoding().as_deref() {
            Some("quoted-printable") => decode_quoted_printable(payload),
            Some("base64") => decode_base64(payload),
            _ => payload.to_vec(),
        },
    };
    let text = decode_charset(part.charset().unwrap_or("utf-8"), &bytes);
    clean_newlines(&text)
}

/// Decode quoted-printable content.
///
/// `=XX` becomes the byte `0xXX`; `=` followed by optional blanks and a line
/// end (or the end of input) is a soft line break and disappears. Anything
/// else, including a stray `=`, is copied through.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] != b'=' {
            out.push(input[i]);
            i += 1;
            continue;
        }

        if let Some(byte) = input.get(i + 1..i + 3).and_then(|h| hex_pair(h[0], h[1])) {
            out.push(byte);
            i += 3;
            continue;
        }

        let mut j = i + 1;
        while j < input.len() && matches!(input[j], b' ' | b'\t') {
            j += 1;
        }
        match input.get(j..(j + 2).min(input.len())) {
            Some([]) => i = j,
            Some([b'\n', ..]) => i = j + 1,
            Some([b'\r', b'\n']) => i = j + 2,
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

/// Decode a base64 body, ignoring line breaks. Undecodable input is kept as is.
fn decode_base64(input: &[u8]) -> Vec<u8> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    match LENIENT_BASE64.decode(&compact) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Invalid base64 body, keeping encoded text");
            input.to_vec()
        }
    }
}

/// Collapse runs of three or more newlines into exactly two.
///
/// CRLF line endings are converted to LF first.
pub fn clean_newlines(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    EXCESS_NEWLINES.replace_all(&text, "\n\n").into_owned()
}
