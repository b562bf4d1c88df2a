//! RFC 5322 header handling: unfolding, encoded-words (RFC 2047),
//! display normalization, and date parsing.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Canonical `Date:` format. [`DatePolicy::Strict`] accepts nothing else.
pub const FIXED_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Base64 engine that tolerates missing padding and stray trailing bits,
/// both common in real mail.
pub(crate) const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// How much of an encoded header is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderMode {
    /// Decode every encoded-word and keep the surrounding text.
    #[default]
    Full,
    /// Keep only the first segment, dropping everything after it.
    FirstSegment,
}

/// What to do with a `Date:` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatePolicy {
    /// Try a list of known formats; unknown dates become a sentinel.
    #[default]
    Lenient,
    /// Accept only [`FIXED_DATE_FORMAT`]; anything else is fatal.
    Strict,
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    // Strip BOM if present
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold a raw header value: continuation lines are trimmed and joined
/// with single spaces.
pub fn unfold(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a raw header value for display.
pub fn decode_header(raw: &str, mode: HeaderMode) -> String {
    match mode {
        HeaderMode::Full => decode_encoded_words(raw),
        HeaderMode::FirstSegment => decode_first_segment(raw),
    }
}

/// Decode all RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Malformed encoded-words are kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    split_segments(input).iter().map(Segment::decode).collect()
}

/// Decode only the first segment of a header value.
///
/// `"=?UTF-8?Q?Caf=C3=A9?= and more"` → `"Café"`; `"Re: =?UTF-8?Q?x?="` → `"Re: "`.
pub fn decode_first_segment(input: &str) -> String {
    split_segments(input)
        .first()
        .map(Segment::decode)
        .unwrap_or_default()
}

/// Replace every whitespace character with `_`. Everything else, including
/// non-ASCII text, passes through untouched.
///
/// The ASCII information separators U+001C..U+001F count as whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if is_space(c) { '_' } else { c })
        .collect()
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// A run of plain text, or of one or more adjacent encoded-words sharing a charset.
#[derive(Debug, PartialEq)]
enum Segment {
    Plain(String),
    Encoded { charset: String, bytes: Vec<u8> },
}

impl Segment {
    fn decode(&self) -> String {
        match self {
            Segment::Plain(text) => text.clone(),
            Segment::Encoded { charset, bytes } => decode_charset(charset, bytes),
        }
    }
}

fn split_segments(input: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut remaining = input;
    let mut plain = String::new();

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        let after_start = &remaining[start + 2..];

        let Some(word) = try_decode_one_word(after_start) else {
            plain.push_str(before);
            plain.push_str("=?");
            remaining = after_start;
            continue;
        };

        plain.push_str(before);
        let last_was_encoded = matches!(segments.last(), Some(Segment::Encoded { .. }));
        // Whitespace between two encoded-words is not part of the text (RFC 2047 §6.2)
        if !(last_was_encoded && plain.trim().is_empty()) && !plain.is_empty() {
            segments.push(Segment::Plain(std::mem::take(&mut plain)));
        }
        plain.clear();

        remaining = &after_start[word.consumed..];
        let merged = match segments.last_mut() {
            Some(Segment::Encoded { charset, bytes })
                if charset.eq_ignore_ascii_case(&word.charset) =>
            {
                bytes.extend_from_slice(&word.bytes);
                true
            }
            _ => false,
        };
        if !merged {
            segments.push(Segment::Encoded {
                charset: word.charset,
                bytes: word.bytes,
            });
        }
    }

    plain.push_str(remaining);
    if !plain.is_empty() {
        segments.push(Segment::Plain(plain));
    }
    segments
}

struct EncodedWord {
    charset: String,
    bytes: Vec<u8>,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<EncodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => LENIENT_BASE64.decode(encoded_text.trim()).ok()?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    Some(EncodedWord {
        charset: charset.to_string(),
        bytes,
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => match bytes.get(i + 1..i + 3).and_then(|h| hex_pair(h[0], h[1])) {
                Some(byte) => {
                    result.push(byte);
                    i += 3;
                }
                None => {
                    result.push(b'=');
                    i += 1;
                }
            },
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode two ASCII hex digits (either case) into a byte.
pub(crate) fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Decode bytes using a named charset. Undecodable sequences become U+FFFD.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.trim().to_lowercase();
    match charset_lower.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Parse a `Date:` header according to `policy`.
///
/// The calendar date keeps the header's own UTC offset.
pub fn parse_date(date_str: &str, policy: DatePolicy) -> Option<DateTime<FixedOffset>> {
    match policy {
        DatePolicy::Strict => parse_date_strict(date_str),
        DatePolicy::Lenient => parse_date_lenient(date_str),
    }
}

/// Parse a date in exactly [`FIXED_DATE_FORMAT`].
///
/// The day-of-week name must be present but is not cross-checked against
/// the date.
pub fn parse_date_strict(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    if let Ok(dt) = DateTime::parse_from_str(trimmed, FIXED_DATE_FORMAT) {
        return Some(dt);
    }
    let (dow, rest) = trimmed.split_once(", ")?;
    if !WEEKDAYS.iter().any(|d| d.eq_ignore_ascii_case(dow)) {
        return None;
    }
    DateTime::parse_from_str(rest.trim(), "%d %b %Y %H:%M:%S %z").ok()
}

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parse an email date string in various common formats.
///
/// The fixed format comes first, then RFC 2822, ISO 8601, and many broken
/// real-world variants. Dates without a zone are taken as UTC.
pub fn parse_date_lenient(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = strip_comment(date_str.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Some(dt) = parse_date_strict(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let no_dow = strip_day_of_week(trimmed);
    let imap = normalize_imap_date(&no_dow);
    let utc = FixedOffset::east_opt(0)?;

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    let candidates = [
        replace_named_tz(&no_dow),
        replace_named_tz(&imap),
        no_dow,
        imap,
    ];
    for candidate in &candidates {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt);
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(utc.from_utc_datetime(&ndt));
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt).ok()
}

/// Drop a trailing `(comment)`, e.g. `"... +0000 (UTC)"`.
fn strip_comment(s: &str) -> &str {
    match s.rfind('(') {
        Some(pos) if s.ends_with(')') => s[..pos].trim_end(),
        _ => s,
    }
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let Some((day, rest)) = s.split_once('-') else {
        return s.to_string();
    };
    let Some((month, rest)) = rest.split_once('-') else {
        return s.to_string();
    };
    if !day.chars().all(|c| c.is_ascii_digit()) {
        return s.to_string();
    }
    match MONTHS.iter().find(|m| m.eq_ignore_ascii_case(month)) {
        Some(m) => format!("{day} {m} {rest}"),
        None => s.to_string(),
    }
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    for day in WEEKDAYS {
        if let Some(rest) = s.strip_prefix(day) {
            if rest.starts_with(',') || rest.starts_with(' ') {
                return rest.trim_start_matches(',').trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("UT", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in &tzs {
        if let Some(head) = s.strip_suffix(name) {
            if head.ends_with(' ') {
                return format!("{head}{offset}");
            }
        }
    }
    s.to_string()
}
