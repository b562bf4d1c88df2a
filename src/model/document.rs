//! The per-message output unit.

use chrono::NaiveDate;
use tracing::warn;

use crate::convert::ConvertOptions;
use crate::error::{MboxError, Result};
use crate::model::message::Message;
use crate::parser::body::select_body;
use crate::parser::header::{decode_header, normalize, parse_date, DatePolicy};

/// Display text used when a header is absent.
const UNTITLED: &str = "Untitled";
const UNKNOWN: &str = "Unknown";

/// One Markdown document, ready to be written.
///
/// The four metadata strings are decoded and normalized (whitespace
/// replaced by `_`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    /// Calendar date of the `Date:` header in its own offset.
    /// `None` when the date could not be parsed under the lenient policy.
    pub date_stamp: Option<NaiveDate>,
    /// Decoded body text; `None` when no plain-text part exists.
    pub body: Option<String>,
}

impl Document {
    /// Decode headers and body of `message` into a document.
    ///
    /// Under [`DatePolicy::Strict`] a missing or unparsable `Date:` header
    /// is an error.
    pub fn from_message(message: &Message, options: &ConvertOptions) -> Result<Self> {
        let display = |name: &str, default: &str| {
            let raw = message.headers.get(name).unwrap_or(default);
            normalize(&decode_header(raw, options.header_mode))
        };

        let raw_date = message.headers.get("date");
        let date_stamp = match raw_date.and_then(|d| parse_date(d, options.date_policy)) {
            Some(dt) => Some(dt.date_naive()),
            None if options.date_policy == DatePolicy::Strict => {
                return Err(MboxError::DateParse {
                    value: raw_date.unwrap_or(UNKNOWN).to_string(),
                });
            }
            None => {
                warn!(date = raw_date.unwrap_or(""), "Date unknown, using sentinel");
                None
            }
        };

        Ok(Self {
            subject: display("subject", UNTITLED),
            from: display("from", UNKNOWN),
            to: display("to", UNKNOWN),
            date: display("date", UNKNOWN),
            date_stamp,
            body: select_body(message, options.body_mode),
        })
    }

    /// Render the file contents: metadata lines, a blank line, then the body.
    pub fn render(&self) -> String {
        let mut content = String::new();
        content.push_str(&format!("Subject: {}\n", self.subject));
        content.push_str(&format!("From: {}\n", self.from));
        content.push_str(&format!("To: {}\n", self.to));
        content.push_str(&format!("Date: {}\n\n", self.date));
        if let Some(body) = &self.body {
            content.push_str(body);
        }
        content
    }
}
