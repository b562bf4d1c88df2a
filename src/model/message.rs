//! Parsed message structure: raw headers plus a MIME body tree.

/// Header fields in wire order, names lowercased, values unfolded but still
/// encoded (RFC 2047 encoded-words are left intact).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// First value for a header name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A media type and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lowercase `type/subtype`, e.g. `"text/plain"`.
    pub mime_type: String,
    /// Parameters with lowercase names and unquoted values.
    pub params: Vec<(String, String)>,
}

impl ContentType {
    /// A content type without parameters.
    pub fn new(mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    pub fn text_plain() -> Self {
        Self::new("text/plain")
    }

    /// Value of a parameter (case-insensitive name).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, mime_type: &str) -> bool {
        self.mime_type.eq_ignore_ascii_case(mime_type)
    }
}

/// Message body: one payload, or an ordered list of sub-parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Still transfer-encoded payload bytes.
    Single(Vec<u8>),
    Multipart(Vec<Message>),
}

/// A parsed message or MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub headers: Headers,
    pub content_type: ContentType,
    pub body: Body,
}

impl Message {
    /// Lowercase `Content-Transfer-Encoding`, if declared.
    pub fn transfer_encoding(&self) -> Option<String> {
        self.headers
            .get("content-transfer-encoding")
            .map(|v| v.trim().to_lowercase())
    }

    /// Declared charset of a single-payload part.
    pub fn charset(&self) -> Option<&str> {
        self.content_type.param("charset")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_params() {
        let ct = ContentType {
            mime_type: "text/plain".into(),
            params: vec![("charset".into(), "UTF-8".into())],
        };
        assert_eq!(ct.param("Charset"), Some("UTF-8"));
        assert_eq!(ct.param("boundary"), None);
        assert!(ct.is("Text/Plain"));
        assert_eq!(ContentType::new("Message/RFC822").mime_type, "message/rfc822");
    }

    #[test]
    fn test_headers_first_value_wins() {
        let headers = Headers::new(vec![
            ("received".into(), "one".into()),
            ("subject".into(), "Hi".into()),
            ("received".into(), "two".into()),
        ]);
        assert_eq!(headers.get("Received"), Some("one"));
        assert_eq!(headers.get("to"), None);
        assert!(!headers.is_empty());
    }
}
