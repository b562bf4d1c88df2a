//! Streaming MBOX reader.
//!
//! Reads MBOX files line-by-line through a large buffer and yields one raw
//! record per message. Never loads the entire file into memory. Tolerant of
//! malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MboxError, Result};

/// Size of the internal read buffer (1 MB for fast sequential reads on modern SSDs).
pub const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// One message exactly as it appears in the archive, `From ` line included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Byte offset of the `From ` separator line inside the MBOX file.
    pub offset: u64,
    /// Raw bytes of the record.
    pub data: Vec<u8>,
}

/// Lazy, forward-only iterator over the records of an MBOX file.
///
/// The reader is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
pub struct MboxReader {
    path: PathBuf,
    reader: BufReader<File>,
    file_size: u64,
    max_message_size: usize,
    bytes_read: u64,
    pending: Option<RawMessage>,
    truncated: bool,
    prev_line_was_empty: bool,
    line_buf: Vec<u8>,
    done: bool,
}

impl MboxReader {
    /// Open an MBOX file with the default buffer and message size limits.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_limits(path, READ_BUFFER_SIZE, MAX_MESSAGE_SIZE)
    }

    /// Open an MBOX file with explicit limits.
    ///
    /// Reads up to the first non-blank line to check that the file starts
    /// with a `From ` separator. An empty (or all-blank) file is accepted and
    /// yields no records.
    pub fn with_limits(
        path: impl AsRef<Path>,
        read_buffer_size: usize,
        max_message_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MboxError::FileNotFound(path.clone())
            } else {
                MboxError::io(&path, e)
            }
        })?;
        if metadata.is_dir() {
            return Err(MboxError::InvalidMbox(path));
        }

        let file = File::open(&path).map_err(|e| MboxError::io(&path, e))?;
        let mut mbox = Self {
            reader: BufReader::with_capacity(read_buffer_size.max(4096), file),
            file_size: metadata.len(),
            max_message_size,
            bytes_read: 0,
            pending: None,
            truncated: false,
            prev_line_was_empty: true,
            line_buf: Vec::with_capacity(4096),
            done: false,
            path,
        };

        // Skip leading blank lines; the first real line must be a separator.
        loop {
            let offset = mbox.bytes_read;
            if !mbox.read_line()? {
                mbox.done = true;
                break;
            }
            if is_blank_line(&mbox.line_buf) {
                continue;
            }
            if !is_mbox_separator(&mbox.line_buf) {
                return Err(MboxError::InvalidMbox(mbox.path));
            }
            mbox.start_message(offset);
            break;
        }

        debug!(path = %mbox.path.display(), size = mbox.file_size, "Opened MBOX");
        Ok(mbox)
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Path to the MBOX file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next line into `line_buf`. Returns `false` at EOF.
    fn read_line(&mut self) -> Result<bool> {
        self.line_buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.line_buf)
            .map_err(|e| MboxError::io(&self.path, e))?;
        self.bytes_read += n as u64;
        Ok(n > 0)
    }

    /// Begin a new record with the separator line currently in `line_buf`.
    fn start_message(&mut self, offset: u64) -> Option<RawMessage> {
        let mut data = Vec::with_capacity(64 * 1024);
        data.extend_from_slice(&self.line_buf);
        self.truncated = false;
        self.prev_line_was_empty = false;
        self.pending.replace(RawMessage { offset, data })
    }

    fn append_line(&mut self) {
        let Some(msg) = self.pending.as_mut() else {
            return;
        };
        if msg.data.len() + self.line_buf.len() <= self.max_message_size {
            msg.data.extend_from_slice(&self.line_buf);
        } else if !self.truncated {
            warn!(
                offset = msg.offset,
                max_size = self.max_message_size,
                "Message exceeds maximum size, truncating body"
            );
            self.truncated = true;
        }
    }
}

impl Iterator for MboxReader {
    type Item = Result<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return self.pending.take().map(Ok);
        }

        loop {
            let offset = self.bytes_read;
            match self.read_line() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return self.pending.take().map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    self.pending = None;
                    return Some(Err(e));
                }
            }

            if is_mbox_separator(&self.line_buf) {
                if self.prev_line_was_empty {
                    // The blank line before a separator belongs to the container.
                    if let Some(msg) = self.pending.as_mut() {
                        strip_trailing_newline(&mut msg.data);
                    }
                } else {
                    warn!(
                        offset = offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if let Some(finished) = self.start_message(offset) {
                    return Some(Ok(finished));
                }
                continue;
            }

            self.prev_line_was_empty = is_blank_line(&self.line_buf);
            self.append_line();
        }
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    // Skip BOM if present at very start
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

/// Drop one trailing `\n` or `\r\n`.
fn strip_trailing_newline(data: &mut Vec<u8>) {
    if data.ends_with(b"\r\n") {
        data.truncate(data.len() - 2);
    } else if data.ends_with(b"\n") {
        data.truncate(data.len() - 1);
    }
}
