//! Write documents as `<YYYYMMDD>_<subject>.md` files.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MboxError, Result};
use crate::model::document::Document;

/// Filename prefix for documents whose date could not be parsed.
pub const UNKNOWN_DATE_PREFIX: &str = "undated";

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Keep the existing file and drop the new document.
    Skip,
    /// Write to the first free `name_N.md`.
    Rename,
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "skip" | "skip-existing" => Ok(Self::Skip),
            "rename" => Ok(Self::Rename),
            other => Err(format!(
                "unknown write policy '{other}' (expected overwrite, skip or rename)"
            )),
        }
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::Rename => "rename",
        };
        f.write_str(name)
    }
}

/// Result of a single write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    /// The target existed and [`WritePolicy::Skip`] left it alone.
    Skipped(PathBuf),
}

impl WriteOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(p) | Self::Skipped(p) => p,
        }
    }

    /// Final component of the path.
    pub fn filename(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Filename stem (no extension) for a document.
///
/// Format: `{YYYYMMDD}_{subject}`, or `undated_{subject}` without a date.
pub fn document_stem(doc: &Document, max_subject_len: usize) -> String {
    let date = doc
        .date_stamp
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_else(|| UNKNOWN_DATE_PREFIX.to_string());
    format!("{date}_{}", sanitize_filename_part(&doc.subject, max_subject_len))
}

/// Full filename for a document: [`document_stem`] plus `.md`.
pub fn document_filename(doc: &Document, max_subject_len: usize) -> String {
    format!("{}.md", document_stem(doc, max_subject_len))
}

/// Sanitize a string for use in filenames.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`, then the result is
/// cut to `max_len` characters. An empty input stays empty.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect()
}

/// Write `doc` into `output_dir` (created if missing) following `policy`.
pub fn write_document(
    doc: &Document,
    output_dir: &Path,
    policy: WritePolicy,
    max_subject_len: usize,
) -> Result<WriteOutcome> {
    std::fs::create_dir_all(output_dir).map_err(|e| MboxError::io(output_dir, e))?;

    let stem = document_stem(doc, max_subject_len);
    let path = output_dir.join(format!("{stem}.md"));
    let content = doc.render();

    match policy {
        WritePolicy::Overwrite => {
            std::fs::write(&path, content).map_err(|e| MboxError::io(&path, e))?;
            Ok(WriteOutcome::Written(path))
        }
        WritePolicy::Skip => {
            if create_exclusive(&path, &content)? {
                Ok(WriteOutcome::Written(path))
            } else {
                debug!(path = %path.display(), "Target exists, skipping");
                Ok(WriteOutcome::Skipped(path))
            }
        }
        WritePolicy::Rename => {
            let mut candidate = path;
            let mut n: u32 = 0;
            while !create_exclusive(&candidate, &content)? {
                n += 1;
                candidate = output_dir.join(format!("{stem}_{n}.md"));
            }
            if n > 0 {
                debug!(path = %candidate.display(), "Target existed, renamed");
            }
            Ok(WriteOutcome::Written(candidate))
        }
    }
}

/// Create `path` only if it does not exist yet. Returns `false` if it did.
fn create_exclusive(path: &Path, content: &str) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(content.as_bytes())
                .map_err(|e| MboxError::io(path, e))?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(MboxError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(subject: &str, body: &str) -> Document {
        Document {
            subject: subject.to_string(),
            from: "a@b.com".into(),
            to: "c@d.com".into(),
            date: "Mon,_01_Jan_2024_10:00:00_+0000".into(),
            date_stamp: NaiveDate::from_ymd_opt(2024, 1, 1),
            body: Some(body.to_string()),
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename_part("Hello_World", 120), "Hello_World");
        assert_eq!(sanitize_filename_part("a/b\\c:d*e.f", 20), "a_b_c_d_e_f");
        assert_eq!(sanitize_filename_part("Café_crème", 20), "Caf__cr_me");
        assert_eq!(sanitize_filename_part("Re:_[list]_x-y", 20), "Re___list__x-y");
        assert_eq!(sanitize_filename_part("", 20), "");
        assert_eq!(sanitize_filename_part("abcdef", 3), "abc");
    }

    #[test]
    fn test_sanitized_names_use_safe_alphabet() {
        for subject in ["Hello World", "¿Qué tal?", "日本語", "a\u{0}b", "..//..", "x\ty"] {
            let part = sanitize_filename_part(subject, 120);
            assert!(part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }

    #[test]
    fn test_document_filename() {
        assert_eq!(
            document_filename(&sample("Hello_World", ""), 120),
            "20240101_Hello_World.md"
        );
        let mut undated = sample("Hello_World", "");
        undated.date_stamp = None;
        assert_eq!(document_filename(&undated, 120), "undated_Hello_World.md");
    }

    #[test]
    fn test_write_policy_from_str() {
        assert_eq!("overwrite".parse::<WritePolicy>(), Ok(WritePolicy::Overwrite));
        assert_eq!("SKIP".parse::<WritePolicy>(), Ok(WritePolicy::Skip));
        assert_eq!("rename".parse::<WritePolicy>(), Ok(WritePolicy::Rename));
        assert!("merge".parse::<WritePolicy>().is_err());
    }

    #[test]
    fn test_overwrite_replaces_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("nested").join("out");
        write_document(&sample("S", "first"), &out, WritePolicy::Overwrite, 120).unwrap();
        let outcome =
            write_document(&sample("S", "second"), &out, WritePolicy::Overwrite, 120).unwrap();
        assert!(outcome.is_written());
        assert_eq!(outcome.filename(), "20240101_S.md");
        let text = std::fs::read_to_string(outcome.path()).unwrap();
        assert!(text.ends_with("\n\nsecond"));
    }

    #[test]
    fn test_skip_keeps_existing() {
        let tmp = tempfile::tempdir().unwrap();
        write_document(&sample("S", "first"), tmp.path(), WritePolicy::Skip, 120).unwrap();
        let outcome = write_document(&sample("S", "second"), tmp.path(), WritePolicy::Skip, 120).unwrap();
        assert!(matches!(outcome, WriteOutcome::Skipped(_)));
        let text = std::fs::read_to_string(outcome.path()).unwrap();
        assert!(text.ends_with("\n\nfirst"));
    }

    #[test]
    fn test_rename_adds_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let first = write_document(&sample("S", "1"), tmp.path(), WritePolicy::Rename, 120).unwrap();
        let second = write_document(&sample("S", "2"), tmp.path(), WritePolicy::Rename, 120).unwrap();
        let third = write_document(&sample("S", "3"), tmp.path(), WritePolicy::Rename, 120).unwrap();
        assert_eq!(first.filename(), "20240101_S.md");
        assert_eq!(second.filename(), "20240101_S_1.md");
        assert_eq!(third.filename(), "20240101_S_2.md");
    }
}
