//! Conversion pipeline: archive → raw records → messages → documents → files.
//!
//! Records are read sequentially. With `jobs > 1` each batch is parsed and
//! decoded on a rayon pool; documents are then written one at a time in
//! archive order, so colliding filenames resolve exactly as in a
//! sequential run.

use std::path::Path;

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MboxError, Result};
use crate::export::document::{write_document, WriteOutcome, WritePolicy};
use crate::model::document::Document;
use crate::parser::body::BodyMode;
use crate::parser::header::{DatePolicy, HeaderMode};
use crate::parser::mbox::{MboxReader, RawMessage, MAX_MESSAGE_SIZE, READ_BUFFER_SIZE};
use crate::parser::message::parse_message;

/// Default cap on the subject part of a filename, in characters.
pub const DEFAULT_MAX_SUBJECT_LEN: usize = 120;

/// Default number of records handed to the worker pool at once.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// What to do with a record that cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Log it and continue with the next record.
    #[default]
    Skip,
    /// Stop the run.
    Abort,
}

/// Knobs for a conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub header_mode: HeaderMode,
    pub body_mode: BodyMode,
    pub date_policy: DatePolicy,
    pub write_policy: WritePolicy,
    pub on_parse_error: ErrorPolicy,
    /// Worker threads; `1` converts strictly one message at a time.
    pub jobs: usize,
    pub max_subject_len: usize,
    pub batch_size: usize,
    pub read_buffer_size: usize,
    pub max_message_size: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            header_mode: HeaderMode::default(),
            body_mode: BodyMode::default(),
            date_policy: DatePolicy::default(),
            write_policy: WritePolicy::default(),
            on_parse_error: ErrorPolicy::default(),
            jobs: 1,
            max_subject_len: DEFAULT_MAX_SUBJECT_LEN,
            batch_size: DEFAULT_BATCH_SIZE,
            read_buffer_size: READ_BUFFER_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl ConvertOptions {
    /// Switch to first-segment header decoding and QP on every body.
    pub fn legacy_decoding(self) -> Self {
        Self {
            header_mode: HeaderMode::FirstSegment,
            body_mode: BodyMode::Legacy,
            ..self
        }
    }
}

/// Per-message notification, delivered in archive order.
#[derive(Debug)]
pub enum ConvertEvent<'a> {
    Converted {
        /// 1-based position in the archive.
        index: usize,
        outcome: &'a WriteOutcome,
    },
    /// A record was dropped under [`ErrorPolicy::Skip`].
    Failed { index: usize, error: &'a MboxError },
}

/// How far through the archive the reader is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub bytes_read: u64,
    pub total_bytes: u64,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvertStats {
    pub messages: usize,
    pub written: usize,
    pub skipped_existing: usize,
    pub failed: usize,
}

/// Parse one raw record and turn it into a [`Document`].
pub fn convert_message(raw: &[u8], options: &ConvertOptions) -> Result<Document> {
    let message = parse_message(raw)?;
    Document::from_message(&message, options)
}

/// Convert every message of `mbox_path` into a document under `output_dir`.
///
/// Archive-level failures abort before any message is converted. A
/// malformed record is skipped or aborts the run according to
/// `options.on_parse_error`; date and I/O failures always abort.
pub fn convert_archive(
    mbox_path: &Path,
    output_dir: &Path,
    options: &ConvertOptions,
    on_event: &mut dyn FnMut(ConvertEvent<'_>, Progress),
) -> anyhow::Result<ConvertStats> {
    let mut reader =
        MboxReader::with_limits(mbox_path, options.read_buffer_size, options.max_message_size)?;
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    info!(
        path = %mbox_path.display(),
        output = %output_dir.display(),
        jobs = options.jobs,
        "Converting archive"
    );

    let pool = if options.jobs > 1 {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(options.jobs)
                .build()
                .context("Failed to start worker pool")?,
        )
    } else {
        None
    };
    // Sequential runs must stop before touching the record after a failure.
    let batch_size = if pool.is_some() {
        options.batch_size.max(1)
    } else {
        1
    };

    let mut stats = ConvertStats::default();
    let mut batch: Vec<(usize, RawMessage)> = Vec::with_capacity(batch_size);
    let mut index = 0;

    while let Some(record) = reader.next() {
        index += 1;
        batch.push((index, record?));
        if batch.len() >= batch_size {
            let progress = Progress {
                bytes_read: reader.bytes_read(),
                total_bytes: reader.file_size(),
            };
            run_batch(&mut batch, output_dir, options, pool.as_ref(), progress, &mut stats, on_event)?;
        }
    }
    let progress = Progress {
        bytes_read: reader.bytes_read(),
        total_bytes: reader.file_size(),
    };
    run_batch(&mut batch, output_dir, options, pool.as_ref(), progress, &mut stats, on_event)?;

    info!(
        messages = stats.messages,
        written = stats.written,
        failed = stats.failed,
        "Conversion finished"
    );
    Ok(stats)
}

fn run_batch(
    batch: &mut Vec<(usize, RawMessage)>,
    output_dir: &Path,
    options: &ConvertOptions,
    pool: Option<&rayon::ThreadPool>,
    progress: Progress,
    stats: &mut ConvertStats,
    on_event: &mut dyn FnMut(ConvertEvent<'_>, Progress),
) -> anyhow::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let convert = |(index, raw): &(usize, RawMessage)| -> (usize, Result<Document>) {
        debug!(index, offset = raw.offset, "Converting message");
        (*index, convert_message(&raw.data, options))
    };

    let documents: Vec<(usize, Result<Document>)> = match pool {
        Some(pool) => pool.install(|| batch.par_iter().map(&convert).collect()),
        None => batch.iter().map(&convert).collect(),
    };
    batch.clear();

    let results = documents.into_iter().map(|(index, document)| {
        let result = document.and_then(|doc| {
            write_document(&doc, output_dir, options.write_policy, options.max_subject_len)
        });
        (index, result.map_err(|e| MboxError::at(index, e)))
    });

    for (index, result) in results {
        stats.messages += 1;
        match result {
            Ok(outcome) => {
                if outcome.is_written() {
                    stats.written += 1;
                } else {
                    stats.skipped_existing += 1;
                }
                on_event(ConvertEvent::Converted { index, outcome: &outcome }, progress);
            }
            Err(error) if !error.is_fatal() && options.on_parse_error == ErrorPolicy::Skip => {
                warn!(index, error = %error, "Skipping message");
                stats.failed += 1;
                on_event(ConvertEvent::Failed { index, error: &error }, progress);
            }
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_message_round_trip() {
        let raw = b"From a@b Mon Jan 01 10:00:00 2024\n\
Date: Mon, 01 Jan 2024 10:00:00 +0000\nSubject: Hello World\n\nLine1\n\n\n\nLine2";
        let options = ConvertOptions::default();
        let doc = convert_message(raw, &options).unwrap();
        assert_eq!(
            crate::export::document::document_filename(&doc, options.max_subject_len),
            "20240101_Hello_World.md"
        );
        assert_eq!(doc.body.as_deref(), Some("Line1\n\nLine2"));
    }

    #[test]
    fn test_legacy_decoding_keeps_other_options() {
        let options = ConvertOptions {
            date_policy: DatePolicy::Strict,
            write_policy: WritePolicy::Rename,
            jobs: 3,
            ..ConvertOptions::default()
        }
        .legacy_decoding();
        assert_eq!(options.header_mode, HeaderMode::FirstSegment);
        assert_eq!(options.body_mode, BodyMode::Legacy);
        assert_eq!(options.date_policy, DatePolicy::Strict);
        assert_eq!(options.write_policy, WritePolicy::Rename);
        assert_eq!(options.jobs, 3);
    }

    #[test]
    fn test_legacy_decoding_first_segment_only() {
        let raw = b"Date: Mon, 01 Jan 2024 10:00:00 +0000
Subject: =?UTF-8?Q?Caf=C3=A9?= tail

body
";
        let full = convert_message(raw, &ConvertOptions::default()).unwrap();
        let legacy = convert_message(raw, &ConvertOptions::default().legacy_decoding()).unwrap();
        assert_eq!(full.subject, "Café_tail");
        assert_eq!(legacy.subject, "Café");
    }
}
