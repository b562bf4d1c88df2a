//! `mboxmd` — convert MBOX archives into one Markdown document per message.
//!
//! The pipeline reads raw records from the archive, parses each into
//! headers and a MIME tree, decodes the headers and the plain-text body,
//! and writes a `<YYYYMMDD>_<subject>.md` file.

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
