//! Export: write converted documents to disk.

pub mod document;
