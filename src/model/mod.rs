//! Core data model types: parsed messages and output documents.

pub mod document;
pub mod message;
