//! Email parsing: MBOX streaming reader, message/MIME parser, header decoding, and body decoding.

pub mod body;
pub mod header;
pub mod mbox;
pub mod message;
