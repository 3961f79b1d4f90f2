//! Email parsing: MIME structure and header decoding.

pub mod header;
pub mod mime;
