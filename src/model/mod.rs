//! Core data model: the MIME part tree and the transcoded document.

pub mod document;
pub mod message;
