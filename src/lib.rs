//! `mailjot`: turn email messages into Joplin notes.
//!
//! The core is a MIME-to-markdown transcoder: it walks a message's part
//! tree, uploads inline images and attachments to a resource store, converts
//! the text parts to markdown and rewrites `cid:` references to the uploaded
//! resources. Around it sit mailbox sources (`.eml`, MBOX), a Joplin Data API
//! client and the import pipeline that ties them together.

pub mod config;
pub mod error;
pub mod import;
pub mod joplin;
pub mod model;
pub mod parser;
pub mod source;
pub mod transcode;
