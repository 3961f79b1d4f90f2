//! Mailbox sources: where raw messages come from.
//!
//! A source yields raw RFC 5322 bytes one message at a time. It never
//! connects, searches or acknowledges anything on its own behalf; the
//! import pipeline only pulls from it.

pub mod eml;
pub mod mbox;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{MailjotError, Result};

pub use eml::EmlSource;
pub use mbox::MboxSource;

/// Raw bytes of one message plus where they came from (for logs).
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// File path, or `path#N` for the N-th message of an MBOX.
    pub origin: String,
    pub bytes: Vec<u8>,
}

/// Something that yields raw messages.
pub trait MailboxSource {
    /// The next message, `None` when exhausted.
    ///
    /// An `Err` concerns one message only; callers may keep pulling.
    fn next_message(&mut self) -> Option<Result<RawMessage>>;

    /// Number of messages left, when known without reading them.
    fn remaining_hint(&self) -> Option<usize> {
        None
    }
}

/// Open a source for `path`.
///
/// - a directory: every `.eml` file inside it, sorted by name
/// - a file starting with an MBOX `From ` line: an MBOX
/// - any other file: a single message
pub fn open(path: &Path, max_message_size: usize) -> Result<Box<dyn MailboxSource>> {
    if !path.exists() {
        return Err(MailjotError::FileNotFound(path.to_path_buf()));
    }

    if path.is_dir() {
        return Ok(Box::new(EmlSource::from_dir(path)?));
    }

    if looks_like_mbox(path)? {
        Ok(Box::new(MboxSource::open(path, max_message_size)?))
    } else {
        Ok(Box::new(EmlSource::from_files(vec![path.to_path_buf()])))
    }
}

/// Sniff the first line of a file for an MBOX separator.
fn looks_like_mbox(path: &Path) -> Result<bool> {
    let mut head = [0u8; 8];
    let mut file = File::open(path).map_err(|e| MailjotError::io(path, e))?;
    let n = file.read(&mut head).map_err(|e| MailjotError::io(path, e))?;
    let head = &head[..n];
    let head = head.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(head);
    Ok(head.starts_with(b"From "))
}
