//! Streaming MBOX source.
//!
//! Reads MBOX files line-by-line with a 1 MB buffer and hands out one
//! message per pull. Never loads the entire file into memory. Tolerant of:
//!
//! - Mixed `\n` and `\r\n` line endings
//! - `From ` lines not preceded by a blank line (logs a warning)
//! - Truncated messages at EOF
//! - NUL bytes and other binary content in the body
//! - UTF-8 BOM at the start of the file

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MailjotError, Result};

use super::{MailboxSource, RawMessage};

/// Size of the internal read buffer (1 MB for fast sequential reads).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Pull-based MBOX reader.
///
/// Each message keeps its leading `From ` line; the MIME parser skips it.
pub struct MboxSource<R = File> {
    path: PathBuf,
    reader: BufReader<R>,
    max_message_size: usize,
    /// Separator line that opened the next message, read while finishing the previous one.
    pending: Option<Vec<u8>>,
    line_buf: Vec<u8>,
    offset: u64,
    index: usize,
    prev_line_was_empty: bool,
    first_line: bool,
    done: bool,
}

impl MboxSource<File> {
    /// Open an MBOX file.
    ///
    /// Verifies that the file exists and is readable, but does NOT validate
    /// that it is actually an MBOX.
    pub fn open(path: impl AsRef<Path>, max_message_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MailjotError::FileNotFound(path.clone())
            } else {
                MailjotError::io(&path, e)
            }
        })?;
        Ok(Self::from_reader(path, file, max_message_size))
    }
}

impl<R: Read> MboxSource<R> {
    /// Read an MBOX from any reader; `path` is only used in origins and errors.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R, max_message_size: usize) -> Self {
        Self {
            path: path.into(),
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, reader),
            max_message_size,
            pending: None,
            line_buf: Vec::with_capacity(4096),
            offset: 0,
            index: 0,
            prev_line_was_empty: true,
            first_line: true,
            done: false,
        }
    }

    /// Read one line (including its `\n`) into `line_buf`. Returns 0 at EOF.
    fn read_line(&mut self) -> std::io::Result<usize> {
        self.line_buf.clear();
        let buf = self.reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let consume_len = match memchr_newline(buf) {
            Some(pos) => pos + 1,
            None => buf.len(),
        };
        self.line_buf.extend_from_slice(&buf[..consume_len]);
        self.reader.consume(consume_len);
        Ok(consume_len)
    }

    fn emit(&mut self, bytes: Vec<u8>) -> RawMessage {
        self.index += 1;
        RawMessage {
            origin: format!("{}#{}", self.path.display(), self.index),
            bytes,
        }
    }
}

impl<R: Read> MailboxSource for MboxSource<R> {
    fn next_message(&mut self) -> Option<Result<RawMessage>> {
        if self.done {
            return None;
        }

        let mut message_buf = self.pending.take().unwrap_or_default();
        let mut truncated = false;

        loop {
            let line_len = match self.read_line() {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(MailjotError::io(&self.path, e)));
                }
            };

            if is_mbox_separator(&self.line_buf) {
                if !self.first_line && !self.prev_line_was_empty {
                    warn!(
                        offset = self.offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                self.first_line = false;
                self.prev_line_was_empty = false;
                self.offset += line_len as u64;

                if !message_buf.is_empty() {
                    self.pending = Some(self.line_buf.clone());
                    return Some(Ok(self.emit(message_buf)));
                }
                message_buf.extend_from_slice(&self.line_buf);
                continue;
            }

            if message_buf.len() + self.line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&self.line_buf);
            } else if !truncated {
                truncated = true;
                warn!(
                    offset = self.offset,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
            }

            self.prev_line_was_empty = is_blank_line(&self.line_buf);
            self.first_line = false;
            self.offset += line_len as u64;
        }

        // EOF: flush the last message
        self.done = true;
        if message_buf.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        Some(Ok(self.emit(message_buf)))
    }
}

/// Fast newline search (equivalent to memchr for `\n`).
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(data: &'static [u8], max: usize) -> MboxSource<&'static [u8]> {
        MboxSource::from_reader("test.mbox", data, max)
    }

    fn collect(mut src: impl MailboxSource) -> Vec<RawMessage> {
        let mut out = Vec::new();
        while let Some(msg) = src.next_message() {
            out.push(msg.expect("message"));
        }
        out
    }

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n")); // lowercase
        assert!(!is_mbox_separator(b">From user@example.com\n")); // escaped
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_mbox_separator_with_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&line));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_splits_messages() {
        let data: &[u8] = b"From a@x Mon Jan 01 00:00:00 2024\n\
Subject: one\n\
\n\
body one\n\
\n\
From b@x Mon Jan 01 00:00:00 2024\r\n\
Subject: two\r\n\
\r\n\
body two\r\n";
        let messages = collect(source(data, 1024));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].origin, "test.mbox#1");
        assert_eq!(messages[1].origin, "test.mbox#2");
        assert!(messages[0].bytes.starts_with(b"From a@x"));
        assert!(messages[0].bytes.ends_with(b"body one\n\n"));
        assert!(messages[1].bytes.ends_with(b"body two\r\n"));
    }

    #[test]
    fn test_separator_without_blank_line() {
        let data: &[u8] = b"From a@x\nSubject: one\n\nbody\nFrom b@x\nSubject: two\n\nbody\n";
        assert_eq!(collect(source(data, 1024)).len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(collect(source(b"", 1024)).is_empty());
        assert!(collect(source(b"\n\n", 1024)).is_empty());
    }

    #[test]
    fn test_truncates_oversized_message() {
        let data: &[u8] = b"From a@x\nSubject: big\n\n0123456789\n0123456789\n";
        let messages = collect(source(data, 30));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].bytes.len() <= 30);
        assert!(messages[0].bytes.starts_with(b"From a@x\nSubject: big\n"));
    }
}
