//! `.eml` files: one bare RFC 5322 message per file.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::error::{MailjotError, Result};

use super::{MailboxSource, RawMessage};

/// Yields the contents of a list of `.eml` files, in order.
#[derive(Debug, Clone)]
pub struct EmlSource {
    files: VecDeque<PathBuf>,
}

impl EmlSource {
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self {
            files: files.into(),
        }
    }

    /// All `*.eml` files directly inside `dir`, sorted by path.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| MailjotError::io(dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| MailjotError::io(dir, e))?.path();
            if path.is_file() && has_eml_extension(&path) {
                files.push(path);
            }
        }
        files.sort();

        tracing::debug!(dir = %dir.display(), count = files.len(), "Found EML files");
        Ok(Self::from_files(files))
    }
}

fn has_eml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("eml"))
}

impl MailboxSource for EmlSource {
    fn next_message(&mut self) -> Option<Result<RawMessage>> {
        let path = self.files.pop_front()?;
        let result = std::fs::read(&path)
            .map(|bytes| RawMessage {
                origin: path.display().to_string(),
                bytes,
            })
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MailjotError::FileNotFound(path.clone())
                } else {
                    MailjotError::io(&path, e)
                }
            });
        Some(result)
    }

    fn remaining_hint(&self) -> Option<usize> {
        Some(self.files.len())
    }
}
