//! Import pipeline: mailbox source → MIME parse → transcode → note store.

use tracing::{info, warn};

use crate::error::{MailjotError, Result};
use crate::model::document::{Folder, Note};
use crate::parser::mime::parse_message;
use crate::source::{MailboxSource, RawMessage};
use crate::transcode::sink::{ResourceStore, Sink};
use crate::transcode::Transcoder;

/// Somewhere notes are created.
pub trait NoteStore {
    /// Create `note` and return its id.
    fn create_note(&self, note: &Note) -> Result<String>;

    /// Every folder (notebook) in the store.
    fn list_folders(&self) -> Result<Vec<Folder>>;
}

impl<T: NoteStore + ?Sized> NoteStore for &T {
    fn create_note(&self, note: &Note) -> Result<String> {
        (**self).create_note(note)
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        (**self).list_folders()
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Notes created.
    pub imported: usize,
    /// Messages that produced no note.
    pub failed: usize,
    /// Resources uploaded across all imported notes.
    pub resources: usize,
}

impl ImportSummary {
    pub fn merge(&mut self, other: ImportSummary) {
        self.imported += other.imported;
        self.failed += other.failed;
        self.resources += other.resources;
    }

    pub fn total(&self) -> usize {
        self.imported + self.failed
    }
}

/// Resolve a configured folder to a folder id.
///
/// An exact id match wins; otherwise the first folder whose title matches
/// case-insensitively. `None` in, `None` out (the store's default folder).
pub fn resolve_folder<N: NoteStore + ?Sized>(
    store: &N,
    folder: Option<&str>,
) -> Result<Option<String>> {
    let Some(wanted) = folder.map(str::trim).filter(|f| !f.is_empty()) else {
        return Ok(None);
    };

    let folders = store.list_folders()?;
    if let Some(f) = folders.iter().find(|f| f.id == wanted) {
        return Ok(Some(f.id.clone()));
    }

    let lowered = wanted.to_lowercase();
    folders
        .iter()
        .find(|f| f.title.trim().to_lowercase() == lowered)
        .map(|f| Some(f.id.clone()))
        .ok_or_else(|| MailjotError::FolderNotFound(wanted.to_string()))
}

/// Turns raw messages into notes, one at a time.
pub struct Importer<'a, R, N> {
    sink: &'a Sink<R>,
    notes: &'a N,
    parent_id: Option<String>,
}

impl<'a, R: ResourceStore, N: NoteStore> Importer<'a, R, N> {
    pub fn new(sink: &'a Sink<R>, notes: &'a N) -> Self {
        Self {
            sink,
            notes,
            parent_id: None,
        }
    }

    /// Create notes inside this folder id instead of the store's default.
    pub fn parent_id(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Import one message. Returns the new note id and the number of
    /// resources uploaded for it.
    pub fn import_message(&self, raw: &RawMessage) -> Result<(String, usize)> {
        let message = parse_message(&raw.bytes)?;
        let document = Transcoder::new(self.sink).transcode(&message);
        let resources = document.resources.len();

        let mut note = Note::from_document(document, self.parent_id.clone());
        note.source_url = message
            .message_id
            .as_deref()
            .map(|id| format!("mid:{}", id.trim_matches(['<', '>'])));

        let id = self.notes.create_note(&note)?;
        info!(origin = %raw.origin, id = %id, title = %note.title, "Imported message");
        Ok((id, resources))
    }

    /// Drain `source`, importing every message.
    ///
    /// A message that fails is logged and counted; the run goes on.
    /// `progress` is called after each message with its origin.
    pub fn run(
        &self,
        source: &mut dyn MailboxSource,
        progress: Option<&dyn Fn(&str)>,
    ) -> ImportSummary {
        let mut summary = ImportSummary::default();

        while let Some(next) = source.next_message() {
            let origin = match next {
                Ok(raw) => {
                    match self.import_message(&raw) {
                        Ok((_, resources)) => {
                            summary.imported += 1;
                            summary.resources += resources;
                        }
                        Err(e) => {
                            summary.failed += 1;
                            warn!(origin = %raw.origin, error = %e, "Failed to import message");
                        }
                    }
                    raw.origin
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(error = %e, "Failed to read message");
                    String::new()
                }
            };

            if let Some(cb) = progress {
                cb(&origin);
            }
        }

        summary
    }
}
