//! A resource and note store that uploads nothing.

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::Result;
use crate::import::NoteStore;
use crate::model::document::{Folder, Note};
use crate::transcode::sink::{ResourceStore, Upload};

/// Length of a Joplin item id in hex characters.
const ID_LEN: usize = 32;

/// Hands out content-derived ids without contacting any server.
///
/// The same filename and bytes always get the same id, so dry-run output is
/// reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunStore;

impl DryRunStore {
    /// The id [`ResourceStore::create_resource`] would return for `upload`.
    pub fn resource_id(upload: &Upload<'_>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(upload.filename.as_bytes());
        hasher.update([0u8]);
        hasher.update(upload.data);
        hex_id(hasher)
    }
}

fn hex_id(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .take(ID_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl ResourceStore for DryRunStore {
    fn create_resource(&self, upload: &Upload<'_>) -> Result<String> {
        let id = Self::resource_id(upload);
        debug!(filename = upload.filename, id = %id, "Dry run: resource not uploaded");
        Ok(id)
    }
}

impl NoteStore for DryRunStore {
    fn create_note(&self, note: &Note) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(note.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(note.body.as_bytes());
        let id = hex_id(hasher);
        info!(id = %id, title = %note.title, bytes = note.body.len(), "Dry run: note not created");
        Ok(id)
    }

    /// No folders exist in a dry run.
    fn list_folders(&self) -> Result<Vec<Folder>> {
        Ok(Vec::new())
    }
}
