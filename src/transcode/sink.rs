//! Resource sink: persists binary parts in an external store.

use humansize::{format_size, DECIMAL};
use tracing::debug;

use crate::error::{MailjotError, Result};
use crate::model::document::ResourceReference;

/// Fallback media type when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// One blob to persist.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub data: &'a [u8],
}

/// Somewhere resources can be uploaded to.
///
/// Each call is a self-contained request; implementations must tolerate
/// concurrent uploads from independent messages.
pub trait ResourceStore {
    /// Persist `upload` and return the store's identifier for it.
    fn create_resource(&self, upload: &Upload<'_>) -> Result<String>;

    /// Link target for a stored resource, as used inside note markup.
    fn reference_token(&self, id: &str) -> String {
        format!(":/{id}")
    }
}

impl<T: ResourceStore + ?Sized> ResourceStore for &T {
    fn create_resource(&self, upload: &Upload<'_>) -> Result<String> {
        (**self).create_resource(upload)
    }

    fn reference_token(&self, id: &str) -> String {
        (**self).reference_token(id)
    }
}

/// Uploads parts and hands back [`ResourceReference`]s.
#[derive(Debug)]
pub struct Sink<S> {
    store: S,
}

impl<S: ResourceStore> Sink<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upload `data` under `filename`, with the media type inferred from the extension.
    pub fn sink(&self, filename: &str, data: &[u8]) -> Result<ResourceReference> {
        self.sink_with_hint(filename, data, None)
    }

    /// Like [`Sink::sink`], but falls back to `declared` (the part's own
    /// Content-Type) when the extension says nothing.
    pub fn sink_with_hint(
        &self,
        filename: &str,
        data: &[u8],
        declared: Option<&str>,
    ) -> Result<ResourceReference> {
        let mime_type = infer_mime_type(filename, declared);
        let upload = Upload {
            filename,
            mime_type: &mime_type,
            data,
        };

        let id = self.store.create_resource(&upload)?;
        if id.trim().is_empty() {
            return Err(MailjotError::upload(filename, "store returned an empty id"));
        }

        debug!(
            filename,
            mime_type = %mime_type,
            size = %format_size(data.len(), DECIMAL),
            id = %id,
            "Uploaded resource"
        );

        Ok(ResourceReference {
            name: filename.to_string(),
            token: self.store.reference_token(&id),
            render_as_image: mime_type.starts_with("image/"),
            mime_type,
        })
    }
}

/// Media type for `filename`, from its extension.
///
/// Unknown extensions use `declared` when it is a concrete, non-generic type,
/// else `application/octet-stream`.
pub fn infer_mime_type(filename: &str, declared: Option<&str>) -> String {
    if let Some(guess) = mime_guess::from_path(filename).first() {
        return guess.essence_str().to_string();
    }

    declared
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| d.contains('/') && !d.starts_with("multipart/") && d != OCTET_STREAM)
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingStore {
        uploads: RefCell<Vec<(String, String, usize)>>,
        fail: bool,
    }

    impl ResourceStore for RecordingStore {
        fn create_resource(&self, upload: &Upload<'_>) -> Result<String> {
            if self.fail {
                return Err(MailjotError::upload(upload.filename, "HTTP 500"));
            }
            let mut uploads = self.uploads.borrow_mut();
            uploads.push((
                upload.filename.to_string(),
                upload.mime_type.to_string(),
                upload.data.len(),
            ));
            Ok(format!("id{}", uploads.len()))
        }
    }

    #[test]
    fn test_infer_mime_type_from_extension() {
        assert_eq!(infer_mime_type("b.png", None), "image/png");
        assert_eq!(infer_mime_type("a.pdf", None), "application/pdf");
        assert_eq!(infer_mime_type("report.PDF", None), "application/pdf");
    }

    #[test]
    fn test_infer_mime_type_fallbacks() {
        assert_eq!(infer_mime_type("noext", None), OCTET_STREAM);
        assert_eq!(
            infer_mime_type("image001.png@01D9A1B2", Some("image/png")),
            "image/png"
        );
        assert_eq!(infer_mime_type("blob", Some("multipart/mixed")), OCTET_STREAM);
    }

    #[test]
    fn test_sink_image_reference() {
        let sink = Sink::new(RecordingStore::default());
        let reference = sink.sink("b.png", &[1, 2, 3]).expect("upload");
        assert_eq!(reference.token, ":/id1");
        assert!(reference.render_as_image);
        assert_eq!(reference.markup(), "![b.png](:/id1)");

        let uploads = sink.store().uploads.borrow();
        assert_eq!(uploads[0], ("b.png".to_string(), "image/png".to_string(), 3));
    }

    #[test]
    fn test_sink_plain_link_reference() {
        let sink = Sink::new(RecordingStore::default());
        let reference = sink.sink("a.pdf", b"%PDF").expect("upload");
        assert!(!reference.render_as_image);
        assert_eq!(reference.markup(), "[a.pdf](:/id1)");
    }

    #[test]
    fn test_sink_failure_is_reported() {
        let sink = Sink::new(RecordingStore {
            fail: true,
            ..RecordingStore::default()
        });
        let err = sink.sink("a.pdf", b"x").unwrap_err();
        assert!(matches!(err, MailjotError::ResourceUpload { .. }));
    }
}
