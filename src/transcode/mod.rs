//! Message → note transcoding.
//!
//! A single pre-order walk over the part tree classifies every leaf, uploads
//! inline resources and attachments through the [`Sink`], and collects
//! normalized body text. Only after the walk, when every inline resource is
//! known, are the `cid:` placeholders resolved. An inline image may appear
//! after the HTML that references it, so the two passes cannot be merged.

pub mod classify;
pub mod normalize;
pub mod resolve;
pub mod sink;

use tracing::{debug, info, warn};

use crate::model::document::{Document, ResourceReference};
use crate::model::message::{Message, Part};
use crate::parser::header;

use self::classify::{classify, IgnoreReason, PartRole};
use self::resolve::{resolve, CidMap};
use self::sink::{ResourceStore, Sink};

/// Per-message counters, logged after each transcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    pub text_parts: usize,
    pub inline_resources: usize,
    pub attachments: usize,
    pub skipped_parts: usize,
    pub failed_uploads: usize,
}

/// Turns parsed messages into [`Document`]s, uploading binary parts on the way.
///
/// Holds no per-message state, so one transcoder can serve any number of
/// messages.
pub struct Transcoder<'a, S> {
    sink: &'a Sink<S>,
}

impl<'a, S: ResourceStore> Transcoder<'a, S> {
    pub fn new(sink: &'a Sink<S>) -> Self {
        Self { sink }
    }

    /// Transcode one message. Never fails: a part that cannot be handled is
    /// logged and left out.
    pub fn transcode(&self, message: &Message) -> Document {
        self.transcode_with_stats(message).0
    }

    /// [`Transcoder::transcode`], also returning what happened to each part.
    pub fn transcode_with_stats(&self, message: &Message) -> (Document, TranscodeStats) {
        let mut stats = TranscodeStats::default();
        let mut cid_map = CidMap::new();
        let mut body = String::new();
        let mut attachment_links: Vec<String> = Vec::new();
        let mut resources = Vec::new();

        for part in message.leaves() {
            match classify(part) {
                PartRole::InlineResource {
                    content_id,
                    filename,
                } => match self.upload(part, &filename) {
                    Some(reference) => {
                        stats.inline_resources += 1;
                        resources.push(reference.clone());
                        cid_map.insert(content_id, reference);
                    }
                    None => stats.failed_uploads += 1,
                },
                PartRole::Attachment { filename } => match self.upload(part, &filename) {
                    Some(reference) => {
                        stats.attachments += 1;
                        attachment_links.push(reference.markup());
                        resources.push(reference);
                    }
                    None => stats.failed_uploads += 1,
                },
                PartRole::BodyText { html } => {
                    stats.text_parts += 1;
                    debug!(html, bytes = part.payload.len(), "Normalizing text part");
                    body.push_str(&normalize::normalize(part));
                    body.push('\n');
                }
                PartRole::Ignored(reason) => {
                    stats.skipped_parts += 1;
                    log_ignored(part, reason);
                }
            }
        }

        let mut body = resolve(&body, &cid_map).trim_end().to_string();

        // Attachments go after the body, never interleaved with it
        if !attachment_links.is_empty() {
            if !body.is_empty() {
                body.push_str("\n\n");
            }
            body.push_str(&attachment_links.join("\n"));
        }

        let title = header::decode_subject(message.subject.as_deref());
        info!(
            title = %title,
            text_parts = stats.text_parts,
            inline = stats.inline_resources,
            attachments = stats.attachments,
            skipped = stats.skipped_parts,
            failed_uploads = stats.failed_uploads,
            "Transcoded message"
        );

        let document = Document {
            title,
            body,
            resources,
            author: message.from.clone(),
            created: message.date,
        };
        (document, stats)
    }

    fn upload(&self, part: &Part, filename: &str) -> Option<ResourceReference> {
        match self
            .sink
            .sink_with_hint(filename, &part.payload, Some(&part.content_type))
        {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(
                    filename,
                    content_id = part.content_id.as_deref().unwrap_or(""),
                    error = %e,
                    "Resource upload failed, leaving it out of the note"
                );
                None
            }
        }
    }
}

fn log_ignored(part: &Part, reason: IgnoreReason) {
    match reason {
        IgnoreReason::Container => {}
        IgnoreReason::NamelessAttachment => warn!(
            content_type = %part.content_type,
            size = part.payload.len(),
            "Skipping attachment without a filename"
        ),
        IgnoreReason::EmptyContentId => warn!(
            content_type = %part.content_type,
            "Skipping inline part with an empty Content-ID and no filename"
        ),
        IgnoreReason::UnsupportedType => debug!(
            content_type = %part.content_type,
            "Skipping part"
        ),
    }
}
