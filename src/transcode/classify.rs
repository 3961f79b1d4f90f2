//! Part classification: what role a leaf plays in the final note.

use crate::model::message::Part;

/// Role of one part of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartRole {
    /// Embedded resource referenced from the body as `cid:<content_id>`.
    InlineResource { content_id: String, filename: String },
    /// Downloadable attachment, linked at the end of the note.
    Attachment { filename: String },
    /// Text that becomes part of the note body.
    BodyText { html: bool },
    /// Not turned into note content.
    Ignored(IgnoreReason),
}

/// Why a part was [`PartRole::Ignored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Multipart or embedded-message node; only its children carry content.
    Container,
    /// Attachment disposition without a filename.
    NamelessAttachment,
    /// Inline disposition whose Content-ID is blank, with no filename either.
    EmptyContentId,
    /// Anything else (inline images without Content-ID, `text/calendar`, ...).
    UnsupportedType,
}

/// Classify a part from its metadata alone. First matching rule wins:
///
/// 1. inline disposition with a Content-ID → inline resource
///    (filename defaults to the Content-ID)
/// 2. attachment disposition → attachment if it has a filename
/// 3. `text/plain` / `text/html` → body text
/// 4. everything else is ignored
pub fn classify(part: &Part) -> PartRole {
    if part.is_container() {
        return PartRole::Ignored(IgnoreReason::Container);
    }

    if part.is_inline() {
        if let Some(cid) = part.content_id.as_deref() {
            let cid = cid.trim();
            let filename = non_blank(part.filename.as_deref());
            match (cid.is_empty(), filename) {
                (false, name) => {
                    return PartRole::InlineResource {
                        content_id: cid.to_string(),
                        filename: name.unwrap_or(cid).to_string(),
                    }
                }
                (true, None) => return PartRole::Ignored(IgnoreReason::EmptyContentId),
                // A blank Content-ID anchors nothing; judge the part by the remaining rules
                (true, Some(_)) => {}
            }
        }
    }

    if part.is_attachment() {
        return match non_blank(part.filename.as_deref()) {
            Some(name) => PartRole::Attachment {
                filename: name.to_string(),
            },
            None => PartRole::Ignored(IgnoreReason::NamelessAttachment),
        };
    }

    match part.content_type.as_str() {
        "text/plain" => PartRole::BodyText { html: false },
        "text/html" => PartRole::BodyText { html: true },
        _ => PartRole::Ignored(IgnoreReason::UnsupportedType),
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
