//! MIME message parsing: raw RFC 5322 bytes to a [`Message`] part tree.

use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::{MailjotError, Result};
use crate::model::message::{Disposition, Message, Part};

/// Maximum depth for nested multiparts and embedded messages (adversarial input guard).
const MAX_DEPTH: usize = 32;

/// Parse a complete raw message (headers + body) into a part tree.
///
/// A leading MBOX `From ` line and UTF-8 BOM are skipped. This is the only
/// hard failure of the transcoding pipeline: if the bytes cannot be walked
/// as a MIME message at all, [`MailjotError::UnparsableMessage`] is returned.
pub fn parse_message(raw_message: &[u8]) -> Result<Message> {
    let message_bytes = skip_from_line(raw_message);
    if message_bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(MailjotError::UnparsableMessage("empty message".into()));
    }

    let parsed = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| MailjotError::UnparsableMessage("not a MIME message".into()))?;

    if parsed.parts.is_empty() {
        return Err(MailjotError::UnparsableMessage("message has no parts".into()));
    }

    let root = convert_part(&parsed, 0, 0);

    let from = parsed.from().and_then(|a| a.first()).map(|addr| {
        let address = addr.address.as_deref().unwrap_or_default();
        match addr.name.as_deref() {
            Some(name) if !name.trim().is_empty() && !address.is_empty() => {
                format!("{} <{address}>", name.trim())
            }
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => address.to_string(),
        }
    });

    let date = parsed
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0));

    let message = Message {
        subject: parsed.subject().map(str::to_string),
        from: from.filter(|f| !f.is_empty()),
        date,
        message_id: parsed.message_id().map(str::to_string),
        root,
    };

    debug!(
        leaves = message.leaves().len(),
        message_id = message.message_id.as_deref().unwrap_or(""),
        "Parsed message"
    );

    Ok(message)
}

/// Convert `msg.parts[id]` (and everything below it) into our part model.
fn convert_part(msg: &mail_parser::Message<'_>, id: usize, depth: usize) -> Part {
    let Some(source) = msg.parts.get(id) else {
        return Part::default();
    };

    let mut part = Part {
        content_type: content_type_of(source),
        disposition: source
            .content_disposition()
            .map(|d| Disposition::parse(d.ctype())),
        content_id: source
            .content_id()
            .map(|cid| cid.trim().trim_start_matches('<').trim_end_matches('>').to_string()),
        filename: source.attachment_name().map(str::to_string),
        ..Part::default()
    };

    match &source.body {
        PartType::Text(text) | PartType::Html(text) => {
            // mail-parser has already applied the declared charset. Parts that
            // are uploaded as resources get their declared bytes back.
            let (payload, charset) = if is_resource(&part) {
                encode_declared(text, charset_of(source))
            } else {
                (text.as_bytes().to_vec(), "utf-8".to_string())
            };
            part.charset = Some(charset);
            part.payload = payload;
        }
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            part.charset = charset_of(source);
            part.payload = bytes.to_vec();
        }
        PartType::Multipart(child_ids) => {
            if depth >= MAX_DEPTH {
                warn!(depth, "Multipart nesting too deep, skipping children");
            } else {
                part.children = child_ids
                    .iter()
                    .map(|child| convert_part(msg, *child, depth + 1))
                    .collect();
            }
        }
        PartType::Message(nested) => {
            if part.is_attachment() || depth >= MAX_DEPTH {
                // Forwarded-as-attachment: keep the whole message as one blob
                part.payload = nested.raw_message.to_vec();
            } else if !nested.parts.is_empty() {
                part.children = vec![convert_part(nested, 0, depth + 1)];
            }
        }
    }

    part
}

/// Lowercase `type/subtype` of a part, defaulting to `text/plain` (RFC 2045 §5.2).
fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| {
            let main = ct.ctype();
            match ct.subtype() {
                Some(sub) => format!("{main}/{sub}"),
                None => main.to_string(),
            }
        })
        .unwrap_or_else(|| "text/plain".to_string())
        .to_ascii_lowercase()
}

/// Attachments and inline parts with a Content-ID are stored byte-for-byte.
fn is_resource(part: &Part) -> bool {
    part.is_attachment()
        || (part.is_inline()
            && part
                .content_id
                .as_deref()
                .is_some_and(|cid| !cid.trim().is_empty()))
}

/// Re-encode decoded text with its declared charset.
///
/// Without a charset label, or with one encoding_rs cannot encode to
/// (UTF-16 family, unknown labels), the text stays UTF-8.
fn encode_declared(text: &str, charset: Option<String>) -> (Vec<u8>, String) {
    let Some(label) = charset else {
        return (text.as_bytes().to_vec(), "utf-8".to_string());
    };
    match Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) if encoding.output_encoding() == encoding => {
            let (bytes, _, unmappable) = encoding.encode(text);
            if unmappable {
                warn!(charset = %label, "Text resource has characters outside its charset");
            }
            (bytes.into_owned(), label)
        }
        _ => {
            debug!(charset = %label, "Keeping text resource as UTF-8");
            (text.as_bytes().to_vec(), "utf-8".to_string())
        }
    }
}

fn charset_of(part: &MessagePart<'_>) -> Option<String> {
    part.content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(str::to_string)
}

/// Skip the `From ` separator line at the start of MBOX messages.
pub(crate) fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
