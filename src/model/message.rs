//! The MIME tree a message is transcoded from.
//!
//! These types are detached from any parser: `parser::mime` builds them
//! from raw bytes, and tests build them by hand.

use chrono::{DateTime, Utc};

/// A parsed email message: a few headers plus the root of its part tree.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// The `Subject:` header. Parsed messages carry it decoded; hand-built
    /// ones may still hold RFC 2047 encoded-words.
    pub subject: Option<String>,

    /// Display form of the first `From:` address.
    pub from: Option<String>,

    /// Parsed `Date:` header.
    pub date: Option<DateTime<Utc>>,

    /// The `Message-ID` header value, without angle brackets.
    pub message_id: Option<String>,

    /// Root part. For single-part messages this is the only leaf.
    pub root: Part,
}

/// Content-Disposition of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
    /// Any other disposition type, kept lowercase.
    Other(String),
}

impl Disposition {
    /// Parse a disposition type (`"inline"`, `"attachment"`, ...).
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.contains("attachment") {
            Self::Attachment
        } else if lower.contains("inline") {
            Self::Inline
        } else {
            Self::Other(lower)
        }
    }
}

/// One node of the part tree.
///
/// Leaves carry a payload; containers (`multipart/*`, embedded
/// `message/rfc822`) carry children.
#[derive(Debug, Clone, Default)]
pub struct Part {
    /// Lowercase `type/subtype`, e.g. `"text/html"`.
    pub content_type: String,

    /// Content-Disposition, if the header was present.
    pub disposition: Option<Disposition>,

    /// Content-ID with surrounding `<>` removed.
    pub content_id: Option<String>,

    /// Filename from Content-Disposition or the Content-Type `name` parameter.
    pub filename: Option<String>,

    /// Declared charset of the payload.
    pub charset: Option<String>,

    /// Payload bytes, already transport-decoded (base64 / quoted-printable).
    pub payload: Vec<u8>,

    /// Child parts, in the order they appear in the raw message.
    pub children: Vec<Part>,
}

impl Part {
    /// Build a leaf part with the given content type and payload.
    pub fn leaf(content_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into().to_ascii_lowercase(),
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Build a container part holding `children`.
    pub fn container(content_type: impl Into<String>, children: Vec<Part>) -> Self {
        Self {
            content_type: content_type.into().to_ascii_lowercase(),
            children,
            ..Self::default()
        }
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = Some(disposition);
        self
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// `true` for multipart nodes and embedded messages that were descended into.
    pub fn is_container(&self) -> bool {
        self.content_type.starts_with("multipart/") || !self.children.is_empty()
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.disposition, Some(Disposition::Inline))
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self.disposition, Some(Disposition::Attachment))
    }
}

impl Message {
    /// Leaf parts in pre-order, i.e. the order they appear in the raw message.
    ///
    /// Uses an explicit stack, so deeply nested input cannot overflow the
    /// call stack.
    pub fn leaves(&self) -> Vec<&Part> {
        let mut leaves = Vec::new();
        let mut stack = vec![&self.root];

        while let Some(part) = stack.pop() {
            if part.is_container() {
                // Reverse so the first child is popped first
                stack.extend(part.children.iter().rev());
            } else {
                leaves.push(part);
            }
        }

        leaves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_parse() {
        assert_eq!(Disposition::parse("inline"), Disposition::Inline);
        assert_eq!(Disposition::parse(" Attachment"), Disposition::Attachment);
        assert_eq!(
            Disposition::parse("form-data"),
            Disposition::Other("form-data".to_string())
        );
    }

    #[test]
    fn test_leaves_preorder() {
        let root = Part::container(
            "multipart/mixed",
            vec![
                Part::container(
                    "multipart/alternative",
                    vec![
                        Part::leaf("text/plain", "one"),
                        Part::leaf("text/html", "two"),
                    ],
                ),
                Part::leaf("application/pdf", "three"),
                Part::container("multipart/related", vec![Part::leaf("image/png", "four")]),
            ],
        );
        let msg = Message {
            root,
            ..Message::default()
        };

        let order: Vec<&[u8]> = msg.leaves().iter().map(|p| p.payload.as_slice()).collect();
        assert_eq!(
            order,
            vec![&b"one"[..], &b"two"[..], &b"three"[..], &b"four"[..]]
        );
    }

    #[test]
    fn test_single_part_message_is_its_own_leaf() {
        let msg = Message {
            root: Part::leaf("text/plain", "hello"),
            ..Message::default()
        };
        let leaves = msg.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].content_type, "text/plain");
    }

    #[test]
    fn test_empty_multipart_has_no_leaves() {
        let msg = Message {
            root: Part::container("multipart/mixed", Vec::new()),
            ..Message::default()
        };
        assert!(msg.leaves().is_empty());
    }
}
