//! Transcoder output and the note payload derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resource persisted in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReference {
    /// Filename shown as the link text.
    pub name: String,

    /// Opaque link target returned by the store (Joplin: `:/<id>`).
    pub token: String,

    /// Media type the resource was uploaded with.
    pub mime_type: String,

    /// `true` when `mime_type` is `image/*`.
    pub render_as_image: bool,
}

impl ResourceReference {
    /// Markdown for this resource: `![name](token)` for images, `[name](token)` otherwise.
    pub fn markup(&self) -> String {
        if self.render_as_image {
            format!("![{}]({})", self.name, self.token)
        } else {
            format!("[{}]({})", self.name, self.token)
        }
    }
}

/// A transcoded message, ready to become a note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Decoded subject.
    pub title: String,

    /// Markdown body with `cid:` placeholders resolved and attachment links appended.
    pub body: String,

    /// Every resource uploaded for this message, in walk order.
    pub resources: Vec<ResourceReference>,

    /// Sender display string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Message date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Note payload sent to the note store.
///
/// Field names follow the Joplin Data API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Note {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_created_time: Option<i64>,
}

impl Note {
    /// Build a note from a transcoded document.
    pub fn from_document(doc: Document, parent_id: Option<String>) -> Self {
        Self {
            title: doc.title,
            body: doc.body,
            parent_id,
            author: doc.author,
            source_url: None,
            user_created_time: doc.created.map(|d| d.timestamp_millis()),
        }
    }
}

/// A notebook in the note store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub parent_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str, image: bool) -> ResourceReference {
        ResourceReference {
            name: name.to_string(),
            token: ":/abc".to_string(),
            mime_type: if image { "image/png" } else { "application/pdf" }.to_string(),
            render_as_image: image,
        }
    }

    #[test]
    fn test_markup_image() {
        assert_eq!(reference("b.png", true).markup(), "![b.png](:/abc)");
    }

    #[test]
    fn test_markup_link() {
        assert_eq!(reference("a.pdf", false).markup(), "[a.pdf](:/abc)");
    }

    #[test]
    fn test_note_from_document() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
        let doc = Document {
            title: "Hello".to_string(),
            body: "Body".to_string(),
            resources: Vec::new(),
            author: Some("Alice <alice@example.com>".to_string()),
            created: Some(created),
        };
        let note = Note::from_document(doc, Some("folder1".to_string()));
        assert_eq!(note.title, "Hello");
        assert_eq!(note.parent_id.as_deref(), Some("folder1"));
        assert_eq!(note.user_created_time, Some(1_700_000_000_000));

        let json = serde_json::to_value(&note).expect("serialize");
        assert!(json.get("source_url").is_none());
        assert_eq!(json["author"], "Alice <alice@example.com>");
    }
}
