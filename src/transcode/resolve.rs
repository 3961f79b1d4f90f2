//! `cid:` placeholder resolution.

use std::collections::HashMap;

use tracing::warn;

use crate::model::document::ResourceReference;

/// Placeholder prefix used by HTML bodies to point at inline parts.
pub const CID_PREFIX: &str = "cid:";

/// Content-ID → uploaded resource, for one message.
#[derive(Debug, Clone, Default)]
pub struct CidMap {
    entries: HashMap<String, ResourceReference>,
}

impl CidMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the resource uploaded for `content_id`. A later insert for the
    /// same id replaces the earlier one.
    pub fn insert(&mut self, content_id: impl Into<String>, reference: ResourceReference) {
        self.entries.insert(content_id.into(), reference);
    }

    pub fn get(&self, content_id: &str) -> Option<&ResourceReference> {
        self.entries.get(content_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replace every `cid:<id>` in `body` with the markup of the matching resource.
///
/// Plain substring replacement, one pass per id. Longer ids go first so that
/// `cid:img1` cannot eat the front of `cid:img10`. Placeholders without an
/// entry are left as they are and logged.
pub fn resolve(body: &str, cid_map: &CidMap) -> String {
    let mut ids: Vec<&String> = cid_map.entries.keys().collect();
    ids.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut resolved = body.to_string();
    for id in ids {
        let placeholder = format!("{CID_PREFIX}{id}");
        if resolved.contains(&placeholder) {
            resolved = resolved.replace(&placeholder, &cid_map.entries[id].markup());
        }
    }

    for id in unresolved_ids(&resolved) {
        warn!(content_id = %id, "Unresolved inline reference left in body");
    }

    resolved
}

/// Ids of `cid:` placeholders still present in `body`.
///
/// An id runs until whitespace or a character that closes a markdown or HTML
/// construct (`)`, `"`, `'`, `>`, `]`).
pub fn unresolved_ids(body: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut remaining = body;

    while let Some(pos) = remaining.find(CID_PREFIX) {
        let after = &remaining[pos + CID_PREFIX.len()..];
        let end = after
            .find(|c: char| c.is_whitespace() || matches!(c, ')' | '"' | '\'' | '>' | ']'))
            .unwrap_or(after.len());
        if end > 0 {
            ids.push(after[..end].to_string());
        }
        remaining = &after[end..];
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, id: &str) -> ResourceReference {
        ResourceReference {
            name: name.to_string(),
            token: format!(":/{id}"),
            mime_type: "image/png".to_string(),
            render_as_image: true,
        }
    }

    #[test]
    fn test_empty_map_is_identity() {
        let body = "Hello ![x](cid:img1) and cid:other";
        assert_eq!(resolve(body, &CidMap::new()), body);
    }

    #[test]
    fn test_all_occurrences_replaced() {
        let mut map = CidMap::new();
        map.insert("img1", image("logo.png", "abc"));
        let body = "A ![logo](cid:img1) B ![again](cid:img1)";
        assert_eq!(
            resolve(body, &map),
            "A ![logo](![logo.png](:/abc)) B ![again](![logo.png](:/abc))"
        );
    }

    #[test]
    fn test_unmatched_placeholder_left_verbatim() {
        let mut map = CidMap::new();
        map.insert("img2", image("two.png", "222"));
        let resolved = resolve("x cid:img1 y cid:img2 z", &map);
        assert_eq!(resolved, "x cid:img1 y ![two.png](:/222) z");
        assert_eq!(unresolved_ids(&resolved), vec!["img1".to_string()]);
    }

    #[test]
    fn test_prefix_ids_do_not_collide() {
        let mut map = CidMap::new();
        map.insert("img1", image("one.png", "1"));
        map.insert("img10", image("ten.png", "10"));
        let resolved = resolve("cid:img10 cid:img1", &map);
        assert_eq!(resolved, "![ten.png](:/10) ![one.png](:/1)");
    }

    #[test]
    fn test_unresolved_ids_stop_at_delimiters() {
        let ids = unresolved_ids(r#"<img src="cid:a@b"> ![x](cid:c.d) cid:e"#);
        assert_eq!(ids, vec!["a@b", "c.d", "e"]);
    }

    #[test]
    fn test_cid_map_basics() {
        let mut map = CidMap::new();
        assert!(map.is_empty());
        map.insert("a", image("a.png", "1"));
        map.insert("a", image("a2.png", "2"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").map(|r| r.name.as_str()), Some("a2.png"));
    }
}
