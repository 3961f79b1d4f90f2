//! Text normalization: charset decoding and HTML → markdown.
//!
//! Nothing in here fails. Unknown charsets decode lossily, and HTML that
//! the markdown converter rejects is reduced to plain text instead.

use htmd::HtmlToMarkdown;
use tracing::{debug, warn};

use crate::error::{MailjotError, Result};
use crate::model::message::Part;
use crate::transcode::resolve::CID_PREFIX;

/// Tags whose content never belongs in a note.
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "head", "title"];

/// Decode a text part and, for HTML, convert it to markdown.
///
/// Returns an empty string for a part without payload.
pub fn normalize(part: &Part) -> String {
    if part.payload.is_empty() {
        return String::new();
    }

    let text = decode_text(&part.payload, part.charset.as_deref());
    if part.content_type == "text/html" {
        html_to_markdown(&text)
    } else {
        text
    }
}

/// Decode bytes with the declared charset, or as UTF-8 when none is declared.
///
/// Invalid sequences are replaced with U+FFFD instead of failing.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.map(str::trim).filter(|c| !c.is_empty()) {
        Some(label) => decode_with_label(bytes, label).unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to lossy UTF-8");
            decode_utf8_lossy(bytes)
        }),
        None => decode_utf8_lossy(bytes),
    }
}

/// Strict lookup of `label`; errors only when the charset is unknown.
pub fn decode_with_label(bytes: &[u8], label: &str) -> Result<String> {
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| MailjotError::UnsupportedEncoding(label.to_string()))?;

    // decode() sniffs and strips a BOM, overriding the label if one is present
    let (decoded, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(
            charset = label,
            used = used.name(),
            "Malformed sequences replaced while decoding"
        );
    }
    Ok(decoded.into_owned())
}

fn decode_utf8_lossy(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build()
}

/// Convert HTML to markdown, keeping link targets and emphasis.
///
/// `<img src="cid:...">` is reduced to the bare `cid:...` placeholder so the
/// resolver can swap in the full resource markup.
pub fn html_to_markdown(html: &str) -> String {
    match converter().convert(html) {
        Ok(markdown) => unwrap_cid_images(markdown.trim()),
        Err(e) => {
            warn!(error = %e, "HTML conversion failed, stripping tags instead");
            strip_html(html)
        }
    }
}

/// `![alt](cid:x)` → `cid:x`. Other images and links are untouched.
///
/// htmd escapes `(` and `)` in image targets and wraps a target holding a
/// space in `<...>`. Both are undone so the id matches its Content-ID.
fn unwrap_cid_images(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut rest = markdown;

    while let Some(start) = rest.find("![") {
        let candidate = &rest[start..];
        let image = candidate.find("](").and_then(|close| {
            let alt = &candidate[2..close];
            if alt.contains(['[', ']', '\n']) {
                return None;
            }
            let (url, target_len) = image_target(&candidate[close + 2..])?;
            let id = url
                .strip_prefix(CID_PREFIX)
                .filter(|id| !id.is_empty() && !id.contains('"'))?;
            Some((id, close + 2 + target_len))
        });

        match image {
            Some((id, len)) => {
                out.push_str(&rest[..start]);
                out.push_str(CID_PREFIX);
                out.push_str(&unescape_markdown(id));
                rest = &rest[start + len..];
            }
            None => {
                out.push_str(&rest[..start + 2]);
                rest = &rest[start + 2..];
            }
        }
    }

    out.push_str(rest);
    unescape_cid_references(&out)
}

/// Split an image target (the text after `](`) into its url and the length
/// of the target including the closing `)`.
///
/// A bare target with whitespace carries a title and is rejected.
fn image_target(target: &str) -> Option<(&str, usize)> {
    if let Some(inner) = target.strip_prefix('<') {
        let end = inner.find(">)")?;
        return Some((&inner[..end], end + 3));
    }

    let bytes = target.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b')' => {
                let url = &target[..i];
                return (!url.contains(char::is_whitespace)).then_some((url, i + 1));
            }
            b'\n' => return None,
            _ => i += 1,
        }
    }
    None
}

/// Characters htmd may prefix with a backslash.
const MARKDOWN_ESCAPES: &str = "\\*_`[]()";

fn unescape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&next) if c == '\\' && MARKDOWN_ESCAPES.contains(next) => {
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Undo markdown escaping inside `cid:` references written in the text
/// itself (`cid:img\_1` → `cid:img_1`).
fn unescape_cid_references(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut rest = markdown;

    while let Some(start) = rest.find(CID_PREFIX) {
        let (before, reference) = rest.split_at(start + CID_PREFIX.len());
        out.push_str(before);
        let end = reference_end(reference);
        out.push_str(&unescape_markdown(&reference[..end]));
        rest = &reference[end..];
    }

    out.push_str(rest);
    out
}

/// Byte length of a reference: up to whitespace or an unescaped delimiter.
fn reference_end(reference: &str) -> usize {
    let mut escaped = false;
    for (i, c) in reference.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c.is_whitespace() || matches!(c, ')' | '"' | '\'' | '>' | ']') {
            return i;
        }
    }
    reference.len()
}

/// Plain-text rendering of HTML used when markdown conversion fails.
///
/// - Line breaks from `<br>`, `<p>`, `<div>`, `<li>`, ...
/// - Script, style and head blocks removed
/// - Common entities decoded
fn strip_html(html: &str) -> String {
    let mut text = html.to_string();
    for tag in SKIPPED_TAGS {
        text = remove_tag_block(&text, tag);
    }

    let mut result = String::with_capacity(text.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if is_block_tag(&tag) {
                    result.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => result.push(ch),
        }
    }

    for (entity, replacement) in [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&#160;", " "),
        ("&amp;", "&"),
    ] {
        result = result.replace(entity, replacement);
    }

    // Collapse runs of blank lines into one
    let mut cleaned = String::with_capacity(result.len());
    let mut prev_was_blank = false;
    for line in result.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

fn is_block_tag(tag: &str) -> bool {
    let name: String = tag
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

/// Remove an entire tag block (e.g. `<script>…</script>`), case-insensitively.
///
/// `<head` only opens a block when the name ends there, so `<header>` stays.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lowered = html.to_ascii_lowercase();
    let mut result = String::with_capacity(html.len());
    let mut copied = 0;
    let mut search = 0;

    while let Some(found) = lowered[search..].find(&open) {
        let start = search + found;
        let after_name = start + open.len();
        let ends_name = lowered[after_name..]
            .chars()
            .next()
            .is_none_or(|c| c == '>' || c == '/' || c.is_ascii_whitespace());
        if !ends_name {
            search = after_name;
            continue;
        }

        result.push_str(&html[copied..start]);
        match lowered[start..].find(&close) {
            Some(end) => {
                copied = start + end + close.len();
                search = copied;
            }
            None => return result,
        }
    }

    result.push_str(&html[copied..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_bold_to_markdown() {
        let part = Part::leaf("text/html", "<p>Hi <b>there</b></p>");
        let text = normalize(&part);
        assert!(text.contains("Hi **there**"), "got: {text}");
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_html_links_preserved() {
        let md = html_to_markdown(r#"<p>See <a href="https://example.com/x">the docs</a></p>"#);
        assert!(md.contains("[the docs](https://example.com/x)"), "got: {md}");
    }

    #[test]
    fn test_html_cid_image_becomes_placeholder() {
        let md = html_to_markdown(r#"<p>Logo: <img src="cid:img1" alt="logo"></p>"#);
        assert!(md.contains("cid:img1"), "got: {md}");
        assert!(!md.contains("!["), "got: {md}");
    }

    #[test]
    fn test_unwrap_cid_images_leaves_other_images() {
        let md = "![a](cid:x) ![b](https://example.com/b.png) ![c](cid:y \"t\")";
        assert_eq!(
            unwrap_cid_images(md),
            "cid:x ![b](https://example.com/b.png) ![c](cid:y \"t\")"
        );
    }

    #[test]
    fn test_cid_targets_lose_markdown_escapes() {
        assert_eq!(
            html_to_markdown(r#"<p>Hi <img src="cid:x(1)"></p>"#),
            "Hi cid:x(1)"
        );
        assert_eq!(
            html_to_markdown(r#"<p>Hi <img src="cid:a b" alt="pic"></p>"#),
            "Hi cid:a b"
        );
        let md = html_to_markdown("<p>See text cid:img_1 here</p>");
        assert!(md.contains("cid:img_1 here"), "got: {md}");
    }

    #[test]
    fn test_unwrap_cid_images_angle_target() {
        assert_eq!(unwrap_cid_images("![p](<cid:a b>) end"), "cid:a b end");
        assert_eq!(unwrap_cid_images(r"![p](cid:x\(1\))"), "cid:x(1)");
        // titled targets stay images
        assert_eq!(
            unwrap_cid_images("![p](<cid:a b \"t\">)"),
            "![p](<cid:a b \"t\">)"
        );
    }

    #[test]
    fn test_escapes_outside_cid_references_are_kept() {
        assert_eq!(
            unescape_cid_references(r"snake\_case and cid:a\_b\)."),
            r"snake\_case and cid:a_b)."
        );
    }

    #[test]
    fn test_html_script_and_style_dropped() {
        let md = html_to_markdown(
            "<html><head><style>p { color: red }</style></head><body><p>Body</p><script>alert(1)</script></body></html>",
        );
        assert!(md.contains("Body"));
        assert!(!md.contains("color"));
        assert!(!md.contains("alert"));
    }

    #[test]
    fn test_plain_text_unchanged() {
        let part = Part::leaf("text/plain", "Line 1\n<not a tag>\n");
        assert_eq!(normalize(&part), "Line 1\n<not a tag>\n");
    }

    #[test]
    fn test_unknown_charset_is_lossy_not_fatal() {
        let part = Part::leaf("text/plain", b"caf\xe9 ok".to_vec()).with_charset("x-no-such-codec");
        let text = normalize(&part);
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" ok"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_declared_latin1() {
        let part = Part::leaf("text/plain", b"caf\xe9".to_vec()).with_charset("ISO-8859-1");
        assert_eq!(normalize(&part), "café");
    }

    #[test]
    fn test_no_charset_invalid_utf8() {
        assert_eq!(decode_text(b"a\xffb", None), "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFhello", None), "hello");
        assert_eq!(decode_text(b"\xEF\xBB\xBFhello", Some("utf-8")), "hello");
    }

    #[test]
    fn test_decode_with_label_rejects_unknown() {
        assert!(matches!(
            decode_with_label(b"x", "klingon"),
            Err(MailjotError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(normalize(&Part::leaf("text/html", Vec::new())), "");
    }

    #[test]
    fn test_remove_tag_block_matches_whole_tag_name() {
        let html = "<header>Top</header><p>Body</p>";
        assert_eq!(remove_tag_block(html, "head"), html);

        let text = strip_html("<HEAD><title>x</title></HEAD><header>Top</header><p>Body</p>");
        assert_eq!(text, "Top\nBody");
    }

    #[test]
    fn test_strip_html_fallback() {
        let text = strip_html("<div>Tom &amp; Jerry</div><SCRIPT>x()</SCRIPT><p>&lt;3&gt;</p>");
        assert_eq!(text, "Tom & Jerry\n\n<3>");
    }
}
