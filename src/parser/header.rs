//! Subject line to note title, with RFC 2047 encoded-word decoding.
//!
//! mail-parser already decodes the subject of a parsed message. The helpers
//! here turn whatever ends up in [`Message::subject`](crate::model::message::Message)
//! into a title, which also covers hand-built messages that still carry
//! encoded-words.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use tracing::warn;

/// Title used when a message has no usable subject.
pub const NO_SUBJECT: &str = "(no subject)";

/// Turn a `Subject:` value into a note title.
///
/// Encoded-words are decoded; anything else is kept as written. Missing or
/// blank subjects become [`NO_SUBJECT`].
pub fn decode_subject(raw: Option<&str>) -> String {
    let decoded = raw.map(decode_encoded_words).unwrap_or_default();
    match decoded.trim() {
        "" => NO_SUBJECT.to_string(),
        title => title.to_string(),
    }
}

/// Decode every `=?charset?B|Q?text?=` word in a header value.
///
/// A word that does not parse is copied through unchanged. Whitespace that
/// only separates two encoded-words is dropped (RFC 2047 §6.2).
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        let joins_words = after_word && before.trim().is_empty();

        match parse_word(candidate) {
            Some((text, len)) => {
                if !joins_words {
                    out.push_str(before);
                }
                out.push_str(&text);
                rest = &candidate[len..];
                after_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Parse one encoded-word at the start of `candidate` (which begins with `=?`).
///
/// Returns the decoded text and the number of bytes the word spans.
fn parse_word(candidate: &str) -> Option<(String, usize)> {
    let mut fields = candidate.strip_prefix("=?")?.splitn(3, '?');
    let charset = fields.next()?;
    let encoding = fields.next()?;
    let tail = fields.next()?;
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let end = tail.find("?=")?;
    let text = &tail[..end];
    let len = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = if encoding.eq_ignore_ascii_case("b") {
        let text = text.trim();
        // Some mailers drop the trailing padding
        STANDARD
            .decode(text)
            .or_else(|_| STANDARD_NO_PAD.decode(text.trim_end_matches('=')))
            .ok()?
    } else if encoding.eq_ignore_ascii_case("q") {
        decode_q(text)
    } else {
        return None;
    };

    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    Some((decode_charset(charset, &bytes), len))
}

/// Q-encoding: `_` is a space, `=XX` a hex byte, a stray `=` is literal.
fn decode_q(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let escaped = match bytes[i] {
            b'=' => bytes.get(i + 1..i + 3).and_then(hex_pair),
            _ => None,
        };
        match (escaped, bytes[i]) {
            (Some(byte), _) => {
                out.push(byte);
                i += 3;
            }
            (None, b'_') => {
                out.push(b' ');
                i += 1;
            }
            (None, other) => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

fn hex_pair(pair: &[u8]) -> Option<u8> {
    let hi = char::from(pair[0]).to_digit(16)?;
    let lo = char::from(pair[1]).to_digit(16)?;
    u8::try_from(hi * 16 + lo).ok()
}

fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => {
            warn!(charset, "Unknown charset in encoded-word, decoding as lossy UTF-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_subject_base64() {
        assert_eq!(decode_subject(Some("=?UTF-8?B?SGVsbG8=?=")), "Hello");
    }

    #[test]
    fn test_decode_subject_plain_passthrough() {
        assert_eq!(decode_subject(Some("Weekly report")), "Weekly report");
    }

    #[test]
    fn test_decode_subject_missing_or_blank() {
        assert_eq!(decode_subject(None), NO_SUBJECT);
        assert_eq!(decode_subject(Some("   ")), NO_SUBJECT);
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
        assert_eq!(decode_encoded_words("=?utf-8?q?a_b=3?="), "a b=3");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_decode_missing_padding() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SGVsbG8?="), "Hello");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        assert_eq!(decode_encoded_words("=?Windows-1252?Q?M=FCller?="), "Müller");
    }

    #[test]
    fn test_malformed_word_is_kept() {
        assert_eq!(decode_encoded_words("=?broken"), "=?broken");
        assert_eq!(decode_encoded_words("1 =? 2 ?x?y?="), "1 =? 2 ?x?y?=");
    }
}
