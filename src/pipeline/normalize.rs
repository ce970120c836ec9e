//! Body normalization — plain-text extraction, decode fallback, line-wrap
//! collapse.
//!
//! Pure string processing; no I/O and no model calls.

use std::sync::LazyLock;

use mail_parser::{Message, MimeHeaders, PartType};
use regex::Regex;

/// Two or more consecutive line breaks mark a paragraph boundary.
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());

/// Text of one `text/plain` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartText {
    /// Transport encoding and charset decoded cleanly.
    Decoded(String),
    /// Decoding failed; this is the raw payload, lossily read as UTF-8.
    Degraded(String),
}

impl PartText {
    pub fn text(&self) -> &str {
        match self {
            PartText::Decoded(s) | PartText::Degraded(s) => s,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, PartText::Degraded(_))
    }
}

/// Ordered paragraph segments of a message body.
///
/// Every segment is trimmed and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBody {
    pub segments: Vec<String>,
    /// At least one contributing part fell back to its raw payload.
    pub degraded: bool,
}

impl NormalizedBody {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

/// Collect the text of every inline `text/plain` part, in message order.
///
/// `raw` must be the bytes `message` was parsed from; it supplies the
/// undecoded payload when the parser flags an encoding problem or when a
/// non-UTF-8 body only decoded with replacement characters.
pub fn extract_parts(message: &Message<'_>, raw: &[u8]) -> Vec<PartText> {
    let mut parts = Vec::new();
    for part in &message.parts {
        let PartType::Text(text) = &part.body else {
            continue;
        };
        if !is_plain_text(part) || is_attachment(part) {
            continue;
        }

        let payload = raw.get(part.offset_body as usize..part.offset_end as usize);
        if part.is_encoding_problem {
            let fallback = payload.map_or_else(|| text.to_string(), decode_raw);
            parts.push(PartText::Degraded(fallback));
            continue;
        }
        // Mislabelled or unknown charsets decode with replacement characters.
        let mislabelled = payload
            .filter(|_| text.contains(char::REPLACEMENT_CHARACTER))
            .filter(|bytes| std::str::from_utf8(bytes).is_err());
        if let Some(bytes) = mislabelled {
            parts.push(PartText::Degraded(decode_latin1(bytes)));
            continue;
        }

        parts.push(PartText::Decoded(text.to_string()));
    }
    parts
}

/// Build the segment list from extracted parts.
///
/// Parts without interior whitespace (encoded blobs, lone tokens) are
/// dropped before splitting.
pub fn normalize_parts(parts: &[PartText]) -> NormalizedBody {
    let mut body = NormalizedBody::default();
    for part in parts {
        if !is_natural_text(part.text()) {
            continue;
        }
        body.degraded |= part.is_degraded();
        body.segments.extend(split_segments(part.text()));
    }
    body
}

/// `extract_parts` followed by `normalize_parts`.
pub fn normalize(message: &Message<'_>, raw: &[u8]) -> NormalizedBody {
    normalize_parts(&extract_parts(message, raw))
}

/// Heuristic for natural-language text: whitespace inside the trimmed text.
pub fn is_natural_text(text: &str) -> bool {
    text.trim().contains(char::is_whitespace)
}

/// Split on paragraph breaks and collapse soft line wraps.
///
/// `"a\r\nb\r\n\r\nc"` becomes `["a b", "c"]`.
pub fn split_segments(text: &str) -> Vec<String> {
    let unified = text.replace("\r\n", "\n");
    PARAGRAPH_BREAK
        .split(&unified)
        .map(|para| para.replace('\n', " ").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Raw payload as UTF-8 when valid, Latin-1 otherwise.
fn decode_raw(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_latin1(bytes),
    }
}

/// Every byte maps to the code point of the same value, so nothing is lost.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn is_plain_text(part: &mail_parser::MessagePart<'_>) -> bool {
    match part.content_type() {
        None => true,
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct
                    .subtype()
                    .is_none_or(|sub| sub.eq_ignore_ascii_case("plain"))
        }
    }
}

fn is_attachment(part: &mail_parser::MessagePart<'_>) -> bool {
    part.content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"))
}
