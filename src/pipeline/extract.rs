//! Segment extraction: split a story document into literal text and inline images.
//!
//! The document is cut on every quoted `data:image/...;base64,...` reference.
//! Both the matched references and the text between them become segments, in
//! document order, so concatenating every segment's `content` reproduces the
//! input byte for byte. A document with `m` matches always yields `2m + 1`
//! segments (leading and trailing text may be empty, and so may the text
//! between two adjacent references).
//!
//! A match only becomes a *candidate* when the whole segment, quotes included,
//! matches the anchored pattern and both quotes are the same character. The
//! boundary pattern accepts mismatched quotes (`"data:...'`), and the regex
//! engine has no backreferences, so that check is done by hand.

use crate::error::CodecError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Image mimes eligible for re-encoding: jpeg, jpg, png, webp and gif.
const MIME_ALTERNATION: &str = r"(?:j?pe?n?g|webp|gif)";

static RE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"["'`]data:image/{MIME_ALTERNATION};base64,[A-Za-z0-9+/]+={{0,2}}["'`]"#
    ))
    .expect("boundary pattern is valid")
});

static RE_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"^["'`]data:image/({MIME_ALTERNATION});base64,([A-Za-z0-9+/]+={{0,2}})["'`]$"#
    ))
    .expect("candidate pattern is valid")
});

/// One ordered slice of the split document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in the split sequence; dense and zero-based.
    pub index: usize,
    pub content: String,
    /// Full quoted data-URL match with identical opening and closing quotes.
    pub is_candidate: bool,
}

impl Segment {
    pub fn new(index: usize, content: impl Into<String>) -> Self {
        let content = content.into();
        let is_candidate = is_candidate(&content);
        Self {
            index,
            content,
            is_candidate,
        }
    }
}

/// Split `document` into its ordered segments.
pub fn extract(document: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for m in RE_BOUNDARY.find_iter(document) {
        segments.push(Segment::new(segments.len(), &document[last..m.start()]));
        segments.push(Segment::new(segments.len(), m.as_str()));
        last = m.end();
    }
    segments.push(Segment::new(segments.len(), &document[last..]));

    segments
}

/// Number of candidate segments, used as the progress total.
pub fn count_candidates(segments: &[Segment]) -> usize {
    segments.iter().filter(|s| s.is_candidate).count()
}

/// Strict full-match test for a quoted inline image reference.
pub fn is_candidate(content: &str) -> bool {
    RE_CANDIDATE.is_match(content) && same_quotes(content)
}

fn same_quotes(content: &str) -> bool {
    let bytes = content.as_bytes();
    bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1]
}

/// A parsed candidate: `<quote>data:image/<subtype>;base64,<payload><quote>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUrl<'a> {
    pub quote: char,
    /// Mime subtype as declared, e.g. `png`. Not trusted for format detection.
    pub subtype: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUrl<'a> {
    pub fn parse(candidate: &'a str) -> Result<Self, CodecError> {
        if !same_quotes(candidate) {
            return Err(CodecError::MalformedReference("mismatched quotes".into()));
        }
        let caps = RE_CANDIDATE
            .captures(candidate)
            .ok_or_else(|| CodecError::MalformedReference("not an inline image".into()))?;
        let (Some(subtype), Some(payload)) = (caps.get(1), caps.get(2)) else {
            return Err(CodecError::MalformedReference("missing mime or payload".into()));
        };
        // `same_quotes` guarantees at least two ASCII quote bytes.
        let quote = candidate.as_bytes()[0] as char;

        Ok(Self {
            quote,
            subtype: subtype.as_str(),
            payload: payload.as_str(),
        })
    }
}

/// Wrap encoded bytes as a quoted data URL using `quote` on both ends.
pub fn wrap_data_url(quote: char, mime: &str, base64_payload: &str) -> String {
    let mut s = String::with_capacity(base64_payload.len() + mime.len() + 16);
    s.push(quote);
    s.push_str("data:");
    s.push_str(mime);
    s.push_str(";base64,");
    s.push_str(base64_payload);
    s.push(quote);
    s
}
