//! Error types for the cyoa-compressor library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CompressError`]: **Fatal**: the run cannot proceed at all (bad input
//!   file, worker pool gone, run superseded by a newer one). Returned as
//!   `Err(CompressError)` from the top-level `compress*` functions.
//!
//! * [`SegmentError`]: **Non-fatal**: a single image failed to re-encode
//!   (corrupt payload, unsupported sub-format, job timeout) but every other
//!   segment is fine. Stored inside [`crate::output::SegmentReport`]; the
//!   segment keeps its original content and the run continues.
//!
//! Codec implementations report [`CodecError`]; the dispatcher wraps it into a
//! [`SegmentError`] carrying the segment index.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the cyoa-compressor library.
#[derive(Debug, Error)]
pub enum CompressError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Story file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file was read but is not UTF-8 text.
    #[error("File is not a UTF-8 text document: '{path}' (invalid byte at offset {offset})")]
    NotText { path: PathBuf, offset: usize },

    // ── Pool errors ───────────────────────────────────────────────────────
    /// A worker thread could not be started.
    #[error("Failed to start worker thread #{slot}: {source}")]
    WorkerSpawnFailed {
        slot: usize,
        #[source]
        source: std::io::Error,
    },

    /// The worker pool was shut down while jobs were still being submitted.
    #[error("Worker pool is closed")]
    PoolClosed,

    // ── Run errors ────────────────────────────────────────────────────────
    /// A newer run started before this one finished; its result was discarded.
    #[error("Run #{generation} was superseded by run #{current}; result discarded")]
    Superseded { generation: u64, current: u64 },

    /// No run has published an artifact yet, or it was released.
    #[error("No compressed output available; run a compression first")]
    NoArtifact,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single candidate segment.
///
/// The segment falls back to its original content; its savings are zero.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum SegmentError {
    /// Payload could not be decoded into pixels.
    #[error("Segment {index}: decode failed: {detail}")]
    Decode { index: usize, detail: String },

    /// Pixels could not be re-encoded.
    #[error("Segment {index}: encode failed: {detail}")]
    Encode { index: usize, detail: String },

    /// The job did not finish within the configured timeout.
    #[error("Segment {index}: transcoding timed out after {secs}s")]
    Timeout { index: usize, secs: u64 },

    /// The worker running this job panicked or vanished.
    #[error("Segment {index}: worker failed: {detail}")]
    WorkerFailed { index: usize, detail: String },
}

impl SegmentError {
    /// Attach a segment index to a codec failure.
    pub fn from_codec(index: usize, err: &CodecError) -> Self {
        match err {
            CodecError::Encode(_) => SegmentError::Encode {
                index,
                detail: err.to_string(),
            },
            _ => SegmentError::Decode {
                index,
                detail: err.to_string(),
            },
        }
    }
}

/// Failure inside a codec collaborator.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The candidate is not a well-formed quoted data URL.
    #[error("malformed data URL: {0}")]
    MalformedReference(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    /// Encoder-side failure (reported separately so callers can tell them apart).
    #[error("image encode failed: {0}")]
    Encode(String),

    #[error("unsupported container: {0}")]
    Unsupported(String),

    /// An animated container decoded to zero frames.
    #[error("animation has no frames")]
    NoFrames,
}

/// Malformed or truncated binary header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("bad signature")]
    BadSignature,

    #[error("unexpected block 0x{0:02X}")]
    UnexpectedBlock(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superseded_display() {
        let e = CompressError::Superseded {
            generation: 3,
            current: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("#3"), "got: {msg}");
        assert!(msg.contains("#5"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = SegmentError::Timeout { index: 7, secs: 30 };
        assert!(e.to_string().contains("Segment 7"));
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn codec_errors_map_to_segment_errors() {
        let enc = SegmentError::from_codec(2, &CodecError::Encode("rav1e".into()));
        assert!(matches!(enc, SegmentError::Encode { index: 2, .. }));

        let dec = SegmentError::from_codec(4, &CodecError::NoFrames);
        assert!(matches!(dec, SegmentError::Decode { index: 4, .. }));
    }

    #[test]
    fn segment_error_serialises() {
        let e = SegmentError::Decode {
            index: 1,
            detail: "bad".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("Decode"));
    }
}
