//! # cyoa-compressor
//!
//! Shrink interactive story files by re-encoding their embedded images.
//!
//! ## Why this crate?
//!
//! Story projects are single JSON-ish text files in which every picture is an
//! inline `data:image/...;base64,...` string. A project with a few hundred
//! PNG and JPEG illustrations easily weighs tens of megabytes, nearly all of
//! it image payload. Re-encoding those payloads as AVIF (and animations as a
//! quantised GIF) while leaving every other byte untouched typically cuts the
//! file to a fraction of its size without breaking the viewer that loads it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! story file
//!  │
//!  ├─ 1. Input       read local file or download from URL (must be UTF-8)
//!  ├─ 2. Extract     split into text / quoted-data-URL segments, indexed
//!  ├─ 3. Dispatch    one job per image on a fixed pool of worker threads
//!  ├─ 4. Transcode   sniff container + animation, encode, keep if smaller
//!  └─ 5. Reassemble  sort by index, concatenate, publish as artifact
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cyoa_compressor::{compress, CompressionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CompressionConfig::builder().quality(40).build()?;
//!     let output = compress("project.json", &config).await?;
//!     std::fs::write("project.min.json", &output.document)?;
//!     eprintln!("{} → {} ({} images replaced)",
//!         output.stats.input_size(),
//!         output.stats.output_size(),
//!         output.stats.replaced);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cyoa-compress` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cyoa-compressor = { version = "0.3", default-features = false }
//! ```
//!
//! ## Guarantees
//!
//! * Text outside image data URLs is reproduced byte for byte.
//! * An image is only ever replaced by a strictly smaller encoding.
//! * A failing image keeps its original bytes; the run still succeeds.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod compress;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::ArtifactInfo;
pub use compress::{compress, compress_str, compress_sync, compress_to_file, inspect, Compressor};
pub use config::{CompressionConfig, CompressionConfigBuilder, DEFAULT_QUALITY};
pub use error::{CodecError, CompressError, SegmentError};
pub use output::{
    format_elapsed, format_size, CandidateInfo, CompressionOutput, CompressionStats,
    DocumentSummary, SegmentOutcome, SegmentReport,
};
pub use pipeline::classify::{Classification, ContainerFamily, MediaKind};
pub use pipeline::codec::{AnimatedTranscoder, EncodedImage, StillEncoder};
pub use pipeline::transcode::{SegmentTranscoder, Transcoded};
pub use progress::{CompressionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::RunState;
