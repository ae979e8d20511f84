//! Pipeline stages for story-file compression.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and codecs can be swapped without touching the ordering logic.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ dispatch ──▶ pool ──▶ transcode ──▶ reassemble
//! (path/URL) (split)    (fan-out)    (slots)  (classify+codec) (sort+join)
//! ```
//!
//! 1. [`input`]:      load the document from a path or URL as UTF-8 text
//! 2. [`extract`]:    split into indexed segments; odd positions hold
//!    quoted image data URLs
//! 3. [`dispatch`]:   submit one job per candidate, gather results in
//!    completion order, apply the size-regression guard
//! 4. [`pool`]:       fixed set of worker threads; the only place where
//!    CPU-heavy codec work runs
//! 5. [`transcode`]:  per-segment decision: [`classify`] the container,
//!    then encode via [`codec`] or pass through
//! 6. [`reassemble`]: restore document order by index and concatenate

pub mod classify;
pub mod codec;
pub mod dispatch;
pub mod extract;
pub mod input;
pub mod pool;
pub mod reassemble;
pub mod transcode;
