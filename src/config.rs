//! Configuration types for story-file compression.
//!
//! All run behaviour is controlled through [`CompressionConfig`], built via its
//! [`CompressionConfigBuilder`]. Codec collaborators and the progress callback
//! are injected here too, so tests can swap any of them for doubles.

use crate::error::CompressError;
use crate::pipeline::codec::{AnimatedTranscoder, StillEncoder};
use crate::pipeline::transcode::SegmentTranscoder;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default codec quality.
pub const DEFAULT_QUALITY: u8 = 33;

/// Configuration for a compression run.
///
/// # Example
/// ```rust
/// use cyoa_compressor::CompressionConfig;
///
/// let config = CompressionConfig::builder()
///     .quality(50)
///     .workers(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct CompressionConfig {
    /// Codec quality. Default: 33.
    ///
    /// Forwarded to the encoder as-is; no range is enforced here. The AVIF
    /// still encoder needs at least 1, so quality 0 makes every still image
    /// fail and keep its original bytes.
    pub quality: u8,

    /// AVIF encoder speed, 1 (slowest, smallest) to 10. Default: 6.
    pub speed: u8,

    /// Worker pool size. Default: available parallelism.
    ///
    /// Transcoding is CPU-bound, so more workers than cores only adds memory
    /// pressure from concurrently decoded pixel buffers.
    pub workers: usize,

    /// Per-image timeout in seconds. Default: none.
    ///
    /// On expiry the original image is kept. The job itself cannot be
    /// cancelled and keeps its slot busy until it finishes.
    pub job_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Still-image encoder. Default: AVIF.
    pub still_encoder: Option<Arc<dyn StillEncoder>>,

    /// Animation re-encoder. Default: GIF frame re-encode.
    pub animated_transcoder: Option<Arc<dyn AnimatedTranscoder>>,

    /// Replaces the whole per-segment transcoder; takes precedence over the
    /// two codec fields above.
    pub transcoder: Option<Arc<dyn SegmentTranscoder>>,

    /// Progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            speed: 6,
            workers: default_workers(),
            job_timeout_secs: None,
            download_timeout_secs: 120,
            still_encoder: None,
            animated_transcoder: None,
            transcoder: None,
            progress_callback: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionConfig")
            .field("quality", &self.quality)
            .field("speed", &self.speed)
            .field("workers", &self.workers)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "still_encoder",
                &self.still_encoder.as_ref().map(|_| "<dyn StillEncoder>"),
            )
            .field(
                "animated_transcoder",
                &self
                    .animated_transcoder
                    .as_ref()
                    .map(|_| "<dyn AnimatedTranscoder>"),
            )
            .field(
                "transcoder",
                &self.transcoder.as_ref().map(|_| "<dyn SegmentTranscoder>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl CompressionConfig {
    /// Create a new builder for `CompressionConfig`.
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CompressionConfig`].
#[derive(Debug)]
pub struct CompressionConfigBuilder {
    config: CompressionConfig,
}

impl CompressionConfigBuilder {
    pub fn quality(mut self, quality: u8) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn speed(mut self, speed: u8) -> Self {
        self.config.speed = speed.clamp(1, 10);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.job_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn still_encoder(mut self, encoder: Arc<dyn StillEncoder>) -> Self {
        self.config.still_encoder = Some(encoder);
        self
    }

    pub fn animated_transcoder(mut self, transcoder: Arc<dyn AnimatedTranscoder>) -> Self {
        self.config.animated_transcoder = Some(transcoder);
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn SegmentTranscoder>) -> Self {
        self.config.transcoder = Some(transcoder);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompressionConfig, CompressError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(CompressError::InvalidConfig(
                "Worker count must be ≥ 1".into(),
            ));
        }
        if c.job_timeout_secs == Some(0) {
            return Err(CompressError::InvalidConfig(
                "Job timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = CompressionConfig::default();
        assert_eq!(c.quality, 33);
        assert_eq!(c.speed, 6);
        assert!(c.workers >= 1);
        assert_eq!(c.job_timeout_secs, None);
    }

    #[test]
    fn quality_is_not_clamped() {
        let c = CompressionConfig::builder().quality(0).build().unwrap();
        assert_eq!(c.quality, 0);
        let c = CompressionConfig::builder().quality(255).build().unwrap();
        assert_eq!(c.quality, 255);
    }

    #[test]
    fn speed_is_clamped() {
        let c = CompressionConfig::builder().speed(0).build().unwrap();
        assert_eq!(c.speed, 1);
        let c = CompressionConfig::builder().speed(99).build().unwrap();
        assert_eq!(c.speed, 10);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = CompressionConfig::builder().workers(0).build().unwrap_err();
        assert!(err.to_string().contains("Worker count"));
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(CompressionConfig::builder()
            .job_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = CompressionConfig::builder()
            .still_encoder(Arc::new(crate::pipeline::codec::AvifStillEncoder::default()))
            .build()
            .unwrap();
        let s = format!("{c:?}");
        assert!(s.contains("<dyn StillEncoder>"));
    }
}
