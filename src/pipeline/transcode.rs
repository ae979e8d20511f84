//! Per-segment transcoding: candidate data URL → replacement data URL.
//!
//! [`MediaTranscoder`] classifies the candidate, decodes its payload and hands
//! it to the still encoder or the animation transcoder. It does **not** apply
//! the size-regression guard: the dispatcher applies that to every replacement,
//! including ones produced by injected transcoders.

use crate::error::CodecError;
use crate::pipeline::classify::{classify_bytes, Classification, MediaKind};
use crate::pipeline::codec::{AnimatedTranscoder, EncodedImage, StillEncoder};
use crate::pipeline::extract::{wrap_data_url, DataUrl};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::debug;

/// What a transcoder made of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcoded {
    /// A new quoted data URL (still subject to the size guard).
    Replacement {
        content: String,
        classification: Option<Classification>,
    },
    /// Nothing to do; keep the original segment.
    PassThrough { classification: Option<Classification> },
}

/// Transcodes one candidate segment. Runs on worker threads.
pub trait SegmentTranscoder: Send + Sync {
    fn transcode(&self, candidate: &str, quality: u8) -> Result<Transcoded, CodecError>;
}

/// Default transcoder built from the two codec roles.
pub struct MediaTranscoder {
    still: Arc<dyn StillEncoder>,
    animated: Arc<dyn AnimatedTranscoder>,
}

impl MediaTranscoder {
    pub fn new(still: Arc<dyn StillEncoder>, animated: Arc<dyn AnimatedTranscoder>) -> Self {
        Self { still, animated }
    }
}

impl SegmentTranscoder for MediaTranscoder {
    fn transcode(&self, candidate: &str, quality: u8) -> Result<Transcoded, CodecError> {
        let url = DataUrl::parse(candidate)?;
        let bytes = STANDARD.decode(url.payload)?;
        let classification = classify_bytes(&bytes);

        let encoded: EncodedImage = match classification.kind {
            MediaKind::AnimatedRasterContainer => {
                debug!(
                    "Keeping already-animated {:?} container",
                    classification.family
                );
                return Ok(Transcoded::PassThrough {
                    classification: Some(classification),
                });
            }
            MediaKind::StillRaster => {
                let image = image::load_from_memory(&bytes)?;
                self.still.encode(&image, quality)?
            }
            MediaKind::AnimatedVector => {
                self.animated
                    .transcode(&bytes, classification.family, quality)?
            }
        };

        let content = wrap_data_url(url.quote, encoded.mime, &STANDARD.encode(&encoded.bytes));
        Ok(Transcoded::Replacement {
            content,
            classification: Some(classification),
        })
    }
}
