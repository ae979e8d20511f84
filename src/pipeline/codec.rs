//! Codec collaborators: still-image encoding and animated re-encoding.
//!
//! The pipeline only ever talks to the two traits below; the default
//! implementations wrap the `image` crate. Both are CPU-bound and may fail,
//! and both run on worker-pool threads, never on the async runtime.

use crate::error::CodecError;
use crate::pipeline::classify::ContainerFamily;
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frame};
use std::io::Cursor;
use tracing::debug;

/// Encoded output of a codec call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Full mime type, e.g. `image/avif`.
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Re-encodes a decoded still image.
pub trait StillEncoder: Send + Sync {
    /// `quality` is forwarded untouched; interpretation is up to the codec.
    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<EncodedImage, CodecError>;
}

/// Re-encodes a whole animated container into the intermediate animated format.
pub trait AnimatedTranscoder: Send + Sync {
    fn transcode(
        &self,
        container: &[u8],
        family: ContainerFamily,
        quality: u8,
    ) -> Result<EncodedImage, CodecError>;
}

// ── AVIF still encoder ───────────────────────────────────────────────────────

/// AVIF via `ravif` (through `image`), the default still encoder.
#[derive(Debug, Clone, Copy)]
pub struct AvifStillEncoder {
    /// Encoder effort, 1 (slowest, smallest) to 10 (fastest).
    pub speed: u8,
}

impl Default for AvifStillEncoder {
    fn default() -> Self {
        Self { speed: 6 }
    }
}

impl StillEncoder for AvifStillEncoder {
    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<EncodedImage, CodecError> {
        // ravif asserts quality >= 1; fail this image instead of panicking.
        if quality == 0 {
            return Err(CodecError::Encode("AVIF quality must be at least 1".into()));
        }

        // The AVIF encoder only takes 8-bit RGB(A); 16-bit and float buffers are narrowed.
        let normalised = match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => None,
            other if other.color().has_alpha() => Some(DynamicImage::ImageRgba8(other.to_rgba8())),
            other => Some(DynamicImage::ImageRgb8(other.to_rgb8())),
        };
        let image = normalised.as_ref().unwrap_or(image);

        let mut buf = Vec::new();
        let encoder = AvifEncoder::new_with_speed_quality(&mut buf, self.speed, quality);
        image
            .write_with_encoder(encoder)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        debug!(
            "AVIF {}x{} q={} speed={} → {} bytes",
            image.width(),
            image.height(),
            quality,
            self.speed,
            buf.len()
        );
        Ok(EncodedImage {
            mime: "image/avif",
            bytes: buf,
        })
    }
}

// ── GIF animation transcoder ─────────────────────────────────────────────────

/// Decodes every frame of a GIF or animated WebP and writes a looping GIF.
///
/// Palette quantisation makes this the lossy intermediate container; higher
/// `quality` buys a slower, more accurate quantiser.
#[derive(Debug, Clone, Copy, Default)]
pub struct GifAnimationTranscoder;

impl GifAnimationTranscoder {
    /// Map quality 0..=100 onto the NeuQuant sampling factor 30..=1.
    pub fn quantiser_speed(quality: u8) -> i32 {
        let q = i32::from(quality.min(100));
        (30 - q * 29 / 100).clamp(1, 30)
    }
}

impl AnimatedTranscoder for GifAnimationTranscoder {
    fn transcode(
        &self,
        container: &[u8],
        family: ContainerFamily,
        quality: u8,
    ) -> Result<EncodedImage, CodecError> {
        let frames = decode_frames(container, family)?;
        if frames.is_empty() {
            return Err(CodecError::NoFrames);
        }
        let frame_count = frames.len();

        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut buf, Self::quantiser_speed(quality));
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
            encoder
                .encode_frames(frames)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }

        debug!(
            "Animated {:?} → GIF, {} frames, {} bytes",
            family,
            frame_count,
            buf.len()
        );
        Ok(EncodedImage {
            mime: "image/gif",
            bytes: buf,
        })
    }
}

fn decode_frames(container: &[u8], family: ContainerFamily) -> Result<Vec<Frame>, CodecError> {
    let frames = match family {
        ContainerFamily::Gif => GifDecoder::new(Cursor::new(container))?
            .into_frames()
            .collect_frames()?,
        ContainerFamily::WebP => WebPDecoder::new(Cursor::new(container))?
            .into_frames()
            .collect_frames()?,
        other => {
            return Err(CodecError::Unsupported(format!(
                "{other:?} has no animation decoder"
            )))
        }
    };
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Delay, Rgba, RgbaImage};

    fn noisy_image(w: u32, h: u32) -> DynamicImage {
        let mut state = 0x2545_F491u32;
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgba([r, g, b, 255])
        }))
    }

    #[test]
    fn quantiser_speed_bounds() {
        assert_eq!(GifAnimationTranscoder::quantiser_speed(0), 30);
        assert_eq!(GifAnimationTranscoder::quantiser_speed(100), 1);
        assert_eq!(GifAnimationTranscoder::quantiser_speed(255), 1);
        let mid = GifAnimationTranscoder::quantiser_speed(50);
        assert!(mid > 1 && mid < 30);
    }

    #[test]
    fn avif_rejects_zero_quality() {
        let err = AvifStillEncoder { speed: 10 }
            .encode(&noisy_image(4, 4), 0)
            .unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)), "got {err:?}");
    }

    #[test]
    fn avif_encodes_small_image() {
        let img = noisy_image(16, 16);
        let out = AvifStillEncoder { speed: 10 }
            .encode(&img, 40)
            .expect("encode should succeed");
        assert_eq!(out.mime, "image/avif");
        assert!(!out.bytes.is_empty());
    }

    #[test]
    fn avif_accepts_grayscale() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([90])));
        let out = AvifStillEncoder { speed: 10 }.encode(&img, 50);
        assert!(out.is_ok());
    }

    #[test]
    fn gif_round_trips_frames() {
        let mut src = Vec::new();
        {
            let mut enc = GifEncoder::new(&mut src);
            let frames = (0..3).map(|i| {
                let img = RgbaImage::from_pixel(4, 4, Rgba([i * 80, 0, 0, 255]));
                Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(100, 1))
            });
            enc.encode_frames(frames).unwrap();
        }

        let out = GifAnimationTranscoder
            .transcode(&src, ContainerFamily::Gif, 50)
            .expect("transcode should succeed");
        assert_eq!(out.mime, "image/gif");

        let frames = GifDecoder::new(Cursor::new(&out.bytes))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn animation_rejects_unsupported_family() {
        let err = GifAnimationTranscoder
            .transcode(b"\xFF\xD8\xFF", ContainerFamily::Jpeg, 50)
            .unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(_)));
    }

    #[test]
    fn animation_reports_corrupt_input() {
        let err = GifAnimationTranscoder
            .transcode(b"GIF89a\x00", ContainerFamily::Gif, 50)
            .unwrap_err();
        assert!(matches!(err, CodecError::Image(_)));
    }
}
