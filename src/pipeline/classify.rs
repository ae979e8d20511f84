//! Media classification: container family and animation sniffing.
//!
//! A bounded prefix of the base64 payload is decoded first (at most
//! [`HEADER_BYTES`] bytes), and the full payload only when a header walk runs
//! off the end of that prefix. The family comes from magic bytes, never from the
//! declared mime, and animation is detected by walking the container's binary
//! header rather than string-slicing the base64 text at fixed offsets.
//!
//! Any malformed or truncated header is logged and treated as "not animated",
//! which routes the image down the simpler still path.

use crate::error::HeaderError;
use crate::pipeline::extract::DataUrl;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Decoded bytes inspected first for each candidate.
///
/// Covers a GIF with a full 768-byte global colour table plus a NETSCAPE
/// application extension and the first graphics control extension. Headers
/// that run longer trigger a decode of the full payload.
pub const HEADER_BYTES: usize = 2048;

/// Container family detected from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFamily {
    Jpeg,
    Png,
    WebP,
    Gif,
    Avif,
    Unknown,
}

/// How a candidate is routed through the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    /// Single image; decoded to pixels and re-encoded by the still encoder.
    StillRaster,
    /// Already an animation in a container we keep as-is (APNG, AVIF sequence).
    AnimatedRasterContainer,
    /// Frame animation (GIF with a delay, animated WebP); goes down the animation path.
    AnimatedVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub family: ContainerFamily,
    pub kind: MediaKind,
}

/// Classify a candidate segment (quotes included).
///
/// Non-candidates and undecodable prefixes come back as an unknown still raster;
/// the transcoder reports the real failure when it decodes the full payload.
pub fn classify(candidate: &str) -> Classification {
    let Ok(url) = DataUrl::parse(candidate) else {
        return Classification {
            family: ContainerFamily::Unknown,
            kind: MediaKind::StillRaster,
        };
    };

    let header = match decode_prefix(url.payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Undecodable payload header ({}): {}", url.subtype, e);
            Vec::new()
        }
    };

    // Extension blocks can push the deciding field past the window; only then
    // is the whole payload decoded.
    let family = detect_family(&header);
    let cut = url.payload.len() > PREFIX_CHARS;
    let classification = match walk_header(family, &header) {
        Some(Err(HeaderError::Truncated { .. })) if cut => {
            debug!(
                "{:?} header runs past {} bytes, decoding full payload",
                family, HEADER_BYTES
            );
            match STANDARD.decode(url.payload) {
                Ok(full) => classify_bytes(&full),
                Err(e) => {
                    warn!("Undecodable payload ({}): {}", url.subtype, e);
                    classify_bytes(&header)
                }
            }
        }
        _ => classify_bytes(&header),
    };
    debug!(
        "Classified image/{} as {:?} / {:?}",
        url.subtype, classification.family, classification.kind
    );
    classification
}

/// Classify raw container bytes (full file or a prefix of it).
pub fn classify_bytes(bytes: &[u8]) -> Classification {
    let family = detect_family(bytes);
    let kind = match family {
        ContainerFamily::Gif | ContainerFamily::WebP => {
            fail_safe(family, walk_header(family, bytes), MediaKind::AnimatedVector)
        }
        ContainerFamily::Png => fail_safe(
            family,
            walk_header(family, bytes),
            MediaKind::AnimatedRasterContainer,
        ),
        ContainerFamily::Avif => {
            if avif_is_sequence(bytes) {
                MediaKind::AnimatedRasterContainer
            } else {
                MediaKind::StillRaster
            }
        }
        ContainerFamily::Jpeg | ContainerFamily::Unknown => MediaKind::StillRaster,
    };

    Classification { family, kind }
}

/// Run the animation walk for families that have one.
fn walk_header(family: ContainerFamily, bytes: &[u8]) -> Option<Result<bool, HeaderError>> {
    match family {
        ContainerFamily::Gif => Some(is_animated(bytes)),
        ContainerFamily::WebP => Some(webp_is_animated(bytes)),
        ContainerFamily::Png => Some(png_is_animated(bytes)),
        _ => None,
    }
}

fn fail_safe(
    family: ContainerFamily,
    animated: Option<Result<bool, HeaderError>>,
    when_animated: MediaKind,
) -> MediaKind {
    match animated {
        Some(Ok(true)) => when_animated,
        Some(Ok(false)) | None => MediaKind::StillRaster,
        Some(Err(e)) => {
            warn!("Malformed {:?} header, treating as not animated: {}", family, e);
            MediaKind::StillRaster
        }
    }
}

// Whole 4-char groups only, so the prefix never ends mid-quantum.
const PREFIX_CHARS: usize = HEADER_BYTES / 3 * 4;

/// Decode the leading base64 characters covering at most [`HEADER_BYTES`] bytes.
pub fn decode_prefix(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if payload.len() <= PREFIX_CHARS {
        return STANDARD.decode(payload);
    }
    STANDARD.decode(&payload[..PREFIX_CHARS])
}

/// Identify the container from its magic bytes.
pub fn detect_family(bytes: &[u8]) -> ContainerFamily {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ContainerFamily::Jpeg
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        ContainerFamily::Png
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        ContainerFamily::Gif
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ContainerFamily::WebP
    } else if bytes.len() >= 12
        && &bytes[4..8] == b"ftyp"
        && matches!(&bytes[8..12], b"avif" | b"avis")
    {
        ContainerFamily::Avif
    } else {
        ContainerFamily::Unknown
    }
}

// ── GIF ──────────────────────────────────────────────────────────────────────

const GIF_SIGNATURE_LEN: usize = 6;
const GIF_SCREEN_DESCRIPTOR_LEN: usize = 7;
const GIF_EXTENSION: u8 = 0x21;
const GIF_GRAPHIC_CONTROL: u8 = 0xF9;
const GIF_IMAGE_DESCRIPTOR: u8 = 0x2C;
const GIF_TRAILER: u8 = 0x3B;

/// Does the first graphics control extension declare a nonzero frame delay?
///
/// Walks signature, logical screen descriptor and the global colour table, then
/// skips any other extension blocks until the first graphics control extension.
/// Reaching image data first means no delay was declared.
pub fn is_animated(bytes: &[u8]) -> Result<bool, HeaderError> {
    if !(bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")) {
        return Err(HeaderError::BadSignature);
    }

    let descriptor_end = GIF_SIGNATURE_LEN + GIF_SCREEN_DESCRIPTOR_LEN;
    need(bytes, descriptor_end)?;
    let packed = bytes[descriptor_end - 1];

    let mut pos = descriptor_end;
    if packed & 0x80 != 0 {
        pos += 3 * (1usize << ((packed & 0x07) + 1));
    }

    loop {
        need(bytes, pos + 1)?;
        match bytes[pos] {
            GIF_EXTENSION => {
                need(bytes, pos + 2)?;
                if bytes[pos + 1] == GIF_GRAPHIC_CONTROL {
                    // 0x21 0xF9 <size> <packed> <delay lo> <delay hi> ...
                    need(bytes, pos + 6)?;
                    let delay = u16::from_le_bytes([bytes[pos + 4], bytes[pos + 5]]);
                    return Ok(delay > 0);
                }
                pos = skip_sub_blocks(bytes, pos + 2)?;
            }
            GIF_IMAGE_DESCRIPTOR | GIF_TRAILER => return Ok(false),
            other => return Err(HeaderError::UnexpectedBlock(other)),
        }
    }
}

/// Skip a chain of GIF data sub-blocks; returns the offset after the terminator.
fn skip_sub_blocks(bytes: &[u8], mut pos: usize) -> Result<usize, HeaderError> {
    loop {
        need(bytes, pos + 1)?;
        let len = bytes[pos] as usize;
        pos += 1;
        if len == 0 {
            return Ok(pos);
        }
        pos += len;
    }
}

// ── WebP ─────────────────────────────────────────────────────────────────────

const WEBP_ANIMATION_FLAG: u8 = 0x02;

/// Extended-format WebP with the animation bit set in its VP8X flags.
pub fn webp_is_animated(bytes: &[u8]) -> Result<bool, HeaderError> {
    need(bytes, 16)?;
    if &bytes[..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return Err(HeaderError::BadSignature);
    }
    if &bytes[12..16] != b"VP8X" {
        // Simple (lossy VP8 / lossless VP8L) files cannot animate.
        return Ok(false);
    }
    need(bytes, 21)?;
    Ok(bytes[20] & WEBP_ANIMATION_FLAG != 0)
}

// ── PNG ──────────────────────────────────────────────────────────────────────

/// An `acTL` chunk before the first `IDAT` marks an animated PNG.
pub fn png_is_animated(bytes: &[u8]) -> Result<bool, HeaderError> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if !bytes.starts_with(SIGNATURE) {
        return Err(HeaderError::BadSignature);
    }

    let mut pos = SIGNATURE.len();
    loop {
        need(bytes, pos + 8)?;
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        match &bytes[pos + 4..pos + 8] {
            b"acTL" => return Ok(true),
            b"IDAT" | b"IEND" => return Ok(false),
            _ => {}
        }
        // length + type + data + crc
        pos = pos
            .checked_add(12 + len)
            .ok_or(HeaderError::Truncated {
                needed: usize::MAX,
                available: bytes.len(),
            })?;
    }
}

// ── AVIF ─────────────────────────────────────────────────────────────────────

fn avif_is_sequence(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[8..12] == b"avis"
}

fn need(bytes: &[u8], needed: usize) -> Result<(), HeaderError> {
    if bytes.len() < needed {
        Err(HeaderError::Truncated {
            needed,
            available: bytes.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal GIF89a header: no global colour table, optional NETSCAPE
    /// extension, then a graphics control extension with `delay`.
    fn gif_header(delay: u16, with_gct: bool, with_netscape: bool) -> Vec<u8> {
        let mut b = b"GIF89a".to_vec();
        let packed = if with_gct { 0x80 | 0x01 } else { 0x00 };
        b.extend_from_slice(&[0x01, 0x00, 0x01, 0x00, packed, 0x00, 0x00]);
        if with_gct {
            // 3 * 2^(1+1) = 12 bytes
            b.extend_from_slice(&[0u8; 12]);
        }
        if with_netscape {
            b.extend_from_slice(&[0x21, 0xFF, 0x0B]);
            b.extend_from_slice(b"NETSCAPE2.0");
            b.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
        }
        let [lo, hi] = delay.to_le_bytes();
        b.extend_from_slice(&[0x21, 0xF9, 0x04, 0x00, lo, hi, 0x00, 0x00]);
        b.extend_from_slice(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0]);
        b
    }

    #[test]
    fn gif_with_delay_is_animated() {
        assert_eq!(is_animated(&gif_header(10, false, false)), Ok(true));
        assert_eq!(is_animated(&gif_header(10, true, true)), Ok(true));
    }

    #[test]
    fn gif_with_zero_delay_is_still() {
        assert_eq!(is_animated(&gif_header(0, true, false)), Ok(false));
        let c = classify_bytes(&gif_header(0, true, true));
        assert_eq!(c.family, ContainerFamily::Gif);
        assert_eq!(c.kind, MediaKind::StillRaster);
    }

    #[test]
    fn gif_without_control_extension_is_still() {
        let mut b = b"GIF87a".to_vec();
        b.extend_from_slice(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        b.push(0x2C);
        assert_eq!(is_animated(&b), Ok(false));
    }

    #[test]
    fn truncated_gif_fails_safe() {
        let full = gif_header(50, true, false);
        let cut = &full[..16];
        assert!(matches!(is_animated(cut), Err(HeaderError::Truncated { .. })));
        assert_eq!(classify_bytes(cut).kind, MediaKind::StillRaster);
    }

    #[test]
    fn garbage_after_gif_header_fails_safe() {
        let mut b = b"GIF89a".to_vec();
        b.extend_from_slice(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x99]);
        assert_eq!(is_animated(&b), Err(HeaderError::UnexpectedBlock(0x99)));
        assert_eq!(classify_bytes(&b).kind, MediaKind::StillRaster);
    }

    fn webp_vp8x(flags: u8) -> Vec<u8> {
        let mut b = b"RIFF".to_vec();
        b.extend_from_slice(&[0x20, 0, 0, 0]);
        b.extend_from_slice(b"WEBPVP8X");
        b.extend_from_slice(&[0x0A, 0, 0, 0, flags, 0, 0, 0]);
        b.extend_from_slice(&[0u8; 6]);
        b
    }

    #[test]
    fn webp_animation_flag() {
        assert_eq!(webp_is_animated(&webp_vp8x(0x02)), Ok(true));
        assert_eq!(webp_is_animated(&webp_vp8x(0x10)), Ok(false));
        assert_eq!(classify_bytes(&webp_vp8x(0x12)).kind, MediaKind::AnimatedVector);
    }

    #[test]
    fn simple_webp_is_still() {
        let mut b = b"RIFF\x10\x00\x00\x00WEBPVP8 ".to_vec();
        b.extend_from_slice(&[0u8; 8]);
        let c = classify_bytes(&b);
        assert_eq!(c.family, ContainerFamily::WebP);
        assert_eq!(c.kind, MediaKind::StillRaster);
    }

    fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut c = (data.len() as u32).to_be_bytes().to_vec();
        c.extend_from_slice(kind);
        c.extend_from_slice(data);
        c.extend_from_slice(&[0u8; 4]);
        c
    }

    #[test]
    fn apng_is_animated_container() {
        let mut b = b"\x89PNG\r\n\x1a\n".to_vec();
        b.extend(png_chunk(b"IHDR", &[0u8; 13]));
        b.extend(png_chunk(b"acTL", &[0u8; 8]));
        b.extend(png_chunk(b"IDAT", &[0u8; 4]));
        assert_eq!(classify_bytes(&b).kind, MediaKind::AnimatedRasterContainer);
    }

    #[test]
    fn plain_png_is_still() {
        let mut b = b"\x89PNG\r\n\x1a\n".to_vec();
        b.extend(png_chunk(b"IHDR", &[0u8; 13]));
        b.extend(png_chunk(b"IDAT", &[0u8; 4]));
        let c = classify_bytes(&b);
        assert_eq!(c.family, ContainerFamily::Png);
        assert_eq!(c.kind, MediaKind::StillRaster);
    }

    #[test]
    fn avif_brands() {
        let still = b"\x00\x00\x00\x1cftypavif\x00\x00\x00\x00";
        let seq = b"\x00\x00\x00\x1cftypavis\x00\x00\x00\x00";
        assert_eq!(classify_bytes(still).kind, MediaKind::StillRaster);
        assert_eq!(
            classify_bytes(seq).kind,
            MediaKind::AnimatedRasterContainer
        );
    }

    #[test]
    fn jpeg_family() {
        assert_eq!(detect_family(&[0xFF, 0xD8, 0xFF, 0xE0]), ContainerFamily::Jpeg);
        assert_eq!(detect_family(b"hello"), ContainerFamily::Unknown);
    }

    #[test]
    fn classify_trusts_bytes_over_mime() {
        // GIF bytes declared as png
        let payload = STANDARD.encode(gif_header(7, false, true));
        let candidate = format!("\"data:image/png;base64,{payload}\"");
        let c = classify(&candidate);
        assert_eq!(c.family, ContainerFamily::Gif);
        assert_eq!(c.kind, MediaKind::AnimatedVector);
    }

    #[test]
    fn decode_prefix_is_bounded() {
        let big = vec![0xABu8; HEADER_BYTES * 3];
        let payload = STANDARD.encode(&big);
        let prefix = decode_prefix(&payload).unwrap();
        assert!(prefix.len() <= HEADER_BYTES);
        assert!(prefix.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn long_comment_before_control_extension_is_still_found() {
        // GIF89a, no colour table, a 3000-byte comment, then GCE with delay 5.
        let mut b = b"GIF89a".to_vec();
        b.extend_from_slice(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        b.extend_from_slice(&[0x21, 0xFE]);
        for _ in 0..12 {
            b.push(250);
            b.extend_from_slice(&[b'x'; 250]);
        }
        b.push(0x00);
        b.extend_from_slice(&[0x21, 0xF9, 0x04, 0x00, 0x05, 0x00, 0x00, 0x00]);
        b.extend_from_slice(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0]);
        assert!(b.len() > HEADER_BYTES);

        let prefix_only = classify_bytes(&b[..HEADER_BYTES]);
        assert_eq!(prefix_only.kind, MediaKind::StillRaster);

        let candidate = format!("'data:image/gif;base64,{}'", STANDARD.encode(&b));
        let c = classify(&candidate);
        assert_eq!(c.family, ContainerFamily::Gif);
        assert_eq!(c.kind, MediaKind::AnimatedVector);
    }
}
