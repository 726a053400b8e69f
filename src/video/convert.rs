//! JPEG conversion between the ingest path and the transport pixel layout
//!
//! Ingest compresses raw RGB24 frames to JPEG; the track bridge decodes
//! them back to RGB24 for the transport. Both directions use the pure-Rust
//! `image` codec.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

use crate::error::{RelayError, Result};

/// Encode a tightly packed RGB24 buffer as JPEG at the given quality
pub fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Bytes> {
    let expected = (width as usize) * (height as usize) * 3;
    if rgb.len() != expected {
        return Err(RelayError::Video(format!(
            "RGB buffer size {} does not match {}x{}",
            rgb.len(),
            width,
            height
        )));
    }

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| RelayError::Video(format!("JPEG encode failed: {e}")))?;
    Ok(Bytes::from(out))
}

/// Decode a JPEG payload into tightly packed RGB24
///
/// Returns the pixel data and its dimensions.
pub fn decode_jpeg(jpeg: &[u8]) -> Result<(Bytes, u32, u32)> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
        .map_err(|e| RelayError::Video(format!("JPEG decode failed: {e}")))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok((Bytes::from(rgb.into_raw()), width, height))
}

/// Produce a black RGB24 pixel buffer of the given geometry
pub fn blank_rgb24(width: u32, height: u32) -> Bytes {
    Bytes::from(vec![0u8; (width as usize) * (height as usize) * 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_geometry() {
        // A small gradient so the encoder has something to chew on
        let (width, height) = (16, 8);
        let rgb: Vec<u8> = (0..width * height * 3).map(|i| (i % 251) as u8).collect();

        let jpeg = encode_jpeg(&rgb, width, height, 80).unwrap();
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let (pixels, w, h) = decode_jpeg(&jpeg).unwrap();
        assert_eq!((w, h), (width, height));
        assert_eq!(pixels.len(), (width * height * 3) as usize);
    }

    #[test]
    fn test_encode_rejects_wrong_geometry() {
        let result = encode_jpeg(&[0u8; 10], 4, 4, 80);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_jpeg(b"definitely not a jpeg").is_err());
        assert!(decode_jpeg(&[]).is_err());
    }

    #[test]
    fn test_blank_frame_size() {
        let pixels = blank_rgb24(640, 480);
        assert_eq!(pixels.len(), 640 * 480 * 3);
        assert!(pixels.iter().all(|&b| b == 0));
    }
}
