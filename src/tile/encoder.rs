//! JPEG tile encoder.
//!
//! Tiles leave the renderer as RGBA buffers. The encoder drops the alpha
//! channel (the padding is already opaque) and compresses the pixels as a
//! baseline JPEG at a fixed quality chosen when the encoder is built.
//!
//! Encoding is deterministic: the same pixels at the same quality always
//! produce the same bytes, so a failed upload can be retried with the payload
//! it already has.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, RgbaImage};
use std::io::Cursor;

use crate::error::RenderError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// MIME type of encoded tiles.
pub const TILE_CONTENT_TYPE: &str = "image/jpeg";

/// File name sent with each tile upload.
pub const TILE_FILE_NAME: &str = "tile.jpg";

// =============================================================================
// JPEG Encoder
// =============================================================================

/// Encodes rendered tiles as JPEG.
///
/// # Example
///
/// ```
/// use image::{Rgba, RgbaImage};
/// use layout_uploader::tile::JpegTileEncoder;
///
/// let encoder = JpegTileEncoder::new(85);
/// let tile = RgbaImage::from_pixel(64, 64, Rgba([10, 20, 30, 255]));
/// let jpeg = encoder.encode(&tile).unwrap();
/// assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct JpegTileEncoder {
    quality: u8,
}

impl Default for JpegTileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegTileEncoder {
    /// Create an encoder; quality is clamped to 1-100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    /// The quality this encoder writes at.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode an RGBA tile as JPEG.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Encode`] if the tile is empty or the encoder fails.
    pub fn encode(&self, tile: &RgbaImage) -> Result<Bytes, RenderError> {
        if tile.width() == 0 || tile.height() == 0 {
            return Err(RenderError::Encode {
                message: "tile has no pixels".to_string(),
            });
        }

        let rgb = DynamicImage::ImageRgba8(tile.clone()).to_rgb8();

        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| RenderError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }

    /// Read the dimensions of an encoded tile without fully decoding it.
    pub fn dimensions(&self, encoded: &[u8]) -> Result<(u32, u32), RenderError> {
        let reader = ImageReader::with_format(Cursor::new(encoded), image::ImageFormat::Jpeg);

        reader
            .into_dimensions()
            .map_err(|e| RenderError::Decode {
                message: e.to_string(),
            })
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
