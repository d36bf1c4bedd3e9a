//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an 8-bit
//! RGB raster. Alpha is discarded: layout maps and satellite tiles are
//! treated as opaque.
//!
//! This is the first step of every run: raw bytes in, `RgbImage` out.

use crate::types::{AnalysisError, ImageRole, RgbImage};

/// Decode raw image bytes into an RGB raster.
///
/// # Errors
///
/// Returns [`AnalysisError::EmptyInput`] if `bytes` is empty.
/// Returns [`AnalysisError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8], role: ImageRole) -> Result<RgbImage, AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::EmptyInput(role));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|source| AnalysisError::ImageDecode { role, source })?;
    Ok(img.to_rgb8())
}

/// Convert an RGB raster to grayscale with the standard luminance
/// weights (`0.299 R + 0.587 G + 0.114 B`).
#[must_use]
pub fn to_gray(image: &RgbImage) -> image::GrayImage {
    image::imageops::grayscale(image)
}
