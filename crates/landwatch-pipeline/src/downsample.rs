//! Input size capping and naive frame alignment.
//!
//! Large uploads are downsampled so the longest axis is at most
//! `max_dimension` before any morphology runs, bounding memory and CPU
//! for adversarial inputs. The same resampler aligns the satellite image
//! to the reference frame by a plain resize; no registration is
//! attempted.

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RgbImage};

/// Resampling filter used when downsampling or aligning.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Downsample `image` so its longest axis is at most `max_dimension`,
/// preserving aspect ratio.
///
/// Returns the (possibly unchanged) image and whether resampling was
/// applied.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn cap_dimensions(
    image: RgbImage,
    max_dimension: u32,
    filter: ResampleFilter,
) -> (RgbImage, bool) {
    let (w, h) = image.dimensions();
    let long_axis = w.max(h);
    if max_dimension == 0 || long_axis <= max_dimension {
        return (image, false);
    }

    let scale = f64::from(max_dimension) / f64::from(long_axis);
    let new_w = ((f64::from(w) * scale).round() as u32).max(1);
    let new_h = ((f64::from(h) * scale).round() as u32).max(1);
    let resized = image::imageops::resize(&image, new_w, new_h, filter.to_image_filter());
    (resized, true)
}

/// Resize `image` to exactly `target`, ignoring aspect ratio.
///
/// Returns the image unchanged when it already matches.
#[must_use]
pub fn align_to(image: RgbImage, target: Dimensions, filter: ResampleFilter) -> RgbImage {
    if image.dimensions() == (target.width, target.height) {
        return image;
    }
    image::imageops::resize(
        &image,
        target.width,
        target.height,
        filter.to_image_filter(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb([128, 128, 128]))
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(ResampleFilter::default(), ResampleFilter::Triangle);
    }

    #[test]
    fn no_cap_when_already_small() {
        let (result, applied) = cap_dimensions(test_image(100, 80), 256, ResampleFilter::Triangle);
        assert!(!applied);
        assert_eq!(result.dimensions(), (100, 80));
    }

    #[test]
    fn cap_preserves_aspect_ratio() {
        let (result, applied) = cap_dimensions(test_image(1000, 500), 200, ResampleFilter::Nearest);
        assert!(applied);
        assert_eq!(result.dimensions(), (200, 100));
    }

    #[test]
    fn cap_portrait_uses_height() {
        let (result, applied) = cap_dimensions(test_image(300, 900), 300, ResampleFilter::Triangle);
        assert!(applied);
        assert_eq!(result.dimensions(), (100, 300));
    }

    #[test]
    fn align_resizes_to_exact_target() {
        let result = align_to(
            test_image(64, 48),
            Dimensions::new(100, 100),
            ResampleFilter::Triangle,
        );
        assert_eq!(result.dimensions(), (100, 100));
    }

    #[test]
    fn display_matches_variant_names() {
        assert_eq!(ResampleFilter::CatmullRom.to_string(), "CatmullRom");
        assert_eq!(ResampleFilter::Lanczos3.to_string(), "Lanczos3");
    }
}
