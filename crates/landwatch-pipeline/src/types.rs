//! Shared types for the landwatch analysis pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference decoded
/// color rasters and rendered overlays without depending on `image`.
pub use image::RgbImage;

/// Pixel value used for foreground pixels in a [`BinaryMask`].
pub const FOREGROUND: u8 = 255;

/// Pixel value used for background pixels in a [`BinaryMask`].
pub const BACKGROUND: u8 = 0;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new set of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The rectangle covering the whole frame.
    #[must_use]
    pub const fn full_rect(self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An axis-aligned pixel rectangle `(x, y, width, height)`.
///
/// `x`/`y` address the top-left pixel; the rectangle covers
/// `x..x + width` and `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Right edge (exclusive).
    #[must_use]
    pub const fn right(self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    #[must_use]
    pub const fn bottom(self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Clip the rectangle to a frame. May return an empty rectangle.
    #[must_use]
    pub fn clamp_to(self, frame: Dimensions) -> Self {
        let x = self.x.min(frame.width);
        let y = self.y.min(frame.height);
        let right = self.right().min(frame.width);
        let bottom = self.bottom().min(frame.height);
        Self::new(x, y, right - x, bottom - y)
    }

    /// A rectangle of `fraction` of each side, centered in `frame`.
    ///
    /// `fraction` is clamped to `[0, 1]`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn centered(frame: Dimensions, fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let width = (f64::from(frame.width) * fraction).round() as u32;
        let height = (f64::from(frame.height) * fraction).round() as u32;
        let x = (frame.width - width.min(frame.width)) / 2;
        let y = (frame.height - height.min(frame.height)) / 2;
        Self::new(x, y, width, height).clamp_to(frame)
    }

    /// Returns `true` if the pixel `(px, py)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

/// A single-bit-per-pixel mask over a fixed frame.
///
/// Every pixel is either [`FOREGROUND`] (255) or [`BACKGROUND`] (0).
/// Constructors normalize any non-zero value to foreground, so the
/// invariant holds regardless of the source raster.
///
/// Binary operations between masks of different sizes treat pixels
/// outside the other mask as background; the result always has the
/// dimensions of `self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// An all-background mask.
    #[must_use]
    pub fn new(dimensions: Dimensions) -> Self {
        Self(GrayImage::new(dimensions.width, dimensions.height))
    }

    /// Wrap a grayscale raster, treating every non-zero pixel as foreground.
    #[must_use]
    pub fn from_gray(mut image: GrayImage) -> Self {
        for p in image.pixels_mut() {
            if p.0[0] != BACKGROUND {
                p.0[0] = FOREGROUND;
            }
        }
        Self(image)
    }

    /// Build a mask from a per-pixel predicate.
    #[must_use]
    pub fn from_fn(dimensions: Dimensions, f: impl Fn(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(
            dimensions.width,
            dimensions.height,
            |x, y| image::Luma([if f(x, y) { FOREGROUND } else { BACKGROUND }]),
        ))
    }

    /// A mask whose foreground is exactly `rect` (clipped to the frame).
    #[must_use]
    pub fn filled_rect(dimensions: Dimensions, rect: Rect) -> Self {
        Self::from_fn(dimensions, |x, y| rect.contains(x, y))
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.0.width(), self.0.height())
    }

    /// Whether pixel `(x, y)` is foreground. Out-of-bounds is background.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.0
            .get_pixel_checked(x, y)
            .is_some_and(|p| p.0[0] != BACKGROUND)
    }

    /// Set pixel `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, foreground: bool) {
        if let Some(p) = self.0.get_pixel_mut_checked(x, y) {
            p.0[0] = if foreground { FOREGROUND } else { BACKGROUND };
        }
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.0
            .pixels()
            .map(|p| u64::from(p.0[0] != BACKGROUND))
            .sum()
    }

    /// Returns `true` if there are no foreground pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.pixels().all(|p| p.0[0] == BACKGROUND)
    }

    /// Bitwise NOT.
    #[must_use]
    pub fn not(&self) -> Self {
        self.map(|x, y| !self.get(x, y))
    }

    /// Pixels set in both `self` and `other`.
    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        self.map(|x, y| self.get(x, y) && other.get(x, y))
    }

    /// Pixels set in `self` but not in `other`.
    #[must_use]
    pub fn and_not(&self, other: &Self) -> Self {
        self.map(|x, y| self.get(x, y) && !other.get(x, y))
    }

    /// Pixels set in either `self` or `other`.
    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        self.map(|x, y| self.get(x, y) || other.get(x, y))
    }

    /// Tight bounding box of the foreground, or `None` if empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<Rect> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut any = false;
        for (x, y, p) in self.0.enumerate_pixels() {
            if p.0[0] != BACKGROUND {
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
        any.then(|| Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    /// Copy out the sub-region `rect` (clipped to the frame).
    #[must_use]
    pub fn crop(&self, rect: Rect) -> MaskCrop {
        let rect = rect.clamp_to(self.dimensions());
        let mask = Self(
            image::imageops::crop_imm(&self.0, rect.x, rect.y, rect.width, rect.height)
                .to_image(),
        );
        MaskCrop { mask, offset: rect }
    }

    /// OR a crop back into this mask at its recorded offset.
    ///
    /// Pixels falling outside the frame are dropped.
    pub fn paste(&mut self, crop: &MaskCrop) {
        let origin = crop.offset;
        for (x, y, p) in crop.mask.0.enumerate_pixels() {
            if p.0[0] != BACKGROUND {
                self.set(origin.x + x, origin.y + y, true);
            }
        }
    }

    /// Borrow the underlying raster (0/255 values).
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return the underlying raster.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    fn map(&self, f: impl Fn(u32, u32) -> bool) -> Self {
        Self::from_fn(self.dimensions(), f)
    }
}

/// A [`BinaryMask`] covering a sub-region of a parent frame.
///
/// `offset` records where the crop sits in the parent so it can be
/// pasted back with [`BinaryMask::paste`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskCrop {
    /// The cropped mask (dimensions equal `offset.width x offset.height`).
    pub mask: BinaryMask,
    /// Position and size of the crop in the parent frame.
    pub offset: Rect,
}

impl MaskCrop {
    /// Wrap a locally computed mask with its parent-frame offset.
    #[must_use]
    pub const fn new(mask: BinaryMask, offset: Rect) -> Self {
        Self { mask, offset }
    }
}

/// Which of the two input images an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    /// The reference layout map carrying the approved boundary.
    Reference,
    /// The satellite image showing current construction.
    Satellite,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::Satellite => f.write_str("satellite"),
        }
    }
}

/// Errors that can occur during an analysis run.
///
/// Only unreadable input and bad configuration are fatal. Missing
/// boundaries, empty regions of interest and degenerate areas are
/// handled by fallbacks and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The input image bytes were empty.
    #[error("{0} image data is empty")]
    EmptyInput(ImageRole),

    /// Failed to decode an input image.
    #[error("failed to decode {role} image: {source}")]
    ImageDecode {
        /// Which input failed.
        role: ImageRole,
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// Analysis configuration is invalid.
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions::new(w, h)
    }

    // --- Rect tests ---

    #[test]
    fn rect_empty_when_either_side_zero() {
        assert!(Rect::new(3, 3, 0, 10).is_empty());
        assert!(Rect::new(3, 3, 10, 0).is_empty());
        assert!(!Rect::new(3, 3, 1, 1).is_empty());
    }

    #[test]
    fn rect_clamp_to_frame() {
        let r = Rect::new(80, 90, 50, 50).clamp_to(dims(100, 100));
        assert_eq!(r, Rect::new(80, 90, 20, 10));
    }

    #[test]
    fn rect_clamp_fully_outside_is_empty() {
        let r = Rect::new(200, 200, 10, 10).clamp_to(dims(100, 100));
        assert!(r.is_empty());
    }

    #[test]
    fn centered_rect_sixty_percent() {
        let r = Rect::centered(dims(100, 50), 0.6);
        assert_eq!(r, Rect::new(20, 10, 60, 30));
    }

    #[test]
    fn centered_rect_nan_fraction_is_empty() {
        assert!(Rect::centered(dims(100, 100), f64::NAN).is_empty());
    }

    // --- BinaryMask tests ---

    #[test]
    fn from_gray_normalizes_nonzero() {
        let mut img = GrayImage::new(3, 1);
        img.put_pixel(0, 0, image::Luma([1]));
        img.put_pixel(1, 0, image::Luma([200]));
        let mask = BinaryMask::from_gray(img);
        assert_eq!(mask.as_gray().get_pixel(0, 0).0[0], FOREGROUND);
        assert_eq!(mask.as_gray().get_pixel(1, 0).0[0], FOREGROUND);
        assert_eq!(mask.as_gray().get_pixel(2, 0).0[0], BACKGROUND);
        assert_eq!(mask.count(), 2);
    }

    #[test]
    fn set_algebra() {
        let a = BinaryMask::filled_rect(dims(10, 10), Rect::new(0, 0, 6, 10));
        let b = BinaryMask::filled_rect(dims(10, 10), Rect::new(4, 0, 6, 10));
        assert_eq!(a.and(&b).count(), 20);
        assert_eq!(a.and_not(&b).count(), 40);
        assert_eq!(a.or(&b).count(), 100);
        assert_eq!(a.not().count(), 40);
    }

    #[test]
    fn mismatched_sizes_treat_missing_as_background() {
        let big = BinaryMask::filled_rect(dims(10, 10), dims(10, 10).full_rect());
        let small = BinaryMask::filled_rect(dims(5, 5), dims(5, 5).full_rect());
        let anded = big.and(&small);
        assert_eq!(anded.dimensions(), dims(10, 10));
        assert_eq!(anded.count(), 25);
    }

    #[test]
    fn bounding_box_of_empty_is_none() {
        assert!(BinaryMask::new(dims(5, 5)).bounding_box().is_none());
    }

    #[test]
    fn bounding_box_is_tight() {
        let mut mask = BinaryMask::new(dims(20, 20));
        mask.set(3, 4, true);
        mask.set(10, 15, true);
        assert_eq!(mask.bounding_box(), Some(Rect::new(3, 4, 8, 12)));
    }

    #[test]
    fn crop_and_paste_round_trip_position() {
        let mask = BinaryMask::filled_rect(dims(30, 30), Rect::new(10, 12, 5, 6));
        let crop = mask.crop(Rect::new(8, 8, 15, 15));
        assert_eq!(crop.mask.dimensions(), dims(15, 15));
        assert_eq!(crop.mask.count(), 30);

        let mut target = BinaryMask::new(dims(30, 30));
        target.paste(&crop);
        assert_eq!(target, mask);
    }

    #[test]
    fn out_of_bounds_access_is_background() {
        let mut mask = BinaryMask::new(dims(4, 4));
        mask.set(10, 10, true);
        assert!(!mask.get(10, 10));
        assert!(mask.is_empty());
    }

    // --- Error tests ---

    #[test]
    fn error_empty_input_display() {
        let err = AnalysisError::EmptyInput(ImageRole::Satellite);
        assert_eq!(err.to_string(), "satellite image data is empty");
    }

    #[test]
    fn error_invalid_config_display() {
        let err = AnalysisError::InvalidConfig("min_solidity must be in [0, 1]".to_string());
        assert_eq!(
            err.to_string(),
            "invalid analysis configuration: min_solidity must be in [0, 1]",
        );
    }

    #[test]
    fn dimensions_serde_round_trip() {
        let d = dims(640, 480);
        let json = serde_json::to_string(&d).unwrap();
        let back: Dimensions = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
