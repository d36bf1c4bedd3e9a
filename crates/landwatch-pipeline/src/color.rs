//! Hue/saturation/value segmentation.
//!
//! Hue uses the 8-bit half-degree scale (`0..=180`) so band limits read
//! the same as the values CAD exports and scanning tools document for
//! red boundary ink. Saturation and value use `0..=255`.

use serde::{Deserialize, Serialize};

use crate::types::{BinaryMask, Dimensions, RgbImage};

/// A pixel in HSV space (H in `0..=180`, S and V in `0..=255`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    /// Hue in half-degrees.
    pub h: u8,
    /// Saturation.
    pub s: u8,
    /// Value (brightness).
    pub v: u8,
}

/// Convert an RGB pixel to HSV.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let [r, g, b] = rgb.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let mut h = if delta <= 0.0 {
        0.0
    } else if (max - r).abs() < f32::EPSILON {
        60.0 * (g - b) / delta
    } else if (max - g).abs() < f32::EPSILON {
        60.0f32.mul_add((b - r) / delta, 120.0)
    } else {
        60.0f32.mul_add((r - g) / delta, 240.0)
    };
    if h < 0.0 {
        h += 360.0;
    }

    Hsv {
        h: (h / 2.0).round().clamp(0.0, 180.0) as u8,
        s: s.round().clamp(0.0, 255.0) as u8,
        v: max as u8,
    }
}

/// An inclusive hue interval with minimum saturation and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HueBand {
    /// Lowest hue (inclusive, half-degrees).
    pub hue_min: u8,
    /// Highest hue (inclusive, half-degrees).
    pub hue_max: u8,
    /// Minimum saturation.
    pub saturation_min: u8,
    /// Minimum value.
    pub value_min: u8,
}

impl HueBand {
    /// Red below the hue wrap-around point.
    pub const RED_LOW: Self = Self {
        hue_min: 0,
        hue_max: 10,
        saturation_min: 70,
        value_min: 50,
    };

    /// Red above the hue wrap-around point.
    pub const RED_HIGH: Self = Self {
        hue_min: 170,
        hue_max: 180,
        saturation_min: 70,
        value_min: 50,
    };

    /// Whether `hsv` falls inside this band.
    #[must_use]
    pub const fn contains(self, hsv: Hsv) -> bool {
        hsv.h >= self.hue_min
            && hsv.h <= self.hue_max
            && hsv.s >= self.saturation_min
            && hsv.v >= self.value_min
    }
}

/// Select pixels that fall in any of `bands`.
#[must_use]
pub fn band_mask(image: &RgbImage, bands: &[HueBand]) -> BinaryMask {
    BinaryMask::from_fn(Dimensions::new(image.width(), image.height()), |x, y| {
        let hsv = rgb_to_hsv(image.get_pixel(x, y).0);
        bands.iter().any(|band| band.contains(hsv))
    })
}
