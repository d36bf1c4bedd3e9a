//! Pixel-to-geographic mapping by linear interpolation over known bounds.
//!
//! The image is assumed north-up: row 0 is `max_lat`, the last row
//! `min_lat`. No projection is applied, which is accurate enough at plot
//! scale.

use serde::{Deserialize, Serialize};

use crate::types::{BinaryMask, Dimensions};

/// Geographic extent of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoBounds {
    /// Returns `true` if every edge is finite and the extent is non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.max_lat > self.min_lat
            && self.max_lon > self.min_lon
    }

    /// Map a pixel position (fractional, pixel-edge coordinates) to a
    /// geographic point.
    #[must_use]
    pub fn locate(&self, frame: Dimensions, x: f64, y: f64) -> GeoPoint {
        let width = f64::from(frame.width.max(1));
        let height = f64::from(frame.height.max(1));
        GeoPoint {
            lat: (self.max_lat - self.min_lat).mul_add(-(y / height), self.max_lat),
            lon: (self.max_lon - self.min_lon).mul_add(x / width, self.min_lon),
        }
    }

    /// Geographic centroid of the foreground of `mask`, or `None` if the
    /// mask is empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn centroid_of(&self, mask: &BinaryMask) -> Option<GeoPoint> {
        let (mut sx, mut sy, mut n) = (0.0f64, 0.0f64, 0u64);
        for (x, y, p) in mask.as_gray().enumerate_pixels() {
            if p.0[0] != 0 {
                sx += f64::from(x) + 0.5;
                sy += f64::from(y) + 0.5;
                n += 1;
            }
        }
        if n == 0 {
            return None;
        }
        let n = n as f64;
        Some(self.locate(mask.dimensions(), sx / n, sy / n))
    }
}
