//! Vector plot geometry.
//!
//! [`PlotPolygon`] wraps a `geo::MultiPolygon<f64>` in pixel-edge
//! coordinates: the unit square `(x, y)..(x + 1, y + 1)` is pixel
//! `(x, y)`, so a polygon and its rasterization agree on area for
//! axis-aligned shapes. A plot normally has one exterior ring, but boolean
//! operations and repair can split it, so the multi form is kept
//! throughout.
//!
//! Invalid rings (self-intersections, bow-ties) are normalized with an
//! even-odd boolean union, the zero-width equivalent of buffering by
//! zero: every lobe of a crossed ring is kept whatever its winding.
//! Repair is reported as a [`RepairOutcome`] value rather than an error.

use geo::algorithm::bool_ops::FillRule;
use geo::{
    Area, BooleanOps, BoundingRect, Contains, Coord, LineString, MapCoords,
    MultiPolygon, Point, Polygon, Translate, Validation,
};

use crate::types::{BinaryMask, Dimensions, Rect};

/// An approved or detected plot outline in frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotPolygon {
    shape: MultiPolygon<f64>,
}

/// Result of [`PlotPolygon::repair`].
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// The geometry was already valid.
    Valid(PlotPolygon),
    /// The geometry was invalid and normalization produced a valid one.
    Repaired(PlotPolygon),
    /// Normalization produced nothing usable; treat as zero area.
    Degenerate,
}

impl RepairOutcome {
    /// The usable polygon, if any.
    #[must_use]
    pub fn into_polygon(self) -> Option<PlotPolygon> {
        match self {
            Self::Valid(p) | Self::Repaired(p) => Some(p),
            Self::Degenerate => None,
        }
    }

    /// Returns `true` if repair had to change the geometry.
    #[must_use]
    pub const fn was_repaired(&self) -> bool {
        matches!(self, Self::Repaired(_))
    }
}

impl PlotPolygon {
    /// Wrap a single polygon.
    #[must_use]
    pub fn from_polygon(polygon: Polygon<f64>) -> Self {
        Self {
            shape: MultiPolygon::new(vec![polygon]),
        }
    }

    /// Wrap a multipolygon.
    #[must_use]
    pub const fn from_multi(shape: MultiPolygon<f64>) -> Self {
        Self { shape }
    }

    /// A polygon from an exterior ring. The ring is closed automatically.
    #[must_use]
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let ring: Vec<Coord<f64>> = points.iter().map(|&(x, y)| Coord { x, y }).collect();
        Self::from_polygon(Polygon::new(LineString::from(ring), vec![]))
    }

    /// The polygon covering exactly the pixels of `rect`.
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        let (x0, y0) = (f64::from(rect.x), f64::from(rect.y));
        let (x1, y1) = (f64::from(rect.right()), f64::from(rect.bottom()));
        Self::from_points(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    /// Borrow the underlying geometry.
    #[must_use]
    pub const fn as_multi(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    /// Member polygons.
    pub fn polygons(&self) -> impl Iterator<Item = &Polygon<f64>> {
        self.shape.0.iter()
    }

    /// Unsigned area in square pixels.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    /// Returns `true` if there is no enclosed area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.0.is_empty() || self.area() <= 0.0
    }

    /// OGC validity (closed, non-self-intersecting rings).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.shape.is_valid()
    }

    /// The part of `self` lying inside `other`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self::from_multi(self.shape.intersection(&other.shape))
    }

    /// The part of `self` lying outside `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self::from_multi(self.shape.difference(&other.shape))
    }

    /// Normalize invalid geometry.
    ///
    /// Valid input is returned as is. Otherwise each member polygon is
    /// resolved into simple parts under the even-odd rule and the parts
    /// are unioned. An empty or still-invalid result is
    /// [`RepairOutcome::Degenerate`].
    #[must_use]
    pub fn repair(self) -> RepairOutcome {
        if self.is_valid() {
            return if self.is_empty() {
                RepairOutcome::Degenerate
            } else {
                RepairOutcome::Valid(self)
            };
        }
        let normalized = Self::from_multi(even_odd_union(&self.shape));
        if normalized.is_empty() || !normalized.is_valid() {
            RepairOutcome::Degenerate
        } else {
            RepairOutcome::Repaired(normalized)
        }
    }

    /// Shift every coordinate by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::from_multi(self.shape.translate(dx, dy))
    }

    /// Place geometry given in map units (x east, y north) into `frame`.
    ///
    /// The shape is scaled uniformly to fit inside the frame less
    /// `padding` (a fraction of each side), centered, and flipped so north
    /// is up. Returns `None` when the bounds are degenerate (zero or
    /// non-finite width or height).
    #[must_use]
    pub fn fit_to(&self, frame: Dimensions, padding: f64) -> Option<Self> {
        let bounds = self.shape.bounding_rect()?;
        let (w, h) = (bounds.width(), bounds.height());
        if w <= 0.0 || h <= 0.0 || !w.is_finite() || !h.is_finite() {
            return None;
        }
        let padding = if padding.is_finite() {
            padding.clamp(0.0, 0.45)
        } else {
            0.0
        };
        let (fw, fh) = (f64::from(frame.width), f64::from(frame.height));
        let usable = 1.0 - 2.0 * padding;
        let scale = (fw * usable / w).min(fh * usable / h);
        let ox = w.mul_add(-scale, fw) / 2.0;
        let oy = h.mul_add(-scale, fh) / 2.0;
        let (min_x, max_y) = (bounds.min().x, bounds.max().y);
        Some(Self::from_multi(self.shape.map_coords(|c| Coord {
            x: (c.x - min_x).mul_add(scale, ox),
            y: (max_y - c.y).mul_add(scale, oy),
        })))
    }

    /// Rasterize into a mask: a pixel is foreground when its center lies
    /// inside the geometry.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn rasterize(&self, frame: Dimensions) -> BinaryMask {
        let mut mask = BinaryMask::new(frame);
        let Some(bounds) = self.shape.bounding_rect() else {
            return mask;
        };
        let x0 = bounds.min().x.floor().max(0.0) as u32;
        let y0 = bounds.min().y.floor().max(0.0) as u32;
        let x1 = (bounds.max().x.ceil().max(0.0) as u32).min(frame.width);
        let y1 = (bounds.max().y.ceil().max(0.0) as u32).min(frame.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if self.shape.contains(&center) {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }
}

/// Union of the member polygons, each read with the even-odd fill rule.
///
/// A winding fill drops the lobes of a crossed ring that wind the other
/// way; even-odd keeps them.
fn even_odd_union(shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let empty = MultiPolygon::<f64>::new(Vec::new());
    shape.0.iter().fold(MultiPolygon::new(Vec::new()), |acc, polygon| {
        let simple = polygon.union_with_fill_rule(&empty, FillRule::EvenOdd);
        acc.union_with_fill_rule(&simple, FillRule::EvenOdd)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> PlotPolygon {
        PlotPolygon::from_points(&[(x, y), (x + side, y), (x + side, y + side), (x, y + side)])
    }

    #[test]
    fn area_of_square() {
        assert!((square(0.0, 0.0, 10.0).area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn difference_of_disjoint_is_self() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(20.0, 20.0, 5.0);
        assert!((a.difference(&b).area() - 100.0).abs() < 1e-9);
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn difference_of_overlap() {
        let approved = square(0.0, 0.0, 10.0);
        let building = square(5.0, 0.0, 10.0);
        assert!((building.difference(&approved).area() - 50.0).abs() < 1e-9);
        assert!((building.intersection(&approved).area() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn valid_polygon_repairs_to_itself() {
        let p = square(0.0, 0.0, 4.0);
        assert_eq!(p.clone().repair(), RepairOutcome::Valid(p));
    }

    #[test]
    fn bow_tie_is_repaired() {
        let bow_tie = PlotPolygon::from_points(&[(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)]);
        assert!(!bow_tie.is_valid());
        let outcome = bow_tie.repair();
        assert!(outcome.was_repaired());
        let fixed = outcome.into_polygon().unwrap();
        assert!(fixed.is_valid());
        assert!((fixed.area() - 50.0).abs() < 1e-6, "area = {}", fixed.area());
    }

    #[test]
    fn repair_keeps_every_member() {
        let bow_tie = PlotPolygon::from_points(&[(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)]);
        let parts = PlotPolygon::from_multi(MultiPolygon::new(vec![
            bow_tie.polygons().next().unwrap().clone(),
            square(20.0, 20.0, 4.0).polygons().next().unwrap().clone(),
        ]));
        let fixed = parts.repair().into_polygon().unwrap();
        assert!((fixed.area() - 66.0).abs() < 1e-6, "area = {}", fixed.area());
    }

    #[test]
    fn collinear_ring_is_degenerate() {
        let line = PlotPolygon::from_points(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]);
        assert_eq!(line.repair(), RepairOutcome::Degenerate);
    }

    #[test]
    fn rasterize_rect_matches_pixels() {
        let frame = Dimensions::new(50, 50);
        let rect = Rect::new(10, 5, 20, 15);
        let mask = PlotPolygon::from_rect(rect).rasterize(frame);
        assert_eq!(mask, BinaryMask::filled_rect(frame, rect));
    }

    #[test]
    fn rasterize_clips_to_frame() {
        let frame = Dimensions::new(10, 10);
        let mask = square(-5.0, -5.0, 10.0).rasterize(frame);
        assert_eq!(mask.count(), 25);
    }

    #[test]
    fn fit_to_centers_with_padding() {
        let geo_units = PlotPolygon::from_points(&[
            (77.10, 28.50),
            (77.12, 28.50),
            (77.12, 28.52),
            (77.10, 28.52),
        ]);
        let fitted = geo_units.fit_to(Dimensions::new(200, 100), 0.1).unwrap();
        // 80% of the shorter side, aspect preserved.
        assert!((fitted.area() - 6_400.0).abs() < 1e-3);
        let bounds = fitted.as_multi().bounding_rect().unwrap();
        assert!((bounds.min().x - 60.0).abs() < 1e-6);
        assert!((bounds.min().y - 10.0).abs() < 1e-6);
    }

    #[test]
    fn fit_to_puts_north_at_the_top() {
        // Triangle with its apex at the northern edge.
        let tri = PlotPolygon::from_points(&[(0.0, 0.0), (10.0, 0.0), (5.0, 10.0)]);
        let fitted = tri.fit_to(Dimensions::new(100, 100), 0.0).unwrap();
        let mask = fitted.rasterize(Dimensions::new(100, 100));
        assert!(mask.get(50, 2));
        assert!(!mask.get(2, 2));
        assert!(mask.get(2, 98));
    }

    #[test]
    fn fit_to_rejects_degenerate_bounds() {
        let line = PlotPolygon::from_points(&[(0.0, 1.0), (5.0, 1.0), (9.0, 1.0)]);
        assert!(line.fit_to(Dimensions::new(10, 10), 0.1).is_none());
    }

    #[test]
    fn translate_moves_geometry() {
        let moved = square(0.0, 0.0, 2.0).translated(3.0, 4.0);
        let mask = moved.rasterize(Dimensions::new(10, 10));
        assert!(mask.get(3, 4) && mask.get(4, 5));
        assert!(!mask.get(2, 4));
    }
}
