//! Encroachment metrics from approved and built-up geometry.
//!
//! Two formulations share one set of clamping rules:
//!
//! - **Raster** ([`measure_raster`]): set algebra on masks. This is the
//!   authoritative measure for every analysis.
//! - **Vector** ([`measure_vector`]): polygon differences through `geo`,
//!   used as a cross-check whenever polygons are available.
//!
//! In both, the approved area is floored to 1 and the encroached area is
//! clamped to the approved area before dividing, so
//! `0 <= encroachment_pct <= 100` holds for every input.

use serde::{Deserialize, Serialize};

use crate::geometry::PlotPolygon;
use crate::morphology::{self, Element};
use crate::types::BinaryMask;

/// Default speckle-removal opening radius (3x3).
pub const DEFAULT_OPENING_RADIUS: u8 = 1;

/// Default speckle-removal opening iterations.
pub const DEFAULT_OPENING_ITERATIONS: u32 = 1;

/// Tunables for [`measure_raster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncroachmentConfig {
    /// Square opening radius applied to the encroachment mask.
    pub opening_radius: u8,
    /// Opening iterations; zero disables speckle removal.
    pub opening_iterations: u32,
}

impl Default for EncroachmentConfig {
    fn default() -> Self {
        Self {
            opening_radius: DEFAULT_OPENING_RADIUS,
            opening_iterations: DEFAULT_OPENING_ITERATIONS,
        }
    }
}

/// Pixel-count metrics for one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncroachmentMetrics {
    /// Approved pixels, floored to 1.
    pub approved_area_px: u64,
    /// All built-up pixels.
    pub builtup_area_px: u64,
    /// Built-up pixels inside the approved region.
    pub builtup_inside_px: u64,
    /// Encroached pixels, clamped to `approved_area_px`.
    pub encroached_area_px: u64,
    /// Encroached pixels before clamping.
    pub raw_encroached_area_px: u64,
    /// `100 * encroached / approved`, in `[0, 100]`.
    pub encroachment_pct: f64,
    /// `100 * builtup_inside / approved`.
    pub utilization_pct: f64,
}

impl EncroachmentMetrics {
    /// Apply the floor and clamp rules to raw pixel counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(
        approved_px: u64,
        builtup_px: u64,
        builtup_inside_px: u64,
        raw_encroached_px: u64,
    ) -> Self {
        let approved = approved_px.max(1);
        let encroached = raw_encroached_px.min(approved);
        Self {
            approved_area_px: approved,
            builtup_area_px: builtup_px,
            builtup_inside_px,
            encroached_area_px: encroached,
            raw_encroached_area_px: raw_encroached_px,
            encroachment_pct: 100.0 * encroached as f64 / approved as f64,
            utilization_pct: 100.0 * builtup_inside_px as f64 / approved as f64,
        }
    }

    /// Returns `true` if clamping changed the encroached area.
    #[must_use]
    pub const fn was_clamped(&self) -> bool {
        self.raw_encroached_area_px > self.encroached_area_px
    }
}

/// Raster encroachment result.
#[derive(Debug, Clone)]
pub struct RasterEncroachment {
    /// Clamped metrics.
    pub metrics: EncroachmentMetrics,
    /// Built-up pixels outside the approved region, after speckle removal.
    pub encroachment_mask: BinaryMask,
}

/// Measure encroachment on masks in the same frame.
///
/// `builtup AND NOT approved`, opened to drop single-pixel speckle, then
/// counted and clamped.
#[must_use]
pub fn measure_raster(
    approved: &BinaryMask,
    builtup: &BinaryMask,
    config: &EncroachmentConfig,
) -> RasterEncroachment {
    let outside = builtup.and_not(approved);
    let encroachment_mask = morphology::open(
        &outside,
        Element::Square,
        config.opening_radius,
        config.opening_iterations,
    );
    let metrics = EncroachmentMetrics::from_counts(
        approved.count(),
        builtup.count(),
        builtup.and(approved).count(),
        encroachment_mask.count(),
    );
    if metrics.was_clamped() {
        tracing::debug!(
            raw = metrics.raw_encroached_area_px,
            approved = metrics.approved_area_px,
            "encroachment clamped to approved area"
        );
    }
    RasterEncroachment {
        metrics,
        encroachment_mask,
    }
}

/// Vector encroachment result.
#[derive(Debug, Clone)]
pub struct VectorEncroachment {
    /// Approved polygon area (0 if the approved polygon was degenerate).
    pub approved_area: f64,
    /// Sum of built-up polygon areas.
    pub builtup_area: f64,
    /// Summed differenced area, clamped to the floored approved area.
    pub encroached_area: f64,
    /// `min(100, 100 * encroached / max(approved, 1))`.
    pub encroachment_pct: f64,
    /// The parts of each built-up polygon outside the approved polygon.
    pub encroachment_polygons: Vec<PlotPolygon>,
    /// Built-up polygons that needed repair.
    pub repaired: usize,
    /// Built-up polygons discarded as degenerate.
    pub degenerate: usize,
}

/// Compact form of [`VectorEncroachment`] for reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorSummary {
    /// Approved polygon area in square pixels.
    pub approved_area: f64,
    /// Clamped encroached area in square pixels.
    pub encroached_area: f64,
    /// Vector encroachment percentage.
    pub encroachment_pct: f64,
    /// Built-up polygons that contributed.
    pub polygons: usize,
    /// Built-up polygons that needed repair.
    pub repaired: usize,
    /// Built-up polygons discarded as degenerate.
    pub degenerate: usize,
}

impl VectorEncroachment {
    /// Report-sized summary.
    #[must_use]
    pub fn summary(&self) -> VectorSummary {
        VectorSummary {
            approved_area: self.approved_area,
            encroached_area: self.encroached_area,
            encroachment_pct: self.encroachment_pct,
            polygons: self.encroachment_polygons.len(),
            repaired: self.repaired,
            degenerate: self.degenerate,
        }
    }
}

/// Measure encroachment with polygon differences.
///
/// Each built-up polygon is repaired if invalid; one that cannot be
/// repaired contributes zero rather than failing the run.
#[must_use]
pub fn measure_vector(approved: &PlotPolygon, builtup: &[PlotPolygon]) -> VectorEncroachment {
    let approved = approved.clone().repair().into_polygon();
    let approved_area = approved.as_ref().map_or(0.0, PlotPolygon::area);

    let mut builtup_area = 0.0;
    let mut raw = 0.0;
    let mut repaired = 0;
    let mut degenerate = 0;
    let mut encroachment_polygons = Vec::new();

    for polygon in builtup {
        let outcome = polygon.clone().repair();
        if outcome.was_repaired() {
            repaired += 1;
        }
        let Some(polygon) = outcome.into_polygon() else {
            degenerate += 1;
            continue;
        };
        builtup_area += polygon.area();
        let outside = match &approved {
            Some(a) => polygon.difference(a),
            None => polygon,
        };
        if !outside.is_empty() {
            raw += outside.area();
            encroachment_polygons.push(outside);
        }
    }

    let denominator = approved_area.max(1.0);
    let encroached_area = raw.min(denominator);
    VectorEncroachment {
        approved_area,
        builtup_area,
        encroached_area,
        encroachment_pct: (100.0 * encroached_area / denominator).min(100.0),
        encroachment_polygons,
        repaired,
        degenerate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimensions, Rect};

    fn frame() -> Dimensions {
        Dimensions::new(200, 200)
    }

    fn approved_square() -> BinaryMask {
        BinaryMask::filled_rect(frame(), Rect::new(0, 0, 100, 100))
    }

    #[test]
    fn builtup_inside_has_no_encroachment() {
        let builtup = BinaryMask::filled_rect(frame(), Rect::new(10, 10, 50, 50));
        let r = measure_raster(&approved_square(), &builtup, &EncroachmentConfig::default());
        assert_eq!(r.metrics.approved_area_px, 10_000);
        assert_eq!(r.metrics.encroached_area_px, 0);
        assert!((r.metrics.encroachment_pct - 0.0).abs() < f64::EPSILON);
        assert!((r.metrics.utilization_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn block_outside_is_four_percent() {
        let builtup = BinaryMask::filled_rect(frame(), Rect::new(120, 20, 20, 20));
        let r = measure_raster(&approved_square(), &builtup, &EncroachmentConfig::default());
        assert_eq!(r.metrics.encroached_area_px, 400);
        assert!((r.metrics.encroachment_pct - 4.0).abs() < 1e-9);
        assert_eq!(r.encroachment_mask.count(), 400);
    }

    #[test]
    fn empty_approved_is_floored_not_nan() {
        let approved = BinaryMask::new(frame());
        let builtup = BinaryMask::new(frame());
        let r = measure_raster(&approved, &builtup, &EncroachmentConfig::default());
        assert_eq!(r.metrics.approved_area_px, 1);
        assert!(r.metrics.encroachment_pct.is_finite());
        assert!((r.metrics.encroachment_pct - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn excess_is_clamped_to_exactly_one_hundred() {
        let approved = BinaryMask::filled_rect(frame(), Rect::new(0, 0, 10, 10));
        let builtup = BinaryMask::filled_rect(frame(), Rect::new(50, 50, 100, 100));
        let r = measure_raster(&approved, &builtup, &EncroachmentConfig::default());
        assert!(r.metrics.was_clamped());
        assert_eq!(r.metrics.encroached_area_px, 100);
        assert!((r.metrics.encroachment_pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn opening_removes_speckle() {
        let mut builtup = BinaryMask::new(frame());
        builtup.set(150, 150, true);
        builtup.set(170, 20, true);
        let r = measure_raster(&approved_square(), &builtup, &EncroachmentConfig::default());
        assert_eq!(r.metrics.encroached_area_px, 0);
        assert_eq!(r.metrics.builtup_area_px, 2);
    }

    #[test]
    fn from_counts_is_monotonic() {
        let mut last = 0.0;
        for raw in (0..=20_000).step_by(500) {
            let m = EncroachmentMetrics::from_counts(10_000, raw, 0, raw);
            assert!(m.encroachment_pct >= last);
            assert!(m.encroachment_pct <= 100.0);
            last = m.encroachment_pct;
        }
    }

    #[test]
    fn vector_block_outside_matches_raster() {
        let approved = PlotPolygon::from_rect(Rect::new(0, 0, 100, 100));
        let block = PlotPolygon::from_rect(Rect::new(120, 20, 20, 20));
        let v = measure_vector(&approved, std::slice::from_ref(&block));
        assert!((v.encroached_area - 400.0).abs() < 1e-6);
        assert!((v.encroachment_pct - 4.0).abs() < 1e-6);

        let r = measure_raster(
            &approved.rasterize(frame()),
            &block.rasterize(frame()),
            &EncroachmentConfig::default(),
        );
        assert!((v.encroached_area - r.metrics.encroached_area_px as f64).abs() < 1.0);
    }

    #[test]
    fn vector_partial_overlap_counts_outside_part() {
        let approved = PlotPolygon::from_rect(Rect::new(0, 0, 100, 100));
        let straddling = PlotPolygon::from_rect(Rect::new(90, 0, 20, 10));
        let v = measure_vector(&approved, &[straddling]);
        assert!((v.encroached_area - 100.0).abs() < 1e-6);
        assert!((v.builtup_area - 200.0).abs() < 1e-6);
    }

    #[test]
    fn vector_clamps_excess() {
        let approved = PlotPolygon::from_rect(Rect::new(0, 0, 10, 10));
        let huge = PlotPolygon::from_rect(Rect::new(20, 20, 50, 50));
        let v = measure_vector(&approved, &[huge]);
        assert!((v.encroachment_pct - 100.0).abs() < f64::EPSILON);
        assert!((v.encroached_area - 100.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_builtup_polygon_contributes_zero() {
        let approved = PlotPolygon::from_rect(Rect::new(0, 0, 100, 100));
        let sliver = PlotPolygon::from_points(&[(150.0, 0.0), (160.0, 0.0), (170.0, 0.0)]);
        let v = measure_vector(&approved, &[sliver]);
        assert_eq!(v.degenerate, 1);
        assert!(v.encroached_area.abs() < f64::EPSILON);
    }

    #[test]
    fn self_intersecting_builtup_is_repaired() {
        let approved = PlotPolygon::from_rect(Rect::new(0, 0, 100, 100));
        let bow_tie = PlotPolygon::from_points(&[
            (120.0, 0.0),
            (140.0, 20.0),
            (140.0, 0.0),
            (120.0, 20.0),
        ]);
        let v = measure_vector(&approved, &[bow_tie]);
        assert_eq!(v.repaired, 1);
        assert!((v.encroached_area - 200.0).abs() < 1e-6);
    }
}
