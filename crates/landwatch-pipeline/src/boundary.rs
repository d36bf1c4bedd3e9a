//! Approved-boundary extraction from a reference layout map.
//!
//! Three tiers, tried in order:
//!
//! 1. **Red ink.** Plot boundaries on CAD exports and most scanned
//!    allotment maps are drawn in red. When enough pixels fall in the red
//!    hue bands the ink is closed into a ring and its interior filled.
//! 2. **Shape.** Otherwise the map is binarized with Otsu's threshold and
//!    the largest external contour of plausible size is filled. The size
//!    window excludes specks and the scan's own border rectangle.
//! 3. **Central box.** If nothing qualifies, a centered box is assumed.
//!    This is a deliberate guess, reported as
//!    [`BoundarySource::CentralFallback`] so callers can flag it.
//!
//! Whatever tier wins, the bounding box of the mask becomes the region of
//! interest for built-up detection.

use serde::{Deserialize, Serialize};

use crate::color::{self, HueBand};
use crate::contour;
use crate::decode::to_gray;
use crate::geometry::PlotPolygon;
use crate::morphology::{self, Element};
use crate::types::{BinaryMask, Dimensions, Rect, RgbImage};

/// Default minimum fraction of red pixels for the red-ink tier.
pub const DEFAULT_RED_FRACTION_MIN: f64 = 0.005;

/// Default closing radius for red ink (a 5x5 square).
pub const DEFAULT_CLOSE_RADIUS: u8 = 2;

/// Default number of closing iterations for red ink.
pub const DEFAULT_CLOSE_ITERATIONS: u32 = 3;

/// Default lower bound on contour area, as a fraction of the image.
pub const DEFAULT_MIN_AREA_FRACTION: f64 = 0.01;

/// Default upper bound on contour area, as a fraction of the image.
pub const DEFAULT_MAX_AREA_FRACTION: f64 = 0.98;

/// Default side fraction of the central fallback box.
pub const DEFAULT_CENTRAL_FRACTION: f64 = 0.6;

/// Default margin kept around a registry polygon placed in the frame.
pub const DEFAULT_REGISTRY_PADDING: f64 = 0.1;

/// Tunables for [`extract_boundary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Hue bands that count as boundary ink.
    pub red_bands: Vec<HueBand>,
    /// Red pixels must exceed this fraction of the image.
    pub red_fraction_min: f64,
    /// Square closing radius applied to the red ink.
    pub close_radius: u8,
    /// Closing iterations applied to the red ink.
    pub close_iterations: u32,
    /// Contours must be strictly larger than this fraction of the image.
    pub min_area_fraction: f64,
    /// Contours must be strictly smaller than this fraction of the image.
    pub max_area_fraction: f64,
    /// Side fraction of the central fallback box.
    pub central_fraction: f64,
    /// Margin, as a fraction of each side, left around a registry polygon.
    pub registry_padding: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            red_bands: vec![HueBand::RED_LOW, HueBand::RED_HIGH],
            red_fraction_min: DEFAULT_RED_FRACTION_MIN,
            close_radius: DEFAULT_CLOSE_RADIUS,
            close_iterations: DEFAULT_CLOSE_ITERATIONS,
            min_area_fraction: DEFAULT_MIN_AREA_FRACTION,
            max_area_fraction: DEFAULT_MAX_AREA_FRACTION,
            central_fraction: DEFAULT_CENTRAL_FRACTION,
            registry_padding: DEFAULT_REGISTRY_PADDING,
        }
    }
}

/// Why the central box was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FallbackReason {
    /// The binarized map had no external contours at all.
    NoContours,
    /// Contours were found but none fell inside the size window.
    NoContourInRange {
        /// Number of external contours considered.
        candidates: usize,
    },
    /// The registry polygon had zero or non-finite extent.
    DegenerateRegistryPolygon,
}

/// Which tier produced the approved mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BoundarySource {
    /// Red-ink segmentation.
    RedInk {
        /// Pixels inside the red hue bands.
        red_pixels: u64,
        /// `red_pixels` over the image area.
        fraction: f64,
    },
    /// Largest plausible contour of the binarized map.
    Shape {
        /// Shoelace area of the chosen contour.
        contour_area: f64,
        /// Otsu threshold used.
        threshold: u8,
        /// Whether the binarization was inverted for a light background.
        inverted: bool,
    },
    /// Centered box guess.
    CentralFallback {
        /// What the earlier tiers ran into.
        reason: FallbackReason,
    },
    /// Polygon supplied by a plot registry.
    Registry {
        /// Registry identifier of the plot.
        plot_id: String,
    },
}

impl BoundarySource {
    /// Returns `true` for the central-box guess.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::CentralFallback { .. })
    }

    /// The serialized `kind` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RedInk { .. } => "red_ink",
            Self::Shape { .. } => "shape",
            Self::CentralFallback { .. } => "central_fallback",
            Self::Registry { .. } => "registry",
        }
    }
}

/// An approved-region mask with its bounding box and provenance.
#[derive(Debug, Clone)]
pub struct BoundaryExtraction {
    /// Approved region, full frame.
    pub mask: BinaryMask,
    /// Tight bounding box of `mask` (empty if the mask is empty).
    pub bbox: Rect,
    /// Which tier produced the mask.
    pub source: BoundarySource,
    /// Vector form of the approved region, when one is known exactly.
    pub polygon: Option<PlotPolygon>,
}

impl BoundaryExtraction {
    fn from_mask(mask: BinaryMask, source: BoundarySource) -> Self {
        let bbox = mask.bounding_box().unwrap_or_default();
        Self {
            mask,
            bbox,
            source,
            polygon: None,
        }
    }

    /// Use a registry polygon directly, bypassing image analysis.
    #[must_use]
    pub fn from_registry(plot_id: &str, polygon: PlotPolygon, frame: Dimensions) -> Self {
        let mask = polygon.rasterize(frame);
        if mask.is_empty() {
            tracing::warn!(plot_id, "registry polygon covers no pixels of the frame");
        }
        let mut extraction = Self::from_mask(
            mask,
            BoundarySource::Registry {
                plot_id: plot_id.to_owned(),
            },
        );
        extraction.polygon = Some(polygon);
        extraction
    }
}

/// Extract the approved region from a reference map.
///
/// Never fails: the last tier always produces a mask.
#[must_use]
pub fn extract_boundary(reference: &RgbImage, config: &BoundaryConfig) -> BoundaryExtraction {
    let frame = Dimensions::new(reference.width(), reference.height());

    if let Some(extraction) = red_ink(reference, frame, config) {
        return extraction;
    }

    match shape(reference, frame, config) {
        Ok(extraction) => extraction,
        Err(reason) => central(frame, config, reason),
    }
}

/// Place a registry polygon, given in map units, into `frame`.
///
/// The polygon is fitted inside the frame with `registry_padding`; a
/// polygon with no usable extent falls back to the central box.
#[must_use]
pub fn place_registry(
    plot_id: &str,
    polygon: &PlotPolygon,
    frame: Dimensions,
    config: &BoundaryConfig,
) -> BoundaryExtraction {
    let Some(fitted) = polygon.fit_to(frame, config.registry_padding) else {
        return central(frame, config, FallbackReason::DegenerateRegistryPolygon);
    };
    let extraction = BoundaryExtraction::from_registry(plot_id, fitted, frame);
    if extraction.mask.is_empty() {
        central(frame, config, FallbackReason::DegenerateRegistryPolygon)
    } else {
        extraction
    }
}

fn central(frame: Dimensions, config: &BoundaryConfig, reason: FallbackReason) -> BoundaryExtraction {
    tracing::warn!(?reason, "no boundary found, using central box");
    let rect = Rect::centered(frame, config.central_fraction);
    let mut extraction = BoundaryExtraction::from_mask(
        BinaryMask::filled_rect(frame, rect),
        BoundarySource::CentralFallback { reason },
    );
    extraction.polygon = (!rect.is_empty()).then(|| PlotPolygon::from_rect(rect));
    extraction
}

#[allow(clippy::cast_precision_loss)]
fn red_ink(
    reference: &RgbImage,
    frame: Dimensions,
    config: &BoundaryConfig,
) -> Option<BoundaryExtraction> {
    let total = frame.pixel_count();
    if total == 0 {
        return None;
    }
    let ink = color::band_mask(reference, &config.red_bands);
    let red_pixels = ink.count();
    let fraction = red_pixels as f64 / total as f64;
    tracing::debug!(red_pixels, fraction, "red ink coverage");
    if fraction <= config.red_fraction_min {
        return None;
    }

    let closed = morphology::close(
        &ink,
        Element::Square,
        config.close_radius,
        config.close_iterations,
    );
    let mask = contour::fill_holes(&closed);
    Some(BoundaryExtraction::from_mask(
        mask,
        BoundarySource::RedInk {
            red_pixels,
            fraction,
        },
    ))
}

#[allow(clippy::cast_precision_loss)]
fn shape(
    reference: &RgbImage,
    frame: Dimensions,
    config: &BoundaryConfig,
) -> Result<BoundaryExtraction, FallbackReason> {
    let gray = to_gray(reference);
    let total = frame.pixel_count();
    if total == 0 {
        return Err(FallbackReason::NoContours);
    }
    let threshold = imageproc::contrast::otsu_level(&gray);
    let mean = gray.pixels().map(|p| u64::from(p.0[0])).sum::<u64>() / total;
    let inverted = mean > 127;

    let binary = BinaryMask::from_fn(frame, |x, y| {
        let above = gray.get_pixel(x, y).0[0] > threshold;
        above != inverted
    });

    let contours = contour::external_contours(&binary);
    if contours.is_empty() {
        return Err(FallbackReason::NoContours);
    }

    let min_area = config.min_area_fraction * total as f64;
    let max_area = config.max_area_fraction * total as f64;
    let best = contours
        .iter()
        .map(|c| (c, c.area()))
        .filter(|&(_, area)| area > min_area && area < max_area)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let Some((chosen, contour_area)) = best else {
        return Err(FallbackReason::NoContourInRange {
            candidates: contours.len(),
        });
    };

    tracing::debug!(contour_area, threshold, inverted, "boundary from shape");
    Ok(BoundaryExtraction::from_mask(
        contour::fill_contours(frame, std::iter::once(chosen)),
        BoundarySource::Shape {
            contour_area,
            threshold,
            inverted,
        },
    ))
}
