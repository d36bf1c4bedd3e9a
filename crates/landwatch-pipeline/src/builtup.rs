//! Built-up structure detection in satellite imagery.
//!
//! Runs on the region-of-interest crop only:
//!
//! 1. grayscale and CLAHE
//! 2. Gaussian blur, then Canny with median-derived thresholds
//! 3. clear edges outside the ROI mask (the crop itself is never masked,
//!    which would draw an artificial edge along the ROI border)
//! 4. square dilation, then disc closing, fusing edges into blobs
//! 5. external contours, filtered by area and solidity
//! 6. fill, AND with the ROI, paste back at the crop offset
//!
//! An empty ROI yields an all-background mask.

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryExtraction;
use crate::contour::{self, Contour};
use crate::decode::to_gray;
use crate::edges;
use crate::equalize;
use crate::geometry::PlotPolygon;
use crate::morphology::{self, Element};
use crate::types::{BinaryMask, Dimensions, MaskCrop, Rect, RgbImage};

/// Default CLAHE tile grid.
pub const DEFAULT_EQUALIZE_GRID: u32 = equalize::DEFAULT_GRID;

/// Default CLAHE clip limit.
pub const DEFAULT_CLIP_LIMIT: f32 = equalize::DEFAULT_CLIP_LIMIT;

/// Default Gaussian blur sigma before edge detection.
pub const DEFAULT_BLUR_SIGMA: f32 = 1.4;

/// Default spread of the Canny thresholds around the median.
pub const DEFAULT_THRESHOLD_SIGMA: f32 = 0.33;

/// Default square dilation radius (5x5).
pub const DEFAULT_DILATE_RADIUS: u8 = 2;

/// Default dilation iterations.
pub const DEFAULT_DILATE_ITERATIONS: u32 = 2;

/// Default disc closing radius (7x7 ellipse).
pub const DEFAULT_CLOSE_RADIUS: u8 = 3;

/// Default closing iterations.
pub const DEFAULT_CLOSE_ITERATIONS: u32 = 1;

/// Default minimum contour area in pixels.
pub const DEFAULT_MIN_AREA_PX: f64 = 300.0;

/// Default minimum solidity.
pub const DEFAULT_MIN_SOLIDITY: f64 = 0.4;

/// Default margin added around the approved bounding box, as a fraction
/// of each side.
pub const DEFAULT_ROI_MARGIN: f64 = 0.15;

/// Tunables for [`detect_builtup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// CLAHE tiles per axis.
    pub equalize_grid: u32,
    /// CLAHE clip limit; zero disables clipping.
    pub clip_limit: f32,
    /// Gaussian blur sigma; zero disables blurring.
    pub blur_sigma: f32,
    /// Canny threshold spread around the median intensity.
    pub threshold_sigma: f32,
    /// Square dilation radius.
    pub dilate_radius: u8,
    /// Dilation iterations.
    pub dilate_iterations: u32,
    /// Disc closing radius.
    pub close_radius: u8,
    /// Closing iterations.
    pub close_iterations: u32,
    /// Contours below this area are noise.
    pub min_area_px: f64,
    /// Whether to reject sparse contours.
    pub solidity_filter: bool,
    /// Minimum `area / hull_area` when the solidity filter is on.
    pub min_solidity: f64,
    /// Margin around the approved bounding box, as a fraction of its
    /// width and height.
    pub roi_margin: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            equalize_grid: DEFAULT_EQUALIZE_GRID,
            clip_limit: DEFAULT_CLIP_LIMIT,
            blur_sigma: DEFAULT_BLUR_SIGMA,
            threshold_sigma: DEFAULT_THRESHOLD_SIGMA,
            dilate_radius: DEFAULT_DILATE_RADIUS,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            close_radius: DEFAULT_CLOSE_RADIUS,
            close_iterations: DEFAULT_CLOSE_ITERATIONS,
            min_area_px: DEFAULT_MIN_AREA_PX,
            solidity_filter: true,
            min_solidity: DEFAULT_MIN_SOLIDITY,
            roi_margin: DEFAULT_ROI_MARGIN,
        }
    }
}

/// Pixels eligible for built-up detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOfInterest {
    /// Bounding box of the eligible pixels; detection runs on this crop.
    pub bbox: Rect,
    /// Eligible pixels, full frame.
    pub mask: BinaryMask,
}

impl RegionOfInterest {
    /// A rectangular region.
    #[must_use]
    pub fn from_rect(frame: Dimensions, rect: Rect) -> Self {
        let bbox = rect.clamp_to(frame);
        Self {
            bbox,
            mask: BinaryMask::filled_rect(frame, bbox),
        }
    }

    /// The approved bounding box grown by `margin` of its size on every
    /// side, clipped to the frame.
    ///
    /// Built-up pixels inside this box but outside the approved mask are
    /// what the encroachment stage measures, so the region must extend
    /// past the approved area itself.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn around(boundary: &BoundaryExtraction, margin: f64) -> Self {
        let frame = boundary.mask.dimensions();
        let bbox = boundary.bbox;
        if bbox.is_empty() {
            return Self::from_rect(frame, Rect::default());
        }
        let margin = if margin.is_finite() { margin.max(0.0) } else { 0.0 };
        let mx = (f64::from(bbox.width) * margin).round() as u32;
        let my = (f64::from(bbox.height) * margin).round() as u32;
        let x = bbox.x.saturating_sub(mx);
        let y = bbox.y.saturating_sub(my);
        let right = bbox.right().saturating_add(mx);
        let bottom = bbox.bottom().saturating_add(my);
        Self::from_rect(frame, Rect::new(x, y, right - x, bottom - y))
    }
}

/// Contour filter bookkeeping for one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Edge pixels after ROI masking.
    pub edge_pixels: u64,
    /// External contours found after closing.
    pub contours_found: usize,
    /// Contours dropped by the area floor.
    pub rejected_small: usize,
    /// Contours dropped by the solidity filter.
    pub rejected_sparse: usize,
    /// Contours filled into the mask.
    pub contours_kept: usize,
    /// Canny `(low, high)` thresholds used.
    pub thresholds: (f32, f32),
}

/// Output of [`detect_builtup`].
#[derive(Debug, Clone)]
pub struct BuiltupDetection {
    /// Built-up pixels, full frame, background outside the ROI.
    pub mask: BinaryMask,
    /// Accepted structures as frame-coordinate polygons.
    pub polygons: Vec<PlotPolygon>,
    /// Filter bookkeeping.
    pub stats: DetectionStats,
}

impl BuiltupDetection {
    fn empty(frame: Dimensions) -> Self {
        Self {
            mask: BinaryMask::new(frame),
            polygons: Vec::new(),
            stats: DetectionStats::default(),
        }
    }
}

/// Detect built-up structures inside `roi`.
///
/// `satellite` must already be in the ROI's frame.
#[must_use]
pub fn detect_builtup(
    satellite: &RgbImage,
    roi: &RegionOfInterest,
    config: &DetectorConfig,
) -> BuiltupDetection {
    let frame = Dimensions::new(satellite.width(), satellite.height());
    let bbox = roi.bbox.clamp_to(frame);
    if bbox.is_empty() {
        tracing::debug!("empty region of interest, no built-up detected");
        return BuiltupDetection::empty(frame);
    }

    let crop = image::imageops::crop_imm(satellite, bbox.x, bbox.y, bbox.width, bbox.height)
        .to_image();
    let gray = to_gray(&crop);
    let equalized = equalize::clahe(&gray, config.equalize_grid, config.clip_limit);
    let blurred = edges::gaussian_blur(&equalized, config.blur_sigma);
    let thresholds = edges::auto_thresholds(&blurred, config.threshold_sigma);
    let edge_map = edges::canny(&blurred, thresholds.0, thresholds.1);

    let roi_local = roi.mask.crop(bbox).mask;
    let edge_mask = BinaryMask::from_gray(edge_map).and(&roi_local);

    let mut stats = DetectionStats {
        edge_pixels: edge_mask.count(),
        thresholds,
        ..DetectionStats::default()
    };

    let fused = fuse(&edge_mask, config);
    let contours = contour::external_contours(&fused);
    stats.contours_found = contours.len();

    let mut accepted = Vec::new();
    for c in &contours {
        if c.area() < config.min_area_px {
            stats.rejected_small += 1;
        } else if config.solidity_filter && c.solidity() < config.min_solidity {
            stats.rejected_sparse += 1;
        } else {
            accepted.push(c);
        }
    }
    stats.contours_kept = accepted.len();

    let local_dims = Dimensions::new(bbox.width, bbox.height);
    let local = contour::fill_contours(local_dims, accepted.iter().copied()).and(&roi_local);
    let mut mask = BinaryMask::new(frame);
    mask.paste(&MaskCrop::new(local, bbox));

    let polygons = accepted
        .iter()
        .filter_map(|c| frame_polygon(c, bbox).repair().into_polygon())
        .collect();

    tracing::debug!(
        found = stats.contours_found,
        kept = stats.contours_kept,
        small = stats.rejected_small,
        sparse = stats.rejected_sparse,
        "built-up contours filtered"
    );

    BuiltupDetection {
        mask,
        polygons,
        stats,
    }
}

fn fuse(edges: &BinaryMask, config: &DetectorConfig) -> BinaryMask {
    let dilated = morphology::dilate(
        edges,
        Element::Square,
        config.dilate_radius,
        config.dilate_iterations,
    );
    morphology::close(
        &dilated,
        Element::Disc,
        config.close_radius,
        config.close_iterations,
    )
}

/// A crop-local contour as a frame polygon in pixel-edge coordinates.
fn frame_polygon(c: &Contour, bbox: Rect) -> PlotPolygon {
    PlotPolygon::from_polygon(c.to_polygon())
        .translated(f64::from(bbox.x) + 0.5, f64::from(bbox.y) + 0.5)
}
