//! Staged analysis: advance one stage at a time, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use landwatch_pipeline::{Analysis, AnalysisConfig, AnalysisError, AnalysisInput};
//! # fn run(reference: Vec<u8>, satellite: Vec<u8>) -> Result<(), AnalysisError> {
//! let outcome = Analysis::new(
//!     AnalysisInput::with_reference(reference, satellite),
//!     AnalysisConfig::default(),
//! )
//! .decode()?
//! .extract_boundary()
//! .detect_builtup()
//! .measure()
//! .assess()
//! .render()
//! .into_result();
//!
//! println!("{:.1}% encroached", outcome.report.metrics.encroachment_pct);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, so stages
//! cannot be skipped or reordered. Only decoding can fail; every later
//! stage degrades through explicit fallback values instead.
//!
//! Metrics are fixed once [`Measured`] is reached. Assessment and
//! rendering only read them.

use geo::Translate;
use serde::{Deserialize, Serialize};

use crate::boundary::{self, BoundaryExtraction, BoundarySource};
use crate::builtup::{self, BuiltupDetection, DetectionStats, RegionOfInterest};
use crate::classify::{self, Assessment};
use crate::config::AnalysisConfig;
use crate::contour;
use crate::decode;
use crate::diagnostics::StageMetrics;
use crate::downsample;
use crate::economics::{self, FinancialImpact};
use crate::encroachment::{self, EncroachmentMetrics, RasterEncroachment, VectorEncroachment, VectorSummary};
use crate::geometry::PlotPolygon;
use crate::location::GeoPoint;
use crate::metadata::{self, LayoutMetadata, MetadataExtractor, NoopMetadataExtractor};
use crate::types::{AnalysisError, BinaryMask, Dimensions, ImageRole, Rect, RgbImage};
use crate::visualize;

/// Where the approved boundary comes from.
#[derive(Debug, Clone)]
pub enum ApprovedSource {
    /// Encoded layout-map image (PNG, JPEG, BMP, WebP).
    ReferenceMap(Vec<u8>),
    /// Polygon from a plot registry, in map units with y pointing north.
    Registry {
        /// Registry identifier.
        plot_id: String,
        /// Plot outline.
        polygon: PlotPolygon,
    },
}

/// Inputs for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    /// Approved boundary source.
    pub approved: ApprovedSource,
    /// Encoded satellite image.
    pub satellite: Vec<u8>,
}

impl AnalysisInput {
    /// Compare a reference layout map against a satellite image.
    #[must_use]
    pub const fn with_reference(reference: Vec<u8>, satellite: Vec<u8>) -> Self {
        Self {
            approved: ApprovedSource::ReferenceMap(reference),
            satellite,
        }
    }

    /// Compare a registry polygon against a satellite image.
    #[must_use]
    pub fn with_registry(plot_id: impl Into<String>, polygon: PlotPolygon, satellite: Vec<u8>) -> Self {
        Self {
            approved: ApprovedSource::Registry {
                plot_id: plot_id.into(),
                polygon,
            },
            satellite,
        }
    }
}

/// The structured result of one run. Always complete: a run either
/// produces every field or fails with an [`AnalysisError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Analysis frame (reference-map size, or satellite size on the
    /// registry path).
    pub frame: Dimensions,
    /// Whether either input was downsampled to fit the size cap.
    pub downsampled: bool,
    /// How the approved boundary was obtained.
    pub boundary_source: BoundarySource,
    /// Region searched for built-up structures.
    pub roi: Rect,
    /// Built-up detection bookkeeping.
    pub detection: DetectionStats,
    /// Authoritative raster metrics.
    pub metrics: EncroachmentMetrics,
    /// Classification, risk, health and actions.
    pub assessment: Assessment,
    /// Financial impact.
    pub financial: FinancialImpact,
    /// Polygon-based measurement, when built-up polygons were found.
    pub vector_cross_check: Option<VectorSummary>,
    /// Approved-region centroid, when geographic bounds were configured.
    pub location: Option<GeoPoint>,
    /// Layout-map legend fields, when an extractor found any.
    #[serde(default, skip_serializing_if = "LayoutMetadata::is_empty")]
    pub layout: LayoutMetadata,
}

/// Everything a run produces: the report plus the rasters behind it.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Structured result.
    pub report: AnalysisReport,
    /// Satellite image with encroachment and boundary drawn on it.
    pub overlay: RgbImage,
    /// Encroached pixels.
    pub encroachment_mask: BinaryMask,
    /// Approved region.
    pub approved_mask: BinaryMask,
    /// Detected built-up pixels.
    pub builtup_mask: BinaryMask,
    /// Reference and aligned satellite side by side, when a reference map
    /// was used.
    pub comparison: Option<RgbImage>,
}

/// Decoded approved-boundary source.
enum Approval {
    Map(RgbImage),
    Registry { plot_id: String, polygon: PlotPolygon },
}

/// State shared by every stage after decoding.
struct Frame {
    config: AnalysisConfig,
    reference: Option<RgbImage>,
    satellite: RgbImage,
    dimensions: Dimensions,
    downsampled: bool,
    layout: LayoutMetadata,
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Inputs stored, nothing decoded yet.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending {
    config: AnalysisConfig,
    input: AnalysisInput,
}

impl Pending {
    /// The stored inputs.
    #[must_use]
    pub const fn input(&self) -> &AnalysisInput {
        &self.input
    }

    /// Validate the configuration and decode both inputs.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidConfig`] for out-of-range tunables,
    /// [`AnalysisError::EmptyInput`] for empty image bytes, and
    /// [`AnalysisError::ImageDecode`] for unreadable images.
    pub fn decode(self) -> Result<Decoded, AnalysisError> {
        self.decode_with(&NoopMetadataExtractor)
    }

    /// Like [`decode`](Self::decode), also reading layout metadata from
    /// the reference map with `extractor`. Extractor failures are ignored.
    ///
    /// # Errors
    ///
    /// As for [`decode`](Self::decode).
    pub fn decode_with(self, extractor: &dyn MetadataExtractor) -> Result<Decoded, AnalysisError> {
        let Self { config, input } = self;
        config.validate()?;
        let filter = config.resample_filter;
        let input_bytes = input.satellite.len()
            + match &input.approved {
                ApprovedSource::ReferenceMap(bytes) => bytes.len(),
                ApprovedSource::Registry { .. } => 0,
            };

        let (approval, reference_capped, layout) = match input.approved {
            ApprovedSource::ReferenceMap(bytes) => {
                let image = decode::decode(&bytes, ImageRole::Reference)?;
                let (image, capped) = downsample::cap_dimensions(image, config.max_dimension, filter);
                let layout = metadata::extract_best_effort(extractor, &bytes);
                (Approval::Map(image), capped, layout)
            }
            ApprovedSource::Registry { plot_id, polygon } => (
                Approval::Registry { plot_id, polygon },
                false,
                LayoutMetadata::default(),
            ),
        };
        let satellite = decode::decode(&input.satellite, ImageRole::Satellite)?;
        let (satellite, satellite_capped) =
            downsample::cap_dimensions(satellite, config.max_dimension, filter);

        let dimensions = match &approval {
            Approval::Map(reference) => Dimensions::new(reference.width(), reference.height()),
            Approval::Registry { .. } => Dimensions::new(satellite.width(), satellite.height()),
        };
        let satellite = downsample::align_to(satellite, dimensions, filter);
        tracing::debug!(%dimensions, "inputs decoded");

        Ok(Decoded {
            frame: Frame {
                config,
                reference: None,
                satellite,
                dimensions,
                downsampled: satellite_capped || reference_capped,
                layout,
            },
            approval,
            input_bytes,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Both inputs decoded into the common frame.
#[must_use = "pipeline stages are consumed by advancing; call .extract_boundary() to continue"]
pub struct Decoded {
    frame: Frame,
    approval: Approval,
    input_bytes: usize,
}

impl Decoded {
    /// The analysis frame.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.frame.dimensions
    }

    /// The decoded reference map, if one was supplied.
    #[must_use]
    pub const fn reference(&self) -> Option<&RgbImage> {
        match &self.approval {
            Approval::Map(reference) => Some(reference),
            Approval::Registry { .. } => None,
        }
    }

    /// The satellite image, aligned to the frame.
    #[must_use]
    pub const fn satellite(&self) -> &RgbImage {
        &self.frame.satellite
    }

    /// Stage metrics.
    #[must_use]
    pub const fn metrics(&self) -> StageMetrics {
        StageMetrics::Decode {
            input_bytes: self.input_bytes,
            width: self.frame.dimensions.width,
            height: self.frame.dimensions.height,
            pixel_count: self.frame.dimensions.pixel_count(),
            downsampled: self.frame.downsampled,
        }
    }

    /// Extract the approved boundary and derive the region of interest.
    pub fn extract_boundary(self) -> BoundaryExtracted {
        let Self {
            mut frame,
            approval,
            ..
        } = self;
        let config = &frame.config.boundary;
        let extraction = match approval {
            Approval::Map(reference) => {
                let extraction = boundary::extract_boundary(&reference, config);
                frame.reference = Some(reference);
                extraction
            }
            Approval::Registry { plot_id, polygon } => {
                boundary::place_registry(&plot_id, &polygon, frame.dimensions, config)
            }
        };
        tracing::debug!(
            source = extraction.source.kind(),
            bbox = ?extraction.bbox,
            "approved boundary extracted"
        );
        let roi = RegionOfInterest::around(&extraction, frame.config.detector.roi_margin);
        BoundaryExtracted {
            frame,
            boundary: extraction,
            roi,
        }
    }
}

// ───────────────────────── Stage 2: BoundaryExtracted ────────────────

/// Approved region known; region of interest derived from it.
#[must_use = "pipeline stages are consumed by advancing; call .detect_builtup() to continue"]
pub struct BoundaryExtracted {
    frame: Frame,
    boundary: BoundaryExtraction,
    roi: RegionOfInterest,
}

impl BoundaryExtracted {
    /// The approved region.
    #[must_use]
    pub const fn boundary(&self) -> &BoundaryExtraction {
        &self.boundary
    }

    /// The region searched by built-up detection.
    #[must_use]
    pub const fn roi(&self) -> &RegionOfInterest {
        &self.roi
    }

    /// Stage metrics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Boundary {
            source: self.boundary.source.kind().to_owned(),
            approved_pixels: self.boundary.mask.count(),
            roi_pixels: self.roi.bbox.area(),
        }
    }

    /// Detect built-up structures inside the region of interest.
    pub fn detect_builtup(self) -> BuiltupDetected {
        let builtup = builtup::detect_builtup(
            &self.frame.satellite,
            &self.roi,
            &self.frame.config.detector,
        );
        BuiltupDetected {
            frame: self.frame,
            boundary: self.boundary,
            roi: self.roi,
            builtup,
        }
    }
}

// ───────────────────────── Stage 3: BuiltupDetected ──────────────────

/// Built-up mask and polygons available.
#[must_use = "pipeline stages are consumed by advancing; call .measure() to continue"]
pub struct BuiltupDetected {
    frame: Frame,
    boundary: BoundaryExtraction,
    roi: RegionOfInterest,
    builtup: BuiltupDetection,
}

impl BuiltupDetected {
    /// The detection result.
    #[must_use]
    pub const fn builtup(&self) -> &BuiltupDetection {
        &self.builtup
    }

    /// Stage metrics.
    #[must_use]
    pub const fn metrics(&self) -> StageMetrics {
        let stats = &self.builtup.stats;
        StageMetrics::Builtup {
            edge_pixels: stats.edge_pixels,
            contours_found: stats.contours_found,
            rejected_small: stats.rejected_small,
            rejected_sparse: stats.rejected_sparse,
            contours_kept: stats.contours_kept,
            low_threshold: stats.thresholds.0,
            high_threshold: stats.thresholds.1,
        }
    }

    /// Measure encroachment: raster metrics, plus the polygon cross-check
    /// when built-up polygons exist.
    pub fn measure(self) -> Measured {
        let raster = encroachment::measure_raster(
            &self.boundary.mask,
            &self.builtup.mask,
            &self.frame.config.encroachment,
        );
        let vector = if self.builtup.polygons.is_empty() {
            None
        } else {
            let approved = self
                .boundary
                .polygon
                .clone()
                .unwrap_or_else(|| mask_polygon(&self.boundary.mask));
            Some(encroachment::measure_vector(&approved, &self.builtup.polygons))
        };
        tracing::info!(
            encroachment_pct = raster.metrics.encroachment_pct,
            utilization_pct = raster.metrics.utilization_pct,
            "encroachment measured"
        );
        Measured {
            frame: self.frame,
            boundary: self.boundary,
            roi: self.roi,
            builtup: self.builtup,
            raster,
            vector,
        }
    }
}

/// Vector outline of a mask's external contours, in pixel-edge
/// coordinates.
fn mask_polygon(mask: &BinaryMask) -> PlotPolygon {
    let polygons = contour::external_contours(mask)
        .iter()
        .map(|c| c.to_polygon().translate(0.5, 0.5))
        .collect();
    PlotPolygon::from_multi(geo::MultiPolygon::new(polygons))
}

// ───────────────────────── Stage 4: Measured ─────────────────────────

/// Encroachment metrics fixed.
#[must_use = "pipeline stages are consumed by advancing; call .assess() to continue"]
pub struct Measured {
    frame: Frame,
    boundary: BoundaryExtraction,
    roi: RegionOfInterest,
    builtup: BuiltupDetection,
    raster: RasterEncroachment,
    vector: Option<VectorEncroachment>,
}

impl Measured {
    /// Raster metrics and encroachment mask.
    #[must_use]
    pub const fn raster(&self) -> &RasterEncroachment {
        &self.raster
    }

    /// Polygon measurement, if computed.
    #[must_use]
    pub const fn vector(&self) -> Option<&VectorEncroachment> {
        self.vector.as_ref()
    }

    /// Stage metrics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let m = &self.raster.metrics;
        StageMetrics::Measure {
            raw_encroached_px: m.raw_encroached_area_px,
            encroached_px: m.encroached_area_px,
            clamped: m.was_clamped(),
            vector_pct: self.vector.as_ref().map(|v| v.encroachment_pct),
        }
    }

    /// Classify, assess risk and estimate financial impact.
    pub fn assess(self) -> Assessed {
        let config = &self.frame.config;
        let metrics = &self.raster.metrics;
        let assessment = classify::assess(metrics);
        let financial = economics::estimate(metrics, assessment.classification, &config.financial);
        let location = config
            .geo_bounds
            .and_then(|bounds| bounds.centroid_of(&self.boundary.mask));
        Assessed {
            measured: self,
            assessment,
            financial,
            location,
        }
    }
}

// ───────────────────────── Stage 5: Assessed ─────────────────────────

/// Classification, risk and financial impact known.
#[must_use = "pipeline stages are consumed by advancing; call .render() to continue"]
pub struct Assessed {
    measured: Measured,
    assessment: Assessment,
    financial: FinancialImpact,
    location: Option<GeoPoint>,
}

impl Assessed {
    /// The assessment.
    #[must_use]
    pub const fn assessment(&self) -> &Assessment {
        &self.assessment
    }

    /// The financial estimate.
    #[must_use]
    pub const fn financial(&self) -> &FinancialImpact {
        &self.financial
    }

    /// Stage metrics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Assess {
            classification: self.assessment.classification,
            risk: self.assessment.risk.level,
            health_index: self.assessment.health_index,
            actions: self.assessment.actions.len(),
        }
    }

    /// Render the auditor overlay and, with a reference map, the
    /// side-by-side comparison.
    pub fn render(self) -> Rendered {
        let m = &self.measured;
        let overlay = visualize::render_overlay(
            &m.frame.satellite,
            &m.boundary.mask,
            &m.raster.encroachment_mask,
            &m.frame.config.overlay,
        );
        let comparison = m
            .frame
            .reference
            .as_ref()
            .map(|reference| visualize::render_comparison(reference, &m.frame.satellite));
        Rendered {
            assessed: self,
            overlay,
            comparison,
        }
    }
}

// ───────────────────────── Stage 6: Rendered ─────────────────────────

/// Final state.
#[must_use = "call .into_result() to extract the AnalysisOutcome"]
pub struct Rendered {
    assessed: Assessed,
    overlay: RgbImage,
    comparison: Option<RgbImage>,
}

impl Rendered {
    /// The rendered overlay.
    #[must_use]
    pub const fn overlay(&self) -> &RgbImage {
        &self.overlay
    }

    /// Stage metrics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Render {
            width: self.overlay.width(),
            height: self.overlay.height(),
            comparison: self.comparison.is_some(),
        }
    }

    /// Consume the pipeline and return the outcome.
    #[must_use]
    pub fn into_result(self) -> AnalysisOutcome {
        let Assessed {
            measured,
            assessment,
            financial,
            location,
        } = self.assessed;
        let Measured {
            frame,
            boundary,
            roi,
            builtup,
            raster,
            vector,
        } = measured;
        AnalysisOutcome {
            report: AnalysisReport {
                frame: frame.dimensions,
                downsampled: frame.downsampled,
                boundary_source: boundary.source,
                roi: roi.bbox,
                detection: builtup.stats,
                metrics: raster.metrics,
                assessment,
                financial,
                vector_cross_check: vector.as_ref().map(VectorEncroachment::summary),
                location,
                layout: frame.layout,
            },
            overlay: self.overlay,
            encroachment_mask: raster.encroachment_mask,
            approved_mask: boundary.mask,
            builtup_mask: builtup.mask,
            comparison: self.comparison,
        }
    }
}

/// Entry point of the staged pipeline.
///
/// [`Analysis::new`] stores the inputs and configuration without doing
/// any work; the caller then chains stage methods through to
/// [`Rendered::into_result`].
pub struct Analysis;

impl Analysis {
    /// Create a pipeline for one run.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(input: AnalysisInput, config: AnalysisConfig) -> Pending {
        Pending { config, input }
    }
}
