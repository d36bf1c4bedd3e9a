//! landwatch-pipeline: boundary-constrained encroachment detection
//! (sans-IO).
//!
//! Compares an approved plot boundary, taken from a layout map or a
//! registry polygon, against a co-registered satellite image:
//!
//! boundary extraction -> built-up detection -> encroachment measurement
//! -> classification and risk -> overlay rendering.
//!
//! The crate has **no I/O dependencies**. It takes encoded image bytes
//! and returns structured results and in-memory rasters; the filesystem
//! lives in `landwatch-store`. All tunables travel in an
//! [`AnalysisConfig`] passed to each run.
//!
//! Use [`analyze`] for a one-shot run, [`Analysis`] to step through the
//! stages, or [`diagnostics::analyze_with_diagnostics`] for per-stage
//! timings.

pub mod boundary;
pub mod builtup;
pub mod classify;
pub mod color;
pub mod config;
pub mod contour;
pub mod decode;
pub mod diagnostics;
pub mod downsample;
pub mod economics;
pub mod edges;
pub mod encroachment;
pub mod equalize;
pub mod geometry;
pub mod location;
pub mod metadata;
pub mod morphology;
pub mod pipeline;
pub mod types;
pub mod visualize;

pub use boundary::{BoundaryConfig, BoundaryExtraction, BoundarySource, FallbackReason};
pub use builtup::{BuiltupDetection, DetectionStats, DetectorConfig, RegionOfInterest};
pub use classify::{Action, Assessment, Classification, RiskAssessment, RiskColor, RiskLevel};
pub use config::AnalysisConfig;
pub use economics::{FinancialConfig, FinancialImpact};
pub use encroachment::{EncroachmentConfig, EncroachmentMetrics, VectorSummary};
pub use geometry::{PlotPolygon, RepairOutcome};
pub use location::{GeoBounds, GeoPoint};
pub use metadata::{LayoutMetadata, MetadataError, MetadataExtractor, NoopMetadataExtractor};
pub use pipeline::{Analysis, AnalysisInput, AnalysisOutcome, AnalysisReport, ApprovedSource};
pub use types::{AnalysisError, BinaryMask, Dimensions, GrayImage, ImageRole, Rect, RgbImage};
pub use visualize::OverlayStyle;

/// Run the full pipeline.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidConfig`] for out-of-range tunables,
/// [`AnalysisError::EmptyInput`] for empty image bytes, and
/// [`AnalysisError::ImageDecode`] for unreadable images. Nothing after
/// decoding can fail.
pub fn analyze(input: AnalysisInput, config: AnalysisConfig) -> Result<AnalysisOutcome, AnalysisError> {
    Ok(Analysis::new(input, config)
        .decode()?
        .extract_boundary()
        .detect_builtup()
        .measure()
        .assess()
        .render()
        .into_result())
}

/// Like [`analyze`], reading layout metadata from the reference map with
/// `extractor`. Extractor failures never fail the run.
///
/// # Errors
///
/// As for [`analyze`].
pub fn analyze_with_metadata(
    input: AnalysisInput,
    config: AnalysisConfig,
    extractor: &dyn MetadataExtractor,
) -> Result<AnalysisOutcome, AnalysisError> {
    Ok(Analysis::new(input, config)
        .decode_with(extractor)?
        .extract_boundary()
        .detect_builtup()
        .measure()
        .assess()
        .render()
        .into_result())
}
