//! Analysis diagnostics: timing and counts for each stage.
//!
//! [`analyze_with_diagnostics`] drives the staged pipeline and records a
//! [`StageDiagnostics`] per stage. Time comes from an injected [`Clock`]
//! so the library never reads the system clock itself and tests can use a
//! fake one.
//!
//! Durations are serialized as fractional seconds (`f64`), since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, RiskLevel};
use crate::config::AnalysisConfig;
use crate::pipeline::{Analysis, AnalysisInput, AnalysisOutcome};
use crate::types::AnalysisError;

/// Source of monotonic time for stage measurements.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration must be finite and non-negative seconds"))
    }
}

/// Diagnostics collected from one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDiagnostics {
    /// Config validation and image decoding.
    pub decode: StageDiagnostics,
    /// Approved-boundary extraction.
    pub boundary: StageDiagnostics,
    /// Built-up detection.
    pub builtup: StageDiagnostics,
    /// Encroachment measurement.
    pub measure: StageDiagnostics,
    /// Classification, risk and financial estimate.
    pub assess: StageDiagnostics,
    /// Overlay rendering.
    pub render: StageDiagnostics,
    /// Wall-clock duration of the whole run.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Headline numbers.
    pub summary: AnalysisSummary,
}

/// Diagnostics for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Decoding.
    Decode {
        /// Total encoded input size.
        input_bytes: usize,
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
        /// `width * height`.
        pixel_count: u64,
        /// Whether an input exceeded the size cap.
        downsampled: bool,
    },
    /// Boundary extraction.
    Boundary {
        /// Which tier produced the boundary.
        source: String,
        /// Approved pixels.
        approved_pixels: u64,
        /// Pixels in the region-of-interest box.
        roi_pixels: u64,
    },
    /// Built-up detection.
    Builtup {
        /// Edge pixels inside the ROI.
        edge_pixels: u64,
        /// Contours traced.
        contours_found: usize,
        /// Contours below the area floor.
        rejected_small: usize,
        /// Contours below the solidity floor.
        rejected_sparse: usize,
        /// Contours accepted.
        contours_kept: usize,
        /// Canny low threshold.
        low_threshold: f32,
        /// Canny high threshold.
        high_threshold: f32,
    },
    /// Measurement.
    Measure {
        /// Encroached pixels before clamping.
        raw_encroached_px: u64,
        /// Encroached pixels after clamping.
        encroached_px: u64,
        /// Whether the clamp engaged.
        clamped: bool,
        /// Polygon cross-check percentage, if computed.
        vector_pct: Option<f64>,
    },
    /// Assessment.
    Assess {
        /// Land-use class.
        classification: Classification,
        /// Risk level.
        risk: RiskLevel,
        /// Health index.
        health_index: f64,
        /// Number of recommended actions.
        actions: usize,
    },
    /// Rendering.
    Render {
        /// Overlay width.
        width: u32,
        /// Overlay height.
        height: u32,
        /// Whether a comparison image was produced.
        comparison: bool,
    },
}

/// Headline numbers for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Boundary tier.
    pub boundary_source: String,
    /// Encroachment percentage.
    pub encroachment_pct: f64,
    /// Utilization percentage.
    pub utilization_pct: f64,
    /// Land-use class.
    pub classification: Classification,
}

/// Run the full pipeline, timing every stage with `clock`.
///
/// # Errors
///
/// As for [`Pending::decode`](crate::pipeline::Pending::decode).
pub fn analyze_with_diagnostics<C: Clock>(
    input: AnalysisInput,
    config: AnalysisConfig,
    clock: &C,
) -> Result<(AnalysisOutcome, AnalysisDiagnostics), AnalysisError> {
    let run_start = clock.now();

    let start = clock.now();
    let decoded = Analysis::new(input, config).decode()?;
    let decode = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: decoded.metrics(),
    };

    let start = clock.now();
    let extracted = decoded.extract_boundary();
    let boundary = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: extracted.metrics(),
    };

    let start = clock.now();
    let detected = extracted.detect_builtup();
    let builtup = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: detected.metrics(),
    };

    let start = clock.now();
    let measured = detected.measure();
    let measure = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: measured.metrics(),
    };

    let start = clock.now();
    let assessed = measured.assess();
    let assess = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: assessed.metrics(),
    };

    let start = clock.now();
    let rendered = assessed.render();
    let render = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: rendered.metrics(),
    };

    let outcome = rendered.into_result();
    let report = &outcome.report;
    let summary = AnalysisSummary {
        width: report.frame.width,
        height: report.frame.height,
        boundary_source: report.boundary_source.kind().to_owned(),
        encroachment_pct: report.metrics.encroachment_pct,
        utilization_pct: report.metrics.utilization_pct,
        classification: report.assessment.classification,
    };
    let diagnostics = AnalysisDiagnostics {
        decode,
        boundary,
        builtup,
        measure,
        assess,
        render,
        total_duration: clock.elapsed(&run_start),
        summary,
    };
    Ok((outcome, diagnostics))
}

impl AnalysisDiagnostics {
    /// Stages in execution order with their display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 6] {
        [
            ("Decode", &self.decode),
            ("Boundary", &self.boundary),
            ("Built-up Detection", &self.builtup),
            ("Measure", &self.measure),
            ("Assess", &self.assess),
            ("Render", &self.render),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Analysis Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Frame: {}x{}  |  Boundary: {}",
            self.summary.width, self.summary.height, self.summary.boundary_source,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());
        lines.push(format!(
            "{:<20} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<20} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Encroachment: {:.2}%  |  Utilization: {:.2}%  |  {}",
            self.summary.encroachment_pct,
            self.summary.utilization_pct,
            self.summary.classification,
        ));
        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            downsampled,
            ..
        } => {
            let note = if *downsampled { " (downsampled)" } else { "" };
            format!("{input_bytes} bytes -> {width}x{height}{note}")
        }
        StageMetrics::Boundary {
            source,
            approved_pixels,
            roi_pixels,
        } => format!("{source} approved={approved_pixels}px roi={roi_pixels}px"),
        StageMetrics::Builtup {
            edge_pixels,
            contours_found,
            rejected_small,
            rejected_sparse,
            contours_kept,
            low_threshold,
            high_threshold,
        } => format!(
            "low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixels} contours={contours_found} kept={contours_kept} (small={rejected_small} sparse={rejected_sparse})",
        ),
        StageMetrics::Measure {
            raw_encroached_px,
            encroached_px,
            clamped,
            vector_pct,
        } => {
            let clamp = if *clamped { " clamped" } else { "" };
            let vector = vector_pct.map_or_else(String::new, |p| format!(" vector={p:.2}%"));
            format!("encroached={raw_encroached_px}->{encroached_px}px{clamp}{vector}")
        }
        StageMetrics::Assess {
            classification,
            risk,
            health_index,
            actions,
        } => format!("{classification} risk={} health={health_index:.1} actions={actions}", risk.as_str()),
        StageMetrics::Render {
            width,
            height,
            comparison,
        } => {
            let extra = if *comparison { " +comparison" } else { "" };
            format!("{width}x{height}{extra}")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::types::{ImageRole, RgbImage};

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn png(image: &RgbImage) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn run() -> AnalysisDiagnostics {
        let reference = RgbImage::from_pixel(40, 40, image::Rgb([255, 255, 255]));
        let satellite = RgbImage::from_pixel(40, 40, image::Rgb([80, 90, 70]));
        let input = AnalysisInput::with_reference(png(&reference), png(&satellite));
        let clock = TickClock(Cell::new(0));
        let (_, diagnostics) =
            analyze_with_diagnostics(input, AnalysisConfig::default(), &clock).unwrap();
        diagnostics
    }

    #[test]
    fn every_stage_is_timed_with_the_injected_clock() {
        let diagnostics = run();
        for (name, stage) in diagnostics.stages() {
            assert_eq!(stage.duration, Duration::from_millis(1), "{name}");
        }
        assert!(diagnostics.total_duration >= Duration::from_millis(6));
    }

    #[test]
    fn report_lists_all_stages() {
        let report = run().report();
        assert!(report.contains("Analysis Diagnostics Report"));
        for name in ["Decode", "Boundary", "Built-up Detection", "Measure", "Assess", "Render"] {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("VACANT"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let diagnostics = run();
        let json = serde_json::to_value(&diagnostics).unwrap();
        assert!((json["decode"]["duration"].as_f64().unwrap() - 0.001).abs() < 1e-12);
        let back: AnalysisDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.decode.metrics, diagnostics.decode.metrics);
    }

    #[test]
    fn decode_failure_propagates() {
        let input = AnalysisInput::with_reference(Vec::new(), Vec::new());
        let clock = TickClock(Cell::new(0));
        let result = analyze_with_diagnostics(input, AnalysisConfig::default(), &clock);
        assert!(matches!(
            result,
            Err(AnalysisError::EmptyInput(ImageRole::Reference))
        ));
    }

    #[test]
    fn negative_seconds_are_rejected() {
        let json = r#"{"duration": -1.0, "metrics": {"Render": {"width": 1, "height": 1, "comparison": false}}}"#;
        assert!(serde_json::from_str::<StageDiagnostics>(json).is_err());
    }
}
