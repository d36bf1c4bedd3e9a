//! Per-run analysis configuration.
//!
//! Every tunable lives here and is passed into each run; there is no
//! process-wide state. All sections deserialize with `#[serde(default)]`,
//! so a partial JSON document overrides only the fields it names.

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryConfig;
use crate::builtup::DetectorConfig;
use crate::downsample::ResampleFilter;
use crate::economics::FinancialConfig;
use crate::encroachment::EncroachmentConfig;
use crate::location::GeoBounds;
use crate::types::AnalysisError;
use crate::visualize::OverlayStyle;

/// Default cap on the longest image axis.
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Longest axis allowed after decoding; larger inputs are
    /// downsampled. Must be at least 1.
    pub max_dimension: u32,
    /// Filter used for downsampling and frame alignment.
    pub resample_filter: ResampleFilter,
    /// Approved-boundary extraction.
    pub boundary: BoundaryConfig,
    /// Built-up detection.
    pub detector: DetectorConfig,
    /// Encroachment measurement.
    pub encroachment: EncroachmentConfig,
    /// Overlay rendering.
    pub overlay: OverlayStyle,
    /// Financial model.
    pub financial: FinancialConfig,
    /// Geographic extent of the frame, if known.
    pub geo_bounds: Option<GeoBounds>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            resample_filter: ResampleFilter::default(),
            boundary: BoundaryConfig::default(),
            detector: DetectorConfig::default(),
            encroachment: EncroachmentConfig::default(),
            overlay: OverlayStyle::default(),
            financial: FinancialConfig::default(),
            geo_bounds: None,
        }
    }
}

impl AnalysisConfig {
    /// Check every tunable is in range.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.max_dimension == 0 {
            return Err(invalid("max_dimension must be at least 1".into()));
        }

        let b = &self.boundary;
        unit_interval("boundary.red_fraction_min", b.red_fraction_min)?;
        unit_interval("boundary.min_area_fraction", b.min_area_fraction)?;
        unit_interval("boundary.max_area_fraction", b.max_area_fraction)?;
        if b.min_area_fraction >= b.max_area_fraction {
            return Err(invalid(format!(
                "boundary.min_area_fraction ({}) must be below max_area_fraction ({})",
                b.min_area_fraction, b.max_area_fraction
            )));
        }
        unit_interval("boundary.central_fraction", b.central_fraction)?;
        if b.central_fraction <= 0.0 {
            return Err(invalid("boundary.central_fraction must be positive".into()));
        }
        unit_interval("boundary.registry_padding", b.registry_padding)?;
        if b.registry_padding >= 0.5 {
            return Err(invalid("boundary.registry_padding must be below 0.5".into()));
        }
        if b.red_bands.iter().any(|band| band.hue_min > band.hue_max) {
            return Err(invalid("boundary.red_bands: hue_min exceeds hue_max".into()));
        }

        let d = &self.detector;
        if d.equalize_grid == 0 {
            return Err(invalid("detector.equalize_grid must be at least 1".into()));
        }
        non_negative("detector.clip_limit", f64::from(d.clip_limit))?;
        non_negative("detector.blur_sigma", f64::from(d.blur_sigma))?;
        unit_interval("detector.threshold_sigma", f64::from(d.threshold_sigma))?;
        non_negative("detector.min_area_px", d.min_area_px)?;
        unit_interval("detector.min_solidity", d.min_solidity)?;
        non_negative("detector.roi_margin", d.roi_margin)?;

        unit_interval("overlay.encroachment_alpha", f64::from(self.overlay.encroachment_alpha))?;
        non_negative("overlay.boundary_width", f64::from(self.overlay.boundary_width))?;

        let f = &self.financial;
        non_negative("financial.sqm_per_pixel", f.sqm_per_pixel)?;
        non_negative("financial.penalty_rate_per_sqm", f.penalty_rate_per_sqm)?;
        non_negative("financial.lease_rate_per_sqm", f.lease_rate_per_sqm)?;

        if let Some(bounds) = &self.geo_bounds {
            if !bounds.is_valid() {
                return Err(invalid(
                    "geo_bounds must be finite with max above min".into(),
                ));
            }
        }
        Ok(())
    }
}

const fn invalid(message: String) -> AnalysisError {
    AnalysisError::InvalidConfig(message)
}

fn non_negative(name: &str, value: f64) -> Result<(), AnalysisError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite and >= 0, got {value}")))
    }
}

fn unit_interval(name: &str, value: f64) -> Result<(), AnalysisError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within [0, 1], got {value}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"detector": {"min_area_px": 500.0}, "max_dimension": 1024}"#)
                .unwrap();
        assert!((config.detector.min_area_px - 500.0).abs() < f64::EPSILON);
        assert_eq!(config.max_dimension, 1024);
        assert_eq!(config.boundary, BoundaryConfig::default());
        assert!((config.detector.min_solidity - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn json_round_trip_preserves_config() {
        let config = AnalysisConfig {
            geo_bounds: Some(GeoBounds {
                min_lat: 21.25,
                max_lat: 21.26,
                min_lon: 81.62,
                max_lon: 81.63,
            }),
            ..AnalysisConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AnalysisConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn rejects_inverted_area_window() {
        let mut config = AnalysisConfig::default();
        config.boundary.min_area_fraction = 0.5;
        config.boundary.max_area_fraction = 0.4;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_area_fraction"));
    }

    #[test]
    fn rejects_nan_solidity() {
        let mut config = AnalysisConfig::default();
        config.detector.min_solidity = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_negative_rates() {
        let mut config = AnalysisConfig::default();
        config.financial.penalty_rate_per_sqm = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_geo_bounds() {
        let config = AnalysisConfig {
            geo_bounds: Some(GeoBounds {
                min_lat: 1.0,
                max_lat: 1.0,
                min_lon: 0.0,
                max_lon: 1.0,
            }),
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_grid() {
        let mut config = AnalysisConfig::default();
        config.detector.equalize_grid = 0;
        assert!(config.validate().is_err());
    }
}
