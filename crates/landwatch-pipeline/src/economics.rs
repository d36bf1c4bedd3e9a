//! Linear financial-impact model.
//!
//! Pixel areas become square meters through a caller-supplied scale; the
//! rates are policy inputs, not derived here.

use serde::{Deserialize, Serialize};

use crate::classify::Classification;
use crate::encroachment::EncroachmentMetrics;

/// Default ground area of one pixel in square meters.
pub const DEFAULT_SQM_PER_PIXEL: f64 = 0.1;

/// Default penalty per encroached square meter.
pub const DEFAULT_PENALTY_RATE_PER_SQM: f64 = 500.0;

/// Default annual lease rate per square meter.
pub const DEFAULT_LEASE_RATE_PER_SQM: f64 = 50.0;

/// Default currency code.
pub const DEFAULT_CURRENCY: &str = "INR";

/// Rates and scale for [`estimate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialConfig {
    /// Square meters per pixel.
    pub sqm_per_pixel: f64,
    /// Penalty per encroached square meter.
    pub penalty_rate_per_sqm: f64,
    /// Annual lease income per approved square meter.
    pub lease_rate_per_sqm: f64,
    /// ISO currency code for reports.
    pub currency: String,
}

impl Default for FinancialConfig {
    fn default() -> Self {
        Self {
            sqm_per_pixel: DEFAULT_SQM_PER_PIXEL,
            penalty_rate_per_sqm: DEFAULT_PENALTY_RATE_PER_SQM,
            lease_rate_per_sqm: DEFAULT_LEASE_RATE_PER_SQM,
            currency: DEFAULT_CURRENCY.to_owned(),
        }
    }
}

/// Estimated money at stake for one plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialImpact {
    /// Approved plot area in square meters.
    pub plot_area_sqm: f64,
    /// Encroached area in square meters.
    pub encroached_area_sqm: f64,
    /// `encroached_area_sqm * penalty_rate_per_sqm`.
    pub penalty: f64,
    /// `plot_area_sqm * lease_rate_per_sqm`.
    pub potential_annual_revenue: f64,
    /// Revenue lost to non-utilization (all of it when vacant).
    pub revenue_leakage: f64,
    /// `100 * revenue_leakage / potential_annual_revenue`.
    pub inefficiency_pct: f64,
    /// Currency of the monetary fields.
    pub currency: String,
}

/// Estimate financial impact.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate(
    metrics: &EncroachmentMetrics,
    classification: Classification,
    config: &FinancialConfig,
) -> FinancialImpact {
    let scale = non_negative(config.sqm_per_pixel);
    let plot_area_sqm = metrics.approved_area_px as f64 * scale;
    let encroached_area_sqm = metrics.encroached_area_px as f64 * scale;
    let penalty = encroached_area_sqm * non_negative(config.penalty_rate_per_sqm);
    let potential_annual_revenue = plot_area_sqm * non_negative(config.lease_rate_per_sqm);
    let revenue_leakage = if classification == Classification::Vacant {
        potential_annual_revenue
    } else {
        0.0
    };
    let inefficiency_pct = if potential_annual_revenue > 0.0 {
        100.0 * revenue_leakage / potential_annual_revenue
    } else {
        0.0
    };
    FinancialImpact {
        plot_area_sqm,
        encroached_area_sqm,
        penalty,
        potential_annual_revenue,
        revenue_leakage,
        inefficiency_pct,
        currency: config.currency.clone(),
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}
