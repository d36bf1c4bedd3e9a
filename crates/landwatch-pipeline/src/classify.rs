//! Land-use classification, legal risk, health index and recommended
//! actions.
//!
//! Everything here is a pure, total function of [`EncroachmentMetrics`].
//! Bands are ordered and first-match-wins; non-finite percentages are
//! read as zero so no input can escape the tables.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encroachment::EncroachmentMetrics;

/// Land-use classification of a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// More than 15% of the approved area is encroached.
    MajorViolation,
    /// More than 0.5% encroached.
    EncroachmentMinor,
    /// Less than 5% of the plot is built on.
    Vacant,
    /// Less than 40% built on.
    UnderConstruction,
    /// Everything else.
    FullyConstructed,
}

impl Classification {
    /// Classify from encroachment and utilization percentages.
    #[must_use]
    pub fn from_pcts(encroachment_pct: f64, utilization_pct: f64) -> Self {
        let enc = finite_or_zero(encroachment_pct);
        let util = finite_or_zero(utilization_pct);
        if enc > 15.0 {
            Self::MajorViolation
        } else if enc > 0.5 {
            Self::EncroachmentMinor
        } else if util < 5.0 {
            Self::Vacant
        } else if util < 40.0 {
            Self::UnderConstruction
        } else {
            Self::FullyConstructed
        }
    }

    /// Label as written in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MajorViolation => "MAJOR_VIOLATION",
            Self::EncroachmentMinor => "ENCROACHMENT_MINOR",
            Self::Vacant => "VACANT",
            Self::UnderConstruction => "UNDER_CONSTRUCTION",
            Self::FullyConstructed => "FULLY_CONSTRUCTED",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// At most 0.5% encroached.
    Compliant,
    /// Above 0.5%.
    Low,
    /// 5% or more.
    Moderate,
    /// 15% or more.
    Major,
    /// 30% or more.
    Critical,
}

impl RiskLevel {
    /// Numeric score for the band.
    #[must_use]
    pub const fn score(self) -> u8 {
        match self {
            Self::Compliant => 0,
            Self::Low => 10,
            Self::Moderate => 40,
            Self::Major => 75,
            Self::Critical => 100,
        }
    }

    /// Display color for the band.
    #[must_use]
    pub const fn color(self) -> RiskColor {
        match self {
            Self::Compliant => RiskColor::Green,
            Self::Low => RiskColor::Blue,
            Self::Moderate => RiskColor::Yellow,
            Self::Major => RiskColor::Orange,
            Self::Critical => RiskColor::Red,
        }
    }

    /// Label as written in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "COMPLIANT",
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Color tag attached to a risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskColor {
    /// Critical.
    Red,
    /// Major.
    Orange,
    /// Moderate.
    Yellow,
    /// Low.
    Blue,
    /// Compliant.
    Green,
}

/// Risk band with its score and color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Band.
    pub level: RiskLevel,
    /// `level.score()`.
    pub score: u8,
    /// `level.color()`.
    pub color: RiskColor,
}

impl RiskAssessment {
    /// Band an encroachment percentage.
    #[must_use]
    pub fn from_encroachment(encroachment_pct: f64) -> Self {
        let enc = finite_or_zero(encroachment_pct);
        let level = if enc >= 30.0 {
            RiskLevel::Critical
        } else if enc >= 15.0 {
            RiskLevel::Major
        } else if enc >= 5.0 {
            RiskLevel::Moderate
        } else if enc > 0.5 {
            RiskLevel::Low
        } else {
            RiskLevel::Compliant
        };
        Self {
            level,
            score: level.score(),
            color: level.color(),
        }
    }
}

/// A recommended administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Critical risk.
    #[serde(rename = "Issue immediate stop-work notice")]
    StopWorkNotice,
    /// Critical risk.
    #[serde(rename = "Schedule high-priority field inspection")]
    PriorityInspection,
    /// Critical risk.
    #[serde(rename = "Escalate to legal cell for demolition proceedings")]
    LegalEscalation,
    /// Major risk.
    #[serde(rename = "Issue warning notice")]
    WarningNotice,
    /// Major risk.
    #[serde(rename = "Schedule field inspection")]
    FieldInspection,
    /// Major risk.
    #[serde(rename = "Review lease agreement conditions")]
    ReviewLease,
    /// Moderate risk.
    #[serde(rename = "Notify allottee to rectify boundary")]
    NotifyAllottee,
    /// Moderate risk, and the fallback when no other rule fires.
    #[serde(rename = "Monitor via satellite next cycle")]
    MonitorNextCycle,
    /// Low risk.
    #[serde(rename = "Monitor only")]
    MonitorOnly,
    /// Vacant plot.
    #[serde(rename = "Verify lease utilization terms")]
    VerifyUtilization,
    /// Vacant plot.
    #[serde(rename = "Check non-utilization penalty applicability")]
    NonUtilizationPenalty,
    /// Fully constructed and healthy.
    #[serde(rename = "Compliance verified - no action needed")]
    ComplianceVerified,
}

impl Action {
    /// Human-readable text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StopWorkNotice => "Issue immediate stop-work notice",
            Self::PriorityInspection => "Schedule high-priority field inspection",
            Self::LegalEscalation => "Escalate to legal cell for demolition proceedings",
            Self::WarningNotice => "Issue warning notice",
            Self::FieldInspection => "Schedule field inspection",
            Self::ReviewLease => "Review lease agreement conditions",
            Self::NotifyAllottee => "Notify allottee to rectify boundary",
            Self::MonitorNextCycle => "Monitor via satellite next cycle",
            Self::MonitorOnly => "Monitor only",
            Self::VerifyUtilization => "Verify lease utilization terms",
            Self::NonUtilizationPenalty => "Check non-utilization penalty applicability",
            Self::ComplianceVerified => "Compliance verified - no action needed",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health index above which a fully constructed plot needs no action.
pub const HEALTHY_THRESHOLD: f64 = 80.0;

/// Recommended actions for a risk band and classification.
///
/// Deterministic order, no duplicates, never empty.
#[must_use]
pub fn actions(risk: RiskLevel, classification: Classification, health_index: f64) -> Vec<Action> {
    let mut out: Vec<Action> = match risk {
        RiskLevel::Critical => vec![
            Action::StopWorkNotice,
            Action::PriorityInspection,
            Action::LegalEscalation,
        ],
        RiskLevel::Major => vec![
            Action::WarningNotice,
            Action::FieldInspection,
            Action::ReviewLease,
        ],
        RiskLevel::Moderate => vec![Action::NotifyAllottee, Action::MonitorNextCycle],
        RiskLevel::Low => vec![Action::MonitorOnly],
        RiskLevel::Compliant => Vec::new(),
    };
    match classification {
        Classification::Vacant => {
            out.extend([Action::VerifyUtilization, Action::NonUtilizationPenalty]);
        }
        Classification::FullyConstructed if health_index > HEALTHY_THRESHOLD => {
            out.push(Action::ComplianceVerified);
        }
        _ => {}
    }
    if out.is_empty() {
        out.push(Action::MonitorNextCycle);
    }
    out
}

/// Composite health index in `[0, 100]`:
/// `util * 0.4 + (100 - enc) * 0.4 - risk_score * 0.2`.
#[must_use]
pub fn health_index(encroachment_pct: f64, utilization_pct: f64, risk_score: u8) -> f64 {
    let enc = finite_or_zero(encroachment_pct);
    let util = finite_or_zero(utilization_pct);
    let health = util.mul_add(0.4, (100.0 - enc) * 0.4) - f64::from(risk_score) * 0.2;
    health.clamp(0.0, 100.0)
}

/// Full assessment of one plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Land-use class.
    pub classification: Classification,
    /// Legal risk.
    pub risk: RiskAssessment,
    /// Composite health index.
    pub health_index: f64,
    /// Recommended actions.
    pub actions: Vec<Action>,
}

/// Assess a set of metrics.
#[must_use]
pub fn assess(metrics: &EncroachmentMetrics) -> Assessment {
    let classification = Classification::from_pcts(metrics.encroachment_pct, metrics.utilization_pct);
    let risk = RiskAssessment::from_encroachment(metrics.encroachment_pct);
    let health_index = health_index(metrics.encroachment_pct, metrics.utilization_pct, risk.score);
    let actions = actions(risk.level, classification, health_index);
    Assessment {
        classification,
        risk,
        health_index,
        actions,
    }
}

const fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn metrics(enc: f64, util: f64) -> EncroachmentMetrics {
        EncroachmentMetrics {
            approved_area_px: 10_000,
            builtup_area_px: 0,
            builtup_inside_px: 0,
            encroached_area_px: 0,
            raw_encroached_area_px: 0,
            encroachment_pct: enc,
            utilization_pct: util,
        }
    }

    #[test]
    fn classification_bands_first_match() {
        assert_eq!(Classification::from_pcts(15.1, 90.0), Classification::MajorViolation);
        assert_eq!(Classification::from_pcts(15.0, 90.0), Classification::EncroachmentMinor);
        assert_eq!(Classification::from_pcts(0.6, 0.0), Classification::EncroachmentMinor);
        assert_eq!(Classification::from_pcts(0.5, 4.9), Classification::Vacant);
        assert_eq!(Classification::from_pcts(0.0, 5.0), Classification::UnderConstruction);
        assert_eq!(Classification::from_pcts(0.0, 40.0), Classification::FullyConstructed);
    }

    #[test]
    fn risk_band_edges() {
        let level = |e| RiskAssessment::from_encroachment(e).level;
        assert_eq!(level(30.0), RiskLevel::Critical);
        assert_eq!(level(29.99), RiskLevel::Major);
        assert_eq!(level(15.0), RiskLevel::Major);
        assert_eq!(level(5.0), RiskLevel::Moderate);
        assert_eq!(level(4.0), RiskLevel::Low);
        assert_eq!(level(0.5), RiskLevel::Compliant);
        assert_eq!(level(0.0), RiskLevel::Compliant);
    }

    #[test]
    fn risk_score_and_color_follow_level() {
        let r = RiskAssessment::from_encroachment(40.0);
        assert_eq!((r.score, r.color), (100, RiskColor::Red));
        let r = RiskAssessment::from_encroachment(4.0);
        assert_eq!((r.score, r.color), (10, RiskColor::Blue));
    }

    #[test]
    fn nothing_built_is_vacant_compliant_health_forty() {
        let a = assess(&metrics(0.0, 0.0));
        assert_eq!(a.classification, Classification::Vacant);
        assert_eq!(a.risk.level, RiskLevel::Compliant);
        assert!((a.health_index - 40.0).abs() < 1e-9);
        assert_eq!(
            a.actions,
            vec![Action::VerifyUtilization, Action::NonUtilizationPenalty]
        );
    }

    #[test]
    fn critical_actions_in_order() {
        let a = assess(&metrics(45.0, 60.0));
        assert_eq!(
            a.actions,
            vec![
                Action::StopWorkNotice,
                Action::PriorityInspection,
                Action::LegalEscalation
            ]
        );
    }

    #[test]
    fn healthy_plot_is_verified() {
        let list = actions(RiskLevel::Compliant, Classification::FullyConstructed, 90.0);
        assert_eq!(list, vec![Action::ComplianceVerified]);
    }

    #[test]
    fn best_computed_health_stays_at_threshold() {
        // Full utilization with no encroachment tops out at exactly 80.
        let a = assess(&metrics(0.0, 100.0));
        assert_eq!(a.classification, Classification::FullyConstructed);
        assert!((a.health_index - HEALTHY_THRESHOLD).abs() < 1e-9);
        assert_eq!(a.actions, vec![Action::MonitorNextCycle]);
    }

    #[test]
    fn under_construction_falls_back_to_monitoring() {
        let a = assess(&metrics(0.0, 20.0));
        assert_eq!(a.actions, vec![Action::MonitorNextCycle]);
    }

    #[test]
    fn every_combination_has_actions_without_duplicates() {
        let levels = [
            RiskLevel::Compliant,
            RiskLevel::Low,
            RiskLevel::Moderate,
            RiskLevel::Major,
            RiskLevel::Critical,
        ];
        let classes = [
            Classification::MajorViolation,
            Classification::EncroachmentMinor,
            Classification::Vacant,
            Classification::UnderConstruction,
            Classification::FullyConstructed,
        ];
        for level in levels {
            for class in classes {
                for health in [0.0, 50.0, 100.0] {
                    let list = actions(level, class, health);
                    assert!(!list.is_empty(), "{level} x {class} has no actions");
                    let mut dedup = list.clone();
                    dedup.sort_by_key(|a| a.as_str());
                    dedup.dedup();
                    assert_eq!(dedup.len(), list.len());
                }
            }
        }
    }

    #[test]
    fn assess_is_idempotent() {
        let m = metrics(7.3, 55.0);
        assert_eq!(assess(&m), assess(&m));
    }

    #[test]
    fn non_finite_inputs_are_total() {
        let a = assess(&metrics(f64::NAN, f64::INFINITY));
        assert_eq!(a.classification, Classification::Vacant);
        assert_eq!(a.risk.level, RiskLevel::Compliant);
        assert!(a.health_index.is_finite());
    }

    #[test]
    fn health_is_clamped() {
        assert!((health_index(100.0, 0.0, 100) - 0.0).abs() < f64::EPSILON);
        assert!(health_index(0.0, 500.0, 0) <= 100.0);
    }

    #[test]
    fn serializes_with_report_labels() {
        let json = serde_json::to_value(assess(&metrics(4.0, 10.0))).unwrap();
        assert_eq!(json["classification"], "ENCROACHMENT_MINOR");
        assert_eq!(json["risk"]["level"], "LOW");
        assert_eq!(json["risk"]["color"], "blue");
        assert_eq!(json["actions"][0], "Monitor only");
    }
}
