//! Optional layout-map metadata.
//!
//! Text recognition is not part of the pipeline. Callers that have an
//! engine plug it in through [`MetadataExtractor`]; the pipeline only ever
//! calls [`extract_best_effort`], so a missing or failing extractor
//! degrades to [`LayoutMetadata::default`] and never reaches the metrics.
//!
//! [`LayoutMetadata::parse_text`] turns recognized text into fields, for
//! extractors that produce plain text.

use serde::{Deserialize, Serialize};

/// Square meters per acre.
const SQM_PER_ACRE: f64 = 4046.86;

/// Square meters per hectare.
const SQM_PER_HECTARE: f64 = 10_000.0;

/// Fields recovered from a layout map's legend and title block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutMetadata {
    /// Industrial area or project name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Total area in square meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_sqm: Option<f64>,
    /// Zone, block or phase label, e.g. `"Zone A"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Map scale, e.g. `"1:2500"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
}

/// Errors an extractor may report. Never fatal to an analysis.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// No extraction engine is available.
    #[error("metadata extraction engine unavailable: {0}")]
    Unavailable(String),
    /// The engine ran but failed.
    #[error("metadata extraction failed: {0}")]
    Failed(String),
}

/// A pluggable source of layout metadata.
pub trait MetadataExtractor {
    /// Extract metadata from raw reference-map bytes.
    ///
    /// # Errors
    ///
    /// Any error is swallowed by [`extract_best_effort`].
    fn extract(&self, reference: &[u8]) -> Result<LayoutMetadata, MetadataError>;
}

/// Extractor that finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadataExtractor;

impl MetadataExtractor for NoopMetadataExtractor {
    fn extract(&self, _reference: &[u8]) -> Result<LayoutMetadata, MetadataError> {
        Ok(LayoutMetadata::default())
    }
}

/// Run `extractor`, degrading any failure to empty metadata.
#[must_use]
pub fn extract_best_effort(extractor: &dyn MetadataExtractor, reference: &[u8]) -> LayoutMetadata {
    match extractor.extract(reference) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!(error = %e, "metadata extraction skipped");
            LayoutMetadata::default()
        }
    }
}

impl LayoutMetadata {
    /// Returns `true` if no field was found.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.area_sqm.is_none() && self.zone.is_none() && self.scale.is_none()
    }

    /// Parse recognized title-block text.
    ///
    /// Recognizes, case-insensitively and one per line:
    /// `Project:`/`Name:`/`Industrial Area:` followed by a name,
    /// `Total Area: <n> <sqm|m2|acres|ha>`, `Zone|Block|Phase <id>`, and
    /// `Scale 1:<n>`.
    #[must_use]
    pub fn parse_text(text: &str) -> Self {
        let mut out = Self::default();
        for line in text.lines().map(str::trim) {
            let lower = line.to_ascii_lowercase();
            if out.name.is_none() {
                out.name = ["project", "name", "industrial area"]
                    .iter()
                    .find_map(|key| value_after(line, &lower, key))
                    .map(str::to_owned);
            }
            if out.area_sqm.is_none() {
                out.area_sqm = value_after(line, &lower, "total area").and_then(parse_area);
            }
            if out.zone.is_none() {
                out.zone = parse_zone(line, &lower);
            }
            if out.scale.is_none() {
                out.scale = parse_scale(&lower);
            }
        }
        out
    }
}

/// Text after `key` and a `:` separator, trimmed, if non-empty.
fn value_after<'a>(line: &'a str, lower: &str, key: &str) -> Option<&'a str> {
    let rest = lower.strip_prefix(key)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix(':')?;
    let offset = line.len() - rest.len();
    let value = line.get(offset..)?.trim();
    (!value.is_empty()).then_some(value)
}

fn parse_area(value: &str) -> Option<f64> {
    let digits: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    let number: f64 = digits.parse().ok()?;
    let unit = value[value.len().min(digits_len(value))..]
        .trim()
        .to_ascii_lowercase();
    let factor = if unit.starts_with("acre") {
        SQM_PER_ACRE
    } else if unit.starts_with("ha") {
        SQM_PER_HECTARE
    } else if unit.starts_with("sqm") || unit.starts_with("sq.m") || unit.starts_with("m2") {
        1.0
    } else {
        return None;
    };
    Some(number * factor)
}

fn digits_len(value: &str) -> usize {
    value
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == ','))
        .map_or(value.len(), |(i, _)| i)
}

fn parse_zone(line: &str, lower: &str) -> Option<String> {
    for (key, label) in [("zone", "Zone"), ("block", "Block"), ("phase", "Phase")] {
        let Some(start) = lower.find(key) else {
            continue;
        };
        let rest = line.get(start + key.len()..)?;
        let id: String = rest
            .trim_start_matches([' ', '-'])
            .chars()
            .take_while(char::is_ascii_alphanumeric)
            .collect();
        if !id.is_empty() {
            return Some(format!("{label} {}", id.to_ascii_uppercase()));
        }
    }
    None
}

fn parse_scale(lower: &str) -> Option<String> {
    let start = lower.find("scale")?;
    let rest = lower.get(start + "scale".len()..)?.trim_start();
    let rest = rest.strip_prefix('1')?.trim_start().strip_prefix(':')?.trim_start();
    let denominator: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!denominator.is_empty()).then(|| format!("1:{denominator}"))
}
