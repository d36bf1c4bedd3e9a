//! Plot registries: look up an approved plot polygon by id.
//!
//! Registry polygons are kept in their source coordinates (typically
//! lon/lat, y pointing north). The pipeline fits them into the satellite
//! frame, so only their shape matters here.

use std::collections::HashMap;
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use landwatch_pipeline::PlotPolygon;
use serde::Deserialize;

use crate::error::StoreError;

/// Source of authoritative plot boundaries.
pub trait PlotRegistry {
    /// Look up the polygon for `plot_id`. `Ok(None)` means the registry
    /// is readable but has no such plot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Registry`] if the registry itself cannot be
    /// consulted.
    fn lookup(&self, plot_id: &str) -> Result<Option<PlotPolygon>, StoreError>;
}

/// A registry held in memory, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    plots: HashMap<String, PlotPolygon>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a plot.
    pub fn insert(&mut self, plot_id: impl Into<String>, polygon: PlotPolygon) {
        self.plots.insert(plot_id.into(), polygon);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }
}

impl FromIterator<(String, PlotPolygon)> for InMemoryRegistry {
    fn from_iter<T: IntoIterator<Item = (String, PlotPolygon)>>(iter: T) -> Self {
        Self {
            plots: iter.into_iter().collect(),
        }
    }
}

impl PlotRegistry for InMemoryRegistry {
    fn lookup(&self, plot_id: &str) -> Result<Option<PlotPolygon>, StoreError> {
        Ok(self.plots.get(plot_id).cloned())
    }
}

/// Registry loaded from a GeoJSON `FeatureCollection`.
///
/// A feature's plot id is its `plot_id` property, else its `id`
/// property, else the feature-level `id`. `Polygon` geometries are used
/// as-is; a `MultiPolygon` keeps each part, so land between the parts is
/// outside the plot.
/// Features without an id or a usable polygon are skipped. The first
/// feature wins when ids repeat.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonRegistry {
    plots: InMemoryRegistry,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

type Ring = Vec<Vec<f64>>;

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Unsupported,
}

impl GeoJsonRegistry {
    /// Read and index a GeoJSON file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Registry`] if it is not a feature collection.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path).map_err(StoreError::io(path))?;
        Self::from_json_str(&text)
    }

    /// Parse and index a GeoJSON document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Registry`] if the document is not a feature
    /// collection.
    pub fn from_json_str(text: &str) -> Result<Self, StoreError> {
        let collection: FeatureCollection = serde_json::from_str(text)
            .map_err(|e| StoreError::Registry(format!("not a GeoJSON feature collection: {e}")))?;

        let mut plots = InMemoryRegistry::new();
        let total = collection.features.len();
        for feature in collection.features {
            let Some(plot_id) = feature_id(&feature) else {
                tracing::debug!("skipping registry feature without an id");
                continue;
            };
            let Some(polygon) = feature.geometry.as_ref().and_then(plot_polygon) else {
                tracing::debug!(%plot_id, "skipping registry feature without a usable polygon");
                continue;
            };
            if plots.plots.contains_key(&plot_id) {
                tracing::warn!(%plot_id, "duplicate registry plot id, keeping the first");
                continue;
            }
            plots.insert(plot_id, polygon);
        }
        tracing::info!(plots = plots.len(), features = total, "loaded plot registry");
        Ok(Self { plots })
    }

    /// Plot ids in the registry, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.plots.plots.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }
}

impl PlotRegistry for GeoJsonRegistry {
    fn lookup(&self, plot_id: &str) -> Result<Option<PlotPolygon>, StoreError> {
        self.plots.lookup(plot_id)
    }
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn feature_id(feature: &Feature) -> Option<String> {
    let from_properties = feature.properties.as_ref().and_then(|props| {
        ["plot_id", "id"]
            .iter()
            .find_map(|key| props.get(*key).and_then(id_string))
    });
    from_properties.or_else(|| feature.id.as_ref().and_then(id_string))
}

fn ring(positions: &Ring) -> Option<LineString<f64>> {
    let coords: Vec<Coord<f64>> = positions
        .iter()
        .filter_map(|p| match p.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Some(Coord { x: *x, y: *y }),
            _ => None,
        })
        .collect();
    // A closed triangle needs four positions.
    (coords.len() >= 4).then(|| LineString::new(coords))
}

fn polygon(rings: &[Ring]) -> Option<Polygon<f64>> {
    let (exterior, holes) = rings.split_first()?;
    let exterior = ring(exterior)?;
    let interiors = holes.iter().filter_map(ring).collect();
    Some(Polygon::new(exterior, interiors))
}

fn plot_polygon(geometry: &Geometry) -> Option<PlotPolygon> {
    let plot = match geometry {
        Geometry::Polygon { coordinates } => PlotPolygon::from_polygon(polygon(coordinates)?),
        Geometry::MultiPolygon { coordinates } => {
            let parts: Vec<Polygon<f64>> = coordinates.iter().filter_map(|p| polygon(p)).collect();
            if parts.is_empty() {
                return None;
            }
            PlotPolygon::from_multi(MultiPolygon::new(parts))
        }
        Geometry::Unsupported => return None,
    };
    (!plot.is_empty()).then_some(plot)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use landwatch_pipeline::Dimensions;

    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "CSIDC-001",
                "properties": {"dist_e": "Raipur"},
                "geometry": {"type": "Polygon", "coordinates": [[[81.0, 21.0], [81.1, 21.0], [81.1, 21.1], [81.0, 21.1], [81.0, 21.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"plot_id": "CSIDC-002"},
                "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]],
                    [[[3, 0], [4, 0], [4, 1], [3, 1], [3, 0]]]
                ]}
            },
            {
                "type": "Feature",
                "properties": {"id": 17},
                "geometry": {"type": "Polygon", "coordinates": [[[0, 0, 250.0], [2, 0, 250.0], [2, 2, 250.0], [0, 0, 250.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"plot_id": "ROAD-9"},
                "geometry": {"type": "LineString", "coordinates": [[0, 0], [5, 5]]}
            },
            {
                "type": "Feature",
                "properties": null,
                "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}
            }
        ]
    }"#;

    #[test]
    fn indexes_polygon_features() {
        let registry = GeoJsonRegistry::from_json_str(COLLECTION).unwrap();
        assert_eq!(registry.ids(), vec!["17", "CSIDC-001", "CSIDC-002"]);

        let plot = registry.lookup("CSIDC-001").unwrap().unwrap();
        assert!((plot.area() - 0.01).abs() < 1e-9);
        assert!(registry.lookup("ROAD-9").unwrap().is_none());
        assert!(registry.lookup("missing").unwrap().is_none());
    }

    #[test]
    fn multipolygon_keeps_gap_between_parts() {
        let registry = GeoJsonRegistry::from_json_str(COLLECTION).unwrap();
        let plot = registry.lookup("CSIDC-002").unwrap().unwrap();
        assert!((plot.area() - 2.0).abs() < 1e-9);
        assert_eq!(plot.polygons().count(), 2);

        let approved = plot.rasterize(Dimensions::new(4, 1));
        assert!(approved.get(0, 0));
        assert!(approved.get(3, 0));
        assert!(!approved.get(1, 0) && !approved.get(2, 0));
    }

    #[test]
    fn altitude_is_ignored() {
        let registry = GeoJsonRegistry::from_json_str(COLLECTION).unwrap();
        let plot = registry.lookup("17").unwrap().unwrap();
        assert!((plot.area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn first_duplicate_wins() {
        let json = r#"{"features": [
            {"properties": {"plot_id": "A"}, "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"properties": {"plot_id": "A"}, "geometry": {"type": "Polygon", "coordinates": [[[0,0],[5,0],[5,5],[0,5],[0,0]]]}}
        ]}"#;
        let registry = GeoJsonRegistry::from_json_str(json).unwrap();
        let plot = registry.lookup("A").unwrap().unwrap();
        assert!((plot.area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_collection() {
        let err = GeoJsonRegistry::from_json_str(r#"{"type": "Point"}"#).unwrap_err();
        assert!(matches!(err, StoreError::Registry(_)));
    }

    #[test]
    fn in_memory_lookup() {
        let registry: InMemoryRegistry = [(
            "P-1".to_owned(),
            PlotPolygon::from_points(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]),
        )]
        .into_iter()
        .collect();
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("P-1").unwrap().is_some());
        assert!(registry.lookup("P-2").unwrap().is_none());
    }
}
