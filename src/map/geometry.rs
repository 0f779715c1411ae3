//! Geometry collaborator interface and an in-memory implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::viewport::Bounds;
use crate::model::GeometryHandle;

/// Failure to provide a geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("unknown geometry handle '{0}'")]
    UnknownHandle(String),
    #[error("unknown context layer '{0}'")]
    UnknownLayer(String),
    #[error("invalid geometry '{handle}': {reason}")]
    Invalid { handle: String, reason: String },
}

/// Polygon or multipolygon in longitude/latitude degrees.
///
/// Rings are closed implicitly; holes are expressed as additional rings and
/// filled with the even-odd rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub rings: Vec<Vec<[f64; 2]>>,
}

impl Geometry {
    pub fn new(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Self { rings }
    }

    /// Axis-aligned rectangle, handy for tests and placeholders.
    pub fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(vec![vec![
            [min_lon, min_lat],
            [max_lon, min_lat],
            [max_lon, max_lat],
            [min_lon, max_lat],
        ]])
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let mut points = self.rings.iter().flatten();
        let first = points.next()?;
        let mut bounds = Bounds::point(first[0], first[1]);
        for point in points {
            bounds.include(point[0], point[1]);
        }
        Some(bounds)
    }

    /// Checks that every ring has at least three finite points.
    pub fn validate(&self, handle: &str) -> Result<(), GeometryError> {
        let invalid = |reason: &str| GeometryError::Invalid {
            handle: handle.to_owned(),
            reason: reason.to_owned(),
        };
        if self.rings.is_empty() {
            return Err(invalid("no rings"));
        }
        for ring in &self.rings {
            if ring.len() < 3 {
                return Err(invalid("ring with fewer than 3 points"));
            }
            if ring.iter().flatten().any(|coordinate| !coordinate.is_finite()) {
                return Err(invalid("non-finite coordinate"));
            }
        }
        Ok(())
    }
}

/// External data source owning unit shapes and context layers.
pub trait GeometrySource: Send + Sync {
    /// Shape of one territorial unit.
    fn unit_geometry(&self, handle: &GeometryHandle) -> Result<Geometry, GeometryError>;

    /// Features of a context layer.
    fn context_layer(&self, layer: &str) -> Result<Vec<Geometry>, GeometryError>;
}

/// Geometry source backed by in-memory polygons, loadable from JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonStore {
    #[serde(default)]
    units: BTreeMap<String, Geometry>,
    #[serde(default)]
    layers: BTreeMap<String, Vec<Geometry>>,
}

impl PolygonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_unit(&mut self, handle: impl Into<String>, geometry: Geometry) {
        self.units.insert(handle.into(), geometry);
    }

    pub fn with_unit(mut self, handle: impl Into<String>, geometry: Geometry) -> Self {
        self.insert_unit(handle, geometry);
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>, features: Vec<Geometry>) -> Self {
        self.layers.insert(layer.into(), features);
        self
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl GeometrySource for PolygonStore {
    fn unit_geometry(&self, handle: &GeometryHandle) -> Result<Geometry, GeometryError> {
        let geometry = self
            .units
            .get(handle.as_str())
            .ok_or_else(|| GeometryError::UnknownHandle(handle.to_string()))?;
        geometry.validate(handle.as_str())?;
        Ok(geometry.clone())
    }

    fn context_layer(&self, layer: &str) -> Result<Vec<Geometry>, GeometryError> {
        self.layers
            .get(layer)
            .cloned()
            .ok_or_else(|| GeometryError::UnknownLayer(layer.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_serves_units_and_layers() {
        let store = PolygonStore::new()
            .with_unit("a", Geometry::rectangle(0.0, 0.0, 1.0, 1.0))
            .with_layer("roads", vec![Geometry::rectangle(0.0, 0.0, 0.1, 2.0)]);

        let geometry = store.unit_geometry(&GeometryHandle::new("a")).unwrap();
        assert_eq!(geometry.bounds().unwrap().max_lat, 1.0);
        assert_eq!(store.context_layer("roads").unwrap().len(), 1);
        assert!(matches!(
            store.unit_geometry(&GeometryHandle::new("b")),
            Err(GeometryError::UnknownHandle(_))
        ));
        assert!(matches!(
            store.context_layer("rivers"),
            Err(GeometryError::UnknownLayer(_))
        ));
    }

    #[test]
    fn degenerate_rings_are_invalid() {
        let degenerate = Geometry::new(vec![vec![[0.0, 0.0], [1.0, 1.0]]]);
        let store = PolygonStore::new().with_unit("bad", degenerate);
        assert!(matches!(
            store.unit_geometry(&GeometryHandle::new("bad")),
            Err(GeometryError::Invalid { .. })
        ));
    }

    #[test]
    fn store_loads_from_json() {
        let store: PolygonStore = serde_json::from_str(
            r#"{"units": {"g1": {"rings": [[[0, 0], [1, 0], [1, 1]]]}}}"#,
        )
        .unwrap();
        assert_eq!(store.unit_count(), 1);
    }
}
