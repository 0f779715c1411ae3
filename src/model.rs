//! Territorial units as handed over by the host data source.
//!
//! Units are immutable for the duration of a batch run.  Geometry is referenced
//! through an opaque [`GeometryHandle`]; the actual shapes live in whichever
//! [`GeometrySource`](crate::map::GeometrySource) the caller plugs in.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a geometry owned by the external data source.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometryHandle(String);

impl GeometryHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeometryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One region of the batch (commune, district, ...) with its indicator values.
///
/// Indicator values are kept in a name-ordered map.  A `None` entry (or a
/// non-finite number) means the value is missing for this unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerritorialUnit {
    id: String,
    name: String,
    #[serde(default)]
    geometry: Option<GeometryHandle>,
    #[serde(default)]
    indicators: BTreeMap<String, Option<f64>>,
}

impl TerritorialUnit {
    /// Creates a unit without geometry or indicator values.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            geometry: None,
            indicators: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the display name, falling back to the id when the name is blank.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn geometry(&self) -> Option<&GeometryHandle> {
        self.geometry.as_ref()
    }

    /// Returns the usable value of `indicator`, ignoring nulls and non-finite numbers.
    pub fn value(&self, indicator: &str) -> Option<f64> {
        self.indicators
            .get(indicator)
            .copied()
            .flatten()
            .filter(|value| value.is_finite())
    }

    pub fn indicators(&self) -> &BTreeMap<String, Option<f64>> {
        &self.indicators
    }

    /// Sets the geometry handle and returns the updated unit.
    pub fn with_geometry(mut self, geometry: impl Into<Option<GeometryHandle>>) -> Self {
        self.geometry = geometry.into();
        self
    }

    /// Sets an indicator value and returns the updated unit.
    pub fn with_indicator(
        mut self,
        name: impl Into<String>,
        value: impl Into<Option<f64>>,
    ) -> Self {
        self.indicators.insert(name.into(), value.into());
        self
    }
}

/// Makes `name` safe for use as a file name.
///
/// Alphanumerics and ` ._-` are kept, every other character becomes `_`, and
/// surrounding whitespace is trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_non_finite_values_read_as_none() {
        let unit = TerritorialUnit::new("1", "A")
            .with_indicator("pop", 10.0)
            .with_indicator("nan", f64::NAN)
            .with_indicator("null", None);

        assert_eq!(unit.value("pop"), Some(10.0));
        assert_eq!(unit.value("nan"), None);
        assert_eq!(unit.value("null"), None);
        assert_eq!(unit.value("absent"), None);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let unit = TerritorialUnit::new("13101", "  ");
        assert_eq!(unit.display_name(), "13101");
    }

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_file_name("Santiago Centro"), "Santiago Centro");
        assert_eq!(sanitize_file_name("O'Higgins / Ñuble"), "O_Higgins _ Ñuble");
        assert_eq!(sanitize_file_name("***"), "___");
        assert_eq!(sanitize_file_name(""), "");
    }

    #[test]
    fn unit_deserializes_with_null_values() {
        let unit: TerritorialUnit = serde_json::from_str(
            r#"{"id": "7", "name": "Seven", "geometry": "g7",
                "indicators": {"a": 1.5, "b": null}}"#,
        )
        .expect("valid unit json");

        assert_eq!(unit.geometry().map(GeometryHandle::as_str), Some("g7"));
        assert_eq!(unit.value("a"), Some(1.5));
        assert_eq!(unit.value("b"), None);
    }
}
