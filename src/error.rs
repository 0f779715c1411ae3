//! Error taxonomy for the batch report pipeline.
//!
//! Errors fall into two groups.  Setup errors ([`SetupError`]) are fatal and
//! surface before any unit is processed.  Per-unit errors
//! ([`CompositionError`]) are caught at the unit boundary by the pipeline and
//! turned into failed [`RenderResult`](crate::summary::RenderResult) entries.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage in which a per-unit failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Extracting the unit's statistics slice.
    Statistics,
    /// Rendering chart artifacts.
    Charts,
    /// Composing the thematic map.
    Map,
    /// Assembling the final document.
    Compose,
    /// Writing the artifact to storage.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Statistics => "statistics",
            Stage::Charts => "charts",
            Stage::Map => "map",
            Stage::Compose => "compose",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Invalid configuration detected by eager validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration field '{field}': {message}")]
pub struct ValidationError {
    /// Dotted name of the offending field.
    pub field: String,
    /// Human readable reason.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Fewer than two units carry a value for an indicator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("indicator '{indicator}' has {valid_count} usable value(s); at least 2 are required")]
pub struct InsufficientDataError {
    pub indicator: String,
    pub valid_count: usize,
}

/// Failure while producing one unit's report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unit '{unit_id}' failed during {stage}: {message}")]
pub struct CompositionError {
    pub unit_id: String,
    pub stage: Stage,
    pub message: String,
}

impl CompositionError {
    pub fn new(unit_id: impl Into<String>, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            stage,
            message: message.into(),
        }
    }
}

/// Failure in a chart backend.
#[derive(Debug, Error)]
pub enum ChartError {
    /// The backend cannot be constructed in this build or environment.
    #[error("chart backend unavailable: {0}")]
    Unavailable(String),
    /// The requested chart has no data to draw.
    #[error("nothing to draw: {0}")]
    Empty(String),
    #[error("chart rasterization failed: {0}")]
    Raster(String),
    #[error("failed to encode chart image")]
    Encode(#[from] image::ImageError),
}

/// Fatal error raised while preparing a batch run.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The primary indicator cannot be classified.
    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),
    #[error("no territorial units to process")]
    NoUnits,
    #[error("unit id '{0}' appears more than once")]
    DuplicateUnit(String),
    #[error("requested unit '{0}' is not part of the loaded data")]
    UnknownUnit(String),
    /// Two units of the batch would be written to the same file.
    #[error("units '{first}' and '{second}' both map to the file name '{stem}'")]
    FileNameCollision {
        first: String,
        second: String,
        stem: String,
    },
    #[error("font setup failed: {0}")]
    Fonts(String),
    #[error("failed to load resource {path}")]
    Resource {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode image resource {path}: {message}")]
    ImageResource { path: String, message: String },
    #[error("network client setup failed: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_error_names_unit_and_stage() {
        let err = CompositionError::new("13101", Stage::Map, "geometry missing");
        assert_eq!(
            err.to_string(),
            "unit '13101' failed during map: geometry missing"
        );
    }

    #[test]
    fn validation_error_converts_into_setup_error() {
        let err: SetupError = ValidationError::new("dpi", "out of range").into();
        assert!(matches!(err, SetupError::Validation(_)));
        assert!(err.to_string().contains("dpi"));
    }
}
