//! Resilient batch generation of per-unit cartographic reports.
//!
//! A run is prepared once with [`BatchPipeline::prepare`], which validates the
//! [`ReportConfig`], computes statistics, probes the base map a single time and
//! picks a chart backend.  [`BatchPipeline::run`] then renders one PDF or PNG
//! page per [`TerritorialUnit`] and stops early through a circuit breaker when
//! failures pile up.

pub mod basemap;
pub mod charts;
pub mod circuit;
pub mod config;
pub mod error;
pub mod fonts;
pub mod locale;
pub mod map;
pub mod model;
pub mod pipeline;
pub mod probe;
mod raster;
pub mod report;
pub mod stats;
pub mod summary;
pub mod text;
pub mod wizard;

pub use basemap::{BaseMapProvider, BaseSource, BasemapDecision};
pub use circuit::{CircuitBreaker, CircuitState};
pub use config::{OutputFormat, ReportConfig, ReportConfigBuilder, TemplateKind};
pub use error::{CompositionError, SetupError, Stage, ValidationError};
pub use model::{GeometryHandle, TerritorialUnit};
pub use pipeline::{BatchPipeline, CancellationToken, Collaborators, FontSource};
pub use summary::{BatchStatus, BatchSummary, BatchWarning, RenderResult};
pub use wizard::{ConfigWizard, WizardStep};
