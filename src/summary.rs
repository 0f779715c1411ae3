//! Per-unit results and the batch-level report.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::basemap::BasemapDecision;
use crate::charts::BackendKind;
use crate::error::{CompositionError, Stage};

/// Non-fatal, batch-level event worth surfacing to the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchWarning {
    /// The requested base map did not answer the probe; the fallback is used.
    ReachabilityDegraded { provider: String, url: String },
    /// A secondary indicator had too little data and was left out.
    IndicatorSkipped { indicator: String, reason: String },
    /// The premium chart backend could not be constructed.
    PremiumChartsUnavailable { reason: String },
    /// No fonts were found; raster output carries no text.
    TextUnavailable { reason: String },
}

impl fmt::Display for BatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchWarning::ReachabilityDegraded { provider, url } => write!(
                f,
                "base map '{}' unreachable ({}); fallback background used",
                provider, url
            ),
            BatchWarning::IndicatorSkipped { indicator, reason } => {
                write!(f, "indicator '{}' skipped: {}", indicator, reason)
            }
            BatchWarning::PremiumChartsUnavailable { reason } => {
                write!(f, "premium charts unavailable: {}", reason)
            }
            BatchWarning::TextUnavailable { reason } => {
                write!(f, "text rendering unavailable: {}", reason)
            }
        }
    }
}

/// Outcome of one unit attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenderResult {
    Success {
        unit_id: String,
        path: PathBuf,
        bytes: usize,
        used_fallback_background: bool,
    },
    Failure {
        unit_id: String,
        stage: Stage,
        error: String,
    },
}

impl RenderResult {
    pub fn failure(err: &CompositionError) -> Self {
        RenderResult::Failure {
            unit_id: err.unit_id.clone(),
            stage: err.stage,
            error: err.message.clone(),
        }
    }

    pub fn unit_id(&self) -> &str {
        match self {
            RenderResult::Success { unit_id, .. } | RenderResult::Failure { unit_id, .. } => {
                unit_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RenderResult::Success { .. })
    }
}

/// Terminal state of a batch run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    /// Aborted after too many consecutive failures.
    Tripped { reason: String },
    /// Stopped by the caller through a cancellation token.
    Cancelled,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Completed => f.write_str("completed"),
            BatchStatus::Tripped { reason } => write!(f, "tripped ({})", reason),
            BatchStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSummary {
    pub status: BatchStatus,
    /// One entry per attempted unit, in submission order.
    pub results: Vec<RenderResult>,
    /// Units never attempted because the run stopped early.
    pub not_attempted: Vec<String>,
    pub warnings: Vec<BatchWarning>,
    pub chart_backend: BackendKind,
    pub basemap: BasemapDecision,
}

impl BatchSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &RenderResult> {
        self.results.iter().filter(|result| result.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RenderResult> {
        self.results.iter().filter(|result| !result.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch {}", self.status)?;
        writeln!(
            f,
            "  {} succeeded, {} failed, {} not attempted",
            self.success_count(),
            self.failure_count(),
            self.not_attempted.len()
        )?;
        writeln!(f, "  chart backend: {}", self.chart_backend)?;
        writeln!(
            f,
            "  background: {}",
            if self.basemap.resolved.is_fallback() {
                "local fallback"
            } else {
                "remote tiles"
            }
        )?;
        for warning in &self.warnings {
            writeln!(f, "  warning: {}", warning)?;
        }
        for result in self.failed() {
            if let RenderResult::Failure {
                unit_id,
                stage,
                error,
            } = result
            {
                writeln!(f, "  failed {} at {}: {}", unit_id, stage, error)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(status: BatchStatus) -> BatchSummary {
        BatchSummary {
            status,
            results: vec![
                RenderResult::Success {
                    unit_id: "a".into(),
                    path: PathBuf::from("out/a.pdf"),
                    bytes: 10,
                    used_fallback_background: true,
                },
                RenderResult::failure(&CompositionError::new("b", Stage::Map, "no geometry")),
            ],
            not_attempted: vec!["c".into()],
            warnings: vec![BatchWarning::ReachabilityDegraded {
                provider: "OpenStreetMap".into(),
                url: "https://tile.openstreetmap.org/0/0/0.png".into(),
            }],
            chart_backend: BackendKind::Basic,
            basemap: BasemapDecision::fallback(),
        }
    }

    #[test]
    fn counts_and_display() {
        let summary = summary(BatchStatus::Tripped {
            reason: "3 consecutive failures".into(),
        });
        assert_eq!(summary.success_count(), 1);
        assert_eq!(summary.failure_count(), 1);
        assert!(!summary.is_complete());

        let text = summary.to_string();
        assert!(text.contains("tripped (3 consecutive failures)"));
        assert!(text.contains("failed b at map: no geometry"));
        assert!(text.contains("chart backend: basic"));
    }

    #[test]
    fn json_tags_outcomes_and_status() {
        let json = summary(BatchStatus::Completed).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["status"]["status"], "completed");
        assert_eq!(value["results"][0]["outcome"], "success");
        assert_eq!(value["results"][1]["stage"], "map");
        assert_eq!(value["warnings"][0]["kind"], "reachability_degraded");
        assert_eq!(value["chart_backend"], "basic");
        assert_eq!(value["basemap"]["resolved"]["kind"], "local_fallback_image");
    }
}
