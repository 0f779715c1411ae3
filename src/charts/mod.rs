//! Chart rendering behind interchangeable backends.
//!
//! Both backends implement [`ChartBackend`] and produce PNG artifacts from one
//! unit's [`SliceEntry`].  The premium backend draws antialiased vector shapes
//! and needs fonts; the basic backend draws plain pixel shapes and works
//! everywhere.  [`select_backend`] picks one per batch and never retries.

mod basic;
#[cfg(feature = "premium-charts")]
mod premium;

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::error::ChartError;
use crate::locale::{Label, Locale};
use crate::stats::SliceEntry;
use crate::summary::BatchWarning;
use crate::text::TextPainter;

pub use basic::BasicCharts;
#[cfg(feature = "premium-charts")]
pub use premium::PremiumCharts;

/// Maximum number of units in a ranking chart.
pub const RANKING_LIMIT: usize = 30;

/// Identity of a chart backend, recorded in the batch summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Premium,
    Basic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Premium => "premium",
            BackendKind::Basic => "basic",
        })
    }
}

/// The four chart operations every backend provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Distribution,
    Ranking,
    Proportion,
    SummaryTable,
}

/// Encoded chart image.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartArtifact {
    pub kind: ChartKind,
    pub backend: BackendKind,
    pub format: image::ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Size and styling shared by all charts of a report.
#[derive(Clone, Debug)]
pub struct ChartSpec {
    pub width_px: u32,
    pub height_px: u32,
    /// Indicator label printed in titles.
    pub label: String,
    pub locale: Locale,
    /// Color of ordinary bars and markers.
    pub accent: [u8; 3],
    /// Color used for the unit the report is about.
    pub highlight: [u8; 3],
}

impl ChartSpec {
    pub fn new(width_px: u32, height_px: u32, label: impl Into<String>, locale: Locale) -> Self {
        Self {
            width_px,
            height_px,
            label: label.into(),
            locale,
            accent: [0x4a, 0x6f, 0x8a],
            highlight: [0xe6, 0x39, 0x46],
        }
    }

    pub fn with_colors(mut self, accent: [u8; 3], highlight: [u8; 3]) -> Self {
        self.accent = accent;
        self.highlight = highlight;
        self
    }

    fn title(&self, chart: ChartKind) -> String {
        let locale = &self.locale;
        match chart {
            ChartKind::Distribution => {
                format!("{}: {}", locale.label(Label::Distribution), self.label)
            }
            ChartKind::Ranking => format!("{}: {}", locale.label(Label::Ranking), self.label),
            ChartKind::Proportion => locale.label(Label::Proportion).to_owned(),
            ChartKind::SummaryTable => locale.label(Label::Summary).to_owned(),
        }
    }
}

/// Capability set shared by the chart backends.
///
/// Output is deterministic: identical entries and specs yield identical bytes.
pub trait ChartBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Histogram of the indicator with the unit's bin highlighted.
    fn render_distribution(&self, entry: SliceEntry<'_>, spec: &ChartSpec)
        -> Result<ChartArtifact, ChartError>;

    /// Units ordered by rank, at most [`RANKING_LIMIT`], always including the unit.
    fn render_ranking(&self, entry: SliceEntry<'_>, spec: &ChartSpec)
        -> Result<ChartArtifact, ChartError>;

    /// The unit's share of the indicator total.
    ///
    /// Fails with [`ChartError::Empty`] when the share is undefined.
    fn render_proportion(&self, entry: SliceEntry<'_>, spec: &ChartSpec)
        -> Result<ChartArtifact, ChartError>;

    /// Key figures of the unit against the whole batch.
    fn render_summary_table(&self, entry: SliceEntry<'_>, spec: &ChartSpec)
        -> Result<ChartArtifact, ChartError>;
}

/// Backend chosen for a batch and the warning to record, if any.
pub struct BackendSelection {
    pub backend: Arc<dyn ChartBackend>,
    pub warning: Option<BatchWarning>,
}

impl fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelection")
            .field("backend", &self.backend.kind())
            .field("warning", &self.warning)
            .finish()
    }
}

/// Chooses between a premium constructor and the basic fallback.
///
/// `premium` is invoked at most once and only when `prefer_premium` is set.
pub fn select_backend_with<P, B>(prefer_premium: bool, premium: P, basic: B) -> BackendSelection
where
    P: FnOnce() -> Result<Arc<dyn ChartBackend>, ChartError>,
    B: FnOnce() -> Arc<dyn ChartBackend>,
{
    if !prefer_premium {
        info!("Using basic chart backend (premium charts disabled)");
        return BackendSelection {
            backend: basic(),
            warning: None,
        };
    }

    match premium() {
        Ok(backend) => {
            info!("Using premium chart backend");
            BackendSelection {
                backend,
                warning: None,
            }
        }
        Err(err) => {
            warn!("Premium chart backend unavailable ({}); using basic backend", err);
            BackendSelection {
                backend: basic(),
                warning: Some(BatchWarning::PremiumChartsUnavailable {
                    reason: err.to_string(),
                }),
            }
        }
    }
}

/// Selects the backend for a batch run.
pub fn select_backend(prefer_premium: bool, text: Option<Arc<TextPainter>>) -> BackendSelection {
    let basic_text = text.clone();
    select_backend_with(
        prefer_premium,
        move || premium_backend(text),
        move || -> Arc<dyn ChartBackend> { Arc::new(BasicCharts::new(basic_text)) },
    )
}

#[cfg(feature = "premium-charts")]
fn premium_backend(text: Option<Arc<TextPainter>>) -> Result<Arc<dyn ChartBackend>, ChartError> {
    Ok(Arc::new(PremiumCharts::new(text)?))
}

#[cfg(not(feature = "premium-charts"))]
fn premium_backend(_text: Option<Arc<TextPainter>>) -> Result<Arc<dyn ChartBackend>, ChartError> {
    Err(ChartError::Unavailable("backend not compiled in".to_owned()))
}

pub(crate) struct DistributionData {
    pub counts: Vec<usize>,
    pub highlighted: Option<usize>,
    pub low: f64,
    pub high: f64,
    pub value: f64,
    pub mean: f64,
}

impl DistributionData {
    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0).max(1)
    }

    /// Position of `value` within the histogram span, 0 to 1.
    pub fn fraction(&self, value: f64) -> f64 {
        if self.high > self.low {
            ((value - self.low) / (self.high - self.low)).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}

pub(crate) fn distribution_data(entry: SliceEntry<'_>) -> Result<DistributionData, ChartError> {
    let stats = &entry.summary.stats;
    let histogram = &stats.histogram;
    let (Some(&low), Some(&high)) = (histogram.edges.first(), histogram.edges.last()) else {
        return Err(ChartError::Empty(format!("no histogram for '{}'", stats.indicator)));
    };
    Ok(DistributionData {
        counts: histogram.counts.clone(),
        highlighted: histogram.bin_of(entry.unit.value),
        low,
        high,
        value: entry.unit.value,
        mean: stats.mean,
    })
}

pub(crate) struct RankingBar {
    pub label: String,
    pub value: f64,
    pub rank: usize,
    pub highlighted: bool,
}

/// Leading ranking entries, replacing the last one with the unit when it falls outside.
pub(crate) fn ranking_data(entry: SliceEntry<'_>, limit: usize) -> Vec<RankingBar> {
    let ranking = &entry.summary.ranking;
    let mut selected: Vec<_> = ranking.iter().take(limit).collect();
    let included = selected.iter().any(|unit| unit.unit_id == entry.unit.unit_id);
    if !included && !selected.is_empty() {
        selected.pop();
        selected.push(entry.unit);
    }
    selected
        .into_iter()
        .map(|unit| RankingBar {
            label: unit.name.clone(),
            value: unit.value,
            rank: unit.rank,
            highlighted: unit.unit_id == entry.unit.unit_id,
        })
        .collect()
}

/// Share of the unit in the indicator total, 0 to 1.
pub(crate) fn proportion_share(entry: SliceEntry<'_>) -> Result<f64, ChartError> {
    let total = entry.summary.stats.total;
    let value = entry.unit.value;
    if total <= 0.0 || value < 0.0 || value > total {
        return Err(ChartError::Empty(format!(
            "share of '{}' undefined for value {} and total {}",
            entry.summary.stats.indicator, value, total
        )));
    }
    Ok(value / total)
}

/// Label/value rows of the summary table.
pub fn summary_rows(entry: SliceEntry<'_>, locale: &Locale) -> Vec<(String, String)> {
    let stats = &entry.summary.stats;
    let unit = entry.unit;
    vec![
        (locale.label(Label::Value).to_owned(), locale.format_number(unit.value)),
        (
            locale.label(Label::Rank).to_owned(),
            locale.format_rank(unit.rank, entry.summary.total_units()),
        ),
        (locale.label(Label::Percentile).to_owned(), locale.format_percent(unit.percentile)),
        (locale.label(Label::Mean).to_owned(), locale.format_number(stats.mean)),
        (locale.label(Label::StdDev).to_owned(), locale.format_number(stats.std_dev)),
        (
            locale.label(Label::Deviation).to_owned(),
            format!("{}σ", locale.format_fixed(unit.deviation_from_mean, 2)),
        ),
        (locale.label(Label::Min).to_owned(), locale.format_number(stats.min)),
        (locale.label(Label::Max).to_owned(), locale.format_number(stats.max)),
    ]
}

pub(crate) fn artifact(
    kind: ChartKind,
    backend: BackendKind,
    image: &image::RgbaImage,
) -> Result<ChartArtifact, ChartError> {
    Ok(ChartArtifact {
        kind,
        backend,
        format: image::ImageFormat::Png,
        width: image.width(),
        height: image.height(),
        bytes: crate::raster::encode_png(image)?,
    })
}

/// Plot rectangle left after reserving the title band and axis margins.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PlotArea {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl PlotArea {
    pub fn new(spec: &ChartSpec, left_margin: f32) -> Self {
        let width = spec.width_px as f32;
        let height = spec.height_px as f32;
        let title_band = (height * 0.14).max(12.0);
        let pad = (width.min(height) * 0.04).max(2.0);
        Self {
            left: left_margin + pad,
            top: title_band + pad,
            width: (width - left_margin - 2.0 * pad).max(1.0),
            height: (height - title_band - 2.0 * pad).max(1.0),
        }
    }

    pub fn title_size(spec: &ChartSpec) -> f32 {
        (spec.height_px as f32 * 0.07).clamp(8.0, 64.0)
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}
