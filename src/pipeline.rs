//! Batch controller: one-time setup, the per-unit loop and the circuit breaker.
//!
//! [`BatchPipeline::prepare`] does everything that may fail fatally before any
//! unit is touched: validation, statistics, fonts, the single reachability
//! probe, backend selection and resource loading.  [`BatchPipeline::run`] then
//! processes units strictly in order and never returns an error; per-unit
//! failures become [`RenderResult::Failure`] entries and three consecutive ones
//! trip the breaker.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::basemap::{resolve_basemap, BasemapDecision};
use crate::charts::{select_backend, ChartArtifact, ChartBackend, ChartSpec};
use crate::circuit::{CircuitBreaker, CircuitState};
use crate::config::{parse_hex_color, OutputFormat, ReportConfig};
use crate::error::{ChartError, CompositionError, SetupError, Stage};
use crate::fonts::FontSet;
use crate::locale::Locale;
use crate::map::{
    thematic_layer, Background, GeometrySource, HttpTileFetcher, MapCompositor, MapStyle,
    TileFetcher, DEFAULT_TILE_TIMEOUT,
};
use crate::model::{sanitize_file_name, TerritorialUnit};
use crate::probe::{HttpProbe, ReachabilityProbe};
use crate::report::{ReportComposer, TemplateSpec};
use crate::stats::{StatisticsOptions, StatisticsSummary, DEFAULT_HISTOGRAM_BINS};
use crate::summary::{BatchStatus, BatchSummary, BatchWarning, RenderResult};
use crate::text::TextPainter;

/// Name of the summary file written next to the artifacts.
pub const SUMMARY_FILE_NAME: &str = "batch_summary.json";

/// Resolution of preview pages.
pub const PREVIEW_DPI: u32 = 96;

/// Cooperative stop signal checked before each unit.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Where the text fonts come from.
#[derive(Debug, Default)]
pub enum FontSource {
    /// Search the font directories; PNG runs continue without text on failure.
    #[default]
    Discover,
    Provided(FontSet),
    /// Render without text. Only valid for PNG output.
    Disabled,
}

/// External collaborators of a batch run.
pub struct Collaborators {
    pub geometry: Arc<dyn GeometrySource>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub tiles: Arc<dyn TileFetcher>,
    pub fonts: FontSource,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("fonts", &self.fonts)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Network-backed probe and tile fetcher over `geometry`.
    pub fn http(geometry: Arc<dyn GeometrySource>) -> Result<Self, SetupError> {
        Ok(Self {
            geometry,
            probe: Arc::new(HttpProbe::new()),
            tiles: Arc::new(HttpTileFetcher::new(DEFAULT_TILE_TIMEOUT)?),
            fonts: FontSource::Discover,
        })
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_tiles(mut self, tiles: Arc<dyn TileFetcher>) -> Self {
        self.tiles = tiles;
        self
    }

    pub fn with_fonts(mut self, fonts: FontSource) -> Self {
        self.fonts = fonts;
        self
    }
}

/// Resolution-dependent rendering settings.
#[derive(Debug)]
struct RenderPlan {
    map_style: MapStyle,
    /// Distribution, ranking, proportion and summary table sizes in pixels.
    chart_specs: [ChartSpec; 4],
    composer: ReportComposer,
}

impl RenderPlan {
    fn new(
        base_style: &MapStyle,
        base_spec: &ChartSpec,
        template: &TemplateSpec,
        dpi: u32,
        composer: ReportComposer,
    ) -> Self {
        let layout = &template.layout;
        let (map_width, map_height) = layout.map.size_px(dpi);
        let spec = |(width, height): (u32, u32)| {
            let mut spec = base_spec.clone();
            spec.width_px = width.max(1);
            spec.height_px = height.max(1);
            spec
        };
        Self {
            map_style: base_style.clone().with_size(map_width, map_height),
            chart_specs: [
                spec(layout.charts[0].size_px(dpi)),
                spec(layout.charts[1].size_px(dpi)),
                spec(layout.charts[2].size_px(dpi)),
                spec(layout.summary_table.size_px(dpi)),
            ],
            composer,
        }
    }
}

/// A prepared batch run.
pub struct BatchPipeline {
    config: ReportConfig,
    units: Vec<TerritorialUnit>,
    statistics: StatisticsSummary,
    basemap: BasemapDecision,
    backend: Arc<dyn ChartBackend>,
    compositor: MapCompositor,
    template: TemplateSpec,
    plan: RenderPlan,
    preview: RenderPlan,
    warnings: Vec<BatchWarning>,
}

impl std::fmt::Debug for BatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPipeline")
            .field("units", &self.units.len())
            .field("basemap", &self.basemap)
            .field("backend", &self.backend.kind())
            .field("template", &self.template.kind)
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl BatchPipeline {
    /// Validates the run and resolves every batch-wide decision once.
    ///
    /// Statistics cover all of `units`; the batch itself is restricted to
    /// `config.unit_ids` when set, in that order.
    pub fn prepare(
        config: ReportConfig,
        units: Vec<TerritorialUnit>,
        collaborators: Collaborators,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        if units.is_empty() {
            return Err(SetupError::NoUnits);
        }
        let mut seen = HashSet::new();
        for unit in &units {
            if !seen.insert(unit.id()) {
                return Err(SetupError::DuplicateUnit(unit.id().to_owned()));
            }
        }
        let batch = select_units(&units, config.unit_ids.as_deref())?;
        check_file_stems(&batch)?;
        let mut warnings = Vec::new();

        let options = StatisticsOptions {
            classes: config.classes,
            method: config.classification,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        };
        let (statistics, skipped) =
            StatisticsSummary::compute_degraded(&units, &config.indicators, &options)?;
        for err in skipped {
            warn!("Indicator '{}' left out of the run: {}", err.indicator, err);
            warnings.push(BatchWarning::IndicatorSkipped {
                indicator: err.indicator.clone(),
                reason: err.to_string(),
            });
        }
        let primary = statistics.primary().ok_or(SetupError::NoUnits)?;

        let fonts = match collaborators.fonts {
            FontSource::Provided(fonts) => Some(fonts),
            FontSource::Disabled if config.output_format == OutputFormat::Pdf => {
                return Err(SetupError::Fonts(
                    "PDF output needs fonts but text rendering is disabled".to_owned(),
                ))
            }
            FontSource::Disabled => None,
            FontSource::Discover => match FontSet::load() {
                Ok(fonts) => Some(fonts),
                Err(err) if config.output_format == OutputFormat::Png => {
                    warn!("Rendering without text: {}", err);
                    warnings.push(BatchWarning::TextUnavailable {
                        reason: err.to_string(),
                    });
                    None
                }
                Err(err) => return Err(err),
            },
        };
        let text = fonts.as_ref().map(TextPainter::new).transpose()?.map(Arc::new);

        let (basemap, warning) = resolve_basemap(
            config.base_map,
            collaborators.probe.as_ref(),
            Duration::from_millis(config.probe_timeout_ms),
        );
        warnings.extend(warning);

        let selection = select_backend(config.prefer_premium_charts, text.clone());
        info!("Using the {} chart backend", selection.backend.kind());
        warnings.extend(selection.warning);

        let template = TemplateSpec::for_kind(config.template).with_band_colors(
            config.branding.header_color.as_deref().and_then(parse_hex_color),
            config.branding.footer_color.as_deref().and_then(parse_hex_color),
        );
        let highlight = config
            .highlight_color
            .as_deref()
            .and_then(parse_hex_color)
            .unwrap_or(template.palette.highlight);
        let locale = Locale::new(config.language);

        let background = Background::load(config.fallback_background.as_deref())?;
        let compositor = MapCompositor::new(
            Arc::clone(&collaborators.geometry),
            collaborators.tiles,
            background,
            text.clone(),
        )
        .with_thematic(thematic_layer(collaborators.geometry.as_ref(), &units, primary));

        let label = config.indicator_label();
        let map_style = MapStyle::from_stats(&primary.stats, config.color_ramp, label, locale)
            .with_highlight(highlight)
            .with_opacity(config.map_opacity);
        let chart_spec = ChartSpec::new(1, 1, label, locale)
            .with_colors(template.palette.accent, highlight);

        let composer = ReportComposer::new(&config, fonts.as_ref(), text)?;
        let preview_composer = composer.png_preview(PREVIEW_DPI);
        let preview =
            RenderPlan::new(&map_style, &chart_spec, &template, PREVIEW_DPI, preview_composer);
        let plan = RenderPlan::new(&map_style, &chart_spec, &template, config.dpi, composer);

        fs::create_dir_all(&config.output_dir).map_err(|source| SetupError::Resource {
            path: config.output_dir.display().to_string(),
            source,
        })?;

        info!(
            "Prepared batch of {} units ({:?} template, {} output)",
            batch.len(),
            template.kind,
            config.output_format.extension()
        );
        Ok(Self {
            units: batch,
            statistics,
            basemap,
            backend: selection.backend,
            compositor,
            template,
            plan,
            preview,
            warnings,
            config,
        })
    }

    /// Units of the batch, in processing order.
    pub fn units(&self) -> &[TerritorialUnit] {
        &self.units
    }

    pub fn statistics(&self) -> &StatisticsSummary {
        &self.statistics
    }

    pub fn basemap(&self) -> &BasemapDecision {
        &self.basemap
    }

    pub fn warnings(&self) -> &[BatchWarning] {
        &self.warnings
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Runs the whole batch without progress reporting.
    pub fn run(&self) -> BatchSummary {
        self.run_with(&CancellationToken::new(), |_, _, _| {})
    }

    /// Runs the batch, calling `progress(index, total, unit name)` before each unit.
    pub fn run_with<F>(&self, cancel: &CancellationToken, mut progress: F) -> BatchSummary
    where
        F: FnMut(usize, usize, &str),
    {
        let total = self.units.len();
        let mut breaker = CircuitBreaker::default();
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, unit) in self.units.iter().enumerate() {
            if !breaker.allows_work() {
                break;
            }
            if cancel.is_cancelled() {
                info!("Batch cancelled before unit '{}'", unit.id());
                cancelled = true;
                break;
            }
            progress(index, total, unit.display_name());

            match self.process_unit(unit, index) {
                Ok(result) => {
                    debug!("Unit '{}' done", unit.id());
                    breaker.record_success();
                    results.push(result);
                }
                Err(err) => {
                    warn!("Unit failed: {}", err);
                    results.push(RenderResult::failure(&err));
                    if breaker.record_failure() == CircuitState::Tripped {
                        warn!("Circuit breaker tripped: {}", breaker.trip_reason());
                    }
                }
            }
        }

        let status = if breaker.state() == CircuitState::Tripped {
            BatchStatus::Tripped {
                reason: breaker.trip_reason(),
            }
        } else if cancelled {
            BatchStatus::Cancelled
        } else {
            breaker.complete();
            BatchStatus::Completed
        };
        let not_attempted = self.units[results.len()..]
            .iter()
            .map(|unit| unit.id().to_owned())
            .collect();

        let summary = BatchSummary {
            status,
            results,
            not_attempted,
            warnings: self.warnings.clone(),
            chart_backend: self.backend.kind(),
            basemap: self.basemap.clone(),
        };
        info!(
            "Batch {}: {} succeeded, {} failed",
            summary.status,
            summary.success_count(),
            summary.failure_count()
        );
        self.write_summary(&summary);
        summary
    }

    /// Renders the first unit of the batch as a PNG page into `directory`.
    pub fn preview(&self, directory: &Path) -> Result<PathBuf, CompositionError> {
        let unit = self
            .units
            .first()
            .ok_or_else(|| CompositionError::new("", Stage::Statistics, "no unit to preview"))?;
        let bytes = self.render_unit(unit, &self.preview)?;
        let name = format!("preview_{}.png", file_stem(unit, 0));
        let path = directory.join(name);
        write_atomic(&path, &bytes)
            .map_err(|err| CompositionError::new(unit.id(), Stage::Write, err.to_string()))?;
        info!("Preview written to {}", path.display());
        Ok(path)
    }

    fn process_unit(
        &self,
        unit: &TerritorialUnit,
        index: usize,
    ) -> Result<RenderResult, CompositionError> {
        let bytes = self.render_unit(unit, &self.plan)?;
        let extension = self.config.output_format.extension();
        let path = self.config.output_dir.join(format!("{}.{}", file_stem(unit, index), extension));
        write_atomic(&path, &bytes).map_err(|err| {
            let message = format!("writing {}: {}", path.display(), err);
            CompositionError::new(unit.id(), Stage::Write, message)
        })?;
        Ok(RenderResult::Success {
            unit_id: unit.id().to_owned(),
            path,
            bytes: bytes.len(),
            used_fallback_background: self.basemap.resolved.is_fallback(),
        })
    }

    /// Statistics slice, charts, map and page for one unit.
    fn render_unit(
        &self,
        unit: &TerritorialUnit,
        plan: &RenderPlan,
    ) -> Result<Vec<u8>, CompositionError> {
        let slice = self.statistics.slice_for(unit.id());
        let primary = self.config.primary_indicator().unwrap_or_default();
        if slice.first().map(|entry| entry.summary.stats.indicator.as_str()) != Some(primary) {
            return Err(CompositionError::new(
                unit.id(),
                Stage::Statistics,
                format!("no value for indicator '{}'", primary),
            ));
        }
        let entry = slice[0];

        let chart_error =
            |err: ChartError| CompositionError::new(unit.id(), Stage::Charts, err.to_string());
        let [distribution, ranking, proportion, table] = &plan.chart_specs;
        let mut charts: Vec<ChartArtifact> = Vec::with_capacity(4);
        charts.push(self.backend.render_distribution(entry, distribution).map_err(chart_error)?);
        charts.push(self.backend.render_ranking(entry, ranking).map_err(chart_error)?);
        match self.backend.render_proportion(entry, proportion) {
            Ok(chart) => charts.push(chart),
            Err(ChartError::Empty(reason)) => {
                debug!("No proportion chart for '{}': {}", unit.id(), reason)
            }
            Err(err) => return Err(chart_error(err)),
        }
        charts.push(self.backend.render_summary_table(entry, table).map_err(chart_error)?);

        let map = self
            .compositor
            .compose_map(unit, &self.basemap, &self.config.context_layers, &plan.map_style)?;
        plan.composer.compose(unit, &slice, &charts, Some(&map), &self.template)
    }

    fn write_summary(&self, summary: &BatchSummary) {
        let path = self.config.output_dir.join(SUMMARY_FILE_NAME);
        let written = summary
            .to_json()
            .map_err(io::Error::from)
            .and_then(|json| write_atomic(&path, json.as_bytes()));
        match written {
            Ok(()) => debug!("Batch summary written to {}", path.display()),
            Err(err) => warn!("Failed to write {}: {}", path.display(), err),
        }
    }
}

fn select_units(
    units: &[TerritorialUnit],
    ids: Option<&[String]>,
) -> Result<Vec<TerritorialUnit>, SetupError> {
    let Some(ids) = ids else {
        return Ok(units.to_vec());
    };
    ids.iter()
        .map(|id| {
            units
                .iter()
                .find(|unit| unit.id() == id)
                .cloned()
                .ok_or_else(|| SetupError::UnknownUnit(id.clone()))
        })
        .collect()
}

fn file_stem(unit: &TerritorialUnit, index: usize) -> String {
    let stem = sanitize_file_name(unit.id());
    if stem.is_empty() {
        format!("unit_{}", index + 1)
    } else {
        stem
    }
}

/// Fails when two units of the batch would share an artifact file.
///
/// Stems are compared case-insensitively so the check also holds on
/// case-folding file systems.
fn check_file_stems(batch: &[TerritorialUnit]) -> Result<(), SetupError> {
    let mut owners: HashMap<String, &str> = HashMap::with_capacity(batch.len());
    for (index, unit) in batch.iter().enumerate() {
        let stem = file_stem(unit, index);
        if let Some(first) = owners.insert(stem.to_lowercase(), unit.id()) {
            return Err(SetupError::FileNameCollision {
                first: first.to_owned(),
                second: unit.id().to_owned(),
                stem,
            });
        }
    }
    Ok(())
}

/// Writes `bytes` to a hidden sibling file and renames it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let partial = path.with_file_name(format!(".{}.partial", name.to_string_lossy()));
    let result = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, path));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("13101.png");
        write_atomic(&path, b"page").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"page");
        assert!(!dir.path().join(".13101.png.partial").exists());

        let missing = dir.path().join("missing").join("x.png");
        assert!(write_atomic(&missing, b"page").is_err());
        assert!(!dir.path().join("missing").join(".x.png.partial").exists());
    }

    #[test]
    fn unit_subset_keeps_requested_order() {
        let units = vec![
            TerritorialUnit::new("a", "A"),
            TerritorialUnit::new("b", "B"),
            TerritorialUnit::new("c", "C"),
        ];
        let ids = vec!["c".to_owned(), "a".to_owned()];
        let selected = select_units(&units, Some(&ids)).unwrap();
        assert_eq!(selected.iter().map(TerritorialUnit::id).collect::<Vec<_>>(), ["c", "a"]);

        let ids = vec!["z".to_owned()];
        assert!(matches!(
            select_units(&units, Some(&ids)),
            Err(SetupError::UnknownUnit(id)) if id == "z"
        ));
    }

    #[test]
    fn file_stems_fall_back_to_position() {
        assert_eq!(file_stem(&TerritorialUnit::new("13/101", "x"), 0), "13_101");
        assert_eq!(file_stem(&TerritorialUnit::new("  ", "x"), 4), "unit_5");
    }

    #[test]
    fn colliding_file_stems_are_rejected() {
        let units = vec![
            TerritorialUnit::new("a/b", "A"),
            TerritorialUnit::new("c", "C"),
            TerritorialUnit::new("a?b", "B"),
        ];
        let err = check_file_stems(&units).unwrap_err();
        assert!(matches!(
            &err,
            SetupError::FileNameCollision { first, second, stem }
                if first == "a/b" && second == "a?b" && stem == "a_b"
        ));

        let folded = vec![TerritorialUnit::new("Maipu", "A"), TerritorialUnit::new("MAIPU", "B")];
        assert!(check_file_stems(&folded).is_err());

        // A blank id falls back to its position, which may clash with a real id.
        let positional = vec![TerritorialUnit::new("unit_2", "A"), TerritorialUnit::new(" ", "B")];
        assert!(check_file_stems(&positional).is_err());

        let distinct = vec![TerritorialUnit::new("a/b", "A"), TerritorialUnit::new("a-b", "B")];
        assert!(check_file_stems(&distinct).is_ok());
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
