//! Descriptive statistics, rankings and classification over territorial units.
//!
//! Every computation orders values by `(value, unit id)` before doing any
//! arithmetic, so the summary is a pure function of the unit set: the input
//! order of units never changes a single bit of the output.
//!
//! Classification uses equal-count (quantile) buckets by default.  With `n`
//! valued units and `k = min(classes, n)` buckets, the unit at position `i`
//! of the ascending order lands in bucket `floor(i * k / n)`; equal values
//! straddling a boundary are split by unit id.  Break points are the largest
//! value of each bucket.
//!
//! Ranks follow standard competition ranking with rank 1 for the highest
//! value: `[10, 10, 8]` ranks as `[1, 1, 3]`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::config::{ClassificationMethod, DEFAULT_CLASSES};
use crate::error::InsufficientDataError;
use crate::model::TerritorialUnit;

/// Percentiles reported for every indicator.
pub const PERCENTILE_KEYS: [u8; 7] = [5, 10, 25, 50, 75, 90, 95];
/// Default histogram resolution for distribution charts.
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

/// Tunables of the statistics engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatisticsOptions {
    pub classes: usize,
    pub method: ClassificationMethod,
    pub histogram_bins: usize,
}

impl Default for StatisticsOptions {
    fn default() -> Self {
        Self {
            classes: DEFAULT_CLASSES,
            method: ClassificationMethod::Quantile,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

/// Equal-width histogram of an indicator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Histogram {
    /// `counts.len() + 1` ascending bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Index of the bin containing `value`, if it lies within the edges.
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        let first = *self.edges.first()?;
        let last = *self.edges.last()?;
        if value < first || value > last || self.counts.is_empty() {
            return None;
        }
        let width = (last - first) / self.counts.len() as f64;
        let index = ((value - first) / width).floor() as usize;
        Some(index.min(self.counts.len() - 1))
    }
}

/// Aggregate statistics of one indicator across all valued units.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndicatorStats {
    pub indicator: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    pub total: f64,
    pub percentiles: Vec<(u8, f64)>,
    /// Upper bound of each class, ascending.
    pub breaks: Vec<f64>,
    pub method: ClassificationMethod,
    pub histogram: Histogram,
}

impl IndicatorStats {
    /// Number of classes actually produced.
    pub fn class_count(&self) -> usize {
        self.breaks.len()
    }

    pub fn percentile(&self, key: u8) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| *value)
    }
}

/// Values derived for one unit and one indicator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitDerived {
    pub unit_id: String,
    pub name: String,
    pub value: f64,
    /// Competition rank, 1 = highest value.
    pub rank: usize,
    /// Share of units with a value lower than or equal to this one, in percent.
    pub percentile: f64,
    /// 0-based classification bucket.
    pub bucket: usize,
    /// Distance from the mean in standard deviations.
    pub deviation_from_mean: f64,
    pub is_max: bool,
    pub is_min: bool,
}

/// Statistics of one indicator plus every unit's derived values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndicatorSummary {
    pub stats: IndicatorStats,
    /// Units in ranking order (rank ascending, then unit id).
    pub ranking: Vec<UnitDerived>,
    #[serde(skip)]
    index: BTreeMap<String, usize>,
}

impl IndicatorSummary {
    /// Derived values of `unit_id`, if the unit has a value for this indicator.
    pub fn unit(&self, unit_id: &str) -> Option<&UnitDerived> {
        self.index.get(unit_id).map(|&position| &self.ranking[position])
    }

    pub fn total_units(&self) -> usize {
        self.ranking.len()
    }
}

/// Per-run aggregate over all selected indicators.
///
/// The summary is derived data: it is recomputed wholesale whenever the unit
/// set or indicator selection changes and never mutated in place.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatisticsSummary {
    indicators: Vec<IndicatorSummary>,
}

/// One unit's view of the summary, as handed to charts and templates.
#[derive(Clone, Copy, Debug)]
pub struct SliceEntry<'a> {
    pub summary: &'a IndicatorSummary,
    pub unit: &'a UnitDerived,
}

impl StatisticsSummary {
    /// Computes statistics for every indicator.
    ///
    /// Fails when any indicator has fewer than two valued units.
    pub fn compute(
        units: &[TerritorialUnit],
        indicators: &[String],
        options: &StatisticsOptions,
    ) -> Result<Self, InsufficientDataError> {
        let indicators = indicators
            .iter()
            .map(|indicator| compute_indicator(units, indicator, options))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { indicators })
    }

    /// Computes statistics where only the first indicator is mandatory.
    ///
    /// Secondary indicators without enough data are left out of the summary
    /// and reported back so the caller can record them as warnings.
    pub fn compute_degraded(
        units: &[TerritorialUnit],
        indicators: &[String],
        options: &StatisticsOptions,
    ) -> Result<(Self, Vec<InsufficientDataError>), InsufficientDataError> {
        let mut computed = Vec::with_capacity(indicators.len());
        let mut skipped = Vec::new();

        for (position, indicator) in indicators.iter().enumerate() {
            match compute_indicator(units, indicator, options) {
                Ok(summary) => computed.push(summary),
                Err(err) if position == 0 => return Err(err),
                Err(err) => skipped.push(err),
            }
        }

        Ok((
            Self {
                indicators: computed,
            },
            skipped,
        ))
    }

    pub fn indicators(&self) -> &[IndicatorSummary] {
        &self.indicators
    }

    pub fn indicator(&self, name: &str) -> Option<&IndicatorSummary> {
        self.indicators
            .iter()
            .find(|summary| summary.stats.indicator == name)
    }

    /// The first indicator, which drives classification and colors.
    pub fn primary(&self) -> Option<&IndicatorSummary> {
        self.indicators.first()
    }

    /// Entries for `unit_id` across indicators where the unit has a value.
    pub fn slice_for(&self, unit_id: &str) -> Vec<SliceEntry<'_>> {
        self.indicators
            .iter()
            .filter_map(|summary| {
                summary
                    .unit(unit_id)
                    .map(|unit| SliceEntry { summary, unit })
            })
            .collect()
    }
}

struct Valued<'a> {
    id: &'a str,
    name: &'a str,
    value: f64,
}

fn ascending(a: &Valued<'_>, b: &Valued<'_>) -> Ordering {
    a.value.total_cmp(&b.value).then_with(|| a.id.cmp(b.id))
}

fn compute_indicator(
    units: &[TerritorialUnit],
    indicator: &str,
    options: &StatisticsOptions,
) -> Result<IndicatorSummary, InsufficientDataError> {
    let mut ordered: Vec<Valued<'_>> = units
        .iter()
        .filter_map(|unit| {
            unit.value(indicator).map(|value| Valued {
                id: unit.id(),
                name: unit.display_name(),
                value,
            })
        })
        .collect();

    if ordered.len() < 2 {
        return Err(InsufficientDataError {
            indicator: indicator.to_owned(),
            valid_count: ordered.len(),
        });
    }

    ordered.sort_by(ascending);
    let values: Vec<f64> = ordered.iter().map(|entry| entry.value).collect();
    let n = values.len();
    let min = values[0];
    let max = values[n - 1];
    let mean = values.iter().mean();
    let std_dev = values.iter().std_dev();
    let total: f64 = values.iter().sum();

    let percentiles = PERCENTILE_KEYS
        .iter()
        .map(|&key| (key, interpolated_percentile(&values, f64::from(key))))
        .collect();

    let (buckets, breaks) = classify(&values, options.classes.max(1), options.method);
    let histogram = histogram(&values, options.histogram_bins.max(1));

    let mut derived: Vec<UnitDerived> = ordered
        .iter()
        .zip(&buckets)
        .map(|(entry, &bucket)| {
            let at_or_below = values.partition_point(|candidate| *candidate <= entry.value);
            UnitDerived {
                unit_id: entry.id.to_owned(),
                name: entry.name.to_owned(),
                value: entry.value,
                rank: 0,
                percentile: at_or_below as f64 / n as f64 * 100.0,
                bucket,
                deviation_from_mean: if std_dev > 0.0 {
                    (entry.value - mean) / std_dev
                } else {
                    0.0
                },
                is_max: entry.value == max,
                is_min: entry.value == min,
            }
        })
        .collect();

    derived.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| a.unit_id.cmp(&b.unit_id))
    });
    let mut previous: Option<f64> = None;
    let mut current_rank = 0;
    for (position, entry) in derived.iter_mut().enumerate() {
        if previous != Some(entry.value) {
            current_rank = position + 1;
            previous = Some(entry.value);
        }
        entry.rank = current_rank;
    }

    let index = derived
        .iter()
        .enumerate()
        .map(|(position, entry)| (entry.unit_id.clone(), position))
        .collect();

    Ok(IndicatorSummary {
        stats: IndicatorStats {
            indicator: indicator.to_owned(),
            count: n,
            min,
            max,
            mean,
            median: interpolated_percentile(&values, 50.0),
            std_dev,
            total,
            percentiles,
            breaks,
            method: options.method,
            histogram,
        },
        ranking: derived,
        index,
    })
}

/// Linear interpolation between closest ranks over ascending `values`.
fn interpolated_percentile(values: &[f64], percent: f64) -> f64 {
    let position = percent / 100.0 * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    values[lower] + (values[upper] - values[lower]) * fraction
}

/// Returns the bucket of each ascending value and the break points.
fn classify(
    values: &[f64],
    classes: usize,
    method: ClassificationMethod,
) -> (Vec<usize>, Vec<f64>) {
    let n = values.len();
    match method {
        ClassificationMethod::Quantile => {
            let k = classes.min(n);
            let buckets: Vec<usize> = (0..n).map(|position| position * k / n).collect();
            let mut breaks = vec![f64::NEG_INFINITY; k];
            for (value, &bucket) in values.iter().zip(&buckets) {
                breaks[bucket] = *value;
            }
            (buckets, breaks)
        }
        ClassificationMethod::EqualInterval => {
            let min = values[0];
            let max = values[n - 1];
            let width = (max - min) / classes as f64;
            let buckets = values
                .iter()
                .map(|value| {
                    if width > 0.0 {
                        (((value - min) / width).floor() as usize).min(classes - 1)
                    } else {
                        0
                    }
                })
                .collect();
            let breaks = (1..=classes)
                .map(|class| {
                    if class == classes {
                        max
                    } else {
                        min + width * class as f64
                    }
                })
                .collect();
            (buckets, breaks)
        }
    }
}

fn histogram(values: &[f64], bins: usize) -> Histogram {
    let (mut low, mut high) = (values[0], values[values.len() - 1]);
    if high - low <= 0.0 {
        low -= 0.5;
        high += 0.5;
    }
    let width = (high - low) / bins as f64;
    let edges = (0..=bins)
        .map(|edge| {
            if edge == bins {
                high
            } else {
                low + width * edge as f64
            }
        })
        .collect();

    let mut counts = vec![0; bins];
    for value in values {
        let index = (((value - low) / width).floor() as usize).min(bins - 1);
        counts[index] += 1;
    }

    Histogram { edges, counts }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(values: &[(&str, Option<f64>)]) -> Vec<TerritorialUnit> {
        values
            .iter()
            .map(|(id, value)| {
                TerritorialUnit::new(*id, format!("Unit {}", id)).with_indicator("v", *value)
            })
            .collect()
    }

    fn summary(values: &[(&str, Option<f64>)], options: StatisticsOptions) -> IndicatorSummary {
        let summary =
            StatisticsSummary::compute(&units(values), &["v".to_owned()], &options).unwrap();
        summary.indicator("v").unwrap().clone()
    }

    #[test]
    fn ranking_uses_competition_ranks() {
        let summary = summary(
            &[("a", Some(10.0)), ("b", Some(10.0)), ("c", Some(8.0))],
            StatisticsOptions::default(),
        );
        let ranks: Vec<usize> = ["a", "b", "c"]
            .iter()
            .map(|id| summary.unit(id).unwrap().rank)
            .collect();
        assert_eq!(ranks, vec![1, 1, 3]);
    }

    #[test]
    fn descriptive_statistics_match_hand_computation() {
        let summary = summary(
            &[
                ("a", Some(2.0)),
                ("b", Some(4.0)),
                ("c", Some(4.0)),
                ("d", Some(4.0)),
                ("e", Some(5.0)),
                ("f", Some(5.0)),
                ("g", Some(7.0)),
                ("h", Some(9.0)),
            ],
            StatisticsOptions::default(),
        );
        let stats = &summary.stats;
        assert_eq!(stats.count, 8);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert!((stats.median - 4.5).abs() < 1e-12);
        assert!((stats.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
        assert_eq!(stats.total, 40.0);
        assert_eq!(stats.histogram.counts.iter().sum::<usize>(), 8);
        assert_eq!(stats.percentile(50), Some(stats.median));
    }

    #[test]
    fn quantile_breaks_match_class_count() {
        let values: Vec<(String, Option<f64>)> = (0..10)
            .map(|i| (format!("u{:02}", i), Some(i as f64)))
            .collect();
        let borrowed: Vec<(&str, Option<f64>)> =
            values.iter().map(|(id, v)| (id.as_str(), *v)).collect();
        let summary = summary(&borrowed, StatisticsOptions::default());

        assert_eq!(summary.stats.class_count(), 5);
        assert_eq!(summary.stats.breaks, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
        assert_eq!(summary.unit("u00").unwrap().bucket, 0);
        assert_eq!(summary.unit("u09").unwrap().bucket, 4);
    }

    #[test]
    fn fewer_units_than_classes_yields_fewer_non_empty_buckets() {
        let summary = summary(
            &[("a", Some(1.0)), ("b", Some(2.0)), ("c", Some(3.0))],
            StatisticsOptions::default(),
        );
        assert_eq!(summary.stats.class_count(), 3);
        let mut buckets: Vec<usize> = summary.ranking.iter().map(|u| u.bucket).collect();
        buckets.sort_unstable();
        assert_eq!(buckets, vec![0, 1, 2]);
    }

    #[test]
    fn tied_values_across_a_boundary_split_by_unit_id() {
        let summary = summary(
            &[("b", Some(5.0)), ("a", Some(5.0))],
            StatisticsOptions {
                classes: 2,
                ..StatisticsOptions::default()
            },
        );
        assert_eq!(summary.unit("a").unwrap().bucket, 0);
        assert_eq!(summary.unit("b").unwrap().bucket, 1);
    }

    #[test]
    fn equal_interval_buckets_span_equal_widths() {
        let summary = summary(
            &[
                ("a", Some(0.0)),
                ("b", Some(1.0)),
                ("c", Some(9.9)),
                ("d", Some(10.0)),
            ],
            StatisticsOptions {
                classes: 2,
                method: ClassificationMethod::EqualInterval,
                ..StatisticsOptions::default()
            },
        );
        assert_eq!(summary.stats.breaks, vec![5.0, 10.0]);
        assert_eq!(summary.unit("b").unwrap().bucket, 0);
        assert_eq!(summary.unit("c").unwrap().bucket, 1);
        assert_eq!(summary.unit("d").unwrap().bucket, 1);
    }

    #[test]
    fn insufficient_data_is_reported() {
        let err = StatisticsSummary::compute(
            &units(&[("a", Some(1.0)), ("b", None)]),
            &["v".to_owned()],
            &StatisticsOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.indicator, "v");
        assert_eq!(err.valid_count, 1);
    }

    #[test]
    fn degraded_compute_skips_secondary_indicators() {
        let units = vec![
            TerritorialUnit::new("a", "A")
                .with_indicator("main", 1.0)
                .with_indicator("sparse", 3.0),
            TerritorialUnit::new("b", "B").with_indicator("main", 2.0),
        ];
        let (summary, skipped) = StatisticsSummary::compute_degraded(
            &units,
            &["main".to_owned(), "sparse".to_owned()],
            &StatisticsOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.indicators().len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].indicator, "sparse");

        let err = StatisticsSummary::compute_degraded(
            &units,
            &["sparse".to_owned(), "main".to_owned()],
            &StatisticsOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.indicator, "sparse");
    }

    #[test]
    fn compute_is_independent_of_input_order() {
        let forward = units(&[
            ("a", Some(0.1)),
            ("b", Some(0.2)),
            ("c", Some(0.7)),
            ("d", Some(0.3)),
            ("e", Some(1e9)),
        ]);
        let mut reversed = forward.clone();
        reversed.reverse();
        let fields = ["v".to_owned()];
        let options = StatisticsOptions::default();

        let first =
            serde_json::to_vec(&StatisticsSummary::compute(&forward, &fields, &options).unwrap())
                .unwrap();
        let second =
            serde_json::to_vec(&StatisticsSummary::compute(&reversed, &fields, &options).unwrap())
                .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn feature_context_values() {
        let summary = summary(
            &[("a", Some(1.0)), ("b", Some(2.0)), ("c", Some(3.0)), ("d", Some(4.0))],
            StatisticsOptions::default(),
        );
        let top = summary.unit("d").unwrap();
        assert!(top.is_max);
        assert!(!top.is_min);
        assert_eq!(top.rank, 1);
        assert_eq!(top.percentile, 100.0);
        assert!(top.deviation_from_mean > 0.0);

        let bottom = summary.unit("a").unwrap();
        assert!(bottom.is_min);
        assert_eq!(bottom.percentile, 25.0);
    }

    #[test]
    fn slice_skips_indicators_without_a_value() {
        let units = vec![
            TerritorialUnit::new("a", "A")
                .with_indicator("x", 1.0)
                .with_indicator("y", 5.0),
            TerritorialUnit::new("b", "B")
                .with_indicator("x", 2.0)
                .with_indicator("y", 6.0),
            TerritorialUnit::new("c", "C").with_indicator("x", 3.0),
        ];
        let summary = StatisticsSummary::compute(
            &units,
            &["x".to_owned(), "y".to_owned()],
            &StatisticsOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.slice_for("a").len(), 2);
        assert_eq!(summary.slice_for("c").len(), 1);
        assert!(summary.slice_for("zzz").is_empty());
    }
}
