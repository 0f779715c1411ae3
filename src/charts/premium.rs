//! Antialiased chart backend drawing vector shapes with `tiny-skia`.

use std::f32::consts::PI;
use std::sync::Arc;

use image::RgbaImage;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, StrokeDash, Transform};

use super::{
    artifact, distribution_data, proportion_share, ranking_data, summary_rows, BackendKind,
    ChartArtifact, ChartBackend, ChartKind, ChartSpec, PlotArea, RANKING_LIMIT,
};
use crate::error::ChartError;
use crate::raster::{pixmap_to_image, skia_color};
use crate::stats::SliceEntry;
use crate::text::{Anchor, TextPainter, TextStyle, Weight};

const INK: [u8; 3] = [0x1d, 0x26, 0x30];
const MUTED: [u8; 3] = [0x8a, 0x96, 0xa3];
const TRACK: [u8; 3] = [0xe3, 0xe8, 0xed];
const HEADER: [u8; 3] = [0x1b, 0x28, 0x38];

/// Backend with antialiased shapes, lollipop rankings and donut proportions.
///
/// Construction fails without a [`TextPainter`], since every premium chart
/// carries labels.
#[derive(Debug)]
pub struct PremiumCharts {
    text: Arc<TextPainter>,
}

impl PremiumCharts {
    pub fn new(text: Option<Arc<TextPainter>>) -> Result<Self, ChartError> {
        let text = text.ok_or_else(|| {
            ChartError::Unavailable("premium charts need fonts for labels".to_owned())
        })?;
        Ok(Self { text })
    }

    fn pixmap(&self, spec: &ChartSpec) -> Result<Pixmap, ChartError> {
        let mut pixmap = Pixmap::new(spec.width_px.max(1), spec.height_px.max(1))
            .ok_or_else(|| ChartError::Raster("invalid chart size".to_owned()))?;
        pixmap.fill(skia_color([255, 255, 255], 1.0));
        Ok(pixmap)
    }

    /// Converts the drawn shapes into an image and adds the title.
    fn finish(&self, pixmap: &Pixmap, spec: &ChartSpec, kind: ChartKind) -> RgbaImage {
        let mut canvas = pixmap_to_image(pixmap);
        let size = PlotArea::title_size(spec);
        let title = self
            .text
            .fit(&spec.title(kind), size, Weight::Bold, spec.width_px as f32 - 8.0);
        self.text
            .draw(&mut canvas, &title, 4.0, 4.0, TextStyle::new(size, INK).bold());
        canvas
    }
}

fn paint(color: [u8; 3], alpha: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(skia_color(color, alpha));
    paint.anti_alias = true;
    paint
}

fn fill_rect(pixmap: &mut Pixmap, x: f32, y: f32, width: f32, height: f32, color: [u8; 3]) {
    if let Some(rect) = Rect::from_xywh(x, y, width.max(0.5), height.max(0.5)) {
        pixmap.fill_rect(rect, &paint(color, 1.0), Transform::identity(), None);
    }
}

fn line(pixmap: &mut Pixmap, from: (f32, f32), to: (f32, f32), color: [u8; 3], stroke: &Stroke) {
    let mut builder = PathBuilder::new();
    builder.move_to(from.0, from.1);
    builder.line_to(to.0, to.1);
    if let Some(path) = builder.finish() {
        pixmap.stroke_path(&path, &paint(color, 1.0), stroke, Transform::identity(), None);
    }
}

fn stroke(width: f32) -> Stroke {
    Stroke {
        width,
        ..Stroke::default()
    }
}

fn dashed(width: f32) -> Stroke {
    Stroke {
        width,
        dash: StrokeDash::new(vec![width * 4.0, width * 3.0], 0.0),
        ..Stroke::default()
    }
}

/// Closed annulus sector from `start` to `end` radians, clockwise from 12 o'clock.
fn ring_sector(
    cx: f32,
    cy: f32,
    outer: f32,
    inner: f32,
    start: f32,
    end: f32,
) -> Option<tiny_skia::Path> {
    let steps = (((end - start).abs() / (2.0 * PI)) * 180.0).ceil().max(2.0) as usize;
    let point = |radius: f32, angle: f32| (cx + radius * angle.sin(), cy - radius * angle.cos());
    let mut builder = PathBuilder::new();

    let (x, y) = point(outer, start);
    builder.move_to(x, y);
    for step in 1..=steps {
        let angle = start + (end - start) * step as f32 / steps as f32;
        let (x, y) = point(outer, angle);
        builder.line_to(x, y);
    }
    for step in (0..=steps).rev() {
        let angle = start + (end - start) * step as f32 / steps as f32;
        let (x, y) = point(inner, angle);
        builder.line_to(x, y);
    }
    builder.close();
    builder.finish()
}

impl ChartBackend for PremiumCharts {
    fn kind(&self) -> BackendKind {
        BackendKind::Premium
    }

    fn render_distribution(
        &self,
        entry: SliceEntry<'_>,
        spec: &ChartSpec,
    ) -> Result<ChartArtifact, ChartError> {
        let data = distribution_data(entry)?;
        let mut pixmap = self.pixmap(spec)?;
        let plot = PlotArea::new(spec, 0.0);
        let slot = plot.width / data.counts.len().max(1) as f32;
        let gap = (slot * 0.12).max(0.5);
        let max = data.max_count() as f32;

        for (index, &count) in data.counts.iter().enumerate() {
            let height = count as f32 / max * plot.height;
            let color = if Some(index) == data.highlighted {
                spec.highlight
            } else {
                spec.accent
            };
            fill_rect(
                &mut pixmap,
                plot.left + index as f32 * slot + gap / 2.0,
                plot.bottom() - height,
                slot - gap,
                height,
                color,
            );
        }

        let weight = (spec.height_px as f32 / 200.0).max(1.0);
        line(
            &mut pixmap,
            (plot.left, plot.bottom()),
            (plot.left + plot.width, plot.bottom()),
            INK,
            &stroke(weight),
        );
        let mean_x = plot.left + data.fraction(data.mean) as f32 * plot.width;
        line(&mut pixmap, (mean_x, plot.top), (mean_x, plot.bottom()), MUTED, &dashed(weight));
        let value_x = plot.left + data.fraction(data.value) as f32 * plot.width;
        line(
            &mut pixmap,
            (value_x, plot.top),
            (value_x, plot.bottom()),
            spec.highlight,
            &stroke(weight * 2.0),
        );

        let canvas = self.finish(&pixmap, spec, ChartKind::Distribution);
        artifact(ChartKind::Distribution, self.kind(), &canvas)
    }

    fn render_ranking(
        &self,
        entry: SliceEntry<'_>,
        spec: &ChartSpec,
    ) -> Result<ChartArtifact, ChartError> {
        let bars = ranking_data(entry, RANKING_LIMIT);
        if bars.is_empty() {
            return Err(ChartError::Empty("ranking has no entries".to_owned()));
        }

        let mut pixmap = self.pixmap(spec)?;
        let label_margin = spec.width_px as f32 * 0.3;
        let plot = PlotArea::new(spec, label_margin);
        let row = plot.height / bars.len() as f32;
        let low = bars.iter().map(|bar| bar.value).fold(0.0, f64::min);
        let high = bars.iter().map(|bar| bar.value).fold(0.0, f64::max);
        let span = if high > low { high - low } else { 1.0 };
        let x_of = |value: f64| plot.left + ((value - low) / span) as f32 * plot.width;
        let zero = x_of(0.0);
        let radius = (row * 0.32).max(1.5);

        for (index, bar) in bars.iter().enumerate() {
            let y = plot.top + (index as f32 + 0.5) * row;
            let end = x_of(bar.value);
            let (color, alpha) = if bar.highlighted {
                (spec.highlight, 1.0)
            } else {
                (spec.accent, 0.85)
            };
            line(&mut pixmap, (zero, y), (end, y), TRACK, &stroke((radius * 0.5).max(1.0)));
            if let Some(dot) = PathBuilder::from_circle(end, y, radius) {
                let fill = paint(color, alpha);
                pixmap.fill_path(&dot, &fill, FillRule::Winding, Transform::identity(), None);
            }
        }
        line(
            &mut pixmap,
            (zero, plot.top),
            (zero, plot.bottom()),
            MUTED,
            &stroke(1.0),
        );

        let mut canvas = self.finish(&pixmap, spec, ChartKind::Ranking);
        let font = (row * 0.65).clamp(6.0, PlotArea::title_size(spec));
        for (index, bar) in bars.iter().enumerate() {
            let weight = if bar.highlighted {
                Weight::Bold
            } else {
                Weight::Regular
            };
            let name = self.text.fit(
                &format!("{}. {}", bar.rank, bar.label),
                font,
                weight,
                label_margin - 6.0,
            );
            let mut style = TextStyle::new(font, if bar.highlighted { spec.highlight } else { INK })
                .anchored(Anchor::End);
            style.weight = weight;
            let top = plot.top + index as f32 * row + (row - font) / 2.0;
            self.text.draw(&mut canvas, &name, plot.left - 6.0, top, style);
        }

        artifact(ChartKind::Ranking, self.kind(), &canvas)
    }

    fn render_proportion(
        &self,
        entry: SliceEntry<'_>,
        spec: &ChartSpec,
    ) -> Result<ChartArtifact, ChartError> {
        let share = proportion_share(entry)? as f32;
        let mut pixmap = self.pixmap(spec)?;
        let plot = PlotArea::new(spec, 0.0);
        let cx = plot.left + plot.width / 2.0;
        let cy = plot.top + plot.height / 2.0;
        let outer = plot.width.min(plot.height) / 2.0;
        let inner = outer * 0.62;

        if let Some(track) = ring_sector(cx, cy, outer, inner, 0.0, 2.0 * PI) {
            let fill = paint(TRACK, 1.0);
            pixmap.fill_path(&track, &fill, FillRule::Winding, Transform::identity(), None);
        }
        if share > 0.0 {
            if let Some(sector) = ring_sector(cx, cy, outer, inner, 0.0, 2.0 * PI * share) {
                pixmap.fill_path(
                    &sector,
                    &paint(spec.highlight, 1.0),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
        }

        let mut canvas = self.finish(&pixmap, spec, ChartKind::Proportion);
        let size = (inner * 0.45).clamp(8.0, 96.0);
        let percent = spec.locale.format_percent(f64::from(share) * 100.0);
        self.text.draw(
            &mut canvas,
            &percent,
            cx,
            cy - size / 2.0,
            TextStyle::new(size, INK).bold().anchored(Anchor::Middle),
        );

        artifact(ChartKind::Proportion, self.kind(), &canvas)
    }

    fn render_summary_table(
        &self,
        entry: SliceEntry<'_>,
        spec: &ChartSpec,
    ) -> Result<ChartArtifact, ChartError> {
        let rows = summary_rows(entry, &spec.locale);
        let mut pixmap = self.pixmap(spec)?;
        let plot = PlotArea::new(spec, 0.0);
        let row = plot.height / rows.len() as f32;

        for index in 0..rows.len() {
            let top = plot.top + index as f32 * row;
            if index == 0 {
                fill_rect(&mut pixmap, plot.left, top, plot.width, row, HEADER);
            } else if index % 2 == 1 {
                fill_rect(&mut pixmap, plot.left, top, plot.width, row, TRACK);
            }
        }

        let mut canvas = self.finish(&pixmap, spec, ChartKind::SummaryTable);
        let font = (row * 0.5).clamp(6.0, PlotArea::title_size(spec));
        for (index, (label, value)) in rows.iter().enumerate() {
            let color = if index == 0 { [255, 255, 255] } else { INK };
            let top = plot.top + index as f32 * row + (row - font) / 2.0;
            self.text
                .draw(&mut canvas, label, plot.left + 6.0, top, TextStyle::new(font, color));
            self.text.draw(
                &mut canvas,
                value,
                plot.left + plot.width - 6.0,
                top,
                TextStyle::new(font, color).bold().anchored(Anchor::End),
            );
        }

        artifact(ChartKind::SummaryTable, self.kind(), &canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::tests::sample_summary;
    use crate::config::Language;
    use crate::fonts::FontSet;
    use crate::locale::Locale;

    fn backend() -> Option<PremiumCharts> {
        let fonts = FontSet::load().ok()?;
        let painter = TextPainter::new(&fonts).ok()?;
        PremiumCharts::new(Some(Arc::new(painter))).ok()
    }

    #[test]
    fn construction_requires_fonts() {
        let err = PremiumCharts::new(None).unwrap_err();
        assert!(matches!(err, ChartError::Unavailable(_)));
    }

    #[test]
    fn ring_sector_closes() {
        assert!(ring_sector(50.0, 50.0, 40.0, 20.0, 0.0, PI).is_some());
    }

    #[test]
    fn renders_all_four_charts() {
        let Some(backend) = backend() else {
            eprintln!("Skipping renders_all_four_charts: no fonts found");
            return;
        };
        let summary = sample_summary(35);
        let entry = summary.slice_for("u010")[0];
        let spec = ChartSpec::new(480, 300, "Population", Locale::new(Language::Es));

        for chart in [
            backend.render_distribution(entry, &spec).unwrap(),
            backend.render_ranking(entry, &spec).unwrap(),
            backend.render_proportion(entry, &spec).unwrap(),
            backend.render_summary_table(entry, &spec).unwrap(),
        ] {
            assert_eq!(chart.backend, BackendKind::Premium);
            assert_eq!((chart.width, chart.height), (480, 300));
            assert!(!chart.bytes.is_empty());
        }

        let again = backend.render_ranking(entry, &spec).unwrap();
        assert_eq!(again.bytes, backend.render_ranking(entry, &spec).unwrap().bytes);
    }
}
