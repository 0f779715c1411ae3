//! Pixel-level chart backend built on the `image` crate alone.

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use super::{
    artifact, distribution_data, proportion_share, ranking_data, summary_rows, BackendKind,
    ChartArtifact, ChartBackend, ChartKind, ChartSpec, PlotArea, RANKING_LIMIT,
};
use crate::error::ChartError;
use crate::raster::{draw_line, fill_rect, stroke_rect, WHITE};
use crate::stats::SliceEntry;
use crate::text::{Anchor, TextPainter, TextStyle, Weight};

const INK: [u8; 3] = [0x22, 0x2b, 0x33];
const GRID: [u8; 3] = [0xc8, 0xce, 0xd4];
const STRIPE: [u8; 3] = [0xf1, 0xf3, 0xf5];

/// Always-available backend with flat shapes and no antialiasing.
///
/// Text is drawn when a [`TextPainter`] is supplied and silently left out
/// otherwise.
#[derive(Debug, Default)]
pub struct BasicCharts {
    text: Option<Arc<TextPainter>>,
}

impl BasicCharts {
    pub fn new(text: Option<Arc<TextPainter>>) -> Self {
        Self { text }
    }

    fn canvas(&self, spec: &ChartSpec, kind: ChartKind) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(
            spec.width_px.max(1),
            spec.height_px.max(1),
            Rgba([255, 255, 255, 255]),
        );
        if let Some(text) = &self.text {
            let size = PlotArea::title_size(spec);
            let title = text.fit(&spec.title(kind), size, Weight::Bold, spec.width_px as f32 - 8.0);
            text.draw(&mut canvas, &title, 4.0, 4.0, TextStyle::new(size, INK).bold());
        }
        canvas
    }

    fn label(&self, canvas: &mut RgbaImage, value: &str, x: f32, y: f32, style: TextStyle) {
        if let Some(text) = &self.text {
            text.draw(canvas, value, x, y, style);
        }
    }
}

impl ChartBackend for BasicCharts {
    fn kind(&self) -> BackendKind {
        BackendKind::Basic
    }

    fn render_distribution(
        &self,
        entry: SliceEntry<'_>,
        spec: &ChartSpec,
    ) -> Result<ChartArtifact, ChartError> {
        let data = distribution_data(entry)?;
        let mut canvas = self.canvas(spec, ChartKind::Distribution);
        let plot = PlotArea::new(spec, 0.0);
        let bar_width = plot.width / data.counts.len().max(1) as f32;
        let max = data.max_count() as f32;

        for (index, &count) in data.counts.iter().enumerate() {
            let height = count as f32 / max * plot.height;
            let color = if Some(index) == data.highlighted {
                spec.highlight
            } else {
                spec.accent
            };
            fill_rect(
                &mut canvas,
                (plot.left + index as f32 * bar_width) as i64,
                (plot.bottom() - height) as i64,
                (bar_width - 1.0).max(1.0) as i64,
                height.ceil() as i64,
                color,
            );
        }

        let baseline = plot.bottom() as i64;
        draw_line(
            &mut canvas,
            (plot.left as i64, baseline),
            ((plot.left + plot.width) as i64, baseline),
            INK,
        );
        for (value, color) in [(data.mean, INK), (data.value, spec.highlight)] {
            let x = (plot.left + data.fraction(value) as f32 * plot.width) as i64;
            draw_line(&mut canvas, (x, plot.top as i64), (x, baseline), color);
        }

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

        let mut canvas = self.canvas(spec, ChartKind::Ranking);
        let label_margin = if self.text.is_some() {
            spec.width_px as f32 * 0.3
        } else {
            0.0
        };
        let plot = PlotArea::new(spec, label_margin);
        let row = plot.height / bars.len() as f32;
        let low = bars.iter().map(|bar| bar.value).fold(0.0, f64::min);
        let high = bars.iter().map(|bar| bar.value).fold(0.0, f64::max);
        let span = if high > low { high - low } else { 1.0 };
        let x_of = |value: f64| plot.left + ((value - low) / span) as f32 * plot.width;
        let zero = x_of(0.0);
        let font = (row * 0.7).clamp(6.0, PlotArea::title_size(spec));

        for (index, bar) in bars.iter().enumerate() {
            let top = plot.top + index as f32 * row;
            let end = x_of(bar.value);
            let color = if bar.highlighted {
                spec.highlight
            } else {
                spec.accent
            };
            fill_rect(
                &mut canvas,
                zero.min(end) as i64,
                (top + row * 0.15) as i64,
                ((end - zero).abs().max(1.0)) as i64,
                (row * 0.7).max(1.0) as i64,
                color,
            );

            if let Some(text) = &self.text {
                let weight = if bar.highlighted {
                    Weight::Bold
                } else {
                    Weight::Regular
                };
                let name = text.fit(
                    &format!("{}. {}", bar.rank, bar.label),
                    font,
                    weight,
                    label_margin - 6.0,
                );
                let mut style = TextStyle::new(font, INK).anchored(Anchor::End);
                style.weight = weight;
                self.label(&mut canvas, &name, plot.left - 4.0, top + (row - font) / 2.0, style);
            }
        }
        draw_line(
            &mut canvas,
            (zero as i64, plot.top as i64),
            (zero as i64, plot.bottom() as i64),
            INK,
        );

        artifact(ChartKind::Ranking, self.kind(), &canvas)
    }

    fn render_proportion(
        &self,
        entry: SliceEntry<'_>,
        spec: &ChartSpec,
    ) -> Result<ChartArtifact, ChartError> {
        let share = proportion_share(entry)?;
        let mut canvas = self.canvas(spec, ChartKind::Proportion);
        let plot = PlotArea::new(spec, 0.0);

        let bar_height = (plot.height * 0.25).max(2.0);
        let top = plot.top + (plot.height - bar_height) / 2.0;
        fill_rect(
            &mut canvas,
            plot.left as i64,
            top as i64,
            plot.width as i64,
            bar_height as i64,
            GRID,
        );
        fill_rect(
            &mut canvas,
            plot.left as i64,
            top as i64,
            (plot.width * share as f32).round() as i64,
            bar_height as i64,
            spec.highlight,
        );
        stroke_rect(
            &mut canvas,
            plot.left as i64,
            top as i64,
            plot.width as i64,
            bar_height as i64,
            INK,
        );

        let size = (bar_height * 0.8).clamp(8.0, PlotArea::title_size(spec) * 1.4);
        let percent = spec.locale.format_percent(share * 100.0);
        self.label(
            &mut canvas,
            &percent,
            plot.left + plot.width / 2.0,
            (top - size * 1.3).max(plot.top),
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
        let mut canvas = self.canvas(spec, ChartKind::SummaryTable);
        let plot = PlotArea::new(spec, 0.0);
        let row = plot.height / rows.len() as f32;
        let font = (row * 0.55).clamp(6.0, PlotArea::title_size(spec));

        for (index, (label, value)) in rows.iter().enumerate() {
            let top = plot.top + index as f32 * row;
            let fill = if index % 2 == 0 { STRIPE } else { WHITE };
            fill_rect(
                &mut canvas,
                plot.left as i64,
                top as i64,
                plot.width as i64,
                row.ceil() as i64,
                fill,
            );
            let text_top = top + (row - font) / 2.0;
            self.label(&mut canvas, label, plot.left + 4.0, text_top, TextStyle::new(font, INK));
            self.label(
                &mut canvas,
                value,
                plot.left + plot.width - 4.0,
                text_top,
                TextStyle::new(font, INK).bold().anchored(Anchor::End),
            );
        }
        stroke_rect(
            &mut canvas,
            plot.left as i64,
            plot.top as i64,
            plot.width as i64,
            plot.height as i64,
            GRID,
        );

        artifact(ChartKind::SummaryTable, self.kind(), &canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::tests::sample_summary;
    use crate::config::Language;
    use crate::locale::Locale;
    use image::GenericImageView;

    fn spec() -> ChartSpec {
        ChartSpec::new(320, 200, "Population", Locale::new(Language::En))
    }

    #[test]
    fn renders_all_four_charts_without_fonts() {
        let summary = sample_summary(12);
        let entry = summary.slice_for("u004")[0];
        let backend = BasicCharts::new(None);
        let spec = spec();

        let charts = [
            backend.render_distribution(entry, &spec).unwrap(),
            backend.render_ranking(entry, &spec).unwrap(),
            backend.render_proportion(entry, &spec).unwrap(),
            backend.render_summary_table(entry, &spec).unwrap(),
        ];
        for chart in &charts {
            assert_eq!(chart.backend, BackendKind::Basic);
            assert_eq!((chart.width, chart.height), (320, 200));
            let decoded = image::load_from_memory(&chart.bytes).unwrap();
            assert_eq!(decoded.width(), 320);
        }
    }

    #[test]
    fn output_is_deterministic() {
        let summary = sample_summary(7);
        let entry = summary.slice_for("u002")[0];
        let backend = BasicCharts::new(None);
        let first = backend.render_distribution(entry, &spec()).unwrap();
        let second = backend.render_distribution(entry, &spec()).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn highlighted_unit_uses_highlight_color() {
        let summary = sample_summary(5);
        let entry = summary.slice_for("u004")[0];
        let spec = spec();
        let chart = BasicCharts::new(None).render_ranking(entry, &spec).unwrap();
        let image = image::load_from_memory(&chart.bytes).unwrap().to_rgba8();

        let [r, g, b] = spec.highlight;
        assert!(image.pixels().any(|pixel| pixel.0 == [r, g, b, 255]));
    }
}
