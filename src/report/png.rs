//! Raster rendition of a report page.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::template::{Frame, TemplateSpec, MARGIN_MM};
use super::{PageContent, PT_TO_MM};
use crate::config::LogoPosition;
use crate::raster::{blit, encode_png, fill_rect, stroke_rect, WHITE};
use crate::text::{Anchor, TextPainter, TextStyle, Weight};

const LOGO_WIDTH_MM: f64 = 40.0;

/// Page geometry at a fixed resolution.
struct Canvas {
    image: RgbaImage,
    dpi: u32,
}

impl Canvas {
    fn new(width_mm: f64, height_mm: f64, dpi: u32) -> Self {
        let px = |mm: f64| ((mm / 25.4 * f64::from(dpi)).round() as u32).max(1);
        Self {
            image: RgbaImage::from_pixel(
                px(width_mm),
                px(height_mm),
                Rgba([WHITE[0], WHITE[1], WHITE[2], 255]),
            ),
            dpi,
        }
    }

    fn px(&self, mm: f64) -> f32 {
        (mm / 25.4 * f64::from(self.dpi)) as f32
    }

    fn rect(&self, frame: Frame) -> (i64, i64, i64, i64) {
        (
            self.px(frame.x).round() as i64,
            self.px(frame.y).round() as i64,
            self.px(frame.width).round() as i64,
            self.px(frame.height).round() as i64,
        )
    }

    fn font_px(&self, points: u8) -> f32 {
        f32::from(points) / 72.0 * self.dpi as f32
    }

    fn text(&mut self, painter: &TextPainter, value: &str, x_mm: f64, y_mm: f64, style: TextStyle) {
        let (x, y) = (self.px(x_mm), self.px(y_mm));
        painter.draw(&mut self.image, value, x, y, style);
    }

    fn fill(&mut self, frame: Frame, color: [u8; 3]) {
        let (x, y, width, height) = self.rect(frame);
        fill_rect(&mut self.image, x, y, width, height, color);
    }

    /// Scales `source` to fit `frame`, keeping its aspect ratio, and centers it.
    fn place(&mut self, source: &RgbaImage, frame: Frame, anchor: Anchor) {
        let (x, y, width, height) = self.rect(frame);
        if width <= 0 || height <= 0 || source.width() == 0 || source.height() == 0 {
            return;
        }
        let scale = (width as f64 / f64::from(source.width()))
            .min(height as f64 / f64::from(source.height()));
        let target_width = ((f64::from(source.width()) * scale).round() as u32).max(1);
        let target_height = ((f64::from(source.height()) * scale).round() as u32).max(1);
        let scaled = if (target_width, target_height) == source.dimensions() {
            source.clone()
        } else {
            imageops::resize(source, target_width, target_height, FilterType::Triangle)
        };
        let left = match anchor {
            Anchor::Start => x,
            Anchor::Middle => x + (width - i64::from(target_width)) / 2,
            Anchor::End => x + width - i64::from(target_width),
        };
        let top = y + (height - i64::from(target_height)) / 2;
        blit(&mut self.image, &scaled, left, top);
    }
}

fn draw_header(
    canvas: &mut Canvas,
    content: &PageContent,
    template: &TemplateSpec,
    text: Option<&TextPainter>,
) {
    let palette = template.palette;
    let band = template.layout.header;
    if template.header_band {
        canvas.fill(band, palette.header);
    } else {
        canvas.fill(
            Frame::new(MARGIN_MM, band.height - 1.0, band.width - 2.0 * MARGIN_MM, 0.4),
            palette.rule,
        );
    }

    let mut text_x = MARGIN_MM;
    let mut text_width = band.width - 2.0 * MARGIN_MM;
    if let Some(logo) = &content.logo {
        let (x, anchor) = match content.logo_position {
            LogoPosition::Left => {
                text_x += LOGO_WIDTH_MM + 4.0;
                (MARGIN_MM, Anchor::Start)
            }
            LogoPosition::Right => (band.width - MARGIN_MM - LOGO_WIDTH_MM, Anchor::End),
        };
        text_width -= LOGO_WIDTH_MM + 4.0;
        canvas.place(logo, Frame::new(x, 4.0, LOGO_WIDTH_MM, band.height - 8.0), anchor);
    }

    let Some(text) = text else {
        return;
    };
    let title_height = f64::from(template.title_size) * PT_TO_MM * 1.4;
    let subtitle_height = f64::from(template.subtitle_size) * PT_TO_MM * 1.4;
    let top = (band.height - title_height - subtitle_height) / 2.0;
    let max_width = canvas.px(text_width);

    let size = canvas.font_px(template.title_size);
    let title = text.fit(&content.title, size, Weight::Bold, max_width);
    canvas.text(text, &title, text_x, top, TextStyle::new(size, palette.header_text).bold());

    let size = canvas.font_px(template.subtitle_size);
    let subtitle = text.fit(&content.subtitle, size, Weight::Regular, max_width);
    let subtitle_style = TextStyle::new(size, palette.header_text);
    canvas.text(text, &subtitle, text_x, top + title_height, subtitle_style);
}

fn draw_footer(
    canvas: &mut Canvas,
    content: &PageContent,
    template: &TemplateSpec,
    text: Option<&TextPainter>,
) {
    let palette = template.palette;
    let band = template.layout.footer;
    canvas.fill(band, palette.footer);

    let Some(text) = text else {
        return;
    };
    let size = canvas.font_px(template.small_size);
    let line = f64::from(template.small_size) * PT_TO_MM * 1.4;
    let top = band.y + (band.height - line) / 2.0;
    let footer = text.fit(&content.footer, size, Weight::Regular, canvas.px(band.width * 0.7));
    canvas.text(text, &footer, MARGIN_MM, top, TextStyle::new(size, palette.footer_text));
    canvas.text(
        text,
        &format!("{} 1", content.page_label),
        band.width - MARGIN_MM,
        top,
        TextStyle::new(size, palette.footer_text).anchored(Anchor::End),
    );
}

fn draw_indicator_table(
    canvas: &mut Canvas,
    content: &PageContent,
    template: &TemplateSpec,
    text: &TextPainter,
) {
    let frame = template.layout.indicators;
    let palette = template.palette;
    let size = canvas.font_px(template.small_size);
    let row_height = f64::from(template.small_size) * PT_TO_MM * 1.8;
    let weights = [3.0, 2.0, 2.0, 2.0];
    let total: f64 = weights.iter().sum();

    let rows = std::iter::once((&content.indicator_header, true))
        .chain(content.indicator_rows.iter().map(|row| (row, false)));
    let mut y = frame.y;
    for (cells, header) in rows {
        if y + row_height > frame.bottom() {
            break;
        }
        let mut x = frame.x;
        for (cell, weight) in cells.iter().zip(weights) {
            let width = frame.width * weight / total;
            let cell_frame = Frame::new(x, y, width, row_height);
            let (px, py, pw, ph) = canvas.rect(cell_frame);
            stroke_rect(&mut canvas.image, px, py, pw, ph, palette.rule);
            let style = if header {
                TextStyle::new(size, palette.ink).bold()
            } else {
                TextStyle::new(size, palette.ink)
            };
            let fitted = text.fit(cell, size, style.weight, canvas.px(width - 2.0));
            let text_top = y + (row_height - f64::from(template.small_size) * PT_TO_MM * 1.2) / 2.0;
            canvas.text(text, &fitted, x + 1.0, text_top, style);
            x += width;
        }
        y += row_height;
    }
}

/// Renders the page into PNG bytes at `dpi`.
pub(crate) fn render(
    content: &PageContent,
    template: &TemplateSpec,
    dpi: u32,
    text: Option<&TextPainter>,
) -> Result<Vec<u8>, image::ImageError> {
    let (width, height) = template.page_size_mm();
    let mut canvas = Canvas::new(width, height, dpi);

    draw_header(&mut canvas, content, template, text);

    let layout = &template.layout;
    if let Some(map) = &content.map {
        let caption_height = match text {
            Some(_) => f64::from(template.small_size) * PT_TO_MM * 1.6,
            None => 0.0,
        };
        let slot = layout.map;
        let map_frame = Frame::new(slot.x, slot.y, slot.width, slot.height - caption_height);
        canvas.place(map, map_frame, Anchor::Middle);
        if let Some(text) = text {
            let size = canvas.font_px(template.small_size);
            let max_width = canvas.px(slot.width);
            let caption = text.fit(&content.map_caption, size, Weight::Regular, max_width);
            canvas.text(
                text,
                &caption,
                slot.x + slot.width / 2.0,
                map_frame.bottom() + 0.3,
                TextStyle::new(size, template.palette.muted).anchored(Anchor::Middle),
            );
        }
    }
    for (frame, chart) in layout.charts.iter().zip(&content.charts) {
        if let Some(chart) = chart {
            canvas.place(chart, *frame, Anchor::Middle);
        }
    }
    if let Some(table) = &content.summary_table {
        canvas.place(table, layout.summary_table, Anchor::Middle);
    }
    if let Some(text) = text {
        if !content.indicator_rows.is_empty() {
            draw_indicator_table(&mut canvas, content, template, text);
        }
    }

    draw_footer(&mut canvas, content, template, text);
    encode_png(&canvas.image)
}
