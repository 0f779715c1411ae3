//! PDF rendition of a report page.

use std::rc::Rc;

use genpdf::elements::{FrameCellDecorator, Paragraph, TableLayout};
use genpdf::error::Error;
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::{Color, Style, StyledString};
use genpdf::{render, Alignment, Element, RenderResult, Size};
use image::DynamicImage;

use super::elements::{flatten, mm, ColorBand, FittedImage, FrameLayout};
use super::template::{Frame, TemplateSpec, MARGIN_MM};
use super::{PageContent, PT_TO_MM};
use crate::config::LogoPosition;
use crate::raster::WHITE;

const LOGO_WIDTH_MM: f64 = 40.0;

fn color(rgb: [u8; 3]) -> Color {
    Color::Rgb(rgb[0], rgb[1], rgb[2])
}

fn text_style(size: u8, rgb: [u8; 3]) -> Style {
    Style::new().with_font_size(size).with_color(color(rgb))
}

/// Page chrome shared by the header and footer bands of every page.
struct Chrome {
    template: TemplateSpec,
    title: String,
    subtitle: String,
    footer: String,
    page_label: String,
    logo: Option<DynamicImage>,
    logo_position: LogoPosition,
}

impl Chrome {
    fn header(&self) -> Result<FrameLayout, Error> {
        let template = &self.template;
        let palette = template.palette;
        let band = template.layout.header;
        let mut layout = FrameLayout::new();

        if template.header_band {
            let frame = Frame::new(0.0, 0.0, band.width, band.height);
            layout.push(frame, ColorBand::new(palette.header));
        } else {
            layout.push(
                Frame::new(MARGIN_MM, band.height - 1.0, band.width - 2.0 * MARGIN_MM, 0.4),
                ColorBand::new(palette.rule),
            );
        }

        let mut text_x = MARGIN_MM;
        let mut text_width = band.width - 2.0 * MARGIN_MM;
        if let Some(logo) = &self.logo {
            let (x, alignment) = match self.logo_position {
                LogoPosition::Left => {
                    text_x += LOGO_WIDTH_MM + 4.0;
                    (MARGIN_MM, Alignment::Left)
                }
                LogoPosition::Right => (band.width - MARGIN_MM - LOGO_WIDTH_MM, Alignment::Right),
            };
            text_width -= LOGO_WIDTH_MM + 4.0;
            let image = FittedImage::new(logo.clone())?.with_alignment(alignment);
            layout.push(Frame::new(x, 4.0, LOGO_WIDTH_MM, band.height - 8.0), image);
        }

        let title_height = f64::from(template.title_size) * PT_TO_MM * 1.4;
        let subtitle_height = f64::from(template.subtitle_size) * PT_TO_MM * 1.4;
        let top = (band.height - title_height - subtitle_height) / 2.0;
        layout.push_clipped(
            Frame::new(text_x, top, text_width, title_height),
            Paragraph::new(self.title.clone())
                .styled(text_style(template.title_size, palette.header_text).bold()),
        );
        layout.push_clipped(
            Frame::new(text_x, top + title_height, text_width, subtitle_height),
            Paragraph::new(self.subtitle.clone())
                .styled(text_style(template.subtitle_size, palette.header_text)),
        );
        Ok(layout)
    }

    fn footer(&self, page: usize) -> FrameLayout {
        let template = &self.template;
        let palette = template.palette;
        let band = template.layout.footer;
        let line = f64::from(template.small_size) * PT_TO_MM * 1.4;
        let top = (band.height - line) / 2.0;
        let mut layout = FrameLayout::new();

        layout.push(Frame::new(0.0, 0.0, band.width, band.height), ColorBand::new(palette.footer));
        layout.push_clipped(
            Frame::new(MARGIN_MM, top, band.width * 0.7, line),
            Paragraph::new(self.footer.clone())
                .styled(text_style(template.small_size, palette.footer_text)),
        );
        layout.push_clipped(
            Frame::new(band.width - MARGIN_MM - 40.0, top, 40.0, line),
            Paragraph::new(format!("{} {}", self.page_label, page))
                .aligned(Alignment::Right)
                .styled(text_style(template.small_size, palette.footer_text)),
        );
        layout
    }
}

enum BandKind {
    Header,
    Footer,
}

/// Header or footer band built when the page is decorated.
struct Band {
    chrome: Rc<Chrome>,
    kind: BandKind,
    page: usize,
}

impl Element for Band {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let mut layout = match self.kind {
            BandKind::Header => self.chrome.header()?,
            BandKind::Footer => self.chrome.footer(self.page),
        };
        layout.render(context, area, style)
    }
}

fn indicator_table(content: &PageContent, template: &TemplateSpec) -> Result<TableLayout, Error> {
    let palette = template.palette;
    let mut table = TableLayout::new(vec![3, 2, 2, 2]);
    table.set_cell_decorator(FrameCellDecorator::new(true, true, false));

    let mut row = table.row();
    for cell in &content.indicator_header {
        row = row.element(
            Paragraph::new(cell.clone())
                .styled(text_style(template.small_size, palette.ink).bold())
                .padded(1),
        );
    }
    row.push()?;

    for cells in &content.indicator_rows {
        let mut row = table.row();
        for cell in cells {
            row = row.element(
                Paragraph::new(cell.clone())
                    .styled(text_style(template.small_size, palette.ink))
                    .padded(1),
            );
        }
        row.push()?;
    }
    Ok(table)
}

/// Caption under the map, in the template's muted small type.
fn map_caption(text: &str, template: &TemplateSpec) -> Paragraph {
    let style = text_style(template.small_size, template.palette.muted);
    Paragraph::new(StyledString::new(text.to_owned(), style))
}

fn body(content: &PageContent, template: &TemplateSpec) -> Result<FrameLayout, Error> {
    let layout = &template.layout;
    let shift = |frame: Frame| frame.offset(0.0, -layout.header.height);
    let mut body = FrameLayout::new();

    if let Some(map) = &content.map {
        let caption = map_caption(&content.map_caption, template);
        let image = FittedImage::new(flatten(map, WHITE))?.with_caption(caption);
        body.push(shift(layout.map), image);
    }
    for (frame, chart) in layout.charts.iter().zip(&content.charts) {
        if let Some(chart) = chart {
            body.push(shift(*frame), FittedImage::new(flatten(chart, WHITE))?);
        }
    }
    if let Some(table) = &content.summary_table {
        body.push(shift(layout.summary_table), FittedImage::new(flatten(table, WHITE))?);
    }
    if !content.indicator_rows.is_empty() {
        body.push_clipped(shift(layout.indicators), indicator_table(content, template)?);
    }
    Ok(body)
}

/// Renders the page into PDF bytes.
pub(crate) fn render(
    content: &PageContent,
    template: &TemplateSpec,
    fonts: FontFamily<FontData>,
) -> Result<Vec<u8>, Error> {
    let (width, height) = template.page_size_mm();
    let layout = &template.layout;
    let logo_background = if template.header_band {
        template.palette.header
    } else {
        WHITE
    };
    let chrome = Rc::new(Chrome {
        template: template.clone(),
        title: content.title.clone(),
        subtitle: content.subtitle.clone(),
        footer: content.footer.clone(),
        page_label: content.page_label.clone(),
        logo: content.logo.as_ref().map(|logo| flatten(logo, logo_background)),
        logo_position: content.logo_position,
    });
    let header_chrome = Rc::clone(&chrome);
    let footer_chrome = chrome;

    let paper_size = Size::new(mm(width), mm(height));
    let mut document = super::document::DocumentBuilder::new(fonts, paper_size)
        .with_title(content.title.clone())
        .with_font_size(template.body_size)
        .with_header(mm(layout.header.height), move |page| Band {
            chrome: Rc::clone(&header_chrome),
            kind: BandKind::Header,
            page,
        })
        .with_footer(mm(layout.footer.height), move |page| Band {
            chrome: Rc::clone(&footer_chrome),
            kind: BandKind::Footer,
            page,
        })
        .build();
    document.push(body(content, template)?);

    let mut bytes = Vec::new();
    document.render(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateKind;
    use image::{Rgba, RgbaImage};

    fn content(map: Option<RgbaImage>) -> PageContent {
        PageContent {
            title: "Comuna 1".to_owned(),
            subtitle: "pop".to_owned(),
            footer: "AutoAtlas Pro".to_owned(),
            page_label: "Page".to_owned(),
            map,
            map_caption: "Source: OpenStreetMap".to_owned(),
            charts: [
                Some(RgbaImage::from_pixel(40, 30, Rgba([10, 20, 30, 255]))),
                None,
                None,
            ],
            summary_table: None,
            indicator_header: Default::default(),
            indicator_rows: Vec::new(),
            logo: None,
            logo_position: LogoPosition::Left,
        }
    }

    #[test]
    fn map_frame_carries_its_caption() {
        let template = TemplateSpec::for_kind(TemplateKind::Academic);
        let map = RgbaImage::from_pixel(60, 40, Rgba([200, 200, 200, 255]));

        let with_map = body(&content(Some(map)), &template).unwrap();
        assert_eq!(with_map.len(), 2);

        let without_map = body(&content(None), &template).unwrap();
        assert_eq!(without_map.len(), 1);
    }

    #[test]
    fn captions_accept_any_text() {
        let template = TemplateSpec::for_kind(TemplateKind::Minimal);
        let image = DynamicImage::ImageRgb8(image::RgbImage::new(8, 8));
        let fitted = FittedImage::new(image)
            .unwrap()
            .with_caption(map_caption("", &template));
        let mut layout = FrameLayout::new();
        layout.push(Frame::new(0.0, 0.0, 20.0, 20.0), fitted);
        assert!(!layout.is_empty());
    }
}
