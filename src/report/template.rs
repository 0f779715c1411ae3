//! Named report templates: page format, palette, typography and slot layout.

use serde::Serialize;

use crate::config::TemplateKind;
use crate::raster::mm_to_px;

/// Page orientation of an A4 sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Content areas of a report page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Title,
    Logo,
    Map,
    Charts,
    SummaryTable,
    Footer,
}

/// Colors of one template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub header: [u8; 3],
    pub header_text: [u8; 3],
    pub ink: [u8; 3],
    pub muted: [u8; 3],
    pub accent: [u8; 3],
    pub highlight: [u8; 3],
    pub footer: [u8; 3],
    pub footer_text: [u8; 3],
    pub rule: [u8; 3],
}

/// Rectangle in millimetres, relative to the top-left corner of the page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pixel size of the frame at `dpi`.
    pub fn size_px(&self, dpi: u32) -> (u32, u32) {
        (mm_to_px(self.width, dpi), mm_to_px(self.height, dpi))
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// The same frame moved by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Slot positions of a template page.
#[derive(Clone, Debug, PartialEq)]
pub struct PageLayout {
    pub header: Frame,
    pub map: Frame,
    /// Distribution, ranking and proportion charts, in that order.
    pub charts: [Frame; 3],
    pub summary_table: Frame,
    /// Table of the remaining indicators.
    pub indicators: Frame,
    pub footer: Frame,
}

/// Fully resolved template.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateSpec {
    pub kind: TemplateKind,
    pub orientation: Orientation,
    pub palette: Palette,
    /// Whether the header is a filled color band.
    pub header_band: bool,
    /// Font sizes in points.
    pub title_size: u8,
    pub subtitle_size: u8,
    pub body_size: u8,
    pub small_size: u8,
    pub layout: PageLayout,
    mandatory: &'static [Slot],
}

const HEADER_HEIGHT_MM: f64 = 28.0;
const FOOTER_HEIGHT_MM: f64 = 12.0;
pub(crate) const MARGIN_MM: f64 = 12.0;
const GAP_MM: f64 = 4.0;

impl TemplateSpec {
    pub fn for_kind(kind: TemplateKind) -> Self {
        match kind {
            TemplateKind::Institutional => Self {
                kind,
                orientation: Orientation::Landscape,
                palette: Palette {
                    header: [0x1b, 0x28, 0x38],
                    header_text: [0xff, 0xff, 0xff],
                    ink: [0x1d, 0x26, 0x30],
                    muted: [0x5c, 0x67, 0x73],
                    accent: [0x2c, 0x5d, 0x8a],
                    highlight: [0xe6, 0x39, 0x46],
                    footer: [0x1b, 0x28, 0x38],
                    footer_text: [0xdd, 0xe3, 0xe9],
                    rule: [0xc9, 0xd1, 0xd9],
                },
                header_band: true,
                title_size: 20,
                subtitle_size: 12,
                body_size: 9,
                small_size: 7,
                layout: landscape_layout(),
                mandatory: &[Slot::Title, Slot::Map, Slot::SummaryTable],
            },
            TemplateKind::Academic => Self {
                kind,
                orientation: Orientation::Portrait,
                palette: Palette {
                    header: [0xf4, 0xf1, 0xea],
                    header_text: [0x2b, 0x2a, 0x4c],
                    ink: [0x2b, 0x2a, 0x33],
                    muted: [0x6e, 0x6a, 0x75],
                    accent: [0x5b, 0x5f, 0x97],
                    highlight: [0xb3, 0x3f, 0x40],
                    footer: [0xff, 0xff, 0xff],
                    footer_text: [0x6e, 0x6a, 0x75],
                    rule: [0xb8, 0xb2, 0xa7],
                },
                header_band: true,
                title_size: 18,
                subtitle_size: 11,
                body_size: 9,
                small_size: 7,
                layout: portrait_layout(),
                mandatory: &[Slot::Title, Slot::Map],
            },
            TemplateKind::Minimal => Self {
                kind,
                orientation: Orientation::Portrait,
                palette: Palette {
                    header: [0xff, 0xff, 0xff],
                    header_text: [0x11, 0x11, 0x11],
                    ink: [0x11, 0x11, 0x11],
                    muted: [0x77, 0x77, 0x77],
                    accent: [0x44, 0x44, 0x44],
                    highlight: [0xe6, 0x39, 0x46],
                    footer: [0xff, 0xff, 0xff],
                    footer_text: [0x77, 0x77, 0x77],
                    rule: [0xdd, 0xdd, 0xdd],
                },
                header_band: false,
                title_size: 18,
                subtitle_size: 11,
                body_size: 9,
                small_size: 7,
                layout: portrait_layout(),
                mandatory: &[Slot::Title, Slot::Map],
            },
        }
    }

    /// Page width and height in millimetres.
    pub fn page_size_mm(&self) -> (f64, f64) {
        match self.orientation {
            Orientation::Portrait => (210.0, 297.0),
            Orientation::Landscape => (297.0, 210.0),
        }
    }

    pub fn is_mandatory(&self, slot: Slot) -> bool {
        self.mandatory.contains(&slot)
    }

    pub fn mandatory_slots(&self) -> &'static [Slot] {
        self.mandatory
    }

    /// Overrides the header and footer band colors.
    pub fn with_band_colors(mut self, header: Option<[u8; 3]>, footer: Option<[u8; 3]>) -> Self {
        if let Some(header) = header {
            self.palette.header = header;
        }
        if let Some(footer) = footer {
            self.palette.footer = footer;
        }
        self
    }
}

fn landscape_layout() -> PageLayout {
    let (width, height) = (297.0, 210.0);
    let top = HEADER_HEIGHT_MM + GAP_MM * 1.5;
    let content = width - 2.0 * MARGIN_MM;
    let map = Frame::new(MARGIN_MM, top, 150.0, 112.5);
    let side_x = map.x + map.width + GAP_MM * 1.5;
    let side_width = width - MARGIN_MM - side_x;
    let chart_top = map.bottom() + GAP_MM;
    let chart_height = height - FOOTER_HEIGHT_MM - GAP_MM - chart_top;
    let chart_width = (content - 2.0 * GAP_MM) / 3.0;

    PageLayout {
        header: Frame::new(0.0, 0.0, width, HEADER_HEIGHT_MM),
        map,
        charts: chart_row(chart_top, chart_width, chart_height),
        summary_table: Frame::new(side_x, top, side_width, 70.0),
        indicators: Frame::new(
            side_x,
            top + 70.0 + GAP_MM,
            side_width,
            map.bottom() - top - 70.0 - GAP_MM,
        ),
        footer: Frame::new(0.0, height - FOOTER_HEIGHT_MM, width, FOOTER_HEIGHT_MM),
    }
}

fn portrait_layout() -> PageLayout {
    let (width, height) = (210.0, 297.0);
    let top = HEADER_HEIGHT_MM + GAP_MM * 1.5;
    let content = width - 2.0 * MARGIN_MM;
    let map = Frame::new(MARGIN_MM, top, content, 124.0);
    let chart_width = (content - 2.0 * GAP_MM) / 3.0;
    let charts = chart_row(map.bottom() + GAP_MM, chart_width, 58.0);
    let table_top = charts[0].bottom() + GAP_MM;
    let table_height = height - FOOTER_HEIGHT_MM - GAP_MM - table_top;
    let half = (content - GAP_MM) / 2.0;

    PageLayout {
        header: Frame::new(0.0, 0.0, width, HEADER_HEIGHT_MM),
        map,
        charts,
        summary_table: Frame::new(MARGIN_MM, table_top, half, table_height),
        indicators: Frame::new(MARGIN_MM + half + GAP_MM, table_top, half, table_height),
        footer: Frame::new(0.0, height - FOOTER_HEIGHT_MM, width, FOOTER_HEIGHT_MM),
    }
}

fn chart_row(top: f64, width: f64, height: f64) -> [Frame; 3] {
    let step = width + GAP_MM;
    [
        Frame::new(MARGIN_MM, top, width, height),
        Frame::new(MARGIN_MM + step, top, width, height),
        Frame::new(MARGIN_MM + 2.0 * step, top, width, height),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(layout: &PageLayout) -> Vec<Frame> {
        let mut frames = vec![
            layout.header,
            layout.map,
            layout.summary_table,
            layout.indicators,
            layout.footer,
        ];
        frames.extend_from_slice(&layout.charts);
        frames
    }

    #[test]
    fn every_slot_fits_on_the_page() {
        for kind in [TemplateKind::Institutional, TemplateKind::Academic, TemplateKind::Minimal] {
            let template = TemplateSpec::for_kind(kind);
            let (width, height) = template.page_size_mm();
            for frame in frames(&template.layout) {
                assert!(frame.width > 0.0 && frame.height > 0.0, "{:?}: {:?}", kind, frame);
                let inside_x = frame.x >= 0.0 && frame.x + frame.width <= width + 1e-9;
                let inside_y = frame.y >= 0.0 && frame.bottom() <= height + 1e-9;
                assert!(inside_x && inside_y, "{:?}: {:?}", kind, frame);
            }
        }
    }

    #[test]
    fn body_slots_do_not_overlap_header_or_footer() {
        for kind in [TemplateKind::Institutional, TemplateKind::Academic, TemplateKind::Minimal] {
            let layout = TemplateSpec::for_kind(kind).layout;
            for frame in [layout.map, layout.summary_table, layout.indicators]
                .iter()
                .chain(layout.charts.iter())
            {
                assert!(frame.y >= layout.header.bottom());
                assert!(frame.bottom() <= layout.footer.y);
            }
        }
    }

    #[test]
    fn institutional_requires_summary_table() {
        let institutional = TemplateSpec::for_kind(TemplateKind::Institutional);
        assert_eq!(institutional.orientation, Orientation::Landscape);
        assert!(institutional.is_mandatory(Slot::SummaryTable));
        assert!(institutional.is_mandatory(Slot::Map));

        let minimal = TemplateSpec::for_kind(TemplateKind::Minimal);
        assert!(!minimal.header_band);
        assert!(!minimal.is_mandatory(Slot::SummaryTable));
        assert!(!minimal.is_mandatory(Slot::Logo));
    }

    #[test]
    fn band_colors_can_be_overridden() {
        let template = TemplateSpec::for_kind(TemplateKind::Academic)
            .with_band_colors(Some([1, 2, 3]), None);
        assert_eq!(template.palette.header, [1, 2, 3]);
        assert_eq!(template.palette.footer, [0xff, 0xff, 0xff]);
    }
}
