//! Assembly of one unit's map, charts and statistics into a report page.
//!
//! [`ReportComposer::compose`] is a pure function of its inputs: it checks the
//! template's mandatory slots, decodes the artifacts and renders either a PDF
//! (through `genpdf`) or a PNG page.  PNG pages are byte-identical across runs.
//! PDF pages carry the same objects on every run, but differ in the embedded
//! creation dates, the document ids and the order in which the page's images
//! are written: `printpdf` keeps them in a hash map, so their object numbers
//! and the entries of the page's `/XObject` dictionary are permuted.

mod document;
mod elements;
mod pdf;
mod png;
mod template;

use std::sync::Arc;

use genpdf::fonts::{FontData, FontFamily};
use image::RgbaImage;
use log::debug;

pub use document::{BandSpec, DocumentBuilder};
pub use elements::{mm, mm_value, ColorBand, FittedImage, FrameLayout};
pub use template::{Frame, Orientation, PageLayout, Palette, Slot, TemplateSpec};

use crate::charts::{ChartArtifact, ChartKind};
use crate::config::{LogoPosition, OutputFormat, ReportConfig};
use crate::error::{CompositionError, SetupError, Stage};
use crate::fonts::FontSet;
use crate::locale::{Label, Locale};
use crate::map::MapArtifact;
use crate::model::TerritorialUnit;
use crate::stats::SliceEntry;
use crate::text::TextPainter;

/// Millimetres per typographic point.
pub(crate) const PT_TO_MM: f64 = 25.4 / 72.0;

/// Product name used in the default footer.
pub const PRODUCT_NAME: &str = "AutoAtlas Pro";

/// Placeholder replaced by the unit's display name in a custom title.
pub const UNIT_PLACEHOLDER: &str = "{unit}";

/// Decoded content of one report page.
pub(crate) struct PageContent {
    pub title: String,
    pub subtitle: String,
    pub footer: String,
    pub page_label: String,
    pub map: Option<RgbaImage>,
    pub map_caption: String,
    /// Distribution, ranking and proportion charts.
    pub charts: [Option<RgbaImage>; 3],
    pub summary_table: Option<RgbaImage>,
    pub indicator_header: [String; 4],
    pub indicator_rows: Vec<[String; 4]>,
    pub logo: Option<Arc<RgbaImage>>,
    pub logo_position: LogoPosition,
}

/// Branding with defaults applied.
#[derive(Clone, Debug)]
struct ResolvedBranding {
    title: Option<String>,
    subtitle: String,
    footer: String,
    logo: Option<Arc<RgbaImage>>,
    logo_position: LogoPosition,
}

/// Renders report pages in the configured format.
pub struct ReportComposer {
    format: OutputFormat,
    dpi: u32,
    locale: Locale,
    branding: ResolvedBranding,
    fonts: Option<FontFamily<FontData>>,
    text: Option<Arc<TextPainter>>,
}

impl std::fmt::Debug for ReportComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportComposer")
            .field("format", &self.format)
            .field("dpi", &self.dpi)
            .field("branding", &self.branding)
            .field("fonts", &self.fonts.is_some())
            .field("text", &self.text.is_some())
            .finish()
    }
}

impl ReportComposer {
    /// Prepares the composer for a run, loading the logo once.
    ///
    /// PDF output needs fonts; PNG pages are rendered without text when none
    /// are available.
    pub fn new(
        config: &ReportConfig,
        fonts: Option<&FontSet>,
        text: Option<Arc<TextPainter>>,
    ) -> Result<Self, SetupError> {
        let pdf_fonts = match (config.output_format, fonts) {
            (OutputFormat::Pdf, Some(fonts)) => Some(fonts.pdf_family()?),
            (OutputFormat::Pdf, None) => {
                return Err(SetupError::Fonts(
                    "PDF output needs a font family; set AUTOATLAS_FONTS_DIR".to_owned(),
                ))
            }
            (OutputFormat::Png, _) => None,
        };

        let logo = match &config.branding.logo_path {
            Some(path) => {
                let image = image::open(path).map_err(|err| SetupError::ImageResource {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?;
                Some(Arc::new(image.to_rgba8()))
            }
            None => None,
        };

        let branding = &config.branding;
        let subtitle = non_blank(branding.subtitle.as_deref())
            .unwrap_or_else(|| config.indicator_label().to_owned());
        let footer = non_blank(branding.footer.as_deref())
            .unwrap_or_else(|| format!("{} • {}", PRODUCT_NAME, subtitle));

        Ok(Self {
            format: config.output_format,
            dpi: config.dpi,
            locale: Locale::new(config.language),
            branding: ResolvedBranding {
                title: non_blank(branding.title.as_deref()),
                subtitle,
                footer,
                logo,
                logo_position: branding.logo_position,
            },
            fonts: pdf_fonts,
            text,
        })
    }

    /// Returns a composer that writes PNG pages at `dpi`, sharing everything else.
    pub fn png_preview(&self, dpi: u32) -> Self {
        Self {
            format: OutputFormat::Png,
            dpi,
            locale: self.locale,
            branding: self.branding.clone(),
            fonts: None,
            text: self.text.clone(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Title printed for `unit`.
    pub fn title_for(&self, unit: &TerritorialUnit) -> String {
        match &self.branding.title {
            Some(title) => title.replace(UNIT_PLACEHOLDER, unit.display_name()),
            None => unit.display_name().to_owned(),
        }
    }

    /// Assembles the report of `unit`.
    ///
    /// `stats` lists the unit's entry for every indicator, primary first.
    pub fn compose(
        &self,
        unit: &TerritorialUnit,
        stats: &[SliceEntry<'_>],
        charts: &[ChartArtifact],
        map: Option<&MapArtifact>,
        template: &TemplateSpec,
    ) -> Result<Vec<u8>, CompositionError> {
        let fail = |message: String| CompositionError::new(unit.id(), Stage::Compose, message);
        let title = self.title_for(unit);
        let find = |kind: ChartKind| charts.iter().find(|chart| chart.kind == kind);

        for &slot in template.mandatory_slots() {
            let filled = match slot {
                Slot::Title => !title.trim().is_empty(),
                Slot::Logo => self.branding.logo.is_some(),
                Slot::Map => map.map_or(false, |map| !map.bytes.is_empty()),
                Slot::Charts => [ChartKind::Distribution, ChartKind::Ranking, ChartKind::Proportion]
                    .into_iter()
                    .any(|kind| find(kind).is_some()),
                Slot::SummaryTable => find(ChartKind::SummaryTable).is_some(),
                Slot::Footer => !self.branding.footer.trim().is_empty(),
            };
            if !filled {
                return Err(fail(format!(
                    "the {:?} template requires content for the {:?} slot",
                    template.kind, slot
                )));
            }
        }

        let decode = |bytes: &[u8], what: &str| {
            image::load_from_memory(bytes)
                .map(|image| image.to_rgba8())
                .map_err(|err| fail(format!("failed to decode {}: {}", what, err)))
        };
        let decode_chart = |kind: ChartKind| -> Result<Option<RgbaImage>, CompositionError> {
            find(kind)
                .map(|chart| decode(&chart.bytes, &format!("{:?} chart", kind)))
                .transpose()
        };

        let locale = &self.locale;
        let content = PageContent {
            map_caption: format!("{} · {}", unit.display_name(), self.branding.subtitle),
            title,
            subtitle: self.branding.subtitle.clone(),
            footer: self.branding.footer.clone(),
            page_label: locale.label(Label::Page).to_owned(),
            map: map.map(|map| decode(&map.bytes, "map")).transpose()?,
            charts: [
                decode_chart(ChartKind::Distribution)?,
                decode_chart(ChartKind::Ranking)?,
                decode_chart(ChartKind::Proportion)?,
            ],
            summary_table: decode_chart(ChartKind::SummaryTable)?,
            indicator_header: [
                locale.label(Label::Indicator).to_owned(),
                locale.label(Label::Value).to_owned(),
                locale.label(Label::Rank).to_owned(),
                locale.label(Label::Percentile).to_owned(),
            ],
            indicator_rows: stats
                .iter()
                .map(|entry| {
                    [
                        entry.summary.stats.indicator.clone(),
                        locale.format_number(entry.unit.value),
                        locale.format_rank(entry.unit.rank, entry.summary.total_units()),
                        locale.format_percent(entry.unit.percentile),
                    ]
                })
                .collect(),
            logo: self.branding.logo.clone(),
            logo_position: self.branding.logo_position,
        };

        let bytes = match self.format {
            OutputFormat::Pdf => {
                let fonts = self
                    .fonts
                    .clone()
                    .ok_or_else(|| fail("no font family loaded for PDF output".to_owned()))?;
                pdf::render(&content, template, fonts)
                    .map_err(|err| fail(format!("PDF rendering failed: {}", err)))?
            }
            OutputFormat::Png => png::render(&content, template, self.dpi, self.text.as_deref())
                .map_err(|err| fail(format!("PNG encoding failed: {}", err)))?,
        };
        debug!("Composed report for '{}' ({} bytes)", unit.id(), bytes.len());
        Ok(bytes)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
