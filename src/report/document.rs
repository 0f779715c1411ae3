//! Document construction with fixed-height header and footer bands.

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style;
use genpdf::{Element, Mm, PageDecorator, Position, Size};

type BandFactory = dyn Fn(usize) -> Box<dyn Element>;

/// Builder for report documents sharing one font family.
pub struct DocumentBuilder {
    fonts: FontFamily<FontData>,
    paper_size: Size,
    title: Option<String>,
    font_size: Option<u8>,
    header: Option<BandSpec>,
    footer: Option<BandSpec>,
}

impl DocumentBuilder {
    pub fn new(fonts: FontFamily<FontData>, paper_size: impl Into<Size>) -> Self {
        Self {
            fonts,
            paper_size: paper_size.into(),
            title: None,
            font_size: None,
            header: None,
            footer: None,
        }
    }

    /// Sets the document title stored in the PDF metadata.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_font_size(mut self, size: u8) -> Self {
        self.font_size = Some(size);
        self
    }

    /// Reserves `height` at the top of every page for the element built by `header`.
    pub fn with_header<F, E>(mut self, height: impl Into<Mm>, header: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        self.header = Some(BandSpec::new(height, header));
        self
    }

    /// Reserves `height` at the bottom of every page for the element built by `footer`.
    pub fn with_footer<F, E>(mut self, height: impl Into<Mm>, footer: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        self.footer = Some(BandSpec::new(height, footer));
        self
    }

    pub fn build(self) -> genpdf::Document {
        let mut document = genpdf::Document::new(self.fonts);
        document.set_paper_size(self.paper_size);
        if let Some(title) = self.title {
            document.set_title(title);
        }
        if let Some(size) = self.font_size {
            document.set_font_size(size);
        }
        document.set_page_decorator(BandPageDecorator {
            page: 0,
            header: self.header,
            footer: self.footer,
        });
        document
    }
}

/// A band of fixed height rendered on every page.
pub struct BandSpec {
    height: Mm,
    factory: Box<BandFactory>,
}

impl BandSpec {
    pub fn new<F, E>(height: impl Into<Mm>, factory: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        Self {
            height: height.into(),
            factory: Box::new(move |page| Box::new(factory(page)) as Box<dyn Element>),
        }
    }
}

struct BandPageDecorator {
    page: usize,
    header: Option<BandSpec>,
    footer: Option<BandSpec>,
}

impl BandPageDecorator {
    fn render_band<'a>(
        band: &BandSpec,
        page: usize,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: style::Style,
    ) -> Result<(), Error> {
        area.set_height(band.height);
        let mut element = (band.factory)(page);
        let result = element.render(context, area, style)?;
        if result.has_more {
            return Err(Error::new(
                "Band element does not fit into the reserved space",
                ErrorKind::PageSizeExceeded,
            ));
        }
        Ok(())
    }
}

impl PageDecorator for BandPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: style::Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        self.page += 1;

        let reserved = self.header.as_ref().map(|band| band.height).unwrap_or_default()
            + self.footer.as_ref().map(|band| band.height).unwrap_or_default();
        let available = area.size().height;
        if reserved > available {
            return Err(Error::new(
                "Header and footer exceed the page height",
                ErrorKind::InvalidData,
            ));
        }

        if let Some(footer) = &self.footer {
            let mut footer_area = area.clone();
            footer_area.add_offset(Position::new(0, available - footer.height));
            Self::render_band(footer, self.page, context, footer_area, style)?;
            area.set_height(available - footer.height);
        }

        if let Some(header) = &self.header {
            Self::render_band(header, self.page, context, area.clone(), style)?;
            area.add_offset(Position::new(0, header.height));
        }

        Ok(area)
    }
}
