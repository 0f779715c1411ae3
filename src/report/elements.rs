//! `genpdf` elements used by the PDF report pages.
//!
//! Report pages are laid out on fixed frames, so besides the fitted image this
//! module provides a [`FrameLayout`] that renders each child into its own
//! sub-area of the page, and a [`ColorBand`] for filled header and footer bands.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage, RgbaImage};

use genpdf::elements::{Image, Paragraph};
use genpdf::error::{Error, ErrorKind};
use genpdf::style::Style;
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

use super::template::Frame;

/// Resolution `genpdf` assumes for images without an explicit DPI.
const IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const CAPTION_SPACING_MM: f64 = 1.5;
/// Share of a frame an image may fill, leaving room for rounding in the layout engine.
const FIT_TOLERANCE: f64 = 0.995;

pub fn mm(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

pub fn mm_value(value: Mm) -> f64 {
    let mm: printpdf::Mm = value.into();
    mm.0
}

fn natural_size(image: &DynamicImage) -> (f64, f64) {
    let (width, height) = image.dimensions();
    (
        MM_PER_INCH * f64::from(width) / IMAGE_DPI,
        MM_PER_INCH * f64::from(height) / IMAGE_DPI,
    )
}

/// Flattens `image` onto `background`; PDF images cannot carry an alpha channel.
pub fn flatten(image: &RgbaImage, background: [u8; 3]) -> DynamicImage {
    let mut flat = RgbImage::new(image.width(), image.height());
    for (target, source) in flat.pixels_mut().zip(image.pixels()) {
        let alpha = u16::from(source.0[3]);
        let mix = |channel: usize| {
            let foreground = u16::from(source.0[channel]) * alpha;
            let behind = u16::from(background[channel]) * (255 - alpha);
            ((foreground + behind + 127) / 255) as u8
        };
        *target = Rgb([mix(0), mix(1), mix(2)]);
    }
    DynamicImage::ImageRgb8(flat)
}

/// An image scaled to fit a box, with an optional caption underneath.
pub struct FittedImage {
    image: Image,
    natural: (f64, f64),
    caption: Option<Paragraph>,
    alignment: Alignment,
}

impl FittedImage {
    pub fn new(image: DynamicImage) -> Result<Self, Error> {
        let natural = natural_size(&image);
        Ok(Self {
            image: Image::from_dynamic_image(image)?,
            natural,
            caption: None,
            alignment: Alignment::Center,
        })
    }

    pub fn with_caption(mut self, caption: Paragraph) -> Self {
        self.caption = Some(caption);
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    fn caption_height(&self, context: &genpdf::Context, style: Style) -> f64 {
        match &self.caption {
            Some(_) => mm_value(style.line_height(&context.font_cache)) + CAPTION_SPACING_MM,
            None => 0.0,
        }
    }
}

impl Element for FittedImage {
    fn render(
        &mut self,
        context: &genpdf::Context,
        mut area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let available = area.size();
        let caption_height = self.caption_height(context, style);
        let max_width = mm_value(available.width) * FIT_TOLERANCE;
        let max_height = (mm_value(available.height) - caption_height) * FIT_TOLERANCE;
        let (natural_width, natural_height) = self.natural;
        if natural_width <= f64::EPSILON || natural_height <= f64::EPSILON || max_height <= 0.0 {
            return Err(Error::new("image has no room in its frame", ErrorKind::PageSizeExceeded));
        }

        let scale = (max_width / natural_width).min(max_height / natural_height);
        self.image.set_scale(Scale::new(scale, scale));
        self.image.set_alignment(self.alignment);

        let mut result = RenderResult::default();
        let image_result = self.image.render(context, area.clone(), style)?;
        result.size = result.size.stack_vertical(image_result.size);
        result.has_more |= image_result.has_more;

        if let Some(caption) = &mut self.caption {
            area.add_offset(Position::new(0, image_result.size.height + mm(CAPTION_SPACING_MM)));
            caption.set_alignment(self.alignment);
            let caption_result = caption.render(context, area, style)?;
            result.size = result
                .size
                .stack_vertical(Size::new(0, mm(CAPTION_SPACING_MM)))
                .stack_vertical(caption_result.size);
            result.has_more |= caption_result.has_more;
        }

        Ok(result)
    }
}

/// A solid rectangle filling its whole area.
pub struct ColorBand {
    color: [u8; 3],
}

impl ColorBand {
    pub fn new(color: [u8; 3]) -> Self {
        Self { color }
    }
}

impl Element for ColorBand {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let size = area.size();
        let swatch = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(self.color)));
        let (natural_width, natural_height) = natural_size(&swatch);
        let mut image = Image::from_dynamic_image(swatch)?;
        image.set_scale(Scale::new(
            mm_value(size.width) / natural_width * FIT_TOLERANCE,
            mm_value(size.height) / natural_height * FIT_TOLERANCE,
        ));
        image.set_alignment(Alignment::Left);
        image.render(context, area, style)?;
        let mut result = RenderResult::default();
        result.size = size;
        Ok(result)
    }
}

/// Renders each child into a fixed frame relative to the area's origin.
///
/// Images must fit their frame; text pushed with [`FrameLayout::push_clipped`]
/// is cut at the frame's bottom edge instead.
#[derive(Default)]
pub struct FrameLayout {
    children: Vec<FrameChild>,
}

struct FrameChild {
    frame: Frame,
    element: Box<dyn Element>,
    clipped: bool,
}

impl FrameLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<E: Element + 'static>(&mut self, frame: Frame, element: E) {
        self.children.push(FrameChild {
            frame,
            element: Box::new(element),
            clipped: false,
        });
    }

    pub fn push_clipped<E: Element + 'static>(&mut self, frame: Frame, element: E) {
        self.children.push(FrameChild {
            frame,
            element: Box::new(element),
            clipped: true,
        });
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Element for FrameLayout {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        for child in &mut self.children {
            let frame = child.frame;
            let mut slot = area.clone();
            slot.add_offset(Position::new(mm(frame.x), mm(frame.y)));
            slot.set_width(mm(frame.width));
            slot.set_height(mm(frame.height));
            let result = child.element.render(context, slot, style)?;
            if result.has_more && !child.clipped {
                return Err(Error::new(
                    format!(
                        "content does not fit the {:.0}x{:.0} mm frame at ({:.0}, {:.0})",
                        frame.width, frame.height, frame.x, frame.y
                    ),
                    ErrorKind::PageSizeExceeded,
                ));
            }
        }
        let mut result = RenderResult::default();
        result.size = area.size();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn millimetres_round_trip() {
        assert!((mm_value(mm(12.5)) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn flatten_blends_onto_background() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([255, 0, 0, 0]));
        let flat = flatten(&image, [0, 0, 255]).to_rgb8();
        assert_eq!(flat.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(flat.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn natural_size_uses_image_dpi() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(300, 150));
        let (width, height) = natural_size(&image);
        assert!((width - 25.4).abs() < 1e-9);
        assert!((height - 12.7).abs() < 1e-9);
    }
}
