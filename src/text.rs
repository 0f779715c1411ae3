//! Text rasterization onto RGBA canvases.

use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use crate::error::SetupError;
use crate::fonts::FontSet;

/// Font weight used by [`TextPainter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

/// Horizontal anchor of a text run relative to its x coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

/// Size, weight, anchor and color of a text run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub size_px: f32,
    pub weight: Weight,
    pub anchor: Anchor,
    pub color: [u8; 3],
}

impl TextStyle {
    pub fn new(size_px: f32, color: [u8; 3]) -> Self {
        Self {
            size_px,
            weight: Weight::Regular,
            anchor: Anchor::Start,
            color,
        }
    }

    pub fn bold(mut self) -> Self {
        self.weight = Weight::Bold;
        self
    }

    pub fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }
}

/// Draws antialiased text with the regular and bold faces of a [`FontSet`].
pub struct TextPainter {
    regular: Font<'static>,
    bold: Font<'static>,
}

impl std::fmt::Debug for TextPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextPainter").finish_non_exhaustive()
    }
}

impl TextPainter {
    pub fn new(fonts: &FontSet) -> Result<Self, SetupError> {
        let parse = |bytes: &[u8], style: &str| {
            Font::try_from_vec(bytes.to_vec()).ok_or_else(|| {
                SetupError::Fonts(format!(
                    "{} {} font is not a valid TrueType file",
                    fonts.name(),
                    style
                ))
            })
        };
        Ok(Self {
            regular: parse(fonts.regular(), "regular")?,
            bold: parse(fonts.bold(), "bold")?,
        })
    }

    fn font(&self, weight: Weight) -> &Font<'static> {
        match weight {
            Weight::Regular => &self.regular,
            Weight::Bold => &self.bold,
        }
    }

    /// Width and line height of `text` at `size_px`.
    pub fn measure(&self, text: &str, size_px: f32, weight: Weight) -> (f32, f32) {
        let font = self.font(weight);
        let scale = Scale::uniform(size_px);
        let metrics = font.v_metrics(scale);
        let width = font
            .layout(text, scale, point(0.0, metrics.ascent))
            .last()
            .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0);
        (width, metrics.ascent - metrics.descent)
    }

    /// Draws `text` with its top edge at `y`.
    pub fn draw(&self, canvas: &mut RgbaImage, text: &str, x: f32, y: f32, style: TextStyle) {
        let TextStyle {
            size_px,
            weight,
            anchor,
            color,
        } = style;
        let (width, _) = self.measure(text, size_px, weight);
        let start = match anchor {
            Anchor::Start => x,
            Anchor::Middle => x - width / 2.0,
            Anchor::End => x - width,
        };

        let font = self.font(weight);
        let scale = Scale::uniform(size_px);
        let ascent = font.v_metrics(scale).ascent;
        let (canvas_width, canvas_height) = canvas.dimensions();

        for glyph in font.layout(text, scale, point(start, y + ascent)) {
            let Some(bounds) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = bounds.min.x + gx as i32;
                let py = bounds.min.y + gy as i32;
                if px < 0 || py < 0 || px as u32 >= canvas_width || py as u32 >= canvas_height {
                    return;
                }
                blend(canvas.get_pixel_mut(px as u32, py as u32), color, coverage);
            });
        }
    }

    /// Shortens `text` with an ellipsis until it fits `max_width`.
    pub fn fit(&self, text: &str, size_px: f32, weight: Weight, max_width: f32) -> String {
        if self.measure(text, size_px, weight).0 <= max_width {
            return text.to_owned();
        }
        let mut chars: Vec<char> = text.chars().collect();
        while !chars.is_empty() {
            chars.pop();
            let candidate: String = chars.iter().collect::<String>() + "…";
            if self.measure(&candidate, size_px, weight).0 <= max_width {
                return candidate;
            }
        }
        String::new()
    }
}

fn blend(pixel: &mut Rgba<u8>, color: [u8; 3], coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0);
    for channel in 0..3 {
        let base = f32::from(pixel.0[channel]);
        pixel.0[channel] = (base + (f32::from(color[channel]) - base) * alpha).round() as u8;
    }
    let base_alpha = f32::from(pixel.0[3]);
    pixel.0[3] = (base_alpha + (255.0 - base_alpha) * alpha).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painter() -> Option<TextPainter> {
        let fonts = FontSet::load().ok()?;
        TextPainter::new(&fonts).ok()
    }

    #[test]
    fn blend_interpolates_towards_color() {
        let mut pixel = Rgba([255, 255, 255, 255]);
        blend(&mut pixel, [0, 0, 0], 0.5);
        assert_eq!(pixel, Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn draws_visible_pixels() {
        let Some(painter) = painter() else {
            eprintln!("Skipping draws_visible_pixels: no fonts found");
            return;
        };
        let mut canvas = RgbaImage::from_pixel(120, 40, Rgba([255, 255, 255, 255]));
        painter.draw(
            &mut canvas,
            "Atlas",
            4.0,
            4.0,
            TextStyle::new(20.0, [0, 0, 0]).bold(),
        );
        assert!(canvas.pixels().any(|pixel| pixel.0[0] < 128));

        let (wide, _) = painter.measure("Atlas Atlas", 20.0, Weight::Regular);
        let (narrow, _) = painter.measure("Atlas", 20.0, Weight::Regular);
        assert!(wide > narrow);
    }

    #[test]
    fn fit_truncates_long_text() {
        let Some(painter) = painter() else {
            eprintln!("Skipping fit_truncates_long_text: no fonts found");
            return;
        };
        let fitted = painter.fit("A very long territorial unit name", 14.0, Weight::Regular, 60.0);
        assert!(fitted.ends_with('…'));
        assert!(painter.measure(&fitted, 14.0, Weight::Regular).0 <= 60.0);
    }
}
