//! Small raster helpers shared by charts, maps and PNG pages.

use image::{DynamicImage, ImageError, ImageOutputFormat, Rgba, RgbaImage};
use tiny_skia::{Color, IntSize, Pixmap};

pub const WHITE: [u8; 3] = [255, 255, 255];

/// Encodes `image` as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut bytes, ImageOutputFormat::Png)?;
    Ok(bytes)
}

/// Pixel size of `mm` millimetres at `dpi`.
pub fn mm_to_px(mm: f64, dpi: u32) -> u32 {
    (mm / 25.4 * f64::from(dpi)).round().max(1.0) as u32
}

/// Alpha-blends `color` over the pixel at `(x, y)`; out-of-bounds writes are ignored.
pub fn blend_pixel(image: &mut RgbaImage, x: i64, y: i64, color: [u8; 3], alpha: f32) {
    if x < 0 || y < 0 || x >= i64::from(image.width()) || y >= i64::from(image.height()) {
        return;
    }
    let pixel = image.get_pixel_mut(x as u32, y as u32);
    let alpha = alpha.clamp(0.0, 1.0);
    for channel in 0..3 {
        let base = f32::from(pixel.0[channel]);
        pixel.0[channel] = (base + (f32::from(color[channel]) - base) * alpha).round() as u8;
    }
    pixel.0[3] = pixel.0[3].max((alpha * 255.0).round() as u8);
}

/// Fills an axis-aligned rectangle, clipped to the image.
pub fn fill_rect(image: &mut RgbaImage, x: i64, y: i64, width: i64, height: i64, color: [u8; 3]) {
    fill_rect_alpha(image, x, y, width, height, color, 1.0);
}

pub fn fill_rect_alpha(
    image: &mut RgbaImage,
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    color: [u8; 3],
    alpha: f32,
) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + width).min(i64::from(image.width()));
    let y1 = (y + height).min(i64::from(image.height()));
    for py in y0..y1 {
        for px in x0..x1 {
            if alpha >= 1.0 {
                image.put_pixel(px as u32, py as u32, Rgba([color[0], color[1], color[2], 255]));
            } else {
                blend_pixel(image, px, py, color, alpha);
            }
        }
    }
}

/// Draws a one-pixel line between two points.
pub fn draw_line(image: &mut RgbaImage, from: (i64, i64), to: (i64, i64), color: [u8; 3]) {
    let (mut x, mut y) = from;
    let dx = (to.0 - from.0).abs();
    let dy = -(to.1 - from.1).abs();
    let step_x = if from.0 < to.0 { 1 } else { -1 };
    let step_y = if from.1 < to.1 { 1 } else { -1 };
    let mut error = dx + dy;

    loop {
        blend_pixel(image, x, y, color, 1.0);
        if x == to.0 && y == to.1 {
            break;
        }
        let doubled = 2 * error;
        if doubled >= dy {
            error += dy;
            x += step_x;
        }
        if doubled <= dx {
            error += dx;
            y += step_y;
        }
    }
}

/// Outlines a rectangle with one-pixel lines.
pub fn stroke_rect(image: &mut RgbaImage, x: i64, y: i64, width: i64, height: i64, color: [u8; 3]) {
    let right = x + width - 1;
    let bottom = y + height - 1;
    draw_line(image, (x, y), (right, y), color);
    draw_line(image, (x, bottom), (right, bottom), color);
    draw_line(image, (x, y), (x, bottom), color);
    draw_line(image, (right, y), (right, bottom), color);
}

/// Copies `source` onto `target` with its top-left corner at `(x, y)`, clipped.
pub fn blit(target: &mut RgbaImage, source: &RgbaImage, x: i64, y: i64) {
    for (sx, sy, pixel) in source.enumerate_pixels() {
        let tx = x + i64::from(sx);
        let ty = y + i64::from(sy);
        if tx < 0 || ty < 0 || tx >= i64::from(target.width()) || ty >= i64::from(target.height()) {
            continue;
        }
        let alpha = f32::from(pixel.0[3]) / 255.0;
        blend_pixel(target, tx, ty, [pixel.0[0], pixel.0[1], pixel.0[2]], alpha);
    }
}

/// Converts an RGB triple plus opacity into a `tiny-skia` color.
pub fn skia_color(color: [u8; 3], alpha: f32) -> Color {
    Color::from_rgba8(
        color[0],
        color[1],
        color[2],
        (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
    )
}

/// Copies a premultiplied pixmap into a straight-alpha image.
pub fn pixmap_to_image(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (target, source) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = source.demultiply();
        *target = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}

/// Copies a straight-alpha image into a premultiplied pixmap.
pub fn image_to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let mut data = Vec::with_capacity(image.as_raw().len());
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let premultiply = |channel: u8| ((u16::from(channel) * u16::from(a) + 127) / 255) as u8;
        data.extend_from_slice(&[premultiply(r), premultiply(g), premultiply(b), a]);
    }
    Pixmap::from_vec(data, size)
}
