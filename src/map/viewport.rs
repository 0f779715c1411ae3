//! Web Mercator viewport fitting, tile coverage and scale bar sizing.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Earth circumference at the equator in meters.
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;
/// Latitude limit of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_78;
/// Edge length of a standard XYZ tile in pixels.
pub const TILE_SIZE_PX: f64 = 256.0;

/// Projects longitude/latitude in degrees to world coordinates in `[0, 1]`.
///
/// `y` grows southwards, like tile rows.
pub fn project(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lon + 180.0) / 360.0;
    let y = (1.0 - lat.tan().asinh() / PI) / 2.0;
    (x, y)
}

/// Latitude in degrees of world coordinate `y`.
pub fn unproject_lat(y: f64) -> f64 {
    (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees()
}

/// Geographic bounding box in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            min_lon: lon,
            min_lat: lat,
            max_lon: lon,
            max_lat: lat,
        }
    }

    pub fn include(&mut self, lon: f64, lat: f64) {
        self.min_lon = self.min_lon.min(lon);
        self.min_lat = self.min_lat.min(lat);
        self.max_lon = self.max_lon.max(lon);
        self.max_lat = self.max_lat.max(lat);
    }
}

/// One XYZ tile placed on the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TilePlacement {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    /// Canvas position of the tile's top-left corner.
    pub left: f64,
    pub top: f64,
    /// Rendered edge length in pixels.
    pub size: f64,
}

/// Window onto the world, with the same scale on both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    min_x: f64,
    min_y: f64,
    span: f64,
    width_px: u32,
    height_px: u32,
}

impl Viewport {
    /// Fits `bounds` into a `width_px` x `height_px` canvas with `padding`
    /// (a fraction of the extent) on every side.
    pub fn fit(bounds: &Bounds, width_px: u32, height_px: u32, padding: f64) -> Self {
        let (x0, y1) = project(bounds.min_lon, bounds.min_lat);
        let (x1, y0) = project(bounds.max_lon, bounds.max_lat);
        let aspect = f64::from(width_px.max(1)) / f64::from(height_px.max(1));

        let mut dx = (x1 - x0).max(1e-7) * (1.0 + 2.0 * padding);
        let mut dy = (y1 - y0).max(1e-7) * (1.0 + 2.0 * padding);
        if dx / dy > aspect {
            dy = dx / aspect;
        } else {
            dx = dy * aspect;
        }

        let center_x = (x0 + x1) / 2.0;
        let center_y = (y0 + y1) / 2.0;
        Self {
            min_x: center_x - dx / 2.0,
            min_y: center_y - dy / 2.0,
            span: dx,
            width_px: width_px.max(1),
            height_px: height_px.max(1),
        }
    }

    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    pub fn height_px(&self) -> u32 {
        self.height_px
    }

    fn scale(&self) -> f64 {
        f64::from(self.width_px) / self.span
    }

    /// Canvas position of a longitude/latitude pair.
    pub fn to_pixel(&self, lon: f64, lat: f64) -> (f32, f32) {
        let (x, y) = project(lon, lat);
        (
            ((x - self.min_x) * self.scale()) as f32,
            ((y - self.min_y) * self.scale()) as f32,
        )
    }

    /// Ground resolution at the viewport center.
    pub fn meters_per_pixel(&self) -> f64 {
        let center_y = self.min_y + f64::from(self.height_px) / self.scale() / 2.0;
        let latitude = unproject_lat(center_y).to_radians();
        EARTH_CIRCUMFERENCE_M * latitude.cos() / self.scale()
    }

    /// Zoom level whose tiles render closest to their native size, within `[min, max]`.
    pub fn zoom(&self, min: u8, max: u8) -> u8 {
        let ideal = (self.scale() / TILE_SIZE_PX).log2().round();
        ideal.clamp(f64::from(min), f64::from(max.max(min))) as u8
    }

    /// Tiles covering the viewport at `zoom`.
    pub fn tiles(&self, zoom: u8) -> Vec<TilePlacement> {
        let count = 2f64.powi(i32::from(zoom));
        let max_index = count as i64 - 1;
        let max_x = self.min_x + self.span;
        let max_y = self.min_y + f64::from(self.height_px) / self.scale();
        let range = |low: f64, high: f64| {
            let first = ((low * count).floor() as i64).clamp(0, max_index);
            let last = ((high * count).floor() as i64).clamp(0, max_index);
            first..=last
        };
        let size = self.scale() / count;

        let mut placements = Vec::new();
        for y in range(self.min_y, max_y) {
            for x in range(self.min_x, max_x) {
                placements.push(TilePlacement {
                    zoom,
                    x: x as u32,
                    y: y as u32,
                    left: (x as f64 / count - self.min_x) * self.scale(),
                    top: (y as f64 / count - self.min_y) * self.scale(),
                    size,
                });
            }
        }
        placements
    }
}

/// Scale indicator sized to a round ground distance.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleBar {
    pub meters: f64,
    pub length_px: f32,
    pub segments: u32,
    pub label: String,
}

/// Picks the largest 1-2-5 distance whose bar fits within `max_px`.
pub fn scale_bar(meters_per_px: f64, max_px: f32) -> Option<ScaleBar> {
    if !(meters_per_px.is_finite() && meters_per_px > 0.0 && max_px > 0.0) {
        return None;
    }
    let budget = meters_per_px * f64::from(max_px);
    let magnitude = 10f64.powi(budget.log10().floor() as i32);
    let (leading, segments) = [(5.0, 1), (2.0, 4), (1.0, 2)]
        .into_iter()
        .find(|(leading, _)| leading * magnitude <= budget)
        .unwrap_or((1.0, 2));
    let meters = leading * magnitude;

    let label = if meters >= 1000.0 {
        format!("{} km", trim_float(meters / 1000.0))
    } else {
        format!("{} m", trim_float(meters))
    };
    Some(ScaleBar {
        meters,
        length_px: (meters / meters_per_px) as f32,
        segments,
        label,
    })
}

fn trim_float(value: f64) -> String {
    let rendered = format!("{:.3}", value);
    rendered
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_matches_tile_grid() {
        let (x, y) = project(0.0, 0.0);
        assert!((x - 0.5).abs() < 1e-12);
        assert!((y - 0.5).abs() < 1e-12);

        let (x, y) = project(-74.0060, 40.7128);
        assert_eq!(((x * 65536.0) as u32, (y * 65536.0) as u32), (19295, 24640));
        assert!((unproject_lat(y) - 40.7128).abs() < 1e-9);
    }

    #[test]
    fn fit_keeps_bounds_inside_canvas() {
        let bounds = Bounds {
            min_lon: -70.8,
            min_lat: -33.6,
            max_lon: -70.5,
            max_lat: -33.3,
        };
        let viewport = Viewport::fit(&bounds, 800, 600, 0.1);
        for (lon, lat) in [(-70.8, -33.6), (-70.5, -33.3)] {
            let (x, y) = viewport.to_pixel(lon, lat);
            assert!((0.0..=800.0).contains(&x));
            assert!((0.0..=600.0).contains(&y));
        }
    }

    #[test]
    fn tiles_cover_viewport() {
        let bounds = Bounds {
            min_lon: 2.2,
            min_lat: 48.8,
            max_lon: 2.5,
            max_lat: 48.9,
        };
        let viewport = Viewport::fit(&bounds, 512, 512, 0.0);
        let zoom = viewport.zoom(0, 19);
        let tiles = viewport.tiles(zoom);
        assert!(!tiles.is_empty());
        assert!(tiles.iter().any(|tile| tile.left <= 0.0 && tile.top <= 0.0));
        assert!(tiles
            .iter()
            .any(|tile| tile.left + tile.size >= 512.0 && tile.top + tile.size >= 512.0));
    }

    #[test]
    fn zoom_respects_provider_range() {
        let bounds = Bounds::point(10.0, 10.0);
        let viewport = Viewport::fit(&bounds, 256, 256, 0.0);
        assert_eq!(viewport.zoom(0, 17), 17);

        let world = Bounds {
            min_lon: -180.0,
            min_lat: -80.0,
            max_lon: 180.0,
            max_lat: 80.0,
        };
        assert_eq!(Viewport::fit(&world, 256, 256, 0.0).zoom(1, 19), 1);
    }

    #[test]
    fn scale_bar_uses_round_distances() {
        let bar = scale_bar(10.0, 150.0).unwrap();
        assert_eq!(bar.meters, 1000.0);
        assert_eq!(bar.label, "1 km");
        assert_eq!(bar.length_px, 100.0);

        let bar = scale_bar(1.0, 60.0).unwrap();
        assert_eq!(bar.meters, 50.0);
        assert_eq!(bar.label, "50 m");
        assert_eq!(bar.segments, 1);

        assert!(scale_bar(0.0, 100.0).is_none());
    }
}
