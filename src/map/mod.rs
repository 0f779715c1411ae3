//! Single-unit thematic maps.
//!
//! The compositor stacks the resolved base layer, context layers below the
//! thematic layer, the thematic layer (surrounding units muted), context layers
//! above it, the dashed highlight of the target unit, and finally the legend,
//! the scale bar and the title.  The output is a complete PNG or an error;
//! nothing is written to disk here.

mod geometry;
mod ramp;
mod tiles;
mod viewport;

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::debug;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, StrokeDash, Transform};

pub use geometry::{Geometry, GeometryError, GeometrySource, PolygonStore};
pub use ramp::ColorRamp;
pub use tiles::{Background, HttpTileFetcher, TileError, TileFetcher, DEFAULT_TILE_TIMEOUT};
pub use viewport::{project, scale_bar, Bounds, ScaleBar, TilePlacement, Viewport};

use crate::basemap::{BaseSource, BasemapDecision, TileTemplate};
use crate::config::ContextLayer;
use crate::error::{CompositionError, Stage};
use crate::locale::{Label, Locale};
use crate::model::TerritorialUnit;
use crate::raster::{
    blit, encode_png, fill_rect, fill_rect_alpha, image_to_pixmap, pixmap_to_image, skia_color,
    stroke_rect, WHITE,
};
use crate::stats::{IndicatorStats, IndicatorSummary};
use crate::text::{Anchor, TextPainter, TextStyle, Weight};

/// Upper bound on tiles fetched for one map; the zoom is lowered until it fits.
pub const MAX_TILES: usize = 36;

/// Opacity factor applied to units other than the target.
const MUTED_FACTOR: f32 = 0.45;
/// Extent padding around the target unit, as a fraction of its size.
const PADDING: f64 = 0.15;

const INK: [u8; 3] = [0x1d, 0x26, 0x30];
const NO_DATA: [u8; 3] = [0xc8, 0xcc, 0xd0];
const CONTEXT_STROKE: [u8; 3] = [0x4d, 0x55, 0x5e];
const CONTEXT_FILL: [u8; 3] = [0x9a, 0xa3, 0xab];

/// One legend row.
#[derive(Clone, Debug, PartialEq)]
pub struct LegendEntry {
    pub color: [u8; 3],
    pub label: String,
}

/// Visual parameters shared by every map of a batch.
#[derive(Clone, Debug)]
pub struct MapStyle {
    pub width_px: u32,
    pub height_px: u32,
    /// Fill color per classification bucket.
    pub class_colors: Vec<[u8; 3]>,
    pub legend_title: String,
    pub legend: Vec<LegendEntry>,
    /// Outline color of the target unit.
    pub highlight: [u8; 3],
    /// Opacity of the thematic layer, 0 to 1.
    pub opacity: f32,
    pub locale: Locale,
}

impl MapStyle {
    /// Builds class colors and legend rows from the classification breaks.
    pub fn from_stats(
        stats: &IndicatorStats,
        ramp: ColorRamp,
        legend_title: impl Into<String>,
        locale: Locale,
    ) -> Self {
        let class_colors = ramp.sample(stats.class_count());
        let legend = class_colors
            .iter()
            .enumerate()
            .map(|(index, &color)| {
                let lower = if index == 0 {
                    stats.min
                } else {
                    stats.breaks[index - 1]
                };
                let upper = stats.breaks[index];
                LegendEntry {
                    color,
                    label: format!(
                        "{} - {}",
                        locale.format_number(lower),
                        locale.format_number(upper)
                    ),
                }
            })
            .collect();

        Self {
            width_px: 1200,
            height_px: 900,
            class_colors,
            legend_title: legend_title.into(),
            legend,
            highlight: [0xe6, 0x39, 0x46],
            opacity: 0.85,
            locale,
        }
    }

    pub fn with_size(mut self, width_px: u32, height_px: u32) -> Self {
        self.width_px = width_px.max(1);
        self.height_px = height_px.max(1);
        self
    }

    pub fn with_highlight(mut self, highlight: [u8; 3]) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    fn color_of(&self, bucket: Option<usize>) -> [u8; 3] {
        bucket
            .and_then(|bucket| self.class_colors.get(bucket).copied())
            .unwrap_or(NO_DATA)
    }

    /// Base length for strokes and text, proportional to the frame size.
    fn unit_px(&self) -> f32 {
        (self.width_px.min(self.height_px) as f32 / 300.0).max(1.0)
    }
}

/// One unit of the thematic layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ThematicFeature {
    pub unit_id: String,
    pub geometry: Geometry,
    /// Classification bucket; `None` when the unit has no value.
    pub bucket: Option<usize>,
}

/// Builds the thematic layer of a batch.
///
/// Units without a geometry handle, or whose geometry cannot be loaded, are
/// left out; the failure surfaces later when that unit's own map is composed.
pub fn thematic_layer(
    source: &dyn GeometrySource,
    units: &[TerritorialUnit],
    summary: &IndicatorSummary,
) -> Vec<ThematicFeature> {
    units
        .iter()
        .filter_map(|unit| {
            let handle = unit.geometry()?;
            match source.unit_geometry(handle) {
                Ok(geometry) => Some(ThematicFeature {
                    unit_id: unit.id().to_owned(),
                    geometry,
                    bucket: summary.unit(unit.id()).map(|derived| derived.bucket),
                }),
                Err(err) => {
                    debug!("Leaving unit '{}' out of the thematic layer: {}", unit.id(), err);
                    None
                }
            }
        })
        .collect()
}

/// Encoded map image.
#[derive(Clone, Debug, PartialEq)]
pub struct MapArtifact {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    /// Whether the local background was drawn instead of remote tiles.
    pub used_fallback: bool,
}

/// Draws per-unit maps over a shared thematic layer.
pub struct MapCompositor {
    geometry: Arc<dyn GeometrySource>,
    tiles: Arc<dyn TileFetcher>,
    background: Background,
    text: Option<Arc<TextPainter>>,
    thematic: Vec<ThematicFeature>,
}

impl std::fmt::Debug for MapCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapCompositor")
            .field("background", &self.background)
            .field("text", &self.text.is_some())
            .field("thematic", &self.thematic.len())
            .finish()
    }
}

impl MapCompositor {
    pub fn new(
        geometry: Arc<dyn GeometrySource>,
        tiles: Arc<dyn TileFetcher>,
        background: Background,
        text: Option<Arc<TextPainter>>,
    ) -> Self {
        Self {
            geometry,
            tiles,
            background,
            text,
            thematic: Vec::new(),
        }
    }

    pub fn with_thematic(mut self, thematic: Vec<ThematicFeature>) -> Self {
        self.thematic = thematic;
        self
    }

    /// Composes the map of `unit`.
    pub fn compose_map(
        &self,
        unit: &TerritorialUnit,
        decision: &BasemapDecision,
        context_layers: &[ContextLayer],
        style: &MapStyle,
    ) -> Result<MapArtifact, CompositionError> {
        let fail = |message: String| CompositionError::new(unit.id(), Stage::Map, message);

        let handle = unit
            .geometry()
            .ok_or_else(|| fail("unit has no geometry".to_owned()))?;
        let target = self
            .geometry
            .unit_geometry(handle)
            .map_err(|err| fail(err.to_string()))?;
        let bounds = target
            .bounds()
            .ok_or_else(|| fail(format!("geometry '{}' is empty", handle)))?;
        let viewport = Viewport::fit(&bounds, style.width_px, style.height_px, PADDING);

        let (base, used_fallback) = match &decision.resolved {
            BaseSource::RemoteTiles { template, .. } => {
                (self.draw_tiles(&viewport, template).map_err(fail)?, false)
            }
            BaseSource::LocalFallbackImage => {
                (self.background.render(style.width_px, style.height_px), true)
            }
        };

        let mut pixmap = image_to_pixmap(&base).ok_or_else(|| fail("invalid map size".to_owned()))?;
        let mut layers: Vec<&ContextLayer> = context_layers.iter().collect();
        layers.sort_by_key(|layer| layer.z_order);
        let (below, above): (Vec<&ContextLayer>, Vec<&ContextLayer>) =
            layers.into_iter().partition(|layer| layer.z_order < 0);

        for layer in &below {
            self.draw_context(&mut pixmap, &viewport, layer, style).map_err(fail)?;
        }
        self.draw_thematic(&mut pixmap, &viewport, unit.id(), style);
        for layer in &above {
            self.draw_context(&mut pixmap, &viewport, layer, style).map_err(fail)?;
        }
        draw_highlight(&mut pixmap, &viewport, &target, style);

        let mut canvas = pixmap_to_image(&pixmap);
        self.draw_legend(&mut canvas, style);
        self.draw_scale_bar(&mut canvas, &viewport, style);
        self.draw_title(&mut canvas, unit.display_name(), style);

        let bytes =
            encode_png(&canvas).map_err(|err| fail(format!("failed to encode map: {}", err)))?;
        Ok(MapArtifact {
            width: canvas.width(),
            height: canvas.height(),
            bytes,
            used_fallback,
        })
    }

    fn draw_tiles(
        &self,
        viewport: &Viewport,
        template: &TileTemplate,
    ) -> Result<RgbaImage, String> {
        let mut zoom = viewport.zoom(template.min_zoom(), template.max_zoom());
        let mut placements = viewport.tiles(zoom);
        while placements.len() > MAX_TILES && zoom > template.min_zoom() {
            zoom -= 1;
            placements = viewport.tiles(zoom);
        }
        debug!("Drawing {} tiles at zoom {}", placements.len(), zoom);

        let mut canvas = RgbaImage::from_pixel(
            viewport.width_px(),
            viewport.height_px(),
            Rgba([WHITE[0], WHITE[1], WHITE[2], 255]),
        );
        for tile in placements {
            let url = template.tile_url(tile.zoom, tile.x, tile.y);
            let bytes = self.tiles.fetch(&url).map_err(|err| err.to_string())?;
            let image = image::load_from_memory(&bytes)
                .map_err(|err| format!("invalid tile {}: {}", url, err))?
                .to_rgba8();
            let left = tile.left.floor();
            let top = tile.top.floor();
            let size = ((tile.left + tile.size).ceil() - left).max(1.0) as u32;
            let scaled = imageops::resize(&image, size, size, FilterType::Triangle);
            blit(&mut canvas, &scaled, left as i64, top as i64);
        }
        Ok(canvas)
    }

    fn draw_context(
        &self,
        pixmap: &mut Pixmap,
        viewport: &Viewport,
        layer: &ContextLayer,
        style: &MapStyle,
    ) -> Result<(), String> {
        let features = self
            .geometry
            .context_layer(&layer.layer)
            .map_err(|err| err.to_string())?;
        let opacity = layer.opacity.clamp(0.0, 1.0);
        let stroke = Stroke {
            width: style.unit_px(),
            ..Stroke::default()
        };
        for feature in &features {
            if let Some(path) = geometry_path(viewport, feature) {
                pixmap.fill_path(
                    &path,
                    &paint(CONTEXT_FILL, opacity * 0.25),
                    FillRule::EvenOdd,
                    Transform::identity(),
                    None,
                );
                pixmap.stroke_path(
                    &path,
                    &paint(CONTEXT_STROKE, opacity),
                    &stroke,
                    Transform::identity(),
                    None,
                );
            }
        }
        Ok(())
    }

    fn draw_thematic(
        &self,
        pixmap: &mut Pixmap,
        viewport: &Viewport,
        target_id: &str,
        style: &MapStyle,
    ) {
        let outline = Stroke {
            width: style.unit_px() * 0.5,
            ..Stroke::default()
        };
        for feature in &self.thematic {
            let Some(path) = geometry_path(viewport, &feature.geometry) else {
                continue;
            };
            let alpha = if feature.unit_id == target_id {
                style.opacity
            } else {
                style.opacity * MUTED_FACTOR
            };
            pixmap.fill_path(
                &path,
                &paint(style.color_of(feature.bucket), alpha),
                FillRule::EvenOdd,
                Transform::identity(),
                None,
            );
            pixmap.stroke_path(
                &path,
                &paint(WHITE, alpha),
                &outline,
                Transform::identity(),
                None,
            );
        }
    }

    fn draw_legend(&self, canvas: &mut RgbaImage, style: &MapStyle) {
        if style.legend.is_empty() {
            return;
        }
        let unit = style.unit_px();
        let swatch = (unit * 10.0).round();
        let font = swatch * 0.9;
        let gap = (unit * 4.0).round();
        let label_width = match &self.text {
            Some(text) => style
                .legend
                .iter()
                .map(|entry| text.measure(&entry.label, font, Weight::Regular).0)
                .chain(std::iter::once(
                    text.measure(&style.legend_title, font, Weight::Bold).0 - swatch - gap,
                ))
                .fold(0.0f32, f32::max),
            None => 0.0,
        };
        let title_rows = if self.text.is_some() { 1.0 } else { 0.0 };
        let rows = style.legend.len() as f32 + title_rows;
        let box_width = gap * 3.0 + swatch + label_width;
        let box_height = gap * 2.0 + rows * (swatch + gap) - gap;
        let left = gap;
        let top = canvas.height() as f32 - box_height - gap;

        let frame = (left as i64, top as i64, box_width as i64, box_height as i64);
        fill_rect_alpha(canvas, frame.0, frame.1, frame.2, frame.3, WHITE, 0.85);
        stroke_rect(canvas, frame.0, frame.1, frame.2, frame.3, CONTEXT_FILL);

        let mut y = top + gap;
        if let Some(text) = &self.text {
            let title = if style.legend_title.is_empty() {
                style.locale.label(Label::Legend)
            } else {
                style.legend_title.as_str()
            };
            text.draw(canvas, title, left + gap, y, TextStyle::new(font, INK).bold());
            y += swatch + gap;
        }
        for entry in &style.legend {
            let x = left + gap;
            let (px, py, side) = (x as i64, y as i64, swatch as i64);
            fill_rect_alpha(canvas, px, py, side, side, entry.color, style.opacity.max(0.2));
            stroke_rect(canvas, px, py, side, side, CONTEXT_STROKE);
            if let Some(text) = &self.text {
                text.draw(canvas, &entry.label, x + swatch + gap, y, TextStyle::new(font, INK));
            }
            y += swatch + gap;
        }
    }

    fn draw_scale_bar(&self, canvas: &mut RgbaImage, viewport: &Viewport, style: &MapStyle) {
        let unit = style.unit_px();
        let Some(bar) = scale_bar(viewport.meters_per_pixel(), canvas.width() as f32 * 0.25) else {
            return;
        };
        let height = (unit * 3.0).round().max(2.0);
        let margin = (unit * 6.0).round();
        let right = canvas.width() as f32 - margin;
        let left = right - bar.length_px;
        let top = canvas.height() as f32 - margin - height;

        let segment = bar.length_px / bar.segments as f32;
        for index in 0..bar.segments {
            let color = if index % 2 == 0 { INK } else { WHITE };
            let x = left + segment * index as f32;
            let width = segment.round() as i64;
            fill_rect(canvas, x.round() as i64, top as i64, width, height as i64, color);
        }
        let length = bar.length_px.round() as i64;
        stroke_rect(canvas, left.round() as i64, top as i64, length, height as i64, INK);

        if let Some(text) = &self.text {
            let size = unit * 7.0;
            let label_top = top - size * 1.3;
            let label_style = TextStyle::new(size, INK).anchored(Anchor::End);
            text.draw(canvas, &bar.label, right, label_top, label_style);
        }
    }

    fn draw_title(&self, canvas: &mut RgbaImage, title: &str, style: &MapStyle) {
        let Some(text) = &self.text else {
            return;
        };
        let unit = style.unit_px();
        let size = unit * 12.0;
        let band = (size * 1.8).round();
        fill_rect_alpha(canvas, 0, 0, i64::from(canvas.width()), band as i64, WHITE, 0.75);
        let fitted = text.fit(title, size, Weight::Bold, canvas.width() as f32 - unit * 8.0);
        text.draw(
            canvas,
            &fitted,
            canvas.width() as f32 / 2.0,
            (band - size * 1.2) / 2.0,
            TextStyle::new(size, INK).bold().anchored(Anchor::Middle),
        );
    }
}

fn paint(color: [u8; 3], alpha: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(skia_color(color, alpha));
    paint.anti_alias = true;
    paint
}

/// Projects every ring of `geometry` into one closed canvas path.
fn geometry_path(viewport: &Viewport, geometry: &Geometry) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for ring in &geometry.rings {
        let mut points = ring.iter().map(|point| viewport.to_pixel(point[0], point[1]));
        let Some((x, y)) = points.next() else {
            continue;
        };
        builder.move_to(x, y);
        for (x, y) in points {
            builder.line_to(x, y);
        }
        builder.close();
    }
    builder.finish()
}

/// Dashed outline over a white halo so it reads on any background.
fn draw_highlight(pixmap: &mut Pixmap, viewport: &Viewport, target: &Geometry, style: &MapStyle) {
    let Some(path) = geometry_path(viewport, target) else {
        return;
    };
    let width = style.unit_px() * 2.0;
    let halo = Stroke {
        width: width * 2.0,
        ..Stroke::default()
    };
    let dashed = Stroke {
        width,
        dash: StrokeDash::new(vec![width * 4.0, width * 2.5], 0.0),
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint(WHITE, 0.8), &halo, Transform::identity(), None);
    pixmap.stroke_path(&path, &paint(style.highlight, 1.0), &dashed, Transform::identity(), None);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::basemap::BaseMapProvider;
    use crate::config::ClassificationMethod;
    use crate::model::GeometryHandle;
    use crate::stats::{StatisticsOptions, StatisticsSummary};

    struct CountingTiles {
        calls: AtomicUsize,
        fail: bool,
        urls: Mutex<Vec<String>>,
    }

    impl CountingTiles {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl TileFetcher for CountingTiles {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_owned());
            if self.fail {
                return Err(TileError::Status {
                    url: url.to_owned(),
                    status: 503,
                });
            }
            Ok(encode_png(&RgbaImage::from_pixel(256, 256, Rgba([10, 200, 10, 255]))).unwrap())
        }
    }

    fn units() -> Vec<TerritorialUnit> {
        (0..4)
            .map(|index| {
                TerritorialUnit::new(format!("u{}", index), format!("Unit {}", index))
                    .with_geometry(GeometryHandle::new(format!("g{}", index)))
                    .with_indicator("pop", f64::from(index) * 10.0 + 1.0)
            })
            .collect()
    }

    fn store() -> PolygonStore {
        let mut store = PolygonStore::new()
            .with_layer("rivers", vec![Geometry::rectangle(-70.61, -33.5, -70.6, -33.4)]);
        for index in 0..4 {
            let lon = -70.7 + f64::from(index) * 0.05;
            let square = Geometry::rectangle(lon, -33.5, lon + 0.05, -33.45);
            store.insert_unit(format!("g{}", index), square);
        }
        store
    }

    fn setup(tiles: Arc<dyn TileFetcher>) -> (MapCompositor, MapStyle, Vec<TerritorialUnit>) {
        let units = units();
        let options = StatisticsOptions {
            classes: 3,
            method: ClassificationMethod::Quantile,
            ..StatisticsOptions::default()
        };
        let summary = StatisticsSummary::compute(&units, &["pop".to_owned()], &options).unwrap();
        let primary = summary.primary().unwrap();
        let store: Arc<dyn GeometrySource> = Arc::new(store());
        let thematic = thematic_layer(store.as_ref(), &units, primary);
        let style = MapStyle::from_stats(&primary.stats, ColorRamp::Blues, "pop", Locale::default())
            .with_size(300, 200);
        let compositor =
            MapCompositor::new(store, tiles, Background::Procedural, None).with_thematic(thematic);
        (compositor, style, units)
    }

    #[test]
    fn legend_follows_breaks() {
        let (_, style, _) = setup(Arc::new(CountingTiles::new(false)));
        assert_eq!(style.legend.len(), 3);
        assert_eq!(style.class_colors.len(), 3);
        assert_eq!(style.legend[0].color, style.class_colors[0]);
    }

    #[test]
    fn fallback_map_is_deterministic_and_fetches_nothing() {
        let tiles = Arc::new(CountingTiles::new(false));
        let (compositor, style, units) = setup(tiles.clone());
        let layers = [ContextLayer::new("rivers").with_z_order(1)];

        let first = compositor
            .compose_map(&units[1], &BasemapDecision::fallback(), &layers, &style)
            .unwrap();
        let second = compositor
            .compose_map(&units[1], &BasemapDecision::fallback(), &layers, &style)
            .unwrap();
        assert!(first.used_fallback);
        assert_eq!((first.width, first.height), (300, 200));
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(tiles.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remote_tiles_are_fetched_and_bounded() {
        let tiles = Arc::new(CountingTiles::new(false));
        let (compositor, style, units) = setup(tiles.clone());
        let template = BaseMapProvider::OpenStreetMap.tile_template().unwrap();
        let decision = BasemapDecision {
            reachable: true,
            resolved: BaseSource::RemoteTiles {
                provider: BaseMapProvider::OpenStreetMap,
                template,
            },
        };

        let artifact = compositor.compose_map(&units[0], &decision, &[], &style).unwrap();
        assert!(!artifact.used_fallback);
        let calls = tiles.calls.load(Ordering::SeqCst);
        assert!(calls >= 1 && calls <= MAX_TILES);
        assert!(tiles.urls.lock().unwrap()[0].contains("tile.openstreetmap.org"));
    }

    #[test]
    fn tile_failure_is_a_map_stage_error() {
        let (compositor, style, units) = setup(Arc::new(CountingTiles::new(true)));
        let decision = BasemapDecision {
            reachable: true,
            resolved: BaseSource::RemoteTiles {
                provider: BaseMapProvider::OpenStreetMap,
                template: BaseMapProvider::OpenStreetMap.tile_template().unwrap(),
            },
        };
        let err = compositor.compose_map(&units[0], &decision, &[], &style).unwrap_err();
        assert_eq!(err.stage, Stage::Map);
        assert_eq!(err.unit_id, "u0");
    }

    #[test]
    fn missing_geometry_and_layers_fail_the_map() {
        let (compositor, style, _) = setup(Arc::new(CountingTiles::new(false)));
        let orphan = TerritorialUnit::new("x", "Orphan").with_indicator("pop", 3.0);
        let err = compositor
            .compose_map(&orphan, &BasemapDecision::fallback(), &[], &style)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Map);

        let unknown =
            TerritorialUnit::new("y", "Unknown").with_geometry(GeometryHandle::new("nope"));
        assert!(compositor
            .compose_map(&unknown, &BasemapDecision::fallback(), &[], &style)
            .is_err());

        let (compositor, style, units) = setup(Arc::new(CountingTiles::new(false)));
        let err = compositor
            .compose_map(
                &units[0],
                &BasemapDecision::fallback(),
                &[ContextLayer::new("roads")],
                &style,
            )
            .unwrap_err();
        assert!(err.message.contains("roads"));
    }

    #[test]
    fn target_is_drawn_stronger_than_neighbours() {
        let (compositor, style, units) = setup(Arc::new(CountingTiles::new(false)));
        let artifact = compositor
            .compose_map(&units[1], &BasemapDecision::fallback(), &[], &style)
            .unwrap();
        let image = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();

        let viewport = Viewport::fit(
            &Geometry::rectangle(-70.65, -33.5, -70.6, -33.45).bounds().unwrap(),
            300,
            200,
            PADDING,
        );
        let (tx, ty) = viewport.to_pixel(-70.625, -33.475);
        let target = image.get_pixel(tx as u32, ty as u32).0;
        let expected = style.class_colors[units_bucket(&units, 1)];
        let distance = |pixel: [u8; 4]| -> i32 {
            (0..3).map(|c| (i32::from(pixel[c]) - i32::from(expected[c])).abs()).sum()
        };
        let background = Background::Procedural.render(300, 200).get_pixel(tx as u32, ty as u32).0;
        assert!(distance(target) < distance(background));
    }

    fn units_bucket(units: &[TerritorialUnit], index: usize) -> usize {
        let options = StatisticsOptions {
            classes: 3,
            ..StatisticsOptions::default()
        };
        let summary = StatisticsSummary::compute(units, &["pop".to_owned()], &options).unwrap();
        summary.primary().unwrap().unit(units[index].id()).unwrap().bucket
    }
}
