#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use autoatlas::config::TemplateKind;
use autoatlas::map::{Geometry, PolygonStore, TileError, TileFetcher};
use autoatlas::probe::{Reachability, ReachabilityProbe};
use autoatlas::{
    BaseMapProvider, Collaborators, FontSource, GeometryHandle, OutputFormat, ReportConfig,
    ReportConfigBuilder, TerritorialUnit,
};
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};

/// Probe with a fixed answer that counts its calls.
pub struct StubProbe {
    answer: Reachability,
    calls: AtomicUsize,
}

impl StubProbe {
    pub fn new(answer: Reachability) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReachabilityProbe for StubProbe {
    fn probe(&self, _url: &str, _timeout: Duration) -> Reachability {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Tile server stand-in serving plain green tiles, or failing every request.
pub struct StubTiles {
    fail: bool,
    calls: AtomicUsize,
}

impl StubTiles {
    pub fn serving() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TileFetcher for StubTiles {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TileError::Request {
                url: url.to_owned(),
                message: "connection refused".to_owned(),
            });
        }
        let tile = RgbaImage::from_pixel(256, 256, Rgba([120, 180, 120, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(tile)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .map_err(|err| TileError::Request {
                url: url.to_owned(),
                message: err.to_string(),
            })?;
        Ok(bytes)
    }
}

/// Unit ids `u01`, `u02`, ... laid out on a grid near Santiago.
pub fn unit_id(position: usize) -> String {
    format!("u{:02}", position)
}

/// `count` units with a `pop` value; positions (1-based) in `without_geometry` get no shape.
pub fn units(count: usize, without_geometry: &[usize]) -> Vec<TerritorialUnit> {
    (1..=count)
        .map(|position| {
            let unit = TerritorialUnit::new(unit_id(position), format!("Comuna {}", position))
                .with_indicator("pop", (position * 1_000 + 250) as f64)
                .with_indicator("area", (position % 4 + 1) as f64 * 12.5);
            if without_geometry.contains(&position) {
                unit
            } else {
                unit.with_geometry(GeometryHandle::new(unit_id(position)))
            }
        })
        .collect()
}

/// Square polygons for `count` units plus a `rivers` context layer.
pub fn store(count: usize) -> PolygonStore {
    let mut store = PolygonStore::new();
    for position in 1..=count {
        let column = ((position - 1) % 5) as f64;
        let row = ((position - 1) / 5) as f64;
        let lon = -70.80 + column * 0.05;
        let lat = -33.55 + row * 0.05;
        let square = Geometry::rectangle(lon, lat, lon + 0.045, lat + 0.045);
        store.insert_unit(unit_id(position), square);
    }
    store.with_layer(
        "rivers",
        vec![Geometry::rectangle(-70.82, -33.52, -70.50, -33.515)],
    )
}

/// Small PNG run: basic charts, remote base map requested, 72 DPI.
pub fn png_config(output_dir: &Path) -> ReportConfigBuilder {
    ReportConfig::builder(["pop", "area"], output_dir)
        .output_format(OutputFormat::Png)
        .template(TemplateKind::Minimal)
        .dpi(72)
        .base_map(BaseMapProvider::OpenStreetMap)
        .prefer_premium_charts(false)
}

pub fn collaborators(
    store: PolygonStore,
    probe: Arc<StubProbe>,
    tiles: Arc<StubTiles>,
) -> Collaborators {
    Collaborators {
        geometry: Arc::new(store),
        probe,
        tiles,
        fonts: FontSource::Disabled,
    }
}

/// Names of the files in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
