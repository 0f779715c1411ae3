//! Remote tile retrieval and the local fallback background.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::debug;
use thiserror::Error;

use crate::error::SetupError;
use crate::probe::USER_AGENT;
use crate::raster::draw_line;

/// Default upper bound for fetching one tile.
pub const DEFAULT_TILE_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to retrieve one tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Source of encoded tile images.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError>;
}

/// Tile fetcher backed by a blocking `reqwest` client with a per-request timeout.
#[derive(Clone, Debug)]
pub struct HttpTileFetcher {
    client: reqwest::blocking::Client,
}

impl HttpTileFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SetupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| SetupError::Network(format!("failed to create tile client: {}", err)))?;
        Ok(Self { client })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
        let request_error = |err: reqwest::Error| TileError::Request {
            url: url.to_owned(),
            message: err.to_string(),
        };
        let response = self.client.get(url).send().map_err(request_error)?;
        if !response.status().is_success() {
            return Err(TileError::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().map_err(request_error)?;
        debug!("Fetched tile {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}

const SEA: [u8; 3] = [0xe8, 0xee, 0xf2];
const GRATICULE: [u8; 3] = [0xdb, 0xe3, 0xea];

/// Local background drawn when remote tiles are not used.
#[derive(Clone, Debug)]
pub enum Background {
    /// Flat tone with a faint grid.
    Procedural,
    /// Image scaled to cover the map frame.
    Image(Arc<RgbaImage>),
}

impl Background {
    /// Loads the configured background image, or the procedural one when none is set.
    pub fn load(path: Option<&Path>) -> Result<Self, SetupError> {
        let Some(path) = path else {
            return Ok(Background::Procedural);
        };
        let image = image::open(path).map_err(|err| SetupError::ImageResource {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(Background::Image(Arc::new(image.to_rgba8())))
    }

    /// Renders the background at `width` x `height` pixels.
    pub fn render(&self, width: u32, height: u32) -> RgbaImage {
        match self {
            Background::Procedural => {
                let sea = Rgba([SEA[0], SEA[1], SEA[2], 255]);
                let mut canvas = RgbaImage::from_pixel(width, height, sea);
                let step = (width.max(height) / 12).max(8) as i64;
                let (w, h) = (i64::from(width), i64::from(height));
                let mut offset = step;
                while offset < w.max(h) {
                    draw_line(&mut canvas, (offset, 0), (offset, h - 1), GRATICULE);
                    draw_line(&mut canvas, (0, offset), (w - 1, offset), GRATICULE);
                    offset += step;
                }
                canvas
            }
            Background::Image(image) => cover(image, width, height),
        }
    }
}

/// Scales `image` to cover `width` x `height` and crops the center.
fn cover(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let scale = (f64::from(width) / f64::from(image.width().max(1)))
        .max(f64::from(height) / f64::from(image.height().max(1)));
    let scaled_width = ((f64::from(image.width()) * scale).ceil() as u32).max(width);
    let scaled_height = ((f64::from(image.height()) * scale).ceil() as u32).max(height);
    let scaled = imageops::resize(image, scaled_width, scaled_height, FilterType::Triangle);
    let x = (scaled_width - width) / 2;
    let y = (scaled_height - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedural_background_is_deterministic() {
        let first = Background::Procedural.render(64, 48);
        let second = Background::Procedural.render(64, 48);
        assert_eq!(first, second);
        assert_eq!(first.dimensions(), (64, 48));
    }

    #[test]
    fn image_background_covers_frame() {
        let source = RgbaImage::from_pixel(10, 40, Rgba([1, 2, 3, 255]));
        let rendered = Background::Image(Arc::new(source)).render(50, 20);
        assert_eq!(rendered.dimensions(), (50, 20));
        assert_eq!(rendered.get_pixel(25, 10).0, [1, 2, 3, 255]);
    }

    #[test]
    fn missing_background_file_is_a_setup_error() {
        let err = Background::load(Some(Path::new("/definitely/not/here.png"))).unwrap_err();
        assert!(matches!(err, SetupError::ImageResource { .. }));
    }

    #[test]
    fn unreachable_tile_server_fails_within_timeout() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher = HttpTileFetcher::new(Duration::from_millis(300)).unwrap();
        let err = fetcher
            .fetch(&format!("http://127.0.0.1:{}/0/0/0.png", port))
            .unwrap_err();
        assert!(matches!(err, TileError::Request { .. }));
    }
}
