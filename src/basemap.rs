//! Base map providers and the once-per-batch basemap decision.
//!
//! The pipeline probes the configured provider exactly once before the unit
//! loop starts.  When the provider does not answer in time every unit of the
//! run falls back to the local background image, and a single batch-level
//! warning is recorded instead of per-unit failures.

use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::probe::{Reachability, ReachabilityProbe};
use crate::summary::BatchWarning;

/// Remote XYZ tile providers that can serve as base layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseMapProvider {
    /// No remote base layer; the local background is used without probing.
    #[default]
    None,
    OpenStreetMap,
    CartoPositron,
    CartoDarkMatter,
    GoogleMaps,
    GoogleSatellite,
    GoogleHybrid,
    EsriSatellite,
    EsriStreet,
    EsriTopography,
    BingSatellite,
}

impl BaseMapProvider {
    /// Human readable provider name.
    pub fn display_name(self) -> &'static str {
        match self {
            BaseMapProvider::None => "None",
            BaseMapProvider::OpenStreetMap => "OpenStreetMap",
            BaseMapProvider::CartoPositron => "CartoDB Positron",
            BaseMapProvider::CartoDarkMatter => "CartoDB Dark Matter",
            BaseMapProvider::GoogleMaps => "Google Maps",
            BaseMapProvider::GoogleSatellite => "Google Satellite",
            BaseMapProvider::GoogleHybrid => "Google Hybrid",
            BaseMapProvider::EsriSatellite => "Esri Satellite",
            BaseMapProvider::EsriStreet => "Esri Street Map",
            BaseMapProvider::EsriTopography => "Esri Topography",
            BaseMapProvider::BingSatellite => "Bing Satellite",
        }
    }

    /// Tile endpoint for the provider, `None` for [`BaseMapProvider::None`].
    pub fn tile_template(self) -> Option<TileTemplate> {
        let (url, min_zoom, max_zoom) = match self {
            BaseMapProvider::None => return None,
            BaseMapProvider::OpenStreetMap => {
                ("https://tile.openstreetmap.org/{z}/{x}/{y}.png", 0, 19)
            }
            BaseMapProvider::CartoPositron => (
                "https://a.basemaps.cartocdn.com/light_all/{z}/{x}/{y}@2x.png",
                0,
                20,
            ),
            BaseMapProvider::CartoDarkMatter => (
                "https://a.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}@2x.png",
                0,
                20,
            ),
            BaseMapProvider::GoogleMaps => {
                ("https://mt1.google.com/vt/lyrs=m&x={x}&y={y}&z={z}", 0, 19)
            }
            BaseMapProvider::GoogleSatellite => {
                ("https://mt1.google.com/vt/lyrs=s&x={x}&y={y}&z={z}", 0, 19)
            }
            BaseMapProvider::GoogleHybrid => {
                ("https://mt1.google.com/vt/lyrs=y&x={x}&y={y}&z={z}", 0, 19)
            }
            BaseMapProvider::EsriSatellite => (
                concat!(
                    "https://server.arcgisonline.com/ArcGIS/rest/services",
                    "/World_Imagery/MapServer/tile/{z}/{y}/{x}"
                ),
                0,
                17,
            ),
            BaseMapProvider::EsriStreet => (
                concat!(
                    "https://server.arcgisonline.com/ArcGIS/rest/services",
                    "/World_Street_Map/MapServer/tile/{z}/{y}/{x}"
                ),
                0,
                17,
            ),
            BaseMapProvider::EsriTopography => (
                concat!(
                    "https://services.arcgisonline.com/ArcGIS/rest/services",
                    "/World_Topo_Map/MapServer/tile/{z}/{y}/{x}"
                ),
                0,
                20,
            ),
            BaseMapProvider::BingSatellite => (
                "http://ecn.t3.tiles.virtualearth.net/tiles/a{q}.jpeg?g=1",
                1,
                19,
            ),
        };
        Some(TileTemplate::new(url, min_zoom, max_zoom))
    }
}

/// XYZ tile URL template with its supported zoom range.
///
/// Templates use `{z}`, `{x}` and `{y}` placeholders; Bing style templates use
/// `{q}` for the quadkey instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileTemplate {
    url: String,
    min_zoom: u8,
    max_zoom: u8,
}

impl TileTemplate {
    pub fn new(url: impl Into<String>, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            url: url.into(),
            min_zoom,
            max_zoom,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Expands the template for one tile.
    pub fn tile_url(&self, zoom: u8, x: u32, y: u32) -> String {
        self.url
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{q}", &quadkey(zoom, x, y))
    }

    /// URL used to check reachability: the top-left tile at the lowest zoom.
    pub fn probe_url(&self) -> String {
        self.tile_url(self.min_zoom, 0, 0)
    }
}

/// Bing Maps quadkey for a tile.
pub fn quadkey(zoom: u8, x: u32, y: u32) -> String {
    (1..=zoom)
        .rev()
        .map(|level| {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if x & mask != 0 {
                digit += 1;
            }
            if y & mask != 0 {
                digit += 2;
            }
            digit as char
        })
        .collect()
}

/// Background actually drawn under every map of the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseSource {
    RemoteTiles {
        provider: BaseMapProvider,
        template: TileTemplate,
    },
    LocalFallbackImage,
}

impl BaseSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, BaseSource::LocalFallbackImage)
    }
}

/// Basemap choice computed once per batch and shared read-only by all units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasemapDecision {
    /// Whether the requested remote provider answered the probe.
    pub reachable: bool,
    pub resolved: BaseSource,
}

impl BasemapDecision {
    /// Decision that always uses the local background.
    pub fn fallback() -> Self {
        Self {
            reachable: false,
            resolved: BaseSource::LocalFallbackImage,
        }
    }
}

/// Probes `provider` once and resolves the background for the whole run.
///
/// Returns the decision together with the batch warning to record when the
/// provider was requested but could not be reached.
pub fn resolve_basemap(
    provider: BaseMapProvider,
    probe: &dyn ReachabilityProbe,
    timeout: Duration,
) -> (BasemapDecision, Option<BatchWarning>) {
    let Some(template) = provider.tile_template() else {
        info!("No remote base map requested; using the local background");
        return (BasemapDecision::fallback(), None);
    };

    let url = template.probe_url();
    match probe.probe(&url, timeout) {
        Reachability::Reachable => {
            info!("Base map '{}' reachable", provider.display_name());
            (
                BasemapDecision {
                    reachable: true,
                    resolved: BaseSource::RemoteTiles { provider, template },
                },
                None,
            )
        }
        Reachability::Unreachable => {
            warn!(
                "Base map '{}' unreachable within {:?}; all units use the local background",
                provider.display_name(),
                timeout
            );
            (
                BasemapDecision::fallback(),
                Some(BatchWarning::ReachabilityDegraded {
                    provider: provider.display_name().to_owned(),
                    url,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        answer: Reachability,
        calls: AtomicUsize,
    }

    impl ReachabilityProbe for FixedProbe {
        fn probe(&self, _url: &str, _timeout: Duration) -> Reachability {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn probe(answer: Reachability) -> FixedProbe {
        FixedProbe {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn quadkey_matches_bing_reference() {
        assert_eq!(quadkey(3, 3, 5), "213");
        assert_eq!(quadkey(1, 0, 0), "0");
        assert_eq!(quadkey(0, 0, 0), "");
    }

    #[test]
    fn tile_url_substitutes_placeholders() {
        let template = BaseMapProvider::GoogleSatellite.tile_template().unwrap();
        assert_eq!(
            template.tile_url(4, 2, 7),
            "https://mt1.google.com/vt/lyrs=s&x=2&y=7&z=4"
        );

        let bing = BaseMapProvider::BingSatellite.tile_template().unwrap();
        assert_eq!(
            bing.probe_url(),
            "http://ecn.t3.tiles.virtualearth.net/tiles/a0.jpeg?g=1"
        );
    }

    #[test]
    fn none_provider_skips_probe() {
        let probe = probe(Reachability::Reachable);
        let (decision, warning) =
            resolve_basemap(BaseMapProvider::None, &probe, Duration::from_millis(10));

        assert!(decision.resolved.is_fallback());
        assert!(warning.is_none());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unreachable_provider_degrades_with_warning() {
        let probe = probe(Reachability::Unreachable);
        let (decision, warning) = resolve_basemap(
            BaseMapProvider::OpenStreetMap,
            &probe,
            Duration::from_millis(10),
        );

        assert!(!decision.reachable);
        assert!(decision.resolved.is_fallback());
        assert!(matches!(
            warning,
            Some(BatchWarning::ReachabilityDegraded { .. })
        ));
    }

    #[test]
    fn reachable_provider_resolves_to_remote_tiles() {
        let probe = probe(Reachability::Reachable);
        let (decision, warning) = resolve_basemap(
            BaseMapProvider::EsriStreet,
            &probe,
            Duration::from_millis(10),
        );

        assert!(decision.reachable);
        assert!(matches!(
            decision.resolved,
            BaseSource::RemoteTiles {
                provider: BaseMapProvider::EsriStreet,
                ..
            }
        ));
        assert!(warning.is_none());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }
}
