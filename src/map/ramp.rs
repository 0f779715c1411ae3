use serde::{Deserialize, Serialize};

/// Color ramps available for choropleth classes, ordered low to high.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRamp {
    #[default]
    Spectral,
    Viridis,
    Blues,
    Reds,
    Greens,
    #[serde(rename = "ylorrd")]
    YlOrRd,
    Greys,
}

const SPECTRAL: &[u32] = &[
    0x5e4fa2, 0x3288bd, 0x66c2a5, 0xabdda4, 0xe6f598, 0xffffbf, 0xfee08b, 0xfdae61, 0xf46d43,
    0xd53e4f, 0x9e0142,
];
const VIRIDIS: &[u32] = &[
    0x440154, 0x482878, 0x3e4989, 0x31688e, 0x26828e, 0x1f9e89, 0x35b779, 0x6ece58, 0xb5de2b,
    0xfde725,
];
const BLUES: &[u32] = &[
    0xf7fbff, 0xdeebf7, 0xc6dbef, 0x9ecae1, 0x6baed6, 0x4292c6, 0x2171b5, 0x08519c, 0x08306b,
];
const REDS: &[u32] = &[
    0xfff5f0, 0xfee0d2, 0xfcbba1, 0xfc9272, 0xfb6a4a, 0xef3b2c, 0xcb181d, 0xa50f15, 0x67000d,
];
const GREENS: &[u32] = &[
    0xf7fcf5, 0xe5f5e0, 0xc7e9c0, 0xa1d99b, 0x74c476, 0x41ab5d, 0x238b45, 0x006d2c, 0x00441b,
];
const YLORRD: &[u32] = &[
    0xffffcc, 0xffeda0, 0xfed976, 0xfeb24c, 0xfd8d3c, 0xfc4e2a, 0xe31a1c, 0xbd0026, 0x800026,
];
const GREYS: &[u32] = &[
    0xffffff, 0xf0f0f0, 0xd9d9d9, 0xbdbdbd, 0x969696, 0x737373, 0x525252, 0x252525, 0x000000,
];

fn rgb(hex: u32) -> [u8; 3] {
    [(hex >> 16) as u8, (hex >> 8) as u8, hex as u8]
}

impl ColorRamp {
    pub fn display_name(self) -> &'static str {
        match self {
            ColorRamp::Spectral => "Spectral",
            ColorRamp::Viridis => "Viridis",
            ColorRamp::Blues => "Blues",
            ColorRamp::Reds => "Reds",
            ColorRamp::Greens => "Greens",
            ColorRamp::YlOrRd => "YlOrRd",
            ColorRamp::Greys => "Greys",
        }
    }

    fn stops(self) -> &'static [u32] {
        match self {
            ColorRamp::Spectral => SPECTRAL,
            ColorRamp::Viridis => VIRIDIS,
            ColorRamp::Blues => BLUES,
            ColorRamp::Reds => REDS,
            ColorRamp::Greens => GREENS,
            ColorRamp::YlOrRd => YLORRD,
            ColorRamp::Greys => GREYS,
        }
    }

    /// Samples `count` evenly spaced colors, interpolating between stops.
    pub fn sample(self, count: usize) -> Vec<[u8; 3]> {
        let stops = self.stops();
        let last = stops.len() - 1;
        match count {
            0 => Vec::new(),
            1 => vec![rgb(stops[last / 2])],
            _ => (0..count)
                .map(|index| {
                    let position = index as f64 / (count - 1) as f64 * last as f64;
                    let lower = position.floor() as usize;
                    let upper = (lower + 1).min(last);
                    let fraction = position - lower as f64;
                    let (a, b) = (rgb(stops[lower]), rgb(stops[upper]));
                    let mix = |channel: usize| {
                        (f64::from(a[channel])
                            + (f64::from(b[channel]) - f64::from(a[channel])) * fraction)
                            .round() as u8
                    };
                    [mix(0), mix(1), mix(2)]
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_hits_both_ends() {
        let colors = ColorRamp::Blues.sample(5);
        assert_eq!(colors.len(), 5);
        assert_eq!(colors[0], [0xf7, 0xfb, 0xff]);
        assert_eq!(colors[4], [0x08, 0x30, 0x6b]);
    }

    #[test]
    fn sample_handles_degenerate_counts() {
        assert!(ColorRamp::Greys.sample(0).is_empty());
        assert_eq!(ColorRamp::Greys.sample(1).len(), 1);
        assert_eq!(ColorRamp::Viridis.sample(12).len(), 12);
    }

    #[test]
    fn ramp_names_deserialize() {
        #[derive(Deserialize)]
        struct Holder {
            ramp: ColorRamp,
        }
        let holder: Holder = serde_json::from_str(r#"{"ramp": "ylorrd"}"#).unwrap();
        assert_eq!(holder.ramp, ColorRamp::YlOrRd);
    }
}
