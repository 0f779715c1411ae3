//! Validated configuration for a batch run.
//!
//! A [`ReportConfig`] is constructed once, validated eagerly via
//! [`ReportConfig::validate`], and then shared read-only by every component of
//! the pipeline.  The same checks run whether the config was deserialized from
//! TOML, produced by the [`ConfigWizard`](crate::wizard::ConfigWizard) or built
//! with [`ReportConfigBuilder`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::basemap::BaseMapProvider;
use crate::error::ValidationError;
use crate::map::ColorRamp;

/// Lowest accepted output resolution.
pub const MIN_DPI: u32 = 72;
/// Highest accepted output resolution.
pub const MAX_DPI: u32 = 1200;
/// Default number of classification buckets.
pub const DEFAULT_CLASSES: usize = 5;
/// Default probe timeout in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1500;

const MIN_CLASSES: usize = 2;
const MAX_CLASSES: usize = 12;

/// File format of the per-unit artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pdf,
    Png,
}

impl OutputFormat {
    /// File extension used for artifacts in this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
        }
    }
}

/// Named page templates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    #[default]
    Institutional,
    Academic,
    Minimal,
}

/// Language used for fixed labels in the report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
}

/// Side of the header band that carries the logo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoPosition {
    #[default]
    Left,
    Right,
}

/// How indicator values are split into classes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// Equal number of units per class.
    #[default]
    Quantile,
    /// Equal value span per class.
    EqualInterval,
}

/// Optional branding applied by the report templates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branding {
    pub logo_path: Option<PathBuf>,
    pub logo_position: LogoPosition,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub footer: Option<String>,
    pub header_color: Option<String>,
    pub footer_color: Option<String>,
}

/// Auxiliary reference layer drawn around the thematic layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextLayer {
    /// Reference understood by the geometry source.
    pub layer: String,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Lower values are drawn first.
    #[serde(default)]
    pub z_order: i32,
    #[serde(default)]
    pub legend_alias: Option<String>,
}

impl ContextLayer {
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            opacity: 1.0,
            z_order: 0,
            legend_alias: None,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }
}

/// Full configuration of a batch run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Indicator fields; the first one drives classification and map colors.
    pub indicators: Vec<String>,
    #[serde(default)]
    pub indicator_alias: Option<String>,
    #[serde(default = "default_classes")]
    pub classes: usize,
    #[serde(default)]
    pub classification: ClassificationMethod,
    #[serde(default)]
    pub color_ramp: ColorRamp,
    #[serde(default)]
    pub template: TemplateKind,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub branding: Branding,
    #[serde(default)]
    pub context_layers: Vec<ContextLayer>,
    #[serde(default)]
    pub base_map: BaseMapProvider,
    /// Background image used when remote tiles are unavailable.
    #[serde(default)]
    pub fallback_background: Option<PathBuf>,
    #[serde(default = "default_opacity")]
    pub map_opacity: f32,
    #[serde(default)]
    pub highlight_color: Option<String>,
    /// Restricts the batch to these unit ids, in this order.
    #[serde(default)]
    pub unit_ids: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub prefer_premium_charts: bool,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_classes() -> usize {
    DEFAULT_CLASSES
}

fn default_dpi() -> u32 {
    300
}

fn default_opacity() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

impl ReportConfig {
    /// Starts a builder for a config over `indicators` writing to `output_dir`.
    pub fn builder<I, S>(indicators: I, output_dir: impl Into<PathBuf>) -> ReportConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReportConfigBuilder::new(indicators, output_dir)
    }

    /// The indicator that drives classification, legend and map colors.
    pub fn primary_indicator(&self) -> Option<&str> {
        self.indicators.first().map(String::as_str)
    }

    /// Label used for the indicator in titles and legends.
    pub fn indicator_label(&self) -> &str {
        match self.indicator_alias.as_deref() {
            Some(alias) if !alias.trim().is_empty() => alias,
            _ => self.primary_indicator().unwrap_or_default(),
        }
    }

    /// Checks every field and fails on the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_data()?;
        self.validate_style()?;
        self.validate_output()
    }

    /// Checks the indicator selection.
    pub fn validate_data(&self) -> Result<(), ValidationError> {
        if self.indicators.is_empty() {
            return Err(ValidationError::new(
                "indicators",
                "at least one indicator field is required",
            ));
        }
        let mut seen = HashSet::new();
        for indicator in &self.indicators {
            if indicator.trim().is_empty() {
                return Err(ValidationError::new(
                    "indicators",
                    "indicator names must not be blank",
                ));
            }
            if !seen.insert(indicator.as_str()) {
                return Err(ValidationError::new(
                    "indicators",
                    format!("indicator '{}' is listed twice", indicator),
                ));
            }
        }
        if let Some(ids) = &self.unit_ids {
            if ids.is_empty() {
                return Err(ValidationError::new(
                    "unit_ids",
                    "an explicit unit subset must not be empty",
                ));
            }
            let mut listed = HashSet::new();
            if let Some(id) = ids.iter().find(|id| !listed.insert(id.as_str())) {
                return Err(ValidationError::new(
                    "unit_ids",
                    format!("unit '{}' is listed twice", id),
                ));
            }
        }
        Ok(())
    }

    /// Checks classification, colors and map layers.
    pub fn validate_style(&self) -> Result<(), ValidationError> {
        if !(MIN_CLASSES..=MAX_CLASSES).contains(&self.classes) {
            return Err(ValidationError::new(
                "classes",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_CLASSES, MAX_CLASSES, self.classes
                ),
            ));
        }
        validate_opacity("map_opacity", self.map_opacity)?;
        validate_color("highlight_color", self.highlight_color.as_deref())?;
        for (index, layer) in self.context_layers.iter().enumerate() {
            if layer.layer.trim().is_empty() {
                return Err(ValidationError::new(
                    format!("context_layers[{}].layer", index),
                    "layer reference must not be blank",
                ));
            }
            validate_opacity(&format!("context_layers[{}].opacity", index), layer.opacity)?;
        }
        if self.probe_timeout_ms == 0 {
            return Err(ValidationError::new(
                "probe_timeout_ms",
                "probe timeout must be positive",
            ));
        }
        Ok(())
    }

    /// Checks output format, resolution, destination and branding.
    pub fn validate_output(&self) -> Result<(), ValidationError> {
        if !(MIN_DPI..=MAX_DPI).contains(&self.dpi) {
            return Err(ValidationError::new(
                "dpi",
                format!(
                    "DPI must be between {} and {}, got {}",
                    MIN_DPI, MAX_DPI, self.dpi
                ),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ValidationError::new(
                "output_dir",
                "destination directory is required",
            ));
        }
        validate_color("branding.header_color", self.branding.header_color.as_deref())?;
        validate_color("branding.footer_color", self.branding.footer_color.as_deref())?;
        if let Some(logo) = &self.branding.logo_path {
            validate_existing_file("branding.logo_path", logo)?;
        }
        if let Some(background) = &self.fallback_background {
            validate_existing_file("fallback_background", background)?;
        }
        Ok(())
    }
}

fn validate_opacity(field: &str, opacity: f32) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&opacity) {
        return Err(ValidationError::new(
            field,
            format!("opacity must be between 0 and 1, got {}", opacity),
        ));
    }
    Ok(())
}

fn validate_color(field: &str, color: Option<&str>) -> Result<(), ValidationError> {
    match color {
        Some(value) if parse_hex_color(value).is_none() => Err(ValidationError::new(
            field,
            format!("'{}' is not a #RRGGBB color", value),
        )),
        _ => Ok(()),
    }
}

fn validate_existing_file(field: &str, path: &Path) -> Result<(), ValidationError> {
    if !path.is_file() {
        return Err(ValidationError::new(
            field,
            format!("file not found at {}", path.display()),
        ));
    }
    Ok(())
}

/// Parses a `#RRGGBB` color into its channels.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Builder for [`ReportConfig`] values.
///
/// Every setter is infallible; [`ReportConfigBuilder::build`] runs the full
/// validation and returns the first problem it finds.
#[derive(Clone, Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    /// Creates a builder with defaults for everything but indicators and destination.
    pub fn new<I, S>(indicators: I, output_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config: ReportConfig {
                indicators: indicators.into_iter().map(Into::into).collect(),
                indicator_alias: None,
                classes: DEFAULT_CLASSES,
                classification: ClassificationMethod::default(),
                color_ramp: ColorRamp::default(),
                template: TemplateKind::default(),
                output_format: OutputFormat::default(),
                dpi: default_dpi(),
                output_dir: output_dir.into(),
                language: Language::default(),
                branding: Branding::default(),
                context_layers: Vec::new(),
                base_map: BaseMapProvider::default(),
                fallback_background: None,
                map_opacity: 1.0,
                highlight_color: None,
                unit_ids: None,
                prefer_premium_charts: true,
                probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            },
        }
    }

    pub fn indicator_alias(mut self, alias: impl Into<String>) -> Self {
        self.config.indicator_alias = Some(alias.into());
        self
    }

    pub fn classes(mut self, classes: usize) -> Self {
        self.config.classes = classes;
        self
    }

    pub fn classification(mut self, method: ClassificationMethod) -> Self {
        self.config.classification = method;
        self
    }

    pub fn color_ramp(mut self, ramp: ColorRamp) -> Self {
        self.config.color_ramp = ramp;
        self
    }

    pub fn template(mut self, template: TemplateKind) -> Self {
        self.config.template = template;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.config.language = language;
        self
    }

    pub fn branding(mut self, branding: Branding) -> Self {
        self.config.branding = branding;
        self
    }

    pub fn context_layer(mut self, layer: ContextLayer) -> Self {
        self.config.context_layers.push(layer);
        self
    }

    pub fn base_map(mut self, provider: BaseMapProvider) -> Self {
        self.config.base_map = provider;
        self
    }

    pub fn fallback_background(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.fallback_background = Some(path.into());
        self
    }

    pub fn map_opacity(mut self, opacity: f32) -> Self {
        self.config.map_opacity = opacity;
        self
    }

    pub fn highlight_color(mut self, color: impl Into<String>) -> Self {
        self.config.highlight_color = Some(color.into());
        self
    }

    pub fn unit_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.unit_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn prefer_premium_charts(mut self, prefer: bool) -> Self {
        self.config.prefer_premium_charts = prefer;
        self
    }

    pub fn probe_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.probe_timeout_ms = timeout_ms;
        self
    }

    /// Returns the configuration without validating it.
    pub(crate) fn into_unchecked(self) -> ReportConfig {
        self.config
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<ReportConfig, ValidationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ReportConfigBuilder {
        ReportConfig::builder(["population"], "out")
    }

    #[test]
    fn defaults_pass_validation() {
        let config = builder().build().expect("defaults are valid");
        assert_eq!(config.classes, DEFAULT_CLASSES);
        assert_eq!(config.primary_indicator(), Some("population"));
        assert_eq!(config.indicator_label(), "population");
    }

    #[test]
    fn dpi_outside_bounds_is_rejected() {
        for dpi in [71, 1201] {
            let err = builder().dpi(dpi).build().unwrap_err();
            assert_eq!(err.field, "dpi");
        }
        assert!(builder().dpi(72).build().is_ok());
        assert!(builder().dpi(1200).build().is_ok());
    }

    #[test]
    fn malformed_colors_are_rejected() {
        let err = builder().highlight_color("magenta").build().unwrap_err();
        assert_eq!(err.field, "highlight_color");

        let branding = Branding {
            header_color: Some("#12345".into()),
            ..Branding::default()
        };
        let err = builder().branding(branding).build().unwrap_err();
        assert_eq!(err.field, "branding.header_color");
    }

    #[test]
    fn empty_and_duplicate_indicators_are_rejected() {
        let empty: [&str; 0] = [];
        let err = ReportConfig::builder(empty, "out").build().unwrap_err();
        assert_eq!(err.field, "indicators");

        let err = ReportConfig::builder(["a", "a"], "out").build().unwrap_err();
        assert!(err.message.contains("twice"));
    }

    #[test]
    fn unit_subset_must_list_each_unit_once() {
        let empty: [&str; 0] = [];
        let err = builder().unit_ids(empty).build().unwrap_err();
        assert_eq!(err.field, "unit_ids");

        let err = builder().unit_ids(["13101", "13102", "13101"]).build().unwrap_err();
        assert_eq!(err.field, "unit_ids");
        assert!(err.message.contains("'13101'"));

        assert!(builder().unit_ids(["13101", "13102"]).build().is_ok());
    }

    #[test]
    fn missing_logo_file_is_rejected() {
        let branding = Branding {
            logo_path: Some(PathBuf::from("/definitely/not/here.png")),
            ..Branding::default()
        };
        let err = builder().branding(branding).build().unwrap_err();
        assert_eq!(err.field, "branding.logo_path");
    }

    #[test]
    fn context_layer_opacity_is_bounded() {
        let err = builder()
            .context_layer(ContextLayer::new("roads").with_opacity(1.5))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "context_layers[0].opacity");
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#1B2838"), Some([0x1b, 0x28, 0x38]));
        assert_eq!(parse_hex_color("1B2838"), None);
        assert_eq!(parse_hex_color("#GG0000"), None);
    }

    #[test]
    fn alias_overrides_indicator_label() {
        let config = builder().indicator_alias("Total population").build().unwrap();
        assert_eq!(config.indicator_label(), "Total population");
    }

    #[test]
    fn config_deserializes_from_toml_with_defaults() {
        let config: ReportConfig = toml::from_str(
            r#"
indicators = ["pop"]
output_dir = "reports"
output_format = "png"
template = "academic"
base_map = "open_street_map"
"#,
        )
        .expect("valid toml");

        assert_eq!(config.output_format, OutputFormat::Png);
        assert_eq!(config.template, TemplateKind::Academic);
        assert_eq!(config.base_map, BaseMapProvider::OpenStreetMap);
        assert_eq!(config.dpi, 300);
        assert!(config.prefer_premium_charts);
        config.validate().expect("deserialized config is valid");
    }
}
