//! Step-by-step assembly of a [`ReportConfig`].
//!
//! The wizard walks Data → Style → Output → Generate.  Each step is validated
//! when it is submitted, steps must be submitted in order, and going back keeps
//! what was entered.  Only a wizard in the `Generate` step yields a config.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::basemap::BaseMapProvider;
use crate::config::{
    Branding, ClassificationMethod, ContextLayer, Language, OutputFormat, ReportConfig,
    ReportConfigBuilder, TemplateKind, DEFAULT_CLASSES, DEFAULT_PROBE_TIMEOUT_MS,
};
use crate::error::ValidationError;
use crate::map::ColorRamp;

/// Position of the wizard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    Data,
    Style,
    Output,
    Generate,
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Data => "data",
            WizardStep::Style => "style",
            WizardStep::Output => "output",
            WizardStep::Generate => "generate",
        };
        f.write_str(name)
    }
}

/// Indicator selection and unit subset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStep {
    pub indicators: Vec<String>,
    #[serde(default)]
    pub indicator_alias: Option<String>,
    #[serde(default)]
    pub unit_ids: Option<Vec<String>>,
}

/// Classification, colors, base map and context layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleStep {
    pub classes: usize,
    pub classification: ClassificationMethod,
    pub color_ramp: ColorRamp,
    pub base_map: BaseMapProvider,
    pub fallback_background: Option<PathBuf>,
    pub map_opacity: f32,
    pub highlight_color: Option<String>,
    pub context_layers: Vec<ContextLayer>,
    pub probe_timeout_ms: u64,
}

impl Default for StyleStep {
    fn default() -> Self {
        Self {
            classes: DEFAULT_CLASSES,
            classification: ClassificationMethod::default(),
            color_ramp: ColorRamp::default(),
            base_map: BaseMapProvider::default(),
            fallback_background: None,
            map_opacity: 1.0,
            highlight_color: None,
            context_layers: Vec::new(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

/// Template, format, destination and branding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputStep {
    pub template: TemplateKind,
    pub output_format: OutputFormat,
    pub dpi: u32,
    pub output_dir: PathBuf,
    pub language: Language,
    pub branding: Branding,
    pub prefer_premium_charts: bool,
}

impl Default for OutputStep {
    fn default() -> Self {
        Self {
            template: TemplateKind::default(),
            output_format: OutputFormat::default(),
            dpi: 300,
            output_dir: PathBuf::from("output"),
            language: Language::default(),
            branding: Branding::default(),
            prefer_premium_charts: true,
        }
    }
}

/// State machine producing a validated [`ReportConfig`].
#[derive(Clone, Debug)]
pub struct ConfigWizard {
    step: WizardStep,
    draft: ReportConfig,
}

impl Default for ConfigWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::Data,
            draft: ReportConfigBuilder::new(Vec::<String>::new(), PathBuf::new()).into_unchecked(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    /// Configuration entered so far, not necessarily valid.
    pub fn draft(&self) -> &ReportConfig {
        &self.draft
    }

    fn expect(&self, step: WizardStep) -> Result<(), ValidationError> {
        if self.step != step {
            return Err(ValidationError::new(
                "wizard",
                format!("cannot submit the {} step while at the {} step", step, self.step),
            ));
        }
        Ok(())
    }

    pub fn submit_data(&mut self, data: DataStep) -> Result<WizardStep, ValidationError> {
        self.expect(WizardStep::Data)?;
        let mut draft = self.draft.clone();
        draft.indicators = data.indicators;
        draft.indicator_alias = data.indicator_alias;
        draft.unit_ids = data.unit_ids;
        draft.validate_data()?;
        self.draft = draft;
        self.step = WizardStep::Style;
        Ok(self.step)
    }

    pub fn submit_style(&mut self, style: StyleStep) -> Result<WizardStep, ValidationError> {
        self.expect(WizardStep::Style)?;
        let mut draft = self.draft.clone();
        draft.classes = style.classes;
        draft.classification = style.classification;
        draft.color_ramp = style.color_ramp;
        draft.base_map = style.base_map;
        draft.fallback_background = style.fallback_background;
        draft.map_opacity = style.map_opacity;
        draft.highlight_color = style.highlight_color;
        draft.context_layers = style.context_layers;
        draft.probe_timeout_ms = style.probe_timeout_ms;
        draft.validate_style()?;
        self.draft = draft;
        self.step = WizardStep::Output;
        Ok(self.step)
    }

    pub fn submit_output(&mut self, output: OutputStep) -> Result<WizardStep, ValidationError> {
        self.expect(WizardStep::Output)?;
        let mut draft = self.draft.clone();
        draft.template = output.template;
        draft.output_format = output.output_format;
        draft.dpi = output.dpi;
        draft.output_dir = output.output_dir;
        draft.language = output.language;
        draft.branding = output.branding;
        draft.prefer_premium_charts = output.prefer_premium_charts;
        draft.validate_output()?;
        self.draft = draft;
        self.step = WizardStep::Generate;
        Ok(self.step)
    }

    /// Returns to the previous step; a no-op at the first one.
    pub fn back(&mut self) -> WizardStep {
        self.step = match self.step {
            WizardStep::Data | WizardStep::Style => WizardStep::Data,
            WizardStep::Output => WizardStep::Style,
            WizardStep::Generate => WizardStep::Output,
        };
        self.step
    }

    /// Re-validates the whole draft and hands it out.
    pub fn finish(self) -> Result<ReportConfig, ValidationError> {
        self.expect(WizardStep::Generate)?;
        self.draft.validate()?;
        Ok(self.draft)
    }
}
