//! Fixed report labels and number formatting per language.
//!
//! A [`Locale`] is handed explicitly to every component that prints text; there
//! is no process-wide language setting.

use crate::config::Language;

/// Fixed labels printed on maps, charts and pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Legend,
    Source,
    Page,
    Value,
    Rank,
    Percentile,
    Mean,
    StdDev,
    Deviation,
    Min,
    Max,
    Distribution,
    Ranking,
    Proportion,
    Summary,
    Of,
    NoData,
    Indicator,
}

/// Label and number formatting capability for one language.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Locale {
    language: Language,
}

impl Locale {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn label(&self, label: Label) -> &'static str {
        match self.language {
            Language::Es => match label {
                Label::Legend => "Leyenda",
                Label::Source => "Fuente",
                Label::Page => "Página",
                Label::Value => "Valor",
                Label::Rank => "Ranking",
                Label::Percentile => "Percentil",
                Label::Mean => "Media",
                Label::StdDev => "Desv. estándar",
                Label::Deviation => "Desviación (σ)",
                Label::Min => "Mínimo",
                Label::Max => "Máximo",
                Label::Distribution => "Distribución",
                Label::Ranking => "Ranking",
                Label::Proportion => "Proporción del total",
                Label::Summary => "Resumen",
                Label::Of => "de",
                Label::NoData => "Sin datos",
                Label::Indicator => "Indicador",
            },
            Language::En => match label {
                Label::Legend => "Legend",
                Label::Source => "Source",
                Label::Page => "Page",
                Label::Value => "Value",
                Label::Rank => "Rank",
                Label::Percentile => "Percentile",
                Label::Mean => "Mean",
                Label::StdDev => "Std. dev.",
                Label::Deviation => "Deviation (σ)",
                Label::Min => "Min",
                Label::Max => "Max",
                Label::Distribution => "Distribution",
                Label::Ranking => "Ranking",
                Label::Proportion => "Share of total",
                Label::Summary => "Summary",
                Label::Of => "of",
                Label::NoData => "No data",
                Label::Indicator => "Indicator",
            },
        }
    }

    fn separators(&self) -> (char, char) {
        match self.language {
            Language::Es => ('.', ','),
            Language::En => (',', '.'),
        }
    }

    /// Formats `value` with grouping separators.
    ///
    /// Integral values print without decimals, values of magnitude 100 or more
    /// with one decimal and smaller values with two.
    pub fn format_number(&self, value: f64) -> String {
        if !value.is_finite() {
            return "–".to_owned();
        }
        let decimals = if value.fract() == 0.0 && value.abs() < 1e15 {
            0
        } else if value.abs() >= 100.0 {
            1
        } else {
            2
        };
        self.format_fixed(value, decimals)
    }

    /// Formats `value` with exactly `decimals` fraction digits.
    pub fn format_fixed(&self, value: f64, decimals: usize) -> String {
        let (group, decimal) = self.separators();
        let rendered = format!("{:.*}", decimals, value.abs());
        let (integer, fraction) = match rendered.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (rendered.as_str(), None),
        };

        let mut grouped = String::with_capacity(rendered.len() + integer.len() / 3 + 1);
        if value < 0.0 && rendered.chars().any(|c| c.is_ascii_digit() && c != '0') {
            grouped.push('-');
        }
        for (index, digit) in integer.chars().enumerate() {
            if index > 0 && (integer.len() - index) % 3 == 0 {
                grouped.push(group);
            }
            grouped.push(digit);
        }
        if let Some(fraction) = fraction {
            grouped.push(decimal);
            grouped.push_str(fraction);
        }
        grouped
    }

    pub fn format_percent(&self, value: f64) -> String {
        format!("{}%", self.format_fixed(value, 1))
    }

    /// "3 of 12" style rank text.
    pub fn format_rank(&self, rank: usize, total: usize) -> String {
        format!("{} {} {}", rank, self.label(Label::Of), total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_group_per_language() {
        let es = Locale::new(Language::Es);
        let en = Locale::new(Language::En);

        assert_eq!(es.format_number(1234567.0), "1.234.567");
        assert_eq!(en.format_number(1234567.0), "1,234,567");
        assert_eq!(es.format_number(1234.5), "1.234,5");
        assert_eq!(en.format_number(-0.126), "-0.13");
        assert_eq!(en.format_number(999.0), "999");
        assert_eq!(en.format_fixed(-0.001, 1), "0.0");
    }

    #[test]
    fn labels_follow_language() {
        assert_eq!(Locale::new(Language::Es).label(Label::Legend), "Leyenda");
        assert_eq!(Locale::new(Language::En).label(Label::Legend), "Legend");
        assert_eq!(Locale::new(Language::En).format_rank(3, 12), "3 of 12");
        assert_eq!(Locale::new(Language::Es).format_percent(42.0), "42,0%");
    }
}
