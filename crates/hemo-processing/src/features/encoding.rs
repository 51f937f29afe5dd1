//! Categorical encoders and field parsers used by the feature transformer.

use crate::utils::parse_decimal;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

static RISK_GRADE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bgrau\s+(iv|iii|ii|i)\b").expect("Invalid regex: risk grade")
});

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("Invalid regex: number"));

/// Maps each distinct category to its rank in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: BTreeMap<String, usize>,
}

impl LabelEncoder {
    /// Learn the sorted class list from the values.
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        let classes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, class)| (class.to_string(), code))
            .collect();
        Self { classes }
    }

    pub fn code(&self, value: &str) -> Option<usize> {
        self.classes.get(value).copied()
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Fit on the values and encode them in one pass.
    pub fn fit_transform(values: &[String]) -> (Self, Vec<f64>) {
        let encoder = Self::fit(values.iter().map(String::as_str));
        let codes = values
            .iter()
            .map(|v| encoder.code(v).map_or(0.0, |c| c as f64))
            .collect();
        (encoder, codes)
    }
}

/// Ordinal 1-4 for "Grau I" .. "Grau IV" risk grades.
pub fn risk_grade_ordinal(value: &str) -> Option<f64> {
    let caps = RISK_GRADE_RE.captures(value)?;
    match caps.get(1)?.as_str().to_ascii_uppercase().as_str() {
        "I" => Some(1.0),
        "II" => Some(2.0),
        "III" => Some(3.0),
        "IV" => Some(4.0),
        _ => None,
    }
}

/// Representative age of a band such as "20 a 29 anos" (midpoint) or
/// "60 anos ou mais" (lower bound).
pub fn age_band_midpoint(value: &str) -> Option<f64> {
    let numbers: Vec<f64> = NUMBER_RE
        .find_iter(value)
        .filter_map(|m| parse_decimal(m.as_str()))
        .take(2)
        .collect();
    match numbers.as_slice() {
        [low, high] => Some((low + high) / 2.0),
        [only] => Some(*only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_encoder_sorted_codes() {
        let values = vec![
            "Febril".to_string(),
            "Alérgica".to_string(),
            "Febril".to_string(),
            "NAO INFORMADO".to_string(),
        ];
        let (encoder, codes) = LabelEncoder::fit_transform(&values);
        assert_eq!(encoder.n_classes(), 3);
        assert_eq!(codes, vec![1.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_risk_grade_ordinal() {
        assert_eq!(risk_grade_ordinal("Grau I   - Leve"), Some(1.0));
        assert_eq!(risk_grade_ordinal("Grau II  - Moderado"), Some(2.0));
        assert_eq!(risk_grade_ordinal("Grau III - Grave"), Some(3.0));
        assert_eq!(risk_grade_ordinal("Grau IV  - Óbito"), Some(4.0));
        assert_eq!(risk_grade_ordinal("NAO INFORMADO"), None);
    }

    #[test]
    fn test_age_band_midpoint() {
        assert_eq!(age_band_midpoint("20 a 29 anos"), Some(24.5));
        assert_eq!(age_band_midpoint("80 anos ou mais"), Some(80.0));
        assert_eq!(age_band_midpoint("Ignorada"), None);
    }
}
