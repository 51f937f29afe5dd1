//! Detection and masking of columns that identify people.

use crate::utils::series_to_strings;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::info;

/// Replacement written over every non-blank sensitive cell.
pub const ANONYMIZED: &str = "<ANONIMIZADO>";

/// Header fragments naming personal data.
const NAME_FRAGMENTS: &[&str] = &["CPF", "NOME", "ENDERECO", "EMAIL", "TELEFONE", "CELULAR"];

/// Header tokens too short to match as fragments.
const NAME_TOKENS: &[&str] = &["RG"];

/// Values inspected per column when looking for CPF numbers.
const VALUE_SAMPLE: usize = 200;

static CPF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{3}\.?\d{3}\.?\d{3}-?\d{2}$").expect("Invalid regex: CPF")
});

fn sensitive_header(name: &str) -> bool {
    let upper = name.to_uppercase();
    NAME_FRAGMENTS.iter().any(|f| upper.contains(f))
        || upper
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| NAME_TOKENS.contains(&token))
}

fn holds_cpf_values(series: &Series) -> PolarsResult<bool> {
    Ok(series_to_strings(series)?
        .into_iter()
        .flatten()
        .take(VALUE_SAMPLE)
        .any(|v| CPF_PATTERN.is_match(v.trim())))
}

/// Columns whose header names personal data, followed by text columns whose
/// first non-null values include a CPF number. Each group keeps table order.
pub fn detect_sensitive_columns(df: &DataFrame) -> PolarsResult<Vec<String>> {
    let mut by_header = Vec::new();
    let mut by_value = Vec::new();
    for col in df.get_columns() {
        let name = col.name().to_string();
        if sensitive_header(&name) {
            by_header.push(name);
        } else if col.dtype() == &DataType::String
            && holds_cpf_values(col.as_materialized_series())?
        {
            by_value.push(name);
        }
    }
    by_header.extend(by_value);
    Ok(by_header)
}

/// Copy of `df` with every non-blank cell of `columns` masked.
///
/// Names not present in the table are ignored. Nulls and blank cells are
/// kept so the masked table still shows where data was missing.
pub fn anonymize(df: &DataFrame, columns: &[String]) -> PolarsResult<DataFrame> {
    let mut out = df.clone();
    for name in columns {
        let Ok(col) = df.column(name) else {
            continue;
        };
        let masked: Vec<Option<String>> = series_to_strings(col.as_materialized_series())?
            .into_iter()
            .map(|v| match v {
                Some(s) if !s.trim().is_empty() => Some(ANONYMIZED.to_string()),
                other => other,
            })
            .collect();
        out.replace(name, Series::new(name.as_str().into(), masked))?;
    }
    if !columns.is_empty() {
        info!("Anonymized {} column(s): {:?}", columns.len(), columns);
    }
    Ok(out)
}
