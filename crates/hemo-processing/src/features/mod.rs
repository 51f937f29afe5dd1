//! Feature engineering for anomaly scoring.
//!
//! The [`FeatureTransformer`] projects a normalized table onto a numeric
//! [`FeatureMatrix`]. Categorical fields are label-encoded (not one-hot) after
//! missing values are mapped to an explicit category; numeric fields are
//! median-imputed.
//!
//! | Feature | Derived from |
//! |---|---|
//! | `TIPO_REACAO_COD` | reaction type, label-encoded |
//! | `GRAU_RISCO_COD` | risk grade, label-encoded |
//! | `IDADE_NUM` | patient age, or age-band midpoint |
//! | `GRAU_RISCO_NUM` | risk grade ordinal 1-4 |
//! | `TEMPO_NOTIFICACAO_DIAS` | notification minus occurrence, whole days |
//! | `MES_OCORRENCIA` / `DIA_SEMANA` / `HORA_OCORRENCIA` | occurrence timestamp |

mod encoding;
mod matrix;

pub use encoding::{LabelEncoder, age_band_midpoint, risk_grade_ordinal};
pub use matrix::FeatureMatrix;

use crate::config::FeatureSet;
use crate::error::{PipelineError, Result};
use crate::imputers::StatisticalImputer;
use crate::schema::{
    NOTIFICATION_DATE, OCCURRENCE_DATE, PATIENT_AGE, PATIENT_AGE_BAND, REACTION_TYPE,
    RISK_GRADE, UNSPECIFIED,
};
use crate::utils::{is_datetime_dtype, series_to_datetimes, series_to_f64, series_to_strings};
use chrono::{Datelike, NaiveDateTime, Timelike};
use polars::prelude::*;
use tracing::{debug, info, warn};

pub const REACTION_TYPE_CODE: &str = "TIPO_REACAO_COD";
pub const RISK_GRADE_CODE: &str = "GRAU_RISCO_COD";
pub const AGE: &str = "IDADE_NUM";
pub const RISK_GRADE_ORDINAL: &str = "GRAU_RISCO_NUM";
pub const NOTIFICATION_DELAY_DAYS: &str = "TEMPO_NOTIFICACAO_DIAS";
pub const OCCURRENCE_MONTH: &str = "MES_OCORRENCIA";
pub const OCCURRENCE_WEEKDAY: &str = "DIA_SEMANA";
pub const OCCURRENCE_HOUR: &str = "HORA_OCORRENCIA";

/// Features every scorer run can rely on.
pub const CORE_FEATURES: [&str; 3] = [REACTION_TYPE_CODE, RISK_GRADE_CODE, AGE];

/// Core features plus the ordinal and temporal features.
pub const EXTENDED_FEATURES: [&str; 8] = [
    REACTION_TYPE_CODE,
    RISK_GRADE_CODE,
    AGE,
    RISK_GRADE_ORDINAL,
    NOTIFICATION_DELAY_DAYS,
    OCCURRENCE_MONTH,
    OCCURRENCE_WEEKDAY,
    OCCURRENCE_HOUR,
];

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Output of a transform pass.
#[derive(Debug, Clone)]
pub struct FeatureOutput {
    pub matrix: FeatureMatrix,
    /// Requested features that could not be derived from the table.
    pub skipped: Vec<String>,
    pub processing_steps: Vec<String>,
}

/// Projects normalized tables onto numeric feature matrices.
#[derive(Debug, Clone, Default)]
pub struct FeatureTransformer {
    selection: FeatureSet,
}

impl FeatureTransformer {
    pub fn new(selection: FeatureSet) -> Self {
        Self { selection }
    }

    /// Feature names requested by the configured selection, in output order.
    pub fn requested(&self) -> Vec<String> {
        match &self.selection {
            FeatureSet::Core => CORE_FEATURES.iter().map(|s| s.to_string()).collect(),
            FeatureSet::Extended => EXTENDED_FEATURES.iter().map(|s| s.to_string()).collect(),
            FeatureSet::Custom(names) => names.iter().map(|s| s.trim().to_uppercase()).collect(),
        }
    }

    /// Features the given table has the source columns for.
    pub fn derivable(df: &DataFrame) -> Vec<&'static str> {
        EXTENDED_FEATURES
            .into_iter()
            .filter(|name| is_derivable(df, name))
            .collect()
    }

    /// Build the feature matrix for a normalized table.
    ///
    /// # Errors
    ///
    /// `NoFeaturesAvailable` when none of the requested features can be
    /// derived from the table's columns.
    pub fn transform(&self, df: &DataFrame) -> Result<FeatureMatrix> {
        Ok(self.transform_with_report(df)?.matrix)
    }

    /// Build the feature matrix and report skipped features and imputations.
    pub fn transform_with_report(&self, df: &DataFrame) -> Result<FeatureOutput> {
        let requested = self.requested();
        let mut processing_steps = Vec::new();
        let mut names = Vec::new();
        let mut columns = Vec::new();
        let mut skipped = Vec::new();

        for name in &requested {
            if !is_derivable(df, name) {
                skipped.push(name.clone());
                continue;
            }
            let column = derive_feature(df, name, &mut processing_steps)?;
            names.push(name.clone());
            columns.push(column);
        }

        if names.is_empty() {
            return Err(PipelineError::NoFeaturesAvailable { requested });
        }
        if !skipped.is_empty() {
            warn!("Features not derivable from this table: {:?}", skipped);
        }

        let matrix = FeatureMatrix::from_columns(names, columns)?;
        info!(
            "Built feature matrix: {} rows x {} features",
            matrix.n_rows(),
            matrix.n_features()
        );
        for step in &processing_steps {
            debug!("{step}");
        }

        Ok(FeatureOutput {
            matrix,
            skipped,
            processing_steps,
        })
    }
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

fn has_datetime(df: &DataFrame, name: &str) -> bool {
    df.column(name)
        .map(|c| is_datetime_dtype(c.dtype()))
        .unwrap_or(false)
}

fn is_derivable(df: &DataFrame, feature: &str) -> bool {
    match feature {
        REACTION_TYPE_CODE => has_column(df, REACTION_TYPE),
        RISK_GRADE_CODE | RISK_GRADE_ORDINAL => has_column(df, RISK_GRADE),
        AGE => has_column(df, PATIENT_AGE) || has_column(df, PATIENT_AGE_BAND),
        NOTIFICATION_DELAY_DAYS => {
            has_datetime(df, OCCURRENCE_DATE) && has_datetime(df, NOTIFICATION_DATE)
        }
        OCCURRENCE_MONTH | OCCURRENCE_WEEKDAY | OCCURRENCE_HOUR => {
            has_datetime(df, OCCURRENCE_DATE)
        }
        _ => false,
    }
}

fn derive_feature(df: &DataFrame, feature: &str, steps: &mut Vec<String>) -> Result<Vec<f64>> {
    let values: Vec<Option<f64>> = match feature {
        REACTION_TYPE_CODE => return encode_categorical(df, REACTION_TYPE, feature, steps),
        RISK_GRADE_CODE => return encode_categorical(df, RISK_GRADE, feature, steps),
        AGE => patient_age(df)?,
        RISK_GRADE_ORDINAL => column_strings(df, RISK_GRADE)?
            .iter()
            .map(|v| v.as_deref().and_then(risk_grade_ordinal))
            .collect(),
        NOTIFICATION_DELAY_DAYS => {
            let occurred = column_datetimes(df, OCCURRENCE_DATE)?;
            let notified = column_datetimes(df, NOTIFICATION_DATE)?;
            occurred
                .iter()
                .zip(&notified)
                .map(|(o, n)| match (o, n) {
                    (Some(o), Some(n)) => Some(delay_days(*o, *n)),
                    _ => None,
                })
                .collect()
        }
        OCCURRENCE_MONTH => occurrence_part(df, |dt| dt.month() as f64)?,
        OCCURRENCE_WEEKDAY => occurrence_part(df, |dt| dt.weekday().num_days_from_monday() as f64)?,
        OCCURRENCE_HOUR => occurrence_part(df, |dt| dt.hour() as f64)?,
        other => {
            return Err(PipelineError::NoFeaturesAvailable {
                requested: vec![other.to_string()],
            });
        }
    };
    Ok(StatisticalImputer::fill_numeric_median(feature, &values, steps))
}

fn encode_categorical(
    df: &DataFrame,
    source: &str,
    feature: &str,
    steps: &mut Vec<String>,
) -> Result<Vec<f64>> {
    let filled = StatisticalImputer::fill_categorical(
        source,
        column_strings(df, source)?,
        UNSPECIFIED,
        steps,
    );
    let (encoder, codes) = LabelEncoder::fit_transform(&filled);
    steps.push(format!(
        "Label-encoded '{}' into '{}' ({} classes)",
        source,
        feature,
        encoder.n_classes()
    ));
    Ok(codes)
}

/// Numeric age, taken from the age column or estimated from the age band.
fn patient_age(df: &DataFrame) -> Result<Vec<Option<f64>>> {
    if let Ok(col) = df.column(PATIENT_AGE) {
        return Ok(series_to_f64(col.as_materialized_series())?);
    }
    Ok(column_strings(df, PATIENT_AGE_BAND)?
        .iter()
        .map(|v| v.as_deref().and_then(age_band_midpoint))
        .collect())
}

fn occurrence_part(df: &DataFrame, part: impl Fn(&NaiveDateTime) -> f64) -> Result<Vec<Option<f64>>> {
    Ok(column_datetimes(df, OCCURRENCE_DATE)?
        .iter()
        .map(|v| v.as_ref().map(&part))
        .collect())
}

/// Whole days from occurrence to notification, floored like a calendar
/// difference (negative when notified first).
fn delay_days(occurred: NaiveDateTime, notified: NaiveDateTime) -> f64 {
    let millis = (notified - occurred).num_milliseconds();
    millis.div_euclid(MILLIS_PER_DAY) as f64
}

fn column_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    Ok(series_to_strings(df.column(name)?.as_materialized_series())?)
}

fn column_datetimes(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    Ok(series_to_datetimes(df.column(name)?.as_materialized_series())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::ColumnNormalizer;

    fn normalized() -> DataFrame {
        let raw = df!(
            "TIPO_REACAO_TRANSFUSIONAL" => &[Some("Febril"), Some("Alérgica"), None, Some("Febril")],
            "GRAU_RISCO" => &[Some("Grau I   - Leve"), Some("Grau IV  - Óbito"), Some("Grau I   - Leve"), None],
            "IDADE_PACIENTE" => &[Some("30"), None, Some("50"), Some("40,0")],
            "DATA_OCORRENCIA_EVENTO" => &[Some("01/03/2021 10:00:00"), Some("02/03/2021 23:30:00"), None, Some("06/03/2021")],
            "DATA_NOTIFICACAO_EVENTO" => &[Some("03/03/2021 09:00:00"), Some("02/03/2021 23:45:00"), Some("10/03/2021"), Some("05/03/2021")]
        )
        .unwrap();
        ColumnNormalizer::new().normalize(&raw).unwrap()
    }

    fn column(matrix: &FeatureMatrix, name: &str) -> Vec<f64> {
        let j = matrix.names().iter().position(|n| n == name).unwrap();
        (0..matrix.n_rows()).map(|i| matrix.value(i, j)).collect()
    }

    #[test]
    fn test_core_features() {
        let matrix = FeatureTransformer::new(FeatureSet::Core)
            .transform(&normalized())
            .unwrap();

        assert_eq!(matrix.names(), &CORE_FEATURES.map(String::from));
        // Alérgica < Febril < NAO INFORMADO
        assert_eq!(column(&matrix, REACTION_TYPE_CODE), vec![1.0, 0.0, 2.0, 1.0]);
        // Grau I < Grau IV < NAO INFORMADO
        assert_eq!(column(&matrix, RISK_GRADE_CODE), vec![0.0, 1.0, 0.0, 2.0]);
        // Missing age takes the median of 30, 50, 40
        assert_eq!(column(&matrix, AGE), vec![30.0, 40.0, 50.0, 40.0]);
    }

    #[test]
    fn test_extended_features() {
        let matrix = FeatureTransformer::new(FeatureSet::Extended)
            .transform(&normalized())
            .unwrap();

        assert_eq!(matrix.n_features(), EXTENDED_FEATURES.len());
        // Grade ordinal; the missing grade takes the median of 1, 4, 1
        assert_eq!(column(&matrix, RISK_GRADE_ORDINAL), vec![1.0, 4.0, 1.0, 1.0]);
        // 1 day 23h floors to 1; 15 minutes floors to 0; missing occurrence
        // takes the median; notified a day early floors to -1
        assert_eq!(
            column(&matrix, NOTIFICATION_DELAY_DAYS),
            vec![1.0, 0.0, 0.0, -1.0]
        );
        // The missing occurrence hour takes the median of 10, 23, 0
        assert_eq!(column(&matrix, OCCURRENCE_HOUR), vec![10.0, 23.0, 10.0, 0.0]);
        // 2021-03-01 was a Monday
        assert_eq!(column(&matrix, OCCURRENCE_WEEKDAY)[0], 0.0);
    }

    #[test]
    fn test_age_from_band_when_age_missing() {
        let raw = df!(
            "FAIXA_ETARIA_PACIENTE" => &["20 a 29 anos", "80 anos ou mais"],
            "GRAU_RISCO" => &["Grau I", "Grau II"]
        )
        .unwrap();
        let matrix = FeatureTransformer::default().transform(&raw).unwrap();
        assert_eq!(column(&matrix, AGE), vec![24.5, 80.0]);
    }

    #[test]
    fn test_partial_intersection_skips_missing_sources() {
        let raw = df!("GRAU_RISCO" => &["Grau I", "Grau II"], "UF_NOTIFICACAO" => &["SP", "RJ"]).unwrap();
        let output = FeatureTransformer::default()
            .transform_with_report(&raw)
            .unwrap();
        assert_eq!(output.matrix.names(), &[RISK_GRADE_CODE.to_string()]);
        assert_eq!(output.skipped, vec![REACTION_TYPE_CODE.to_string(), AGE.to_string()]);
    }

    #[test]
    fn test_no_features_available() {
        let raw = df!("UF_NOTIFICACAO" => &["SP"], "CIDADE" => &["Santos"]).unwrap();
        let err = FeatureTransformer::default().transform(&raw).unwrap_err();
        assert!(matches!(err, PipelineError::NoFeaturesAvailable { .. }));
    }

    #[test]
    fn test_custom_selection_is_case_insensitive() {
        let transformer =
            FeatureTransformer::new(FeatureSet::Custom(vec!["grau_risco_num".to_string()]));
        let matrix = transformer.transform(&normalized()).unwrap();
        assert_eq!(matrix.names(), &[RISK_GRADE_ORDINAL.to_string()]);
    }

    #[test]
    fn test_derivable_features() {
        let derivable = FeatureTransformer::derivable(&normalized());
        assert_eq!(derivable, EXTENDED_FEATURES.to_vec());
    }
}
