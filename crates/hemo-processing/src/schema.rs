//! Canonical column names of the hemovigilance dataset.
//!
//! Names are the upper-case headers produced by the column normalizer.

/// Reaction occurrence timestamp; the primary date column.
pub const OCCURRENCE_DATE: &str = "DATA_OCORRENCIA_EVENTO";
/// Timestamp at which the event was notified.
pub const NOTIFICATION_DATE: &str = "DATA_NOTIFICACAO_EVENTO";
/// Two-letter state code of the notifying unit.
pub const REGION: &str = "UF_NOTIFICACAO";
/// Transfusion reaction category.
pub const REACTION_TYPE: &str = "TIPO_REACAO_TRANSFUSIONAL";
/// Risk grade, "Grau I - Leve" through "Grau IV - Óbito".
pub const RISK_GRADE: &str = "GRAU_RISCO";
pub const PATIENT_AGE: &str = "IDADE_PACIENTE";
pub const PATIENT_AGE_BAND: &str = "FAIXA_ETARIA_PACIENTE";

/// Derived calendar year of the event.
pub const YEAR: &str = "YEAR";
/// Derived calendar month of the event.
pub const MONTH: &str = "MONTH";
/// Anomaly label column, 1 for anomalous rows.
pub const ANOMALY_LABEL: &str = "ANOMALIAS";
/// Headers accepted as spellings of [`ANOMALY_LABEL`].
pub const ANOMALY_LABEL_ALIASES: [&str; 1] = ["ANOMALY_LABEL"];
/// Flag for rows whose occurrence is after their notification.
pub const INCONSISTENT_DATES: &str = "DATAS_INCONSISTENTES";

/// Value given to missing categorical cells before encoding.
pub const UNSPECIFIED: &str = "NAO INFORMADO";

/// Day-first layout used when writing timestamps back to delimited text.
pub const EXPORT_DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
