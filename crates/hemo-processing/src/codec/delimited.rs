//! Semicolon-delimited, ISO-8859-1 tables.
//!
//! Both the upstream publisher and every on-disk tier use this format, so
//! reading, tier persistence and consumer export all go through here.

use super::latin1;
use crate::error::{PipelineError, Result};
use crate::schema::EXPORT_DATETIME_FORMAT;
use crate::utils::{is_datetime_dtype, series_to_datetimes};
use polars::prelude::*;
use std::io::Cursor;

pub const SEPARATOR: u8 = b';';
const QUOTE: u8 = b'"';

/// Parse ISO-8859-1 bytes into a table of string columns.
///
/// Rows with extra fields are truncated to the header width. Content without
/// a header, or whose header has a single field, is not a delimited table and
/// fails with `ParseFailure`.
pub fn read_table(bytes: &[u8], origin: &str) -> Result<DataFrame> {
    let text = latin1::decode(bytes);
    let Some(header) = text.lines().find(|line| !line.trim().is_empty()) else {
        return Err(PipelineError::parse(origin, "content is empty"));
    };
    if !header.contains(SEPARATOR as char) {
        return Err(PipelineError::parse(
            origin,
            "header has no ';' separator",
        ));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(SEPARATOR)
                .with_quote_char(Some(QUOTE))
                .with_truncate_ragged_lines(true),
        )
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()
        .map_err(|e| PipelineError::parse_with_source(origin, e))?;

    Ok(df)
}

/// Serialize a table as ISO-8859-1, `;`-delimited text with a header.
///
/// Datetime columns are written day-first (`dd/mm/yyyy HH:MM:SS`) so they
/// parse back through the normalizer. Output is deterministic for a given
/// table.
pub fn write_table(df: &DataFrame) -> Result<Vec<u8>> {
    let mut out = df.clone();
    let datetime_columns: Vec<String> = out
        .get_columns()
        .iter()
        .filter(|c| is_datetime_dtype(c.dtype()))
        .map(|c| c.name().to_string())
        .collect();

    for name in &datetime_columns {
        let series = out.column(name)?.as_materialized_series().clone();
        let formatted: Vec<Option<String>> = series_to_datetimes(&series)?
            .into_iter()
            .map(|v| v.map(|dt| dt.format(EXPORT_DATETIME_FORMAT).to_string()))
            .collect();
        out.replace(name, Series::new(name.as_str().into(), formatted))?;
    }

    let mut buf: Vec<u8> = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .with_separator(SEPARATOR)
        .with_quote_char(QUOTE)
        .finish(&mut out)?;

    let text = String::from_utf8(buf)
        .map_err(|e| PipelineError::parse("serialized table", e.to_string()))?;
    Ok(latin1::encode(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::datetimes_to_series;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_latin1_semicolon_table() {
        let mut bytes = b"UF_NOTIFICACAO;GRAU_RISCO\nSP;Grau IV  - \xD3bito\nRJ;Grau I   - Leve\n".to_vec();
        bytes.extend_from_slice(b"MG;\n");
        let df = read_table(&bytes, "test").unwrap();

        assert_eq!(df.shape(), (3, 2));
        let grades: Vec<Option<&str>> = df
            .column("GRAU_RISCO")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            grades,
            vec![Some("Grau IV  - Óbito"), Some("Grau I   - Leve"), None]
        );
    }

    #[test]
    fn test_read_truncates_ragged_rows() {
        let bytes = b"A;B\n1;2;3\n4;5\n";
        let df = read_table(bytes, "ragged").unwrap();
        assert_eq!(df.shape(), (2, 2));
    }

    #[test]
    fn test_read_rejects_empty_and_undelimited_content() {
        let err = read_table(b"   \n\n", "blank").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_FAILURE");

        let err = read_table(b"<html>Service Unavailable</html>\n", "page").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_FAILURE");
    }

    #[test]
    fn test_header_only_table_has_zero_rows() {
        let df = read_table(b"A;B\n", "header").unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 2);
    }

    #[test]
    fn test_write_formats_dates_day_first() {
        let dt = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(10, 20, 30)
            .unwrap();
        let df = DataFrame::new(vec![
            Series::new("UF".into(), &["SP", "RJ"]).into(),
            datetimes_to_series("DATA_OCORRENCIA_EVENTO", &[Some(dt), None])
                .unwrap()
                .into(),
        ])
        .unwrap();

        let bytes = write_table(&df).unwrap();
        let text = latin1::decode(&bytes);
        assert_eq!(
            text,
            "UF;DATA_OCORRENCIA_EVENTO\nSP;04/03/2021 10:20:30\nRJ;\n"
        );
    }

    #[test]
    fn test_write_quotes_separator_and_encodes_latin1() {
        let df = df!("TXT" => &["a;b", "ação"], "N" => &["1", "2"]).unwrap();
        let bytes = write_table(&df).unwrap();
        assert!(bytes.windows(5).any(|w| w == b"\"a;b\""));
        // 'ç' and 'ã' are single bytes in ISO-8859-1
        assert!(bytes.contains(&0xE7));
        assert!(bytes.contains(&0xE3));

        let parsed = read_table(&bytes, "round trip").unwrap();
        assert!(parsed.equals_missing(&df));
    }
}
