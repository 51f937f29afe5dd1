//! Statistical imputation methods.
//!
//! Feature columns are imputed before encoding: categorical gaps become an
//! explicit category, numeric gaps take the column median.

use crate::utils::median;

/// Statistical imputation methods for filling missing feature values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Fill missing categorical values with a constant category.
    pub fn fill_categorical(
        name: &str,
        values: Vec<Option<String>>,
        fill_value: &str,
        processing_steps: &mut Vec<String>,
    ) -> Vec<String> {
        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            processing_steps.push(format!(
                "Filled {} missing values in '{}' with '{}'",
                missing, name, fill_value
            ));
        }
        values
            .into_iter()
            .map(|v| v.unwrap_or_else(|| fill_value.to_string()))
            .collect()
    }

    /// Fill missing numeric values with the median of the present ones.
    ///
    /// When every value is missing the column is filled with 0.
    pub fn fill_numeric_median(
        name: &str,
        values: &[Option<f64>],
        processing_steps: &mut Vec<String>,
    ) -> Vec<f64> {
        let missing = values.iter().filter(|v| v.is_none()).count();
        let fill_value = match median(values) {
            Some(m) => m,
            None => {
                processing_steps.push(format!("'{}' has no values; filled with 0", name));
                0.0
            }
        };
        if missing > 0 && missing < values.len() {
            processing_steps.push(format!(
                "Filled {} missing values in '{}' with median: {:.2}",
                missing, name, fill_value
            ));
        }
        values.iter().map(|v| v.unwrap_or(fill_value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_categorical() {
        let mut steps = Vec::new();
        let filled = StatisticalImputer::fill_categorical(
            "GRAU_RISCO",
            vec![Some("Grau I".to_string()), None],
            "NAO INFORMADO",
            &mut steps,
        );
        assert_eq!(filled, vec!["Grau I", "NAO INFORMADO"]);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_fill_numeric_median() {
        let mut steps = Vec::new();
        let filled = StatisticalImputer::fill_numeric_median(
            "IDADE",
            &[Some(10.0), None, Some(30.0), Some(20.0)],
            &mut steps,
        );
        assert_eq!(filled, vec![10.0, 20.0, 30.0, 20.0]);
        assert!(steps[0].contains("median"));
    }

    #[test]
    fn test_fill_numeric_all_missing_uses_zero() {
        let mut steps = Vec::new();
        let filled = StatisticalImputer::fill_numeric_median("IDADE", &[None, None], &mut steps);
        assert_eq!(filled, vec![0.0, 0.0]);
    }
}
