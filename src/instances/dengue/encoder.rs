use serde::{Deserialize, Serialize};

use crate::core::component::ServiceError;

/// Categorical-to-integer encoder fitted once on the training data.
///
/// Codes are assigned in sorted order of the distinct values, so they are
/// stable across refits of the same dataset. Values never seen during
/// fitting are an error at transform time, not a silent new code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I>(values: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut classes: Vec<String> = values.into_iter().collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Integer code for a known category
    pub fn transform(&self, value: &str) -> Result<usize, ServiceError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map_err(|_| {
                ServiceError::PredictionError(format!("unseen category value: {:?}", value))
            })
    }

    /// Category string for a code
    pub fn label(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(|c| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test codes follow sorted order and round-trip through label()
    #[test]
    fn test_fit_transform() {
        let encoder = LabelEncoder::fit(
            ["LIMA", "ATE", "LIMA", "COMAS"].iter().map(|s| s.to_string()),
        );

        assert_eq!(encoder.len(), 3);
        assert_eq!(encoder.transform("ATE").unwrap(), 0);
        assert_eq!(encoder.transform("COMAS").unwrap(), 1);
        assert_eq!(encoder.transform("LIMA").unwrap(), 2);
        assert_eq!(encoder.label(1), Some("COMAS"));
    }

    // Test unseen categories are rejected
    #[test]
    fn test_unseen_category() {
        let encoder = LabelEncoder::fit(["ATE".to_string()]);
        let err = encoder.transform("CALLAO").unwrap_err();
        assert!(format!("{}", err).contains("unseen category"));
    }
}
