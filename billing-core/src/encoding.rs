//! One-hot encoding and feature-column alignment
//!
//! The encoder fixes the feature layout once, at fit time:
//!
//! ```text
//! [ Age, Length of Stay, Gender_<c1>.., Blood Type_<c1>.., ..., Test Results_<c1>.. ]
//! ```
//!
//! Categories inside a column are sorted and the first one is dropped; it is
//! represented by all indicators of that column being zero.

use std::collections::{BTreeSet, HashMap};

use ndarray::{Array1, Array2};

use crate::dataset::{CategoricalColumn, PatientFeatures, COL_AGE, COL_LENGTH_OF_STAY};
use crate::error::{PipelineError, Result};
use crate::inference::UnseenCategory;

/// Numeric passthrough columns, always the leading feature columns
pub const NUMERIC_COLUMNS: [&str; 2] = [COL_AGE, COL_LENGTH_OF_STAY];

/// Name of the indicator column for `value` in `column`
pub fn indicator_name(column: CategoricalColumn, value: &str) -> String {
    format!("{}_{}", column.name(), value)
}

/// A row encoded as named values, before alignment
pub type NamedFeatures = Vec<(String, f64)>;

/// Fitted one-hot encoder (drop-first)
#[derive(Debug, Clone)]
pub struct OneHotEncoder {
    /// Sorted categories per column, baseline included
    vocabulary: Vec<(CategoricalColumn, Vec<String>)>,
    feature_columns: Vec<String>,
    index: HashMap<String, usize>,
}

/// A row re-expressed over the fitted feature columns
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    pub values: Array1<f64>,
    /// Categorical values that had no place in the vocabulary
    pub unseen: Vec<UnseenCategory>,
}

impl OneHotEncoder {
    /// Learn the vocabulary of every categorical column
    pub fn fit<R: PatientFeatures>(rows: &[R]) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyDataset { stage: "encoding" });
        }

        let vocabulary: Vec<(CategoricalColumn, Vec<String>)> = CategoricalColumn::ALL
            .iter()
            .map(|&column| {
                let categories: BTreeSet<&str> = rows.iter().map(|r| r.category(column)).collect();
                (column, categories.into_iter().map(str::to_string).collect())
            })
            .collect();

        let mut feature_columns: Vec<String> = NUMERIC_COLUMNS.iter().map(|c| c.to_string()).collect();
        for (column, categories) in &vocabulary {
            feature_columns.extend(categories.iter().skip(1).map(|c| indicator_name(*column, c)));
        }

        let encoder = Self {
            vocabulary,
            index: build_index(&feature_columns),
            feature_columns,
        };

        log::debug!(
            "Encoder fitted: {} feature columns ({} indicators)",
            encoder.feature_columns.len(),
            encoder.feature_columns.len() - NUMERIC_COLUMNS.len()
        );

        Ok(encoder)
    }

    /// Ordered feature column names the model is trained on
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn n_features(&self) -> usize {
        self.feature_columns.len()
    }

    /// Position of a feature column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Sorted categories seen for `column`, baseline first
    pub fn categories(&self, column: CategoricalColumn) -> &[String] {
        self.vocabulary
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, cats)| cats.as_slice())
            .unwrap_or(&[])
    }

    /// Encode a single row without any knowledge of the training layout:
    /// numeric values plus one indicator per categorical value present.
    pub fn encode_row<R: PatientFeatures>(row: &R) -> NamedFeatures {
        let mut named: NamedFeatures = vec![
            (COL_AGE.to_string(), row.age()),
            (COL_LENGTH_OF_STAY.to_string(), row.length_of_stay()),
        ];
        for column in CategoricalColumn::ALL {
            named.push((indicator_name(column, row.category(column)), 1.0));
        }
        named
    }

    /// Reindex named features onto the fitted columns. Columns the row does
    /// not carry are zero; names outside the layout are ignored.
    pub fn reindex(&self, named: &[(String, f64)]) -> Array1<f64> {
        let mut values = Array1::zeros(self.feature_columns.len());
        for (name, value) in named {
            if let Some(&i) = self.index.get(name) {
                values[i] = *value;
            }
        }
        values
    }

    /// Encode + reindex, reporting categories absent from the vocabulary
    pub fn align<R: PatientFeatures>(&self, row: &R) -> AlignedRow {
        let unseen = self.unseen_categories(row);
        let values = self.reindex(&Self::encode_row(row));
        AlignedRow { values, unseen }
    }

    fn unseen_categories<R: PatientFeatures>(&self, row: &R) -> Vec<UnseenCategory> {
        self.vocabulary
            .iter()
            .filter_map(|(column, categories)| {
                let value = row.category(*column);
                if categories.binary_search_by(|c| c.as_str().cmp(value)).is_ok() {
                    None
                } else {
                    Some(UnseenCategory {
                        column: column.name().to_string(),
                        value: value.to_string(),
                    })
                }
            })
            .collect()
    }

    /// Encode a whole table into a feature matrix
    pub fn transform<R: PatientFeatures>(&self, rows: &[R]) -> Array2<f64> {
        let mut matrix = Array2::zeros((rows.len(), self.feature_columns.len()));
        for (i, row) in rows.iter().enumerate() {
            let aligned = self.reindex(&Self::encode_row(row));
            matrix.row_mut(i).assign(&aligned);
        }
        matrix
    }
}

fn build_index(columns: &[String]) -> HashMap<String, usize> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.clone(), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{PatientRow, IDENTIFYING_COLUMNS, COL_ADMISSION_DATE, COL_DISCHARGE_DATE};

    fn row(gender: &str, blood: &str, condition: &str) -> PatientRow {
        PatientRow {
            age: 50.0,
            gender: gender.into(),
            blood_type: blood.into(),
            medical_condition: condition.into(),
            admission_type: "urgent".into(),
            insurance_provider: "aetna".into(),
            medication: "aspirin".into(),
            test_results: "normal".into(),
            length_of_stay: 6,
            billing_amount: 1000.0,
        }
    }

    fn training_rows() -> Vec<PatientRow> {
        vec![
            row("male", "a+", "cancer"),
            row("female", "o+", "diabetes"),
            row("female", "b-", "asthma"),
        ]
    }

    #[test]
    fn test_feature_layout_drops_first_category() {
        let encoder = OneHotEncoder::fit(&training_rows()).unwrap();

        assert_eq!(
            encoder.feature_columns(),
            &[
                "Age",
                "Length of Stay",
                "Gender_male",
                "Blood Type_b-",
                "Blood Type_o+",
                "Medical Condition_cancer",
                "Medical Condition_diabetes",
            ]
        );
        assert_eq!(encoder.categories(CategoricalColumn::Gender), &["female", "male"]);
    }

    #[test]
    fn test_identifying_and_date_columns_never_encoded() {
        let encoder = OneHotEncoder::fit(&training_rows()).unwrap();
        for col in encoder.feature_columns() {
            for dropped in IDENTIFYING_COLUMNS.iter().chain([COL_ADMISSION_DATE, COL_DISCHARGE_DATE].iter()) {
                assert!(!col.starts_with(dropped), "{} leaked into features", dropped);
            }
        }
        assert!(!encoder.feature_columns().iter().any(|c| c == "Billing Amount"));
    }

    #[test]
    fn test_baseline_category_aligns_to_zeros() {
        let encoder = OneHotEncoder::fit(&training_rows()).unwrap();
        let aligned = encoder.align(&row("female", "a+", "asthma"));

        assert!(aligned.unseen.is_empty());
        assert_eq!(aligned.values.len(), encoder.n_features());
        assert_eq!(aligned.values[0], 50.0);
        assert_eq!(aligned.values[1], 6.0);
        assert!(aligned.values.iter().skip(2).all(|&v| v == 0.0));
    }

    #[test]
    fn test_unseen_category_is_dropped_and_reported() {
        let encoder = OneHotEncoder::fit(&training_rows()).unwrap();
        let aligned = encoder.align(&row("male", "ab-", "cancer"));

        assert_eq!(aligned.values.len(), encoder.n_features());
        assert_eq!(aligned.unseen.len(), 1);
        assert_eq!(aligned.unseen[0].column, "Blood Type");
        assert_eq!(aligned.unseen[0].value, "ab-");

        let male = encoder.column_index("Gender_male").unwrap();
        let cancer = encoder.column_index("Medical Condition_cancer").unwrap();
        assert_eq!(aligned.values[male], 1.0);
        assert_eq!(aligned.values[cancer], 1.0);
        assert_eq!(aligned.values.sum(), 50.0 + 6.0 + 2.0);
    }

    #[test]
    fn test_transform_matches_row_alignment() {
        let rows = training_rows();
        let encoder = OneHotEncoder::fit(&rows).unwrap();
        let matrix = encoder.transform(&rows);

        assert_eq!(matrix.dim(), (3, encoder.n_features()));
        for (i, r) in rows.iter().enumerate() {
            assert_eq!(matrix.row(i), encoder.align(r).values);
        }
    }
}
