//! Error types for the training pipeline and inference path

use thiserror::Error;

use crate::inference::UnseenCategory;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    // Dataset errors (startup-fatal)
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset is missing required column `{0}`")]
    MissingColumn(String),

    #[error("invalid date `{value}` in column `{column}` at record {record}")]
    InvalidDate {
        column: &'static str,
        value: String,
        record: usize,
    },

    #[error("dataset is empty after {stage}")]
    EmptyDataset { stage: &'static str },

    // Model errors
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("model has not been fitted")]
    NotFitted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("categories not seen during training: {}", format_unseen(.0))]
    UnseenCategories(Vec<UnseenCategory>),
}

impl PipelineError {
    /// True when the error was caused by the caller's input rather than the model
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::InvalidInput(_) | PipelineError::UnseenCategories(_))
    }
}

fn format_unseen(unseen: &[UnseenCategory]) -> String {
    unseen
        .iter()
        .map(|u| format!("{}={}", u.column, u.value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_message_lists_every_column() {
        let err = PipelineError::UnseenCategories(vec![
            UnseenCategory { column: "Gender".to_string(), value: "other".to_string() },
            UnseenCategory { column: "Medication".to_string(), value: "aspirin".to_string() },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("Gender=other"));
        assert!(msg.contains("Medication=aspirin"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_dataset_errors_are_not_client_errors() {
        let err = PipelineError::EmptyDataset { stage: "outlier removal" };
        assert_eq!(err.to_string(), "dataset is empty after outlier removal");
        assert!(!err.is_client_error());
    }
}
