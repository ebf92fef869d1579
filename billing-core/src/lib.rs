//! Hospital Bill Estimator - Core
//!
//! Trains a random-forest regressor on hospital admission records and maps
//! single submitted records onto the trained feature space.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       BILLING CORE                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  dataset ─► outlier ─► encoding ─► scaler ─► forest (tree)   │
//! │                                                  │           │
//! │                 context::ModelContext ◄──────────┘           │
//! │                         │                                    │
//! │  inference::PatientInput ─► feature_vector ─► Estimate       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod forest;
pub mod inference;
pub mod metrics;
pub mod outlier;
pub mod scaler;
pub mod tree;

// Re-export common types
pub use context::{ModelContext, TrainingConfig, TrainingReport};
pub use dataset::{CategoricalColumn, PatientFeatures, PatientRow};
pub use error::{PipelineError, Result};
pub use forest::MaxFeatures;
pub use inference::{Estimate, PatientInput, UnseenCategory, VocabularyPolicy};
pub use metrics::RegressionMetrics;
