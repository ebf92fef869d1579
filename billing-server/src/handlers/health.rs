//! Health check handler

use axum::{extract::State, Json};
use billing_core::{TrainingReport, VocabularyPolicy};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    timestamp: i64,
    model: ModelSummary,
}

#[derive(Serialize)]
pub struct ModelSummary {
    n_features: usize,
    n_trees: usize,
    vocabulary_policy: VocabularyPolicy,
    training: TrainingReport,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        timestamp: chrono::Utc::now().timestamp(),
        model: ModelSummary {
            n_features: state.model.feature_columns().len(),
            n_trees: state.model.forest().n_trees(),
            vocabulary_policy: state.model.vocabulary_policy(),
            training: state.report.as_ref().clone(),
        },
    })
}
