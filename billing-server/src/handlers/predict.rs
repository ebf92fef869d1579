//! Bill estimation handler

use std::collections::HashMap;

use axum::{
    extract::{rejection::FormRejection, State},
    Form, Json,
};
use billing_core::{PatientInput, UnseenCategory};
use serde::Serialize;
use validator::Validate;

use crate::models::{PatientPrediction, PredictionFields};
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub id: i64,
    pub name: String,
    pub estimated_bill: f64,
    pub message: String,
    pub unseen_categories: Vec<UnseenCategory>,
}

/// Estimate a bill from the submitted form and save it
pub async fn create(
    State(state): State<AppState>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> AppResult<Json<PredictResponse>> {
    let Form(form) = form.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let name = form
        .get("name")
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::ValidationError("missing field `name`".to_string()))?;

    let input = PatientInput::from_fields(&form)?;
    let estimate = state.model.predict(&input)?;

    let fields = PredictionFields::new(name, estimate.amount).normalized();
    fields.validate()?;

    let record = PatientPrediction::create(&state.pool, &fields).await?;
    tracing::info!(
        "Saved prediction #{} for '{}': {:.2} ({} unseen categories)",
        record.id,
        record.name,
        record.bill_amount,
        estimate.unseen.len()
    );

    Ok(Json(PredictResponse {
        id: record.id,
        message: estimate.message(&record.name),
        name: record.name,
        estimated_bill: record.bill_amount,
        unseen_categories: estimate.unseen,
    }))
}
