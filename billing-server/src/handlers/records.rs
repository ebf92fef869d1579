//! Saved prediction handlers

use axum::{
    extract::{rejection::{FormRejection, JsonRejection}, Path, State},
    http::StatusCode,
    Form, Json,
};
use validator::Validate;

use crate::models::{PatientPrediction, PredictionFields};
use crate::{AppError, AppResult, AppState};

/// List all saved predictions
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<PatientPrediction>>> {
    let records = PatientPrediction::list(&state.pool).await?;
    Ok(Json(records))
}

/// Get single prediction
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PatientPrediction>> {
    let record = PatientPrediction::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(record))
}

/// Edit name and amount from a submitted form
pub async fn edit_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    fields: Result<Form<PredictionFields>, FormRejection>,
) -> AppResult<Json<PatientPrediction>> {
    let Form(fields) = fields.map_err(|e| AppError::ValidationError(e.body_text()))?;
    apply_edit(&state, id, fields).await
}

/// Edit name and amount from a JSON body
pub async fn edit_json(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    fields: Result<Json<PredictionFields>, JsonRejection>,
) -> AppResult<Json<PatientPrediction>> {
    let Json(fields) = fields.map_err(|e| AppError::ValidationError(e.body_text()))?;
    apply_edit(&state, id, fields).await
}

async fn apply_edit(state: &AppState, id: i64, fields: PredictionFields) -> AppResult<Json<PatientPrediction>> {
    let fields = fields.normalized();
    if !fields.bill_amount.is_finite() {
        return Err(AppError::ValidationError("bill_amount must be a finite number".to_string()));
    }
    fields.validate()?;

    let record = PatientPrediction::update(&state.pool, id, &fields)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!("Updated prediction #{}", record.id);
    Ok(Json(record))
}

/// Delete a prediction
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !PatientPrediction::delete(&state.pool, id).await? {
        return Err(not_found());
    }

    tracing::info!("Deleted prediction #{}", id);
    Ok(StatusCode::NO_CONTENT)
}

fn not_found() -> AppError {
    AppError::NotFound("Prediction not found".to_string())
}
