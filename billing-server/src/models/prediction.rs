//! Saved bill estimates

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PatientPrediction {
    pub id: i64,
    pub name: String,
    pub bill_amount: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Name and amount, as written on create and edit
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PredictionFields {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: String,
    #[validate(range(min = -1.0e12, max = 1.0e12, message = "bill_amount out of range"))]
    pub bill_amount: f64,
}

impl PredictionFields {
    pub fn new(name: impl Into<String>, bill_amount: f64) -> Self {
        Self {
            name: name.into().trim().to_string(),
            bill_amount,
        }
    }

    /// Trimmed name, amount rounded to cents
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            bill_amount: (self.bill_amount * 100.0).round() / 100.0,
        }
    }
}

impl PatientPrediction {
    pub async fn create(pool: &SqlitePool, data: &PredictionFields) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PatientPrediction>(
            r#"
            INSERT INTO patient_predictions (name, bill_amount)
            VALUES (?1, ?2)
            RETURNING *
            "#
        )
        .bind(&data.name)
        .bind(data.bill_amount)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PatientPrediction>("SELECT * FROM patient_predictions WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PatientPrediction>("SELECT * FROM patient_predictions ORDER BY id")
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        data: &PredictionFields,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PatientPrediction>(
            r#"
            UPDATE patient_predictions
            SET name = ?1, bill_amount = ?2, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?3
            RETURNING *
            "#
        )
        .bind(&data.name)
        .bind(data.bill_amount)
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Returns false when no row had this id
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM patient_predictions WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
