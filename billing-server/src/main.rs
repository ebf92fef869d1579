//! Hospital Bill Estimator - Server
//!
//! Trains the billing model once at startup, then serves estimates and the
//! saved prediction records over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   BILL ESTIMATOR SERVER                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  startup:  dataset CSV ─► ModelContext::from_csv (blocking) │
//! │                                   │                         │
//! │  ┌───────────┐            ┌───────▼───────┐                 │
//! │  │  Router   │──/predict─►│ Arc<Model>    │ (read-only)     │
//! │  │  (Axum)   │            └───────────────┘                 │
//! │  └─────┬─────┘                                              │
//! │        └─/records──────────────┐                            │
//! │                         ┌──────▼──────┐                     │
//! │                         │   SQLite    │                     │
//! │                         └─────────────┘                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod error;
mod handlers;
mod models;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use billing_core::{ModelContext, TrainingReport};
use tower_http::{
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let json_logs = std::env::var("ENVIRONMENT").is_ok_and(|e| e == "production");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "billing_server=debug,billing_core=info,tower_http=debug".into()))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // Load configuration
    let config = config::Config::from_env();

    tracing::info!("Bill estimator starting ({})", config.environment);
    tracing::info!("Dataset: {}", config.dataset_path);

    // Build the model before accepting traffic
    let training = config.training_config();
    let dataset_path = config.dataset_path.clone();
    let (model, report) = tokio::task::spawn_blocking(move || ModelContext::from_csv(&dataset_path, &training))
        .await
        .context("Training task panicked")?
        .with_context(|| format!("Failed to train model from {}", config.dataset_path))?;
    let model = model.with_vocabulary_policy(config.vocabulary_policy);

    tracing::info!(
        "Model ready: {} features, {}/{} rows kept (bill bounds {:.2}..{:.2}), policy {}",
        report.n_features,
        report.rows_after_outliers,
        report.rows_loaded,
        report.billing_bounds.lower,
        report.billing_bounds.upper,
        model.vocabulary_policy()
    );

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    // Build application state
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        model: Arc::new(model),
        report: Arc::new(report),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Arc<config::Config>,
    pub model: Arc<ModelContext>,
    pub report: Arc<TrainingReport>,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home::index))
        .route("/health", get(handlers::health::check))
        .route("/predict", post(handlers::predict::create))
        .route("/records", get(handlers::records::list))
        .route(
            "/records/:id",
            get(handlers::records::get)
                .post(handlers::records::edit_form)
                .put(handlers::records::edit_json)
                .delete(handlers::records::delete),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
