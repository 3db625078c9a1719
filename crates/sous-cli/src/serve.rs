//! Local status and readiness endpoints.
//!
//! The queue loader probes `/ready` before starting its tick loop; `/status`
//! exposes plan/task counts and the webhook failure counter for operators.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

use sous_core::workers::webhook_executor::WebhookExecutor;
use sous_db::queries::{meal_plans, tasks};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and responses
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub webhook_executor: Arc<WebhookExecutor>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    meal_plans: MealPlanCountsResponse,
    tasks: Vec<TaskCountResponse>,
    failed_webhook_deliveries: u64,
}

#[derive(Debug, Serialize)]
struct MealPlanCountsResponse {
    awaiting_votes: i64,
    finalized: i64,
    expired: i64,
    total: i64,
}

#[derive(Debug, Serialize)]
struct TaskCountResponse {
    status: String,
    count: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn ready(State(state): State<AppState>) -> StatusCode {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let counts = meal_plans::get_meal_plan_counts(&state.pool)
        .await
        .map_err(AppError::internal)?;
    let task_counts = tasks::count_tasks_by_status(&state.pool)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(StatusResponse {
        meal_plans: MealPlanCountsResponse {
            awaiting_votes: counts.awaiting_votes,
            finalized: counts.finalized,
            expired: counts.expired,
            total: counts.total,
        },
        tasks: task_counts
            .into_iter()
            .map(|(status, count)| TaskCountResponse { status, count })
            .collect(),
        failed_webhook_deliveries: state.webhook_executor.failed_delivery_count(),
    }))
}

/// Build the status router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .route("/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
