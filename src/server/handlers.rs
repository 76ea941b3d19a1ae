//! HTTP handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::orchestrator::RunOptions;
use crate::query::{self, QueryError, RunResultsQuery};
use crate::store::{DbError, OperatorUpdate};

/// JSON error body with a status code
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let status = match err {
            QueryError::RunNotFound(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            QueryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Manual crawl trigger body
#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    /// Follow detail links on listing pages
    pub enable_phase2: Option<bool>,
    /// Reclassify unchanged content
    pub force: Option<bool>,
}

/// Create a run and execute it in the background
pub async fn trigger_crawl(
    State(state): State<AppState>,
    body: Option<Json<TriggerRequest>>,
) -> impl IntoResponse {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let run_id = match state.orchestrator.start_run().await {
        Ok(run_id) => run_id,
        Err(e) => {
            error!("Failed to start crawl run: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            );
        }
    };

    let options = RunOptions {
        force: request.force,
        follow_details: request.enable_phase2,
        regions: None,
    };
    let orchestrator = state.orchestrator.clone();
    let background_id = run_id.clone();
    tokio::spawn(async move {
        match orchestrator.execute_run(&background_id, options, None).await {
            Ok(run) => info!("Run {} finished as {}", run.run_id, run.status),
            Err(e) => error!("Run {} aborted: {}", background_id, e),
        }
    });

    (
        StatusCode::OK,
        Json(json!({ "success": true, "run_id": run_id })),
    )
}

/// Stop request body; without a run id every active run is stopped
#[derive(Debug, Default, Deserialize)]
pub struct StopRequest {
    pub run_id: Option<String>,
}

/// Stop runs after their in-flight batch
pub async fn stop_crawl(
    State(state): State<AppState>,
    body: Option<Json<StopRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let stopped = match request.run_id {
        Some(run_id) => {
            if !state.orchestrator.stop_run(&run_id) {
                return Err(ApiError {
                    status: StatusCode::NOT_FOUND,
                    message: format!("No active run: {}", run_id),
                });
            }
            vec![run_id]
        }
        None => state.orchestrator.stop_all(),
    };
    Ok(Json(json!({ "success": true, "stopped": stopped })))
}

/// Run record with its crawl logs
pub async fn run_detail(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state
        .db
        .get_run(&run_id)
        .await?
        .ok_or_else(|| ApiError::from(QueryError::RunNotFound(run_id.clone())))?;
    let logs = state.db.logs_for_run(&run_id).await?;
    Ok(Json(json!({ "run": run, "logs": logs })))
}

/// Paginated announcements discovered by a run
pub async fn run_announcements(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(params): Query<RunResultsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query::run_announcements(&state.db, &run_id, &params).await?;
    Ok(Json(page))
}

/// Dashboard aggregates as of today (UTC)
pub async fn dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = query::dashboard_stats(&state.db, Utc::now().date_naive()).await?;
    Ok(Json(stats))
}

/// Operator edit of status, read flag or notes
pub async fn update_announcement(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<OperatorUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.update_operator_fields(id, &update).await? {
        return Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("Announcement not found: {}", id),
        });
    }
    let announcement = state.db.get_announcement(id).await?;
    Ok(Json(announcement))
}
