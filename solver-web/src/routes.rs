//! HTTP route handlers for the solver API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use solver::core::analytics::{AnalyticsReport, aggregate};
use solver::core::types::{Attempt, AuditHistory, ProblemRecord};
use solver::fallback::CredentialsExhausted;
use solver::io::store::{StoredProblem, validate_id};
use solver::solve::{EMPTY_QUERY_MESSAGE, solve_query};

use crate::state::{AppState, ChangeEvent};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/solve", post(solve))
        .route("/problems", get(list_problems))
        .route("/problems/{id}", get(get_problem))
        .route("/analytics", get(analytics))
}

/// JSON error body `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SolveResponse {
    pub problem_id: String,
    pub query: String,
    pub credential: String,
    #[serde(rename = "final")]
    pub final_attempt: Attempt,
    pub history: AuditHistory,
}

/// POST /api/solve - run the verification loop and save the record.
async fn solve(
    State(state): State<AppState>,
    Json(request): Json<SolveRequest>,
) -> Result<Json<SolveResponse>, ApiError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, EMPTY_QUERY_MESSAGE));
    }

    let _guard = state.solve_lock.lock().await;
    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let factory = &worker.client_factory;
        solve_query(
            &worker.store(),
            &worker.config,
            &worker.credentials,
            |credential| factory(credential),
            &query,
        )
    })
    .await
    .map_err(ApiError::internal)?;

    let outcome = result.map_err(|err| {
        warn!(error = %format!("{err:#}"), "solve failed");
        if err.downcast_ref::<CredentialsExhausted>().is_some() {
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                format!("Error processing query: {err:#}"),
            )
        } else {
            ApiError::internal(format!("{err:#}"))
        }
    })?;

    let final_attempt = outcome.final_attempt().clone();
    info!(problem_id = %outcome.problem_id, status = %final_attempt.final_status, "problem solved");
    // No subscribers is fine.
    let _ = state.event_tx.send(ChangeEvent::ProblemSaved {
        problem_id: outcome.problem_id.clone(),
        status: final_attempt.final_status,
    });

    Ok(Json(SolveResponse {
        problem_id: outcome.problem_id,
        query: outcome.query,
        credential: outcome.credential,
        final_attempt,
        history: outcome.history,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProblemsResponse {
    pub problems: Vec<ProblemRecord>,
    pub warnings: Vec<String>,
}

/// GET /api/problems - all saved problem records.
async fn list_problems(State(state): State<AppState>) -> Result<Json<ProblemsResponse>, ApiError> {
    let (problems, warnings) = state.store().list().map_err(ApiError::internal)?;
    Ok(Json(ProblemsResponse { problems, warnings }))
}

/// GET /api/problems/{id} - one record with its attempts.
async fn get_problem(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredProblem>, ApiError> {
    if validate_id(&id).is_err() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "invalid problem id"));
    }
    if !state.paths.records_dir.join(&id).is_dir() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("problem {id} not found"),
        ));
    }
    let stored = state
        .store()
        .load(&id)
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;
    Ok(Json(stored))
}

/// GET /api/analytics - per-category verification statistics.
async fn analytics(State(state): State<AppState>) -> Result<Json<AnalyticsReport>, ApiError> {
    let (records, _) = state.store().list().map_err(ApiError::internal)?;
    Ok(Json(aggregate(&records)))
}
