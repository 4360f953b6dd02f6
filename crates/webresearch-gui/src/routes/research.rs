use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::sse::{KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::GuardedState;
use crate::error::AppError;
use crate::state::{AppState, RunMetrics, RunState, RunStatus, SseStream};

#[derive(Debug, Deserialize)]
pub struct StartResearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct StartResearchResponse {
    pub run_id: String,
    pub state: RunState,
    pub capacity: CapacitySnapshot,
}

#[derive(Debug, Serialize)]
pub struct CapacitySnapshot {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_runs: usize,
    pub total_runs: usize,
}

impl From<RunMetrics> for CapacitySnapshot {
    fn from(value: RunMetrics) -> Self {
        Self {
            max_concurrency: value.max_concurrency,
            available_permits: value.available_permits,
            running_runs: value.running_runs,
            total_runs: value.total_runs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<RunStatus>,
    pub capacity: CapacitySnapshot,
}

pub fn research_router() -> Router<AppState> {
    Router::new()
        .route("/research", post(start_research).get(list_runs))
        .route("/research/:id", get(get_run))
        .route("/research/:id/stream", get(stream_run))
}

#[instrument(skip_all)]
async fn start_research(
    GuardedState(state): GuardedState,
    Json(payload): Json<StartResearchRequest>,
) -> Result<(StatusCode, Json<StartResearchResponse>), AppError> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Please enter a research query first.",
        ));
    }

    let service = state.research();
    let run_id = service.start_run(query);
    let run_state = service
        .status(&run_id)
        .map(|status| status.state)
        .unwrap_or(RunState::Running);

    let snapshot = service.metrics();
    crate::metrics::run_started(&run_id, snapshot.running_runs, snapshot.available_permits);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartResearchResponse {
            run_id,
            state: run_state,
            capacity: snapshot.into(),
        }),
    ))
}

async fn list_runs(GuardedState(state): GuardedState) -> Json<ListRunsResponse> {
    let service = state.research();
    Json(ListRunsResponse {
        runs: service.list_runs(),
        capacity: service.metrics().into(),
    })
}

async fn get_run(
    GuardedState(state): GuardedState,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatus>, AppError> {
    state
        .research()
        .status(&run_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("run"))
}

async fn stream_run(
    GuardedState(state): GuardedState,
    Path(run_id): Path<String>,
) -> Result<Sse<SseStream>, AppError> {
    let service = state.research();
    let stream = service
        .event_stream(&run_id)
        .ok_or_else(|| AppError::not_found("run"))?;
    crate::metrics::stream_opened(&run_id, service.metrics().active_streams);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}
