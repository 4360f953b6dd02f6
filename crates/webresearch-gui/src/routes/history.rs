use axum::{
    Json, Router,
    extract::Path,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Local;
use serde::Serialize;

use super::GuardedState;
use crate::error::AppError;
use crate::state::{AppState, HistorySummary, ResearchHistoryItem};

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<HistorySummary>,
}

pub fn history_router() -> Router<AppState> {
    Router::new()
        .route("/history", get(list_history))
        .route("/history/:id", get(get_history_item))
        .route("/history/:id/report", get(download_report))
}

async fn list_history(GuardedState(state): GuardedState) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        items: state.research().history(),
    })
}

async fn get_history_item(
    GuardedState(state): GuardedState,
    Path(id): Path<String>,
) -> Result<Json<ResearchHistoryItem>, AppError> {
    state
        .research()
        .history_item(&id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("history item"))
}

async fn download_report(
    GuardedState(state): GuardedState,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let item = state
        .research()
        .history_item(&id)
        .ok_or_else(|| AppError::not_found("history item"))?;

    let file_name = format!(
        "research_report_{}.md",
        Local::now().format("%Y%m%d_%H%M")
    );
    crate::metrics::report_downloaded(&item.id, item.report.len());

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        item.report,
    )
        .into_response())
}
