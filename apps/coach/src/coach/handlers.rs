use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::coach::{
    CompletionReceipt, PlanResponse, QuizResponse, SyncStatus, DEFAULT_QUIZ_QUESTIONS,
    MAX_QUIZ_QUESTIONS,
};
use crate::errors::AppError;
use crate::state::AppState;
use crate::sync::FlushOutcome;

#[derive(Deserialize)]
pub struct QuizQuery {
    pub topic: Option<String>,
    pub count: Option<usize>,
}

#[derive(Deserialize)]
pub struct PlanQuery {
    pub topic: Option<String>,
}

#[derive(Serialize)]
pub struct ProgressResponse {
    pub completed_units: Vec<u32>,
}

fn require_topic(topic: Option<String>) -> Result<String, AppError> {
    match topic {
        Some(topic) if !topic.trim().is_empty() => Ok(topic),
        _ => Err(AppError::Validation("topic must not be blank".to_string())),
    }
}

/// GET /api/v1/quiz?topic=&count=
pub async fn handle_get_quiz(
    State(state): State<AppState>,
    Query(params): Query<QuizQuery>,
) -> Result<Json<QuizResponse>, AppError> {
    let topic = require_topic(params.topic)?;
    let count = params.count.unwrap_or(DEFAULT_QUIZ_QUESTIONS);
    if !(1..=MAX_QUIZ_QUESTIONS).contains(&count) {
        return Err(AppError::Validation(format!(
            "count must be between 1 and {MAX_QUIZ_QUESTIONS}"
        )));
    }
    Ok(Json(state.coach.request_quiz(&topic, count).await))
}

/// GET /api/v1/plan?topic=
pub async fn handle_get_plan(
    State(state): State<AppState>,
    Query(params): Query<PlanQuery>,
) -> Result<Json<PlanResponse>, AppError> {
    let topic = require_topic(params.topic)?;
    Ok(Json(state.coach.request_plan(&topic).await))
}

/// POST /api/v1/units/:unit_id/complete
pub async fn handle_complete_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<u32>,
) -> Result<Json<CompletionReceipt>, AppError> {
    let receipt = state.coach.mark_unit_complete(unit_id).await?;
    Ok(Json(receipt))
}

/// GET /api/v1/progress
pub async fn handle_get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(ProgressResponse {
        completed_units: state.coach.progress().await,
    })
}

/// GET /api/v1/sync
pub async fn handle_sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.coach.sync_status().await)
}

/// POST /api/v1/sync/flush
pub async fn handle_flush(State(state): State<AppState>) -> Json<FlushOutcome> {
    Json(state.coach.flush_now().await)
}
