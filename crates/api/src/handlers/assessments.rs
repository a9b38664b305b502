//! Test-taker-facing assessment endpoints: start, answer, complete, inspect.

use std::sync::Arc;

use assess_domain::{
    AnswerRequest, AnswerResponse, CompleteAssessmentResponse, DomainError, SessionDto,
    StartAssessmentRequest, StartAssessmentResponse,
};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::identity::AuthContext;
use crate::AppState;

pub async fn start_assessment(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Json(req): Json<StartAssessmentRequest>,
) -> Result<Json<StartAssessmentResponse>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let now = Utc::now();
    let response = state
        .engine
        .start(req.assigned_id, now, state.config.session_ttl_minutes)
        .await?;
    Ok(Json(response))
}

pub async fn answer_assessment(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;
    let now = Utc::now();
    let response = state.engine.answer(session_id, req, now).await?;
    Ok(Json(response))
}

pub async fn complete_assessment(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CompleteAssessmentResponse>, DomainError> {
    let now = Utc::now();
    let response = state.engine.complete(session_id, now).await?;
    Ok(Json(response))
}

pub async fn cancel_assessment(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<(), DomainError> {
    state.engine.cancel(session_id).await?;
    Ok(())
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionDto>, DomainError> {
    let dto = state.engine.get_session(session_id).await?;
    Ok(Json(dto))
}
