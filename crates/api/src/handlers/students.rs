//! Read-only views of a test-taker's assessment history and current progress.

use std::sync::Arc;

use assess_domain::{AssessmentType, DomainError, HistoryQuery, ResultDto, StudentProgressResponse};
use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::identity::AuthContext;
use crate::AppState;

fn assessment_type_str(t: AssessmentType) -> &'static str {
    match t {
        AssessmentType::Placement => "PLACEMENT",
        AssessmentType::Speaking => "SPEAKING",
        AssessmentType::Writing => "WRITING",
    }
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Path(test_taker_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ResultDto>>, DomainError> {
    let limit = query.limit.unwrap_or(20).min(200) as i64;
    let result_type = query.assessment_type.map(assessment_type_str);
    let results = state
        .sessions
        .list_results_for_test_taker(test_taker_id, result_type, limit)
        .await?;
    Ok(Json(results.into_iter().map(Into::into).collect()))
}

pub async fn progress(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Path(test_taker_id): Path<Uuid>,
) -> Result<Json<StudentProgressResponse>, DomainError> {
    let latest = state.sessions.latest_result_for_test_taker(test_taker_id).await?;
    let recommendations = match &latest {
        Some(result) => state.sessions.get_recommendations(result.id).await?,
        None => Vec::new(),
    };

    Ok(Json(StudentProgressResponse {
        test_taker_id,
        latest_result: latest.map(Into::into),
        recommendations: recommendations.into_iter().map(Into::into).collect(),
    }))
}
