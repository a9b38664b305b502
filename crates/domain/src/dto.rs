//! HTTP request/response DTOs, validated at the edge with `validator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    AssessmentResult, AssessmentType, CefrLevel, ContentType, RecommendationSource,
    RecommendedItem, SessionStatus, SkillArea,
};

/// `POST /assessments/start` request.
#[derive(Debug, Deserialize, Validate)]
pub struct StartAssessmentRequest {
    pub assigned_id: Uuid,
}

/// The question payload sent to a client: enough to render the item, nothing to score it with.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionDto {
    pub item_id: Uuid,
    pub item_type: String,
    pub content: serde_json::Value,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressDto {
    pub questions_answered: u32,
    pub min_questions: u32,
    pub max_questions: u32,
    pub current_ability_estimate: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StartAssessmentResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub question: Option<QuestionDto>,
    pub progress: ProgressDto,
}

/// `POST /assessments/{sessionId}/answer` request.
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    pub item_id: Uuid,
    pub response_data: serde_json::Value,
    #[validate(range(min = 0))]
    pub time_taken_ms: u32,
    /// Optimistic-concurrency token: must equal the session's current index.
    pub current_index: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerResponse {
    NextQuestion {
        session_id: Uuid,
        question: QuestionDto,
        progress: ProgressDto,
    },
    Completed {
        session_id: Uuid,
        result: ResultDto,
        recommendations: Vec<RecommendedItemDto>,
    },
}

#[derive(Debug, Serialize)]
pub struct SkillScoreDto {
    pub theta: f64,
    pub standard_error: f64,
    pub cefr: CefrLevel,
}

#[derive(Debug, Serialize)]
pub struct ResultDto {
    pub id: Uuid,
    pub session_id: Uuid,
    pub proficiency_level: CefrLevel,
    pub skill_scores: std::collections::BTreeMap<SkillArea, SkillScoreDto>,
    pub overall_score: f64,
    pub result_type: AssessmentType,
    pub criteria_scores: Option<std::collections::BTreeMap<String, f64>>,
    pub created_at: DateTime<Utc>,
}

impl From<AssessmentResult> for ResultDto {
    fn from(r: AssessmentResult) -> Self {
        ResultDto {
            id: r.id,
            session_id: r.session_id,
            proficiency_level: r.proficiency_level,
            skill_scores: r
                .skill_scores
                .into_iter()
                .map(|(k, v)| {
                    (
                        k,
                        SkillScoreDto {
                            theta: v.theta,
                            standard_error: v.standard_error,
                            cefr: v.cefr,
                        },
                    )
                })
                .collect(),
            overall_score: r.overall_score,
            result_type: r.result_type,
            criteria_scores: r.criteria_scores,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendedItemDto {
    pub id: Uuid,
    pub content_id: Uuid,
    pub content_type: ContentType,
    pub target_skill: SkillArea,
    pub skill_gap_size: f64,
    pub rationale: String,
    pub priority_order: u32,
    pub source: RecommendationSource,
}

impl From<RecommendedItem> for RecommendedItemDto {
    fn from(r: RecommendedItem) -> Self {
        RecommendedItemDto {
            id: r.id,
            content_id: r.content_id,
            content_type: r.content_type,
            target_skill: r.target_skill,
            skill_gap_size: r.skill_gap_size,
            rationale: r.rationale,
            priority_order: r.priority_order,
            source: r.source,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompleteAssessmentResponse {
    pub session_id: Uuid,
    pub result: ResultDto,
    pub recommendations: Vec<RecommendedItemDto>,
}

#[derive(Debug, Serialize)]
pub struct SessionDto {
    pub id: Uuid,
    pub assigned_id: Uuid,
    pub status: SessionStatus,
    pub current_index: u32,
    pub questions_answered: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// `POST /admin/assessments/assign` request.
#[derive(Debug, Deserialize, Validate)]
pub struct AssignAssessmentRequest {
    pub template_id: Uuid,
    pub test_taker_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AssignAssessmentResponse {
    pub assigned_ids: Vec<Uuid>,
}

/// One row of `POST /admin/recommendations/{resultId}/override`.
#[derive(Debug, Deserialize, Validate)]
pub struct OverrideRecommendationRow {
    pub content_type: ContentType,
    pub content_id: Uuid,
    #[validate(length(min = 1))]
    pub target_skill: String,
    pub priority_order: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OverrideRecommendationsRequest {
    #[validate(length(min = 1, message = "override list must not be empty"))]
    pub items: Vec<OverrideRecommendationRow>,
}

/// Query parameters for `GET /students/{id}/history`.
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    pub assessment_type: Option<AssessmentType>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StudentProgressResponse {
    pub test_taker_id: Uuid,
    pub latest_result: Option<ResultDto>,
    pub recommendations: Vec<RecommendedItemDto>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_s: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub database: &'static str,
}
