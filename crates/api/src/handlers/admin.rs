//! Admin authoring and assignment endpoints: content catalog, templates, and
//! manual recommendation overrides.

use std::sync::Arc;

use assess_domain::{
    ActorType, AssessmentConfig, AssessmentTemplate, AssignAssessmentRequest,
    AssignAssessmentResponse, AssignedAssessment, AssignmentStatus, AuditLog, Course, Item,
    LearningPathway, Lesson, OverrideRecommendationsRequest, RecommendationSource, RecommendedItem,
    RecommendedItemDto, TemplateItem,
};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::identity::AuthContext;
use crate::AppState;
use assess_domain::DomainError;

pub async fn create_pathway(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(pathway): Json<LearningPathway>,
) -> Result<Json<LearningPathway>, DomainError> {
    auth.require_admin()?;
    state.templates.create_pathway(&pathway).await?;
    Ok(Json(pathway))
}

pub async fn create_template(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(template): Json<AssessmentTemplate>,
) -> Result<Json<AssessmentTemplate>, DomainError> {
    auth.require_admin()?;
    state.templates.create_template(&template).await?;
    Ok(Json(template))
}

pub async fn create_config(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(config): Json<AssessmentConfig>,
) -> Result<Json<AssessmentConfig>, DomainError> {
    auth.require_admin()?;
    state.templates.create_config(&config).await?;
    Ok(Json(config))
}

pub async fn add_template_item(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(item): Json<TemplateItem>,
) -> Result<Json<TemplateItem>, DomainError> {
    auth.require_admin()?;
    state.templates.add_template_item(&item).await?;
    Ok(Json(item))
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(item): Json<Item>,
) -> Result<Json<Item>, DomainError> {
    auth.require_admin()?;
    state.items.create_item(&item).await?;
    Ok(Json(item))
}

pub async fn create_course(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(course): Json<Course>,
) -> Result<Json<Course>, DomainError> {
    auth.require_admin()?;
    state.catalog.create_course(&course).await?;
    Ok(Json(course))
}

pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(lesson): Json<Lesson>,
) -> Result<Json<Lesson>, DomainError> {
    auth.require_admin()?;
    state.catalog.create_lesson(&lesson).await?;
    Ok(Json(lesson))
}

/// Assigns a template to one test-taker, or to every member of a group via the
/// `GroupDirectory` port. No deployment wires a concrete directory today, so a
/// `group_id`-only request fails clearly rather than silently no-opping.
pub async fn assign_assessment(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(req): Json<AssignAssessmentRequest>,
) -> Result<Json<AssignAssessmentResponse>, DomainError> {
    auth.require_admin()?;
    req.validate().map_err(DomainError::from_validation_errors)?;

    let test_taker_ids = match (req.test_taker_id, req.group_id) {
        (Some(id), _) => vec![id],
        (None, Some(group_id)) => match &state.group_directory {
            Some(directory) => directory.expand_group(group_id).await.map_err(|e| {
                DomainError::Internal(anyhow::anyhow!("group directory call failed: {e}"))
            })?,
            None => {
                return Err(DomainError::Internal(anyhow::anyhow!(
                    "group assignment requires a GroupDirectory integration not configured on this deployment"
                )))
            }
        },
        (None, None) => {
            return Err(DomainError::Validation(
                "either test_taker_id or group_id is required".to_string(),
            ))
        }
    };

    let now = Utc::now();
    let mut assigned_ids = Vec::with_capacity(test_taker_ids.len());
    for test_taker_id in test_taker_ids {
        let assignment = AssignedAssessment {
            id: Uuid::new_v4(),
            template_id: req.template_id,
            test_taker_id,
            group_id: req.group_id,
            assigned_by: auth.user_id,
            due_at: req.due_at,
            status: AssignmentStatus::Pending,
        };
        state.templates.create_assignment(&assignment).await?;
        state
            .audit
            .record(&AuditLog {
                id: Uuid::new_v4(),
                actor_id: Some(auth.user_id),
                actor_type: ActorType::Admin,
                action: "assessment_assigned".to_string(),
                entity_type: "assigned_assessment".to_string(),
                entity_id: assignment.id,
                details: serde_json::json!({ "template_id": req.template_id, "test_taker_id": test_taker_id }),
                created_at: now,
            })
            .await?;
        assigned_ids.push(assignment.id);
    }

    Ok(Json(AssignAssessmentResponse { assigned_ids }))
}

pub async fn override_recommendations(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(result_id): Path<Uuid>,
    Json(req): Json<OverrideRecommendationsRequest>,
) -> Result<Json<Vec<RecommendedItemDto>>, DomainError> {
    auth.require_admin()?;
    req.validate().map_err(DomainError::from_validation_errors)?;

    for row in &req.items {
        if !state.catalog.content_exists(row.content_id, row.content_type).await? {
            return Err(DomainError::Validation(format!(
                "unknown content {} of type {:?}",
                row.content_id, row.content_type
            )));
        }
    }

    let now = Utc::now();
    let items: Vec<RecommendedItem> = req
        .items
        .into_iter()
        .map(|row| RecommendedItem {
            id: Uuid::new_v4(),
            result_id,
            content_id: row.content_id,
            content_type: row.content_type,
            target_skill: row.target_skill,
            skill_gap_size: 0.0,
            rationale: "manually curated by an administrator".to_string(),
            priority_order: row.priority_order,
            source: RecommendationSource::Manual,
            overridden_by: Some(auth.user_id),
            overridden_at: Some(now),
        })
        .collect();

    state
        .sessions
        .replace_recommendations(result_id, &items, auth.user_id, now)
        .await?;
    let saved = state.sessions.get_recommendations(result_id).await?;
    Ok(Json(saved.into_iter().map(Into::into).collect()))
}
