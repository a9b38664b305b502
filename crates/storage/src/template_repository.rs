//! Templates, their configs, fixed item lists, and assignments.

use assess_domain::{
    AdaptiveParams, AssessmentConfig, AssessmentTemplate, AssessmentType, AssignedAssessment,
    AssignmentStatus, LearningPathway, RubricParams, TemplateItem,
};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::StorageError;

fn assessment_type_to_str(t: AssessmentType) -> &'static str {
    match t {
        AssessmentType::Placement => "PLACEMENT",
        AssessmentType::Speaking => "SPEAKING",
        AssessmentType::Writing => "WRITING",
    }
}

fn parse_assessment_type(s: &str) -> Result<AssessmentType, StorageError> {
    match s {
        "PLACEMENT" => Ok(AssessmentType::Placement),
        "SPEAKING" => Ok(AssessmentType::Speaking),
        "WRITING" => Ok(AssessmentType::Writing),
        other => Err(StorageError::Query(sqlx::Error::Decode(
            format!("invalid assessment type: {other}").into(),
        ))),
    }
}

fn assignment_status_to_str(s: AssignmentStatus) -> &'static str {
    match s {
        AssignmentStatus::Pending => "PENDING",
        AssignmentStatus::InProgress => "IN_PROGRESS",
        AssignmentStatus::Completed => "COMPLETED",
        AssignmentStatus::Expired => "EXPIRED",
    }
}

fn parse_assignment_status(s: &str) -> Result<AssignmentStatus, StorageError> {
    match s {
        "PENDING" => Ok(AssignmentStatus::Pending),
        "IN_PROGRESS" => Ok(AssignmentStatus::InProgress),
        "COMPLETED" => Ok(AssignmentStatus::Completed),
        "EXPIRED" => Ok(AssignmentStatus::Expired),
        other => Err(StorageError::Query(sqlx::Error::Decode(
            format!("invalid assignment status: {other}").into(),
        ))),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    pathway_id: Uuid,
    assessment_type: String,
    rubric: serde_json::Value,
    version: i32,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    active: bool,
}

impl TryFrom<TemplateRow> for AssessmentTemplate {
    type Error = StorageError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(AssessmentTemplate {
            id: row.id,
            pathway_id: row.pathway_id,
            assessment_type: parse_assessment_type(&row.assessment_type)?,
            rubric: row.rubric,
            version: row.version as u32,
            published_at: row.published_at,
            active: row.active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConfigRow {
    template_id: Uuid,
    adaptive_params: Option<Json<AdaptiveParams>>,
    speaking_params: Option<Json<RubricParams>>,
    writing_params: Option<Json<RubricParams>>,
    recommendation_courses_per_skill: i32,
    active: bool,
}

impl From<ConfigRow> for AssessmentConfig {
    fn from(row: ConfigRow) -> Self {
        AssessmentConfig {
            template_id: row.template_id,
            adaptive_params: row.adaptive_params.map(|j| j.0),
            speaking_params: row.speaking_params.map(|j| j.0),
            writing_params: row.writing_params.map(|j| j.0),
            recommendation_courses_per_skill: row.recommendation_courses_per_skill as u32,
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignedRow {
    id: Uuid,
    template_id: Uuid,
    test_taker_id: Uuid,
    group_id: Option<Uuid>,
    assigned_by: Uuid,
    due_at: Option<chrono::DateTime<chrono::Utc>>,
    status: String,
}

impl TryFrom<AssignedRow> for AssignedAssessment {
    type Error = StorageError;

    fn try_from(row: AssignedRow) -> Result<Self, Self::Error> {
        Ok(AssignedAssessment {
            id: row.id,
            template_id: row.template_id,
            test_taker_id: row.test_taker_id,
            group_id: row.group_id,
            assigned_by: row.assigned_by,
            due_at: row.due_at,
            status: parse_assignment_status(&row.status)?,
        })
    }
}

#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_pathway(&self, pathway: &LearningPathway) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO learning_pathways (id, name, active) VALUES ($1, $2, $3)")
            .bind(pathway.id)
            .bind(&pathway.name)
            .bind(pathway.active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_template(&self, id: Uuid) -> Result<AssessmentTemplate, StorageError> {
        let row = sqlx::query_as::<_, TemplateRow>("SELECT * FROM assessment_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("template {id}")))?;
        row.try_into()
    }

    pub async fn create_template(&self, template: &AssessmentTemplate) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO assessment_templates (id, pathway_id, assessment_type, rubric, version, published_at, active)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(template.id)
        .bind(template.pathway_id)
        .bind(assessment_type_to_str(template.assessment_type))
        .bind(&template.rubric)
        .bind(template.version as i32)
        .bind(template.published_at)
        .bind(template.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_config(&self, template_id: Uuid) -> Result<AssessmentConfig, StorageError> {
        let row = sqlx::query_as::<_, ConfigRow>("SELECT * FROM assessment_configs WHERE template_id = $1")
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("config for template {template_id}")))?;
        Ok(row.into())
    }

    pub async fn create_config(&self, config: &AssessmentConfig) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO assessment_configs (template_id, adaptive_params, speaking_params, writing_params, recommendation_courses_per_skill, active)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(config.template_id)
        .bind(config.adaptive_params.as_ref().map(Json))
        .bind(config.speaking_params.as_ref().map(Json))
        .bind(config.writing_params.as_ref().map(Json))
        .bind(config.recommendation_courses_per_skill as i32)
        .bind(config.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_template_items(&self, template_id: Uuid) -> Result<Vec<TemplateItem>, StorageError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            template_id: Uuid,
            item_id: Uuid,
            order_num: i32,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT * FROM template_items WHERE template_id = $1 ORDER BY order_num ASC",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| TemplateItem {
                template_id: r.template_id,
                item_id: r.item_id,
                order: r.order_num as u32,
            })
            .collect())
    }

    pub async fn add_template_item(&self, item: &TemplateItem) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO template_items (template_id, item_id, order_num) VALUES ($1, $2, $3)",
        )
        .bind(item.template_id)
        .bind(item.item_id)
        .bind(item.order as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_assignment(&self, id: Uuid) -> Result<AssignedAssessment, StorageError> {
        let row = sqlx::query_as::<_, AssignedRow>("SELECT * FROM assigned_assessments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("assignment {id}")))?;
        row.try_into()
    }

    pub async fn create_assignment(&self, assignment: &AssignedAssessment) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO assigned_assessments (id, template_id, test_taker_id, group_id, assigned_by, due_at, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(assignment.id)
        .bind(assignment.template_id)
        .bind(assignment.test_taker_id)
        .bind(assignment.group_id)
        .bind(assignment.assigned_by)
        .bind(assignment.due_at)
        .bind(assignment_status_to_str(assignment.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_assignment_status(
        &self,
        id: Uuid,
        status: AssignmentStatus,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE assigned_assessments SET status = $1 WHERE id = $2")
            .bind(assignment_status_to_str(status))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
