#![cfg(feature = "postgres-tests")]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use assess_domain::{
    AdaptiveParams, AnswerRequest, AssessmentConfig, AssessmentTemplate, AssessmentType,
    AssignedAssessment, AssignmentStatus, IrtParams, Item, LearningPathway, SessionStatus,
    SkillCoverage,
};
use assess_engine::{AssessmentEngine, WeightedCriteriaScorer};
use assess_storage::{
    AuditLogRepository, ContentCatalogRepository, ItemBankRepository, SessionStore,
    TemplateRepository,
};

fn placement_item(skill: &str, b: f64) -> Item {
    Item {
        id: Uuid::new_v4(),
        content: serde_json::json!({ "answer": "b" }),
        item_type: "multiple_choice".to_string(),
        skill_areas: [skill.to_string()].into_iter().collect(),
        target_cefr: assess_domain::CefrLevel::B1,
        irt_params: IrtParams { a: 1.2, b, c: 0.1 },
        active: true,
    }
}

async fn build_engine(pool: &PgPool) -> (AssessmentEngine, TemplateRepository, Uuid) {
    let templates = TemplateRepository::new(pool.clone());
    let items = ItemBankRepository::new(pool.clone());
    let sessions = SessionStore::new(pool.clone());
    let audit = AuditLogRepository::new(pool.clone());
    let catalog = ContentCatalogRepository::new(pool.clone());

    let pathway = LearningPathway {
        id: Uuid::new_v4(),
        name: "general english".to_string(),
        active: true,
    };
    templates.create_pathway(&pathway).await.unwrap();

    let mut skill_areas = BTreeMap::new();
    skill_areas.insert(
        "grammar".to_string(),
        SkillCoverage {
            min_items: 0,
            max_items: 5,
        },
    );
    let adaptive_params = AdaptiveParams {
        min_questions: 2,
        max_questions: 3,
        skill_areas,
        ..AdaptiveParams::default()
    };

    let template = AssessmentTemplate {
        id: Uuid::new_v4(),
        pathway_id: pathway.id,
        assessment_type: AssessmentType::Placement,
        rubric: serde_json::json!({}),
        version: 1,
        published_at: Some(Utc::now()),
        active: true,
    };
    templates.create_template(&template).await.unwrap();

    let config = AssessmentConfig {
        template_id: template.id,
        adaptive_params: Some(adaptive_params),
        speaking_params: None,
        writing_params: None,
        recommendation_courses_per_skill: 2,
        active: true,
    };
    templates.create_config(&config).await.unwrap();

    for b in [-1.0, 0.0, 1.0, 1.5] {
        items.create_item(&placement_item("grammar", b)).await.unwrap();
    }

    let assignment = AssignedAssessment {
        id: Uuid::new_v4(),
        template_id: template.id,
        test_taker_id: Uuid::new_v4(),
        group_id: None,
        assigned_by: Uuid::new_v4(),
        due_at: None,
        status: AssignmentStatus::Pending,
    };
    templates.create_assignment(&assignment).await.unwrap();

    let engine = AssessmentEngine::new(
        templates.clone(),
        items,
        sessions,
        audit,
        catalog,
        Arc::new(WeightedCriteriaScorer),
        Arc::new(WeightedCriteriaScorer),
    );

    (engine, templates, assignment.id)
}

#[sqlx::test(migrations = "../../migrations")]
async fn start_then_answer_to_max_questions_completes_the_session(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let (engine, templates, assigned_id) = build_engine(&pool).await;
    let now = Utc::now();

    let start = engine
        .start(assigned_id, now, 60)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;
    assert!(start.question.is_some());

    let assignment = templates
        .get_assignment(assigned_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_assignment failed: {e}")))?;
    assert_eq!(assignment.status, AssignmentStatus::InProgress);

    let session_id = start.session_id;
    let mut next_item_id = start.question.unwrap().item_id;
    let mut current_index = 0u32;

    for _ in 0..3 {
        let answer = engine
            .answer(
                session_id,
                AnswerRequest {
                    item_id: next_item_id,
                    response_data: serde_json::json!({ "answer": "b" }),
                    time_taken_ms: 2000,
                    current_index,
                },
                Utc::now(),
            )
            .await
            .map_err(|e| sqlx::Error::Protocol(format!("answer failed: {e}")))?;

        match answer {
            assess_domain::AnswerResponse::NextQuestion { question, .. } => {
                next_item_id = question.item_id;
                current_index += 1;
            }
            assess_domain::AnswerResponse::Completed { result, .. } => {
                assert_eq!(result.result_type, AssessmentType::Placement);
                let assignment = templates
                    .get_assignment(assigned_id)
                    .await
                    .map_err(|e| sqlx::Error::Protocol(format!("get_assignment failed: {e}")))?;
                assert_eq!(assignment.status, AssignmentStatus::Completed);
                return Ok(());
            }
        }
    }

    panic!("session did not terminate within max_questions");
}

#[sqlx::test(migrations = "../../migrations")]
async fn answer_with_wrong_item_id_is_rejected_as_conflict(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let (engine, _templates, assigned_id) = build_engine(&pool).await;
    let now = Utc::now();

    let start = engine
        .start(assigned_id, now, 60)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;

    let result = engine
        .answer(
            start.session_id,
            AnswerRequest {
                item_id: Uuid::new_v4(),
                response_data: serde_json::json!({ "answer": "b" }),
                time_taken_ms: 1000,
                current_index: 0,
            },
            Utc::now(),
        )
        .await;

    assert!(matches!(result, Err(assess_engine::EngineError::Conflict(_))));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancel_marks_session_cancelled_and_blocks_further_answers(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let (engine, _templates, assigned_id) = build_engine(&pool).await;
    let start = engine
        .start(assigned_id, Utc::now(), 60)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("start failed: {e}")))?;

    engine
        .cancel(start.session_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("cancel failed: {e}")))?;

    let dto = engine
        .get_session(start.session_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_session failed: {e}")))?;
    assert_eq!(dto.status, SessionStatus::Cancelled);

    let result = engine
        .answer(
            start.session_id,
            AnswerRequest {
                item_id: start.question.unwrap().item_id,
                response_data: serde_json::json!({ "answer": "b" }),
                time_taken_ms: 1000,
                current_index: 0,
            },
            Utc::now(),
        )
        .await;
    assert!(result.is_err());
    Ok(())
}
