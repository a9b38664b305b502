#![cfg(feature = "postgres-tests")]

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use assess_domain::{
    AssessmentConfig, AssessmentTemplate, AssessmentType, AssignedAssessment, AssignmentStatus,
    LearningPathway, Response, SessionStatus,
};
use assess_storage::{SessionStore, StorageError, TemplateRepository};

async fn seed_assignment(pool: &PgPool) -> Result<Uuid, sqlx::Error> {
    let templates = TemplateRepository::new(pool.clone());
    let pathway = LearningPathway {
        id: Uuid::new_v4(),
        name: "general english".to_string(),
        active: true,
    };
    templates
        .create_pathway(&pathway)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_pathway failed: {e}")))?;

    let template = AssessmentTemplate {
        id: Uuid::new_v4(),
        pathway_id: pathway.id,
        assessment_type: AssessmentType::Placement,
        rubric: serde_json::json!({}),
        version: 1,
        published_at: None,
        active: true,
    };
    templates
        .create_template(&template)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_template failed: {e}")))?;

    let config = AssessmentConfig {
        template_id: template.id,
        adaptive_params: None,
        speaking_params: None,
        writing_params: None,
        recommendation_courses_per_skill: 2,
        active: true,
    };
    templates
        .create_config(&config)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_config failed: {e}")))?;

    let assignment = AssignedAssessment {
        id: Uuid::new_v4(),
        template_id: template.id,
        test_taker_id: Uuid::new_v4(),
        group_id: None,
        assigned_by: Uuid::new_v4(),
        due_at: None,
        status: AssignmentStatus::Pending,
    };
    templates
        .create_assignment(&assignment)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_assignment failed: {e}")))?;

    Ok(assignment.id)
}

fn sample_response(session_id: Uuid, item_id: Uuid, now: chrono::DateTime<Utc>) -> Response {
    Response {
        session_id,
        item_id,
        response_data: serde_json::json!({ "answer": "b" }),
        is_correct: Some(true),
        raw_score: None,
        presented_at: now,
        submitted_at: now,
        time_taken_ms: 1500,
        media_key: None,
        asr_transcript: None,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn append_response_advances_index_and_is_idempotent_on_replay(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let assigned_id = seed_assignment(&pool).await?;
    let store = SessionStore::new(pool.clone());
    let templates = TemplateRepository::new(pool.clone());

    let assignment = templates
        .get_assignment(assigned_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_assignment failed: {e}")))?;
    let template = templates
        .get_template(assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_template failed: {e}")))?;
    let config = templates
        .get_config(assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_config failed: {e}")))?;

    let now = Utc::now();
    let session = store
        .create_session(assigned_id, &template, &config, 0.0, 1.0, now, 60)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_session failed: {e}")))?;

    assert_eq!(session.current_index, 0);
    assert_eq!(session.questions_answered, 0);

    let item_id = Uuid::new_v4();
    let response = sample_response(session.id, item_id, now);

    let advanced = store
        .append_response(session.id, 0, &response, 0.3, 0.9, SessionStatus::InProgress)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("append_response failed: {e}")))?;

    assert_eq!(advanced.current_index, 1);
    assert_eq!(advanced.questions_answered, 1);
    assert!((advanced.current_ability - 0.3).abs() < 1e-9);

    // Replaying the same (session, expected_index=0) with the same item is a
    // crash-retry: the caller sees AlreadyAnswered rather than a hard failure.
    let replay = store
        .append_response(session.id, 0, &response, 0.3, 0.9, SessionStatus::InProgress)
        .await;
    assert!(matches!(replay, Err(StorageError::AlreadyAnswered(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn append_response_rejects_stale_expected_index(pool: PgPool) -> Result<(), sqlx::Error> {
    let assigned_id = seed_assignment(&pool).await?;
    let store = SessionStore::new(pool.clone());
    let templates = TemplateRepository::new(pool.clone());

    let assignment = templates
        .get_assignment(assigned_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_assignment failed: {e}")))?;
    let template = templates
        .get_template(assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_template failed: {e}")))?;
    let config = templates
        .get_config(assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_config failed: {e}")))?;

    let now = Utc::now();
    let session = store
        .create_session(assigned_id, &template, &config, 0.0, 1.0, now, 60)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_session failed: {e}")))?;

    let first = sample_response(session.id, Uuid::new_v4(), now);
    store
        .append_response(session.id, 0, &first, 0.1, 0.9, SessionStatus::InProgress)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("append_response failed: {e}")))?;

    // A second writer still believes current_index is 0 and submits a
    // different item: it lost the race and must see ConcurrentUpdate.
    let second = sample_response(session.id, Uuid::new_v4(), now);
    let result = store
        .append_response(session.id, 0, &second, 0.2, 0.8, SessionStatus::InProgress)
        .await;
    assert!(matches!(result, Err(StorageError::ConcurrentUpdate(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn expire_stale_sessions_only_touches_expired_in_progress_rows(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let assigned_id = seed_assignment(&pool).await?;
    let store = SessionStore::new(pool.clone());
    let templates = TemplateRepository::new(pool.clone());

    let assignment = templates
        .get_assignment(assigned_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_assignment failed: {e}")))?;
    let template = templates
        .get_template(assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_template failed: {e}")))?;
    let config = templates
        .get_config(assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_config failed: {e}")))?;

    let past = Utc::now() - chrono::Duration::minutes(120);
    let expired = store
        .create_session(assigned_id, &template, &config, 0.0, 1.0, past, 30)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_session failed: {e}")))?;

    let fresh_assigned_id = seed_assignment(&pool).await?;
    let fresh_assignment = templates
        .get_assignment(fresh_assigned_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_assignment failed: {e}")))?;
    let fresh_template = templates
        .get_template(fresh_assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_template failed: {e}")))?;
    let fresh_config = templates
        .get_config(fresh_assignment.template_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("get_config failed: {e}")))?;
    let fresh = store
        .create_session(
            fresh_assigned_id,
            &fresh_template,
            &fresh_config,
            0.0,
            1.0,
            Utc::now(),
            60,
        )
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("create_session failed: {e}")))?;

    let affected = store
        .expire_stale_sessions(Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("expire_stale_sessions failed: {e}")))?;
    assert_eq!(affected, 1);

    let expired_reloaded = store
        .load_session(expired.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("load_session failed: {e}")))?;
    assert_eq!(expired_reloaded.status, SessionStatus::Expired);

    let fresh_reloaded = store
        .load_session(fresh.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("load_session failed: {e}")))?;
    assert_eq!(fresh_reloaded.status, SessionStatus::InProgress);

    Ok(())
}
