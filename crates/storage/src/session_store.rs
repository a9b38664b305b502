//! The Session Store: durable, transactional session/response/result state with
//! optimistic concurrency keyed by `(session_id, current_index)`.

use assess_domain::{
    AssessmentConfig, AssessmentResult, AssessmentTemplate, CefrLevel, ContentType,
    RecommendationSource, RecommendedItem, Response, Session, SessionStatus, SkillScore,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::item_bank_repository::cefr_to_str;
use crate::StorageError;

fn session_status_to_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::InProgress => "IN_PROGRESS",
        SessionStatus::Completed => "COMPLETED",
        SessionStatus::Cancelled => "CANCELLED",
        SessionStatus::Expired => "EXPIRED",
    }
}

fn parse_session_status(s: &str) -> Result<SessionStatus, StorageError> {
    match s {
        "IN_PROGRESS" => Ok(SessionStatus::InProgress),
        "COMPLETED" => Ok(SessionStatus::Completed),
        "CANCELLED" => Ok(SessionStatus::Cancelled),
        "EXPIRED" => Ok(SessionStatus::Expired),
        other => Err(StorageError::Query(sqlx::Error::Decode(
            format!("invalid session status: {other}").into(),
        ))),
    }
}

fn parse_cefr(s: &str) -> Result<CefrLevel, StorageError> {
    CefrLevel::ALL
        .iter()
        .copied()
        .find(|l| cefr_to_str(*l) == s)
        .ok_or_else(|| StorageError::Query(sqlx::Error::Decode(format!("invalid cefr: {s}").into())))
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    assigned_id: Uuid,
    current_ability: f64,
    standard_error: f64,
    questions_answered: i32,
    current_index: i32,
    status: String,
    template_snapshot: Json<AssessmentTemplate>,
    config_snapshot: Json<AssessmentConfig>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            assigned_id: row.assigned_id,
            current_ability: row.current_ability,
            standard_error: row.standard_error,
            questions_answered: row.questions_answered as u32,
            current_index: row.current_index as u32,
            status: parse_session_status(&row.status)?,
            template_snapshot: row.template_snapshot.0,
            config_snapshot: row.config_snapshot.0,
            started_at: row.started_at,
            completed_at: row.completed_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResponseRow {
    session_id: Uuid,
    item_id: Uuid,
    response_data: serde_json::Value,
    is_correct: Option<bool>,
    raw_score: Option<f64>,
    presented_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    time_taken_ms: i32,
    media_key: Option<String>,
    asr_transcript: Option<String>,
}

impl From<ResponseRow> for Response {
    fn from(row: ResponseRow) -> Self {
        Response {
            session_id: row.session_id,
            item_id: row.item_id,
            response_data: row.response_data,
            is_correct: row.is_correct,
            raw_score: row.raw_score,
            presented_at: row.presented_at,
            submitted_at: row.submitted_at,
            time_taken_ms: row.time_taken_ms as u32,
            media_key: row.media_key,
            asr_transcript: row.asr_transcript,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

impl SessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_session(
        &self,
        assigned_id: Uuid,
        template_snapshot: &AssessmentTemplate,
        config_snapshot: &AssessmentConfig,
        starting_ability: f64,
        prior_sd: f64,
        now: DateTime<Utc>,
        ttl_minutes: i64,
    ) -> Result<Session, StorageError> {
        let id = Uuid::new_v4();
        let expires_at = now + chrono::Duration::minutes(ttl_minutes);
        sqlx::query(
            "INSERT INTO sessions (id, assigned_id, current_ability, standard_error, questions_answered, current_index, status, template_snapshot, config_snapshot, started_at, expires_at)
             VALUES ($1, $2, $3, $4, 0, 0, 'IN_PROGRESS', $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(assigned_id)
        .bind(starting_ability)
        .bind(prior_sd)
        .bind(Json(template_snapshot))
        .bind(Json(config_snapshot))
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        self.load_session(id).await
    }

    pub async fn load_session(&self, id: Uuid) -> Result<Session, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("session {id}")))?;
        row.try_into()
    }

    /// The most recently started session for an assignment, if any.
    pub async fn latest_session_for_assignment(
        &self,
        assigned_id: Uuid,
    ) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE assigned_id = $1 ORDER BY started_at DESC LIMIT 1",
        )
        .bind(assigned_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_responses(&self, session_id: Uuid) -> Result<Vec<Response>, StorageError> {
        let rows = sqlx::query_as::<_, ResponseRow>(
            "SELECT * FROM responses WHERE session_id = $1 ORDER BY submitted_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_answered_item_ids(&self, session_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT item_id FROM responses WHERE session_id = $1")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Append one response under an optimistic `(session_id, expected_index)` check.
    ///
    /// - `Ok(session)` on success, with the session row already advanced.
    /// - [`StorageError::AlreadyAnswered`] if this exact item was already recorded —
    ///   the caller should treat this as an idempotent replay, not a failure.
    /// - [`StorageError::ConcurrentUpdate`] if `expected_index` no longer matches —
    ///   another request won the race.
    ///
    /// Two concurrent callers racing on the same `(session_id, expected_index)` with
    /// the same resulting `item_id` (the deterministic-resumption case: a client
    /// retries the exact answer it already sent) resolve to one winner plus one
    /// `AlreadyAnswered`, not one winner plus one `ConcurrentUpdate` — the idempotent-
    /// replay law takes precedence over CONCURRENT_UPDATE when the two requests are
    /// for the literal same item. A racing caller whose `item_id` does not match what
    /// was actually recorded (stale client state, a different answer) still gets
    /// `ConcurrentUpdate`.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_response(
        &self,
        session_id: Uuid,
        expected_index: u32,
        response: &Response,
        new_ability: f64,
        new_standard_error: f64,
        new_status: SessionStatus,
    ) -> Result<Session, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("session {session_id}")))?;

        if row.current_index != expected_index as i32 {
            let already: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM responses WHERE session_id = $1 AND item_id = $2)",
            )
            .bind(session_id)
            .bind(response.item_id)
            .fetch_one(&mut *tx)
            .await?;
            if already {
                return Err(StorageError::AlreadyAnswered(format!(
                    "item {} on session {session_id}",
                    response.item_id
                )));
            }
            return Err(StorageError::ConcurrentUpdate(format!(
                "session {session_id} expected index {expected_index}, found {}",
                row.current_index
            )));
        }

        sqlx::query(
            "INSERT INTO responses (session_id, item_id, response_data, is_correct, raw_score, presented_at, submitted_at, time_taken_ms, media_key, asr_transcript)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(response.session_id)
        .bind(response.item_id)
        .bind(&response.response_data)
        .bind(response.is_correct)
        .bind(response.raw_score)
        .bind(response.presented_at)
        .bind(response.submitted_at)
        .bind(response.time_taken_ms as i32)
        .bind(&response.media_key)
        .bind(&response.asr_transcript)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, SessionRow>(
            "UPDATE sessions SET current_index = current_index + 1, questions_answered = questions_answered + 1,
                current_ability = $1, standard_error = $2, status = $3
             WHERE id = $4 AND current_index = $5
             RETURNING *",
        )
        .bind(new_ability)
        .bind(new_standard_error)
        .bind(session_status_to_str(new_status))
        .bind(session_id)
        .bind(expected_index as i32)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StorageError::ConcurrentUpdate(format!("session {session_id} lost the race")))?;

        tx.commit().await?;
        updated.try_into()
    }

    pub async fn mark_cancelled(&self, session_id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE sessions SET status = 'CANCELLED' WHERE id = $1 AND status = 'IN_PROGRESS'")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark all stale IN_PROGRESS sessions EXPIRED; returns the count affected.
    pub async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'EXPIRED' WHERE status = 'IN_PROGRESS' AND expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Write the Result and its recommendations, and mark the session/assignment complete,
    /// all in one transaction.
    pub async fn finalize_session(
        &self,
        session_id: Uuid,
        assigned_id: Uuid,
        result: &AssessmentResult,
        recommendations: &[RecommendedItem],
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        insert_result_tx(&mut tx, result).await?;
        for rec in recommendations {
            insert_recommendation_tx(&mut tx, rec).await?;
        }
        sqlx::query("UPDATE sessions SET status = 'COMPLETED', completed_at = $1 WHERE id = $2")
            .bind(now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE assigned_assessments SET status = 'COMPLETED' WHERE id = $1")
            .bind(assigned_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_result_by_session(&self, session_id: Uuid) -> Result<Option<AssessmentResult>, StorageError> {
        let row = sqlx::query_as::<_, ResultRow>("SELECT * FROM results WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Results for a test-taker, newest first, optionally filtered by result type.
    pub async fn list_results_for_test_taker(
        &self,
        test_taker_id: Uuid,
        result_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AssessmentResult>, StorageError> {
        let rows = sqlx::query_as::<_, ResultRow>(
            "SELECT r.* FROM results r
             JOIN sessions s ON s.id = r.session_id
             JOIN assigned_assessments a ON a.id = s.assigned_id
             WHERE a.test_taker_id = $1 AND ($2::text IS NULL OR r.result_type = $2)
             ORDER BY r.created_at DESC
             LIMIT $3",
        )
        .bind(test_taker_id)
        .bind(result_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn latest_result_for_test_taker(
        &self,
        test_taker_id: Uuid,
    ) -> Result<Option<AssessmentResult>, StorageError> {
        Ok(self
            .list_results_for_test_taker(test_taker_id, None, 1)
            .await?
            .into_iter()
            .next())
    }

    pub async fn get_recommendations(&self, result_id: Uuid) -> Result<Vec<RecommendedItem>, StorageError> {
        let rows = sqlx::query_as::<_, RecommendedItemRow>(
            "SELECT * FROM recommended_items WHERE result_id = $1 ORDER BY priority_order ASC",
        )
        .bind(result_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Atomically replace the recommendation set for a result with a manual override.
    pub async fn replace_recommendations(
        &self,
        result_id: Uuid,
        new_items: &[RecommendedItem],
        overridden_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM recommended_items WHERE result_id = $1")
            .bind(result_id)
            .execute(&mut *tx)
            .await?;
        for item in new_items {
            let mut item = item.clone();
            item.overridden_by = Some(overridden_by);
            item.overridden_at = Some(now);
            insert_recommendation_tx(&mut tx, &item).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResultRow {
    id: Uuid,
    session_id: Uuid,
    proficiency_level: String,
    skill_scores: Json<std::collections::BTreeMap<String, SkillScore>>,
    overall_score: f64,
    result_type: String,
    information_metric: f64,
    criteria_scores: Option<Json<std::collections::BTreeMap<String, f64>>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ResultRow> for AssessmentResult {
    type Error = StorageError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let result_type = match row.result_type.as_str() {
            "PLACEMENT" => assess_domain::AssessmentType::Placement,
            "SPEAKING" => assess_domain::AssessmentType::Speaking,
            "WRITING" => assess_domain::AssessmentType::Writing,
            other => {
                return Err(StorageError::Query(sqlx::Error::Decode(
                    format!("invalid result type: {other}").into(),
                )))
            }
        };
        Ok(AssessmentResult {
            id: row.id,
            session_id: row.session_id,
            proficiency_level: parse_cefr(&row.proficiency_level)?,
            skill_scores: row.skill_scores.0,
            overall_score: row.overall_score,
            result_type,
            information_metric: row.information_metric,
            criteria_scores: row.criteria_scores.map(|j| j.0),
            created_at: row.created_at,
        })
    }
}

async fn insert_result_tx(
    tx: &mut Transaction<'_, Postgres>,
    result: &AssessmentResult,
) -> Result<(), StorageError> {
    let result_type = match result.result_type {
        assess_domain::AssessmentType::Placement => "PLACEMENT",
        assess_domain::AssessmentType::Speaking => "SPEAKING",
        assess_domain::AssessmentType::Writing => "WRITING",
    };
    sqlx::query(
        "INSERT INTO results (id, session_id, proficiency_level, skill_scores, overall_score, result_type, information_metric, criteria_scores, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(result.id)
    .bind(result.session_id)
    .bind(cefr_to_str(result.proficiency_level))
    .bind(Json(&result.skill_scores))
    .bind(result.overall_score)
    .bind(result_type)
    .bind(result.information_metric)
    .bind(result.criteria_scores.as_ref().map(Json))
    .bind(result.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct RecommendedItemRow {
    id: Uuid,
    result_id: Uuid,
    content_id: Uuid,
    content_type: String,
    target_skill: String,
    skill_gap_size: f64,
    rationale: String,
    priority_order: i32,
    source: String,
    overridden_by: Option<Uuid>,
    overridden_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecommendedItemRow> for RecommendedItem {
    type Error = StorageError;

    fn try_from(row: RecommendedItemRow) -> Result<Self, Self::Error> {
        let content_type = match row.content_type.as_str() {
            "course" => ContentType::Course,
            "lesson" => ContentType::Lesson,
            other => {
                return Err(StorageError::Query(sqlx::Error::Decode(
                    format!("invalid content type: {other}").into(),
                )))
            }
        };
        let source = match row.source.as_str() {
            "AUTO" => RecommendationSource::Auto,
            "MANUAL" => RecommendationSource::Manual,
            other => {
                return Err(StorageError::Query(sqlx::Error::Decode(
                    format!("invalid recommendation source: {other}").into(),
                )))
            }
        };
        Ok(RecommendedItem {
            id: row.id,
            result_id: row.result_id,
            content_id: row.content_id,
            content_type,
            target_skill: row.target_skill,
            skill_gap_size: row.skill_gap_size,
            rationale: row.rationale,
            priority_order: row.priority_order as u32,
            source,
            overridden_by: row.overridden_by,
            overridden_at: row.overridden_at,
        })
    }
}

async fn insert_recommendation_tx(
    tx: &mut Transaction<'_, Postgres>,
    item: &RecommendedItem,
) -> Result<(), StorageError> {
    let content_type = match item.content_type {
        ContentType::Course => "course",
        ContentType::Lesson => "lesson",
    };
    let source = match item.source {
        RecommendationSource::Auto => "AUTO",
        RecommendationSource::Manual => "MANUAL",
    };
    sqlx::query(
        "INSERT INTO recommended_items (id, result_id, content_id, content_type, target_skill, skill_gap_size, rationale, priority_order, source, overridden_by, overridden_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(item.id)
    .bind(item.result_id)
    .bind(item.content_id)
    .bind(content_type)
    .bind(&item.target_skill)
    .bind(item.skill_gap_size)
    .bind(&item.rationale)
    .bind(item.priority_order as i32)
    .bind(source)
    .bind(item.overridden_by)
    .bind(item.overridden_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
