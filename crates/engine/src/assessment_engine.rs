//! The Assessment Engine: the session state machine tying the IRT Kernel, the
//! Session Store, and the Scorer Adapter together into `start`/`answer`/`complete`.
//!
//! No column persists "the currently presented item" — it is always recomputed
//! from `(theta, answered item ids, item bank snapshot)` in [`AssessmentEngine::decide_next`],
//! so a crashed or resumed request reproduces the same question deterministically.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use assess_domain::{
    band_from_cutoffs, default_proficiency_range, ActorType, AnswerRequest, AnswerResponse,
    AssessmentResult, AssessmentType, AssignmentStatus, AuditLog, CompleteAssessmentResponse, Item,
    ProgressDto, QuestionDto, Response, Session, SessionDto, SessionStatus, SkillScore,
    StartAssessmentResponse,
};
use assess_irt::ability::{eap_estimate, per_skill_abilities, ScoredResponse, PRIOR_SD};
use assess_irt::cefr::cefr_band;
use assess_irt::selection::{select_next_item, Candidate, SelectionError};
use assess_storage::{
    AuditLogRepository, ContentCatalogRepository, ItemBankRepository, SessionStore, StorageError,
    TemplateRepository,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::recommendation_engine::RecommendationEngine;
use crate::scorer::{ScorerAdapter, ScorerError};

enum NextStep {
    Question(Item, u32),
    Terminate,
}

pub struct AssessmentEngine {
    templates: TemplateRepository,
    items: ItemBankRepository,
    sessions: SessionStore,
    audit: AuditLogRepository,
    recommender: RecommendationEngine,
    speaking_scorer: Arc<dyn ScorerAdapter>,
    writing_scorer: Arc<dyn ScorerAdapter>,
}

impl AssessmentEngine {
    pub fn new(
        templates: TemplateRepository,
        items: ItemBankRepository,
        sessions: SessionStore,
        audit: AuditLogRepository,
        catalog: ContentCatalogRepository,
        speaking_scorer: Arc<dyn ScorerAdapter>,
        writing_scorer: Arc<dyn ScorerAdapter>,
    ) -> Self {
        Self {
            templates,
            items,
            sessions,
            audit,
            recommender: RecommendationEngine::new(catalog),
            speaking_scorer,
            writing_scorer,
        }
    }

    /// Start a fresh attempt, or resume the latest unexpired `IN_PROGRESS` one.
    pub async fn start(
        &self,
        assigned_id: Uuid,
        now: DateTime<Utc>,
        ttl_minutes: i64,
    ) -> Result<StartAssessmentResponse, EngineError> {
        let assignment = self.templates.get_assignment(assigned_id).await?;
        match assignment.status {
            AssignmentStatus::Completed => {
                return Err(EngineError::Conflict("assignment already completed".to_string()))
            }
            AssignmentStatus::Expired => return Err(EngineError::Expired),
            _ => {}
        }

        if let Some(existing) = self.sessions.latest_session_for_assignment(assigned_id).await? {
            if existing.status == SessionStatus::InProgress {
                if existing.expires_at >= now {
                    return self.build_start_response(existing, now).await;
                }
                self.sessions.expire_stale_sessions(now).await?;
            }
        }

        let template = self.templates.get_template(assignment.template_id).await?;
        let config = self.templates.get_config(template.id).await?;
        let starting_ability = config
            .adaptive_params
            .as_ref()
            .map(|p| p.starting_ability)
            .unwrap_or(0.0);

        let session = self
            .sessions
            .create_session(assigned_id, &template, &config, starting_ability, PRIOR_SD, now, ttl_minutes)
            .await?;

        if assignment.status == AssignmentStatus::Pending {
            self.templates
                .update_assignment_status(assigned_id, AssignmentStatus::InProgress)
                .await?;
        }

        self.audit
            .record(&AuditLog {
                id: Uuid::new_v4(),
                actor_id: Some(assignment.test_taker_id),
                actor_type: ActorType::Student,
                action: "session_started".to_string(),
                entity_type: "session".to_string(),
                entity_id: session.id,
                details: serde_json::json!({ "assigned_id": assigned_id }),
                created_at: now,
            })
            .await?;

        self.build_start_response(session, now).await
    }

    /// Submit one answer. Returns the next question, or the final result if this
    /// answer satisfies a termination condition.
    pub async fn answer(
        &self,
        session_id: Uuid,
        req: AnswerRequest,
        now: DateTime<Utc>,
    ) -> Result<AnswerResponse, EngineError> {
        let session = self.sessions.load_session(session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(EngineError::Conflict(format!(
                "session is {:?}, not in progress",
                session.status
            )));
        }
        if session.expires_at < now {
            self.sessions.expire_stale_sessions(now).await?;
            return Err(EngineError::Expired);
        }

        let (item, _expected_index) = match self.decide_next(&session).await? {
            NextStep::Question(item, idx) => (item, idx),
            NextStep::Terminate => {
                let completed = self.finalize(session, now).await?;
                return Ok(AnswerResponse::Completed {
                    session_id: completed.session_id,
                    result: completed.result,
                    recommendations: completed.recommendations,
                });
            }
        };

        if item.id != req.item_id {
            return Err(EngineError::Conflict(format!(
                "expected item {}, got {}",
                item.id, req.item_id
            )));
        }

        let is_correct = (session.template_snapshot.assessment_type == AssessmentType::Placement)
            .then(|| score_placement_response(&item, &req.response_data));
        let media_key = req
            .response_data
            .get("media_key")
            .and_then(|v| v.as_str())
            .map(String::from);
        let asr_transcript = req
            .response_data
            .get("asr_transcript")
            .and_then(|v| v.as_str())
            .map(String::from);

        let response = Response {
            session_id,
            item_id: req.item_id,
            response_data: req.response_data,
            is_correct,
            raw_score: None,
            presented_at: now,
            submitted_at: now,
            time_taken_ms: req.time_taken_ms,
            media_key,
            asr_transcript,
        };

        let (new_ability, new_se) = if session.template_snapshot.assessment_type == AssessmentType::Placement {
            let mut responses_so_far = self.sessions.get_responses(session_id).await?;
            responses_so_far.push(response.clone());
            let scored = self.scored_responses(&responses_so_far).await?;
            let adaptive = session.config_snapshot.adaptive_params.clone().unwrap_or_default();
            let estimate = eap_estimate(&scored, adaptive.quadrature_size, adaptive.starting_ability);
            (estimate.theta, estimate.standard_error)
        } else {
            (session.current_ability, session.standard_error)
        };

        let updated = match self
            .sessions
            .append_response(session_id, req.current_index, &response, new_ability, new_se, SessionStatus::InProgress)
            .await
        {
            Ok(s) => s,
            Err(StorageError::AlreadyAnswered(_)) => {
                // Idempotent replay of an already-recorded answer: reload without re-scoring.
                self.sessions.load_session(session_id).await?
            }
            Err(StorageError::ConcurrentUpdate(msg)) => return Err(EngineError::Conflict(msg)),
            Err(e) => return Err(e.into()),
        };

        self.build_answer_response(updated, now).await
    }

    /// Force-complete a session, regardless of whether its termination condition
    /// has naturally fired yet. Idempotent on an already-completed session.
    pub async fn complete(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<CompleteAssessmentResponse, EngineError> {
        let session = self.sessions.load_session(session_id).await?;
        match session.status {
            SessionStatus::Completed => {
                let result = self
                    .sessions
                    .get_result_by_session(session_id)
                    .await?
                    .ok_or_else(|| EngineError::Internal(anyhow::anyhow!("completed session {session_id} has no result")))?;
                let recommendations = self.sessions.get_recommendations(result.id).await?;
                Ok(CompleteAssessmentResponse {
                    session_id,
                    result: result.into(),
                    recommendations: recommendations.into_iter().map(Into::into).collect(),
                })
            }
            SessionStatus::InProgress => self.finalize(session, now).await,
            SessionStatus::Cancelled => Err(EngineError::Conflict("session was cancelled".to_string())),
            SessionStatus::Expired => Err(EngineError::Expired),
        }
    }

    pub async fn cancel(&self, session_id: Uuid) -> Result<(), EngineError> {
        self.sessions.mark_cancelled(session_id).await?;
        Ok(())
    }

    pub async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<u64, EngineError> {
        Ok(self.sessions.expire_stale_sessions(now).await?)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<SessionDto, EngineError> {
        let s = self.sessions.load_session(session_id).await?;
        Ok(SessionDto {
            id: s.id,
            assigned_id: s.assigned_id,
            status: s.status,
            current_index: s.current_index,
            questions_answered: s.questions_answered,
            started_at: s.started_at,
            completed_at: s.completed_at,
            expires_at: s.expires_at,
        })
    }

    async fn build_start_response(&self, session: Session, now: DateTime<Utc>) -> Result<StartAssessmentResponse, EngineError> {
        match self.decide_next(&session).await? {
            NextStep::Question(item, idx) => Ok(StartAssessmentResponse {
                session_id: session.id,
                status: session.status,
                question: Some(QuestionDto {
                    item_id: item.id,
                    item_type: item.item_type,
                    content: item.content,
                    index: idx,
                }),
                progress: self.build_progress(&session).await?,
            }),
            NextStep::Terminate => {
                // Only reachable if the bank was exhausted or the template's item list
                // emptied between assignment and start; finalize immediately.
                let completed = self.finalize(session, now).await?;
                Ok(StartAssessmentResponse {
                    session_id: completed.session_id,
                    status: SessionStatus::Completed,
                    question: None,
                    progress: ProgressDto {
                        questions_answered: 0,
                        min_questions: 0,
                        max_questions: 0,
                        current_ability_estimate: None,
                    },
                })
            }
        }
    }

    async fn build_answer_response(&self, session: Session, now: DateTime<Utc>) -> Result<AnswerResponse, EngineError> {
        match self.decide_next(&session).await? {
            NextStep::Question(item, idx) => Ok(AnswerResponse::NextQuestion {
                session_id: session.id,
                question: QuestionDto {
                    item_id: item.id,
                    item_type: item.item_type,
                    content: item.content,
                    index: idx,
                },
                progress: self.build_progress(&session).await?,
            }),
            NextStep::Terminate => {
                let completed = self.finalize(session, now).await?;
                Ok(AnswerResponse::Completed {
                    session_id: completed.session_id,
                    result: completed.result,
                    recommendations: completed.recommendations,
                })
            }
        }
    }

    /// Evaluate termination, then pick the next item deterministically if not terminal.
    async fn decide_next(&self, session: &Session) -> Result<NextStep, EngineError> {
        match session.template_snapshot.assessment_type {
            AssessmentType::Placement => {
                let adaptive = session
                    .config_snapshot
                    .adaptive_params
                    .clone()
                    .ok_or_else(|| EngineError::Validation("placement config missing adaptive_params".to_string()))?;

                if session.questions_answered >= adaptive.max_questions {
                    return Ok(NextStep::Terminate);
                }
                if session.questions_answered >= adaptive.min_questions
                    && session.standard_error <= adaptive.stopping_criterion.standard_error
                {
                    return Ok(NextStep::Terminate);
                }

                let answered_ids = self.sessions.get_answered_item_ids(session.id).await?;
                let candidate_items = self.items.list_eligible_candidates(&answered_ids).await?;
                if candidate_items.is_empty() {
                    return Ok(NextStep::Terminate);
                }

                let mut answered_skill_counts: BTreeMap<String, u32> = BTreeMap::new();
                for id in &answered_ids {
                    let answered_item = self.items.get_item(*id).await?;
                    for skill in &answered_item.skill_areas {
                        *answered_skill_counts.entry(skill.clone()).or_insert(0) += 1;
                    }
                }

                let candidates: Vec<Candidate> = candidate_items
                    .iter()
                    .map(|it| Candidate {
                        item_id: it.id,
                        params: it.irt_params,
                        skill_areas: it.skill_areas.clone(),
                    })
                    .collect();

                match select_next_item(
                    session.current_ability,
                    &candidates,
                    &answered_skill_counts,
                    &adaptive.skill_areas,
                    adaptive.top_k_selection,
                    tie_seed(session.id, session.current_index),
                ) {
                    Ok(chosen) => {
                        let item = candidate_items
                            .into_iter()
                            .find(|it| it.id == chosen.item_id)
                            .expect("selected candidate came from candidate_items");
                        Ok(NextStep::Question(item, session.current_index))
                    }
                    Err(SelectionError::BankExhausted) => Ok(NextStep::Terminate),
                }
            }
            AssessmentType::Speaking | AssessmentType::Writing => {
                let template_items = self.templates.get_template_items(session.template_snapshot.id).await?;
                match template_items.get(session.current_index as usize) {
                    Some(ti) => {
                        let item = self.items.get_item(ti.item_id).await?;
                        Ok(NextStep::Question(item, session.current_index))
                    }
                    None => Ok(NextStep::Terminate),
                }
            }
        }
    }

    async fn build_progress(&self, session: &Session) -> Result<ProgressDto, EngineError> {
        match &session.config_snapshot.adaptive_params {
            Some(p) => Ok(ProgressDto {
                questions_answered: session.questions_answered,
                min_questions: p.min_questions,
                max_questions: p.max_questions,
                current_ability_estimate: Some(session.current_ability),
            }),
            None => {
                let total = self.templates.get_template_items(session.template_snapshot.id).await?.len() as u32;
                Ok(ProgressDto {
                    questions_answered: session.questions_answered,
                    min_questions: total,
                    max_questions: total,
                    current_ability_estimate: None,
                })
            }
        }
    }

    async fn scored_responses(&self, responses: &[Response]) -> Result<Vec<ScoredResponse>, EngineError> {
        let mut scored = Vec::with_capacity(responses.len());
        for r in responses {
            let item = self.items.get_item(r.item_id).await?;
            scored.push(ScoredResponse {
                item: item.irt_params,
                correct: r.is_correct.unwrap_or(false),
                skill_areas: item.skill_areas,
            });
        }
        Ok(scored)
    }

    /// Score the session, run the recommendation engine, and persist both atomically.
    async fn finalize(&self, session: Session, now: DateTime<Utc>) -> Result<CompleteAssessmentResponse, EngineError> {
        let responses = self.sessions.get_responses(session.id).await?;
        let assessment_type = session.template_snapshot.assessment_type;

        let (proficiency_level, skill_scores, overall_score, information_metric, criteria_scores) = match assessment_type {
            AssessmentType::Placement => {
                let adaptive = session.config_snapshot.adaptive_params.clone().unwrap_or_default();
                let scored = self.scored_responses(&responses).await?;
                let per_skill = per_skill_abilities(&scored, adaptive.quadrature_size, adaptive.starting_ability);
                let skill_scores: BTreeMap<String, SkillScore> = per_skill
                    .into_iter()
                    .map(|(skill, est)| {
                        (
                            skill,
                            SkillScore {
                                theta: est.theta,
                                standard_error: est.standard_error,
                                cefr: cefr_band(est.theta, &adaptive.proficiency_range),
                            },
                        )
                    })
                    .collect();
                let proficiency_level = cefr_band(session.current_ability, &adaptive.proficiency_range);
                (proficiency_level, skill_scores, session.current_ability, session.standard_error, None)
            }
            AssessmentType::Speaking | AssessmentType::Writing => {
                let rubric = match assessment_type {
                    AssessmentType::Speaking => session.config_snapshot.speaking_params.clone(),
                    _ => session.config_snapshot.writing_params.clone(),
                }
                .ok_or_else(|| EngineError::Validation("missing rubric params for non-adaptive assessment".to_string()))?;

                let scorer = match assessment_type {
                    AssessmentType::Speaking => &self.speaking_scorer,
                    _ => &self.writing_scorer,
                };
                let scored = scorer.score(&responses, &rubric).await.map_err(|e| match e {
                    ScorerError::Unavailable(msg) => EngineError::ScorerUnavailable(msg),
                    ScorerError::Timeout(secs) => EngineError::ScorerUnavailable(format!("scorer timed out after {secs}s")),
                })?;

                let band = band_from_cutoffs(scored.overall_score, &rubric.band_cutoffs);
                let mut skill_scores = BTreeMap::new();
                skill_scores.insert(
                    assessment_type_label(assessment_type).to_string(),
                    SkillScore {
                        theta: scored.overall_score,
                        standard_error: 0.0,
                        cefr: band,
                    },
                );
                (band, skill_scores, scored.overall_score, 0.0, Some(scored.criteria_scores))
            }
        };

        let result = AssessmentResult {
            id: Uuid::new_v4(),
            session_id: session.id,
            proficiency_level,
            skill_scores,
            overall_score,
            result_type: assessment_type,
            information_metric,
            criteria_scores,
            created_at: now,
        };

        let policy = session
            .config_snapshot
            .adaptive_params
            .as_ref()
            .map(|p| p.target_cefr_policy)
            .unwrap_or_default();
        let proficiency_range = session
            .config_snapshot
            .adaptive_params
            .as_ref()
            .map(|p| p.proficiency_range.clone())
            .unwrap_or_else(default_proficiency_range);
        let recommendations = self
            .recommender
            .generate(
                &result,
                session.template_snapshot.pathway_id,
                session.config_snapshot.recommendation_courses_per_skill,
                policy,
                &proficiency_range,
            )
            .await?;

        self.sessions
            .finalize_session(session.id, session.assigned_id, &result, &recommendations, now)
            .await?;

        self.audit
            .record(&AuditLog {
                id: Uuid::new_v4(),
                actor_id: None,
                actor_type: ActorType::System,
                action: "session_finalized".to_string(),
                entity_type: "session".to_string(),
                entity_id: session.id,
                details: serde_json::json!({ "result_id": result.id }),
                created_at: now,
            })
            .await?;

        Ok(CompleteAssessmentResponse {
            session_id: session.id,
            result: result.into(),
            recommendations: recommendations.into_iter().map(Into::into).collect(),
        })
    }
}

fn assessment_type_label(t: AssessmentType) -> &'static str {
    match t {
        AssessmentType::Placement => "placement",
        AssessmentType::Speaking => "speaking",
        AssessmentType::Writing => "writing",
    }
}

fn score_placement_response(item: &Item, response_data: &serde_json::Value) -> bool {
    match (item.content.get("answer"), response_data.get("answer")) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

/// Deterministic per-`(session, index)` seed for randomesque top-k selection.
fn tie_seed(session_id: Uuid, index: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    index.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_seed_is_deterministic_for_same_inputs() {
        let id = Uuid::from_u128(1);
        assert_eq!(tie_seed(id, 3), tie_seed(id, 3));
        assert_ne!(tie_seed(id, 3), tie_seed(id, 4));
    }

    #[test]
    fn placement_scoring_compares_answer_field() {
        let item = Item {
            id: Uuid::from_u128(1),
            content: serde_json::json!({ "prompt": "2+2", "answer": "4" }),
            item_type: "multiple_choice".to_string(),
            skill_areas: Default::default(),
            target_cefr: assess_domain::CefrLevel::A1,
            irt_params: assess_domain::IrtParams::rasch(0.0),
            active: true,
        };
        assert!(score_placement_response(&item, &serde_json::json!({ "answer": "4" })));
        assert!(!score_placement_response(&item, &serde_json::json!({ "answer": "5" })));
        assert!(!score_placement_response(&item, &serde_json::json!({})));
    }
}
