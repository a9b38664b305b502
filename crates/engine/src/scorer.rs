//! The Scorer Adapter: a capability abstraction over external speaking/writing scoring.
//!
//! Mirrors the repository-port shape the rest of this corpus uses for external
//! collaborators — an `#[async_trait]` trait, mockable for tests.

use std::collections::BTreeMap;

use assess_domain::{Response, RubricParams};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ScoredCriteria {
    pub overall_score: f64,
    pub criteria_scores: BTreeMap<String, f64>,
    pub transcript: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("scorer backend unavailable: {0}")]
    Unavailable(String),
    #[error("scorer timed out after {0}s")]
    Timeout(u64),
}

/// A pluggable scorer for one non-adaptive assessment type. `PlacementScorer` is
/// not modeled here: placement scoring is the IRT Kernel itself, run inline by the
/// Assessment Engine, not an external boundary call.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ScorerAdapter: Send + Sync {
    async fn score(
        &self,
        responses: &[Response],
        params: &RubricParams,
    ) -> Result<ScoredCriteria, ScorerError>;
}

/// Weighted-criteria scorer shared by speaking and writing: each response's
/// `response_data` is expected to carry `{"criteria": {name: 0.0..=1.0, ...}}`
/// as produced by the upstream ASR/LLM pipeline; this adapter only aggregates.
pub struct WeightedCriteriaScorer;

#[async_trait]
impl ScorerAdapter for WeightedCriteriaScorer {
    async fn score(
        &self,
        responses: &[Response],
        params: &RubricParams,
    ) -> Result<ScoredCriteria, ScorerError> {
        if responses.is_empty() {
            return Err(ScorerError::Unavailable("no responses to score".to_string()));
        }

        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();

        for response in responses {
            let Some(criteria) = response
                .response_data
                .get("criteria")
                .and_then(|v| v.as_object())
            else {
                continue;
            };
            for (name, value) in criteria {
                if let Some(score) = value.as_f64() {
                    *totals.entry(name.clone()).or_insert(0.0) += score;
                    *counts.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }

        if totals.is_empty() {
            return Err(ScorerError::Unavailable(
                "no scorer criteria present in any response".to_string(),
            ));
        }

        let criteria_scores: BTreeMap<String, f64> = totals
            .into_iter()
            .map(|(name, total)| {
                let count = counts.get(&name).copied().unwrap_or(1).max(1) as f64;
                (name, total / count)
            })
            .collect();

        let weight_sum: f64 = params.criteria_weights.values().sum();
        let overall_score = if weight_sum > 0.0 {
            params
                .criteria_weights
                .iter()
                .map(|(name, weight)| weight * criteria_scores.get(name).copied().unwrap_or(0.0))
                .sum::<f64>()
                / weight_sum
        } else {
            criteria_scores.values().sum::<f64>() / criteria_scores.len() as f64
        };

        let transcript = responses
            .iter()
            .find_map(|r| r.asr_transcript.clone());

        Ok(ScoredCriteria {
            overall_score,
            criteria_scores,
            transcript,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn response_with_criteria(criteria: serde_json::Value) -> Response {
        let now = Utc::now();
        Response {
            session_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            response_data: serde_json::json!({ "criteria": criteria }),
            is_correct: None,
            raw_score: None,
            presented_at: now,
            submitted_at: now,
            time_taken_ms: 1000,
            media_key: None,
            asr_transcript: Some("hello world".to_string()),
        }
    }

    #[tokio::test]
    async fn weighted_scorer_averages_criteria_across_responses() {
        let params = RubricParams::speaking_default();
        let responses = vec![
            response_with_criteria(serde_json::json!({
                "pronunciation": 0.8, "fluency": 0.6, "grammar": 0.7, "vocabulary": 0.7
            })),
            response_with_criteria(serde_json::json!({
                "pronunciation": 0.6, "fluency": 0.8, "grammar": 0.5, "vocabulary": 0.9
            })),
        ];
        let scored = WeightedCriteriaScorer.score(&responses, &params).await.unwrap();
        assert!((scored.criteria_scores["pronunciation"] - 0.7).abs() < 1e-9);
        assert!(scored.overall_score > 0.0 && scored.overall_score <= 1.0);
        assert_eq!(scored.transcript.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn weighted_scorer_errors_when_no_criteria_present() {
        let params = RubricParams::speaking_default();
        let now = Utc::now();
        let response = Response {
            session_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            response_data: serde_json::json!({}),
            is_correct: None,
            raw_score: None,
            presented_at: now,
            submitted_at: now,
            time_taken_ms: 100,
            media_key: None,
            asr_transcript: None,
        };
        let err = WeightedCriteriaScorer.score(&[response], &params).await.unwrap_err();
        assert!(matches!(err, ScorerError::Unavailable(_)));
    }
}
