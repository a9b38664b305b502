//! Next-item selection: maximize Fisher information subject to skill-coverage limits.

use std::collections::{BTreeMap, BTreeSet};

use assess_domain::{IrtParams, SkillCoverage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use uuid::Uuid;

use crate::model::item_information;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub item_id: Uuid,
    pub params: IrtParams,
    pub skill_areas: BTreeSet<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("item bank exhausted: no eligible candidate remains")]
    BankExhausted,
}

/// Pick the next item to present, or [`SelectionError::BankExhausted`] if none
/// of the candidates remains eligible under the skill-coverage caps.
///
/// `answered_skill_counts` is how many already-answered items touched each skill.
/// `skill_coverage` is the per-skill `{min_items, max_items}` from the template's
/// adaptive params. `top_k` selects uniformly (seeded by `tie_seed` for
/// reproducibility) among the `top_k` highest-information eligible candidates;
/// `top_k <= 1` is fully deterministic.
pub fn select_next_item(
    theta: f64,
    candidates: &[Candidate],
    answered_skill_counts: &BTreeMap<String, u32>,
    skill_coverage: &BTreeMap<String, SkillCoverage>,
    top_k: u32,
    tie_seed: u64,
) -> Result<Candidate, SelectionError> {
    let eligible: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            c.skill_areas.iter().all(|skill| {
                skill_coverage
                    .get(skill)
                    .map(|cov| answered_skill_counts.get(skill).copied().unwrap_or(0) < cov.max_items)
                    .unwrap_or(true)
            })
        })
        .collect();

    if eligible.is_empty() {
        return Err(SelectionError::BankExhausted);
    }

    let deficit = |c: &Candidate| -> u32 {
        c.skill_areas
            .iter()
            .map(|skill| {
                let have = answered_skill_counts.get(skill).copied().unwrap_or(0);
                let min = skill_coverage.get(skill).map(|cov| cov.min_items).unwrap_or(0);
                min.saturating_sub(have)
            })
            .max()
            .unwrap_or(0)
    };

    let mut scored: Vec<(&Candidate, f64, u32)> = eligible
        .into_iter()
        .map(|c| (c, item_information(theta, &c.params), deficit(c)))
        .collect();

    scored.sort_by(|(a_cand, a_info, a_def), (b_cand, b_info, b_def)| {
        b_info
            .partial_cmp(a_info)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b_def.cmp(a_def))
            .then_with(|| {
                let a_dist = (a_cand.params.b - theta).abs();
                let b_dist = (b_cand.params.b - theta).abs();
                a_dist.partial_cmp(&b_dist).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a_cand.item_id.cmp(&b_cand.item_id))
    });

    let k = (top_k.max(1) as usize).min(scored.len());
    let chosen = if k <= 1 {
        scored[0].0
    } else {
        let mut rng = StdRng::seed_from_u64(tie_seed);
        let idx = rng.gen_range(0..k);
        scored[idx].0
    };

    Ok(chosen.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u128, b: f64, skill: &str) -> Candidate {
        Candidate {
            item_id: Uuid::from_u128(id),
            params: IrtParams::rasch(b),
            skill_areas: BTreeSet::from([skill.to_string()]),
        }
    }

    #[test]
    fn picks_highest_information_item_at_theta_zero() {
        let candidates = vec![
            candidate(1, -2.0, "grammar"),
            candidate(2, -1.0, "grammar"),
            candidate(3, 0.0, "grammar"),
            candidate(4, 1.0, "grammar"),
            candidate(5, 2.0, "grammar"),
        ];
        let chosen = select_next_item(0.0, &candidates, &BTreeMap::new(), &BTreeMap::new(), 1, 0).unwrap();
        assert_eq!(chosen.item_id, Uuid::from_u128(3));
    }

    #[test]
    fn excludes_items_whose_skill_is_at_max_coverage() {
        let candidates = vec![candidate(1, 0.0, "grammar"), candidate(2, 0.0, "vocabulary")];
        let mut counts = BTreeMap::new();
        counts.insert("grammar".to_string(), 5);
        let mut coverage = BTreeMap::new();
        coverage.insert(
            "grammar".to_string(),
            SkillCoverage { min_items: 2, max_items: 5 },
        );
        let chosen = select_next_item(0.0, &candidates, &counts, &coverage, 1, 0).unwrap();
        assert_eq!(chosen.item_id, Uuid::from_u128(2));
    }

    #[test]
    fn bank_exhausted_when_no_eligible_candidate_remains() {
        let candidates = vec![candidate(1, 0.0, "grammar")];
        let mut counts = BTreeMap::new();
        counts.insert("grammar".to_string(), 5);
        let mut coverage = BTreeMap::new();
        coverage.insert(
            "grammar".to_string(),
            SkillCoverage { min_items: 2, max_items: 5 },
        );
        let err = select_next_item(0.0, &candidates, &counts, &coverage, 1, 0).unwrap_err();
        assert_eq!(err, SelectionError::BankExhausted);
    }

    #[test]
    fn ties_are_broken_by_distance_then_id() {
        // Two items equidistant in information from theta=0 (symmetric b), same skill deficit.
        let candidates = vec![candidate(2, -1.0, "grammar"), candidate(1, 1.0, "grammar")];
        let chosen = select_next_item(0.0, &candidates, &BTreeMap::new(), &BTreeMap::new(), 1, 0).unwrap();
        // Equal |b - theta| -> tie-break falls to item id ordering.
        assert_eq!(chosen.item_id, Uuid::from_u128(1));
    }

    #[test]
    fn selection_is_deterministic_given_the_same_seed() {
        let candidates = vec![
            candidate(1, -0.1, "grammar"),
            candidate(2, 0.0, "grammar"),
            candidate(3, 0.1, "grammar"),
        ];
        let a = select_next_item(0.0, &candidates, &BTreeMap::new(), &BTreeMap::new(), 3, 42).unwrap();
        let b = select_next_item(0.0, &candidates, &BTreeMap::new(), &BTreeMap::new(), 3, 42).unwrap();
        assert_eq!(a.item_id, b.item_id);
    }

    #[test]
    fn never_reselects_excluded_answered_items_when_caller_omits_them() {
        // Caller is responsible for omitting already-answered items from `candidates`;
        // verify an empty candidate list reports bank exhaustion, not a panic.
        let err = select_next_item(0.0, &[], &BTreeMap::new(), &BTreeMap::new(), 1, 0).unwrap_err();
        assert_eq!(err, SelectionError::BankExhausted);
    }
}
