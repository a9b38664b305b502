//! Expected A Posteriori (EAP) ability estimation over a fixed quadrature grid.

use std::collections::{BTreeMap, BTreeSet};

use assess_domain::IrtParams;

use crate::model::probability;
use crate::{clamp_theta, THETA_MAX, THETA_MIN};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbilityEstimate {
    pub theta: f64,
    pub standard_error: f64,
}

/// One answered item reduced to what the kernel needs: its calibration and outcome.
#[derive(Debug, Clone)]
pub struct ScoredResponse {
    pub item: IrtParams,
    pub correct: bool,
    pub skill_areas: BTreeSet<String>,
}

/// Standard deviation of the standard-normal prior used before any response is observed.
pub const PRIOR_SD: f64 = 1.0;

/// An evenly spaced grid of `size` quadrature points spanning `[THETA_MIN, THETA_MAX]`.
///
/// `size` is clamped to at least 2 so a grid always has distinct endpoints.
pub fn quadrature_grid(size: u32) -> Vec<f64> {
    let n = size.max(2);
    let step = (THETA_MAX - THETA_MIN) / (n as f64 - 1.0);
    (0..n).map(|i| THETA_MIN + step * i as f64).collect()
}

fn standard_normal_density(theta: f64) -> f64 {
    (-theta * theta / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// EAP estimate of theta given a set of scored responses.
///
/// # Formula
/// `theta_hat = sum(theta_q * L(theta_q) * phi(theta_q)) / sum(L(theta_q) * phi(theta_q))`
/// `se = sqrt(sum((theta_q - theta_hat)^2 * L(theta_q) * phi(theta_q)) / sum(L(theta_q) * phi(theta_q)))`
/// where `L` is the response likelihood and `phi` is the standard-normal prior density,
/// both evaluated over a fixed quadrature grid (see [`quadrature_grid`]).
///
/// With no responses, returns `(starting_ability, PRIOR_SD)` — an unanswered session
/// has no information yet, so its "error" is just the prior's spread.
pub fn eap_estimate(
    responses: &[ScoredResponse],
    quadrature_size: u32,
    starting_ability: f64,
) -> AbilityEstimate {
    if responses.is_empty() {
        return AbilityEstimate {
            theta: clamp_theta(starting_ability),
            standard_error: PRIOR_SD,
        };
    }

    let grid = quadrature_grid(quadrature_size);
    let mut weights = Vec::with_capacity(grid.len());
    let mut weight_sum = 0.0;
    let mut theta_weighted_sum = 0.0;

    for &theta in &grid {
        let mut log_likelihood = 0.0;
        for r in responses {
            let p = probability(theta, &r.item);
            log_likelihood += if r.correct { p.ln() } else { (1.0 - p).ln() };
        }
        let weight = log_likelihood.exp() * standard_normal_density(theta);
        weights.push(weight);
        weight_sum += weight;
        theta_weighted_sum += theta * weight;
    }

    if weight_sum <= crate::PROB_EPSILON {
        // Degenerate likelihood (e.g. every item answered maximally unexpectedly);
        // fall back to the prior rather than dividing by ~zero.
        return AbilityEstimate {
            theta: clamp_theta(starting_ability),
            standard_error: PRIOR_SD,
        };
    }

    let theta_hat = theta_weighted_sum / weight_sum;

    let variance_sum: f64 = grid
        .iter()
        .zip(weights.iter())
        .map(|(&theta, &w)| (theta - theta_hat).powi(2) * w)
        .sum();
    let se = (variance_sum / weight_sum).sqrt();

    AbilityEstimate {
        theta: clamp_theta(theta_hat),
        standard_error: se,
    }
}

/// Run [`eap_estimate`] independently per skill, slicing responses to only those
/// tagged with that skill. This is how per-skill CEFR is produced without a true
/// multidimensional IRT model (see the design notes on the deferred MIRT approach).
pub fn per_skill_abilities(
    responses: &[ScoredResponse],
    quadrature_size: u32,
    starting_ability: f64,
) -> BTreeMap<String, AbilityEstimate> {
    let mut skills: BTreeSet<&String> = BTreeSet::new();
    for r in responses {
        skills.extend(r.skill_areas.iter());
    }

    skills
        .into_iter()
        .map(|skill| {
            let subset: Vec<ScoredResponse> = responses
                .iter()
                .filter(|r| r.skill_areas.contains(skill))
                .cloned()
                .collect();
            (
                skill.clone(),
                eap_estimate(&subset, quadrature_size, starting_ability),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(b: f64, correct: bool, skill: &str) -> ScoredResponse {
        ScoredResponse {
            item: IrtParams::rasch(b),
            correct,
            skill_areas: BTreeSet::from([skill.to_string()]),
        }
    }

    #[test]
    fn quadrature_grid_spans_theta_bounds() {
        let grid = quadrature_grid(41);
        assert_eq!(grid.len(), 41);
        assert!((grid[0] - THETA_MIN).abs() < 1e-9);
        assert!((grid[grid.len() - 1] - THETA_MAX).abs() < 1e-9);
    }

    #[test]
    fn no_responses_returns_starting_ability_with_prior_sd() {
        let est = eap_estimate(&[], 41, 0.0);
        assert_eq!(est.theta, 0.0);
        assert_eq!(est.standard_error, PRIOR_SD);
    }

    #[test]
    fn one_correct_response_on_item_at_theta_zero_moves_estimate_positive() {
        // Matches the specification's worked example: theta0=0, item b=0 a=1 c=0,
        // one correct answer -> theta approx 0.46, SE approx 0.93.
        let responses = vec![resp(0.0, true, "grammar")];
        let est = eap_estimate(&responses, 41, 0.0);
        assert!(
            (est.theta - 0.46).abs() < 0.05,
            "theta={} expected ~0.46",
            est.theta
        );
        assert!(
            (est.standard_error - 0.93).abs() < 0.05,
            "se={} expected ~0.93",
            est.standard_error
        );
    }

    #[test]
    fn one_incorrect_response_moves_estimate_negative() {
        let responses = vec![resp(0.0, false, "grammar")];
        let est = eap_estimate(&responses, 41, 0.0);
        assert!(est.theta < 0.0);
    }

    #[test]
    fn more_responses_reduce_standard_error() {
        let few = vec![resp(0.0, true, "grammar")];
        let many = vec![
            resp(-1.0, true, "grammar"),
            resp(0.0, true, "grammar"),
            resp(0.5, true, "grammar"),
            resp(1.0, true, "grammar"),
            resp(1.5, false, "grammar"),
        ];
        let est_few = eap_estimate(&few, 41, 0.0);
        let est_many = eap_estimate(&many, 41, 0.0);
        assert!(est_many.standard_error < est_few.standard_error);
    }

    #[test]
    fn theta_is_always_within_clamped_bounds() {
        let all_correct: Vec<ScoredResponse> = (0..30).map(|i| resp(i as f64 * 0.5, true, "g")).collect();
        let est = eap_estimate(&all_correct, 41, 0.0);
        assert!(est.theta <= THETA_MAX && est.theta >= THETA_MIN);
    }

    #[test]
    fn per_skill_abilities_splits_by_skill_tag() {
        let responses = vec![
            resp(0.0, true, "grammar"),
            resp(0.0, false, "vocabulary"),
            resp(0.5, true, "grammar"),
        ];
        let per_skill = per_skill_abilities(&responses, 41, 0.0);
        assert_eq!(per_skill.len(), 2);
        assert!(per_skill["grammar"].theta > per_skill["vocabulary"].theta);
    }

    #[test]
    fn repeated_estimation_with_same_inputs_is_deterministic() {
        let responses = vec![resp(-0.5, true, "g"), resp(0.5, false, "g")];
        let a = eap_estimate(&responses, 41, 0.0);
        let b = eap_estimate(&responses, 41, 0.0);
        assert_eq!(a.theta, b.theta);
        assert_eq!(a.standard_error, b.standard_error);
    }
}
