//! Pure item-response-theory math: no I/O, fully deterministic.

pub mod ability;
pub mod cefr;
pub mod model;
pub mod selection;

pub use ability::{eap_estimate, per_skill_abilities, quadrature_grid, AbilityEstimate, ScoredResponse};
pub use cefr::cefr_band;
pub use model::{item_information, probability};
pub use selection::{select_next_item, Candidate, SelectionError};

/// Ability is clamped to this range after every update, per the numerical contract.
pub const THETA_MIN: f64 = -4.0;
pub const THETA_MAX: f64 = 4.0;

/// Probabilities are clamped away from 0/1 before any logarithm is taken.
pub const PROB_EPSILON: f64 = 1e-9;

/// Tolerance used by floating-point comparisons throughout the kernel.
pub const TOLERANCE: f64 = 1e-6;

pub fn clamp_theta(theta: f64) -> f64 {
    theta.clamp(THETA_MIN, THETA_MAX)
}

pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}
