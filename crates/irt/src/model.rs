//! The 3PL response model and the Fisher information it implies.
//!
//! 2PL is the special case `c == 0`; 1PL (Rasch) additionally fixes `a == 1`.
//! Callers pick a model tier via [`assess_domain::IrtModel`] and pass the item's
//! own `a`/`c` through unchanged — the model tier only constrains how items are
//! authored, not how this module evaluates them.

use assess_domain::IrtParams;

use crate::{clamp_probability, clamp_theta};

/// Probability of a correct response under the 3PL model.
///
/// # Formula
/// `P(theta) = c + (1 - c) / (1 + exp(-a * (theta - b)))`
///
/// `a` is discrimination (steepness), `b` is difficulty (the theta at which an
/// examinee with the item's discrimination has a 50%-above-guessing chance of
/// success), `c` is the pseudo-guessing floor.
///
/// # Behavior
/// - Monotonically increasing in `theta` for `a > 0`.
/// - Approaches `c` as `theta -> -inf`, approaches `1` as `theta -> +inf`.
/// - Result is clamped to `[PROB_EPSILON, 1 - PROB_EPSILON]`.
pub fn probability(theta: f64, item: &IrtParams) -> f64 {
    let theta = clamp_theta(theta);
    let logit = -item.a * (theta - item.b);
    let p = item.c + (1.0 - item.c) / (1.0 + logit.exp());
    clamp_probability(p)
}

/// Fisher information contributed by an item at a given ability.
///
/// # Formula
/// `I(theta) = a^2 * ((1 - P) / P) * ((P - c) / (1 - c))^2`
///
/// # Behavior
/// - Zero width `c -> 1` is disallowed by [`IrtParams::is_valid`]; callers must
///   filter invalid items before calling this.
/// - Peaks near `theta == b` and decays toward zero far from it.
/// - Always non-negative; returns `0.0` if `P <= c` (can occur only from
///   floating-point clamping right at the guessing floor).
pub fn item_information(theta: f64, item: &IrtParams) -> f64 {
    let p = probability(theta, item);
    if p <= item.c {
        return 0.0;
    }
    let one_minus_c = (1.0 - item.c).max(crate::PROB_EPSILON);
    item.a.powi(2) * ((1.0 - p) / p) * ((p - item.c) / one_minus_c).powi(2)
}
