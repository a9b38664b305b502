//! Theta-to-CEFR banding.

use assess_domain::CefrLevel;

/// Map `theta` to the first band, scanning `proficiency_range` (ascending lower
/// bounds) from the top down, whose lower bound `theta` meets or exceeds.
///
/// `proficiency_range` must be non-empty and sorted ascending by bound; below the
/// first bound still maps to that bound's band (no "below A1" state exists).
pub fn cefr_band(theta: f64, proficiency_range: &[(f64, CefrLevel)]) -> CefrLevel {
    let mut band = proficiency_range
        .first()
        .map(|(_, b)| *b)
        .unwrap_or(CefrLevel::A1);
    for (bound, level) in proficiency_range {
        if theta + crate::TOLERANCE >= *bound {
            band = *level;
        }
    }
    band
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_domain::default_proficiency_range;

    #[test]
    fn theta_below_first_bound_is_a1() {
        let range = default_proficiency_range();
        assert_eq!(cefr_band(-10.0, &range), CefrLevel::A1);
    }

    #[test]
    fn theta_at_top_of_scale_is_c2() {
        let range = default_proficiency_range();
        assert_eq!(cefr_band(4.0, &range), CefrLevel::C2);
    }

    #[test]
    fn theta_exactly_on_a_bound_takes_that_bound() {
        let range = default_proficiency_range();
        assert_eq!(cefr_band(0.5, &range), CefrLevel::B2);
    }

    #[test]
    fn banding_is_monotonic_in_theta() {
        let range = default_proficiency_range();
        let mut prev = cefr_band(-4.0, &range);
        let mut theta = -4.0;
        while theta <= 4.0 {
            theta += 0.1;
            let band = cefr_band(theta, &range);
            assert!(band >= prev, "band regressed at theta={theta}");
            prev = band;
        }
    }
}
