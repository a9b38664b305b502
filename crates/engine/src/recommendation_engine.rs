//! The Recommendation Engine: turns a finalized result's skill gaps into a ranked plan.
//!
//! Candidate ranking mirrors the due-item scoring in the teacher corpus's session
//! scheduling service: compute a priority score per candidate, sort descending,
//! then truncate to the configured width.

use assess_domain::{
    AssessmentResult, CefrLevel, ContentType, RecommendationSource, RecommendedItem,
    TargetCefrPolicy,
};
use assess_storage::ContentCatalogRepository;
use uuid::Uuid;

use crate::error::EngineError;

/// Lessons appended per chosen course, to round out a recommendation without
/// flooding the plan with the course's entire syllabus.
const LESSONS_PER_COURSE: i64 = 2;

/// Upper bound of the clamped ability scale, used as the open end of C2's band
/// when computing its midpoint.
const THETA_MAX: f64 = 4.0;

pub struct RecommendationEngine {
    catalog: ContentCatalogRepository,
}

impl RecommendationEngine {
    pub fn new(catalog: ContentCatalogRepository) -> Self {
        Self { catalog }
    }

    pub async fn generate(
        &self,
        result: &AssessmentResult,
        pathway_id: Uuid,
        courses_per_skill: u32,
        policy: TargetCefrPolicy,
        proficiency_range: &[(f64, CefrLevel)],
    ) -> Result<Vec<RecommendedItem>, EngineError> {
        // One target CEFR for the whole result, not recomputed per skill: a skill
        // already above it is a genuine strength, and subtracting every skill's
        // theta from the same point keeps the ranking ordered by raw ability.
        let target_band = match policy {
            TargetCefrPolicy::CurrentPlusOne => result.proficiency_level.next(),
            TargetCefrPolicy::Fixed(level) => level,
        };
        let target_midpoint = band_midpoint(target_band, proficiency_range);

        let mut gaps: Vec<(String, f64, CefrLevel)> = result
            .skill_scores
            .iter()
            .map(|(skill, score)| (skill.clone(), target_midpoint - score.theta, score.cefr))
            .filter(|(_, gap, _)| *gap > 0.0)
            .collect();

        // Descending gap size; ties broken by skill name for reproducibility.
        gaps.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut recommendations = Vec::new();
        let mut priority_order = 1u32;

        for (skill, gap, current_band) in gaps {
            let bands = [cefr_str(current_band), cefr_str(target_band)];
            let courses = self.catalog.candidate_courses(pathway_id, &bands).await?;
            let matching: Vec<_> = courses
                .into_iter()
                .filter(|c| c.primary_skill == skill)
                .take(courses_per_skill as usize)
                .collect();

            for course in matching {
                recommendations.push(RecommendedItem {
                    id: Uuid::new_v4(),
                    result_id: result.id,
                    content_id: course.id,
                    content_type: ContentType::Course,
                    target_skill: skill.clone(),
                    skill_gap_size: gap,
                    rationale: format!(
                        "{skill} is at {current_band} against a {target_band} target; this course targets {skill} directly."
                    ),
                    priority_order,
                    source: RecommendationSource::Auto,
                    overridden_by: None,
                    overridden_at: None,
                });
                priority_order += 1;

                let lessons = self
                    .catalog
                    .lessons_for_course(course.id, LESSONS_PER_COURSE)
                    .await?;
                for lesson in lessons {
                    if !lesson.target_skills.contains(&skill) {
                        continue;
                    }
                    recommendations.push(RecommendedItem {
                        id: Uuid::new_v4(),
                        result_id: result.id,
                        content_id: lesson.id,
                        content_type: ContentType::Lesson,
                        target_skill: skill.clone(),
                        skill_gap_size: gap,
                        rationale: format!("Follow-up lesson for {skill} within {}.", course.id),
                        priority_order,
                        source: RecommendationSource::Auto,
                        overridden_by: None,
                        overridden_at: None,
                    });
                    priority_order += 1;
                }
            }
        }

        Ok(recommendations)
    }
}

/// Theta midpoint of `band`'s half-open range in `proficiency_range`, used as
/// the target point for `skill_gap_size = target_theta_midpoint - current_theta`.
/// C2's range is open-ended, so its midpoint uses [`THETA_MAX`] as the upper bound.
fn band_midpoint(band: CefrLevel, proficiency_range: &[(f64, CefrLevel)]) -> f64 {
    let idx = proficiency_range
        .iter()
        .position(|(_, b)| *b == band)
        .unwrap_or(0);
    let lower = proficiency_range[idx].0;
    let upper = proficiency_range
        .get(idx + 1)
        .map(|(bound, _)| *bound)
        .unwrap_or(THETA_MAX);
    (lower + upper) / 2.0
}

fn cefr_str(level: CefrLevel) -> &'static str {
    match level {
        CefrLevel::A1 => "A1",
        CefrLevel::A2 => "A2",
        CefrLevel::B1 => "B1",
        CefrLevel::B2 => "B2",
        CefrLevel::C1 => "C1",
        CefrLevel::C2 => "C2",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_domain::default_proficiency_range;

    #[test]
    fn band_midpoint_is_monotonic_across_bands() {
        let range = default_proficiency_range();
        assert!(band_midpoint(CefrLevel::A1, &range) < band_midpoint(CefrLevel::C2, &range));
    }

    #[test]
    fn band_midpoint_matches_hand_computed_bounds() {
        let range = default_proficiency_range();
        // B1 spans [-1.0, 0.5) per default_proficiency_range.
        assert!((band_midpoint(CefrLevel::B1, &range) - (-0.25)).abs() < 1e-9);
        // C2 is open-ended; its midpoint uses THETA_MAX as the upper bound.
        assert!((band_midpoint(CefrLevel::C2, &range) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn gap_ranking_prefers_weaker_skills_over_a_shared_target() {
        // skillScores = {grammar: -0.5, vocabulary: 0.8, reading: 0.2}, overall B1,
        // target B2 (midpoint 1.25): gap order must be grammar > reading > vocabulary,
        // with vocabulary (the strongest skill) ending up smallest.
        let range = default_proficiency_range();
        let target_midpoint = band_midpoint(CefrLevel::B2, &range);
        let grammar_gap = target_midpoint - (-0.5);
        let reading_gap = target_midpoint - 0.2;
        let vocabulary_gap = target_midpoint - 0.8;
        assert!(grammar_gap > reading_gap);
        assert!(reading_gap > vocabulary_gap);
    }
}
