//! Core entities of the adaptive assessment domain.
//!
//! # Architecture
//! - Catalog: [`LearningPathway`], [`Course`], [`Lesson`]
//! - Authoring: [`AssessmentTemplate`], [`AssessmentConfig`], [`TemplateItem`], [`Item`]
//! - Attempts: [`AssignedAssessment`], [`Session`], [`Response`], [`AssessmentResult`], [`RecommendedItem`]
//! - Audit: [`AuditLog`]

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CEFR proficiency band, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    /// One band above `self`, saturating at C2.
    pub fn next(self) -> CefrLevel {
        let idx = Self::ALL.iter().position(|l| *l == self).unwrap_or(0);
        Self::ALL[(idx + 1).min(Self::ALL.len() - 1)]
    }
}

impl std::fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        };
        write!(f, "{s}")
    }
}

/// A skill area an item or course can target. Kept as a string newtype rather than
/// a closed enum: the set of skills is content-authored, not code-authored.
pub type SkillArea = String;

/// Which kind of attempt a template/session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssessmentType {
    Placement,
    Speaking,
    Writing,
}

/// Calibrated IRT parameters for one item, in the 3PL parameterization.
/// 2PL is `c == 0.0`; 1PL (Rasch) additionally fixes `a == 1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrtParams {
    /// Discrimination. Must be > 0.
    pub a: f64,
    /// Difficulty, on the same scale as theta. Practically in [-4, 4].
    pub b: f64,
    /// Pseudo-guessing floor. Must be in [0, 1).
    pub c: f64,
}

impl IrtParams {
    pub fn rasch(b: f64) -> Self {
        IrtParams { a: 1.0, b, c: 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        self.a > 0.0 && (0.0..1.0).contains(&self.c) && self.b.is_finite()
    }
}

/// Which 3PL-family model governs ability estimation for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrtModel {
    OnePl,
    TwoPl,
    ThreePl,
}

/// Stopping rule, evaluated after every answered item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoppingCriterion {
    pub standard_error: f64,
}

/// Policy used by the Recommendation Engine to pick a per-skill target level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "level")]
pub enum TargetCefrPolicy {
    CurrentPlusOne,
    Fixed(CefrLevel),
}

impl Default for TargetCefrPolicy {
    fn default() -> Self {
        TargetCefrPolicy::CurrentPlusOne
    }
}

/// Tunables for an adaptive (Placement) template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParams {
    pub model: IrtModel,
    /// Ability to assume before any response has been observed.
    pub starting_ability: f64,
    pub min_questions: u32,
    pub max_questions: u32,
    pub stopping_criterion: StoppingCriterion,
    /// Minimum and maximum number of items to draw per skill area.
    pub skill_areas: BTreeMap<SkillArea, SkillCoverage>,
    /// Number of equally-informative top candidates to sample from. 1 disables randomesque.
    pub top_k_selection: u32,
    /// Number of quadrature points for EAP integration, spanning [-4, 4].
    pub quadrature_size: u32,
    pub target_cefr_policy: TargetCefrPolicy,
    /// Ascending `(theta_lower_bound, band)` pairs used to map a final theta to a
    /// CEFR band; theta below the first bound still maps to that bound's band.
    pub proficiency_range: Vec<(f64, CefrLevel)>,
}

/// The default theta-to-CEFR boundaries, spanning the clamped [-4, 4] ability scale
/// in six roughly-equal-width bands.
pub fn default_proficiency_range() -> Vec<(f64, CefrLevel)> {
    vec![
        (-4.0, CefrLevel::A1),
        (-2.5, CefrLevel::A2),
        (-1.0, CefrLevel::B1),
        (0.5, CefrLevel::B2),
        (2.0, CefrLevel::C1),
        (3.0, CefrLevel::C2),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCoverage {
    pub min_items: u32,
    pub max_items: u32,
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        AdaptiveParams {
            model: IrtModel::TwoPl,
            starting_ability: 0.0,
            min_questions: 10,
            max_questions: 25,
            stopping_criterion: StoppingCriterion {
                standard_error: 0.3,
            },
            skill_areas: BTreeMap::new(),
            top_k_selection: 1,
            quadrature_size: 41,
            target_cefr_policy: TargetCefrPolicy::CurrentPlusOne,
            proficiency_range: default_proficiency_range(),
        }
    }
}

/// Weighted rubric criteria shared by Speaking and Writing scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricParams {
    /// Criterion name -> weight. Weights should sum to ~1.0 but are normalized at scoring time.
    pub criteria_weights: BTreeMap<String, f64>,
    /// Monotone score (0..=1) -> CEFR band cut points, ascending.
    pub band_cutoffs: Vec<(f64, CefrLevel)>,
    pub scorer_timeout_s: u64,
}

impl RubricParams {
    pub fn speaking_default() -> Self {
        let mut criteria_weights = BTreeMap::new();
        criteria_weights.insert("pronunciation".to_string(), 0.3);
        criteria_weights.insert("fluency".to_string(), 0.3);
        criteria_weights.insert("grammar".to_string(), 0.2);
        criteria_weights.insert("vocabulary".to_string(), 0.2);
        RubricParams {
            criteria_weights,
            band_cutoffs: default_band_cutoffs(),
            scorer_timeout_s: 30,
        }
    }

    pub fn writing_default() -> Self {
        let mut criteria_weights = BTreeMap::new();
        criteria_weights.insert("grammar".to_string(), 0.25);
        criteria_weights.insert("vocabulary".to_string(), 0.25);
        criteria_weights.insert("coherence".to_string(), 0.25);
        criteria_weights.insert("task_achievement".to_string(), 0.25);
        RubricParams {
            criteria_weights,
            band_cutoffs: default_band_cutoffs(),
            scorer_timeout_s: 60,
        }
    }
}

fn default_band_cutoffs() -> Vec<(f64, CefrLevel)> {
    vec![
        (0.0, CefrLevel::A1),
        (0.2, CefrLevel::A2),
        (0.4, CefrLevel::B1),
        (0.6, CefrLevel::B2),
        (0.8, CefrLevel::C1),
        (0.9, CefrLevel::C2),
    ]
}

/// Map a normalized 0..=1 score to a CEFR band using the given cutoffs.
pub fn band_from_cutoffs(score: f64, cutoffs: &[(f64, CefrLevel)]) -> CefrLevel {
    let mut level = CefrLevel::A1;
    for (cutoff, band) in cutoffs {
        if score + 1e-9 >= *cutoff {
            level = *band;
        }
    }
    level
}

/// A namespace grouping templates and catalog content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPathway {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}

/// A blueprint for an attempt. Immutable once published; new edits publish a new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentTemplate {
    pub id: Uuid,
    pub pathway_id: Uuid,
    pub assessment_type: AssessmentType,
    pub rubric: serde_json::Value,
    pub version: u32,
    pub published_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// The single active tunable config for a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    pub template_id: Uuid,
    pub adaptive_params: Option<AdaptiveParams>,
    pub speaking_params: Option<RubricParams>,
    pub writing_params: Option<RubricParams>,
    pub recommendation_courses_per_skill: u32,
    pub active: bool,
}

/// Fixed ordered item list for a non-adaptive (Speaking/Writing) template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateItem {
    pub template_id: Uuid,
    pub item_id: Uuid,
    pub order: u32,
}

/// A calibrated question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub content: serde_json::Value,
    pub item_type: String,
    pub skill_areas: BTreeSet<SkillArea>,
    pub target_cefr: CefrLevel,
    pub irt_params: IrtParams,
    pub active: bool,
}

/// Status of an assignment across its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

/// Grants one attempt of a template to a test-taker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedAssessment {
    pub id: Uuid,
    pub template_id: Uuid,
    pub test_taker_id: Uuid,
    /// Present only if this assignment originated from a group assignment; see
    /// the `GroupDirectory` port for how groups expand to individual test-takers.
    pub group_id: Option<Uuid>,
    pub assigned_by: Uuid,
    pub due_at: Option<DateTime<Utc>>,
    pub status: AssignmentStatus,
}

/// Session lifecycle states: `Init` is implicit (no row exists yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

/// One concrete attempt at an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub assigned_id: Uuid,
    pub current_ability: f64,
    pub standard_error: f64,
    pub questions_answered: u32,
    /// Index of the next expected response; the optimistic-concurrency token.
    pub current_index: u32,
    pub status: SessionStatus,
    /// Snapshot of the template at `started_at`, decoupling this attempt from later edits.
    pub template_snapshot: AssessmentTemplate,
    pub config_snapshot: AssessmentConfig,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// One answered item. Append-only; unique per `(session_id, item_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub session_id: Uuid,
    pub item_id: Uuid,
    pub response_data: serde_json::Value,
    pub is_correct: Option<bool>,
    pub raw_score: Option<f64>,
    pub presented_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub time_taken_ms: u32,
    pub media_key: Option<String>,
    pub asr_transcript: Option<String>,
}

/// Final measurement, written exactly once on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub id: Uuid,
    pub session_id: Uuid,
    pub proficiency_level: CefrLevel,
    pub skill_scores: BTreeMap<SkillArea, SkillScore>,
    pub overall_score: f64,
    pub result_type: AssessmentType,
    pub information_metric: f64,
    pub criteria_scores: Option<BTreeMap<String, f64>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SkillScore {
    pub theta: f64,
    pub standard_error: f64,
    pub cefr: CefrLevel,
}

/// Provenance of a recommendation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecommendationSource {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Course,
    Lesson,
}

/// One row of a learning plan produced for a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub id: Uuid,
    pub result_id: Uuid,
    pub content_id: Uuid,
    pub content_type: ContentType,
    pub target_skill: SkillArea,
    pub skill_gap_size: f64,
    pub rationale: String,
    pub priority_order: u32,
    pub source: RecommendationSource,
    pub overridden_by: Option<Uuid>,
    pub overridden_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub pathway_id: Uuid,
    pub target_cefr: CefrLevel,
    pub primary_skill: SkillArea,
    pub secondary_skills: BTreeSet<SkillArea>,
    pub prerequisites: BTreeSet<Uuid>,
    pub difficulty_order: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub target_skills: BTreeSet<SkillArea>,
    pub order: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Student,
    Admin,
    System,
}

/// Append-only record of a state-changing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
