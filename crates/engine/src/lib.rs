//! The Assessment Engine and Recommendation Engine: the business logic that sits
//! between the HTTP surface and the storage/IRT layers.

pub mod assessment_engine;
pub mod error;
pub mod group_directory;
pub mod recommendation_engine;
pub mod scorer;

pub use assessment_engine::AssessmentEngine;
pub use error::EngineError;
pub use group_directory::{GroupDirectory, GroupDirectoryError};
pub use recommendation_engine::RecommendationEngine;
pub use scorer::{ScorerAdapter, ScorerError, WeightedCriteriaScorer};
