//! The Group Directory port: an external collaborator that expands a group id
//! into the member test-taker ids it represents. No concrete implementation
//! ships here — group membership is owned by the portal's roster service, not
//! this core. Mirrors the `ScorerAdapter` shape for the same reason: a genuine
//! external boundary behind a small async trait.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GroupDirectoryError {
    #[error("group directory unavailable: {0}")]
    Unavailable(String),
    #[error("unknown group: {0}")]
    NotFound(Uuid),
}

#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait GroupDirectory: Send + Sync {
    async fn expand_group(&self, group_id: Uuid) -> Result<Vec<Uuid>, GroupDirectoryError>;
}
