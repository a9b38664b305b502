//! Trusted identity extraction. JWT verification happens upstream at the BFF;
//! this service trusts `X-User-Id` / `X-User-Role` on the incoming request.

use assess_domain::{ActorType, DomainError};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: ActorType,
}

impl AuthContext {
    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.role == ActorType::Admin {
            Ok(())
        } else {
            Err(DomainError::Forbidden("admin role required".to_string()))
        }
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or(DomainError::Unauthorized)?
            .parse::<Uuid>()
            .map_err(|_| DomainError::Unauthorized)?;

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
            .map(|s| match s.to_ascii_lowercase().as_str() {
                "admin" => ActorType::Admin,
                "system" => ActorType::System,
                _ => ActorType::Student,
            })
            .unwrap_or(ActorType::Student);

        Ok(AuthContext { user_id, role })
    }
}
