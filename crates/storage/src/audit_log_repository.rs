//! Append-only audit trail for state-changing actions.

use assess_domain::{ActorType, AuditLog};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::StorageError;

fn actor_type_to_str(t: ActorType) -> &'static str {
    match t {
        ActorType::Student => "student",
        ActorType::Admin => "admin",
        ActorType::System => "system",
    }
}

#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: &AuditLog) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO audit_log (id, actor_id, actor_type, action, entity_type, entity_id, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(actor_type_to_str(entry.actor_type))
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<AuditLog>, StorageError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: Uuid,
            actor_id: Option<Uuid>,
            actor_type: String,
            action: String,
            entity_type: String,
            entity_id: Uuid,
            details: serde_json::Value,
            created_at: DateTime<Utc>,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT * FROM audit_log WHERE entity_type = $1 AND entity_id = $2 ORDER BY created_at DESC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| AuditLog {
                id: r.id,
                actor_id: r.actor_id,
                actor_type: match r.actor_type.as_str() {
                    "admin" => ActorType::Admin,
                    "system" => ActorType::System,
                    _ => ActorType::Student,
                },
                action: r.action,
                entity_type: r.entity_type,
                entity_id: r.entity_id,
                details: r.details,
                created_at: r.created_at,
            })
            .collect())
    }
}
