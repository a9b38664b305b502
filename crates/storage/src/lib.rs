//! Storage layer for the adaptive assessment core: sqlx/Postgres repositories.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod audit_log_repository;
pub mod cache;
pub mod content_catalog_repository;
pub mod error;
pub mod item_bank_repository;
pub mod session_store;
pub mod template_repository;

pub use audit_log_repository::AuditLogRepository;
pub use content_catalog_repository::ContentCatalogRepository;
pub use error::StorageError;
pub use item_bank_repository::ItemBankRepository;
pub use session_store::SessionStore;
pub use template_repository::TemplateRepository;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1").execute(pool).await.map_err(StorageError::Query)?;
    Ok(())
}
