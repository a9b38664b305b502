//! Adaptive Assessment Core server library.

pub mod handlers;
pub mod identity;

use std::sync::Arc;
use std::time::{Duration, Instant};

use assess_config::AppConfig;
use assess_domain::ErrorResponse;
use assess_engine::{AssessmentEngine, GroupDirectory, WeightedCriteriaScorer};
use assess_storage::{
    AuditLogRepository, ContentCatalogRepository, ItemBankRepository, SessionStore,
    TemplateRepository,
};
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub engine: Arc<AssessmentEngine>,
    pub templates: TemplateRepository,
    pub items: ItemBankRepository,
    pub catalog: ContentCatalogRepository,
    pub sessions: SessionStore,
    pub audit: AuditLogRepository,
    pub config: AppConfig,
    pub start_time: Instant,
    /// The external roster service that expands a group id into member
    /// test-taker ids. Unset on every deployment this service ships with;
    /// group assignment fails clearly rather than silently no-opping.
    pub group_directory: Option<Arc<dyn GroupDirectory>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let templates = TemplateRepository::new(pool.clone());
        let items = ItemBankRepository::new(pool.clone());
        let catalog = ContentCatalogRepository::new(pool.clone());
        let sessions = SessionStore::new(pool.clone());
        let audit = AuditLogRepository::new(pool.clone());

        let engine = Arc::new(AssessmentEngine::new(
            templates.clone(),
            items.clone(),
            sessions.clone(),
            audit.clone(),
            catalog.clone(),
            Arc::new(WeightedCriteriaScorer),
            Arc::new(WeightedCriteriaScorer),
        ));

        Self {
            pool,
            engine,
            templates,
            items,
            catalog,
            sessions,
            audit,
            config,
            start_time: Instant::now(),
            group_directory: None,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let deadline = Duration::from_millis(state.config.default_request_deadline_ms);

    Router::new()
        .route("/v1/health", get(handlers::health::health))
        .route("/v1/ready", get(handlers::health::ready))
        .route("/v1/assessments/start", post(handlers::assessments::start_assessment))
        .route("/v1/assessments/{session_id}", get(handlers::assessments::get_session))
        .route(
            "/v1/assessments/{session_id}/answer",
            post(handlers::assessments::answer_assessment),
        )
        .route(
            "/v1/assessments/{session_id}/complete",
            get(handlers::assessments::complete_assessment),
        )
        .route(
            "/v1/assessments/{session_id}/cancel",
            post(handlers::assessments::cancel_assessment),
        )
        .route("/v1/admin/pathways", post(handlers::admin::create_pathway))
        .route("/v1/admin/templates", post(handlers::admin::create_template))
        .route("/v1/admin/templates/configs", post(handlers::admin::create_config))
        .route("/v1/admin/templates/items", post(handlers::admin::add_template_item))
        .route("/v1/admin/items", post(handlers::admin::create_item))
        .route("/v1/admin/courses", post(handlers::admin::create_course))
        .route("/v1/admin/lessons", post(handlers::admin::create_lesson))
        .route("/v1/admin/assessments/assign", post(handlers::admin::assign_assessment))
        .route(
            "/v1/admin/recommendations/{result_id}/override",
            post(handlers::admin::override_recommendations),
        )
        .route("/v1/students/{test_taker_id}/history", get(handlers::students::history))
        .route("/v1/students/{test_taker_id}/progress", get(handlers::students::progress))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(deadline)),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_timeout_error(err: tower::BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(ErrorResponse {
                error: "request deadline exceeded".to_string(),
                details: None,
            }),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("unhandled error: {err}"),
                details: None,
            }),
        )
    }
}

/// Periodically sweeps `IN_PROGRESS` sessions past their TTL into `EXPIRED`.
pub async fn run_expiry_sweep(state: Arc<AppState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match state.engine.expire_stale_sessions(chrono::Utc::now()).await {
            Ok(count) if count > 0 => tracing::info!(count, "expired stale sessions"),
            Ok(_) => {}
            Err(err) => tracing::error!(%err, "session expiry sweep failed"),
        }
    }
}
