use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod services;
pub mod validation;
pub mod workflows;

pub use error::{ApiError, ApiResult, AppError};

pub struct AppState {
    pub engine: workflows::WorkflowEngine,
    pub audit: services::AuditLogger,
    pub schedule_runs: jobs::ScheduleRunLog,
    /// Absent when the engine runs on in-process stores
    pub db_pool: Option<sqlx::PgPool>,
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "CRM Workflow Automation API v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
