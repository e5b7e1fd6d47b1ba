use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::database;
use crate::AppState;

pub mod workflows;

pub use workflows::workflow_routes;

pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(pool) = &state.db_pool else {
        return (
            StatusCode::OK,
            Json(json!({"status": "healthy", "service": "crm-automation", "database": "detached"})),
        );
    };

    if database::health_check(pool).await {
        let stats = database::pool_stats(pool);
        (
            StatusCode::OK,
            Json(json!({"status": "healthy", "service": "crm-automation", "database": "up", "pool": stats})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "service": "crm-automation", "database": "down"})),
        )
    }
}
