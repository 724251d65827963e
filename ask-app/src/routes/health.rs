use crate::server::BotState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/", get(get_root))
        .route("/api/v1/health", get(get_health))
}

async fn get_root() -> &'static str {
    "Hello World"
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<BotState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "checked_at": Utc::now(),
    }))
}
