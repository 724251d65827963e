pub mod health;
pub mod interactions;

use axum::Router;

pub fn router(interactions_path: &str) -> Router {
    Router::new()
        .merge(health::router())
        .merge(interactions::router(interactions_path))
}
