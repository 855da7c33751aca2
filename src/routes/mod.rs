pub mod expeditions;
pub mod shipping_slips;
pub mod users;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(users::routes(state))
        .merge(shipping_slips::routes(state))
        .merge(expeditions::routes(state))
}

/// Full application: API routes under the configured base path plus health.
pub fn app(state: AppState) -> Router {
    let api = create_router(&state)
        .route("/health", get(health_check));

    let base_path = state.config.base_path.clone();
    let router = if base_path.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&base_path, api)
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
