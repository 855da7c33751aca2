use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use crate::state::AppState;
use crate::handlers::expedition::{get_expedition, list_expeditions, receive_expedition, validate_reception};
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/expeditions", get(list_expeditions))
        .route("/expeditions/{id}", get(get_expedition))
        .route("/expeditions/{id}/receive", post(receive_expedition))
        .route("/expeditions/{id}/receive/validate", post(validate_reception))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}
