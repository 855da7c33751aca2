use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use crate::state::AppState;
use crate::handlers::shipping_slip::{
    cancel_shipping_slip, create_shipping_slip, delete_shipping_slip, get_shipping_slip,
    list_shipping_slips, receive_shipping_slip, scan_parcel, ship_shipping_slip,
};
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/shipping-slips", get(list_shipping_slips).post(create_shipping_slip))
        .route("/shipping-slips/{id}", get(get_shipping_slip).delete(delete_shipping_slip))
        .route("/shipping-slips/{id}/ship", post(ship_shipping_slip))
        .route("/shipping-slips/{id}/receive", post(receive_shipping_slip))
        .route("/shipping-slips/{id}/cancel", post(cancel_shipping_slip))
        .route("/shipping-slips/{id}/scan-parcel", post(scan_parcel))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}
