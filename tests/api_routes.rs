use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use parcel_backoffice::auth::jwt::sign_token;
use parcel_backoffice::config::AppConfig;
use parcel_backoffice::routes::app;
use parcel_backoffice::state::AppState;

const SECRET: &str = "test-secret";

fn test_app() -> Router {
    let config = AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://backoffice@localhost:1/backoffice".to_string()),
        "JWT_SECRET" => Some(SECRET.to_string()),
        _ => None,
    })
    .unwrap();
    // Never connects: every request below is settled before touching the pool.
    let pool = PgPoolOptions::new().connect_lazy(&config.database_url).unwrap();
    app(AppState::new(pool, config))
}

fn token(role: &str) -> String {
    sign_token(1, role, &format!("{role}-1"), SECRET, 1).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_served_under_base_path() {
    let response = test_app()
        .oneshot(request(Method::GET, "/api/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let response = test_app()
        .oneshot(request(Method::GET, "/api/shipping-slips/1", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "unauthorized");
    assert_eq!(body["error"], "Missing Authorization header");
}

#[tokio::test]
async fn token_signed_with_another_secret_is_unauthorized() {
    let forged = sign_token(1, "admin", "admin", "other-secret", 1).unwrap();
    let response = test_app()
        .oneshot(request(Method::GET, "/api/expeditions/1", Some(&forged), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agents_cannot_ship_slips() {
    let response = test_app()
        .oneshot(request(Method::POST, "/api/shipping-slips/3/ship", Some(&token("agent")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], "forbidden");
    assert_eq!(body["error"], "Only managers can ship shipping slips");
}

#[tokio::test]
async fn agents_cannot_receive_expeditions() {
    let payload = json!({ "items": [{ "itemId": 1, "quantity_received": 1 }] });
    let response = test_app()
        .oneshot(request(
            Method::POST,
            "/api/expeditions/1/receive",
            Some(&token("agent")),
            Some(payload),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn slip_without_parcels_is_rejected() {
    let payload = json!({ "zoneId": 2, "parcelCodes": [] });
    let response = test_app()
        .oneshot(request(Method::POST, "/api/shipping-slips", Some(&token("manager")), Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["error"], "A shipping slip needs at least one parcel");
}

#[tokio::test]
async fn duplicate_parcel_codes_are_rejected() {
    let payload = json!({ "zoneId": 2, "parcelCodes": ["PCL-1", " PCL-1 "] });
    let response = test_app()
        .oneshot(request(Method::POST, "/api/shipping-slips", Some(&token("admin")), Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_requires_username() {
    let payload = json!({ "username": "  ", "password": "secret" });
    let response = test_app()
        .oneshot(request(Method::POST, "/api/auth/login", None, Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn me_echoes_token_identity() {
    let response = test_app()
        .oneshot(request(Method::GET, "/api/auth/me", Some(&token("agent")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["role"], "agent");
    assert_eq!(body["username"], "agent-1");
}

#[tokio::test]
async fn negative_quantity_is_a_validation_error() {
    let payload = json!({ "items": [{ "itemId": 1, "quantity_received": -1 }] });
    let response = test_app()
        .oneshot(request(
            Method::POST,
            "/api/expeditions/1/receive/validate",
            Some(&token("manager")),
            Some(payload),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "validation_error");
    assert!(body["error"].as_str().unwrap().contains("quantity_received"));
}

#[tokio::test]
async fn malformed_json_body_is_a_validation_error() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/shipping-slips/1/scan-parcel")
                .header(header::AUTHORIZATION, format!("Bearer {}", token("agent")))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"parcelCode\":"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation_error");
}

#[tokio::test]
async fn non_numeric_id_is_a_validation_error() {
    let response = test_app()
        .oneshot(request(Method::GET, "/api/shipping-slips/abc", Some(&token("agent")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation_error");
}

#[tokio::test]
async fn unknown_status_filter_is_a_validation_error() {
    let response = test_app()
        .oneshot(request(Method::GET, "/api/expeditions?status=lost", Some(&token("agent")), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation_error");
}
