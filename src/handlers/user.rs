use axum::extract::{Extension, State};
use axum::Json;
use bcrypt::verify;
use tracing::{info, warn};

use crate::auth::jwt::sign_token;
use crate::dtos::user::{LoginRequest, LoginResponse, MeResponse};
use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::auth::AuthContext;
use crate::models::user::UserCredentials;
use crate::state::AppState;

// POST /auth/login
pub async fn login_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if payload.username.trim().is_empty() {
        return Err(AppError::validation("Username required"));
    }
    if payload.password.is_empty() {
        return Err(AppError::validation("Password required"));
    }

    let user = sqlx::query_as::<_, UserCredentials>(
        "SELECT id, username, password_hash, role, is_active FROM users WHERE username = $1",
    )
    .bind(payload.username.trim())
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    if !user.is_active {
        return Err(AppError::forbidden("User inactive"));
    }

    let ok = verify(&payload.password, &user.password_hash)
        .map_err(|e| AppError::internal(format!("Password verify error: {e}")))?;

    if !ok {
        warn!(username = %user.username, "Failed login");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let ttl = state.config.token_ttl_hours;
    let token = sign_token(user.id, &user.role, &user.username, &state.config.jwt_secret, ttl)?;

    info!(username = %user.username, role = %user.role, "User logged in");
    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in_seconds: ttl * 60 * 60,
    }))
}

// GET /auth/me
pub async fn get_me(Extension(auth): Extension<AuthContext>) -> Json<MeResponse> {
    Json(MeResponse {
        id: auth.user_id,
        role: auth.role,
        username: auth.username,
    })
}
