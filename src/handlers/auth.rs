// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{CreateUserRequest, CurrentUser, LoginRequest, NewUser},
    state::AppState,
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let new_user = NewUser {
        username: payload.username.trim().to_string(),
        password_hash: hash_password(&payload.password)?,
        role: "user".to_string(),
        display_name: payload
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
        created_at: Utc::now(),
    };

    let user = state
        .calls()
        .once("insert_user", state.store.insert_user(new_user))
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Username '{}' already exists", payload.username.trim()))
            }
            other => other,
        })?;

    tracing::info!(user_id = user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let store = state.store.as_ref();
    let username = payload.username.trim();
    let user = state
        .calls()
        .run("find_user_by_username", move || store.find_user_by_username(username))
        .await?;

    // Same message for unknown users and bad passwords.
    let user = user
        .filter(|u| verify_password(&payload.password, &u.password).unwrap_or(false))
        .ok_or(AppError::AuthError("Invalid username or password".to_string()))?;

    let token = sign_jwt(
        user.id,
        &user.role,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": CurrentUser::from(user),
    })))
}

/// The signed-in user.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let store = state.store.as_ref();
    let user = state
        .calls()
        .run("find_user", move || store.find_user(user_id))
        .await?
        .ok_or(AppError::AuthError("User no longer exists".to_string()))?;

    Ok(Json(CurrentUser::from(user)))
}
