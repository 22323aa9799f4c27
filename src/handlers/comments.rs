// src/handlers/comments.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use super::posts::published_post;
use crate::{
    error::AppError,
    models::comment::{CreateCommentRequest, UpdateCommentRequest},
    state::AppState,
    utils::jwt::Claims,
};

/// Comment tree of a post.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = published_post(&state, &slug).await?;
    let tree = state.comments().list_tree(post.id).await?;
    Ok(Json(tree))
}

pub async fn count_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = published_post(&state, &slug).await?;
    let count = state.comments().count_comments(post.id).await?;
    Ok(Json(json!({ "count": count })))
}

/// Creates a comment or reply as the signed-in user.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let post = published_post(&state, &slug).await?;

    let comment = state
        .comments()
        .create_comment(post.id, user_id, &payload.content, payload.parent_id)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    state
        .comments()
        .update_comment(id, user_id, &payload.content)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    state.comments().delete_comment(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lets clients decide whether to show edit and delete controls.
pub async fn comment_permissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let can_edit = state.comments().can_edit(id, user_id).await?;
    Ok(Json(json!({ "can_edit": can_edit, "can_delete": can_edit })))
}
