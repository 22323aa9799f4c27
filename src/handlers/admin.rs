// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use super::posts::{all_with_tags, with_tags};
use crate::{
    error::AppError,
    models::{
        post::{Post, PostDraft, PostRequest, PostStatus},
        tag::{CreateTagRequest, Tag, UpdateTagRequest, slugify},
    },
    services::revalidate::post_paths,
    state::AppState,
    utils::jwt::Claims,
};

async fn find_post(state: &AppState, id: i64) -> Result<Post, AppError> {
    let store = state.store.as_ref();
    state
        .calls()
        .run("find_post", move || store.find_post(id))
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))
}

/// Lists every post, drafts included.
/// Admin only.
pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();
    let posts = state
        .calls()
        .run("list_posts", move || store.list_posts(false, None))
        .await?;
    Ok(Json(all_with_tags(&state, posts).await?))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = find_post(&state, id).await?;
    Ok(Json(with_tags(&state, post).await?))
}

/// Creates a post authored by the calling admin.
/// Admin only.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let author_id = claims.user_id()?;

    let draft = PostDraft::from_request(payload, author_id, Utc::now());
    let post = state
        .calls()
        .once("insert_post", state.store.insert_post(draft))
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict("Slug already in use".to_string()),
            other => other,
        })?;

    tracing::info!(post_id = post.id, slug = %post.slug, "Post created");

    state.revalidator.revalidate(post_paths(&post.slug, None)).await;
    Ok((StatusCode::CREATED, Json(with_tags(&state, post).await?)))
}

/// Replaces a post's fields. Tags are replaced only when `tag_ids` is given,
/// in the same store write as the row.
/// Admin only.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<PostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let editor_id = claims.user_id()?;
    let existing = find_post(&state, id).await?;

    let mut draft = PostDraft::from_request(payload, editor_id, Utc::now());
    // Once published, a post keeps its first publication date until it goes back to draft.
    if draft.status != PostStatus::Draft {
        draft.published_at = existing.published_at.or(draft.published_at);
    }

    let store = state.store.as_ref();
    let post = state
        .calls()
        .run("update_post", move || store.update_post(id, draft.clone()))
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict("Slug already in use".to_string()),
            other => other,
        })?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    tracing::info!(post_id = post.id, slug = %post.slug, "Post updated");

    state
        .revalidator
        .revalidate(post_paths(&post.slug, Some(&existing.slug)))
        .await;
    Ok(Json(with_tags(&state, post).await?))
}

/// Deletes a post together with its comments and likes.
/// Admin only.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_post(&state, id).await?;

    let store = state.store.as_ref();
    let removed = state
        .calls()
        .run("delete_post", move || store.delete_post(id))
        .await?;
    if !removed {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    tracing::info!(post_id = id, slug = %existing.slug, "Post deleted");
    state.revalidator.revalidate(post_paths(&existing.slug, None)).await;
    Ok(StatusCode::NO_CONTENT)
}

fn tag_slug(name: &str) -> Result<String, AppError> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Tag name '{}' has no usable characters",
            name
        )));
    }
    Ok(slug)
}

/// Admin only.
pub async fn create_tag(
    State(state): State<AppState>,
    Json(payload): Json<CreateTagRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let name = payload.name.trim();
    let slug = tag_slug(name)?;
    let description = payload
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let tag = state
        .calls()
        .once(
            "insert_tag",
            state.store.insert_tag(name, &slug, description, Utc::now()),
        )
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict(format!("Tag '{}' already exists", name)),
            other => other,
        })?;

    Ok((StatusCode::CREATED, Json(tag)))
}

/// Admin only.
pub async fn update_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTagRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let store = state.store.as_ref();
    let mut tag: Tag = state
        .calls()
        .run("find_tag", move || store.find_tag(id))
        .await?
        .ok_or(AppError::NotFound("Tag not found".to_string()))?;

    if let Some(name) = payload.name.as_deref().map(str::trim) {
        tag.slug = tag_slug(name)?;
        tag.name = name.to_string();
    }
    if let Some(description) = payload.description {
        let description = description.trim().to_string();
        tag.description = (!description.is_empty()).then_some(description);
    }
    tag.updated_at = Utc::now();

    let tag = &tag;
    let updated = state
        .calls()
        .run("update_tag", move || store.update_tag(tag))
        .await?;
    Ok(Json(updated))
}

/// Admin only.
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();
    let removed = state
        .calls()
        .run("delete_tag", move || store.delete_tag(id))
        .await?;
    if !removed {
        return Err(AppError::NotFound("Tag not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
