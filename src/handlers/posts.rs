// src/handlers/posts.rs

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        like::{LikeIdentity, LikeOutcome, LikeRequest, LikeResponse, LikeStatusParams},
        post::{Post, PostListParams, PostStatus, PostWithTags},
    },
    state::AppState,
    utils::{jwt::MaybeClaims, view_cookie},
};

/// Looks up a post visitors are allowed to see. Drafts and archived posts are 404.
pub(crate) async fn published_post(state: &AppState, slug: &str) -> Result<Post, AppError> {
    let store = state.store.as_ref();
    state
        .calls()
        .run("find_post_by_slug", move || store.find_post_by_slug(slug))
        .await?
        .filter(|post| post.status == PostStatus::Published)
        .ok_or(AppError::NotFound("Post not found".to_string()))
}

pub(crate) async fn with_tags(state: &AppState, post: Post) -> Result<PostWithTags, AppError> {
    let store = state.store.as_ref();
    let post_id = post.id;
    let tags = state
        .calls()
        .run("tags_for_post", move || store.tags_for_post(post_id))
        .await?;
    Ok(PostWithTags { post, tags })
}

pub(crate) async fn all_with_tags(
    state: &AppState,
    posts: Vec<Post>,
) -> Result<Vec<PostWithTags>, AppError> {
    let mut out = Vec::with_capacity(posts.len());
    for post in posts {
        out.push(with_tags(state, post).await?);
    }
    Ok(out)
}

/// Published posts, newest first, optionally filtered by tag slug.
pub async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();
    let tag = params.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let posts = state
        .calls()
        .run("list_posts", move || store.list_posts(true, tag))
        .await?;

    Ok(Json(all_with_tags(&state, posts).await?))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = published_post(&state, &slug).await?;
    Ok(Json(with_tags(&state, post).await?))
}

/// Counts a view unless this visitor's cookie shows one inside the window.
pub async fn record_view(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let post = published_post(&state, &slug).await?;

    let name = view_cookie::cookie_name(&post.slug);
    let now_ms = Utc::now().timestamp_millis();
    let window = state.config.view_window;

    if !view_cookie::should_count(view_cookie::last_view(&jar, &name), now_ms, window) {
        return Ok((jar, Json(json!({ "views": post.views, "counted": false }))));
    }

    // Not retried: a repeat would count twice.
    let views = state
        .calls()
        .once("increment_views", state.store.increment_views(post.id))
        .await?;

    let jar = jar.add(view_cookie::view_cookie(name, now_ms, window));
    Ok((jar, Json(json!({ "views": views, "counted": true }))))
}

/// Likes a post once per signed-in user or anonymous fingerprint.
///
/// The JSON body only carries the fingerprint, so signed-in callers may omit it.
pub async fn like_post(
    State(state): State<AppState>,
    MaybeClaims(claims): MaybeClaims,
    Path(slug): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: LikeRequest = if body.trim_ascii().is_empty() {
        LikeRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    let user_id = claims.map(|c| c.user_id()).transpose()?;
    let who = LikeIdentity::resolve(user_id, payload.fingerprint.as_deref())?;
    let post = published_post(&state, &slug).await?;

    match state
        .calls()
        .once("add_like", state.store.add_like(post.id, &who))
        .await?
    {
        LikeOutcome::Added { likes } => {
            tracing::info!(post_id = post.id, likes, "Post liked");
            Ok(Json(LikeResponse { liked: true, likes }))
        }
        LikeOutcome::AlreadyLiked { .. } => Err(AppError::Conflict("Already liked".to_string())),
    }
}

/// Whether the caller has liked a post. Anonymous callers without a fingerprint have not.
pub async fn like_status(
    State(state): State<AppState>,
    MaybeClaims(claims): MaybeClaims,
    Path(slug): Path<String>,
    Query(params): Query<LikeStatusParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.map(|c| c.user_id()).transpose()?;
    let post = published_post(&state, &slug).await?;

    let liked = match LikeIdentity::resolve(user_id, params.fingerprint.as_deref()) {
        Ok(who) => {
            let store = state.store.as_ref();
            let post_id = post.id;
            let who = &who;
            state
                .calls()
                .run("has_liked", move || store.has_liked(post_id, who))
                .await?
        }
        Err(_) => false,
    };

    Ok(Json(LikeResponse {
        liked,
        likes: post.likes,
    }))
}
