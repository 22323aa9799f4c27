// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, comments, posts, tags},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public reads (posts, tags, comment trees) need no token.
/// * Writing comments and `/auth/me` need a signed-in user.
/// * Everything under `/api/admin` needs the admin role.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let require_user = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me).route_layer(require_user.clone()));

    let post_routes = Router::new()
        .route("/", get(posts::list_posts))
        .route("/{slug}", get(posts::get_post))
        .route("/{slug}/views", post(posts::record_view))
        .route("/{slug}/like", get(posts::like_status).post(posts::like_post))
        .route(
            "/{slug}/comments",
            get(comments::list_comments)
                .merge(post(comments::create_comment).route_layer(require_user.clone())),
        )
        .route("/{slug}/comments/count", get(comments::count_comments));

    let comment_routes = Router::new()
        .route(
            "/{id}",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/{id}/permissions", get(comments::comment_permissions))
        .route_layer(require_user.clone());

    let tag_routes = Router::new().route("/", get(tags::list_tags));

    let admin_routes = Router::new()
        .route("/posts", get(admin::list_posts).post(admin::create_post))
        .route(
            "/posts/{id}",
            get(admin::get_post)
                .put(admin::update_post)
                .delete(admin::delete_post),
        )
        .route("/tags", post(admin::create_tag))
        .route("/tags/{id}", put(admin::update_tag).delete(admin::delete_tag))
        // Auth first, then Admin check
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(require_user);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/tags", tag_routes)
        .nest("/api/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
