// tests/api_tests.rs

mod common;

use axum::{body::Body, http::Request};
use common::{spawn_app, test_config, test_state};
use serde_json::{Value, json};
use tower::ServiceExt;

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_and_me() {
    let app = spawn_app().await;
    let (id, token) = app.register_user("Alice").await;

    let resp = app
        .client
        .get(app.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let me: Value = resp.json().await.unwrap();
    assert_eq!(me["id"], id);
    assert_eq!(me["display_name"], "Alice");
    assert_eq!(me["is_admin"], false);
}

#[tokio::test]
async fn register_rejects_duplicates_and_short_names() {
    let app = spawn_app().await;

    let resp = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": "admin", "password": "whatever1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    let resp = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": "ab", "password": "whatever1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn login_with_wrong_password_is_401() {
    let app = spawn_app().await;

    let resp = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "admin", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let (state, _) = test_state(test_config()).await;
    let router = blog_backend::create_router(state);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/posts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let app = spawn_app().await;
    let (_, token) = app.register_user("Mallory").await;
    let resp = app
        .client
        .get(app.url("/api/admin/posts"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn drafts_are_hidden_from_visitors() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.create_post(&admin, "visible", true).await;
    app.create_post(&admin, "hidden", false).await;

    let list: Value = app
        .client
        .get(app.url("/api/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let slugs: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["visible"]);

    let resp = app.client.get(app.url("/api/posts/hidden")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let all: Value = app
        .client
        .get(app.url("/api/admin/posts"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn post_content_is_sanitized() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let resp = app
        .client
        .post(app.url("/api/admin/posts"))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "XSS",
            "slug": "xss",
            "content": "<p>ok</p><script>alert(1)</script>",
            "published": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let post: Value = resp.json().await.unwrap();
    assert_eq!(post["content"], "<p>ok</p>");
}

#[tokio::test]
async fn post_changes_trigger_revalidation() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let post = app.create_post(&admin, "first-post", true).await;
    let id = post["id"].as_i64().unwrap();

    let resp = app
        .client
        .put(app.url(&format!("/api/admin/posts/{}", id)))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Renamed",
            "slug": "renamed-post",
            "content": "<p>Updated</p>",
            "published": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["published_at"], post["published_at"]);

    let resp = app
        .client
        .delete(app.url(&format!("/api/admin/posts/{}", id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let calls = app.revalidations.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            vec!["/".to_string(), "/posts/first-post".to_string()],
            vec![
                "/".to_string(),
                "/posts/first-post".to_string(),
                "/posts/renamed-post".to_string()
            ],
            vec!["/".to_string(), "/posts/renamed-post".to_string()],
        ]
    );
}

#[tokio::test]
async fn duplicate_slug_is_conflict() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.create_post(&admin, "taken", true).await;

    let resp = app
        .client
        .post(app.url("/api/admin/posts"))
        .bearer_auth(&admin)
        .json(&json!({ "title": "Again", "slug": "taken", "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn tags_filter_posts() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let resp = app
        .client
        .post(app.url("/api/admin/tags"))
        .bearer_auth(&admin)
        .json(&json!({ "name": "Rust & Axum" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let tag: Value = resp.json().await.unwrap();
    assert_eq!(tag["slug"], "rust-axum");

    let resp = app
        .client
        .post(app.url("/api/admin/posts"))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Tagged",
            "slug": "tagged",
            "content": "x",
            "published": true,
            "tag_ids": [tag["id"]],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    app.create_post(&admin, "untagged", true).await;

    let list: Value = app
        .client
        .get(app.url("/api/posts?tag=rust-axum"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["slug"], "tagged");
    assert_eq!(list[0]["tags"][0]["name"], "Rust & Axum");

    let tags: Value = app
        .client
        .get(app.url("/api/tags"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tags.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn likes_are_counted_once_per_identity() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.create_post(&admin, "likeable", true).await;
    let url = app.url("/api/posts/likeable/like");

    let resp = app
        .client
        .post(&url)
        .json(&json!({ "fingerprint": "abc123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "liked": true, "likes": 1 }));

    let resp = app
        .client
        .post(&url)
        .json(&json!({ "fingerprint": "abc-123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    let (_, token) = app.register_user("Liker").await;
    let resp = app
        .client
        .post(&url)
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let status: Value = app
        .client
        .get(&url)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status, json!({ "liked": true, "likes": 2 }));

    let resp = app.client.post(&url).json(&json!({})).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn views_are_throttled_by_cookie() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.create_post(&admin, "viewed", true).await;

    let visitor = reqwest::Client::builder().cookie_store(true).build().unwrap();
    let url = app.url("/api/posts/viewed/views");

    let first: Value = visitor.post(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(first, json!({ "views": 1, "counted": true }));

    let second: Value = visitor.post(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(second, json!({ "views": 1, "counted": false }));

    let other: Value = app.client.post(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(other, json!({ "views": 2, "counted": true }));
}

#[tokio::test]
async fn unknown_tag_leaves_no_post_behind() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let resp = app
        .client
        .post(app.url("/api/admin/posts"))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Orphan",
            "slug": "orphan-post",
            "content": "x",
            "published": true,
            "tag_ids": [987654],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let all: Value = app
        .client
        .get(app.url("/api/admin/posts"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all, json!([]));

    let resp = app.client.get(app.url("/api/posts/orphan-post")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert!(app.revalidations.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_tag_on_update_keeps_the_stored_post() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let post = app.create_post(&admin, "stable", true).await;
    let id = post["id"].as_i64().unwrap();

    let resp = app
        .client
        .put(app.url(&format!("/api/admin/posts/{}", id)))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Changed",
            "slug": "changed",
            "content": "y",
            "published": true,
            "tag_ids": [987654],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let stored: Value = app
        .client
        .get(app.url(&format!("/api/admin/posts/{}", id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["slug"], "stable");
    assert_eq!(stored["title"], post["title"]);
    assert_eq!(app.revalidations.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn archived_posts_leave_the_public_site() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let post = app.create_post(&admin, "old-news", true).await;
    let id = post["id"].as_i64().unwrap();

    let resp = app
        .client
        .put(app.url(&format!("/api/admin/posts/{}", id)))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Old news",
            "slug": "old-news",
            "content": "x",
            "status": "archived",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let archived: Value = resp.json().await.unwrap();
    assert_eq!(archived["status"], "archived");
    assert_eq!(archived["published_at"], post["published_at"]);

    let resp = app.client.get(app.url("/api/posts/old-news")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let list: Value = app
        .client
        .get(app.url("/api/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn signed_in_like_needs_no_body() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.create_post(&admin, "bodiless", true).await;
    let (_, token) = app.register_user("Liker").await;

    let resp = app
        .client
        .post(app.url("/api/posts/bodiless/like"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "liked": true, "likes": 1 }));

    let resp = app
        .client
        .post(app.url("/api/posts/bodiless/like"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}
