// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use blog_backend::{
    config::Config,
    models::user::NewUser,
    routes,
    services::revalidate::Revalidator,
    state::AppState,
    store::{MemoryStore, UserStore},
    utils::hash::hash_password,
};
use chrono::Utc;
use serde_json::{Value, json};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";

/// Remembers every batch of paths it was asked to rebuild.
#[derive(Default, Clone)]
pub struct RecordingRevalidator {
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl Revalidator for RecordingRevalidator {
    async fn revalidate(&self, paths: Vec<String>) {
        self.calls.lock().unwrap().push(paths);
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub revalidations: RecordingRevalidator,
}

pub fn test_config() -> Config {
    Config::for_tests("test_secret_for_integration_tests")
}

/// Builds the app state over an in-memory store with a seeded admin account.
pub async fn test_state(config: Config) -> (AppState, RecordingRevalidator) {
    let store = MemoryStore::new();
    store
        .insert_user(NewUser {
            username: ADMIN_USERNAME.to_string(),
            password_hash: hash_password(ADMIN_PASSWORD).unwrap(),
            role: "admin".to_string(),
            display_name: Some("Site Admin".to_string()),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let revalidations = RecordingRevalidator::default();
    let mut state = AppState::new(Arc::new(store), config);
    state.revalidator = Arc::new(revalidations.clone());
    (state, revalidations)
}

/// Spawns the app on a random port.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let (state, revalidations) = test_state(config).await;
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        revalidations,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200, "login failed for {}", username);
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Registers a fresh user and returns `(user id, token)`.
    pub async fn register_user(&self, display_name: &str) -> (i64, String) {
        let username = format!("u_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let resp = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "password": "password123",
                "display_name": display_name,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
        let body: Value = resp.json().await.unwrap();
        let id = body["id"].as_i64().unwrap();
        (id, self.login(&username, "password123").await)
    }

    /// Creates a post through the admin API and returns its JSON.
    pub async fn create_post(&self, admin_token: &str, slug: &str, published: bool) -> Value {
        let resp = self
            .client
            .post(self.url("/api/admin/posts"))
            .bearer_auth(admin_token)
            .json(&json!({
                "title": format!("Post {}", slug),
                "slug": slug,
                "excerpt": "short",
                "content": "<p>Hello</p>",
                "published": published,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
        resp.json().await.unwrap()
    }
}
