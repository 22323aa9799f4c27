// src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    /// Upper bound for a single store call before it is reported as unavailable.
    pub store_timeout: Duration,
    /// Extra attempts for idempotent store calls that failed transiently.
    pub store_retries: u32,
    /// Deepest allowed reply level (root comments are level 0). `None` disables the cap.
    pub max_reply_depth: Option<usize>,
    /// A repeat visit inside this window does not count as a new view.
    pub view_window: Duration,
    /// Endpoint that receives `{"paths": [...]}` after post changes.
    pub revalidate_url: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let max_reply_depth = match parse_var::<usize>("MAX_REPLY_DEPTH", 8) {
            0 => None,
            depth => Some(depth),
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_var("JWT_EXPIRATION", 86_400),
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            port: parse_var("PORT", 3000),
            store_timeout: Duration::from_millis(parse_var("STORE_TIMEOUT_MS", 3000)),
            store_retries: parse_var("STORE_RETRIES", 1),
            max_reply_depth,
            view_window: Duration::from_secs(parse_var::<u64>("VIEW_WINDOW_MINUTES", 30) * 60),
            revalidate_url: env::var("REVALIDATE_URL").ok().filter(|s| !s.trim().is_empty()),
            cors_origins,
        }
    }

    /// Baseline configuration for tests and local tooling.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            admin_username: None,
            admin_password: None,
            port: 0,
            store_timeout: Duration::from_secs(3),
            store_retries: 1,
            max_reply_depth: Some(8),
            view_window: Duration::from_secs(30 * 60),
            revalidate_url: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
