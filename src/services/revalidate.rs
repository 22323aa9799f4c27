//! Page cache invalidation after post changes.
//!
//! The front end caches rendered pages; after a post is created, edited or
//! removed we ask it to rebuild the affected paths. Failures are logged and
//! swallowed: a stale page is not worth failing the write that caused it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::{Url, form_urlencoded};

use crate::config::Config;

#[async_trait]
pub trait Revalidator: Send + Sync {
    async fn revalidate(&self, paths: Vec<String>);
}

/// Sends `POST <endpoint>` with `{"paths": [...]}`.
pub struct HttpRevalidator {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRevalidator {
    pub fn new(endpoint: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Revalidator for HttpRevalidator {
    async fn revalidate(&self, paths: Vec<String>) {
        let result = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "paths": paths }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        match result {
            Ok(_) => tracing::info!(?paths, "Revalidated paths"),
            Err(e) => tracing::error!(?paths, "Error revalidating paths: {}", e),
        }
    }
}

/// Used when no endpoint is configured.
pub struct LogRevalidator;

#[async_trait]
impl Revalidator for LogRevalidator {
    async fn revalidate(&self, paths: Vec<String>) {
        tracing::debug!(?paths, "No revalidation endpoint configured, skipping");
    }
}

pub fn from_config(config: &Config) -> Arc<dyn Revalidator> {
    let Some(raw) = config.revalidate_url.as_deref() else {
        return Arc::new(LogRevalidator);
    };

    match Url::parse(raw).map_err(|e| e.to_string()).and_then(|url| {
        HttpRevalidator::new(url).map_err(|e| e.to_string())
    }) {
        Ok(http) => Arc::new(http),
        Err(e) => {
            tracing::warn!("Invalid REVALIDATE_URL {:?} ({}), revalidation disabled", raw, e);
            Arc::new(LogRevalidator)
        }
    }
}

/// Paths to rebuild after a post change: the home page and the post page,
/// under both the old and the new slug when it was renamed.
///
/// Slugs may contain CJK characters, so each post path is sent percent-encoded
/// and, when that differs, also verbatim.
pub fn post_paths(slug: &str, previous_slug: Option<&str>) -> Vec<String> {
    let mut paths = vec!["/".to_string()];
    let mut push_post = |s: &str| {
        let encoded: String = form_urlencoded::byte_serialize(s.as_bytes()).collect();
        for path in [format!("/posts/{}", encoded), format!("/posts/{}", s)] {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    };

    if let Some(old) = previous_slug.filter(|old| *old != slug) {
        push_post(old);
    }
    push_post(slug);
    paths
}

#[cfg(test)]
mod tests {
    use super::post_paths;

    #[test]
    fn ascii_slug_is_sent_once() {
        assert_eq!(post_paths("hello-world", None), vec!["/", "/posts/hello-world"]);
    }

    #[test]
    fn renamed_post_covers_both_slugs() {
        assert_eq!(
            post_paths("new", Some("old")),
            vec!["/", "/posts/old", "/posts/new"]
        );
        assert_eq!(post_paths("same", Some("same")), vec!["/", "/posts/same"]);
    }

    #[test]
    fn cjk_slug_is_sent_encoded_and_raw() {
        assert_eq!(
            post_paths("学习", None),
            vec!["/", "/posts/%E5%AD%A6%E4%B9%A0", "/posts/学习"]
        );
    }
}
