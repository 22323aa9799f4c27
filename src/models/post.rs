use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

use super::tag::Tag;

/// Slugs: lowercase ASCII letters, digits or CJK ideographs, joined by single dashes.
static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9\u{4e00}-\u{9fa5}]+(?:-[a-z0-9\u{4e00}-\u{9fa5}]+)*$")
        .expect("slug pattern is valid")
});

/// Publication state, stored as the `post_status` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    /// Sanitized HTML produced by the editor.
    pub content: String,
    pub cover_image: Option<String>,
    pub status: PostStatus,
    pub views: i64,
    pub likes: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post with the tags attached to it.
#[derive(Debug, Clone, Serialize)]
pub struct PostWithTags {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
}

/// DTO for creating or replacing a post.
#[derive(Debug, Deserialize, Validate)]
pub struct PostRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: String,

    #[validate(
        length(min = 1, max = 200, message = "Slug length must be between 1 and 200 chars"),
        regex(path = *SLUG_RE, message = "Slug may only contain lowercase letters, digits and single dashes")
    )]
    pub slug: String,

    #[serde(default)]
    #[validate(length(max = 500, message = "Excerpt must be at most 500 chars"))]
    pub excerpt: String,

    #[validate(length(
        min = 1,
        max = 100000,
        message = "Content length must be between 1 and 100000 chars"
    ))]
    pub content: String,

    #[validate(custom(function = validate_cover_image))]
    pub cover_image: Option<String>,

    /// Shorthand for `status`: `true` publishes, `false` keeps a draft.
    #[serde(default)]
    pub published: bool,

    /// Explicit status. Takes precedence over `published`; the only way to archive.
    #[serde(default)]
    pub status: Option<PostStatus>,

    /// Replaces the post's tags when present.
    pub tag_ids: Option<Vec<i64>>,
}

fn validate_cover_image(url: &str) -> Result<(), validator::ValidationError> {
    if url.len() > 500 {
        return Err(validator::ValidationError::new("url_too_long"));
    }
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

/// Column values written by insert and update.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Option<i64>,
    pub at: DateTime<Utc>,
    /// Replaces the post's tag links in the same write when present.
    pub tag_ids: Option<Vec<i64>>,
}

impl PostDraft {
    /// Builds the stored form of a validated request. Content is sanitized here.
    pub fn from_request(req: PostRequest, author_id: i64, now: DateTime<Utc>) -> Self {
        let status = req.status.unwrap_or(if req.published {
            PostStatus::Published
        } else {
            PostStatus::Draft
        });
        let published_at = (status != PostStatus::Draft).then_some(now);

        Self {
            title: req.title.trim().to_string(),
            slug: req.slug,
            excerpt: req.excerpt.trim().to_string(),
            content: crate::utils::html::clean_html(&req.content),
            cover_image: req.cover_image.filter(|s| !s.trim().is_empty()),
            status,
            published_at,
            author_id: Some(author_id),
            at: now,
            tag_ids: req.tag_ids,
        }
    }
}

/// Query parameters for listing posts.
#[derive(Debug, Deserialize)]
pub struct PostListParams {
    /// Only posts carrying this tag slug.
    pub tag: Option<String>,
}
