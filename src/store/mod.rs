//! Persistence boundary.
//!
//! Handlers and services talk to the database only through these traits, so
//! the same logic runs against Postgres in production and against
//! [`MemoryStore`] in tests.

pub mod call;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        comment::{Comment, CommentWithUser, NewComment},
        like::{LikeIdentity, LikeOutcome},
        post::{Post, PostDraft},
        tag::Tag,
        user::{NewUser, User},
    },
};

pub use call::CallPolicy;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn insert_user(&self, new: NewUser) -> StoreResult<User>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Newest first by `published_at`, then `created_at`.
    async fn list_posts(&self, published_only: bool, tag_slug: Option<&str>) -> StoreResult<Vec<Post>>;
    async fn find_post(&self, id: i64) -> StoreResult<Option<Post>>;
    async fn find_post_by_slug(&self, slug: &str) -> StoreResult<Option<Post>>;
    /// Fails with `Conflict` when the slug is taken and `BadRequest` on an unknown
    /// tag id. The row and its tag links are written together or not at all.
    async fn insert_post(&self, draft: PostDraft) -> StoreResult<Post>;
    /// Keeps `author_id` and `created_at`. Returns `None` if the post is gone.
    /// Tag links are replaced in the same write when `draft.tag_ids` is set.
    async fn update_post(&self, id: i64, draft: PostDraft) -> StoreResult<Option<Post>>;
    /// Removes the post with its comments, likes and tag links. Returns whether a row was removed.
    async fn delete_post(&self, id: i64) -> StoreResult<bool>;
    /// Returns the new view count.
    async fn increment_views(&self, post_id: i64) -> StoreResult<i64>;
}

#[async_trait]
pub trait TagStore: Send + Sync {
    /// Ordered by name.
    async fn list_tags(&self) -> StoreResult<Vec<Tag>>;
    async fn find_tag(&self, id: i64) -> StoreResult<Option<Tag>>;
    /// Fails with `Conflict` when the name or slug is taken.
    async fn insert_tag(
        &self,
        name: &str,
        slug: &str,
        description: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Tag>;
    async fn update_tag(&self, tag: &Tag) -> StoreResult<Tag>;
    async fn delete_tag(&self, id: i64) -> StoreResult<bool>;
    /// Ordered by name.
    async fn tags_for_post(&self, post_id: i64) -> StoreResult<Vec<Tag>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn insert_comment(&self, new: NewComment) -> StoreResult<CommentWithUser>;
    /// Includes soft-deleted comments.
    async fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>>;
    /// Non-deleted comments of a post, oldest first.
    async fn list_active_comments(&self, post_id: i64) -> StoreResult<Vec<CommentWithUser>>;
    async fn update_comment_content(
        &self,
        id: i64,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn mark_comment_deleted(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;
    async fn count_active_comments(&self, post_id: i64) -> StoreResult<i64>;
}

#[async_trait]
pub trait LikeStore: Send + Sync {
    /// Records at most one like per identity and post, bumping the post's counter.
    async fn add_like(&self, post_id: i64, who: &LikeIdentity) -> StoreResult<LikeOutcome>;
    async fn has_liked(&self, post_id: i64, who: &LikeIdentity) -> StoreResult<bool>;
}

/// Everything the application needs from persistence.
pub trait Store: UserStore + PostStore + TagStore + CommentStore + LikeStore {}

impl<T> Store for T where T: UserStore + PostStore + TagStore + CommentStore + LikeStore {}
