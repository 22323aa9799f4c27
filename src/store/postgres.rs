use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::{CommentStore, LikeStore, PostStore, StoreResult, TagStore, UserStore};
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

/// Columns of `CommentWithUser`, for queries aliasing comments as `c` and users as `u`.
const COMMENT_WITH_USER_COLUMNS: &str = r#"
    c.id, c.post_id, c.parent_id, c.user_id, c.content,
    c.created_at, c.updated_at, c.is_deleted,
    COALESCE(NULLIF(TRIM(u.display_name), ''), u.username, 'Anonymous') AS user_name,
    u.avatar_url AS user_avatar_url
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps unique violations to `Conflict`, everything else through `From<sqlx::Error>`.
fn conflict_or(err: sqlx::Error, message: impl FnOnce() -> String) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message()),
        _ => {
            tracing::error!("Database error: {:?}", err);
            AppError::from(err)
        }
    }
}

/// Replaces a post's tag links inside the caller's transaction.
/// A tag id with no row is a `BadRequest` through the foreign key.
async fn replace_post_tags(conn: &mut PgConnection, post_id: i64, tag_ids: &[i64]) -> StoreResult<()> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

    if tag_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO post_tags (post_id, tag_id)
        SELECT $1, tag_id FROM UNNEST($2::BIGINT[]) AS tag_id
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(post_id)
    .bind(tag_ids)
    .execute(&mut *conn)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::BadRequest("Unknown tag id".to_string())
        }
        _ => AppError::from(e),
    })?;
    Ok(())
}

fn like_columns(who: &LikeIdentity) -> (Option<i64>, Option<&str>) {
    match who {
        LikeIdentity::User(id) => (Some(*id), None),
        LikeIdentity::Fingerprint(fp) => (None, Some(fp.as_str())),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password, role, display_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.role)
        .bind(&new.display_name)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, || format!("Username '{}' already exists", new.username)))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn list_posts(&self, published_only: bool, tag_slug: Option<&str>) -> StoreResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT p.*
            FROM posts p
            WHERE (NOT $1 OR p.status = 'published')
              AND ($2::TEXT IS NULL OR EXISTS (
                    SELECT 1
                    FROM post_tags pt
                    JOIN tags t ON t.id = pt.tag_id
                    WHERE pt.post_id = p.id AND t.slug = $2
              ))
            ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC, p.id DESC
            "#,
        )
        .bind(published_only)
        .bind(tag_slug)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list posts: {:?}", e);
            AppError::from(e)
        })?;

        Ok(posts)
    }

    async fn find_post(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_post_by_slug(&self, slug: &str) -> StoreResult<Option<Post>> {
        Ok(sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_post(&self, draft: PostDraft) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts
                (title, slug, excerpt, content, cover_image, status,
                 published_at, author_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.excerpt)
        .bind(&draft.content)
        .bind(&draft.cover_image)
        .bind(draft.status)
        .bind(draft.published_at)
        .bind(draft.author_id)
        .bind(draft.at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, || format!("Slug '{}' already exists", draft.slug)))?;

        if let Some(tag_ids) = draft.tag_ids.as_deref() {
            replace_post_tags(&mut *tx, post.id, tag_ids).await?;
        }

        tx.commit().await?;
        Ok(post)
    }

    async fn update_post(&self, id: i64, draft: PostDraft) -> StoreResult<Option<Post>> {
        let mut tx = self.pool.begin().await?;

        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET title = $2, slug = $3, excerpt = $4, content = $5, cover_image = $6,
                status = $7, published_at = $8, updated_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.excerpt)
        .bind(&draft.content)
        .bind(&draft.cover_image)
        .bind(draft.status)
        .bind(draft.published_at)
        .bind(draft.at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, || format!("Slug '{}' already exists", draft.slug)))?;

        let Some(post) = post else {
            return Ok(None);
        };
        if let Some(tag_ids) = draft.tag_ids.as_deref() {
            replace_post_tags(&mut *tx, post.id, tag_ids).await?;
        }

        tx.commit().await?;
        Ok(Some(post))
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        // Comments, likes and tag links go with the post through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete post: {:?}", e);
                AppError::from(e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, post_id: i64) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING views")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }
}

#[async_trait]
impl TagStore for PgStore {
    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(sqlx::query_as::<_, Tag>("SELECT * FROM tags ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_tag(&self, id: i64) -> StoreResult<Option<Tag>> {
        Ok(sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_tag(
        &self,
        name: &str,
        slug: &str,
        description: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Tag> {
        sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (name, slug, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, || format!("Tag '{}' already exists", name)))
    }

    async fn update_tag(&self, tag: &Tag) -> StoreResult<Tag> {
        sqlx::query_as::<_, Tag>(
            r#"
            UPDATE tags
            SET name = $2, slug = $3, description = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(tag.id)
        .bind(&tag.name)
        .bind(&tag.slug)
        .bind(&tag.description)
        .bind(tag.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or(e, || format!("Tag '{}' already exists", tag.name)))?
        .ok_or_else(|| AppError::NotFound("Tag not found".to_string()))
    }

    async fn delete_tag(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tags_for_post(&self, post_id: i64) -> StoreResult<Vec<Tag>> {
        Ok(sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.*
            FROM tags t
            JOIN post_tags pt ON pt.tag_id = t.id
            WHERE pt.post_id = $1
            ORDER BY t.name ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn insert_comment(&self, new: NewComment) -> StoreResult<CommentWithUser> {
        let sql = format!(
            r#"
            WITH c AS (
                INSERT INTO comments (post_id, parent_id, user_id, content, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $5)
                RETURNING *
            )
            SELECT {COMMENT_WITH_USER_COLUMNS}
            FROM c
            LEFT JOIN users u ON u.id = c.user_id
            "#
        );

        sqlx::query_as::<_, CommentWithUser>(&sql)
            .bind(new.post_id)
            .bind(new.parent_id)
            .bind(new.user_id)
            .bind(&new.content)
            .bind(new.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                // (post_id, parent_id) must name a comment of the same post.
                sqlx::Error::Database(db)
                    if db.constraint() == Some("comments_post_id_parent_id_fkey") =>
                {
                    AppError::InvalidParent("Parent comment not found on this post".to_string())
                }
                sqlx::Error::Database(db) if db.is_check_violation() => {
                    AppError::BadRequest("Comment must be 1 to 1000 characters".to_string())
                }
                _ => {
                    tracing::error!("Failed to create comment: {:?}", e);
                    AppError::from(e)
                }
            })
    }

    async fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, parent_id, user_id, content, created_at, updated_at, is_deleted
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_active_comments(&self, post_id: i64) -> StoreResult<Vec<CommentWithUser>> {
        let sql = format!(
            r#"
            SELECT {COMMENT_WITH_USER_COLUMNS}
            FROM comments c
            LEFT JOIN users u ON u.id = c.user_id
            WHERE c.post_id = $1 AND NOT c.is_deleted
            ORDER BY c.created_at ASC, c.id ASC
            "#
        );

        Ok(sqlx::query_as::<_, CommentWithUser>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_comment_content(
        &self,
        id: i64,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE comments SET content = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(content)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }
        Ok(())
    }

    async fn mark_comment_deleted(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE comments SET is_deleted = TRUE, updated_at = $2 WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }
        Ok(())
    }

    async fn count_active_comments(&self, post_id: i64) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE post_id = $1 AND NOT is_deleted",
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl LikeStore for PgStore {
    async fn add_like(&self, post_id: i64, who: &LikeIdentity) -> StoreResult<LikeOutcome> {
        let (user_id, fingerprint) = like_columns(who);
        let mut tx = self.pool.begin().await?;

        // Lock the post row so the counter and the like rows move together.
        let current = sqlx::query_scalar::<_, i64>("SELECT likes FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO post_likes (post_id, user_id, fingerprint)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(fingerprint)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            tx.rollback().await?;
            return Ok(LikeOutcome::AlreadyLiked { likes: current });
        }

        let likes = sqlx::query_scalar::<_, i64>(
            "UPDATE posts SET likes = likes + 1 WHERE id = $1 RETURNING likes",
        )
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(LikeOutcome::Added { likes })
    }

    async fn has_liked(&self, post_id: i64, who: &LikeIdentity) -> StoreResult<bool> {
        let (user_id, fingerprint) = like_columns(who);
        Ok(sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM post_likes
                WHERE post_id = $1 AND (user_id = $2 OR fingerprint = $3)
            )
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await?)
    }
}
