//! Comment moderation rules.
//!
//! Every operation takes the acting principal explicitly; nothing here reads
//! a session. Store calls go through [`CallPolicy`], so a slow or unreachable
//! database surfaces as `AppError::Unavailable`.

use std::collections::HashSet;

use chrono::Utc;

use super::comment_tree::build_tree;
use crate::{
    error::AppError,
    models::comment::{Comment, CommentBody, CommentTree, CommentWithUser, NewComment},
    store::{CallPolicy, Store},
};

pub struct CommentService<'a> {
    store: &'a dyn Store,
    calls: CallPolicy,
    max_reply_depth: Option<usize>,
}

impl<'a> CommentService<'a> {
    pub fn new(store: &'a dyn Store, calls: CallPolicy, max_reply_depth: Option<usize>) -> Self {
        Self {
            store,
            calls,
            max_reply_depth,
        }
    }

    /// Reply forest of a post's visible comments.
    pub async fn list_tree(&self, post_id: i64) -> Result<Vec<CommentTree>, AppError> {
        let store = self.store;
        let comments = self
            .calls
            .run("list_comments", move || store.list_active_comments(post_id))
            .await?;
        Ok(build_tree(comments))
    }

    /// Number of visible comments on a post.
    pub async fn count_comments(&self, post_id: i64) -> Result<i64, AppError> {
        let store = self.store;
        self.calls
            .run("count_comments", move || store.count_active_comments(post_id))
            .await
    }

    /// Creates a comment, or a reply when `parent_id` is given.
    pub async fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
        parent_id: Option<i64>,
    ) -> Result<CommentWithUser, AppError> {
        let content = CommentBody::parse(content)?;

        let store = self.store;
        self.calls
            .run("find_post", move || store.find_post(post_id))
            .await?
            .ok_or(AppError::NotFound("Post not found".to_string()))?;

        if let Some(pid) = parent_id {
            let parent = self
                .find(pid)
                .await?
                .filter(|p| !p.is_deleted && p.post_id == post_id)
                .ok_or(AppError::InvalidParent(
                    "Parent comment not found on this post".to_string(),
                ))?;

            if let Some(max) = self.max_reply_depth {
                if self.depth_of(&parent, max).await? >= max {
                    return Err(AppError::BadRequest(format!(
                        "Replies can be nested at most {} levels deep",
                        max
                    )));
                }
            }
        }

        let created = self
            .calls
            .once(
                "insert_comment",
                store.insert_comment(NewComment {
                    post_id,
                    parent_id,
                    user_id: author_id,
                    content,
                    created_at: Utc::now(),
                }),
            )
            .await?;

        tracing::info!(
            comment_id = created.comment.id,
            post_id,
            author_id,
            "Comment created"
        );
        Ok(created)
    }

    /// Replaces the body of the actor's own comment.
    pub async fn update_comment(
        &self,
        comment_id: i64,
        acting_user_id: i64,
        content: &str,
    ) -> Result<(), AppError> {
        let existing = self.find_live(comment_id).await?;
        if existing.user_id != acting_user_id {
            return Err(AppError::Forbidden(
                "You can only edit your own comments".to_string(),
            ));
        }

        let content = CommentBody::parse(content)?;
        let body = content.as_str();
        let now = Utc::now();
        let store = self.store;
        self.calls
            .run("update_comment", move || {
                store.update_comment_content(comment_id, body, now)
            })
            .await?;

        tracing::info!(comment_id, acting_user_id, "Comment updated");
        Ok(())
    }

    /// Soft-deletes the actor's own comment. Replies are left in place.
    pub async fn delete_comment(&self, comment_id: i64, acting_user_id: i64) -> Result<(), AppError> {
        let existing = self.find_live(comment_id).await?;
        if existing.user_id != acting_user_id {
            return Err(AppError::Forbidden(
                "You can only delete your own comments".to_string(),
            ));
        }

        let now = Utc::now();
        let store = self.store;
        self.calls
            .run("delete_comment", move || store.mark_comment_deleted(comment_id, now))
            .await?;

        tracing::info!(comment_id, acting_user_id, "Comment deleted");
        Ok(())
    }

    /// Whether the actor may edit or delete the comment.
    pub async fn can_edit(&self, comment_id: i64, acting_user_id: i64) -> Result<bool, AppError> {
        Ok(self
            .find(comment_id)
            .await?
            .is_some_and(|c| !c.is_deleted && c.user_id == acting_user_id))
    }

    async fn find(&self, comment_id: i64) -> Result<Option<Comment>, AppError> {
        let store = self.store;
        self.calls
            .run("find_comment", move || store.find_comment(comment_id))
            .await
    }

    async fn find_live(&self, comment_id: i64) -> Result<Comment, AppError> {
        self.find(comment_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or(AppError::NotFound("Comment not found".to_string()))
    }

    /// Nesting level of `comment` (roots are 0), counting deleted ancestors too.
    /// Stops early once `limit` is reached.
    async fn depth_of(&self, comment: &Comment, limit: usize) -> Result<usize, AppError> {
        let mut depth = 0;
        let mut seen = HashSet::from([comment.id]);
        let mut next = comment.parent_id;

        while let Some(id) = next {
            if depth >= limit {
                break;
            }
            if !seen.insert(id) {
                tracing::error!(comment_id = comment.id, looped_at = id, "Cyclic reply chain");
                return Err(AppError::DataIntegrity(format!(
                    "Reply chain of comment {} loops at comment {}",
                    comment.id, id
                )));
            }
            depth += 1;
            next = match self.find(id).await? {
                Some(ancestor) if ancestor.post_id == comment.post_id => ancestor.parent_id,
                _ => None,
            };
        }

        Ok(depth)
    }
}
