use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'comments' table in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    /// The comment being replied to. `None` for top-level comments.
    pub parent_id: Option<i64>,
    /// Author of the comment.
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag. Deleted rows stay so their replies keep a valid parent.
    pub is_deleted: bool,
}

/// A comment joined with its author's public profile.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CommentWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub comment: Comment,
    pub user_name: String,
    pub user_avatar_url: Option<String>,
}

/// A comment with its replies, ordered oldest first.
/// Built per request from the flat list and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentTree {
    #[serde(flatten)]
    pub comment: CommentWithUser,
    pub replies: Vec<CommentTree>,
}

impl CommentTree {
    pub fn id(&self) -> i64 {
        self.comment.comment.id
    }

    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.replies.iter());
        }
        total
    }
}

/// Values required to insert a comment row.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The body rule shared by create and update.
#[derive(Debug, Deserialize, Validate)]
pub struct CommentBody {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,
}

impl CommentBody {
    /// Trims surrounding whitespace and checks the length rule.
    pub fn parse(raw: &str) -> Result<String, validator::ValidationErrors> {
        let body = CommentBody {
            content: raw.trim().to_string(),
        };
        body.validate()?;
        Ok(body.content)
    }
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<i64>,
}

/// DTO for editing a comment.
#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}
