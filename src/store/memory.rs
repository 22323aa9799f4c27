use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

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

/// Process-local store with the same observable behavior as [`super::PgStore`].
/// Backs the test suite and database-less local runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    tags: BTreeMap<i64, Tag>,
    /// (post_id, tag_id)
    post_tags: BTreeSet<(i64, i64)>,
    comments: BTreeMap<i64, Comment>,
    likes: HashSet<(i64, LikeIdentity)>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn with_user(&self, comment: Comment) -> CommentWithUser {
        let author = self.users.get(&comment.user_id);
        CommentWithUser {
            user_name: author
                .map(|u| u.public_name().to_string())
                .unwrap_or_else(|| "Anonymous".to_string()),
            user_avatar_url: author.and_then(|u| u.avatar_url.clone()),
            comment,
        }
    }

    /// Fails on the first tag id with no tag row, before anything is written.
    fn check_tags(&self, tag_ids: Option<&[i64]>) -> StoreResult<()> {
        match tag_ids.unwrap_or_default().iter().find(|id| !self.tags.contains_key(id)) {
            Some(missing) => Err(AppError::BadRequest(format!("Unknown tag id {}", missing))),
            None => Ok(()),
        }
    }

    fn replace_post_tags(&mut self, post_id: i64, tag_ids: Option<&[i64]>) {
        let Some(tag_ids) = tag_ids else {
            return;
        };
        self.post_tags.retain(|(pid, _)| *pid != post_id);
        for tag_id in tag_ids {
            self.post_tags.insert((post_id, *tag_id));
        }
    }

    fn slug_taken(&self, slug: &str, except: Option<i64>) -> bool {
        self.posts
            .values()
            .any(|p| p.slug == slug && Some(p.id) != except)
    }

    fn tag_taken(&self, name: &str, slug: &str, except: Option<i64>) -> bool {
        self.tags
            .values()
            .any(|t| (t.name == name || t.slug == slug) && Some(t.id) != except)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.username == new.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                new.username
            )));
        }
        let user = User {
            id: t.allocate_id(),
            username: new.username,
            password: new.password_hash,
            role: new.role,
            display_name: new.display_name,
            avatar_url: None,
            created_at: new.created_at,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn list_posts(&self, published_only: bool, tag_slug: Option<&str>) -> StoreResult<Vec<Post>> {
        let t = self.tables.read().await;

        let tagged: Option<HashSet<i64>> = tag_slug.map(|slug| {
            let tag_ids: HashSet<i64> = t
                .tags
                .values()
                .filter(|tag| tag.slug == slug)
                .map(|tag| tag.id)
                .collect();
            t.post_tags
                .iter()
                .filter(|(_, tag_id)| tag_ids.contains(tag_id))
                .map(|(post_id, _)| *post_id)
                .collect()
        });

        let mut posts: Vec<Post> = t
            .posts
            .values()
            .filter(|p| !published_only || p.status == crate::models::post::PostStatus::Published)
            .filter(|p| tagged.as_ref().is_none_or(|ids| ids.contains(&p.id)))
            .cloned()
            .collect();
        // Unpublished posts (no published_at) sort last, like NULLS LAST.
        posts.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(posts)
    }

    async fn find_post(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn find_post_by_slug(&self, slug: &str) -> StoreResult<Option<Post>> {
        let t = self.tables.read().await;
        Ok(t.posts.values().find(|p| p.slug == slug).cloned())
    }

    async fn insert_post(&self, draft: PostDraft) -> StoreResult<Post> {
        let mut t = self.tables.write().await;
        if t.slug_taken(&draft.slug, None) {
            return Err(AppError::Conflict(format!("Slug '{}' already exists", draft.slug)));
        }
        t.check_tags(draft.tag_ids.as_deref())?;
        let post = Post {
            id: t.allocate_id(),
            title: draft.title,
            slug: draft.slug,
            excerpt: draft.excerpt,
            content: draft.content,
            cover_image: draft.cover_image,
            status: draft.status,
            views: 0,
            likes: 0,
            published_at: draft.published_at,
            author_id: draft.author_id,
            created_at: draft.at,
            updated_at: draft.at,
        };
        t.posts.insert(post.id, post.clone());
        t.replace_post_tags(post.id, draft.tag_ids.as_deref());
        Ok(post)
    }

    async fn update_post(&self, id: i64, draft: PostDraft) -> StoreResult<Option<Post>> {
        let mut t = self.tables.write().await;
        if t.slug_taken(&draft.slug, Some(id)) {
            return Err(AppError::Conflict(format!("Slug '{}' already exists", draft.slug)));
        }
        if !t.posts.contains_key(&id) {
            return Ok(None);
        }
        t.check_tags(draft.tag_ids.as_deref())?;
        t.replace_post_tags(id, draft.tag_ids.as_deref());
        let Some(post) = t.posts.get_mut(&id) else {
            return Ok(None);
        };
        post.title = draft.title;
        post.slug = draft.slug;
        post.excerpt = draft.excerpt;
        post.content = draft.content;
        post.cover_image = draft.cover_image;
        post.status = draft.status;
        post.published_at = draft.published_at;
        post.updated_at = draft.at;
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.posts.remove(&id).is_none() {
            return Ok(false);
        }
        t.comments.retain(|_, c| c.post_id != id);
        t.likes.retain(|(post_id, _)| *post_id != id);
        t.post_tags.retain(|(post_id, _)| *post_id != id);
        Ok(true)
    }

    async fn increment_views(&self, post_id: i64) -> StoreResult<i64> {
        let mut t = self.tables.write().await;
        let post = t
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
        post.views += 1;
        Ok(post.views)
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let t = self.tables.read().await;
        let mut tags: Vec<Tag> = t.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn find_tag(&self, id: i64) -> StoreResult<Option<Tag>> {
        Ok(self.tables.read().await.tags.get(&id).cloned())
    }

    async fn insert_tag(
        &self,
        name: &str,
        slug: &str,
        description: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Tag> {
        let mut t = self.tables.write().await;
        if t.tag_taken(name, slug, None) {
            return Err(AppError::Conflict(format!("Tag '{}' already exists", name)));
        }
        let tag = Tag {
            id: t.allocate_id(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: description.map(str::to_string),
            created_at: at,
            updated_at: at,
        };
        t.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn update_tag(&self, tag: &Tag) -> StoreResult<Tag> {
        let mut t = self.tables.write().await;
        if t.tag_taken(&tag.name, &tag.slug, Some(tag.id)) {
            return Err(AppError::Conflict(format!("Tag '{}' already exists", tag.name)));
        }
        let stored = t
            .tags
            .get_mut(&tag.id)
            .ok_or_else(|| AppError::NotFound("Tag not found".to_string()))?;
        *stored = tag.clone();
        Ok(stored.clone())
    }

    async fn delete_tag(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        let removed = t.tags.remove(&id).is_some();
        t.post_tags.retain(|(_, tag_id)| *tag_id != id);
        Ok(removed)
    }

    async fn tags_for_post(&self, post_id: i64) -> StoreResult<Vec<Tag>> {
        let t = self.tables.read().await;
        let mut tags: Vec<Tag> = t
            .post_tags
            .iter()
            .filter(|(pid, _)| *pid == post_id)
            .filter_map(|(_, tag_id)| t.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert_comment(&self, new: NewComment) -> StoreResult<CommentWithUser> {
        let mut t = self.tables.write().await;
        let comment = Comment {
            id: t.allocate_id(),
            post_id: new.post_id,
            parent_id: new.parent_id,
            user_id: new.user_id,
            content: new.content,
            created_at: new.created_at,
            updated_at: new.created_at,
            is_deleted: false,
        };
        t.comments.insert(comment.id, comment.clone());
        Ok(t.with_user(comment))
    }

    async fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        Ok(self.tables.read().await.comments.get(&id).cloned())
    }

    async fn list_active_comments(&self, post_id: i64) -> StoreResult<Vec<CommentWithUser>> {
        let t = self.tables.read().await;
        let mut comments: Vec<Comment> = t
            .comments
            .values()
            .filter(|c| c.post_id == post_id && !c.is_deleted)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments.into_iter().map(|c| t.with_user(c)).collect())
    }

    async fn update_comment_content(
        &self,
        id: i64,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let comment = t
            .comments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;
        comment.content = content.to_string();
        comment.updated_at = at;
        Ok(())
    }

    async fn mark_comment_deleted(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let comment = t
            .comments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;
        comment.is_deleted = true;
        comment.updated_at = at;
        Ok(())
    }

    async fn count_active_comments(&self, post_id: i64) -> StoreResult<i64> {
        let t = self.tables.read().await;
        Ok(t.comments
            .values()
            .filter(|c| c.post_id == post_id && !c.is_deleted)
            .count() as i64)
    }
}

#[async_trait]
impl LikeStore for MemoryStore {
    async fn add_like(&self, post_id: i64, who: &LikeIdentity) -> StoreResult<LikeOutcome> {
        let mut t = self.tables.write().await;
        if !t.posts.contains_key(&post_id) {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        let added = t.likes.insert((post_id, who.clone()));
        let post = t
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
        if added {
            post.likes += 1;
            Ok(LikeOutcome::Added { likes: post.likes })
        } else {
            Ok(LikeOutcome::AlreadyLiked { likes: post.likes })
        }
    }

    async fn has_liked(&self, post_id: i64, who: &LikeIdentity) -> StoreResult<bool> {
        let t = self.tables.read().await;
        Ok(t.likes.contains(&(post_id, who.clone())))
    }
}
