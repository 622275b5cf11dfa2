//! Posts ("memories")
//!
//! Reads go through the visibility rules; a post the viewer may not see is
//! reported as not found. Only the author edits a post, while the author
//! or staff may delete it.

use std::sync::Arc;

use crate::db::repositories::{
    ActivityRepository, EventRepository, GroupRepository, PostFilter, PostRepository,
};
use crate::models::{CreatePostInput, ListParams, PagedResult, Post, UpdatePostInput, User};
use crate::services::error::{found, require_text, ServiceError, ServiceResult};
use crate::services::friend::FriendService;

pub const MAX_CONTENT_CHARS: usize = 10_000;

const MAX_LOCATION_CHARS: usize = 255;

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    group_repo: Arc<dyn GroupRepository>,
    event_repo: Arc<dyn EventRepository>,
    activity_repo: Arc<dyn ActivityRepository>,
    friends: Arc<FriendService>,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        group_repo: Arc<dyn GroupRepository>,
        event_repo: Arc<dyn EventRepository>,
        activity_repo: Arc<dyn ActivityRepository>,
        friends: Arc<FriendService>,
    ) -> Self {
        Self {
            repo,
            group_repo,
            event_repo,
            activity_repo,
            friends,
        }
    }

    pub async fn create(&self, user: &User, input: CreatePostInput) -> ServiceResult<Post> {
        let content = require_text("Content", &input.content, MAX_CONTENT_CHARS)?;
        let location = optional_location(input.location)?;

        if let Some(group_id) = input.group_id {
            found(self.group_repo.get_by_id(group_id).await?, "Group")?;
            if self.group_repo.get_member(group_id, user.id).await?.is_none() {
                return Err(ServiceError::forbidden("Only group members can post in a group"));
            }
        }
        if let Some(event_id) = input.event_id {
            found(self.event_repo.get_by_id(event_id).await?, "Event")?;
        }
        if let Some(activity_id) = input.activity_id {
            found(self.activity_repo.get_by_id(activity_id).await?, "Activity")?;
        }

        let now = chrono::Utc::now();
        let post = Post {
            id: 0,
            user_id: user.id,
            group_id: input.group_id,
            event_id: input.event_id,
            activity_id: input.activity_id,
            content,
            location,
            visibility: input.visibility,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let post = self.repo.create(&post).await?;
        tracing::debug!(post_id = post.id, user_id = user.id, "Post created");
        Ok(post)
    }

    /// Fetch a post the viewer is allowed to read
    pub async fn get_visible(&self, viewer: Option<&User>, id: i64) -> ServiceResult<Post> {
        let post = found(self.repo.get_by_id(id).await?, "Post")?;
        if self.can_view(viewer, &post).await? {
            Ok(post)
        } else {
            Err(ServiceError::not_found("Post"))
        }
    }

    /// Visibility applies to staff too; moderators act on reported posts
    /// through the report queue, not by reading them here.
    pub async fn can_view(&self, viewer: Option<&User>, post: &Post) -> ServiceResult<bool> {
        let viewer_id = viewer.map(|u| u.id);
        let are_friends = match viewer_id {
            Some(id) if id != post.user_id => self.friends.are_friends(id, post.user_id).await?,
            _ => false,
        };
        Ok(post.visible_to(viewer_id, are_friends))
    }

    pub async fn update(&self, user: &User, id: i64, input: UpdatePostInput) -> ServiceResult<Post> {
        let mut post = found(self.repo.get_by_id(id).await?, "Post")?;
        if post.user_id != user.id {
            return Err(ServiceError::forbidden("Only the author can edit this post"));
        }

        if let Some(content) = input.content {
            post.content = require_text("Content", &content, MAX_CONTENT_CHARS)?;
        }
        if input.location.is_some() {
            post.location = optional_location(input.location)?;
        }
        if let Some(visibility) = input.visibility {
            post.visibility = visibility;
        }
        if let Some(activity_id) = input.activity_id {
            found(self.activity_repo.get_by_id(activity_id).await?, "Activity")?;
            post.activity_id = Some(activity_id);
        }

        Ok(self.repo.update(&post).await?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> ServiceResult<()> {
        let post = found(self.repo.get_by_id(id).await?, "Post")?;
        if !user.can_moderate(post.user_id) {
            return Err(ServiceError::forbidden("You cannot delete this post"));
        }
        self.repo.soft_delete(id).await?;
        tracing::info!(post_id = id, by = user.id, "Post deleted");
        Ok(())
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        filter: PostFilter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Post>> {
        let (items, total) = self
            .repo
            .list_visible(viewer.map(|u| u.id), filter, params)
            .await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Own posts, friends' posts and public posts, newest first
    pub async fn feed(&self, viewer: &User, params: &ListParams) -> ServiceResult<PagedResult<Post>> {
        self.list(Some(viewer), PostFilter::default(), params).await
    }

    pub async fn group_posts(
        &self,
        viewer: Option<&User>,
        group_id: i64,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Post>> {
        found(self.group_repo.get_by_id(group_id).await?, "Group")?;
        let filter = PostFilter {
            group_id: Some(group_id),
            ..Default::default()
        };
        self.list(viewer, filter, params).await
    }

    pub async fn search(
        &self,
        viewer: Option<&User>,
        query: &str,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Post>> {
        let (items, total) = self
            .repo
            .search_visible(viewer.map(|u| u.id), query, params)
            .await?;
        Ok(PagedResult::new(items, total, params))
    }
}

fn optional_location(location: Option<String>) -> ServiceResult<Option<String>> {
    match location.map(|l| l.trim().to_string()) {
        Some(l) if l.is_empty() => Ok(None),
        Some(l) if l.chars().count() > MAX_LOCATION_CHARS => Err(ServiceError::validation(format!(
            "Location must be at most {} characters",
            MAX_LOCATION_CHARS
        ))),
        other => Ok(other),
    }
}
