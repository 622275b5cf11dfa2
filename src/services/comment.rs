//! Comments on posts
//!
//! Comments form a tree through `parent_id`. The post keeps a denormalised
//! `comment_count` that is adjusted on create and delete.

use std::sync::Arc;

use crate::db::repositories::{CommentRepository, LikeRepository, PostRepository, UserRepository};
use crate::models::{
    Comment, CommentNode, CreateCommentInput, LikeTarget, NewNotification, NotificationKind, User,
};
use crate::services::error::{found, require_text, ServiceError, ServiceResult};
use crate::services::notification::NotificationService;
use crate::services::post::PostService;

const MAX_COMMENT_CHARS: usize = 2_000;

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
    user_repo: Arc<dyn UserRepository>,
    like_repo: Arc<dyn LikeRepository>,
    posts: Arc<PostService>,
    notifications: Arc<NotificationService>,
}

impl CommentService {
    pub fn new(
        repo: Arc<dyn CommentRepository>,
        post_repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        like_repo: Arc<dyn LikeRepository>,
        posts: Arc<PostService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            user_repo,
            like_repo,
            posts,
            notifications,
        }
    }

    pub async fn create(&self, user: &User, post_id: i64, input: CreateCommentInput) -> ServiceResult<Comment> {
        let post = self.posts.get_visible(Some(user), post_id).await?;
        let content = require_text("Comment", &input.content, MAX_COMMENT_CHARS)?;

        if let Some(parent_id) = input.parent_id {
            let parent = found(self.repo.get_by_id(parent_id).await?, "Parent comment")?;
            if parent.post_id != post.id {
                return Err(ServiceError::validation("Parent comment belongs to another post"));
            }
        }

        let now = chrono::Utc::now();
        let comment = Comment {
            id: 0,
            post_id: post.id,
            user_id: user.id,
            parent_id: input.parent_id,
            content,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let comment = self.repo.create(&comment).await?;
        self.post_repo.adjust_comment_count(post.id, 1).await?;

        self.notifications
            .send(
                NewNotification::new(
                    post.user_id,
                    NotificationKind::PostCommented,
                    format!("{} commented on your memory", user.username),
                )
                .actor(user.id)
                .target("post", post.id),
            )
            .await;
        Ok(comment)
    }

    /// Threaded comments of a post with authors and like counts
    pub async fn list(&self, viewer: Option<&User>, post_id: i64) -> ServiceResult<Vec<CommentNode>> {
        self.posts.get_visible(viewer, post_id).await?;
        let comments = self.repo.list_by_post(post_id).await?;

        let mut author_ids: Vec<i64> = comments.iter().map(|c| c.user_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();
        let authors = self.user_repo.get_many(&author_ids).await?;

        let mut nodes = Vec::with_capacity(comments.len());
        for comment in comments {
            let like_count = self.like_repo.count(LikeTarget::Comment, comment.id).await?;
            nodes.push(CommentNode {
                author: authors
                    .iter()
                    .find(|u| u.id == comment.user_id)
                    .map(User::public_profile),
                like_count,
                replies: Vec::new(),
                comment,
            });
        }
        Ok(CommentNode::build_tree(nodes))
    }

    pub async fn delete(&self, user: &User, id: i64) -> ServiceResult<()> {
        let comment = found(self.repo.get_by_id(id).await?, "Comment")?;
        if !user.can_moderate(comment.user_id) {
            return Err(ServiceError::forbidden("You cannot delete this comment"));
        }
        self.repo.soft_delete(id).await?;
        self.post_repo.adjust_comment_count(comment.post_id, -1).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::{
        CommentRepositoryImpl, NotificationRepository, SqlxLikeRepository,
        SqlxNotificationRepository, SqlxPostRepository, SqlxUserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::{UserRole, Visibility};
    use crate::services::post::tests::{post_input, post_service};
    use crate::services::test_support::{insert_user, insert_user_with_role, notification_service};

    fn comment_service(pool: &DynDatabasePool) -> CommentService {
        CommentService::new(
            CommentRepositoryImpl::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            SqlxLikeRepository::boxed(pool.clone()),
            Arc::new(post_service(pool)),
            notification_service(pool),
        )
    }

    fn input(content: &str, parent_id: Option<i64>) -> CreateCommentInput {
        CreateCommentInput {
            content: content.to_string(),
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_threaded_comments_and_counts() {
        let pool = migrated_test_pool().await;
        let service = comment_service(&pool);
        let posts = post_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;

        let post = posts.create(&ana, post_input("milonga night", Visibility::Public)).await.unwrap();
        let root = service.create(&beto, post.id, input("great!", None)).await.unwrap();
        service.create(&ana, post.id, input("thanks", Some(root.id))).await.unwrap();

        let tree = service.list(None, post.id).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].author.as_ref().unwrap().username, "beto");
        assert_eq!(tree[0].replies.len(), 1);

        let post = posts.get_visible(None, post.id).await.unwrap();
        assert_eq!(post.comment_count, 2);

        // beto's comment notified ana; ana's own reply did not
        let notes = SqlxNotificationRepository::new(pool.clone());
        assert_eq!(notes.unread_count(ana.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_parent_must_be_on_same_post() {
        let pool = migrated_test_pool().await;
        let service = comment_service(&pool);
        let posts = post_service(&pool);
        let ana = insert_user(&pool, "ana").await;

        let first = posts.create(&ana, post_input("one", Visibility::Public)).await.unwrap();
        let second = posts.create(&ana, post_input("two", Visibility::Public)).await.unwrap();
        let parent = service.create(&ana, first.id, input("on first", None)).await.unwrap();

        let result = service.create(&ana, second.id, input("wrong thread", Some(parent.id))).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_permissions_and_count() {
        let pool = migrated_test_pool().await;
        let service = comment_service(&pool);
        let posts = post_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;
        let admin = insert_user_with_role(&pool, "admin", UserRole::Admin).await;

        let post = posts.create(&ana, post_input("hello", Visibility::Public)).await.unwrap();
        let comment = service.create(&beto, post.id, input("hi", None)).await.unwrap();

        assert!(matches!(service.delete(&ana, comment.id).await, Err(ServiceError::Forbidden(_))));
        service.delete(&admin, comment.id).await.unwrap();

        assert!(service.list(None, post.id).await.unwrap().is_empty());
        assert_eq!(posts.get_visible(None, post.id).await.unwrap().comment_count, 0);
    }

    #[tokio::test]
    async fn test_cannot_comment_on_hidden_post() {
        let pool = migrated_test_pool().await;
        let service = comment_service(&pool);
        let posts = post_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;

        let post = posts.create(&ana, post_input("private", Visibility::Private)).await.unwrap();
        let result = service.create(&beto, post.id, input("peek", None)).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
