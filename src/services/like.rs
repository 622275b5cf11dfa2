//! Likes on posts, comments and events
//!
//! One like per user per target; `toggle` flips it. Post likes also move
//! the post's `like_count` and notify the author.

use std::sync::Arc;

use crate::db::repositories::{CommentRepository, EventRepository, LikeRepository, PostRepository};
use crate::models::{LikeTarget, LikeToggle, NewNotification, NotificationKind, User};
use crate::services::error::{found, ServiceResult};
use crate::services::notification::NotificationService;
use crate::services::post::PostService;

pub struct LikeService {
    repo: Arc<dyn LikeRepository>,
    post_repo: Arc<dyn PostRepository>,
    comment_repo: Arc<dyn CommentRepository>,
    event_repo: Arc<dyn EventRepository>,
    posts: Arc<PostService>,
    notifications: Arc<NotificationService>,
}

impl LikeService {
    pub fn new(
        repo: Arc<dyn LikeRepository>,
        post_repo: Arc<dyn PostRepository>,
        comment_repo: Arc<dyn CommentRepository>,
        event_repo: Arc<dyn EventRepository>,
        posts: Arc<PostService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            comment_repo,
            event_repo,
            posts,
            notifications,
        }
    }

    pub async fn toggle(&self, user: &User, target: LikeTarget, target_id: i64) -> ServiceResult<LikeToggle> {
        let post_author = self.check_target(Some(user), target, target_id).await?;

        let liked = if self.repo.exists(user.id, target, target_id).await? {
            self.repo.remove(user.id, target, target_id).await?;
            false
        } else {
            self.repo.insert(user.id, target, target_id).await?
        };

        if target == LikeTarget::Post {
            self.post_repo
                .adjust_like_count(target_id, if liked { 1 } else { -1 })
                .await?;
        }

        if let (true, Some(author)) = (liked, post_author) {
            self.notifications
                .send(
                    NewNotification::new(
                        author,
                        NotificationKind::PostLiked,
                        format!("{} liked your memory", user.username),
                    )
                    .actor(user.id)
                    .target("post", target_id),
                )
                .await;
        }

        let count = self.repo.count(target, target_id).await?;
        Ok(LikeToggle { liked, count })
    }

    /// Like state of a target for the viewer (`liked` is false when anonymous)
    pub async fn status(&self, viewer: Option<&User>, target: LikeTarget, target_id: i64) -> ServiceResult<LikeToggle> {
        self.check_target(viewer, target, target_id).await?;
        let liked = match viewer {
            Some(user) => self.repo.exists(user.id, target, target_id).await?,
            None => false,
        };
        let count = self.repo.count(target, target_id).await?;
        Ok(LikeToggle { liked, count })
    }

    /// Ensure the target exists and is visible; returns the post author for posts
    async fn check_target(&self, viewer: Option<&User>, target: LikeTarget, target_id: i64) -> ServiceResult<Option<i64>> {
        match target {
            LikeTarget::Post => {
                let post = self.posts.get_visible(viewer, target_id).await?;
                Ok(Some(post.user_id))
            }
            LikeTarget::Comment => {
                let comment = found(self.comment_repo.get_by_id(target_id).await?, "Comment")?;
                self.posts.get_visible(viewer, comment.post_id).await?;
                Ok(None)
            }
            LikeTarget::Event => {
                found(self.event_repo.get_by_id(target_id).await?, "Event")?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::{
        CommentRepositoryImpl, NotificationRepository, SqlxEventRepository, SqlxLikeRepository,
        SqlxNotificationRepository, SqlxPostRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::Visibility;
    use crate::services::error::ServiceError;
    use crate::services::post::tests::{post_input, post_service};
    use crate::services::test_support::{insert_user, notification_service};

    fn like_service(pool: &DynDatabasePool) -> LikeService {
        LikeService::new(
            SqlxLikeRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            CommentRepositoryImpl::boxed(pool.clone()),
            SqlxEventRepository::boxed(pool.clone()),
            Arc::new(post_service(pool)),
            notification_service(pool),
        )
    }

    #[tokio::test]
    async fn test_toggle_post_like() {
        let pool = migrated_test_pool().await;
        let service = like_service(&pool);
        let posts = post_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;
        let post = posts.create(&ana, post_input("vals", Visibility::Public)).await.unwrap();

        let on = service.toggle(&beto, LikeTarget::Post, post.id).await.unwrap();
        assert_eq!(on, LikeToggle { liked: true, count: 1 });
        assert_eq!(posts.get_visible(None, post.id).await.unwrap().like_count, 1);

        let notes = SqlxNotificationRepository::new(pool.clone());
        assert_eq!(notes.unread_count(ana.id).await.unwrap(), 1);

        let off = service.toggle(&beto, LikeTarget::Post, post.id).await.unwrap();
        assert_eq!(off, LikeToggle { liked: false, count: 0 });
        assert_eq!(posts.get_visible(None, post.id).await.unwrap().like_count, 0);

        let status = service.status(None, LikeTarget::Post, post.id).await.unwrap();
        assert!(!status.liked);
    }

    #[tokio::test]
    async fn test_missing_targets() {
        let pool = migrated_test_pool().await;
        let service = like_service(&pool);
        let ana = insert_user(&pool, "ana").await;

        for target in LikeTarget::ALL {
            let result = service.toggle(&ana, *target, 404).await;
            assert!(matches!(result, Err(ServiceError::NotFound(_))), "{}", target);
        }
    }
}
