//! Friendships
//!
//! A pair of users has at most one live relation (pending or accepted) in
//! either direction. Sending a request to someone who already asked you
//! accepts theirs instead of creating a second row.

use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::{FriendshipRepository, UserRepository};
use crate::models::{
    Friendship, FriendshipStatus, ListParams, NewNotification, NotificationKind, PagedResult,
    PublicProfile, User,
};
use crate::services::error::{found, ServiceError, ServiceResult};
use crate::services::notification::NotificationService;

/// A pending request with the other party's profile
#[derive(Debug, Clone, Serialize)]
pub struct FriendRequestView {
    #[serde(flatten)]
    pub friendship: Friendship,
    pub user: Option<PublicProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequests {
    pub incoming: Vec<FriendRequestView>,
    pub outgoing: Vec<FriendRequestView>,
}

pub struct FriendService {
    repo: Arc<dyn FriendshipRepository>,
    user_repo: Arc<dyn UserRepository>,
    notifications: Arc<NotificationService>,
}

impl FriendService {
    pub fn new(
        repo: Arc<dyn FriendshipRepository>,
        user_repo: Arc<dyn UserRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            user_repo,
            notifications,
        }
    }

    pub async fn send_request(&self, user: &User, to: i64) -> ServiceResult<Friendship> {
        if user.id == to {
            return Err(ServiceError::validation("You cannot befriend yourself"));
        }
        found(self.user_repo.get_by_id(to).await?, "User")?;

        if let Some(existing) = self.repo.find_between(user.id, to).await? {
            let reverse_pending =
                existing.status == FriendshipStatus::Pending && existing.addressee_id == user.id;
            if reverse_pending {
                return self.accept_request(user, existing).await;
            }
            return Err(ServiceError::conflict(match existing.status {
                FriendshipStatus::Accepted => "You are already friends",
                _ => "A friend request is already pending",
            }));
        }

        let friendship = self.repo.create(user.id, to).await?;
        self.notifications
            .send(
                NewNotification::new(
                    to,
                    NotificationKind::FriendRequest,
                    format!("{} sent you a friend request", user.username),
                )
                .actor(user.id)
                .target("friendship", friendship.id),
            )
            .await;
        Ok(friendship)
    }

    pub async fn accept(&self, user: &User, request_id: i64) -> ServiceResult<Friendship> {
        let request = self.pending_for_addressee(user, request_id).await?;
        self.accept_request(user, request).await
    }

    pub async fn reject(&self, user: &User, request_id: i64) -> ServiceResult<Friendship> {
        let mut request = self.pending_for_addressee(user, request_id).await?;
        self.repo.set_status(request.id, FriendshipStatus::Rejected).await?;
        request.status = FriendshipStatus::Rejected;
        Ok(request)
    }

    pub async fn unfriend(&self, user: &User, other: i64) -> ServiceResult<()> {
        match self.repo.find_between(user.id, other).await? {
            Some(f) if f.status == FriendshipStatus::Accepted => {
                self.repo.soft_delete(f.id).await?;
                tracing::debug!(user_id = user.id, other, "Friendship ended");
                Ok(())
            }
            _ => Err(ServiceError::not_found("Friendship")),
        }
    }

    pub async fn list_friends(&self, user_id: i64, params: &ListParams) -> ServiceResult<PagedResult<PublicProfile>> {
        let (friendships, total) = self.repo.list_accepted(user_id, params).await?;
        let ids: Vec<i64> = friendships.iter().map(|f| f.other(user_id)).collect();
        let users = self.user_repo.get_many(&ids).await?;
        // keep the repository order
        let profiles = ids
            .iter()
            .filter_map(|id| users.iter().find(|u| u.id == *id).map(User::public_profile))
            .collect();
        Ok(PagedResult::new(profiles, total, params))
    }

    pub async fn list_pending(&self, user_id: i64) -> ServiceResult<PendingRequests> {
        let incoming = self.repo.list_incoming(user_id).await?;
        let outgoing = self.repo.list_outgoing(user_id).await?;
        Ok(PendingRequests {
            incoming: self.with_profiles(user_id, incoming).await?,
            outgoing: self.with_profiles(user_id, outgoing).await?,
        })
    }

    pub async fn are_friends(&self, a: i64, b: i64) -> ServiceResult<bool> {
        if a == b {
            return Ok(false);
        }
        Ok(matches!(
            self.repo.find_between(a, b).await?,
            Some(f) if f.status == FriendshipStatus::Accepted
        ))
    }

    async fn pending_for_addressee(&self, user: &User, request_id: i64) -> ServiceResult<Friendship> {
        let request = found(self.repo.get_by_id(request_id).await?, "Friend request")?;
        if request.addressee_id != user.id {
            return Err(ServiceError::forbidden("Only the recipient can answer a friend request"));
        }
        if request.status != FriendshipStatus::Pending {
            return Err(ServiceError::conflict("Friend request was already answered"));
        }
        Ok(request)
    }

    async fn accept_request(&self, user: &User, mut request: Friendship) -> ServiceResult<Friendship> {
        self.repo.set_status(request.id, FriendshipStatus::Accepted).await?;
        request.status = FriendshipStatus::Accepted;
        self.notifications
            .send(
                NewNotification::new(
                    request.requester_id,
                    NotificationKind::FriendAccepted,
                    format!("{} accepted your friend request", user.username),
                )
                .actor(user.id)
                .target("friendship", request.id),
            )
            .await;
        Ok(request)
    }

    async fn with_profiles(&self, user_id: i64, list: Vec<Friendship>) -> ServiceResult<Vec<FriendRequestView>> {
        let ids: Vec<i64> = list.iter().map(|f| f.other(user_id)).collect();
        let users = self.user_repo.get_many(&ids).await?;
        Ok(list
            .into_iter()
            .map(|friendship| {
                let other = friendship.other(user_id);
                FriendRequestView {
                    user: users.iter().find(|u| u.id == other).map(User::public_profile),
                    friendship,
                }
            })
            .collect())
    }
}
