//! Site-wide search
//!
//! Case-insensitive substring matching delegated to each domain service, so
//! post results follow the same visibility rules as the feed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Event, Group, HousingFilter, HousingListing, ListParams, PagedResult, Post, PublicProfile, User};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::event::EventService;
use crate::services::group::GroupService;
use crate::services::housing::HousingService;
use crate::services::post::PostService;
use crate::services::user::UserService;

pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    All,
    Users,
    Posts,
    Events,
    Groups,
    Housing,
}

impl SearchKind {
    fn includes(self, other: SearchKind) -> bool {
        self == SearchKind::All || self == other
    }
}

/// Sections are present only for the kinds that were searched
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<PagedResult<PublicProfile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<PagedResult<Post>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<PagedResult<Event>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<PagedResult<Group>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub housing: Option<PagedResult<HousingListing>>,
}

pub struct SearchService {
    users: Arc<UserService>,
    posts: Arc<PostService>,
    events: Arc<EventService>,
    groups: Arc<GroupService>,
    housing: Arc<HousingService>,
}

impl SearchService {
    pub fn new(
        users: Arc<UserService>,
        posts: Arc<PostService>,
        events: Arc<EventService>,
        groups: Arc<GroupService>,
        housing: Arc<HousingService>,
    ) -> Self {
        Self {
            users,
            posts,
            events,
            groups,
            housing,
        }
    }

    pub async fn search(
        &self,
        viewer: Option<&User>,
        query: &str,
        kind: SearchKind,
        params: &ListParams,
    ) -> ServiceResult<SearchResults> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Err(ServiceError::validation(format!(
                "Search query must be at least {} characters",
                MIN_QUERY_CHARS
            )));
        }

        let mut results = SearchResults {
            query: query.to_string(),
            users: None,
            posts: None,
            events: None,
            groups: None,
            housing: None,
        };
        if kind.includes(SearchKind::Users) {
            results.users = Some(self.users.search_users(query, params).await?);
        }
        if kind.includes(SearchKind::Posts) {
            results.posts = Some(self.posts.search(viewer, query, params).await?);
        }
        if kind.includes(SearchKind::Events) {
            results.events = Some(self.events.search(query, params).await?);
        }
        if kind.includes(SearchKind::Groups) {
            results.groups = Some(self.groups.search(query, params).await?);
        }
        if kind.includes(SearchKind::Housing) {
            let filter = HousingFilter {
                q: Some(query.to_string()),
                ..Default::default()
            };
            results.housing = Some(self.housing.search(&filter, params).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_cache;
    use crate::db::repositories::{
        SqlxGroupRepository, SqlxHousingRepository, SqlxSessionRepository,
        SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::{migrated_test_pool, DynDatabasePool};
    use crate::models::{CreateGroupInput, GroupType, Visibility};
    use crate::services::event::tests::{event_input, event_service};
    use crate::services::post::tests::{post_input, post_service};
    use crate::services::rate_limiter::LoginRateLimiter;
    use crate::services::subscription::SubscriptionService;
    use crate::services::test_support::{insert_user, notification_service};

    fn search_service(pool: &DynDatabasePool) -> (SearchService, Arc<PostService>, Arc<EventService>, Arc<GroupService>) {
        let subscriptions = Arc::new(SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool.clone()),
        ));
        let users = Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            test_cache(),
            Arc::new(LoginRateLimiter::default()),
            7,
        ));
        let posts = Arc::new(post_service(pool));
        let events = Arc::new(event_service(pool));
        let groups = Arc::new(GroupService::new(
            SqlxGroupRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            subscriptions.clone(),
        ));
        let housing = Arc::new(HousingService::new(
            SqlxHousingRepository::boxed(pool.clone()),
            subscriptions,
            notification_service(pool),
        ));
        let service = SearchService::new(users, posts.clone(), events.clone(), groups.clone(), housing);
        (service, posts, events, groups)
    }

    #[tokio::test]
    async fn test_query_too_short() {
        let pool = migrated_test_pool().await;
        let (service, ..) = search_service(&pool);
        let result = service.search(None, " a ", SearchKind::All, &ListParams::default()).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_search_all_kinds() {
        let pool = migrated_test_pool().await;
        let (service, posts, events, groups) = search_service(&pool);
        let ana = insert_user(&pool, "milonguera").await;

        posts.create(&ana, post_input("Best MILONGA ever", Visibility::Public)).await.unwrap();
        posts.create(&ana, post_input("secret milonga", Visibility::Private)).await.unwrap();
        events.create(&ana, event_input("Milonga del Centro", None)).await.unwrap();
        groups
            .create(
                &ana,
                CreateGroupInput {
                    name: "Milonga lovers".into(),
                    description: String::new(),
                    group_type: GroupType::Interest,
                    city: None,
                    country: None,
                },
            )
            .await
            .unwrap();

        let all = service
            .search(None, "milong", SearchKind::All, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(all.users.unwrap().total, 1);
        // the private post stays hidden from anonymous searches
        assert_eq!(all.posts.unwrap().total, 1);
        assert_eq!(all.events.unwrap().total, 1);
        assert_eq!(all.groups.unwrap().total, 1);
        assert_eq!(all.housing.unwrap().total, 0);

        let only_events = service
            .search(Some(&ana), "centro", SearchKind::Events, &ListParams::default())
            .await
            .unwrap();
        assert!(only_events.posts.is_none());
        assert_eq!(only_events.events.unwrap().total, 1);
    }
}
