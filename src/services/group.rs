//! Groups (city communities, professional circles, interest groups)
//!
//! The creator joins as the first admin. Slugs are derived from the name
//! and stay reserved after a group is deleted.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::{GroupRepository, UserRepository};
use crate::models::{
    CreateGroupInput, Group, GroupMember, GroupMemberRole, ListParams, PagedResult, PublicProfile,
    UpdateGroupInput, User,
};
use crate::services::error::{found, require_text, ServiceError, ServiceResult};
use crate::services::subscription::SubscriptionService;

const MAX_NAME_CHARS: usize = 100;

const MAX_SLUG_ATTEMPTS: usize = 50;

/// A membership row with the member's profile
#[derive(Debug, Clone, Serialize)]
pub struct GroupMemberView {
    #[serde(flatten)]
    pub member: GroupMember,
    pub user: Option<PublicProfile>,
}

pub struct GroupService {
    repo: Arc<dyn GroupRepository>,
    user_repo: Arc<dyn UserRepository>,
    subscriptions: Arc<SubscriptionService>,
}

impl GroupService {
    pub fn new(
        repo: Arc<dyn GroupRepository>,
        user_repo: Arc<dyn UserRepository>,
        subscriptions: Arc<SubscriptionService>,
    ) -> Self {
        Self {
            repo,
            user_repo,
            subscriptions,
        }
    }

    pub async fn create(&self, user: &User, input: CreateGroupInput) -> ServiceResult<Group> {
        let name = require_text("Name", &input.name, MAX_NAME_CHARS)?;
        self.subscriptions.check_group_quota(user).await?;
        let slug = self.unique_slug(&name).await?;

        let now = Utc::now();
        let group = Group {
            id: 0,
            name,
            slug,
            description: input.description.trim().to_string(),
            group_type: input.group_type,
            city: trimmed(input.city),
            country: trimmed(input.country),
            created_by: user.id,
            member_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let group = self.repo.create(&group).await?;
        self.repo.add_member(group.id, user.id, GroupMemberRole::Admin).await?;
        tracing::info!(group_id = group.id, slug = %group.slug, "Group created");

        self.get(group.id).await
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Group> {
        found(self.repo.get_by_id(id).await?, "Group")
    }

    pub async fn update(&self, user: &User, id: i64, input: UpdateGroupInput) -> ServiceResult<Group> {
        let mut group = self.get(id).await?;
        self.ensure_group_admin(user, &group).await?;

        // the slug keeps pointing at the original name
        if let Some(name) = input.name {
            group.name = require_text("Name", &name, MAX_NAME_CHARS)?;
        }
        if let Some(description) = input.description {
            group.description = description.trim().to_string();
        }
        if let Some(group_type) = input.group_type {
            group.group_type = group_type;
        }
        if input.city.is_some() {
            group.city = trimmed(input.city);
        }
        if input.country.is_some() {
            group.country = trimmed(input.country);
        }
        Ok(self.repo.update(&group).await?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> ServiceResult<()> {
        let group = self.get(id).await?;
        self.ensure_group_admin(user, &group).await?;
        self.repo.soft_delete(id).await?;
        tracing::info!(group_id = id, by = user.id, "Group deleted");
        Ok(())
    }

    pub async fn list(&self, params: &ListParams) -> ServiceResult<PagedResult<Group>> {
        let (items, total) = self.repo.list(params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn search(&self, query: &str, params: &ListParams) -> ServiceResult<PagedResult<Group>> {
        let (items, total) = self.repo.search(query, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn join(&self, user: &User, group_id: i64) -> ServiceResult<GroupMember> {
        self.get(group_id).await?;
        if self.repo.get_member(group_id, user.id).await?.is_some() {
            return Err(ServiceError::conflict("Already a member of this group"));
        }
        Ok(self.repo.add_member(group_id, user.id, GroupMemberRole::Member).await?)
    }

    pub async fn leave(&self, user: &User, group_id: i64) -> ServiceResult<()> {
        self.get(group_id).await?;
        let member = found(self.repo.get_member(group_id, user.id).await?, "Membership")?;
        if member.role == GroupMemberRole::Admin && self.repo.count_admins(group_id).await? <= 1 {
            return Err(ServiceError::conflict(
                "The last admin cannot leave the group",
            ));
        }
        self.repo.remove_member(group_id, user.id).await?;
        Ok(())
    }

    pub async fn members(&self, group_id: i64, params: &ListParams) -> ServiceResult<PagedResult<GroupMemberView>> {
        self.get(group_id).await?;
        let (members, total) = self.repo.list_members(group_id, params).await?;
        let ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();
        let users = self.user_repo.get_many(&ids).await?;

        let views = members
            .into_iter()
            .map(|member| GroupMemberView {
                user: users
                    .iter()
                    .find(|u| u.id == member.user_id)
                    .map(User::public_profile),
                member,
            })
            .collect();
        Ok(PagedResult::new(views, total, params))
    }

    async fn ensure_group_admin(&self, user: &User, group: &Group) -> ServiceResult<()> {
        if user.is_staff() {
            return Ok(());
        }
        match self.repo.get_member(group.id, user.id).await? {
            Some(m) if m.role == GroupMemberRole::Admin => Ok(()),
            _ => Err(ServiceError::forbidden("Only group admins can manage this group")),
        }
    }

    async fn unique_slug(&self, name: &str) -> ServiceResult<String> {
        let base = match generate_slug(name) {
            s if s.is_empty() => "group".to_string(),
            s => s,
        };
        if !self.repo.slug_exists(&base).await? {
            return Ok(base);
        }
        for n in 2..=MAX_SLUG_ATTEMPTS {
            let candidate = format!("{}-{}", base, n);
            if !self.repo.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Ok(format!("{}-{}", base, &suffix[..8]))
    }
}

/// URL slug from a group name.
///
/// Lowercases, turns separators and ASCII punctuation into single hyphens
/// and keeps non-ASCII letters (`"Peña Tanguera"` → `"peña-tanguera"`).
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut prev_hyphen = true;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen {
            slug.push('-');
            prev_hyphen = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxGroupRepository, SqlxSubscriptionRepository, SqlxUserRepository};
    use crate::db::{migrated_test_pool, DynDatabasePool};
    use crate::models::{GroupType, Plan};
    use crate::services::test_support::insert_user;
    use proptest::prelude::*;

    fn subscriptions(pool: &DynDatabasePool) -> Arc<SubscriptionService> {
        Arc::new(SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool.clone()),
        ))
    }

    fn group_service(pool: &DynDatabasePool) -> GroupService {
        GroupService::new(
            SqlxGroupRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            subscriptions(pool),
        )
    }

    fn input(name: &str) -> CreateGroupInput {
        CreateGroupInput {
            name: name.to_string(),
            description: String::new(),
            group_type: GroupType::City,
            city: Some("Rosario".into()),
            country: None,
        }
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Tango Rosario"), "tango-rosario");
        assert_eq!(generate_slug("  Peña   Tanguera!! "), "peña-tanguera");
        assert_eq!(generate_slug("DJs & Musicalizadores"), "djs-musicalizadores");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[tokio::test]
    async fn test_creator_becomes_admin_and_slugs_are_unique() {
        let pool = migrated_test_pool().await;
        let service = group_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;

        let first = service.create(&ana, input("Tango Rosario")).await.unwrap();
        assert_eq!(first.slug, "tango-rosario");
        assert_eq!(first.member_count, 1);

        let second = service.create(&beto, input("Tango Rosario")).await.unwrap();
        assert_eq!(second.slug, "tango-rosario-2");

        let members = service.members(first.id, &ListParams::default()).await.unwrap();
        assert_eq!(members.items[0].member.role, GroupMemberRole::Admin);
        assert_eq!(members.items[0].user.as_ref().unwrap().username, "ana");
    }

    #[tokio::test]
    async fn test_free_plan_group_limit() {
        let pool = migrated_test_pool().await;
        let service = group_service(&pool);
        let ana = insert_user(&pool, "ana").await;

        service.create(&ana, input("First")).await.unwrap();
        let result = service.create(&ana, input("Second")).await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));

        subscriptions(&pool).change_plan(&ana, Plan::Basic).await.unwrap();
        assert!(service.create(&ana, input("Second")).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let pool = migrated_test_pool().await;
        let service = group_service(&pool);
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;
        let group = service.create(&ana, input("Milongueros")).await.unwrap();

        service.join(&beto, group.id).await.unwrap();
        assert!(matches!(service.join(&beto, group.id).await, Err(ServiceError::Conflict(_))));
        assert_eq!(service.get(group.id).await.unwrap().member_count, 2);

        // ana is the only admin
        assert!(matches!(service.leave(&ana, group.id).await, Err(ServiceError::Conflict(_))));
        service.leave(&beto, group.id).await.unwrap();
        assert!(matches!(service.leave(&beto, group.id).await, Err(ServiceError::NotFound(_))));
        assert_eq!(service.get(group.id).await.unwrap().member_count, 1);

        // plain members cannot edit
        service.join(&beto, group.id).await.unwrap();
        let rename = UpdateGroupInput {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(&beto, group.id, rename).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    proptest! {
        #[test]
        fn slug_has_no_edge_or_double_hyphens(name in "[A-Za-z0-9 !&_-]{0,40}") {
            let slug = generate_slug(&name);
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }
    }
}
