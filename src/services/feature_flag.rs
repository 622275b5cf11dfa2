//! Feature flags
//!
//! Lookups go through the cache (a missing flag is cached too, as `null`).
//! Every write clears all cached flags.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::FeatureFlagRepository;
use crate::models::{FeatureFlag, UpsertFeatureFlagInput, User};
use crate::services::error::{ServiceError, ServiceResult};

const FLAG_TTL: Duration = Duration::from_secs(60);

static FLAG_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_.-]{1,64}$").expect("valid regex"));

pub struct FeatureFlagService {
    repo: Arc<dyn FeatureFlagRepository>,
    cache: Arc<Cache>,
}

impl FeatureFlagService {
    pub fn new(repo: Arc<dyn FeatureFlagRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// Whether `key` is on for this (possibly anonymous) user. Unknown flags are off.
    pub async fn is_enabled(&self, key: &str, user_id: Option<i64>) -> ServiceResult<bool> {
        Ok(self
            .lookup(key)
            .await?
            .map_or(false, |flag| flag.evaluate(user_id)))
    }

    pub async fn list(&self) -> ServiceResult<Vec<FeatureFlag>> {
        Ok(self.repo.list().await?)
    }

    pub async fn upsert(&self, admin: &User, key: &str, input: UpsertFeatureFlagInput) -> ServiceResult<FeatureFlag> {
        require_admin(admin)?;
        if !FLAG_KEY.is_match(key) {
            return Err(ServiceError::validation(
                "Flag keys use lowercase letters, digits, '_', '.' or '-' (max 64)",
            ));
        }
        if !(0..=100).contains(&input.rollout_percentage) {
            return Err(ServiceError::validation("rollout_percentage must be between 0 and 100"));
        }

        let flag = self.repo.upsert(key, &input).await?;
        self.invalidate().await;
        tracing::info!(
            flag = key,
            enabled = flag.enabled,
            rollout = flag.rollout_percentage,
            by = admin.id,
            "Feature flag updated"
        );
        Ok(flag)
    }

    pub async fn delete(&self, admin: &User, key: &str) -> ServiceResult<()> {
        require_admin(admin)?;
        if !self.repo.delete(key).await? {
            return Err(ServiceError::not_found("Feature flag"));
        }
        self.invalidate().await;
        Ok(())
    }

    async fn lookup(&self, key: &str) -> ServiceResult<Option<FeatureFlag>> {
        let cache_key = keys::flag(key);
        match self.cache.get::<Option<FeatureFlag>>(&cache_key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => tracing::warn!("Feature flag cache read failed: {}", e),
        }

        let flag = self.repo.get(key).await?;
        if let Err(e) = self.cache.set(&cache_key, &flag, FLAG_TTL).await {
            tracing::warn!("Feature flag cache write failed: {}", e);
        }
        Ok(flag)
    }

    async fn invalidate(&self) {
        if let Err(e) = self.cache.delete_pattern(keys::FLAGS_ALL).await {
            tracing::warn!("Failed to invalidate feature flag cache: {}", e);
        }
    }
}

fn require_admin(user: &User) -> ServiceResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Admin access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_cache;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::SqlxFeatureFlagRepository;
    use crate::models::UserRole;
    use crate::services::test_support::{insert_user, insert_user_with_role};

    fn input(enabled: bool, rollout: i64) -> UpsertFeatureFlagInput {
        UpsertFeatureFlagInput {
            enabled,
            description: None,
            rollout_percentage: rollout,
        }
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_answer() {
        let pool = migrated_test_pool().await;
        let service = FeatureFlagService::new(SqlxFeatureFlagRepository::boxed(pool.clone()), test_cache());
        let admin = insert_user_with_role(&pool, "admin", UserRole::Admin).await;

        // the miss is cached as well
        assert!(!service.is_enabled("video_uploads", Some(1)).await.unwrap());

        service.upsert(&admin, "video_uploads", input(true, 100)).await.unwrap();
        assert!(service.is_enabled("video_uploads", Some(1)).await.unwrap());
        assert!(service.is_enabled("video_uploads", None).await.unwrap());

        service.upsert(&admin, "video_uploads", input(false, 100)).await.unwrap();
        assert!(!service.is_enabled("video_uploads", Some(1)).await.unwrap());

        service.delete(&admin, "video_uploads").await.unwrap();
        assert!(matches!(
            service.delete(&admin, "video_uploads").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_guards() {
        let pool = migrated_test_pool().await;
        let service = FeatureFlagService::new(SqlxFeatureFlagRepository::boxed(pool.clone()), test_cache());
        let admin = insert_user_with_role(&pool, "admin", UserRole::Admin).await;
        let ana = insert_user(&pool, "ana").await;

        assert!(matches!(
            service.upsert(&ana, "chat", input(true, 100)).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.upsert(&admin, "Bad Key", input(true, 100)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.upsert(&admin, "chat", input(true, 101)).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_rollout_is_stable() {
        let pool = migrated_test_pool().await;
        let service = FeatureFlagService::new(SqlxFeatureFlagRepository::boxed(pool.clone()), test_cache());
        let admin = insert_user_with_role(&pool, "admin", UserRole::Admin).await;
        service.upsert(&admin, "new_feed", input(true, 50)).await.unwrap();

        let first: Vec<bool> = futures::future::join_all((1..=40).map(|id| service.is_enabled("new_feed", Some(id))))
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        let second: Vec<bool> = futures::future::join_all((1..=40).map(|id| service.is_enabled("new_feed", Some(id))))
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(first, second);
        assert!(!service.is_enabled("new_feed", None).await.unwrap());
    }
}
