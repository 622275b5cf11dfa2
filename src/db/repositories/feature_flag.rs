//! Feature flag repository

use crate::db::{with_driver, DynDatabasePool};
use crate::models::{FeatureFlag, UpsertFeatureFlagInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait FeatureFlagRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<FeatureFlag>>;

    async fn get(&self, key: &str) -> Result<Option<FeatureFlag>>;

    async fn upsert(&self, key: &str, input: &UpsertFeatureFlagInput) -> Result<FeatureFlag>;

    async fn delete(&self, key: &str) -> Result<bool>;
}

pub struct SqlxFeatureFlagRepository {
    pool: DynDatabasePool,
}

impl SqlxFeatureFlagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FeatureFlagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FeatureFlagRepository for SqlxFeatureFlagRepository {
    async fn list(&self) -> Result<Vec<FeatureFlag>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, FeatureFlag>(
                "SELECT flag_key, enabled, description, rollout_percentage, updated_at FROM feature_flags ORDER BY flag_key ASC",
            )
            .fetch_all(conn)
            .await
            .context("Failed to list feature flags")
        })
    }

    async fn get(&self, key: &str) -> Result<Option<FeatureFlag>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, FeatureFlag>(
                "SELECT flag_key, enabled, description, rollout_percentage, updated_at FROM feature_flags WHERE flag_key = ?",
            )
            .bind(key)
            .fetch_optional(conn)
            .await
            .context("Failed to get feature flag")
        })
    }

    async fn upsert(&self, key: &str, input: &UpsertFeatureFlagInput) -> Result<FeatureFlag> {
        let now = Utc::now();
        let rollout = input.rollout_percentage.clamp(0, 100);
        let exists = self.get(key).await?.is_some();
        with_driver!(self.pool, conn => {
            if exists {
                sqlx::query(
                    "UPDATE feature_flags SET enabled = ?, description = ?, rollout_percentage = ?, updated_at = ? WHERE flag_key = ?",
                )
                .bind(input.enabled)
                .bind(&input.description)
                .bind(rollout)
                .bind(now)
                .bind(key)
                .execute(conn)
                .await
                .context("Failed to update feature flag")?;
            } else {
                sqlx::query(
                    "INSERT INTO feature_flags (flag_key, enabled, description, rollout_percentage, updated_at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(key)
                .bind(input.enabled)
                .bind(&input.description)
                .bind(rollout)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create feature flag")?;
            }
        });

        Ok(FeatureFlag {
            key: key.to_string(),
            enabled: input.enabled,
            description: input.description.clone(),
            rollout_percentage: rollout,
            updated_at: now,
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM feature_flags WHERE flag_key = ?")
                .bind(key)
                .execute(conn)
                .await
                .context("Failed to delete feature flag")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;

    #[tokio::test]
    async fn test_upsert_clamps_rollout() {
        let repo = SqlxFeatureFlagRepository::new(migrated_test_pool().await);
        let input = UpsertFeatureFlagInput {
            enabled: true,
            description: Some("New feed ranking".into()),
            rollout_percentage: 150,
        };
        let flag = repo.upsert("new_feed", &input).await.unwrap();
        assert_eq!(flag.rollout_percentage, 100);

        let input = UpsertFeatureFlagInput {
            enabled: false,
            description: None,
            rollout_percentage: 20,
        };
        repo.upsert("new_feed", &input).await.unwrap();
        let stored = repo.get("new_feed").await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.rollout_percentage, 20);
        assert_eq!(repo.list().await.unwrap().len(), 1);

        assert!(repo.delete("new_feed").await.unwrap());
        assert!(!repo.delete("new_feed").await.unwrap());
    }
}
