//! Subscription repository

use crate::db::{with_driver, DynDatabasePool};
use crate::models::{Plan, Subscription, SubscriptionStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, plan, status, started_at, current_period_end, created_at, updated_at";

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_by_user(&self, user_id: i64) -> Result<Option<Subscription>>;

    /// Create or replace the user's single subscription row
    async fn upsert(
        &self,
        user_id: i64,
        plan: Plan,
        status: SubscriptionStatus,
        period_end: DateTime<Utc>,
    ) -> Result<Subscription>;

    async fn set_status(&self, user_id: i64, status: SubscriptionStatus) -> Result<()>;

    /// Active subscriptions on a plan
    async fn count_by_plan(&self, plan: Plan) -> Result<i64>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn get_by_user(&self, user_id: i64) -> Result<Option<Subscription>> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE user_id = ?",
            SUBSCRIPTION_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Subscription>(&sql)
                .bind(user_id)
                .fetch_optional(conn)
                .await
                .context("Failed to get subscription")
        })
    }

    async fn upsert(
        &self,
        user_id: i64,
        plan: Plan,
        status: SubscriptionStatus,
        period_end: DateTime<Utc>,
    ) -> Result<Subscription> {
        let now = Utc::now();
        let existing = self.get_by_user(user_id).await?;
        with_driver!(self.pool, conn => {
            if existing.is_some() {
                sqlx::query(
                    "UPDATE subscriptions SET plan = ?, status = ?, started_at = ?, current_period_end = ?, updated_at = ? WHERE user_id = ?",
                )
                .bind(plan.as_str())
                .bind(status.as_str())
                .bind(now)
                .bind(period_end)
                .bind(now)
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to update subscription")?;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO subscriptions (user_id, plan, status, started_at, current_period_end, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(user_id)
                .bind(plan.as_str())
                .bind(status.as_str())
                .bind(now)
                .bind(period_end)
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create subscription")?;
            }
        });
        self.get_by_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Subscription not found after upsert"))
    }

    async fn set_status(&self, user_id: i64, status: SubscriptionStatus) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE subscriptions SET status = ?, updated_at = ? WHERE user_id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to update subscription status")?;
        });
        Ok(())
    }

    async fn count_by_plan(&self, plan: Plan) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM subscriptions WHERE plan = ? AND status = 'active'",
            )
            .bind(plan.as_str())
            .fetch_one(conn)
            .await
            .context("Failed to count subscriptions")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_upsert_replaces_plan() {
        let pool = migrated_test_pool().await;
        let user_id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('ines', 'ines@example.com', 'h')")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        let repo = SqlxSubscriptionRepository::new(pool);
        assert!(repo.get_by_user(user_id).await.unwrap().is_none());

        let end = Utc::now() + Duration::days(30);
        let sub = repo.upsert(user_id, Plan::Basic, SubscriptionStatus::Active, end).await.unwrap();
        assert_eq!(sub.plan, Plan::Basic);

        let sub = repo.upsert(user_id, Plan::Premium, SubscriptionStatus::Active, end).await.unwrap();
        assert_eq!(sub.plan, Plan::Premium);
        assert_eq!(repo.count_by_plan(Plan::Premium).await.unwrap(), 1);
        assert_eq!(repo.count_by_plan(Plan::Basic).await.unwrap(), 0);

        repo.set_status(user_id, SubscriptionStatus::Cancelled).await.unwrap();
        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert_eq!(sub.effective_plan(Utc::now()), Plan::Premium);
    }
}
