//! Subscription plans and plan gating
//!
//! A user without a subscription row is on the free plan. A cancelled
//! subscription keeps its plan until the paid period ends.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::repositories::{GroupRepository, SubscriptionRepository};
use crate::models::{Plan, PlanInfo, Subscription, SubscriptionStatus, User};
use crate::services::error::{ServiceError, ServiceResult};

const PERIOD_DAYS: i64 = 30;

/// The plan a user is entitled to right now
#[derive(Debug, Clone, Serialize)]
pub struct CurrentPlan {
    pub plan: Plan,
    pub info: PlanInfo,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePlanInput {
    pub plan: Plan,
}

pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    group_repo: Arc<dyn GroupRepository>,
}

impl SubscriptionService {
    pub fn new(repo: Arc<dyn SubscriptionRepository>, group_repo: Arc<dyn GroupRepository>) -> Self {
        Self { repo, group_repo }
    }

    pub fn plans(&self) -> Vec<PlanInfo> {
        Plan::ALL.iter().map(Plan::info).collect()
    }

    pub async fn current(&self, user_id: i64) -> ServiceResult<CurrentPlan> {
        let subscription = self.repo.get_by_user(user_id).await?;
        let plan = subscription
            .as_ref()
            .map_or(Plan::Free, |s| s.effective_plan(Utc::now()));
        Ok(CurrentPlan {
            plan,
            info: plan.info(),
            subscription,
        })
    }

    /// Switch plan and start a fresh 30 day period
    pub async fn change_plan(&self, user: &User, plan: Plan) -> ServiceResult<CurrentPlan> {
        let period_end = Utc::now() + Duration::days(PERIOD_DAYS);
        self.repo
            .upsert(user.id, plan, SubscriptionStatus::Active, period_end)
            .await?;
        tracing::info!(user_id = user.id, %plan, "Subscription plan changed");
        self.current(user.id).await
    }

    /// Cancel at period end
    pub async fn cancel(&self, user: &User) -> ServiceResult<CurrentPlan> {
        match self.repo.get_by_user(user.id).await? {
            Some(sub) if sub.status == SubscriptionStatus::Active && sub.plan != Plan::Free => {
                self.repo.set_status(user.id, SubscriptionStatus::Cancelled).await?;
                tracing::info!(user_id = user.id, plan = %sub.plan, "Subscription cancelled");
                self.current(user.id).await
            }
            _ => Err(ServiceError::validation("No active paid subscription to cancel")),
        }
    }

    /// Housing listings need a plan that allows hosting
    pub async fn require_housing_host(&self, user: &User) -> ServiceResult<()> {
        let current = self.current(user.id).await?;
        if current.info.can_host_housing {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "The {} plan cannot host housing listings; upgrade to Host or Premium",
                current.info.name
            )))
        }
    }

    /// Limit on groups a user may have created under their plan
    pub async fn check_group_quota(&self, user: &User) -> ServiceResult<()> {
        let current = self.current(user.id).await?;
        if let Some(max) = current.info.max_groups {
            let created = self.group_repo.count_created_by(user.id).await?;
            if created >= max {
                return Err(ServiceError::forbidden(format!(
                    "The {} plan allows {} group(s); upgrade to create more",
                    current.info.name, max
                )));
            }
        }
        Ok(())
    }

    /// Active subscriptions per plan
    pub async fn counts_by_plan(&self) -> ServiceResult<Vec<(Plan, i64)>> {
        let mut counts = Vec::with_capacity(Plan::ALL.len());
        for plan in Plan::ALL {
            counts.push((*plan, self.repo.count_by_plan(*plan).await?));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::{SqlxGroupRepository, SqlxSubscriptionRepository};
    use crate::models::UserRole;

    async fn setup() -> (SubscriptionService, User) {
        let pool = migrated_test_pool().await;
        let id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('sofia', 'sofia@example.com', 'h')")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        let mut user = User::new("sofia".into(), "sofia@example.com".into(), "h".into(), UserRole::User);
        user.id = id;
        let service = SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool),
        );
        (service, user)
    }

    #[tokio::test]
    async fn test_defaults_to_free() {
        let (service, user) = setup().await;
        let current = service.current(user.id).await.unwrap();
        assert_eq!(current.plan, Plan::Free);
        assert!(current.subscription.is_none());
        assert!(matches!(
            service.require_housing_host(&user).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_change_and_cancel() {
        let (service, user) = setup().await;
        let current = service.change_plan(&user, Plan::Host).await.unwrap();
        assert_eq!(current.plan, Plan::Host);
        service.require_housing_host(&user).await.unwrap();

        let after_cancel = service.cancel(&user).await.unwrap();
        // still inside the paid period
        assert_eq!(after_cancel.plan, Plan::Host);
        assert_eq!(
            after_cancel.subscription.unwrap().status,
            SubscriptionStatus::Cancelled
        );

        assert!(matches!(service.cancel(&user).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_counts_by_plan() {
        let (service, user) = setup().await;
        service.change_plan(&user, Plan::Premium).await.unwrap();
        let counts = service.counts_by_plan().await.unwrap();
        assert!(counts.contains(&(Plan::Premium, 1)));
        assert!(counts.contains(&(Plan::Free, 0)));
        assert_eq!(service.plans().len(), 4);
    }
}
