//! Subscription plans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub plan: Plan,
    #[sqlx(try_from = "String")]
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// The plan in force at `now`. Cancelled subscriptions keep their
    /// benefits until the paid period ends.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> Plan {
        match self.status {
            SubscriptionStatus::Active => self.plan,
            SubscriptionStatus::Cancelled if now < self.current_period_end => self.plan,
            SubscriptionStatus::Cancelled => Plan::Free,
        }
    }
}

string_enum! {
    pub enum Plan {
        Free => "free",
        Basic => "basic",
        Premium => "premium",
        Host => "host",
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::Free
    }
}

string_enum! {
    pub enum SubscriptionStatus {
        Active => "active",
        Cancelled => "cancelled",
    }
}

/// Price and allowances of a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    pub plan: Plan,
    pub name: &'static str,
    pub monthly_price_cents: i64,
    /// `None` means unlimited
    pub max_groups: Option<i64>,
    pub can_host_housing: bool,
    pub max_upload_mb: u64,
}

impl Plan {
    pub fn info(&self) -> PlanInfo {
        match self {
            Plan::Free => PlanInfo {
                plan: *self,
                name: "Free",
                monthly_price_cents: 0,
                max_groups: Some(1),
                can_host_housing: false,
                max_upload_mb: 100,
            },
            Plan::Basic => PlanInfo {
                plan: *self,
                name: "Basic",
                monthly_price_cents: 499,
                max_groups: Some(5),
                can_host_housing: false,
                max_upload_mb: 500,
            },
            Plan::Premium => PlanInfo {
                plan: *self,
                name: "Premium",
                monthly_price_cents: 999,
                max_groups: None,
                can_host_housing: true,
                max_upload_mb: 2048,
            },
            Plan::Host => PlanInfo {
                plan: *self,
                name: "Host",
                monthly_price_cents: 1999,
                max_groups: None,
                can_host_housing: true,
                max_upload_mb: 2048,
            },
        }
    }
}
