//! Admin dashboard and system statistics

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, System};

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::{
    EventRepository, GroupRepository, HousingRepository, PostRepository, ReportRepository,
    UserRepository,
};
use crate::metrics::RequestStats;
use crate::models::UserStatus;
use crate::services::error::ServiceResult;
use crate::services::subscription::SubscriptionService;

const DASHBOARD_TTL: Duration = Duration::from_secs(30);

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCounts {
    pub total: i64,
    pub active: i64,
    pub banned: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub total: i64,
    pub upcoming: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub users: UserCounts,
    pub posts: i64,
    pub events: EventCounts,
    pub groups: i64,
    pub open_reports: i64,
    pub active_housing_listings: i64,
    /// Active subscriptions keyed by plan name
    pub subscriptions_by_plan: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub version: String,
    /// Resident memory of this process
    pub memory_bytes: u64,
    pub memory_formatted: String,
    pub system_total_memory: u64,
    pub system_used_memory: u64,
    pub os_name: String,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub error_responses: u64,
    pub avg_response_time_ms: f64,
    pub upload_bytes: u64,
    pub memory_cleanups: u64,
}

pub struct AdminService {
    users: Arc<dyn UserRepository>,
    posts: Arc<dyn PostRepository>,
    events: Arc<dyn EventRepository>,
    groups: Arc<dyn GroupRepository>,
    reports: Arc<dyn ReportRepository>,
    housing: Arc<dyn HousingRepository>,
    subscriptions: Arc<SubscriptionService>,
    cache: Arc<Cache>,
    stats: Arc<RequestStats>,
}

impl AdminService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepository>,
        posts: Arc<dyn PostRepository>,
        events: Arc<dyn EventRepository>,
        groups: Arc<dyn GroupRepository>,
        reports: Arc<dyn ReportRepository>,
        housing: Arc<dyn HousingRepository>,
        subscriptions: Arc<SubscriptionService>,
        cache: Arc<Cache>,
        stats: Arc<RequestStats>,
    ) -> Self {
        Self {
            users,
            posts,
            events,
            groups,
            reports,
            housing,
            subscriptions,
            cache,
            stats,
        }
    }

    /// Content counters, cached for a short while
    pub async fn dashboard(&self) -> ServiceResult<DashboardStats> {
        match self.cache.get::<DashboardStats>(keys::DASHBOARD_STATS).await {
            Ok(Some(stats)) => return Ok(stats),
            Ok(None) => {}
            Err(e) => tracing::warn!("Dashboard cache read failed: {}", e),
        }

        let total_users = self.users.count(false).await?;
        let subscriptions_by_plan = self
            .subscriptions
            .counts_by_plan()
            .await?
            .into_iter()
            .map(|(plan, count)| (plan.to_string(), count))
            .collect();

        let stats = DashboardStats {
            users: UserCounts {
                total: total_users,
                active: self.users.count_by_status(UserStatus::Active).await?,
                banned: self.users.count_by_status(UserStatus::Banned).await?,
            },
            posts: self.posts.count().await?,
            events: EventCounts {
                total: self.events.count().await?,
                upcoming: self.events.count_upcoming(Utc::now()).await?,
            },
            groups: self.groups.count().await?,
            open_reports: self.reports.count_open().await?,
            active_housing_listings: self.housing.count_active().await?,
            subscriptions_by_plan,
        };

        if let Err(e) = self.cache.set(keys::DASHBOARD_STATS, &stats, DASHBOARD_TTL).await {
            tracing::warn!("Dashboard cache write failed: {}", e);
        }
        Ok(stats)
    }

    pub fn system(&self) -> SystemStats {
        let mut sys = System::new_all();
        sys.refresh_all();

        let memory_bytes = sys
            .process(Pid::from_u32(process::id()))
            .map(|p| p.memory())
            .unwrap_or(0);
        let uptime_seconds = self.stats.uptime_seconds();

        SystemStats {
            version: APP_VERSION.to_string(),
            memory_bytes,
            memory_formatted: format_bytes(memory_bytes),
            system_total_memory: sys.total_memory(),
            system_used_memory: sys.used_memory(),
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            uptime_seconds,
            uptime_formatted: format_uptime(uptime_seconds),
            total_requests: self.stats.total_requests(),
            error_responses: self.stats.error_responses(),
            avg_response_time_ms: self.stats.avg_response_time_us() / 1000.0,
            upload_bytes: self.stats.upload_bytes(),
            memory_cleanups: self.stats.memory_cleanups(),
        }
    }
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::test_cache;
    use crate::db::repositories::{
        SqlxEventRepository, SqlxGroupRepository, SqlxHousingRepository, SqlxPostRepository,
        SqlxReportRepository, SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::{migrated_test_pool, DynDatabasePool};
    use crate::models::{Plan, UserRole, Visibility};
    use crate::services::event::tests::{event_input, event_service};
    use crate::services::post::tests::{post_input, post_service};
    use crate::services::test_support::{insert_user, insert_user_with_role};

    pub(crate) fn admin_service(pool: &DynDatabasePool, cache: Arc<Cache>) -> AdminService {
        let subscriptions = Arc::new(SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool.clone()),
        ));
        AdminService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            SqlxEventRepository::boxed(pool.clone()),
            SqlxGroupRepository::boxed(pool.clone()),
            SqlxReportRepository::boxed(pool.clone()),
            SqlxHousingRepository::boxed(pool.clone()),
            subscriptions,
            cache,
            Arc::new(RequestStats::new()),
        )
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3_660), "1h 1m");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[tokio::test]
    async fn test_dashboard_counts_and_cache() {
        let pool = migrated_test_pool().await;
        let service = admin_service(&pool, test_cache());
        let ana = insert_user(&pool, "ana").await;
        insert_user_with_role(&pool, "admin", UserRole::Admin).await;
        let posts = post_service(&pool);
        posts.create(&ana, post_input("first milonga", Visibility::Public)).await.unwrap();
        event_service(&pool).create(&ana, event_input("Practica", None)).await.unwrap();

        let stats = service.dashboard().await.unwrap();
        assert_eq!(stats.users.total, 2);
        assert_eq!(stats.users.active, 2);
        assert_eq!(stats.users.banned, 0);
        assert_eq!(stats.posts, 1);
        assert_eq!(stats.events.total, 1);
        assert_eq!(stats.open_reports, 0);
        assert!(stats.subscriptions_by_plan.contains_key(Plan::Free.as_str()));

        // served from the cache until the entry expires
        posts.create(&ana, post_input("second", Visibility::Public)).await.unwrap();
        assert_eq!(service.dashboard().await.unwrap().posts, 1);
    }

    #[tokio::test]
    async fn test_system_stats() {
        let pool = migrated_test_pool().await;
        let service = admin_service(&pool, test_cache());
        service.stats.record(200, 2_000);
        service.stats.record(500, 4_000);
        service.stats.record_upload(10);

        let system = service.system();
        assert_eq!(system.version, APP_VERSION);
        assert_eq!(system.total_requests, 2);
        assert_eq!(system.error_responses, 1);
        assert_eq!(system.avg_response_time_ms, 3.0);
        assert_eq!(system.upload_bytes, 10);
        assert!(!system.memory_formatted.is_empty());
    }
}
