//! Periodic background work
//!
//! Each task is a `tokio::time::interval` loop spawned at startup. A failing
//! run is logged and the loop keeps going.

use std::process;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::task::JoinHandle;

use crate::cache::{Cache, CacheLayer};
use crate::metrics::RequestStats;
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::upload::UploadService;
use crate::services::user::UserService;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const UPLOAD_PURGE_INTERVAL: Duration = Duration::from_secs(1800);
const RATE_LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Watches resident memory and flushes the cache when it crosses the limit
pub struct MemoryMonitor {
    limit_bytes: u64,
    cache: Arc<Cache>,
    stats: Arc<RequestStats>,
    system: System,
    pid: Pid,
}

impl MemoryMonitor {
    pub fn new(limit_mb: u64, cache: Arc<Cache>, stats: Arc<RequestStats>) -> Self {
        Self {
            limit_bytes: limit_mb.saturating_mul(1024 * 1024),
            cache,
            stats,
            system: System::new(),
            pid: Pid::from_u32(process::id()),
        }
    }

    /// Current RSS of this process in bytes
    pub fn sample(&mut self) -> u64 {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            ProcessRefreshKind::new().with_memory(),
        );
        self.system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    /// React to one RSS sample. Returns true when the cache was flushed.
    pub async fn check(&self, rss_bytes: u64) -> bool {
        if self.limit_bytes == 0 || rss_bytes <= self.limit_bytes {
            return false;
        }
        tracing::warn!(
            rss_mb = rss_bytes / (1024 * 1024),
            limit_mb = self.limit_bytes / (1024 * 1024),
            "Memory above limit, clearing cache"
        );
        if let Err(e) = self.cache.clear().await {
            tracing::error!("Failed to clear cache under memory pressure: {}", e);
        }
        self.stats.record_memory_cleanup();
        true
    }

    pub fn spawn(mut self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let rss = self.sample();
                self.check(rss).await;
            }
        })
    }
}

pub fn spawn_session_cleanup(users: Arc<UserService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match users.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(removed = n, "Expired sessions cleaned up"),
                Err(e) => tracing::error!("Session cleanup failed: {}", e),
            }
        }
    })
}

pub fn spawn_upload_purge(uploads: Arc<UploadService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPLOAD_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match uploads.purge_stale().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(removed = n, "Stale chunked uploads purged"),
                Err(e) => tracing::error!("Chunked upload purge failed: {}", e),
            }
        }
    })
}

pub fn spawn_rate_limiter_cleanup(limiter: Arc<LoginRateLimiter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMITER_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{test_cache, CacheLayer};

    #[tokio::test]
    async fn test_check_below_limit_keeps_cache() {
        let cache = test_cache();
        let stats = Arc::new(RequestStats::new());
        cache.set("k", &1u32, Duration::from_secs(60)).await.unwrap();

        let monitor = MemoryMonitor::new(100, cache.clone(), stats.clone());
        assert!(!monitor.check(50 * 1024 * 1024).await);
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(1));
        assert_eq!(stats.memory_cleanups(), 0);
    }

    #[tokio::test]
    async fn test_check_above_limit_clears_cache() {
        let cache = test_cache();
        let stats = Arc::new(RequestStats::new());
        cache.set("k", &1u32, Duration::from_secs(60)).await.unwrap();

        let monitor = MemoryMonitor::new(100, cache.clone(), stats.clone());
        assert!(monitor.check(101 * 1024 * 1024).await);
        assert_eq!(cache.get::<u32>("k").await.unwrap(), None);
        assert_eq!(stats.memory_cleanups(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_disables_monitor() {
        let monitor = MemoryMonitor::new(0, test_cache(), Arc::new(RequestStats::new()));
        assert!(!monitor.check(u64::MAX).await);
    }

    #[test]
    fn test_sample_reads_own_process() {
        let mut monitor = MemoryMonitor::new(100, test_cache(), Arc::new(RequestStats::new()));
        assert!(monitor.sample() > 0);
    }
}
