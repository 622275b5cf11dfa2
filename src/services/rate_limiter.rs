//! Sliding-window rate limiter for logins
//!
//! Failed attempts are tracked per username (case-insensitive) and every
//! login request is tracked per client IP. A key is limited once it has
//! `max_attempts` entries inside the window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::AuthConfig;

/// Login requests allowed per IP per minute
const DEFAULT_IP_MAX_REQUESTS: usize = 20;

type Attempts<K> = Arc<RwLock<HashMap<K, Vec<DateTime<Utc>>>>>;

/// One sliding window keyed by `K`
struct Window<K> {
    attempts: Attempts<K>,
    max: usize,
    length: Duration,
}

impl<K: Eq + Hash + Clone> Window<K> {
    fn new(max: usize, length: Duration) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            max,
            length,
        }
    }

    async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.length;
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.max
            }
            None => false,
        }
    }

    async fn record(&self, key: K) {
        self.attempts.write().await.entry(key).or_default().push(Utc::now());
    }

    async fn clear(&self, key: &K) {
        self.attempts.write().await.remove(key);
    }

    async fn prune(&self) {
        let cutoff = Utc::now() - self.length;
        self.attempts.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    usernames: Window<String>,
    ips: Window<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            usernames: Window::new(max_attempts.max(1), window),
            ips: Window::new(DEFAULT_IP_MAX_REQUESTS, Duration::minutes(1)),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.login_max_attempts,
            Duration::minutes(config.login_window_minutes.max(1)),
        )
    }

    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.usernames.is_limited(&username.to_lowercase()).await
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        self.usernames.record(username.to_lowercase()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_username_attempts(&self, username: &str) {
        self.usernames.clear(&username.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(&ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip).await;
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        self.usernames.prune().await;
        self.ips.prune().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_username_rate_limit() {
        let limiter = LoginRateLimiter::new(3, Duration::minutes(15));

        for _ in 0..2 {
            limiter.record_failed_attempt("tanguero").await;
            assert!(!limiter.is_username_limited("tanguero").await);
        }
        limiter.record_failed_attempt("tanguero").await;
        assert!(limiter.is_username_limited("tanguero").await);

        limiter.clear_username_attempts("tanguero").await;
        assert!(!limiter.is_username_limited("tanguero").await);
    }

    #[tokio::test]
    async fn test_case_insensitive_username() {
        let limiter = LoginRateLimiter::new(3, Duration::minutes(15));
        limiter.record_failed_attempt("Milonguera").await;
        limiter.record_failed_attempt("MILONGUERA").await;
        limiter.record_failed_attempt("milonguera").await;
        assert!(limiter.is_username_limited("MiLoNgUeRa").await);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = LoginRateLimiter::new(1, Duration::milliseconds(30));
        limiter.record_failed_attempt("ana").await;
        assert!(limiter.is_username_limited("ana").await);

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(!limiter.is_username_limited("ana").await);
    }

    #[tokio::test]
    async fn test_ip_rate_limit() {
        let limiter = LoginRateLimiter::default();
        let ip = IpAddr::from_str("10.0.0.7").unwrap();
        for _ in 0..DEFAULT_IP_MAX_REQUESTS {
            assert!(!limiter.is_ip_limited(ip).await);
            limiter.record_ip_request(ip).await;
        }
        assert!(limiter.is_ip_limited(ip).await);

        let other = IpAddr::from_str("10.0.0.8").unwrap();
        assert!(!limiter.is_ip_limited(other).await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired() {
        let limiter = LoginRateLimiter::new(5, Duration::milliseconds(10));
        limiter.record_failed_attempt("old").await;
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        limiter.cleanup().await;
        assert!(limiter.usernames.attempts.read().await.is_empty());
    }
}
