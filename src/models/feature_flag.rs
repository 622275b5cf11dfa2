//! Feature flags with percentage rollout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeatureFlag {
    #[sqlx(rename = "flag_key")]
    pub key: String,
    pub enabled: bool,
    pub description: Option<String>,
    /// 0..=100
    pub rollout_percentage: i64,
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    /// Evaluate the flag for a (possibly anonymous) user.
    ///
    /// Partial rollouts bucket users deterministically so a given user sees
    /// a stable answer; anonymous visitors only get fully rolled-out flags.
    pub fn evaluate(&self, user_id: Option<i64>) -> bool {
        if !self.enabled || self.rollout_percentage <= 0 {
            return false;
        }
        if self.rollout_percentage >= 100 {
            return true;
        }
        match user_id {
            Some(id) => (rollout_bucket(&self.key, id) as i64) < self.rollout_percentage,
            None => false,
        }
    }
}

/// Stable bucket in `0..100` for `key:user_id`
pub fn rollout_bucket(key: &str, user_id: i64) -> u8 {
    let digest = Sha256::digest(format!("{}:{}", key, user_id).as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(first) % 100) as u8
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertFeatureFlagInput {
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "full_rollout")]
    pub rollout_percentage: i64,
}

fn full_rollout() -> i64 {
    100
}
