//! Janitor sweep configuration.

use super::defaults::{
    default_janitor_batch_size, default_janitor_grace_buffer_seconds,
    default_janitor_interval_seconds, default_orphan_key_ttl_seconds,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Sweep cadence.
    pub interval_seconds: u64,
    /// Buffer added to `graceExpiresAt` before a grace session is reaped.
    pub grace_period_buffer_seconds: u64,
    /// Maximum entries processed per sweep phase.
    pub batch_size: usize,
    /// TTL applied to orphan cache keys lacking one.
    pub orphan_key_ttl_seconds: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_janitor_interval_seconds(),
            grace_period_buffer_seconds: default_janitor_grace_buffer_seconds(),
            batch_size: default_janitor_batch_size(),
            orphan_key_ttl_seconds: default_orphan_key_ttl_seconds(),
        }
    }
}
