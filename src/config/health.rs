//! Health Poller configuration.

use super::defaults::{default_health_poll_interval_seconds, default_health_poll_timeout_seconds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Cadence at which the shared cache is pinged.
    pub poll_interval_seconds: u64,
    /// Per-ping timeout before the check is considered unhealthy.
    pub poll_timeout_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_health_poll_interval_seconds(),
            poll_timeout_seconds: default_health_poll_timeout_seconds(),
        }
    }
}
