//! Reconnect service configuration.

use super::defaults::{default_grace_ms, default_replacement_confirmation_ttl_ms};
use serde::{Deserialize, Serialize};

pub const GRACE_MS_BOUNDS: (u64, u64) = (30_000, 600_000);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Grace period a disconnected session may resume within.
    pub grace_ms: u64,
    /// TTL for a replacement-confirmation token (§9 open question resolution).
    pub replacement_confirmation_ttl_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            replacement_confirmation_ttl_ms: default_replacement_confirmation_ttl_ms(),
        }
    }
}
