//! Session store configuration.

use super::defaults::default_inactivity_timeout_ms;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A session with no heartbeat for longer than this is swept by the janitor.
    pub inactivity_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
        }
    }
}
