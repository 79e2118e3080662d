//! Drain / maintenance mode toggles (§4.12 step 5, §6.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    /// When true, new non-queued admission attempts fail with `maintenance`.
    pub drain_mode_enabled: bool,
    /// Reserved for operator-initiated maintenance windows; the core only
    /// exposes the toggle, it does not define what "maintenance" entails
    /// beyond the drain behavior above.
    pub maintenance_mode_enabled: bool,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            drain_mode_enabled: false,
            maintenance_mode_enabled: false,
        }
    }
}
