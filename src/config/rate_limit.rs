//! Rate limiter channel configuration (§4.2, §6.5 `rateLimiter.channels`).

use super::defaults::{
    default_chat_limit, default_chat_window_ms, default_private_message_limit,
    default_private_message_window_ms, default_tile_action_limit, default_tile_action_window_ms,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Required channel names (§4.2). The admission channel is configured
/// separately under `AdmissionConfig` since its limit/window bounds differ.
pub const CHAT_CHANNEL: &str = "chat_in_instance";
pub const TILE_ACTION_CHANNEL: &str = "tile_action";
pub const PRIVATE_MESSAGE_CHANNEL: &str = "private_message";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelLimit {
    pub limit: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Per-channel sliding-window limits, keyed by channel name.
    pub channels: HashMap<String, ChannelLimit>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        let mut channels = HashMap::new();
        channels.insert(
            CHAT_CHANNEL.to_string(),
            ChannelLimit {
                limit: default_chat_limit(),
                window_ms: default_chat_window_ms(),
            },
        );
        channels.insert(
            TILE_ACTION_CHANNEL.to_string(),
            ChannelLimit {
                limit: default_tile_action_limit(),
                window_ms: default_tile_action_window_ms(),
            },
        );
        channels.insert(
            PRIVATE_MESSAGE_CHANNEL.to_string(),
            ChannelLimit {
                limit: default_private_message_limit(),
                window_ms: default_private_message_window_ms(),
            },
        );
        Self { channels }
    }
}

impl RateLimiterConfig {
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<ChannelLimit> {
        self.channels.get(name).copied()
    }
}
