//! Board and rule-set bound configuration.

use super::defaults::{default_board_max_dimension, default_max_players};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Hard ceiling on board width/height (§3 Rule Set: `height ∈ [1,256]`).
    pub max_dimension: u16,
    /// Hard ceiling on room player capacity (§3 Rule Set: `maxPlayers ∈ [2,64]`).
    pub max_players: u8,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_board_max_dimension(),
            max_players: default_max_players(),
        }
    }
}
