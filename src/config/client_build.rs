//! Supported client build configuration (§4.12 step 2, §6.5).

use super::defaults::{default_current_client_build, default_supported_client_builds};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientBuildConfig {
    /// The build version advertised to clients guided into `UPGRADE`.
    pub current: String,
    /// Builds the admission controller still accepts.
    pub supported: HashSet<String>,
}

impl Default for ClientBuildConfig {
    fn default() -> Self {
        Self {
            current: default_current_client_build(),
            supported: default_supported_client_builds().into_iter().collect(),
        }
    }
}

impl ClientBuildConfig {
    #[must_use]
    pub fn is_supported(&self, build: &str) -> bool {
        self.supported.contains(build)
    }
}
