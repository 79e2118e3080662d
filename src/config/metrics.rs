//! Metrics configuration.

use serde::{Deserialize, Serialize};

/// Metrics configuration. Controls only how the in-process registry behaves;
/// the shape and transport of an external scrape endpoint are out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Number of significant figures kept by latency histograms.
    pub histogram_significant_figures: u8,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            histogram_significant_figures: 3,
        }
    }
}
