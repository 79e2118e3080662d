//! Admission controller configuration.

use super::defaults::{
    default_admission_rate_lock_seconds, default_admission_rate_limit,
    default_admission_rate_window_seconds, default_admission_timeout_ms,
    default_max_queue_length,
};
use serde::{Deserialize, Serialize};

/// Bounds for the admission rate-limit window (§6.5: 3–20 over 30–300s).
pub const ADMISSION_RATE_LIMIT_BOUNDS: (u32, u32) = (3, 20);
pub const ADMISSION_RATE_WINDOW_BOUNDS_SECS: (u64, u64) = (30, 300);
pub const ADMISSION_QUEUE_LENGTH_BOUNDS: (usize, usize) = (100, 5000);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Wall-clock deadline for one admission attempt.
    pub timeout_ms: u64,
    /// Maximum queue length before new attempts see `queue_full`.
    pub max_queue_length: usize,
    /// Admission-channel rate limit: attempts allowed per window.
    pub rate_limit: u32,
    /// Admission-channel rate limit window, in seconds.
    pub rate_window_seconds: u64,
    /// How long an exhausted admission rate-limit entry is retained before cleanup.
    pub rate_lock_seconds: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_admission_timeout_ms(),
            max_queue_length: default_max_queue_length(),
            rate_limit: default_admission_rate_limit(),
            rate_window_seconds: default_admission_rate_window_seconds(),
            rate_lock_seconds: default_admission_rate_lock_seconds(),
        }
    }
}
