//! Default value functions for configuration fields.
//!
//! This module contains all the default value functions used by serde's `#[serde(default = ...)]`
//! attributes throughout the configuration system. Functions are organized by category for
//! easier maintenance.

use super::logging::LogFormat;

// =============================================================================
// Admission defaults
// =============================================================================

pub const fn default_admission_timeout_ms() -> u64 {
    10_000
}

pub const fn default_max_queue_length() -> usize {
    1000
}

pub const fn default_admission_rate_limit() -> u32 {
    5
}

pub const fn default_admission_rate_window_seconds() -> u64 {
    60
}

pub const fn default_admission_rate_lock_seconds() -> u64 {
    60
}

// =============================================================================
// Reconnect defaults
// =============================================================================

pub const fn default_grace_ms() -> u64 {
    60_000
}

// =============================================================================
// Session defaults
// =============================================================================

pub const fn default_inactivity_timeout_ms() -> u64 {
    600_000
}

// =============================================================================
// Janitor defaults
// =============================================================================

pub const fn default_janitor_interval_seconds() -> u64 {
    60
}

pub const fn default_janitor_grace_buffer_seconds() -> u64 {
    5
}

pub const fn default_janitor_batch_size() -> usize {
    50
}

pub const fn default_orphan_key_ttl_seconds() -> u64 {
    3600
}

// =============================================================================
// Rate limiter channel defaults
// =============================================================================

pub const fn default_chat_limit() -> u32 {
    5
}

pub const fn default_chat_window_ms() -> u64 {
    10_000
}

pub const fn default_tile_action_limit() -> u32 {
    20
}

pub const fn default_tile_action_window_ms() -> u64 {
    10_000
}

pub const fn default_private_message_limit() -> u32 {
    10
}

pub const fn default_private_message_window_ms() -> u64 {
    10_000
}

// =============================================================================
// Board / rule-set bound defaults
// =============================================================================

pub const fn default_board_max_dimension() -> u16 {
    256
}

pub const fn default_max_players() -> u8 {
    64
}

// =============================================================================
// Action pipeline defaults
// =============================================================================

pub const fn default_drain_batch_size() -> usize {
    32
}

// =============================================================================
// Health poller defaults
// =============================================================================

pub const fn default_health_poll_interval_seconds() -> u64 {
    10
}

pub const fn default_health_poll_timeout_seconds() -> u64 {
    3
}

// =============================================================================
// Replacement confirmation defaults
// =============================================================================

pub const fn default_replacement_confirmation_ttl_ms() -> u64 {
    30_000
}

// =============================================================================
// Client build defaults
// =============================================================================

pub fn default_current_client_build() -> String {
    "1.0.0".to_string()
}

pub fn default_supported_client_builds() -> Vec<String> {
    vec!["1.0.0".to_string()]
}

// =============================================================================
// Server / networking defaults
// =============================================================================

pub const fn default_port() -> u16 {
    7777
}

// =============================================================================
// Logging defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "battle-core.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    true
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
