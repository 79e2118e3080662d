//! Configuration validation. All values have defaults; out-of-bound values
//! fail fast at startup rather than silently clamping (§6.5).

use super::admission::{
    ADMISSION_QUEUE_LENGTH_BOUNDS, ADMISSION_RATE_LIMIT_BOUNDS, ADMISSION_RATE_WINDOW_BOUNDS_SECS,
};
use super::reconnect::GRACE_MS_BOUNDS;
use super::Config;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigValidationError {
    #[error("admission.maxQueueLength {0} outside [{1}, {2}]")]
    MaxQueueLengthOutOfRange(usize, usize, usize),
    #[error("admission.rateLimit {0} outside [{1}, {2}]")]
    AdmissionRateLimitOutOfRange(u32, u32, u32),
    #[error("admission.rateWindowSeconds {0} outside [{1}, {2}]")]
    AdmissionRateWindowOutOfRange(u64, u64, u64),
    #[error("reconnect.graceMs {0} outside [{1}, {2}]")]
    GraceMsOutOfRange(u64, u64, u64),
    #[error("board.maxDimension {0} exceeds hard ceiling of 256")]
    BoardDimensionTooLarge(u16),
    #[error("board.maxPlayers {0} exceeds hard ceiling of 64")]
    MaxPlayersTooLarge(u8),
    #[error("clientBuild.current is not a member of clientBuild.supported")]
    CurrentBuildNotSupported,
    #[error("rateLimiter.channels is missing required channel {0:?}")]
    MissingChannel(&'static str),
}

/// Validate configuration bounds. Returns the first violated bound.
pub fn validate(config: &Config) -> Result<(), ConfigValidationError> {
    let (min_q, max_q) = ADMISSION_QUEUE_LENGTH_BOUNDS;
    if !(min_q..=max_q).contains(&config.admission.max_queue_length) {
        return Err(ConfigValidationError::MaxQueueLengthOutOfRange(
            config.admission.max_queue_length,
            min_q,
            max_q,
        ));
    }

    let (min_rl, max_rl) = ADMISSION_RATE_LIMIT_BOUNDS;
    if !(min_rl..=max_rl).contains(&config.admission.rate_limit) {
        return Err(ConfigValidationError::AdmissionRateLimitOutOfRange(
            config.admission.rate_limit,
            min_rl,
            max_rl,
        ));
    }

    let (min_rw, max_rw) = ADMISSION_RATE_WINDOW_BOUNDS_SECS;
    if !(min_rw..=max_rw).contains(&config.admission.rate_window_seconds) {
        return Err(ConfigValidationError::AdmissionRateWindowOutOfRange(
            config.admission.rate_window_seconds,
            min_rw,
            max_rw,
        ));
    }

    let (min_g, max_g) = GRACE_MS_BOUNDS;
    if !(min_g..=max_g).contains(&config.reconnect.grace_ms) {
        return Err(ConfigValidationError::GraceMsOutOfRange(
            config.reconnect.grace_ms,
            min_g,
            max_g,
        ));
    }

    if config.board.max_dimension > 256 {
        return Err(ConfigValidationError::BoardDimensionTooLarge(
            config.board.max_dimension,
        ));
    }

    if config.board.max_players > 64 {
        return Err(ConfigValidationError::MaxPlayersTooLarge(
            config.board.max_players,
        ));
    }

    if !config
        .client_build
        .supported
        .contains(&config.client_build.current)
    {
        return Err(ConfigValidationError::CurrentBuildNotSupported);
    }

    for required in [
        super::rate_limit::CHAT_CHANNEL,
        super::rate_limit::TILE_ACTION_CHANNEL,
        super::rate_limit::PRIVATE_MESSAGE_CHANNEL,
    ] {
        if !config.rate_limiter.channels.contains_key(required) {
            return Err(ConfigValidationError::MissingChannel(required));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_grace_ms_out_of_bounds() {
        let mut config = Config::default();
        config.reconnect.grace_ms = 1_000;
        assert_eq!(
            validate(&config),
            Err(ConfigValidationError::GraceMsOutOfRange(1_000, 30_000, 600_000))
        );
    }

    #[test]
    fn rejects_missing_required_channel() {
        let mut config = Config::default();
        config
            .rate_limiter
            .channels
            .remove(super::super::rate_limit::TILE_ACTION_CHANNEL);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unsupported_current_build() {
        let mut config = Config::default();
        config.client_build.current = "9.9.9".to_string();
        assert_eq!(
            validate(&config),
            Err(ConfigValidationError::CurrentBuildNotSupported)
        );
    }
}
