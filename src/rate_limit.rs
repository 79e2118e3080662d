//! Rate Limiter (§4.2): per-channel sliding-window admission decisions
//! keyed by `(channel, subject)`.

use crate::config::rate_limit::RateLimiterConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("channel {0:?} is not declared in rate limiter configuration")]
    UnknownChannel(String),
    #[error("rate limit exceeded for channel {channel:?}, retry after {retry_after_ms}ms")]
    Exceeded {
        channel: String,
        retry_after_ms: u64,
    },
}

/// Result of [`RateLimiterStore::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_ms: Option<u64>,
    pub remaining: Option<u32>,
}

/// Pluggable sliding-window store. The in-memory implementation is the
/// default; a cluster deployment may back this with a shared store instead
/// (§4.2 "Store abstraction is pluggable").
#[async_trait]
pub trait RateLimiterStore: Send + Sync {
    /// Evaluate whether `subject` may proceed on `channel` at `now`, per the
    /// channel's configured `{limit, windowMs}`.
    async fn evaluate(&self, channel: &str, subject: &str, now: DateTime<Utc>) -> RateLimitDecision;

    /// Evaluate and fail with [`RateLimitError::Exceeded`] when not allowed.
    async fn enforce(
        &self,
        channel: &str,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let decision = self.evaluate(channel, subject, now).await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(RateLimitError::Exceeded {
                channel: channel.to_string(),
                retry_after_ms: decision.retry_after_ms.unwrap_or(0),
            })
        }
    }
}

/// In-memory sliding-window limiter, one `VecDeque<DateTime<Utc>>` per
/// `(channel, subject)` key.
pub struct InMemoryRateLimiter {
    config: RateLimiterConfig,
    windows: DashMap<(String, String), VecDeque<DateTime<Utc>>>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Remove windows that have fully aged out. Intended to run from a
    /// periodic background task so memory usage stays bounded.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        self.windows.retain(|(channel, _subject), timestamps| {
            if let Some(limit) = self.config.channel(channel) {
                trim(timestamps, now, limit.window_ms);
            }
            !timestamps.is_empty()
        });
    }
}

fn trim(timestamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window_ms: u64) {
    let cutoff = now - chrono::Duration::milliseconds(window_ms as i64);
    while let Some(&front) = timestamps.front() {
        if front <= cutoff {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl RateLimiterStore for InMemoryRateLimiter {
    async fn evaluate(&self, channel: &str, subject: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let Some(limit) = self.config.channel(channel) else {
            // Undeclared channels are treated as unlimited; callers that
            // require a declared channel should check configuration at
            // startup (see config::validation).
            return RateLimitDecision {
                allowed: true,
                retry_after_ms: None,
                remaining: None,
            };
        };

        let key = (channel.to_string(), subject.to_string());
        let mut entry = self.windows.entry(key).or_default();
        trim(&mut entry, now, limit.window_ms);

        if entry.len() >= limit.limit as usize {
            let retry_after_ms = entry
                .front()
                .map(|&oldest| {
                    let elapsed = now - oldest;
                    let window = chrono::Duration::milliseconds(limit.window_ms as i64);
                    (window - elapsed).num_milliseconds().max(0) as u64
                })
                .unwrap_or(limit.window_ms);
            return RateLimitDecision {
                allowed: false,
                retry_after_ms: Some(retry_after_ms),
                remaining: Some(0),
            };
        }

        entry.push_back(now);
        RateLimitDecision {
            allowed: true,
            retry_after_ms: None,
            remaining: Some(limit.limit - entry.len() as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rate_limit::{ChannelLimit, CHAT_CHANNEL};

    fn limiter_with(limit: u32, window_ms: u64) -> InMemoryRateLimiter {
        let mut config = RateLimiterConfig::default();
        config
            .channels
            .insert(CHAT_CHANNEL.to_string(), ChannelLimit { limit, window_ms });
        InMemoryRateLimiter::new(config)
    }

    #[tokio::test]
    async fn allows_requests_under_limit() {
        let limiter = limiter_with(5, 10_000);
        let now = Utc::now();
        for _ in 0..5 {
            let decision = limiter.evaluate(CHAT_CHANNEL, "session-1", now).await;
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn sixth_chat_message_in_window_is_rejected() {
        // Property 13: the 6th chat within 10_000ms is rejected.
        let limiter = limiter_with(5, 10_000);
        let now = Utc::now();
        for _ in 0..5 {
            assert!(limiter.evaluate(CHAT_CHANNEL, "session-1", now).await.allowed);
        }
        let sixth = limiter.evaluate(CHAT_CHANNEL, "session-1", now).await;
        assert!(!sixth.allowed);
        let retry_secs = sixth.retry_after_ms.unwrap() / 1000;
        assert!((1..=10).contains(&retry_secs));
    }

    #[tokio::test]
    async fn window_slides_forward() {
        let limiter = limiter_with(1, 1_000);
        let now = Utc::now();
        assert!(limiter.evaluate(CHAT_CHANNEL, "s", now).await.allowed);
        assert!(!limiter.evaluate(CHAT_CHANNEL, "s", now).await.allowed);
        let later = now + chrono::Duration::milliseconds(1_001);
        assert!(limiter.evaluate(CHAT_CHANNEL, "s", later).await.allowed);
    }

    #[tokio::test]
    async fn independent_limits_per_subject() {
        let limiter = limiter_with(1, 10_000);
        let now = Utc::now();
        assert!(limiter.evaluate(CHAT_CHANNEL, "a", now).await.allowed);
        assert!(limiter.evaluate(CHAT_CHANNEL, "b", now).await.allowed);
    }

    #[tokio::test]
    async fn enforce_surfaces_typed_error() {
        let limiter = limiter_with(1, 10_000);
        let now = Utc::now();
        limiter.enforce(CHAT_CHANNEL, "s", now).await.unwrap();
        let err = limiter.enforce(CHAT_CHANNEL, "s", now).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { .. }));
    }

    #[tokio::test]
    async fn undeclared_channel_is_unlimited() {
        let limiter = limiter_with(1, 10_000);
        let now = Utc::now();
        for _ in 0..10 {
            assert!(limiter.evaluate("undeclared", "s", now).await.allowed);
        }
    }
}
