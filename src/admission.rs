//! Admission Controller (§4.12): capacity check, queue placement, rate
//! limiting, replacement prompting, drain gating — one ordered pipeline,
//! first failing check wins.

use crate::config::rate_limit::{ChannelLimit, RateLimiterConfig};
use crate::config::{AdmissionConfig, ClientBuildConfig, DrainConfig};
use crate::rate_limit::{InMemoryRateLimiter, RateLimiterStore};
use crate::session_store::SessionStore;
use crate::types::{CharacterId, InstanceId, QueueEntry, SessionId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// Reports live per-instance seat occupancy; backed by the Lobby/Room
/// registry in the running server (§4.12 step 7).
#[async_trait]
pub trait CapacityOracle: Send + Sync {
    async fn seats_available(&self, instance_id: InstanceId) -> bool;
}

/// Short-lived consent record for replacing an existing active session
/// (§9 open question, resolved): stored as `confirm:{userId}:{characterId}`
/// with a 30s TTL.
#[derive(Default)]
pub struct ConfirmationTokenStore {
    tokens: DashMap<String, (String, DateTime<Utc>)>,
}

fn confirmation_key(user_id: UserId, character_id: CharacterId) -> String {
    format!("confirm:{user_id}:{character_id}")
}

impl ConfirmationTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, user_id: UserId, character_id: CharacterId, ttl_ms: u64, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().to_string();
        let expires_at = now + chrono::Duration::milliseconds(ttl_ms as i64);
        self.tokens
            .insert(confirmation_key(user_id, character_id), (token.clone(), expires_at));
        token
    }

    pub fn validate_and_consume(
        &self,
        user_id: UserId,
        character_id: CharacterId,
        token: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let key = confirmation_key(user_id, character_id);
        match self.tokens.remove(&key) {
            Some((_, (stored, expires_at))) if stored == token && now <= expires_at => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub instance_id: InstanceId,
    pub client_ip: String,
    pub client_version: String,
    pub auth_valid: bool,
    pub character_owned: bool,
    pub replace_existing: bool,
    pub confirmation_token: Option<String>,
    pub is_queued_promotion: bool,
}

#[derive(Debug, Clone)]
pub struct ExistingSessionSummary {
    pub session_id: SessionId,
    pub instance_id: InstanceId,
}

#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    Success {
        session_id: SessionId,
        correlation_id: Uuid,
    },
    Queued {
        position: usize,
        estimated_wait_ms: u64,
        correlation_id: Uuid,
    },
    Failed {
        reason: &'static str,
        retry_after_ms: Option<u64>,
        existing_session: Option<ExistingSessionSummary>,
        correlation_id: Uuid,
    },
}

pub struct AdmissionController {
    config: AdmissionConfig,
    drain: DrainConfig,
    client_build: ClientBuildConfig,
    rate_limiter: InMemoryRateLimiter,
    sessions: Arc<SessionStore>,
    capacity: Arc<dyn CapacityOracle>,
    confirmations: ConfirmationTokenStore,
    queues: DashMap<InstanceId, VecDeque<QueueEntry>>,
    confirmation_ttl_ms: u64,
}

const ADMISSION_CHANNEL: &str = "admission";

impl AdmissionController {
    pub fn new(
        config: AdmissionConfig,
        drain: DrainConfig,
        client_build: ClientBuildConfig,
        sessions: Arc<SessionStore>,
        capacity: Arc<dyn CapacityOracle>,
        confirmation_ttl_ms: u64,
    ) -> Self {
        let mut rate_limiter_config = RateLimiterConfig::default();
        rate_limiter_config.channels.insert(
            ADMISSION_CHANNEL.to_string(),
            ChannelLimit {
                limit: config.rate_limit,
                window_ms: config.rate_window_seconds * 1_000,
            },
        );

        Self {
            config,
            drain,
            client_build,
            rate_limiter: InMemoryRateLimiter::new(rate_limiter_config),
            sessions,
            capacity,
            confirmations: ConfirmationTokenStore::new(),
            queues: DashMap::new(),
            confirmation_ttl_ms,
        }
    }

    /// Every call completes or fails within `admission.timeoutMs` (§4.12
    /// step 8).
    pub async fn attempt(&self, request: AdmissionRequest) -> AdmissionOutcome {
        let correlation_id = Uuid::new_v4();
        let deadline = std::time::Duration::from_millis(self.config.timeout_ms);

        match tokio::time::timeout(deadline, self.attempt_inner(&request, correlation_id)).await {
            Ok(outcome) => outcome,
            Err(_) => AdmissionOutcome::Failed {
                reason: "timeout",
                retry_after_ms: None,
                existing_session: None,
                correlation_id,
            },
        }
    }

    async fn attempt_inner(&self, request: &AdmissionRequest, correlation_id: Uuid) -> AdmissionOutcome {
        // 1. Auth present and valid.
        if !request.auth_valid {
            return self.fail("authentication_required", None, correlation_id);
        }

        // 2. Client build version supported.
        if !self.client_build.is_supported(&request.client_version) {
            return self.fail("version_mismatch", None, correlation_id);
        }

        // 3. Character owned by user.
        if !request.character_owned {
            return self.fail("character_not_owned", None, correlation_id);
        }

        // 4. Per-IP admission rate limit.
        let decision = self
            .rate_limiter
            .evaluate(ADMISSION_CHANNEL, &request.client_ip, Utc::now())
            .await;
        if !decision.allowed {
            return self.fail("rate_limited", decision.retry_after_ms, correlation_id);
        }

        // 5. Drain mode.
        if self.drain.drain_mode_enabled && !request.is_queued_promotion {
            return self.fail("maintenance", None, correlation_id);
        }

        // 6. Existing active session for this character.
        if let Some(existing) = self.sessions.find_active(request.user_id, request.instance_id).await {
            if !request.replace_existing {
                return AdmissionOutcome::Failed {
                    reason: "already_in_session",
                    retry_after_ms: None,
                    existing_session: Some(ExistingSessionSummary {
                        session_id: existing.session_id,
                        instance_id: existing.instance_id,
                    }),
                    correlation_id,
                };
            }

            let now = Utc::now();
            let consented = request.confirmation_token.as_deref().is_some_and(|token| {
                self.confirmations
                    .validate_and_consume(request.user_id, request.character_id, token, now)
            });

            if !consented {
                // Issue a fresh confirmation token for the follow-up round-trip.
                self.confirmations
                    .issue(request.user_id, request.character_id, self.confirmation_ttl_ms, now);
                return self.fail("invalid_request", None, correlation_id);
            }

            self.sessions.remove(existing.session_id).await;
        }

        // 7. Instance capacity.
        if self.capacity.seats_available(request.instance_id).await {
            let session_id = Uuid::new_v4();
            return AdmissionOutcome::Success {
                session_id,
                correlation_id,
            };
        }

        let mut queue = self.queues.entry(request.instance_id).or_default();
        if queue.len() < self.config.max_queue_length {
            queue.push_back(QueueEntry {
                character_id: request.character_id,
                instance_id: request.instance_id,
                enqueued_at: Utc::now(),
                score: Utc::now().timestamp_millis(),
            });
            let position = queue.len();
            return AdmissionOutcome::Queued {
                position,
                estimated_wait_ms: position as u64 * 1_000,
                correlation_id,
            };
        }

        self.fail_with_retry("queue_full", self.config.timeout_ms, correlation_id)
    }

    fn fail(&self, reason: &'static str, retry_after_ms: Option<u64>, correlation_id: Uuid) -> AdmissionOutcome {
        AdmissionOutcome::Failed {
            reason,
            retry_after_ms,
            existing_session: None,
            correlation_id,
        }
    }

    fn fail_with_retry(&self, reason: &'static str, retry_after_ms: u64, correlation_id: Uuid) -> AdmissionOutcome {
        AdmissionOutcome::Failed {
            reason,
            retry_after_ms: Some(retry_after_ms),
            existing_session: None,
            correlation_id,
        }
    }

    pub fn queue_length(&self, instance_id: InstanceId) -> usize {
        self.queues.get(&instance_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Janitor phase 3 (§4.15): evict queue members whose character has no
    /// live session, returning the number removed.
    pub async fn purge_orphan_queue_entries(&self, sessions: &SessionStore) -> usize {
        let mut removed = 0;
        for mut queue in self.queues.iter_mut() {
            let before = queue.len();
            let mut kept = VecDeque::with_capacity(before);
            for entry in queue.value_mut().drain(..) {
                if sessions.has_session_for_character(entry.character_id).await {
                    kept.push_back(entry);
                }
            }
            removed += before - kept.len();
            *queue.value_mut() = kept;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdmissionConfig, ClientBuildConfig, DrainConfig};

    struct AlwaysFull;
    #[async_trait]
    impl CapacityOracle for AlwaysFull {
        async fn seats_available(&self, _instance_id: InstanceId) -> bool {
            false
        }
    }

    struct AlwaysOpen;
    #[async_trait]
    impl CapacityOracle for AlwaysOpen {
        async fn seats_available(&self, _instance_id: InstanceId) -> bool {
            true
        }
    }

    fn base_request(instance_id: InstanceId) -> AdmissionRequest {
        AdmissionRequest {
            user_id: Uuid::new_v4(),
            character_id: Uuid::new_v4(),
            instance_id,
            client_ip: "127.0.0.1".into(),
            client_version: "1.0.0".into(),
            auth_valid: true,
            character_owned: true,
            replace_existing: false,
            confirmation_token: None,
            is_queued_promotion: false,
        }
    }

    fn controller(capacity: Arc<dyn CapacityOracle>) -> AdmissionController {
        AdmissionController::new(
            AdmissionConfig::default(),
            DrainConfig::default(),
            ClientBuildConfig::default(),
            Arc::new(SessionStore::new()),
            capacity,
            30_000,
        )
    }

    #[tokio::test]
    async fn admits_when_seats_available() {
        let controller = controller(Arc::new(AlwaysOpen));
        let outcome = controller.attempt(base_request(Uuid::new_v4())).await;
        assert!(matches!(outcome, AdmissionOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn rejects_unsupported_client_version() {
        let controller = controller(Arc::new(AlwaysOpen));
        let mut request = base_request(Uuid::new_v4());
        request.client_version = "0.0.1".into();
        let outcome = controller.attempt(request).await;
        assert!(matches!(
            outcome,
            AdmissionOutcome::Failed {
                reason: "version_mismatch",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn queue_fills_then_rejects_at_max() {
        // Property 14: queued at N+1, queue_full once max reached.
        let mut config = AdmissionConfig::default();
        config.max_queue_length = 2;
        let controller = AdmissionController::new(
            config,
            DrainConfig::default(),
            ClientBuildConfig::default(),
            Arc::new(SessionStore::new()),
            Arc::new(AlwaysFull),
            30_000,
        );
        let instance_id = Uuid::new_v4();

        let first = controller.attempt(base_request(instance_id)).await;
        assert!(matches!(first, AdmissionOutcome::Queued { position: 1, .. }));
        let second = controller.attempt(base_request(instance_id)).await;
        assert!(matches!(second, AdmissionOutcome::Queued { position: 2, .. }));
        let third = controller.attempt(base_request(instance_id)).await;
        assert!(matches!(
            third,
            AdmissionOutcome::Failed {
                reason: "queue_full",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn drain_mode_rejects_new_non_queued_requests() {
        let drain = DrainConfig {
            drain_mode_enabled: true,
            maintenance_mode_enabled: false,
        };
        let controller = AdmissionController::new(
            AdmissionConfig::default(),
            drain,
            ClientBuildConfig::default(),
            Arc::new(SessionStore::new()),
            Arc::new(AlwaysOpen),
            30_000,
        );
        let outcome = controller.attempt(base_request(Uuid::new_v4())).await;
        assert!(matches!(
            outcome,
            AdmissionOutcome::Failed {
                reason: "maintenance",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn replacement_requires_confirmation_round_trip() {
        let sessions = Arc::new(SessionStore::new());
        let instance_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        sessions
            .create_or_update(crate::types::Session {
                session_id: Uuid::new_v4(),
                user_id,
                character_id: Uuid::new_v4(),
                instance_id,
                protocol_version: "1.0.0".into(),
                status: crate::types::SessionStatus::Active,
                last_sequence_number: 0,
                last_heartbeat_at: Utc::now(),
                grace_expires_at: None,
            })
            .await;

        let controller = AdmissionController::new(
            AdmissionConfig::default(),
            DrainConfig::default(),
            ClientBuildConfig::default(),
            sessions,
            Arc::new(AlwaysOpen),
            30_000,
        );

        let mut request = base_request(instance_id);
        request.user_id = user_id;
        request.replace_existing = true;

        let without_token = controller.attempt(request.clone()).await;
        assert!(matches!(
            without_token,
            AdmissionOutcome::Failed {
                reason: "invalid_request",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn already_in_session_without_replace_consent() {
        let sessions = Arc::new(SessionStore::new());
        let instance_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        sessions
            .create_or_update(crate::types::Session {
                session_id: Uuid::new_v4(),
                user_id,
                character_id: Uuid::new_v4(),
                instance_id,
                protocol_version: "1.0.0".into(),
                status: crate::types::SessionStatus::Active,
                last_sequence_number: 0,
                last_heartbeat_at: Utc::now(),
                grace_expires_at: None,
            })
            .await;

        let controller = AdmissionController::new(
            AdmissionConfig::default(),
            DrainConfig::default(),
            ClientBuildConfig::default(),
            sessions,
            Arc::new(AlwaysOpen),
            30_000,
        );

        let mut request = base_request(instance_id);
        request.user_id = user_id;
        let outcome = controller.attempt(request).await;
        assert!(matches!(
            outcome,
            AdmissionOutcome::Failed {
                reason: "already_in_session",
                ..
            }
        ));
    }
}
