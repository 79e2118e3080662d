//! Reconnect Service (§4.14): grace-period session persistence, backed by
//! a pluggable shared cache. Keeps the two-key pattern from §5/§6.4 so a
//! player's current instance can be found without scanning.

use crate::types::{InstanceId, PlayerStateSnapshot, ReconnectToken, SessionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectError {
    GracePeriodExpired,
}

/// Cache keys: `session:{playerId}:{instanceId}` and `player:{playerId}`,
/// sharing the grace TTL (§6.4).
fn session_key(player_id: SessionId, instance_id: InstanceId) -> String {
    format!("session:{player_id}:{instance_id}")
}

fn player_key(player_id: SessionId) -> String {
    format!("player:{player_id}")
}

/// Pluggable shared-cache abstraction; the in-memory implementation below
/// is the default, a Redis-backed one would back cluster deployments.
#[async_trait]
pub trait ReconnectStore: Send + Sync {
    async fn put(&self, key: String, token: ReconnectToken);
    async fn get(&self, key: &str) -> Option<ReconnectToken>;
    async fn remove(&self, key: &str) -> Option<ReconnectToken>;
    async fn keys(&self) -> Vec<String>;
}

#[derive(Default)]
pub struct InMemoryReconnectStore {
    entries: DashMap<String, ReconnectToken>,
}

impl InMemoryReconnectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconnectStore for InMemoryReconnectStore {
    async fn put(&self, key: String, token: ReconnectToken) {
        self.entries.insert(key, token);
    }

    async fn get(&self, key: &str) -> Option<ReconnectToken> {
        self.entries.get(key).map(|e| e.clone())
    }

    async fn remove(&self, key: &str) -> Option<ReconnectToken> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    async fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

pub struct CreateSessionInput {
    pub session_id: SessionId,
    pub instance_id: InstanceId,
    pub player_state: PlayerStateSnapshot,
    pub grace_period_ms: u64,
}

pub struct AttemptReconnectInput {
    pub player_id: SessionId,
    pub instance_id: InstanceId,
    pub new_session_id: SessionId,
}

pub struct ReconnectService {
    store: std::sync::Arc<dyn ReconnectStore>,
}

impl ReconnectService {
    pub fn new(store: std::sync::Arc<dyn ReconnectStore>) -> Self {
        Self { store }
    }

    /// Write a token record with TTL equal to `grace_period_ms` (§4.14).
    pub async fn create_session(&self, input: CreateSessionInput) -> ReconnectToken {
        let token = ReconnectToken {
            token: Uuid::new_v4().to_string(),
            session_id: input.session_id,
            instance_id: input.instance_id,
            player_state: input.player_state,
            disconnected_at: Utc::now(),
            grace_period_ms: input.grace_period_ms,
            metadata: serde_json::Map::new(),
        };

        self.store
            .put(session_key(input.session_id, input.instance_id), token.clone())
            .await;
        self.store
            .put(player_key(input.session_id), token.clone())
            .await;

        token
    }

    /// Resume a grace session (§4.14):
    /// - No record -> `grace_period_expired`.
    /// - Past `disconnected_at + grace_period_ms` -> delete + `grace_period_expired`.
    /// - Else: rotate `sessionId -> newSessionId`, reset TTL to remaining grace.
    pub async fn attempt_reconnect(
        &self,
        input: AttemptReconnectInput,
    ) -> Result<ReconnectToken, ReconnectError> {
        let key = session_key(input.player_id, input.instance_id);
        let Some(existing) = self.store.get(&key).await else {
            return Err(ReconnectError::GracePeriodExpired);
        };

        let now = Utc::now();
        if existing.is_expired_at(now) {
            self.store.remove(&key).await;
            self.store.remove(&player_key(input.player_id)).await;
            return Err(ReconnectError::GracePeriodExpired);
        }

        let remaining_ms = (existing.expires_at() - now).num_milliseconds().max(0) as u64;
        let rotated = ReconnectToken {
            token: Uuid::new_v4().to_string(),
            session_id: input.new_session_id,
            instance_id: input.instance_id,
            player_state: existing.player_state.clone(),
            disconnected_at: now,
            grace_period_ms: remaining_ms,
            metadata: existing.metadata.clone(),
        };

        self.store.remove(&key).await;
        self.store
            .put(session_key(input.new_session_id, input.instance_id), rotated.clone())
            .await;
        self.store.put(player_key(input.new_session_id), rotated.clone()).await;

        Ok(rotated)
    }

    pub async fn update_player_state(
        &self,
        player_id: SessionId,
        instance_id: InstanceId,
        player_state: PlayerStateSnapshot,
    ) {
        let key = session_key(player_id, instance_id);
        if let Some(mut token) = self.store.get(&key).await {
            token.player_state = player_state;
            self.store.put(key, token.clone()).await;
            self.store.put(player_key(player_id), token).await;
        }
    }

    pub async fn extend_grace_period(&self, player_id: SessionId, instance_id: InstanceId, extra_ms: u64) {
        let key = session_key(player_id, instance_id);
        if let Some(mut token) = self.store.get(&key).await {
            token.grace_period_ms += extra_ms;
            self.store.put(key, token.clone()).await;
            self.store.put(player_key(player_id), token).await;
        }
    }

    pub async fn remove_session(&self, player_id: SessionId, instance_id: InstanceId) {
        self.store.remove(&session_key(player_id, instance_id)).await;
        self.store.remove(&player_key(player_id)).await;
    }

    pub async fn list_active_sessions(&self, instance_id: Option<InstanceId>) -> Vec<ReconnectToken> {
        let mut seen = std::collections::HashSet::new();
        let mut tokens = Vec::new();
        for key in self.store.keys().await {
            if !key.starts_with("session:") {
                continue;
            }
            if let Some(token) = self.store.get(&key).await {
                if instance_id.is_some_and(|id| id != token.instance_id) {
                    continue;
                }
                if seen.insert(token.session_id) {
                    tokens.push(token);
                }
            }
        }
        tokens
    }

    /// Corrupt records at a known key are treated as absent and purged;
    /// here that degenerates to purging anything already expired.
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        for key in self.store.keys().await {
            if let Some(token) = self.store.get(&key).await {
                if token.is_expired_at(now) {
                    self.store.remove(&key).await;
                    removed += 1;
                }
            }
        }
        removed
    }

    pub async fn get_session_stats(&self) -> ReconnectSessionStats {
        let sessions = self.list_active_sessions(None).await;
        ReconnectSessionStats {
            active_sessions: sessions.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSessionStats {
    pub active_sessions: usize,
}
