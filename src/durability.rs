//! Durability Log (§4.4): append-only per-session action record; lookup
//! by `(session, sequence)`; idempotent replay detection.
//!
//! The store abstraction is pluggable (async_trait), mirroring the
//! database-backend trait pattern: an in-memory implementation is the
//! default, a relational store (§6.4 `action_events` table) backs
//! production deployments.

use crate::types::{ActionEventRecord, CharacterId, SessionId};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurabilityError {
    #[error("a record already exists for (session {0}, sequence {1})")]
    UniqueKeyViolation(SessionId, u64),
    #[error("persistence failed")]
    PersistenceFailed,
}

/// Input to [`DurabilityLog::append_action`]; the server assigns
/// `action_id` and `persisted_at`.
#[derive(Debug, Clone)]
pub struct AppendActionInput {
    pub session_id: SessionId,
    pub user_id: Uuid,
    pub character_id: CharacterId,
    pub sequence_number: u64,
    pub action_type: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait DurabilityLog: Send + Sync {
    /// Persist exactly one record. Fails with
    /// [`DurabilityError::UniqueKeyViolation`] on a `(session, sequence)`
    /// collision; callers decide whether this is a duplicate or a genuine
    /// fault by consulting [`DurabilityLog::get_by_session_and_sequence`].
    async fn append_action(
        &self,
        input: AppendActionInput,
    ) -> Result<ActionEventRecord, DurabilityError>;

    async fn get_by_session_and_sequence(
        &self,
        session_id: SessionId,
        sequence_number: u64,
    ) -> Option<ActionEventRecord>;

    async fn get_latest_for_session(&self, session_id: SessionId) -> Option<ActionEventRecord>;

    async fn get_recent_for_character(
        &self,
        character_id: CharacterId,
        limit: usize,
    ) -> Vec<ActionEventRecord>;
}

#[derive(Default)]
pub struct InMemoryDurabilityLog {
    records: DashMap<(SessionId, u64), ActionEventRecord>,
    by_character: DashMap<CharacterId, Vec<(SessionId, u64)>>,
    action_counter: AtomicU64,
}

impl InMemoryDurabilityLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurabilityLog for InMemoryDurabilityLog {
    async fn append_action(
        &self,
        input: AppendActionInput,
    ) -> Result<ActionEventRecord, DurabilityError> {
        let key = (input.session_id, input.sequence_number);
        if self.records.contains_key(&key) {
            return Err(DurabilityError::UniqueKeyViolation(
                input.session_id,
                input.sequence_number,
            ));
        }

        let seq = self.action_counter.fetch_add(1, Ordering::Relaxed);
        let record = ActionEventRecord {
            action_id: Uuid::from_u128(seq as u128 + 1),
            session_id: input.session_id,
            user_id: input.user_id,
            character_id: input.character_id,
            sequence_number: input.sequence_number,
            action_type: input.action_type,
            payload: input.payload,
            persisted_at: Utc::now(),
        };

        self.records.insert(key, record.clone());
        self.by_character
            .entry(input.character_id)
            .or_default()
            .push(key);

        Ok(record)
    }

    async fn get_by_session_and_sequence(
        &self,
        session_id: SessionId,
        sequence_number: u64,
    ) -> Option<ActionEventRecord> {
        self.records
            .get(&(session_id, sequence_number))
            .map(|r| r.clone())
    }

    async fn get_latest_for_session(&self, session_id: SessionId) -> Option<ActionEventRecord> {
        self.records
            .iter()
            .filter(|e| e.key().0 == session_id)
            .max_by_key(|e| e.value().sequence_number)
            .map(|e| e.value().clone())
    }

    async fn get_recent_for_character(
        &self,
        character_id: CharacterId,
        limit: usize,
    ) -> Vec<ActionEventRecord> {
        let Some(keys) = self.by_character.get(&character_id) else {
            return Vec::new();
        };
        let mut records: Vec<ActionEventRecord> = keys
            .iter()
            .filter_map(|key| self.records.get(key).map(|r| r.clone()))
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.persisted_at));
        records.truncate(limit);
        records
    }
}
