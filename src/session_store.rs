//! Session Store (§4.5): in-memory sessions keyed by `sessionId`, with
//! secondary indexes by `userId`, `characterId`, and `instanceId`.

use crate::types::{CharacterId, InstanceId, Session, SessionId, SessionStatus, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;

/// Cross-component, accessed concurrently (unlike a [`crate::room::BattleRoom`],
/// which is single-writer). All operations are lock-free reads/writes on
/// `DashMap` shards.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    by_user: DashMap<UserId, HashSet<SessionId>>,
    by_character: DashMap<CharacterId, HashSet<SessionId>>,
    by_instance: DashMap<InstanceId, HashSet<SessionId>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session or overwrite an existing one with the same id.
    pub async fn create_or_update(&self, session: Session) {
        let session_id = session.session_id;
        if let Some(previous) = self.sessions.get(&session_id) {
            self.deindex(&previous);
        }
        self.index(&session);
        self.sessions.insert(session_id, session);
    }

    fn index(&self, session: &Session) {
        self.by_user
            .entry(session.user_id)
            .or_default()
            .insert(session.session_id);
        self.by_character
            .entry(session.character_id)
            .or_default()
            .insert(session.session_id);
        self.by_instance
            .entry(session.instance_id)
            .or_default()
            .insert(session.session_id);
    }

    fn deindex(&self, session: &Session) {
        if let Some(mut set) = self.by_user.get_mut(&session.user_id) {
            set.remove(&session.session_id);
        }
        if let Some(mut set) = self.by_character.get_mut(&session.character_id) {
            set.remove(&session.session_id);
        }
        if let Some(mut set) = self.by_instance.get_mut(&session.instance_id) {
            set.remove(&session.session_id);
        }
    }

    pub async fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    pub async fn set_status(&self, session_id: SessionId, status: SessionStatus) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.status = status;
        }
    }

    pub async fn record_heartbeat(&self, session_id: SessionId, at: DateTime<Utc>) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.last_heartbeat_at = at;
        }
    }

    pub async fn record_action_sequence(&self, session_id: SessionId, sequence: u64) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.last_sequence_number = session.last_sequence_number.max(sequence);
        }
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn list_by_instance(&self, instance_id: InstanceId) -> Vec<Session> {
        self.by_instance
            .get(&instance_id)
            .map(|set| {
                set.iter()
                    .filter_map(|id| self.sessions.get(id).map(|s| s.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The session most recently registered for a `(userId, instanceId)` pair
    /// whose status is `active`, used by the Admission Controller to find a
    /// conflicting existing session (§4.12 step 6).
    pub async fn find_active(&self, user_id: UserId, instance_id: InstanceId) -> Option<Session> {
        self.by_user.get(&user_id).and_then(|set| {
            set.iter().find_map(|id| {
                self.sessions.get(id).and_then(|s| {
                    if s.instance_id == instance_id && s.status == SessionStatus::Active {
                        Some(s.clone())
                    } else {
                        None
                    }
                })
            })
        })
    }

    /// Whether any session currently references `character_id`, for the
    /// Janitor's orphan-queue-entry phase (§4.15).
    pub async fn has_session_for_character(&self, character_id: CharacterId) -> bool {
        self.by_character
            .get(&character_id)
            .is_some_and(|set| !set.is_empty())
    }

    pub async fn remove(&self, session_id: SessionId) -> Option<Session> {
        let removed = self.sessions.remove(&session_id).map(|(_, s)| s);
        if let Some(session) = &removed {
            self.deindex(session);
        }
        removed
    }

    /// Sessions in `grace` whose `grace_expires_at` has passed `now`, for
    /// the Janitor's grace-expiry phase.
    pub async fn get_expired_grace_sessions(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|e| {
                e.status == SessionStatus::Grace
                    && e.grace_expires_at.is_some_and(|expiry| expiry <= now)
            })
            .map(|e| e.value().clone())
            .collect()
    }

    /// Active sessions whose heartbeat is older than `inactivity_timeout`,
    /// for the Janitor's inactivity-sweep phase.
    pub async fn get_inactive_sessions(
        &self,
        now: DateTime<Utc>,
        inactivity_timeout: chrono::Duration,
    ) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|e| e.status == SessionStatus::Active && now - e.last_heartbeat_at > inactivity_timeout)
            .map(|e| e.value().clone())
            .collect()
    }
}
