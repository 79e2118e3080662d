//! Lobby / Router (§4.16): resolves a join request to a joinable or fresh
//! room instance. Grounded on `server::room_service::join_room_with_coordination`'s
//! get-or-create shape, simplified from its distributed-lock coordination
//! down to a single in-process registry guarded by `DashMap`'s per-shard
//! locking (there is exactly one process here, so no distributed lock is
//! needed).

use crate::room::{BattleRoom, RoomBroadcast, RoomDeps};
use crate::ruleset::{RuleSetError, RuleSetService};
use crate::types::InstanceId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyMode {
    Solo,
    Matchmaking,
}

#[derive(Debug, Clone)]
pub struct CreateOrJoinRequest {
    pub mode: LobbyMode,
    pub ruleset_version: Option<Version>,
    pub request_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LobbyError {
    #[error("rule set not found")]
    RuleSetNotFound,
}

/// One registered instance (§4.16's `instanceId -> {...}` map).
struct InstanceEntry {
    room: BattleRoom,
    ruleset_version: Version,
    max_players: u8,
    reserved_slots: u32,
    is_private: bool,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

pub struct InstanceReady {
    pub instance_id: InstanceId,
    pub room: BattleRoom,
    pub ruleset_version: Version,
}

/// Builds the dependencies for a freshly created room. A closure rather
/// than a struct field so the caller can close over shared services
/// (durability log, session store, rate limiter) without the Lobby
/// needing to know about them.
pub type RoomDepsFactory = dyn Fn() -> RoomDeps + Send + Sync;

pub struct Lobby {
    instances: DashMap<InstanceId, InstanceEntry>,
    rulesets: Arc<RuleSetService>,
    room_deps_factory: Arc<RoomDepsFactory>,
}

impl Lobby {
    pub fn new(rulesets: Arc<RuleSetService>, room_deps_factory: Arc<RoomDepsFactory>) -> Self {
        Self {
            instances: DashMap::new(),
            rulesets,
            room_deps_factory,
        }
    }

    /// `createOrJoin` (§4.16).
    pub fn create_or_join(&self, request: CreateOrJoinRequest) -> Result<InstanceReady, LobbyError> {
        let ruleset = match request.ruleset_version {
            Some(version) => self
                .rulesets
                .require_by_version(&version)
                .map_err(|_| LobbyError::RuleSetNotFound)?,
            None => self.rulesets.latest().ok_or(LobbyError::RuleSetNotFound)?,
        };

        if request.mode == LobbyMode::Matchmaking {
            if let Some(found) = self.find_joinable(&ruleset.version) {
                return Ok(found);
            }
        }

        self.create_fresh(ruleset.id, ruleset.version, ruleset.metadata.max_players, false)
    }

    /// First-fit scan over non-private instances on the requested version
    /// with spare reserved capacity.
    fn find_joinable(&self, version: &Version) -> Option<InstanceReady> {
        for mut entry in self.instances.iter_mut() {
            let instance = entry.value_mut();
            if instance.is_private {
                continue;
            }
            if &instance.ruleset_version != version {
                continue;
            }
            if instance.reserved_slots >= instance.max_players as u32 {
                continue;
            }
            instance.reserved_slots += 1;
            return Some(InstanceReady {
                instance_id: *entry.key(),
                room: instance.room.clone(),
                ruleset_version: instance.ruleset_version.clone(),
            });
        }
        None
    }

    fn create_fresh(
        &self,
        ruleset_id: String,
        ruleset_version: Version,
        max_players: u8,
        is_private: bool,
    ) -> Result<InstanceReady, LobbyError> {
        let ruleset = self
            .rulesets
            .require_by_id(&ruleset_id)
            .or_else(|_| self.rulesets.require_by_version(&ruleset_version))
            .map_err(|_: RuleSetError| LobbyError::RuleSetNotFound)?;

        let instance_id = Uuid::new_v4();
        let deps = (self.room_deps_factory)();
        let (room, _broadcast_rx) = BattleRoom::spawn(instance_id, ruleset, deps);

        self.instances.insert(
            instance_id,
            InstanceEntry {
                room: room.clone(),
                ruleset_version: ruleset_version.clone(),
                max_players,
                reserved_slots: 1,
                is_private,
                created_at: Utc::now(),
            },
        );

        Ok(InstanceReady {
            instance_id,
            room,
            ruleset_version,
        })
    }

    /// A fresh subscription to an already-registered instance's broadcast
    /// stream, for a connection joining after creation.
    pub fn subscribe(&self, instance_id: InstanceId) -> Option<broadcast::Receiver<RoomBroadcast>> {
        self.instances.get(&instance_id).map(|entry| entry.room.subscribe())
    }

    /// The room handle itself, for submitting actions or joining/leaving.
    pub fn room(&self, instance_id: InstanceId) -> Option<BattleRoom> {
        self.instances.get(&instance_id).map(|entry| entry.room.clone())
    }

    /// Reservation decrement on join completion or on timeout (§4.16); an
    /// entry that drops to zero reserved slots is evicted.
    pub fn release_reservation(&self, instance_id: InstanceId) {
        let should_remove = match self.instances.get_mut(&instance_id) {
            Some(mut entry) => {
                entry.reserved_slots = entry.reserved_slots.saturating_sub(1);
                entry.reserved_slots == 0
            }
            None => false,
        };
        if should_remove {
            self.instances.remove(&instance_id);
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::InMemoryDurabilityLog;
    use crate::rate_limit::InMemoryRateLimiter;
    use crate::reconnect_service::{InMemoryReconnectStore, ReconnectService};
    use crate::sequence::SequenceEvaluator;
    use crate::session_store::SessionStore;

    fn rulesets_with_one_version() -> Arc<RuleSetService> {
        let service = Arc::new(RuleSetService::new());
        service
            .publish("standard".into(), "1.0.0", serde_json::json!({"maxPlayers": 2}))
            .unwrap();
        service
    }

    fn deps_factory() -> Arc<RoomDepsFactory> {
        Arc::new(|| {
            let sessions = Arc::new(SessionStore::new());
            RoomDeps {
                durability: Arc::new(InMemoryDurabilityLog::new()),
                sequences: Arc::new(SequenceEvaluator::new(sessions.clone())),
                reconnect: Arc::new(ReconnectService::new(Arc::new(InMemoryReconnectStore::new()))),
                sessions,
                rate_limiter: Arc::new(InMemoryRateLimiter::new(crate::config::RateLimiterConfig::default())),
                grace_period_ms: 60_000,
                drain_batch_size: 32,
            }
        })
    }

    #[test]
    fn solo_mode_always_creates_a_fresh_instance() {
        let lobby = Lobby::new(rulesets_with_one_version(), deps_factory());

        let first = lobby
            .create_or_join(CreateOrJoinRequest {
                mode: LobbyMode::Solo,
                ruleset_version: None,
                request_id: "r1".into(),
            })
            .unwrap();
        let second = lobby
            .create_or_join(CreateOrJoinRequest {
                mode: LobbyMode::Solo,
                ruleset_version: None,
                request_id: "r2".into(),
            })
            .unwrap();

        assert_ne!(first.instance_id, second.instance_id);
        assert_eq!(lobby.instance_count(), 2);
    }

    #[test]
    fn matchmaking_fills_reserved_slots_then_opens_new_instance() {
        let lobby = Lobby::new(rulesets_with_one_version(), deps_factory());

        let first = lobby
            .create_or_join(CreateOrJoinRequest {
                mode: LobbyMode::Matchmaking,
                ruleset_version: None,
                request_id: "r1".into(),
            })
            .unwrap();
        let second = lobby
            .create_or_join(CreateOrJoinRequest {
                mode: LobbyMode::Matchmaking,
                ruleset_version: None,
                request_id: "r2".into(),
            })
            .unwrap();
        assert_eq!(first.instance_id, second.instance_id);
        assert_eq!(lobby.instance_count(), 1);

        // max_players is 2, both slots reserved now; a third request opens a
        // fresh instance.
        let third = lobby
            .create_or_join(CreateOrJoinRequest {
                mode: LobbyMode::Matchmaking,
                ruleset_version: None,
                request_id: "r3".into(),
            })
            .unwrap();
        assert_ne!(third.instance_id, first.instance_id);
        assert_eq!(lobby.instance_count(), 2);
    }

    #[test]
    fn release_reservation_evicts_at_zero() {
        let lobby = Lobby::new(rulesets_with_one_version(), deps_factory());
        let ready = lobby
            .create_or_join(CreateOrJoinRequest {
                mode: LobbyMode::Matchmaking,
                ruleset_version: None,
                request_id: "r1".into(),
            })
            .unwrap();
        assert_eq!(lobby.instance_count(), 1);

        lobby.release_reservation(ready.instance_id);
        assert_eq!(lobby.instance_count(), 0);
    }

    #[test]
    fn unknown_ruleset_version_is_not_found() {
        let lobby = Lobby::new(rulesets_with_one_version(), deps_factory());
        let err = lobby
            .create_or_join(CreateOrJoinRequest {
                mode: LobbyMode::Solo,
                ruleset_version: Some(Version::new(9, 9, 9)),
                request_id: "r1".into(),
            })
            .unwrap_err();
        assert_eq!(err, LobbyError::RuleSetNotFound);
    }
}
