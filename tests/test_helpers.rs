use battle_core_server::config::Config;
use battle_core_server::durability::InMemoryDurabilityLog;
use battle_core_server::rate_limit::InMemoryRateLimiter;
use battle_core_server::reconnect_service::{InMemoryReconnectStore, ReconnectService};
use battle_core_server::room::RoomDeps;
use battle_core_server::sequence::SequenceEvaluator;
use battle_core_server::server::ServerState;
use battle_core_server::session_store::SessionStore;
use battle_core_server::types::{
    Adjacency, BoardMetadata, PlacementMetadata, RuleSet, RuleSetMetadata, Session, SessionStatus,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

#[allow(dead_code)]
pub fn test_ruleset(max_players: u8, width: u16, height: u16) -> RuleSet {
    RuleSet {
        id: "standard".into(),
        version: semver::Version::new(1, 0, 0),
        created_at: Utc::now(),
        metadata: RuleSetMetadata {
            description: None,
            tags: Vec::new(),
            max_players,
            board: BoardMetadata {
                width,
                height,
                initial_tiles: Vec::new(),
            },
            placement: PlacementMetadata {
                adjacency: Adjacency::Orthogonal,
                allow_first_placement_anywhere: true,
            },
            extras: serde_json::Map::new(),
        },
    }
}

#[allow(dead_code)]
pub fn room_deps() -> RoomDeps {
    let sessions = Arc::new(SessionStore::new());
    RoomDeps {
        durability: Arc::new(InMemoryDurabilityLog::new()),
        sequences: Arc::new(SequenceEvaluator::new(sessions.clone())),
        reconnect: Arc::new(ReconnectService::new(Arc::new(InMemoryReconnectStore::new()))),
        sessions,
        rate_limiter: Arc::new(InMemoryRateLimiter::new(
            battle_core_server::config::RateLimiterConfig::default(),
        )),
        grace_period_ms: 60_000,
        drain_batch_size: 32,
    }
}

#[allow(dead_code)]
pub async fn register_session(deps: &RoomDeps, session_id: Uuid, instance_id: Uuid) {
    deps.sessions
        .create_or_update(Session {
            session_id,
            user_id: session_id,
            character_id: session_id,
            instance_id,
            protocol_version: "1.0.0".into(),
            status: SessionStatus::Active,
            last_sequence_number: 0,
            last_heartbeat_at: Utc::now(),
            grace_expires_at: None,
        })
        .await;
}

#[allow(dead_code)]
pub fn build_server() -> Arc<ServerState> {
    ServerState::build(Config::default())
}
