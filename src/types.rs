//! Core data model shared across components (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type SessionId = Uuid;
pub type UserId = Uuid;
pub type CharacterId = Uuid;
pub type InstanceId = Uuid;
pub type ActionId = Uuid;

/// Lifecycle status of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Grace,
    Terminating,
    Terminated,
}

/// A player's connection to one battle instance (§3 "Session").
///
/// Invariant: at most one `active` session exists per `(user_id, instance_id)`,
/// enforced by the [`crate::session_store::SessionStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub instance_id: InstanceId,
    pub protocol_version: String,
    pub status: SessionStatus,
    pub last_sequence_number: u64,
    pub last_heartbeat_at: DateTime<Utc>,
    pub grace_expires_at: Option<DateTime<Utc>>,
}

/// Snapshot of room-relevant player state carried across a disconnect,
/// restored verbatim into a [`crate::types::PlayerSessionState`] on resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStateSnapshot {
    pub last_action_tick: u64,
    pub initiative: i32,
    pub position: Option<(i32, i32)>,
}

/// An unguessable token allowing a disconnected session to resume (§3 "Reconnect Token").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectToken {
    pub token: String,
    pub session_id: SessionId,
    pub instance_id: InstanceId,
    pub player_state: PlayerStateSnapshot,
    pub disconnected_at: DateTime<Utc>,
    pub grace_period_ms: u64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ReconnectToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.disconnected_at + chrono::Duration::milliseconds(self.grace_period_ms as i64)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

/// Tile adjacency policy for placement validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjacency {
    None,
    Orthogonal,
    Any,
}

impl Default for Adjacency {
    fn default() -> Self {
        Adjacency::Orthogonal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMetadata {
    pub width: u16,
    pub height: u16,
    pub initial_tiles: Vec<InitialTile>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InitialTile {
    pub x: u16,
    pub y: u16,
    pub tile_type: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementMetadata {
    pub adjacency: Adjacency,
    pub allow_first_placement_anywhere: bool,
}

impl Default for PlacementMetadata {
    fn default() -> Self {
        Self {
            adjacency: Adjacency::Orthogonal,
            allow_first_placement_anywhere: true,
        }
    }
}

/// Normalized, immutable rule-set parameter bundle (§3 "Rule Set").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetMetadata {
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub max_players: u8,
    pub board: BoardMetadata,
    pub placement: PlacementMetadata,
    pub extras: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: String,
    pub version: semver::Version,
    pub created_at: DateTime<Utc>,
    pub metadata: RuleSetMetadata,
}

/// One cell on the battle-room board (§3 "Board Cell"). `tile_type = None`
/// means empty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoardCell {
    pub tile_type: Option<u32>,
    pub last_updated_tick: u64,
    pub last_updated_by: CellOwner,
}

impl Default for BoardCell {
    fn default() -> Self {
        Self {
            tile_type: None,
            last_updated_tick: 0,
            last_updated_by: CellOwner::System,
        }
    }
}

/// Who last wrote a board cell: a session, or the system itself
/// (e.g. initial-tile seeding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOwner {
    Session(SessionId),
    System,
}

/// Room-local player status; disconnect transitions are reversible within
/// the reconnect grace window (§3 "Player Session State").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Active,
    Disconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSessionState {
    pub session_id: SessionId,
    pub display_name: String,
    pub status: PlayerStatus,
    pub initiative: i32,
    pub last_action_tick: u64,
    pub reconnect_deadline: Option<DateTime<Utc>>,
    pub position: Option<(i32, i32)>,
}

/// A non-player entity's transported state; core only orders and stores it,
/// never interprets AI behavior (§3.1 addition, §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcState {
    pub npc_id: String,
    pub current_tick: u64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Ended,
}

/// One queued-but-not-yet-drained action in a room's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingActionSummary {
    pub action_id: ActionId,
    pub action_type: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Authoritative state owned exclusively by one `BattleRoom` for its
/// lifetime (§3 "Battle Room State").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleRoomState {
    pub instance_id: InstanceId,
    pub ruleset_version: semver::Version,
    pub status: RoomStatus,
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub players: HashMap<SessionId, PlayerSessionState>,
    pub npcs: HashMap<String, NpcState>,
    pub board: crate::board::Board,
    pub pending_actions: Vec<PendingActionSummary>,
    pub max_players: u8,
    pub placement: PlacementMetadata,
}

/// Direction for `intent.move` (§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }
}

/// Tagged union over client-originated intents that mutate room state
/// (§3 "Action Request").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionRequest {
    TilePlacement {
        id: ActionId,
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
        requested_tick: Option<u64>,
        player_id: SessionId,
        position: (u16, u16),
        tile_type: u32,
        client_request_id: Option<String>,
        player_initiative: i32,
        last_action_tick: u64,
    },
    NpcEvent {
        id: ActionId,
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
        requested_tick: Option<u64>,
        npc_id: String,
        event_type: String,
        data: serde_json::Value,
    },
    ScriptedEvent {
        id: ActionId,
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
        requested_tick: Option<u64>,
        script_id: String,
        event_type: String,
        data: serde_json::Value,
    },
    Move {
        id: ActionId,
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
        requested_tick: Option<u64>,
        player_id: SessionId,
        direction: Direction,
        magnitude: i32,
    },
    Chat {
        id: ActionId,
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
        requested_tick: Option<u64>,
        player_id: SessionId,
        message: String,
    },
    Action {
        id: ActionId,
        instance_id: InstanceId,
        timestamp: DateTime<Utc>,
        requested_tick: Option<u64>,
        player_id: SessionId,
        kind: String,
        target: Option<String>,
        metadata: Option<serde_json::Value>,
    },
}

impl ActionRequest {
    pub fn id(&self) -> ActionId {
        match self {
            ActionRequest::TilePlacement { id, .. }
            | ActionRequest::NpcEvent { id, .. }
            | ActionRequest::ScriptedEvent { id, .. }
            | ActionRequest::Move { id, .. }
            | ActionRequest::Chat { id, .. }
            | ActionRequest::Action { id, .. } => *id,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        match self {
            ActionRequest::TilePlacement { instance_id, .. }
            | ActionRequest::NpcEvent { instance_id, .. }
            | ActionRequest::ScriptedEvent { instance_id, .. }
            | ActionRequest::Move { instance_id, .. }
            | ActionRequest::Chat { instance_id, .. }
            | ActionRequest::Action { instance_id, .. } => *instance_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ActionRequest::TilePlacement { .. } => "tile_placement",
            ActionRequest::NpcEvent { .. } => "npc_event",
            ActionRequest::ScriptedEvent { .. } => "scripted_event",
            ActionRequest::Move { .. } => "move",
            ActionRequest::Chat { .. } => "chat",
            ActionRequest::Action { .. } => "action",
        }
    }

    /// The rate-limit channel this intent is evaluated against (§4.9).
    pub fn rate_limit_channel(&self) -> &'static str {
        match self {
            ActionRequest::Chat { .. } => crate::config::rate_limit::CHAT_CHANNEL,
            _ => crate::config::rate_limit::TILE_ACTION_CHANNEL,
        }
    }
}

/// Outcome of applying one [`ActionRequest`] to room state (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Applied {
        effects: Vec<Effect>,
        tick: u64,
        request_id: Option<String>,
    },
    Rejected {
        reason: RejectReason,
        error: &'static str,
        request_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Validation,
    Conflict,
    State,
    RateLimit,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    TilePlacement {
        position: (u16, u16),
        tile_type: u32,
        previous_tile_type: Option<u32>,
        player_id: SessionId,
    },
    NpcEvent {
        npc_id: String,
        event_type: String,
        data: serde_json::Value,
    },
    ScriptedEvent {
        script_id: String,
        event_type: String,
        data: serde_json::Value,
    },
    Move {
        player_id: SessionId,
        position: (i32, i32),
    },
    Chat {
        player_id: SessionId,
        message: String,
    },
}

/// A durably-persisted action (§3 "Action Event Record"). Uniqueness on
/// `(session_id, sequence_number)` is the system's sole write-side
/// coordination point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEventRecord {
    pub action_id: ActionId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub sequence_number: u64,
    pub action_type: String,
    pub payload: serde_json::Value,
    pub persisted_at: DateTime<Utc>,
}

/// An entry in the admission queue for an instance (§3 "Queue Entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub character_id: CharacterId,
    pub instance_id: InstanceId,
    pub enqueued_at: DateTime<Utc>,
    pub score: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_token_expiry_boundary() {
        let now = Utc::now();
        let token = ReconnectToken {
            token: "t".into(),
            session_id: Uuid::new_v4(),
            instance_id: Uuid::new_v4(),
            player_state: PlayerStateSnapshot {
                last_action_tick: 0,
                initiative: 0,
                position: None,
            },
            disconnected_at: now,
            grace_period_ms: 60_000,
            metadata: serde_json::Map::new(),
        };
        assert!(!token.is_expired_at(now + chrono::Duration::milliseconds(59_999)));
        assert!(token.is_expired_at(now + chrono::Duration::milliseconds(60_001)));
    }

    #[test]
    fn direction_deltas_match_compass() {
        assert_eq!(Direction::North.delta(), (0, -1));
        assert_eq!(Direction::East.delta(), (1, 0));
    }
}
