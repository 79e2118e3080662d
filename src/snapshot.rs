//! Snapshot Service (§4.11): deterministic serialization and per-player
//! view projection; board delta computation.

use crate::types::{BattleRoomState, NpcState, PendingActionSummary, PlayerSessionState, PlayerStatus, RoomStatus, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("viewer not found in snapshot")]
    NotFound,
    #[error("boards have different dimensions")]
    BoardSizeMismatch,
}

/// Pure, deep-cloned value; callers may mutate freely (§4.11, design notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub instance_id: uuid::Uuid,
    pub ruleset_version: semver::Version,
    pub status: RoomStatus,
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub board: crate::board::Board,
    pub players: HashMap<SessionId, PlayerSessionState>,
    pub npcs: HashMap<String, NpcState>,
    pub pending_actions: Vec<PendingActionSummary>,
}

/// Player-projected snapshot: other players' sensitive fields zeroed/nulled
/// for privacy (§4.11 "anti-peek").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub instance_id: uuid::Uuid,
    pub ruleset_version: semver::Version,
    pub status: RoomStatus,
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub board: crate::board::Board,
    pub players: HashMap<SessionId, PlayerSessionState>,
    pub npcs: HashMap<String, NpcState>,
    pub pending_actions: Vec<PendingActionSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDeltaEntry {
    pub index: usize,
    pub tile_type: Option<u32>,
    pub tick: u64,
}

pub fn create_snapshot(state: &BattleRoomState) -> Snapshot {
    Snapshot {
        instance_id: state.instance_id,
        ruleset_version: state.ruleset_version.clone(),
        status: state.status,
        tick: state.tick,
        started_at: state.started_at,
        timestamp: Utc::now(),
        board: state.board.clone(),
        players: state.players.clone(),
        npcs: state.npcs.clone(),
        pending_actions: state.pending_actions.clone(),
    }
}

/// Project `snapshot` for `viewer_id` (§4.11):
/// - Viewer must exist, else `not_found`.
/// - Viewer's own entry is included verbatim.
/// - Other players appear only if `active`; their `last_action_tick` is
///   zeroed and `reconnect_deadline` nulled.
/// - Board, NPCs, pending actions are public and included as-is.
pub fn extract_player_view(snapshot: &Snapshot, viewer_id: SessionId) -> Result<PlayerView, SnapshotError> {
    if !snapshot.players.contains_key(&viewer_id) {
        return Err(SnapshotError::NotFound);
    }

    let players = snapshot
        .players
        .iter()
        .filter_map(|(id, player)| {
            if *id == viewer_id {
                return Some((*id, player.clone()));
            }
            if player.status != PlayerStatus::Active {
                return None;
            }
            let mut projected = player.clone();
            projected.last_action_tick = 0;
            projected.reconnect_deadline = None;
            Some((*id, projected))
        })
        .collect();

    Ok(PlayerView {
        instance_id: snapshot.instance_id,
        ruleset_version: snapshot.ruleset_version.clone(),
        status: snapshot.status,
        tick: snapshot.tick,
        started_at: snapshot.started_at,
        timestamp: snapshot.timestamp,
        board: snapshot.board.clone(),
        players,
        npcs: snapshot.npcs.clone(),
        pending_actions: snapshot.pending_actions.clone(),
    })
}

/// Cells where either `tile_type` or `last_updated_tick` changed between
/// `old` and `new` (§4.11). Mismatched dimensions fail with
/// `board_size_mismatch`.
pub fn compute_board_delta(old: &crate::board::Board, new: &crate::board::Board) -> Result<Vec<BoardDeltaEntry>, SnapshotError> {
    if old.width != new.width || old.height != new.height {
        return Err(SnapshotError::BoardSizeMismatch);
    }

    let mut delta = Vec::new();
    for (index, (old_cell, new_cell)) in old.cells().iter().zip(new.cells().iter()).enumerate() {
        if old_cell.tile_type != new_cell.tile_type || old_cell.last_updated_tick != new_cell.last_updated_tick {
            delta.push(BoardDeltaEntry {
                index,
                tile_type: new_cell.tile_type,
                tick: new_cell.last_updated_tick,
            });
        }
    }
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::types::{Adjacency, CellOwner, PlacementMetadata};
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn sample_state() -> BattleRoomState {
        let viewer = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut players = HashMap::new();
        players.insert(
            viewer,
            PlayerSessionState {
                session_id: viewer,
                display_name: "Viewer".into(),
                status: PlayerStatus::Active,
                initiative: 1,
                last_action_tick: 7,
                reconnect_deadline: Some(Utc::now()),
                position: None,
            },
        );
        players.insert(
            other,
            PlayerSessionState {
                session_id: other,
                display_name: "Other".into(),
                status: PlayerStatus::Active,
                initiative: 2,
                last_action_tick: 9,
                reconnect_deadline: Some(Utc::now()),
                position: None,
            },
        );

        BattleRoomState {
            instance_id: Uuid::new_v4(),
            ruleset_version: semver::Version::new(1, 0, 0),
            status: RoomStatus::Active,
            tick: 3,
            started_at: Utc::now(),
            players,
            npcs: HashMap::new(),
            board: Board::new(2, 2),
            pending_actions: Vec::new(),
            max_players: 4,
            placement: PlacementMetadata::default(),
        }
    }

    #[test]
    fn snapshot_round_trip_preserves_equality() {
        // Property 7: deserialize(serialize(s)) == s.
        let state = sample_state();
        let snapshot = create_snapshot(&state);
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: Snapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.instance_id, snapshot.instance_id);
        assert_eq!(restored.tick, snapshot.tick);
        assert_eq!(restored.players.len(), snapshot.players.len());
    }

    #[test]
    fn player_view_zeroes_others_sensitive_fields() {
        let state = sample_state();
        let snapshot = create_snapshot(&state);
        let (&viewer_id, _) = snapshot.players.iter().next().unwrap();
        let view = extract_player_view(&snapshot, viewer_id).unwrap();

        let own = &view.players[&viewer_id];
        assert_eq!(own.last_action_tick, 7);

        let (&other_id, _) = snapshot.players.iter().find(|(id, _)| **id != viewer_id).unwrap();
        let other = &view.players[&other_id];
        assert_eq!(other.last_action_tick, 0);
        assert!(other.reconnect_deadline.is_none());
    }

    #[test]
    fn missing_viewer_is_not_found() {
        let state = sample_state();
        let snapshot = create_snapshot(&state);
        assert_eq!(
            extract_player_view(&snapshot, Uuid::new_v4()).unwrap_err(),
            SnapshotError::NotFound
        );
    }

    #[test]
    fn board_delta_applies_cleanly_to_old() {
        // Property 8: applying the delta to `old` yields `new`.
        let mut old = Board::new(2, 2);
        let mut new = old.clone();
        new.apply_tile_placement(0, 0, 5, 1, CellOwner::System, Adjacency::None, true)
            .unwrap();

        let delta = compute_board_delta(&old, &new).unwrap();
        assert_eq!(delta.len(), 1);
        for entry in &delta {
            let y = (entry.index / old.width as usize) as u16;
            let x = (entry.index % old.width as usize) as u16;
            old.apply_tile_placement(
                x,
                y,
                entry.tile_type.unwrap(),
                entry.tick,
                CellOwner::System,
                Adjacency::None,
                true,
            )
            .ok();
        }

        assert_eq!(old.get_cell(0, 0).unwrap().tile_type, new.get_cell(0, 0).unwrap().tile_type);
    }

    #[test]
    fn mismatched_board_dimensions_fail() {
        let old = Board::new(2, 2);
        let new = Board::new(3, 3);
        assert_eq!(
            compute_board_delta(&old, &new).unwrap_err(),
            SnapshotError::BoardSizeMismatch
        );
    }
}
