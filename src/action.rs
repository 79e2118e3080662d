//! Action Handler (§4.8): validates and applies one action against room
//! state; emits effect records. Synchronous with respect to room state —
//! callers are responsible for durability (§4.13) and broadcast.

use crate::board::BoardError;
use crate::types::{
    ActionRequest, BattleRoomState, CellOwner, Direction, Effect, PlayerStatus, RejectReason,
    Resolution, RoomStatus,
};

fn rejected(reason: RejectReason, error: &'static str, request_id: Option<String>) -> Resolution {
    Resolution::Rejected {
        reason,
        error,
        request_id,
    }
}

/// Apply `action` to `state`, returning the resolution. Never mutates
/// `state` on a rejection path.
pub fn handle(action: &ActionRequest, state: &mut BattleRoomState) -> Resolution {
    if action.instance_id() != state.instance_id {
        return rejected(RejectReason::State, "cross_instance_action", None);
    }
    if state.status != RoomStatus::Active {
        return rejected(RejectReason::State, "instance_terminated", None);
    }

    match action {
        ActionRequest::TilePlacement {
            player_id,
            position,
            tile_type,
            client_request_id,
            requested_tick,
            timestamp,
            ..
        } => handle_tile_placement(
            state,
            *player_id,
            *position,
            *tile_type,
            client_request_id.clone(),
            requested_tick.unwrap_or_else(|| timestamp.timestamp_millis().max(0) as u64),
        ),
        ActionRequest::NpcEvent {
            npc_id,
            event_type,
            data,
            requested_tick,
            timestamp,
            ..
        } => handle_npc_event(
            state,
            npc_id.clone(),
            event_type.clone(),
            data.clone(),
            requested_tick.unwrap_or_else(|| timestamp.timestamp_millis().max(0) as u64),
        ),
        ActionRequest::ScriptedEvent {
            script_id,
            event_type,
            data,
            requested_tick,
            timestamp,
            ..
        } => handle_scripted_event(
            state,
            script_id.clone(),
            event_type.clone(),
            data.clone(),
            requested_tick.unwrap_or_else(|| timestamp.timestamp_millis().max(0) as u64),
        ),
        ActionRequest::Move {
            player_id,
            direction,
            magnitude,
            requested_tick,
            timestamp,
            ..
        } => handle_move(
            state,
            *player_id,
            *direction,
            *magnitude,
            requested_tick.unwrap_or_else(|| timestamp.timestamp_millis().max(0) as u64),
        ),
        ActionRequest::Chat { player_id, message, .. } => handle_chat(state, *player_id, message.clone()),
        ActionRequest::Action { .. } => {
            // Generic envelope: no room-state effect beyond acknowledgement;
            // ack/durability plumbing happens in the pipeline (§4.13).
            Resolution::Applied {
                effects: Vec::new(),
                tick: state.tick,
                request_id: None,
            }
        }
    }
}

fn handle_tile_placement(
    state: &mut BattleRoomState,
    player_id: uuid::Uuid,
    position: (u16, u16),
    tile_type: u32,
    client_request_id: Option<String>,
    requested_tick: u64,
) -> Resolution {
    if !state.players.contains_key(&player_id) {
        return rejected(RejectReason::Validation, "character_not_found", client_request_id);
    }

    let tick = state.tick.max(requested_tick);
    let adjacency = state.placement.adjacency;
    let allow_first_placement_anywhere = state.placement.allow_first_placement_anywhere;
    match state.board.apply_tile_placement(
        position.0,
        position.1,
        tile_type,
        tick,
        CellOwner::Session(player_id),
        adjacency,
        allow_first_placement_anywhere,
    ) {
        Ok(cell) => {
            state.tick = tick;
            if let Some(player) = state.players.get_mut(&player_id) {
                player.last_action_tick = tick;
            }
            let previous_tile_type = None; // cell was empty prior to this write (board guarantees it).
            let _ = cell;
            Resolution::Applied {
                effects: vec![Effect::TilePlacement {
                    position,
                    tile_type,
                    previous_tile_type,
                    player_id,
                }],
                tick,
                request_id: client_request_id,
            }
        }
        Err(BoardError::OutOfBounds)
        | Err(BoardError::InvalidTilePlacement)
        | Err(BoardError::AdjacencyViolation) => {
            rejected(RejectReason::Validation, "invalid_tile_placement", client_request_id)
        }
        Err(BoardError::PrecedenceConflict) => {
            rejected(RejectReason::Conflict, "precedence_conflict", client_request_id)
        }
    }
}

fn handle_npc_event(
    state: &mut BattleRoomState,
    npc_id: String,
    event_type: String,
    data: serde_json::Value,
    requested_tick: u64,
) -> Resolution {
    let tick = state.tick.max(requested_tick);
    state.tick = tick;

    let npc = state
        .npcs
        .entry(npc_id.clone())
        .or_insert_with(|| crate::types::NpcState {
            npc_id: npc_id.clone(),
            current_tick: tick,
            metadata: serde_json::Map::new(),
        });
    npc.current_tick = tick;
    npc.metadata
        .insert("lastEventType".to_string(), serde_json::Value::String(event_type.clone()));

    Resolution::Applied {
        effects: vec![Effect::NpcEvent {
            npc_id,
            event_type,
            data,
        }],
        tick,
        request_id: None,
    }
}

fn handle_scripted_event(
    state: &mut BattleRoomState,
    script_id: String,
    event_type: String,
    data: serde_json::Value,
    requested_tick: u64,
) -> Resolution {
    let tick = state.tick.max(requested_tick);
    state.tick = tick;

    Resolution::Applied {
        effects: vec![Effect::ScriptedEvent {
            script_id,
            event_type,
            data,
        }],
        tick,
        request_id: None,
    }
}

/// Clamp magnitude to `[1, 3]` (§6.3, §8 property 12) and move the player.
fn handle_move(
    state: &mut BattleRoomState,
    player_id: uuid::Uuid,
    direction: Direction,
    magnitude: i32,
    requested_tick: u64,
) -> Resolution {
    let Some(player) = state.players.get_mut(&player_id) else {
        return rejected(RejectReason::Validation, "character_not_found", None);
    };
    if player.status != PlayerStatus::Active {
        return rejected(RejectReason::State, "instance_terminated", None);
    }

    let clamped_magnitude = magnitude.clamp(1, 3);
    let (dx, dy) = direction.delta();
    let (cx, cy) = player.position.unwrap_or((0, 0));
    let new_position = (cx + dx * clamped_magnitude, cy + dy * clamped_magnitude);
    player.position = Some(new_position);

    let tick = state.tick.max(requested_tick);
    state.tick = tick;
    if let Some(player) = state.players.get_mut(&player_id) {
        player.last_action_tick = tick;
    }

    Resolution::Applied {
        effects: vec![Effect::Move {
            player_id,
            position: new_position,
        }],
        tick,
        request_id: None,
    }
}

fn handle_chat(state: &mut BattleRoomState, player_id: uuid::Uuid, message: String) -> Resolution {
    if !state.players.contains_key(&player_id) {
        return rejected(RejectReason::Validation, "character_not_found", None);
    }

    Resolution::Applied {
        effects: vec![Effect::Chat { player_id, message }],
        tick: state.tick,
        request_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::types::{Adjacency, PlacementMetadata, PlayerSessionState, PlayerStatus};
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn room_with_player(player_id: uuid::Uuid) -> BattleRoomState {
        let instance_id = Uuid::new_v4();
        let mut players = HashMap::new();
        players.insert(
            player_id,
            PlayerSessionState {
                session_id: player_id,
                display_name: "Alice".into(),
                status: PlayerStatus::Active,
                initiative: 10,
                last_action_tick: 0,
                reconnect_deadline: None,
                position: Some((2, 3)),
            },
        );

        BattleRoomState {
            instance_id,
            ruleset_version: semver::Version::new(1, 0, 0),
            status: RoomStatus::Active,
            tick: 0,
            started_at: Utc::now(),
            players,
            npcs: HashMap::new(),
            board: Board::new(8, 8),
            pending_actions: Vec::new(),
            max_players: 4,
            placement: PlacementMetadata::default(),
        }
    }

    #[test]
    fn tile_conflict_second_submission_is_rejected() {
        // Scenario B: P1 wins the race, P2's identical placement rejects.
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let mut state = room_with_player(p1);
        state.players.insert(
            p2,
            PlayerSessionState {
                session_id: p2,
                display_name: "Bob".into(),
                status: PlayerStatus::Active,
                initiative: 8,
                last_action_tick: 0,
                reconnect_deadline: None,
                position: Some((0, 0)),
            },
        );

        let action1 = ActionRequest::TilePlacement {
            id: Uuid::new_v4(),
            instance_id: state.instance_id,
            timestamp: Utc::now(),
            requested_tick: Some(1),
            player_id: p1,
            position: (1, 1),
            tile_type: 3,
            client_request_id: None,
            player_initiative: 12,
            last_action_tick: 0,
        };
        let action2 = ActionRequest::TilePlacement {
            id: Uuid::new_v4(),
            instance_id: state.instance_id,
            timestamp: Utc::now(),
            requested_tick: Some(1),
            player_id: p2,
            position: (1, 1),
            tile_type: 4,
            client_request_id: None,
            player_initiative: 8,
            last_action_tick: 0,
        };

        assert!(matches!(handle(&action1, &mut state), Resolution::Applied { .. }));
        let second = handle(&action2, &mut state);
        assert!(matches!(
            second,
            Resolution::Rejected {
                reason: RejectReason::Conflict,
                error: "precedence_conflict",
                ..
            }
        ));

        let cell = state.board.get_cell(1, 1).unwrap();
        assert_eq!(cell.tile_type, Some(3));
        assert_eq!(cell.last_updated_by, CellOwner::Session(p1));
    }

    #[test]
    fn move_clamps_magnitude_zero_to_one() {
        let player_id = Uuid::new_v4();
        let mut state = room_with_player(player_id);
        let action = ActionRequest::Move {
            id: Uuid::new_v4(),
            instance_id: state.instance_id,
            timestamp: Utc::now(),
            requested_tick: Some(1),
            player_id,
            direction: Direction::East,
            magnitude: 0,
        };
        let resolution = handle(&action, &mut state);
        let Resolution::Applied { effects, .. } = resolution else {
            panic!("expected applied");
        };
        assert_eq!(
            effects[0],
            Effect::Move {
                player_id,
                position: (3, 3)
            }
        );
    }

    #[test]
    fn move_clamps_magnitude_four_to_three() {
        let player_id = Uuid::new_v4();
        let mut state = room_with_player(player_id);
        let action = ActionRequest::Move {
            id: Uuid::new_v4(),
            instance_id: state.instance_id,
            timestamp: Utc::now(),
            requested_tick: Some(1),
            player_id,
            direction: Direction::East,
            magnitude: 4,
        };
        let resolution = handle(&action, &mut state);
        let Resolution::Applied { effects, .. } = resolution else {
            panic!("expected applied");
        };
        assert_eq!(
            effects[0],
            Effect::Move {
                player_id,
                position: (5, 3)
            }
        );
    }

    #[test]
    fn move_application_scenario_f() {
        // Scenario F: player at (2,3), east magnitude 2 -> (4,3).
        let player_id = Uuid::new_v4();
        let mut state = room_with_player(player_id);
        let action = ActionRequest::Move {
            id: Uuid::new_v4(),
            instance_id: state.instance_id,
            timestamp: Utc::now(),
            requested_tick: Some(1),
            player_id,
            direction: Direction::East,
            magnitude: 2,
        };
        let resolution = handle(&action, &mut state);
        let Resolution::Applied { effects, tick, .. } = resolution else {
            panic!("expected applied");
        };
        assert_eq!(tick, 1);
        assert_eq!(
            effects[0],
            Effect::Move {
                player_id,
                position: (4, 3)
            }
        );
    }

    #[test]
    fn cross_instance_action_is_rejected() {
        let player_id = Uuid::new_v4();
        let mut state = room_with_player(player_id);
        let action = ActionRequest::Chat {
            id: Uuid::new_v4(),
            instance_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            requested_tick: None,
            player_id,
            message: "hi".into(),
        };
        assert!(matches!(
            handle(&action, &mut state),
            Resolution::Rejected {
                error: "cross_instance_action",
                ..
            }
        ));
    }

    #[test]
    fn terminated_instance_rejects_all_actions() {
        let player_id = Uuid::new_v4();
        let mut state = room_with_player(player_id);
        state.status = RoomStatus::Ended;
        let action = ActionRequest::Chat {
            id: Uuid::new_v4(),
            instance_id: state.instance_id,
            timestamp: Utc::now(),
            requested_tick: None,
            player_id,
            message: "hi".into(),
        };
        assert!(matches!(
            handle(&action, &mut state),
            Resolution::Rejected {
                error: "instance_terminated",
                ..
            }
        ));
    }
}
