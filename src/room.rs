//! Battle Room (§4.10): owns one `BattleRoomState` for its lifetime as a
//! single-writer serial domain (§5). All mutation happens inside one
//! `tokio::spawn`ed task; callers talk to it through an `mpsc` mailbox,
//! the same shape the teacher uses for per-connection outbound queues.

use crate::action;
use crate::action_pipeline::{ActionPipeline, EnqueueOutcome};
use crate::board::Board;
use crate::durability::{AppendActionInput, DurabilityLog};
use crate::rate_limit::RateLimiterStore;
use crate::reconnect_service::{CreateSessionInput, ReconnectService};
use crate::sequence::{SequenceEvaluation, SequenceEvaluator};
use crate::session_store::SessionStore;
use crate::snapshot::{self, PlayerView, SnapshotError};
use crate::types::{
    ActionId, ActionRequest, BattleRoomState, Effect, InstanceId, PlayerSessionState,
    PlayerStateSnapshot, PlayerStatus, RejectReason, Resolution, RoomStatus, RuleSet, SessionId,
    UserId,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

const DEFAULT_DRAIN_BATCH_SIZE: usize = 32;
const DEFAULT_ROOM_MAILBOX_CAPACITY: usize = 256;
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// External dependencies a room needs but does not own.
pub struct RoomDeps {
    pub durability: Arc<dyn DurabilityLog>,
    pub sequences: Arc<SequenceEvaluator>,
    pub reconnect: Arc<ReconnectService>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: Arc<dyn RateLimiterStore>,
    pub grace_period_ms: u64,
    pub drain_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub user_id: UserId,
    pub display_name: String,
    pub initiative: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    CapacityFull,
    Internal,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Queued {
        action_id: ActionId,
        remaining: Option<u32>,
    },
    /// A durable-intent replay (§4.13 step 1, §8 property 9): the sequence
    /// evaluator classified this as the already-acknowledged sequence, and
    /// the cached durability record is surfaced so the client's retry
    /// resolves to the original `actionEventId` rather than a fresh one.
    Duplicate {
        action_id: ActionId,
        prior_action_id: ActionId,
        persisted_at: chrono::DateTime<Utc>,
    },
    Rejected {
        action_id: ActionId,
        reason: &'static str,
        retry_after_ms: Option<u64>,
    },
}

/// Fanned out to every connection attached to a room; `unicast_to` narrows
/// delivery to a single session when the actor is identifiable (§4.10).
#[derive(Debug, Clone)]
pub enum RoomBroadcast {
    ActionApplied {
        action_id: ActionId,
        tick: u64,
        effects: Vec<Effect>,
        request_id: Option<String>,
    },
    ActionRejected {
        action_id: ActionId,
        reason: RejectReason,
        error: &'static str,
        unicast_to: Option<SessionId>,
    },
}

enum RoomCommand {
    SubmitAction {
        sequence_number: u64,
        action: ActionRequest,
        subject: String,
        respond_to: oneshot::Sender<SubmitOutcome>,
    },
    RequestSnapshot {
        viewer_id: SessionId,
        respond_to: oneshot::Sender<Result<PlayerView, SnapshotError>>,
    },
    Join {
        session_id: SessionId,
        options: JoinOptions,
        respond_to: oneshot::Sender<Result<PlayerView, JoinError>>,
    },
    Leave {
        session_id: SessionId,
        consented: bool,
        respond_to: oneshot::Sender<()>,
    },
    MarkEnded {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to a running room's mailbox. Cloneable; all clones address the
/// same single-writer task.
#[derive(Clone)]
pub struct BattleRoom {
    pub instance_id: InstanceId,
    commands: mpsc::Sender<RoomCommand>,
    broadcast_tx: broadcast::Sender<RoomBroadcast>,
}

impl BattleRoom {
    /// Create the room's state from its rule set, seed the board from
    /// `initialTiles`, and spawn the owning task (§4.10).
    pub fn spawn(instance_id: InstanceId, ruleset: RuleSet, deps: RoomDeps) -> (Self, broadcast::Receiver<RoomBroadcast>) {
        let mut board = Board::new(ruleset.metadata.board.width, ruleset.metadata.board.height);
        for tile in &ruleset.metadata.board.initial_tiles {
            board.seed_tile(tile.x, tile.y, tile.tile_type);
        }

        let state = BattleRoomState {
            instance_id,
            ruleset_version: ruleset.version.clone(),
            status: RoomStatus::Active,
            tick: 0,
            started_at: Utc::now(),
            players: HashMap::new(),
            npcs: HashMap::new(),
            board,
            pending_actions: Vec::new(),
            max_players: ruleset.metadata.max_players,
            placement: ruleset.metadata.placement.clone(),
        };

        let (command_tx, command_rx) = mpsc::channel(DEFAULT_ROOM_MAILBOX_CAPACITY);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let drain_batch_size = if deps.drain_batch_size == 0 {
            DEFAULT_DRAIN_BATCH_SIZE
        } else {
            deps.drain_batch_size
        };

        tokio::spawn(run(state, deps, drain_batch_size, command_rx, broadcast_tx.clone()));

        (
            Self {
                instance_id,
                commands: command_tx,
                broadcast_tx,
            },
            broadcast_rx,
        )
    }

    /// A fresh receiver for this room's broadcast stream; every joining
    /// connection needs its own, since `broadcast::Receiver` is not `Clone`.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomBroadcast> {
        self.broadcast_tx.subscribe()
    }

    pub async fn submit_action(
        &self,
        sequence_number: u64,
        action: ActionRequest,
        subject: String,
    ) -> Option<SubmitOutcome> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::SubmitAction {
                sequence_number,
                action,
                subject,
                respond_to,
            })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn request_snapshot(&self, viewer_id: SessionId) -> Option<Result<PlayerView, SnapshotError>> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::RequestSnapshot { viewer_id, respond_to })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn join(&self, session_id: SessionId, options: JoinOptions) -> Option<Result<PlayerView, JoinError>> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join {
                session_id,
                options,
                respond_to,
            })
            .await
            .ok()?;
        response.await.ok()
    }

    pub async fn leave(&self, session_id: SessionId, consented: bool) -> Option<()> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Leave {
                session_id,
                consented,
                respond_to,
            })
            .await
            .ok()?;
        response.await.ok()
    }

    /// Transition the room to `Ended` (§9: an external integration decides
    /// when a match is over; the core never calls this on its own).
    pub async fn mark_ended(&self) -> Option<()> {
        let (respond_to, response) = oneshot::channel();
        self.commands.send(RoomCommand::MarkEnded { respond_to }).await.ok()?;
        response.await.ok()
    }
}

/// `true` for intents the Ack Protocol (§4.13) durability-logs: tile
/// placements and generic action events. `move`/`chat` remain
/// sequence-ordered only (still acknowledged via the Sequence Evaluator,
/// just without a durable row); NPC/scripted events are system-originated.
fn requires_durability(action: &ActionRequest) -> bool {
    matches!(action, ActionRequest::TilePlacement { .. } | ActionRequest::Action { .. })
}

fn session_id_of(action: &ActionRequest) -> Option<SessionId> {
    match action {
        ActionRequest::TilePlacement { player_id, .. }
        | ActionRequest::Move { player_id, .. }
        | ActionRequest::Chat { player_id, .. }
        | ActionRequest::Action { player_id, .. } => Some(*player_id),
        ActionRequest::NpcEvent { .. } | ActionRequest::ScriptedEvent { .. } => None,
    }
}

/// The room's single-writer loop (§5): process one mailbox command at a
/// time, then drain the action pipeline in bounded batches so no one
/// room can starve the runtime's other tasks.
async fn run(
    mut state: BattleRoomState,
    deps: RoomDeps,
    drain_batch_size: usize,
    mut commands: mpsc::Receiver<RoomCommand>,
    broadcast_tx: broadcast::Sender<RoomBroadcast>,
) {
    let mut pipeline = ActionPipeline::new(deps.rate_limiter.clone());
    let mut pending_sequence_numbers: HashMap<ActionId, u64> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            RoomCommand::SubmitAction {
                sequence_number,
                action,
                subject,
                respond_to,
            } => {
                let outcome = enqueue_action(
                    &deps,
                    &mut pipeline,
                    &mut pending_sequence_numbers,
                    sequence_number,
                    action,
                )
                .await;
                let _ = respond_to.send(outcome);
                let _ = subject; // carried through to the pipeline's rate-limit subject already.
            }
            RoomCommand::RequestSnapshot { viewer_id, respond_to } => {
                let snapshot = snapshot::create_snapshot(&state);
                let view = snapshot::extract_player_view(&snapshot, viewer_id);
                let _ = respond_to.send(view);
            }
            RoomCommand::Join {
                session_id,
                options,
                respond_to,
            } => {
                let outcome = handle_join(&mut state, &deps, session_id, options).await;
                let _ = respond_to.send(outcome);
            }
            RoomCommand::Leave {
                session_id,
                consented,
                respond_to,
            } => {
                handle_leave(&mut state, &deps, session_id, consented).await;
                let _ = respond_to.send(());
            }
            RoomCommand::MarkEnded { respond_to } => {
                state.status = RoomStatus::Ended;
                let _ = respond_to.send(());
            }
        }

        while !pipeline.is_empty() {
            let batch = pipeline.drain_batch(drain_batch_size);
            for action in batch {
                let sequence_number = pending_sequence_numbers.remove(&action.id());
                apply_one(&mut state, &deps, action, sequence_number, &broadcast_tx).await;
            }
            tokio::task::yield_now().await;
        }
    }
}

async fn enqueue_action(
    deps: &RoomDeps,
    pipeline: &mut ActionPipeline,
    pending_sequence_numbers: &mut HashMap<ActionId, u64>,
    sequence_number: u64,
    action: ActionRequest,
) -> SubmitOutcome {
    let action_id = action.id();

    if let Some(session_id) = session_id_of(&action) {
        match deps.sequences.evaluate(session_id, sequence_number as i64).await {
            SequenceEvaluation::Accept => {}
            SequenceEvaluation::Duplicate => {
                if requires_durability(&action) {
                    if let Some(prior) = deps.durability.get_by_session_and_sequence(session_id, sequence_number).await {
                        return SubmitOutcome::Duplicate {
                            action_id,
                            prior_action_id: prior.action_id,
                            persisted_at: prior.persisted_at,
                        };
                    }
                }
                return SubmitOutcome::Rejected {
                    action_id,
                    reason: "duplicate",
                    retry_after_ms: None,
                };
            }
            SequenceEvaluation::Gap { .. } | SequenceEvaluation::OutOfOrder => {
                return SubmitOutcome::Rejected {
                    action_id,
                    reason: "sequence_gap",
                    retry_after_ms: None,
                };
            }
            SequenceEvaluation::MissingSession => {
                return SubmitOutcome::Rejected {
                    action_id,
                    reason: "session_not_found",
                    retry_after_ms: None,
                };
            }
            SequenceEvaluation::Invalid => {
                return SubmitOutcome::Rejected {
                    action_id,
                    reason: "invalid_request",
                    retry_after_ms: None,
                };
            }
        }
    }

    let subject = session_id_of(&action)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "system".to_string());

    match pipeline.enqueue(action, &subject).await {
        EnqueueOutcome::Accepted { remaining } => {
            pending_sequence_numbers.insert(action_id, sequence_number);
            SubmitOutcome::Queued { action_id, remaining }
        }
        EnqueueOutcome::Rejected(rejection) => SubmitOutcome::Rejected {
            action_id,
            reason: rejection.reason,
            retry_after_ms: rejection.retry_after_ms,
        },
    }
}

/// One drained action: apply, persist if durable, acknowledge the
/// sequence, and broadcast the result (§4.8, §4.13). `sequence_number` is
/// the envelope-level sequence this action was enqueued under, recovered
/// from the room's pending-sequence map since the pipeline itself only
/// carries the bare [`ActionRequest`].
async fn apply_one(
    state: &mut BattleRoomState,
    deps: &RoomDeps,
    action: ActionRequest,
    sequence_number: Option<u64>,
    broadcast_tx: &broadcast::Sender<RoomBroadcast>,
) {
    let action_id = action.id();
    let sequence_owner = session_id_of(&action);
    let durable = requires_durability(&action);

    let resolution = action::handle(&action, state);

    match resolution {
        Resolution::Applied {
            effects,
            tick,
            request_id,
        } => {
            if let (Some(session_id), Some(sequence_number)) = (sequence_owner, sequence_number) {
                if durable {
                    let append = deps
                        .durability
                        .append_action(AppendActionInput {
                            session_id,
                            user_id: session_id,
                            character_id: session_id,
                            sequence_number,
                            action_type: action.type_name().to_string(),
                            payload: serde_json::to_value(&action).unwrap_or(serde_json::Value::Null),
                        })
                        .await;

                    if append.is_ok() {
                        deps.sequences.acknowledge(session_id, sequence_number).await;
                    }
                } else {
                    // move/chat: sequence-ordered only, no durable row (§9).
                    deps.sequences.acknowledge(session_id, sequence_number).await;
                }
            }

            let _ = broadcast_tx.send(RoomBroadcast::ActionApplied {
                action_id,
                tick,
                effects,
                request_id,
            });
        }
        Resolution::Rejected { reason, error, .. } => {
            let _ = broadcast_tx.send(RoomBroadcast::ActionRejected {
                action_id,
                reason,
                error,
                unicast_to: sequence_owner,
            });
        }
    }
}

async fn handle_join(
    state: &mut BattleRoomState,
    deps: &RoomDeps,
    session_id: SessionId,
    options: JoinOptions,
) -> Result<PlayerView, JoinError> {
    if !state.players.contains_key(&session_id) && state.players.len() >= state.max_players as usize {
        return Err(JoinError::CapacityFull);
    }

    match state.players.get_mut(&session_id) {
        Some(player) => {
            player.status = PlayerStatus::Active;
            player.reconnect_deadline = None;
            deps.reconnect.remove_session(session_id, state.instance_id).await;
        }
        None => {
            state.players.insert(
                session_id,
                PlayerSessionState {
                    session_id,
                    display_name: options.display_name,
                    status: PlayerStatus::Active,
                    initiative: options.initiative,
                    last_action_tick: state.tick,
                    reconnect_deadline: None,
                    position: None,
                },
            );
        }
    }

    let snapshot = snapshot::create_snapshot(state);
    snapshot::extract_player_view(&snapshot, session_id).map_err(|_| JoinError::Internal)
}

async fn handle_leave(state: &mut BattleRoomState, deps: &RoomDeps, session_id: SessionId, consented: bool) {
    if consented {
        state.players.remove(&session_id);
        deps.reconnect.remove_session(session_id, state.instance_id).await;
        return;
    }

    let Some(player) = state.players.get_mut(&session_id) else {
        return;
    };
    player.status = PlayerStatus::Disconnected;
    let disconnected_at = Utc::now();
    let deadline = disconnected_at + chrono::Duration::milliseconds(deps.grace_period_ms as i64);
    player.reconnect_deadline = Some(deadline);

    let player_state = PlayerStateSnapshot {
        last_action_tick: player.last_action_tick,
        initiative: player.initiative,
        position: player.position,
    };

    deps.reconnect
        .create_session(CreateSessionInput {
            session_id,
            instance_id: state.instance_id,
            player_state,
            grace_period_ms: deps.grace_period_ms,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::InMemoryDurabilityLog;
    use crate::rate_limit::InMemoryRateLimiter;
    use crate::reconnect_service::InMemoryReconnectStore;
    use crate::types::{Adjacency, BoardMetadata, PlacementMetadata, RuleSetMetadata};
    use std::time::Duration;
    use uuid::Uuid;

    fn test_ruleset() -> RuleSet {
        RuleSet {
            id: "standard".into(),
            version: semver::Version::new(1, 0, 0),
            created_at: Utc::now(),
            metadata: RuleSetMetadata {
                description: None,
                tags: Vec::new(),
                max_players: 4,
                board: BoardMetadata {
                    width: 8,
                    height: 8,
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

    fn test_deps() -> RoomDeps {
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
    }

    async fn join_session(deps: &RoomDeps, session_id: SessionId, instance_id: InstanceId) {
        deps.sessions
            .create_or_update(crate::types::Session {
                session_id,
                user_id: session_id,
                character_id: session_id,
                instance_id,
                protocol_version: "1.0.0".into(),
                status: crate::types::SessionStatus::Active,
                last_sequence_number: 0,
                last_heartbeat_at: Utc::now(),
                grace_expires_at: None,
            })
            .await;
    }

    #[tokio::test]
    async fn join_then_snapshot_includes_player() {
        let instance_id = Uuid::new_v4();
        let (room, _rx) = BattleRoom::spawn(instance_id, test_ruleset(), test_deps());
        let session_id = Uuid::new_v4();

        let joined = room
            .join(
                session_id,
                JoinOptions {
                    user_id: session_id,
                    display_name: "Alice".into(),
                    initiative: 5,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(joined.players.contains_key(&session_id));

        let snapshot = room.request_snapshot(session_id).await.unwrap().unwrap();
        assert!(snapshot.players.contains_key(&session_id));
    }

    #[tokio::test]
    async fn join_respects_capacity() {
        let mut ruleset = test_ruleset();
        ruleset.metadata.max_players = 1;
        let instance_id = Uuid::new_v4();
        let (room, _rx) = BattleRoom::spawn(instance_id, ruleset, test_deps());

        room.join(
            Uuid::new_v4(),
            JoinOptions {
                user_id: Uuid::new_v4(),
                display_name: "First".into(),
                initiative: 1,
            },
        )
        .await
        .unwrap()
        .unwrap();

        let rejected = room
            .join(
                Uuid::new_v4(),
                JoinOptions {
                    user_id: Uuid::new_v4(),
                    display_name: "Second".into(),
                    initiative: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.unwrap_err(), JoinError::CapacityFull);
    }

    #[tokio::test]
    async fn submit_action_applies_and_broadcasts() {
        let instance_id = Uuid::new_v4();
        let deps = test_deps();
        let session_id = Uuid::new_v4();
        join_session(&deps, session_id, instance_id).await;

        let (room, mut rx) = BattleRoom::spawn(instance_id, test_ruleset(), deps);
        room.join(
            session_id,
            JoinOptions {
                user_id: session_id,
                display_name: "Alice".into(),
                initiative: 5,
            },
        )
        .await
        .unwrap()
        .unwrap();

        let action = ActionRequest::Chat {
            id: Uuid::new_v4(),
            instance_id,
            timestamp: Utc::now(),
            requested_tick: None,
            player_id: session_id,
            message: "hi".into(),
        };
        let outcome = room.submit_action(1, action, session_id.to_string()).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, RoomBroadcast::ActionApplied { .. }));
    }

    #[tokio::test]
    async fn leave_without_consent_starts_reconnect_grace() {
        let instance_id = Uuid::new_v4();
        let deps = test_deps();
        let session_id = Uuid::new_v4();
        join_session(&deps, session_id, instance_id).await;
        let reconnect = deps.reconnect.clone();

        let (room, _rx) = BattleRoom::spawn(instance_id, test_ruleset(), deps);
        room.join(
            session_id,
            JoinOptions {
                user_id: session_id,
                display_name: "Alice".into(),
                initiative: 5,
            },
        )
        .await
        .unwrap()
        .unwrap();

        room.leave(session_id, false).await.unwrap();

        let stats = reconnect.get_session_stats().await;
        assert_eq!(stats.active_sessions, 1);
    }

    #[tokio::test]
    async fn mark_ended_transitions_status() {
        let instance_id = Uuid::new_v4();
        let (room, _rx) = BattleRoom::spawn(instance_id, test_ruleset(), test_deps());
        let session_id = Uuid::new_v4();
        room.join(
            session_id,
            JoinOptions {
                user_id: session_id,
                display_name: "Alice".into(),
                initiative: 5,
            },
        )
        .await
        .unwrap()
        .unwrap();

        room.mark_ended().await.unwrap();

        let view = room.request_snapshot(session_id).await.unwrap().unwrap();
        assert_eq!(view.status, RoomStatus::Ended);
    }
}
