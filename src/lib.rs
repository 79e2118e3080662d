//! Realtime session, action pipeline, and battle-room core for a
//! tile-based multiplayer game.
//!
//! # Module Structure
//!
//! - [`types`]: shared data model (sessions, rule sets, actions, board state)
//! - [`error`]: frozen error catalog, the error-taxonomy seam every
//!   component's failures map through
//! - [`config`]: configuration loading and validation
//! - [`logging`]: tracing subscriber setup
//! - [`metrics`]: process-wide counters, gauges, and latency histograms
//! - [`board`]: tile grid and placement rules
//! - [`ruleset`]: immutable, versioned rule set publishing
//! - [`rate_limit`]: sliding-window rate limiting
//! - [`durability`]: append-only action log
//! - [`reconnect_service`]: reconnect token issuance and grace-period resume
//! - [`session_store`]: session registry and lifecycle
//! - [`sequence`]: per-session sequence number evaluation
//! - [`action`]: action/effect type support
//! - [`action_pipeline`]: per-connection inbound action queue
//! - [`snapshot`]: room-state and player-view projection
//! - [`room`]: the single-writer battle room
//! - [`admission`]: capacity, rate-limit, and queueing gate for joins
//! - [`lobby`]: matchmaking and instance routing
//! - [`janitor`]: periodic inactivity sweep
//! - [`health`]: shared-cache liveness polling
//! - [`server`]: orchestrator wiring the above into a running service
//! - [`net`]: HTTP and WebSocket transport

pub mod action;
pub mod action_pipeline;
pub mod admission;
pub mod board;
pub mod config;
pub mod durability;
pub mod error;
pub mod health;
pub mod janitor;
pub mod lobby;
pub mod logging;
pub mod metrics;
pub mod net;
pub mod rate_limit;
pub mod reconnect_service;
pub mod room;
pub mod ruleset;
pub mod sequence;
pub mod server;
pub mod session_store;
pub mod snapshot;
pub mod types;
