//! Orchestrator: wires the independently-testable components into one
//! running service — the single place that owns every `Arc` and hands
//! the same instance to every consumer that needs it, so a component
//! never ends up talking to a second, disconnected copy of a store it
//! should share.

use crate::admission::{AdmissionController, CapacityOracle};
use crate::config::Config;
use crate::durability::{DurabilityLog, InMemoryDurabilityLog};
use crate::health::{AlwaysHealthy, CacheHealthCheck, HealthPoller};
use crate::janitor::{Janitor, JanitorDeps};
use crate::lobby::Lobby;
use crate::rate_limit::{InMemoryRateLimiter, RateLimiterStore};
use crate::reconnect_service::{InMemoryReconnectStore, ReconnectService};
use crate::room::RoomDeps;
use crate::ruleset::RuleSetService;
use crate::sequence::SequenceEvaluator;
use crate::session_store::SessionStore;
use crate::types::InstanceId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Reports capacity from the same session registry every room writes to,
/// so admission's view of occupancy never drifts from reality.
struct SessionCountCapacityOracle {
    sessions: Arc<SessionStore>,
    max_players: u8,
}

#[async_trait]
impl CapacityOracle for SessionCountCapacityOracle {
    async fn seats_available(&self, instance_id: InstanceId) -> bool {
        self.sessions.list_by_instance(instance_id).await.len() < self.max_players as usize
    }
}

/// Every shared service the HTTP/WebSocket layer needs, already wired
/// together and ready to hand to request handlers behind one `Arc`.
pub struct ServerState {
    pub config: Config,
    pub sessions: Arc<SessionStore>,
    pub sequences: Arc<SequenceEvaluator>,
    pub reconnect: Arc<ReconnectService>,
    pub durability: Arc<dyn DurabilityLog>,
    pub rate_limiter: Arc<dyn RateLimiterStore>,
    pub rulesets: Arc<RuleSetService>,
    pub lobby: Arc<Lobby>,
    pub admission: Arc<AdmissionController>,
    pub janitor: Arc<Janitor>,
    pub health: Arc<HealthPoller>,
}

impl ServerState {
    /// Build every component from `config`, sharing one `SessionStore` and
    /// one `SequenceEvaluator` between the Admission Controller, the
    /// Janitor, and every room's [`RoomDeps`].
    pub fn build(config: Config) -> Arc<Self> {
        Self::build_with_cache_check(config, Arc::new(AlwaysHealthy))
    }

    pub fn build_with_cache_check(config: Config, cache_check: Arc<dyn CacheHealthCheck>) -> Arc<Self> {
        let sessions = Arc::new(SessionStore::new());
        let sequences = Arc::new(SequenceEvaluator::new(sessions.clone()));
        let reconnect = Arc::new(ReconnectService::new(Arc::new(InMemoryReconnectStore::new())));
        let durability: Arc<dyn DurabilityLog> = Arc::new(InMemoryDurabilityLog::new());
        let rate_limiter: Arc<dyn RateLimiterStore> =
            Arc::new(InMemoryRateLimiter::new(config.rate_limiter.clone()));
        let rulesets = Arc::new(RuleSetService::new());

        let capacity: Arc<dyn CapacityOracle> = Arc::new(SessionCountCapacityOracle {
            sessions: sessions.clone(),
            max_players: config.board.max_players,
        });

        let admission = Arc::new(AdmissionController::new(
            config.admission.clone(),
            config.drain.clone(),
            config.client_build.clone(),
            sessions.clone(),
            capacity,
            config.reconnect.replacement_confirmation_ttl_ms,
        ));

        let room_deps_factory = {
            let durability = durability.clone();
            let sequences = sequences.clone();
            let reconnect = reconnect.clone();
            let sessions = sessions.clone();
            let rate_limiter = rate_limiter.clone();
            let grace_period_ms = config.reconnect.grace_ms;
            let drain_batch_size = config.janitor.batch_size;
            Arc::new(move || RoomDeps {
                durability: durability.clone(),
                sequences: sequences.clone(),
                reconnect: reconnect.clone(),
                sessions: sessions.clone(),
                rate_limiter: rate_limiter.clone(),
                grace_period_ms,
                drain_batch_size,
            })
        };

        let lobby = Arc::new(Lobby::new(rulesets.clone(), room_deps_factory));

        let janitor = Arc::new(Janitor::new(
            JanitorDeps {
                sessions: sessions.clone(),
                reconnect: reconnect.clone(),
                admission: admission.clone(),
                config: config.janitor.clone(),
            },
            config.session.inactivity_timeout_ms,
        ));

        let health = Arc::new(HealthPoller::new(
            "shared_cache",
            cache_check,
            Duration::from_secs(config.health.poll_interval_seconds),
            Duration::from_secs(config.health.poll_timeout_seconds),
        ));

        Arc::new(Self {
            config,
            sessions,
            sequences,
            reconnect,
            durability,
            rate_limiter,
            rulesets,
            lobby,
            admission,
            janitor,
            health,
        })
    }

    /// Spawn the Janitor's sweep loop and the Health Poller's ping loop.
    /// Neither handle is awaited; both run for the process lifetime.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        self.janitor.clone().spawn();
        self.health.clone().spawn();
    }
}
