//! Janitor & Inactivity Sweep (§4.15): periodic four-phase cleanup over the
//! Session Store, Reconnect Service, and Admission queues. Grounded on
//! `auth::rate_limiter::start_cleanup_task`'s `tokio::spawn` + `interval`
//! loop and `reconnection::ReconnectionManager::cleanup_expired`'s
//! best-effort, error-tolerant sweep; single-flight guarded in the style of
//! `server::maintenance`'s reentrancy-safe cleanup task.

use crate::admission::AdmissionController;
use crate::config::JanitorConfig;
use crate::reconnect_service::ReconnectService;
use crate::session_store::SessionStore;
use crate::types::SessionStatus;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct JanitorDeps {
    pub sessions: Arc<SessionStore>,
    pub reconnect: Arc<ReconnectService>,
    pub admission: Arc<AdmissionController>,
    pub config: JanitorConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub grace_expired: usize,
    pub inactive_terminated: usize,
    pub orphan_queue_entries_removed: usize,
    pub reconnect_tokens_reaped: usize,
}

pub struct Janitor {
    deps: JanitorDeps,
    inactivity_timeout_ms: u64,
    running: AtomicBool,
}

impl Janitor {
    pub fn new(deps: JanitorDeps, inactivity_timeout_ms: u64) -> Self {
        Self {
            deps,
            inactivity_timeout_ms,
            running: AtomicBool::new(false),
        }
    }

    /// Spawn the periodic sweep loop; mirrors `start_cleanup_task`'s shape.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.deps.config.interval_seconds.max(1);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                self.sweep_once().await;
            }
        })
    }

    /// Single sweep. Returns `None` if a sweep was already in flight (the
    /// single-flight guard skipped this tick); sweeps are idempotent so a
    /// skipped tick causes no drift.
    pub async fn sweep_once(&self) -> Option<SweepReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        let report = self.run_phases().await;
        self.running.store(false, Ordering::Release);
        Some(report)
    }

    async fn run_phases(&self) -> SweepReport {
        let now = Utc::now();
        let buffer = chrono::Duration::seconds(self.deps.config.grace_period_buffer_seconds as i64);

        // Phase 1: grace expiry.
        let expired_grace = self.deps.sessions.get_expired_grace_sessions(now - buffer).await;
        for session in &expired_grace {
            self.deps.sessions.set_status(session.session_id, SessionStatus::Terminated).await;
            self.deps.sessions.remove(session.session_id).await;
        }

        // Phase 2: inactivity sweep.
        let inactivity_timeout = chrono::Duration::milliseconds(self.inactivity_timeout_ms as i64);
        let inactive = self.deps.sessions.get_inactive_sessions(now, inactivity_timeout).await;
        for session in &inactive {
            self.deps.sessions.set_status(session.session_id, SessionStatus::Terminating).await;
            self.deps.sessions.remove(session.session_id).await;
        }

        // Phase 3: orphan admission-queue entries.
        let orphan_queue_entries_removed = self.deps.admission.purge_orphan_queue_entries(&self.deps.sessions).await;

        // Phase 4: orphan reconnect records. Every in-memory token already
        // carries a TTL by construction (`grace_period_ms`), so the "assign
        // a TTL to keys lacking one" half of this phase is a no-op here;
        // only the "delete expired" half applies.
        let reconnect_tokens_reaped = self.deps.reconnect.cleanup_expired_sessions().await;

        SweepReport {
            grace_expired: expired_grace.len(),
            inactive_terminated: inactive.len(),
            orphan_queue_entries_removed,
            reconnect_tokens_reaped,
        }
    }
}
