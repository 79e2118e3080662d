//! Health Poller (§4.17): fixed-interval liveness ping against the shared
//! cache, with a wall-clock timeout and an overlap-skip guard. No direct
//! teacher equivalent; built fresh as a `tokio::spawn` loop guarded by the
//! same single-flight `AtomicBool` pattern as [`crate::janitor::Janitor`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Liveness probe against whatever backs the Reconnect Service / Rate
/// Limiter in a clustered deployment; the in-memory stores are trivially
/// healthy, a Redis-backed one would issue a real `PING`.
#[async_trait]
pub trait CacheHealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), String>;
}

pub struct AlwaysHealthy;

#[async_trait]
impl CacheHealthCheck for AlwaysHealthy {
    async fn ping(&self) -> Result<(), String> {
        Ok(())
    }
}

/// `event.degraded` (§6.3).
#[derive(Debug, Clone, PartialEq)]
pub struct DegradedSignal {
    pub dependency: &'static str,
    pub status: DegradedStatus,
    pub observed_at: DateTime<Utc>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedStatus {
    Degraded,
    Recovered,
}

pub struct HealthPoller {
    dependency: &'static str,
    check: Arc<dyn CacheHealthCheck>,
    interval: Duration,
    timeout: Duration,
    signals: broadcast::Sender<DegradedSignal>,
    running: AtomicBool,
    was_degraded: AtomicBool,
}

const DEFAULT_SIGNAL_CAPACITY: usize = 64;

impl HealthPoller {
    pub fn new(dependency: &'static str, check: Arc<dyn CacheHealthCheck>, interval: Duration, timeout: Duration) -> Self {
        let (signals, _rx) = broadcast::channel(DEFAULT_SIGNAL_CAPACITY);
        Self {
            dependency,
            check,
            interval,
            timeout,
            signals,
            running: AtomicBool::new(false),
            was_degraded: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DegradedSignal> {
        self.signals.subscribe()
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval_duration = self.interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval_duration);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                self.poll_once().await;
            }
        })
    }

    /// One ping. Never panics or propagates an error into the scheduler:
    /// a failing or timed-out ping is itself the degraded signal.
    pub async fn poll_once(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let result = tokio::time::timeout(self.timeout, self.check.ping()).await;
        let now = Utc::now();

        match result {
            Ok(Ok(())) => {
                if self.was_degraded.swap(false, Ordering::AcqRel) {
                    let _ = self.signals.send(DegradedSignal {
                        dependency: self.dependency,
                        status: DegradedStatus::Recovered,
                        observed_at: now,
                        message: None,
                    });
                }
            }
            Ok(Err(message)) => self.emit_degraded(now, Some(message)),
            Err(_) => self.emit_degraded(now, Some("ping timed out".to_string())),
        }

        self.running.store(false, Ordering::Release);
    }

    fn emit_degraded(&self, now: DateTime<Utc>, message: Option<String>) {
        self.was_degraded.store(true, Ordering::Release);
        let _ = self.signals.send(DegradedSignal {
            dependency: self.dependency,
            status: DegradedStatus::Degraded,
            observed_at: now,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct FlakyCheck {
        calls: AtomicUsize,
        fail_until: usize,
    }

    #[async_trait]
    impl CacheHealthCheck for FlakyCheck {
        async fn ping(&self) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_until {
                Err("unreachable".to_string())
            } else {
                Ok(())
            }
        }
    }

    struct HangingCheck;

    #[async_trait]
    impl CacheHealthCheck for HangingCheck {
        async fn ping(&self) -> Result<(), String> {
            tokio::time::sleep(StdDuration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_ping_emits_degraded_then_recovered() {
        let check = Arc::new(FlakyCheck {
            calls: AtomicUsize::new(0),
            fail_until: 1,
        });
        let poller = Arc::new(HealthPoller::new(
            "cache",
            check,
            StdDuration::from_secs(60),
            StdDuration::from_secs(1),
        ));
        let mut signals = poller.subscribe();

        poller.poll_once().await;
        let first = signals.try_recv().unwrap();
        assert_eq!(first.status, DegradedStatus::Degraded);

        poller.poll_once().await;
        let second = signals.try_recv().unwrap();
        assert_eq!(second.status, DegradedStatus::Recovered);
    }

    #[tokio::test]
    async fn timeout_counts_as_degraded() {
        let poller = Arc::new(HealthPoller::new(
            "cache",
            Arc::new(HangingCheck),
            StdDuration::from_secs(60),
            StdDuration::from_millis(50),
        ));
        let mut signals = poller.subscribe();
        poller.poll_once().await;
        let signal = signals.try_recv().unwrap();
        assert_eq!(signal.status, DegradedStatus::Degraded);
    }

    #[tokio::test]
    async fn healthy_ping_emits_nothing() {
        let poller = Arc::new(HealthPoller::new(
            "cache",
            Arc::new(AlwaysHealthy),
            StdDuration::from_secs(60),
            StdDuration::from_secs(1),
        ));
        let mut signals = poller.subscribe();
        poller.poll_once().await;
        assert!(signals.try_recv().is_err());
    }
}
