//! Action Pipeline (§4.9): per-room FIFO queue with a rate-limit gate and
//! bounded batch drain. Does not execute actions; the owning
//! [`crate::room::BattleRoom`] drains it and invokes the Action Handler.

use crate::rate_limit::RateLimiterStore;
use crate::types::ActionRequest;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct EnqueueRejection {
    pub reason: &'static str,
    pub retry_after_ms: Option<u64>,
}

pub enum EnqueueOutcome {
    Accepted { remaining: Option<u32> },
    Rejected(EnqueueRejection),
}

pub struct ActionPipeline {
    queue: VecDeque<ActionRequest>,
    rate_limiter: Arc<dyn RateLimiterStore>,
}

impl ActionPipeline {
    pub fn new(rate_limiter: Arc<dyn RateLimiterStore>) -> Self {
        Self {
            queue: VecDeque::new(),
            rate_limiter,
        }
    }

    /// Consult the Rate Limiter for the action's channel, then enqueue on
    /// acceptance (§4.9).
    pub async fn enqueue(&mut self, action: ActionRequest, subject: &str) -> EnqueueOutcome {
        let channel = action.rate_limit_channel();
        let decision = self.rate_limiter.evaluate(channel, subject, Utc::now()).await;

        if !decision.allowed {
            return EnqueueOutcome::Rejected(EnqueueRejection {
                reason: "rate_limit",
                retry_after_ms: decision.retry_after_ms,
            });
        }

        self.queue.push_back(action);
        EnqueueOutcome::Accepted {
            remaining: decision.remaining,
        }
    }

    /// Drain up to `limit` entries in FIFO order.
    pub fn drain_batch(&mut self, limit: usize) -> Vec<ActionRequest> {
        let n = limit.min(self.queue.len());
        self.queue.drain(..n).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
