//! Sequence Evaluator (§4.3): classifies an incoming sequence number
//! against a session's last-acknowledged sequence.

use crate::session_store::SessionStore;
use crate::types::SessionId;
use std::sync::Arc;

/// Classification of one `(sessionId, sequence)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvaluation {
    Accept,
    Duplicate,
    Gap { missing_count: u64 },
    OutOfOrder,
    MissingSession,
    Invalid,
}

/// Purely classifying; state is mutated only through [`SequenceEvaluator::acknowledge`].
pub struct SequenceEvaluator {
    sessions: Arc<SessionStore>,
}

impl SequenceEvaluator {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    /// Classify `sequence` for `session_id` against the last-acknowledged
    /// sequence S (§8 property 11).
    pub async fn evaluate(&self, session_id: SessionId, sequence: i64) -> SequenceEvaluation {
        if sequence < 0 {
            return SequenceEvaluation::Invalid;
        }
        let sequence = sequence as u64;

        let Some(session) = self.sessions.get(session_id).await else {
            return SequenceEvaluation::MissingSession;
        };

        let last = session.last_sequence_number;
        let expected_next = last + 1;

        if sequence == expected_next {
            SequenceEvaluation::Accept
        } else if sequence == last {
            SequenceEvaluation::Duplicate
        } else if sequence > expected_next {
            SequenceEvaluation::Gap {
                missing_count: sequence - expected_next,
            }
        } else {
            SequenceEvaluation::OutOfOrder
        }
    }

    /// Advance the session's last-acknowledged sequence to `max(S, sequence)`.
    /// Never regresses.
    pub async fn acknowledge(&self, session_id: SessionId, sequence: u64) {
        self.sessions.record_action_sequence(session_id, sequence).await;
    }
}
