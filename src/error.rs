//! Error Catalog: a frozen registry of domain error kinds (§4.1).
//!
//! Every error-producing path in the core surfaces one of these entries.
//! The registry is seeded once at startup and never mutated afterward —
//! the two legitimate process-wide objects named in the design notes are
//! this catalog and the metrics registry.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Broad error taxonomy (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Capacity,
    RateLimit,
    State,
    Security,
    Internal,
}

/// One row of the frozen error table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub key: &'static str,
    pub numeric_code: &'static str,
    pub reason: &'static str,
    pub category: ErrorCategory,
    pub retryable: bool,
    pub human_message: &'static str,
}

macro_rules! entry {
    ($key:expr, $code:expr, $reason:expr, $category:expr, $retryable:expr, $message:expr) => {
        ErrorEntry {
            key: $key,
            numeric_code: $code,
            reason: $reason,
            category: $category,
            retryable: $retryable,
            human_message: $message,
        }
    };
}

fn seed() -> Vec<ErrorEntry> {
    use ErrorCategory::*;
    vec![
        entry!(
            "authentication_required",
            "E1001",
            "authentication_required",
            Security,
            false,
            "You need to sign in again to continue."
        ),
        entry!(
            "version_mismatch",
            "E1002",
            "version_mismatch",
            Validation,
            false,
            "Please update your client to the latest version."
        ),
        entry!(
            "character_not_owned",
            "E1003",
            "character_not_owned",
            Security,
            false,
            "That character does not belong to you."
        ),
        entry!(
            "character_not_found",
            "E1004",
            "character_not_found",
            Validation,
            false,
            "We couldn't find that character."
        ),
        entry!(
            "rate_limited",
            "E1005",
            "rate_limited",
            RateLimit,
            true,
            "You're doing that too often. Please slow down."
        ),
        entry!(
            "maintenance",
            "E1006",
            "maintenance",
            Capacity,
            true,
            "The server is temporarily unavailable for maintenance."
        ),
        entry!(
            "already_in_session",
            "E1007",
            "already_in_session",
            Conflict,
            false,
            "You already have an active session."
        ),
        entry!(
            "invalid_request",
            "E1008",
            "invalid_request",
            Validation,
            false,
            "That request could not be understood."
        ),
        entry!(
            "queue_full",
            "E1009",
            "queue_full",
            Capacity,
            true,
            "The queue is full. Please try again shortly."
        ),
        entry!(
            "timeout",
            "E1010",
            "timeout",
            Internal,
            true,
            "The request took too long to process."
        ),
        entry!(
            "rate_limit_exceeded",
            "E1011",
            "rate_limit_exceeded",
            RateLimit,
            true,
            "You're doing that too often. Please slow down."
        ),
        entry!(
            "invalid_tile_placement",
            "E2001",
            "invalid_tile_placement",
            Validation,
            false,
            "That tile placement is not valid."
        ),
        entry!(
            "precedence_conflict",
            "E2002",
            "precedence_conflict",
            Conflict,
            false,
            "Another player's action was applied first."
        ),
        entry!(
            "cross_instance_action",
            "E2003",
            "cross_instance_action",
            State,
            false,
            "That action belongs to a different battle instance."
        ),
        entry!(
            "instance_terminated",
            "E2004",
            "instance_terminated",
            State,
            false,
            "This battle instance has ended."
        ),
        entry!(
            "persistence_failed",
            "E2005",
            "persistence_failed",
            Internal,
            true,
            "We couldn't save your action. Please retry."
        ),
        entry!(
            "missing_session",
            "E2006",
            "missing_session",
            State,
            false,
            "Your session could not be found. Please reconnect."
        ),
        entry!(
            "sequence_gap_detected",
            "E2007",
            "sequence_gap_detected",
            State,
            true,
            "Your connection missed some updates. Resyncing."
        ),
        entry!(
            "grace_period_expired",
            "E2008",
            "grace_period_expired",
            State,
            false,
            "Your reconnection window has expired."
        ),
        entry!(
            "version_conflict",
            "E2009",
            "version_conflict",
            Conflict,
            false,
            "That rule set version already exists."
        ),
        entry!(
            "invalid_version",
            "E2010",
            "invalid_version",
            Validation,
            false,
            "That is not a valid rule set version."
        ),
        entry!(
            "not_found",
            "E2011",
            "not_found",
            Validation,
            false,
            "The requested resource was not found."
        ),
        entry!(
            "board_size_mismatch",
            "E2012",
            "board_size_mismatch",
            Validation,
            false,
            "The two boards have different dimensions."
        ),
        entry!(
            "chat_rate_limit_exceeded",
            "E2013",
            "CHAT_RATE_LIMIT_EXCEEDED",
            RateLimit,
            true,
            "You're sending messages too quickly."
        ),
        entry!(
            "internal_error",
            "E9999",
            "internal_error",
            Internal,
            true,
            "Something went wrong on our end. Please try again."
        ),
    ]
}

static REGISTRY: OnceLock<Vec<ErrorEntry>> = OnceLock::new();

fn registry() -> &'static [ErrorEntry] {
    REGISTRY.get_or_init(seed).as_slice()
}

/// Look up an entry by its stable key (e.g. `"rate_limited"`).
pub fn lookup_by_key(key: &str) -> Option<&'static ErrorEntry> {
    registry().iter().find(|e| e.key == key)
}

/// Look up an entry by its numeric code (e.g. `"E1001"`).
pub fn lookup_by_numeric_code(code: &str) -> Option<&'static ErrorEntry> {
    registry().iter().find(|e| e.numeric_code == code)
}

/// Look up an entry by its wire `reason` string.
pub fn lookup_by_reason(reason: &str) -> Option<&'static ErrorEntry> {
    registry().iter().find(|e| e.reason == reason)
}

/// List all entries, optionally filtered by category.
pub fn list_all(filter: Option<ErrorCategory>) -> Vec<&'static ErrorEntry> {
    registry()
        .iter()
        .filter(|e| filter.map_or(true, |cat| e.category == cat))
        .collect()
}

/// The single entry unknown internal failures map to.
pub fn internal_error() -> &'static ErrorEntry {
    lookup_by_key("internal_error").expect("internal_error is always seeded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_are_unique() {
        let all = list_all(None);
        let mut codes: Vec<_> = all.iter().map(|e| e.numeric_code).collect();
        codes.sort_unstable();
        let mut deduped = codes.clone();
        deduped.dedup();
        assert_eq!(codes.len(), deduped.len(), "duplicate numeric codes found");
    }

    #[test]
    fn all_messages_are_non_empty() {
        for entry in list_all(None) {
            assert!(!entry.human_message.is_empty());
        }
    }

    #[test]
    fn internal_error_is_retryable() {
        assert!(internal_error().retryable);
    }

    #[test]
    fn lookup_by_key_finds_seeded_entry() {
        let entry = lookup_by_key("rate_limited").unwrap();
        assert_eq!(entry.numeric_code, "E1005");
        assert_eq!(entry.category, ErrorCategory::RateLimit);
    }

    #[test]
    fn filter_by_category_only_returns_matching_entries() {
        let validation_only = list_all(Some(ErrorCategory::Validation));
        assert!(!validation_only.is_empty());
        assert!(validation_only
            .iter()
            .all(|e| e.category == ErrorCategory::Validation));
    }

    #[test]
    fn unknown_key_returns_none() {
        assert!(lookup_by_key("does_not_exist").is_none());
    }
}
