//! Rule Set Service (§4.6): immutable, versioned game parameter bundles.

use crate::types::{Adjacency, BoardMetadata, PlacementMetadata, RuleSet, RuleSetMetadata};
use chrono::Utc;
use dashmap::DashMap;
use semver::Version;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleSetError {
    #[error("rule set version {0} already exists")]
    VersionConflict(String),
    #[error("{0} is not a valid SemVer version")]
    InvalidVersion(String),
    #[error("rule set not found")]
    NotFound,
}

const MAX_TAGS: usize = 32;
const MAX_TAG_LEN: usize = 32;

#[derive(Default)]
pub struct RuleSetService {
    by_version: DashMap<Version, RuleSet>,
    by_id: DashMap<String, Version>,
}

impl RuleSetService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new immutable rule set, normalizing its metadata
    /// (§4.6): board dimensions clamped to `[1, 256]`, `maxPlayers` to
    /// `[2, 64]`, tags deduplicated case-insensitively and capped, adjacency
    /// defaulted to `orthogonal`, unknown keys captured into `extras`.
    pub fn publish(
        &self,
        id: String,
        raw_version: &str,
        raw_metadata: serde_json::Value,
    ) -> Result<RuleSet, RuleSetError> {
        let version = Version::parse(raw_version)
            .map_err(|_| RuleSetError::InvalidVersion(raw_version.to_string()))?;

        if self.by_version.contains_key(&version) {
            return Err(RuleSetError::VersionConflict(version.to_string()));
        }

        let metadata = normalize_metadata(raw_metadata);
        let rule_set = RuleSet {
            id: id.clone(),
            version: version.clone(),
            created_at: Utc::now(),
            metadata,
        };

        self.by_version.insert(version.clone(), rule_set.clone());
        self.by_id.insert(id, version);

        Ok(rule_set)
    }

    /// Deep-cloned so returned values cannot mutate the registry.
    pub fn require_by_version(&self, version: &Version) -> Result<RuleSet, RuleSetError> {
        self.by_version
            .get(version)
            .map(|r| r.clone())
            .ok_or(RuleSetError::NotFound)
    }

    pub fn require_by_id(&self, id: &str) -> Result<RuleSet, RuleSetError> {
        let version = self.by_id.get(id).ok_or(RuleSetError::NotFound)?;
        self.require_by_version(&version)
    }

    /// The highest published version, used by the Lobby when no version is
    /// requested explicitly.
    pub fn latest(&self) -> Option<RuleSet> {
        self.by_version
            .iter()
            .max_by(|a, b| a.key().cmp(b.key()))
            .map(|e| e.value().clone())
    }
}

fn normalize_metadata(raw: serde_json::Value) -> RuleSetMetadata {
    let mut obj = match raw {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    let description = obj
        .remove("description")
        .and_then(|v| v.as_str().map(str::to_string));

    let tags = obj
        .remove("tags")
        .and_then(|v| v.as_array().cloned())
        .map(normalize_tags)
        .unwrap_or_default();

    let max_players = obj
        .remove("maxPlayers")
        .and_then(|v| v.as_u64())
        .map(|n| n.clamp(2, 64) as u8)
        .unwrap_or(64);

    let board = obj
        .remove("board")
        .map(normalize_board)
        .unwrap_or(BoardMetadata {
            width: 1,
            height: 1,
            initial_tiles: Vec::new(),
        });

    let placement = obj
        .remove("placement")
        .map(normalize_placement)
        .unwrap_or_default();

    RuleSetMetadata {
        description,
        tags,
        max_players,
        board,
        placement,
        extras: obj,
    }
}

fn normalize_tags(raw: Vec<serde_json::Value>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for value in raw {
        let Some(tag) = value.as_str() else { continue };
        let truncated: String = tag.chars().take(MAX_TAG_LEN).collect();
        let key = truncated.to_lowercase();
        if seen.insert(key) {
            tags.push(truncated);
        }
        if tags.len() >= MAX_TAGS {
            break;
        }
    }
    tags
}

fn normalize_board(raw: serde_json::Value) -> BoardMetadata {
    let obj = raw.as_object();
    let width = obj
        .and_then(|o| o.get("width"))
        .and_then(|v| v.as_u64())
        .map(|n| n.clamp(1, 256) as u16)
        .unwrap_or(1);
    let height = obj
        .and_then(|o| o.get("height"))
        .and_then(|v| v.as_u64())
        .map(|n| n.clamp(1, 256) as u16)
        .unwrap_or(1);
    let initial_tiles = obj
        .and_then(|o| o.get("initialTiles"))
        .and_then(|v| v.as_array())
        .map(|tiles| {
            tiles
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    BoardMetadata {
        width,
        height,
        initial_tiles,
    }
}

fn normalize_placement(raw: serde_json::Value) -> PlacementMetadata {
    let obj = raw.as_object();
    let adjacency = obj
        .and_then(|o| o.get("adjacency"))
        .and_then(|v| v.as_str())
        .and_then(|s| match s {
            "none" => Some(Adjacency::None),
            "orthogonal" => Some(Adjacency::Orthogonal),
            "any" => Some(Adjacency::Any),
            _ => None,
        })
        .unwrap_or(Adjacency::Orthogonal);
    let allow_first_placement_anywhere = obj
        .and_then(|o| o.get("allowFirstPlacementAnywhere"))
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    PlacementMetadata {
        adjacency,
        allow_first_placement_anywhere,
    }
}
