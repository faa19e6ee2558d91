//! Serialisable copy of a ledger's mutable state.
//!
//! The catalog is not part of the snapshot: it is reloaded from the data
//! table on startup and the snapshot restored on top of it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::companion::CompanionInstance;
use crate::error::{GuildError, Result};
use crate::quests::ActiveQuest;
use crate::relationship::DepartureRecord;
use crate::types::{CompanionId, PlayerId, Timestamp};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Rosters, pool, reputation and the departure log at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSnapshot {
    /// Format version; see [`SNAPSHOT_VERSION`].
    pub version: u32,
    /// When the snapshot was taken.
    pub taken_at: Timestamp,
    /// Every player's companions, active and departed.
    pub rosters: BTreeMap<PlayerId, Vec<CompanionInstance>>,
    /// Hireable ids in listing order.
    pub availability_pool: Vec<CompanionId>,
    /// Guild reputation per player.
    pub reputation: BTreeMap<PlayerId, i64>,
    /// Append-only departure log.
    pub departures: Vec<DepartureRecord>,
    /// Quests under way. Absent in saves written before quests existed.
    #[serde(default)]
    pub active_quests: Vec<ActiveQuest>,
}

impl GuildSnapshot {
    /// Total companion instances across all rosters.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.rosters.values().map(Vec::len).sum()
    }

    /// Encode as JSON bytes.
    ///
    /// # Errors
    /// Returns [`GuildError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| GuildError::Serialization(e.to_string()))
    }

    /// Decode from JSON bytes, rejecting unknown format versions.
    ///
    /// # Errors
    /// Returns [`GuildError::Serialization`] on malformed input or a
    /// version newer than this build understands.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_slice(bytes).map_err(|e| GuildError::Serialization(e.to_string()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(GuildError::Serialization(format!(
                "unsupported snapshot version {} (max {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty() -> GuildSnapshot {
        GuildSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now(),
            rosters: BTreeMap::new(),
            availability_pool: vec![CompanionId::new("C1")],
            reputation: BTreeMap::from([(PlayerId::new("p1"), 120)]),
            departures: Vec::new(),
            active_quests: Vec::new(),
        }
    }

    #[test]
    fn json_round_trip() {
        let snap = empty();
        let bytes = snap.to_json().expect("encode");
        let back = GuildSnapshot::from_json(&bytes).expect("decode");
        assert_eq!(back, snap);
    }

    #[test]
    fn future_version_rejected() {
        let mut snap = empty();
        snap.version = SNAPSHOT_VERSION + 1;
        let bytes = snap.to_json().expect("encode");
        let err = GuildSnapshot::from_json(&bytes).expect_err("should reject");
        assert!(matches!(err, GuildError::Serialization(_)));
    }

    #[test]
    fn save_without_quests_still_loads() {
        let json = r#"{
            "version": 1,
            "taken_at": "2024-06-01T08:00:00Z",
            "rosters": {},
            "availability_pool": ["C1"],
            "reputation": {},
            "departures": []
        }"#;
        let snap = GuildSnapshot::from_json(json.as_bytes()).expect("decode");
        assert!(snap.active_quests.is_empty());
        assert_eq!(snap.availability_pool, vec![CompanionId::new("C1")]);
    }

    #[test]
    fn garbage_rejected() {
        assert!(GuildSnapshot::from_json(b"not json").is_err());
    }
}
