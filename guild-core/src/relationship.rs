//! Relationship arithmetic, natural decay and departures.
//!
//! Every relationship change, whether from a gift, a mission or the decay
//! tick, goes through [`apply_delta`]. It is the only place a companion can
//! depart.

use serde::{Deserialize, Serialize};

use crate::companion::CompanionInstance;
use crate::types::{CompanionId, DepartureId, PlayerId, Timestamp, minutes_between};

/// Lowest relationship value.
pub const MIN_RELATIONSHIP: i32 = 0;
/// Highest relationship value.
pub const MAX_RELATIONSHIP: i32 = 100;

/// Add `delta` to `current` and clamp to [`MIN_RELATIONSHIP`, `MAX_RELATIONSHIP`].
///
/// Computed in 64-bit so extreme deltas cannot overflow.
#[must_use]
pub fn clamp_relationship(current: i32, delta: i32) -> i32 {
    let sum = i64::from(current) + i64::from(delta);
    // Clamped into 0..=100, so the narrowing is lossless.
    sum.clamp(i64::from(MIN_RELATIONSHIP), i64::from(MAX_RELATIONSHIP)) as i32
}

/// Relationship delta owed for `minutes_idle` minutes without interaction.
///
/// `None` until strictly more than `interval_minutes` have passed; after
/// that, `-amount` per whole interval elapsed.
#[must_use]
pub fn decay_delta(minutes_idle: i64, interval_minutes: i64, amount: i32) -> Option<i32> {
    if interval_minutes <= 0 || minutes_idle <= interval_minutes {
        return None;
    }
    let steps = minutes_idle / interval_minutes;
    let total = steps.saturating_mul(i64::from(amount));
    let total = i32::try_from(total).unwrap_or(i32::MAX);
    Some(-total)
}

/// Decay owed by `companion` at `now`.
#[must_use]
pub fn pending_decay(
    companion: &CompanionInstance,
    now: Timestamp,
    interval_minutes: i64,
    amount: i32,
) -> Option<i32> {
    let idle = minutes_between(companion.last_interaction_time, now);
    decay_delta(idle, interval_minutes, amount)
}

/// Why a companion left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepartureReason {
    /// Relationship fell to the departure threshold.
    LowRelationship,
}

impl DepartureReason {
    /// Log/UI label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::LowRelationship => "Low Relationship",
        }
    }
}

impl std::fmt::Display for DepartureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An entry in the append-only departure log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartureRecord {
    /// Unique record id.
    pub id: DepartureId,
    /// Companion that left.
    pub companion_id: CompanionId,
    /// Player it left.
    pub owner_id: PlayerId,
    /// When it left.
    pub departure_time: Timestamp,
    /// Why it left.
    pub reason: DepartureReason,
    /// Relationship at the moment of departure.
    pub final_relationship: i32,
}

/// Result of one relationship change.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipChange {
    /// Value before the change.
    pub previous: i32,
    /// Value after clamping.
    pub current: i32,
    /// Present if this change made the companion leave.
    pub departure: Option<DepartureRecord>,
}

impl RelationshipChange {
    /// Whether the companion departed as a result.
    #[must_use]
    pub fn departed(&self) -> bool {
        self.departure.is_some()
    }
}

/// Apply `delta` to an active companion.
///
/// Clamps, stamps `last_interaction_time = now`, and if the result is at or
/// below `departure_threshold` marks the companion inactive and returns the
/// departure record for the caller to log.
pub fn apply_delta(
    companion: &mut CompanionInstance,
    delta: i32,
    now: Timestamp,
    departure_threshold: i32,
) -> RelationshipChange {
    let previous = companion.relationship;
    companion.relationship = clamp_relationship(previous, delta);
    companion.last_interaction_time = now;

    let departure = if companion.active && companion.relationship <= departure_threshold {
        companion.active = false;
        Some(DepartureRecord {
            id: DepartureId::new(),
            companion_id: companion.companion_id.clone(),
            owner_id: companion.owner_id.clone(),
            departure_time: now,
            reason: DepartureReason::LowRelationship,
            final_relationship: companion.relationship,
        })
    } else {
        None
    };

    RelationshipChange {
        previous,
        current: companion.relationship,
        departure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CompanionTemplate;
    use chrono::{Duration, Utc};

    fn companion(relationship: i32) -> CompanionInstance {
        let mut c = CompanionInstance::hire(
            &CompanionTemplate::new("C1", 500),
            PlayerId::new("p1"),
            Utc::now(),
        );
        c.relationship = relationship;
        c
    }

    #[test]
    fn clamp_handles_extremes() {
        assert_eq!(clamp_relationship(50, i32::MAX), 100);
        assert_eq!(clamp_relationship(50, i32::MIN), 0);
        assert_eq!(clamp_relationship(50, -20), 30);
    }

    #[test]
    fn decay_requires_strictly_more_than_interval() {
        assert_eq!(decay_delta(119, 120, 1), None);
        assert_eq!(decay_delta(120, 120, 1), None);
        assert_eq!(decay_delta(121, 120, 1), Some(-1));
    }

    #[test]
    fn decay_floors_elapsed_intervals() {
        assert_eq!(decay_delta(300, 120, 1), Some(-2));
        assert_eq!(decay_delta(359, 120, 3), Some(-6));
        assert_eq!(decay_delta(360, 120, 1), Some(-3));
    }

    #[test]
    fn decay_with_zero_interval_is_disabled() {
        assert_eq!(decay_delta(10_000, 0, 1), None);
    }

    #[test]
    fn pending_decay_reads_last_interaction() {
        let now = Utc::now();
        let mut c = companion(50);
        c.last_interaction_time = now - Duration::minutes(300);
        assert_eq!(pending_decay(&c, now, 120, 1), Some(-2));
    }

    #[test]
    fn reaching_zero_departs_once() {
        let now = Utc::now();
        let mut c = companion(5);

        let change = apply_delta(&mut c, -5, now, 0);
        assert!(change.departed());
        assert!(!c.active);
        assert_eq!(c.relationship, 0);

        let record = change.departure.expect("departure");
        assert_eq!(record.reason, DepartureReason::LowRelationship);
        assert_eq!(record.reason.to_string(), "Low Relationship");
        assert_eq!(record.final_relationship, 0);
    }

    #[test]
    fn reaching_one_stays() {
        let mut c = companion(5);
        let change = apply_delta(&mut c, -4, Utc::now(), 0);
        assert!(!change.departed());
        assert!(c.active);
        assert_eq!(change.previous, 5);
        assert_eq!(change.current, 1);
    }

    #[test]
    fn custom_threshold() {
        let mut c = companion(30);
        let change = apply_delta(&mut c, -10, Utc::now(), 20);
        assert!(change.departed());
    }

    #[test]
    fn interaction_time_is_stamped() {
        let now = Utc::now() + Duration::minutes(5);
        let mut c = companion(50);
        apply_delta(&mut c, 3, now, 0);
        assert_eq!(c.last_interaction_time, now);
        assert_eq!(c.relationship, 53);
    }
}
