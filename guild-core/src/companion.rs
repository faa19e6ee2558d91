//! Hired companion instances and their lifecycle states.

use serde::{Deserialize, Serialize};

use crate::catalog::CompanionTemplate;
use crate::types::{CompanionId, PlayerId, Timestamp};

/// One hired copy of a companion, owned by a single player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionInstance {
    /// Template this instance was hired from.
    pub companion_id: CompanionId,
    /// Owning player.
    pub owner_id: PlayerId,
    /// Relationship with the owner, always within 0–100.
    pub relationship: i32,
    /// Trust in the owner, always within 0–100. Grows with completed
    /// quests; never causes a departure.
    #[serde(default)]
    pub trust: i32,
    /// Experience earned in the owner's service.
    pub experience: u32,
    /// Current level.
    pub level: u32,
    /// Missions completed or failed together.
    pub mission_count: u32,
    /// Fraction of missions that succeeded (0.0–1.0).
    pub success_rate: f32,
    /// False once the companion has departed.
    pub active: bool,
    /// When the companion was hired.
    pub hire_time: Timestamp,
    /// Last relationship change.
    pub last_interaction_time: Timestamp,
}

impl CompanionInstance {
    /// Stamp a fresh hire from its template.
    #[must_use]
    pub fn hire(template: &CompanionTemplate, owner: PlayerId, now: Timestamp) -> Self {
        Self {
            companion_id: template.id.clone(),
            owner_id: owner,
            relationship: template.starting_relationship(),
            trust: template.starting_trust(),
            experience: 0,
            level: template.level.max(1),
            mission_count: 0,
            success_rate: 1.0,
            active: true,
            hire_time: now,
            last_interaction_time: now,
        }
    }

    /// Lifecycle state of this instance.
    #[must_use]
    pub fn state(&self) -> CompanionState {
        if self.active {
            CompanionState::Active
        } else {
            CompanionState::Departed
        }
    }

    /// Relationship band for UI and dialogue selection.
    #[must_use]
    pub fn relationship_status(&self) -> RelationshipStatus {
        RelationshipStatus::from_relationship(self.relationship)
    }

    /// Rough combat effectiveness multiplier.
    ///
    /// Level contributes 2% per level, relationship swings ±25% around the
    /// midpoint, and the mission record scales by up to ±10%.
    #[must_use]
    pub fn combat_effectiveness(&self) -> f32 {
        let level_factor = 1.0 + self.level.saturating_sub(1) as f32 * 0.02;
        let relationship_factor = 0.75 + self.relationship as f32 / 200.0;
        let record_factor = 0.9 + self.success_rate.clamp(0.0, 1.0) * 0.2;
        level_factor * relationship_factor * record_factor
    }
}

/// Per-companion state machine.
///
/// `Available → Active` on hire, `Active → Available` on dismissal (the
/// instance is deleted), `Active → Departed` when the relationship
/// collapses. `Departed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanionState {
    /// In the guild's availability pool.
    Available,
    /// Hired and serving.
    Active,
    /// Left after the relationship collapsed. Never re-hireable.
    Departed,
}

/// Relationship bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipStatus {
    /// 0–9: on the verge of leaving.
    Hostile,
    /// 10–29: resentful.
    Unfriendly,
    /// 30–59: professional.
    Neutral,
    /// 60–84: warm.
    Friendly,
    /// 85–100: devoted.
    Loyal,
}

impl RelationshipStatus {
    /// Classify a relationship value.
    #[must_use]
    pub fn from_relationship(value: i32) -> Self {
        match value {
            v if v >= 85 => Self::Loyal,
            v if v >= 60 => Self::Friendly,
            v if v >= 30 => Self::Neutral,
            v if v >= 10 => Self::Unfriendly,
            _ => Self::Hostile,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hostile => "Hostile",
            Self::Unfriendly => "Unfriendly",
            Self::Neutral => "Neutral",
            Self::Friendly => "Friendly",
            Self::Loyal => "Loyal",
        }
    }
}
