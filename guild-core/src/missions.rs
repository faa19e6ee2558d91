//! Mission bookkeeping for hired companions.
//!
//! The host resolves missions however it likes and reports the outcome
//! with a [`MissionReport`]. Hosts without their own resolution can use
//! [`roll_mission`] with a seeded RNG.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::companion::CompanionInstance;
use crate::config::MissionConfig;

/// Relationship gained from a successful rolled mission.
pub const SUCCESS_RELATIONSHIP_BONUS: i32 = 2;
/// Relationship lost from a failed rolled mission.
pub const FAILURE_RELATIONSHIP_PENALTY: i32 = -1;

/// Outcome of one mission as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionReport {
    /// Whether the mission succeeded.
    pub succeeded: bool,
    /// Experience awarded to the companion.
    pub experience: u32,
    /// Relationship change to route through the shared mutator.
    pub relationship_delta: i32,
}

/// What [`apply_mission`] changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionProgress {
    /// Levels gained from this report.
    pub levels_gained: u32,
    /// Success rate after this report.
    pub success_rate: f32,
}

/// Fold a mission report into the companion's record.
///
/// Bumps `mission_count`, keeps `success_rate` as the running mean of all
/// outcomes, adds experience and levels up once per `experience_per_level`
/// boundary crossed (capped at `max_level`). Relationship is untouched here;
/// the ledger applies `relationship_delta` separately.
pub fn apply_mission(
    companion: &mut CompanionInstance,
    report: &MissionReport,
    config: &MissionConfig,
) -> MissionProgress {
    let previous_missions = companion.mission_count as f32;
    let outcome = if report.succeeded { 1.0 } else { 0.0 };
    companion.success_rate = if companion.mission_count == 0 {
        outcome
    } else {
        (companion.success_rate * previous_missions + outcome) / (previous_missions + 1.0)
    };
    companion.mission_count = companion.mission_count.saturating_add(1);

    let old_experience = companion.experience;
    companion.experience = companion.experience.saturating_add(report.experience);

    let levels_gained = if config.experience_per_level == 0 {
        0
    } else {
        let crossed = companion.experience / config.experience_per_level
            - old_experience / config.experience_per_level;
        let room = config.max_level.saturating_sub(companion.level);
        crossed.min(room)
    };
    companion.level += levels_gained;

    MissionProgress {
        levels_gained,
        success_rate: companion.success_rate,
    }
}

/// Chance that `companion` succeeds at a mission of `difficulty`.
///
/// `difficulty` 1.0 is a mission matched to a fresh, neutral companion.
/// The result is kept within 5–95% so no mission is certain.
#[must_use]
pub fn mission_success_chance(companion: &CompanionInstance, difficulty: f32) -> f32 {
    if difficulty <= 0.0 {
        return 0.95;
    }
    (0.6 * companion.combat_effectiveness() / difficulty).clamp(0.05, 0.95)
}

/// Resolve a mission with `rng`.
///
/// Success awards the full `experience_reward`; failure awards a quarter.
pub fn roll_mission<R: Rng + ?Sized>(
    rng: &mut R,
    companion: &CompanionInstance,
    difficulty: f32,
    experience_reward: u32,
) -> MissionReport {
    let chance = mission_success_chance(companion, difficulty);
    let succeeded = rng.r#gen::<f32>() < chance;

    if succeeded {
        MissionReport {
            succeeded,
            experience: experience_reward,
            relationship_delta: SUCCESS_RELATIONSHIP_BONUS,
        }
    } else {
        MissionReport {
            succeeded,
            experience: experience_reward / 4,
            relationship_delta: FAILURE_RELATIONSHIP_PENALTY,
        }
    }
}
