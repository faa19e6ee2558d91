//! Guild economy formulas: roster capacity, dismissal compensation and
//! daily upkeep.
//!
//! All are pure; the ledger supplies the inputs and the caller applies
//! any gold movement to its own character.

use crate::companion::CompanionInstance;
use crate::config::{CompensationConfig, RosterConfig};

/// How many active companions a player may hold.
///
/// `base_limit + floor(level / levels_per_bonus) + floor(reputation / reputation_per_bonus)`.
/// Negative reputation contributes nothing; a zero divisor disables that bonus.
#[must_use]
pub fn max_companion_limit(level: u32, reputation: i64, config: &RosterConfig) -> u32 {
    let level_bonus = level.checked_div(config.levels_per_bonus).unwrap_or(0);
    let reputation_bonus = u64::try_from(reputation.max(0))
        .unwrap_or(0)
        .checked_div(u64::from(config.reputation_per_bonus))
        .map_or(0, |b| u32::try_from(b).unwrap_or(u32::MAX));

    config
        .base_limit
        .saturating_add(level_bonus)
        .saturating_add(reputation_bonus)
}

/// Gold returned to the player when dismissing `companion`.
///
/// The base is half the hire cost with integer truncation; the multipliers
/// are applied in floating point and only the final product is rounded
/// (half away from zero). Never less than `config.minimum_payout`.
#[must_use]
pub fn dismissal_compensation(
    hire_cost: u32,
    companion: &CompanionInstance,
    config: &CompensationConfig,
) -> i64 {
    let base = hire_cost / 2;

    let relationship_mult = f64::from(companion.relationship) / 100.0;
    let experience_mult = 1.0 + (f64::from(companion.experience) / 1000.0) * config.experience_weight;
    let mission_mult = 1.0 + (f64::from(companion.mission_count) / 10.0) * config.mission_weight;

    let raw = f64::from(base) * relationship_mult * experience_mult * mission_mult;
    // Bounded by hire_cost × small multipliers; well inside i64.
    let rounded = raw.round() as i64;
    rounded.max(config.minimum_payout)
}

/// Upkeep owed for one day across the given per-companion daily costs.
#[must_use]
pub fn daily_upkeep<I>(costs: I) -> i64
where
    I: IntoIterator<Item = u32>,
{
    costs.into_iter().map(i64::from).sum()
}
