//! The host-side player handle the ledger hires for.
//!
//! The ledger never owns or mutates gold. It hands back signed deltas and,
//! through [`Patron::apply_gold`], lets the character apply them with its
//! own rules.

use crate::types::PlayerId;

/// A player character that can hire and dismiss companions.
pub trait Patron {
    /// Unique player key.
    fn id(&self) -> PlayerId;
    /// Gold currently held.
    fn gold(&self) -> i64;
    /// Character level.
    fn level(&self) -> u32;
    /// Apply a signed gold change (negative for hire costs, positive for
    /// compensation).
    fn apply_gold(&mut self, delta: i64);
}
