//! Error types for the guild ledger.

use thiserror::Error;

use crate::types::{CompanionId, PlayerId, QuestId};

/// Why a hire request was refused.
///
/// Variants are listed in the order the checks run; the first failing
/// check wins and nothing is mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HireError {
    /// The companion is not in the availability pool (already hired,
    /// departed, or never offered).
    #[error("Companion {0} is not available for hire")]
    NotAvailable(CompanionId),

    /// The pool lists the id but the catalog has no template for it.
    #[error("No catalog entry for companion {0}")]
    UnknownCompanion(CompanionId),

    /// Player gold is below the hire cost.
    #[error("Insufficient funds: need {cost} gold, have {available}")]
    InsufficientFunds {
        /// Template hire cost.
        cost: u32,
        /// Gold the player holds.
        available: i64,
    },

    /// The player's active roster is already at capacity.
    #[error("Companion roster full ({current}/{limit})")]
    RosterFull {
        /// Maximum for this player's level and reputation.
        limit: u32,
        /// Active companions currently held.
        current: u32,
    },

    /// Guild reputation is below the template's requirement.
    #[error("Insufficient guild reputation: need {required}, have {current}")]
    InsufficientReputation {
        /// Template requirement.
        required: u32,
        /// Player reputation.
        current: i64,
    },
}

/// Why a dismissal was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DismissError {
    /// No active instance of this companion in the player's roster.
    #[error("Companion {companion} not found in roster of {player}")]
    NotFound {
        /// Requesting player.
        player: PlayerId,
        /// Requested companion.
        companion: CompanionId,
    },

    /// The companion is away on a quest and cannot leave the roster.
    #[error("Companion {companion} is away on quest {quest}")]
    OnQuest {
        /// Requested companion.
        companion: CompanionId,
        /// Quest the companion is on.
        quest: QuestId,
    },
}

/// Why a quest could not be started, completed or cancelled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuestError {
    /// No quest with this id in the quest catalog.
    #[error("Unknown quest {0}")]
    UnknownQuest(QuestId),

    /// The quest exists but is not currently offered.
    #[error("Quest {0} is not available")]
    Unavailable(QuestId),

    /// The player is already running this quest.
    #[error("Quest {0} is already under way")]
    AlreadyActive(QuestId),

    /// The player already runs the configured maximum of quests.
    #[error("Too many active quests (limit {limit})")]
    TooManyActive {
        /// `quests.max_active_per_player`.
        limit: u32,
    },

    /// Fewer companions were selected than the quest needs.
    #[error("Quest needs {required} companions, {provided} selected")]
    PartyTooSmall {
        /// Quest requirement.
        required: u32,
        /// Distinct companions selected.
        provided: u32,
    },

    /// The same companion was selected twice.
    #[error("Companion {0} selected more than once")]
    DuplicateMember(CompanionId),

    /// A selected companion is not active in the player's roster.
    #[error("Companion {0} is not an active member of the roster")]
    NotInRoster(CompanionId),

    /// A selected companion is already away on another quest.
    #[error("Companion {companion} is already on quest {quest}")]
    Busy {
        /// Selected companion.
        companion: CompanionId,
        /// Quest it is on.
        quest: QuestId,
    },

    /// A selected companion is below the quest's level requirement.
    #[error("Companion {companion} is level {level}, quest needs {required}")]
    LevelTooLow {
        /// Selected companion.
        companion: CompanionId,
        /// Quest requirement.
        required: u32,
        /// Companion level.
        level: u32,
    },

    /// The player is not running this quest.
    #[error("Quest {0} has not been started")]
    NotStarted(QuestId),

    /// The quest's duration has not elapsed yet.
    #[error("Quest {quest} is still under way ({percent}% done)")]
    NotFinished {
        /// Quest in progress.
        quest: QuestId,
        /// Whole percent of the duration elapsed.
        percent: u32,
    },
}

/// Top-level error type for all guild operations.
#[derive(Error, Debug)]
pub enum GuildError {
    /// A hire precondition failed.
    #[error(transparent)]
    Hire(#[from] HireError),

    /// A dismissal precondition failed.
    #[error(transparent)]
    Dismiss(#[from] DismissError),

    /// A quest precondition failed.
    #[error(transparent)]
    Quest(#[from] QuestError),

    /// No active instance matches (player, companion) for a relationship
    /// or mission update.
    #[error("Active companion {companion} not found for player {player}")]
    CompanionNotFound {
        /// Requesting player.
        player: PlayerId,
        /// Requested companion.
        companion: CompanionId,
    },

    /// The guild system is switched off in configuration.
    #[error("Adventurer guild system is disabled")]
    Disabled,

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GuildError>;
