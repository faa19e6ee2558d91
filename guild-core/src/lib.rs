//! # Guild Core
//!
//! Game-agnostic adventurer guild ledger. Players hire companions from a
//! catalog, keep them happy, send them on missions and dismiss them for
//! compensation; neglected companions drift away and eventually leave.
//!
//! - [`catalog`] holds the static companion templates.
//! - [`ledger::GuildLedger`] owns rosters, the availability pool,
//!   reputation and the departure log, and exposes every operation.
//! - [`economy`] and [`relationship`] are the pure formulas behind them.
//! - [`quests`] defines group quests that lock a party of companions away
//!   for a stretch of game time.
//! - [`persistence::GuildStore`] saves [`snapshot::GuildSnapshot`]s to SQLite.
//!
//! The ledger never touches gold directly. Hire and dismissal return signed
//! gold deltas, or go through a host-implemented [`patron::Patron`].
//!
//! ```
//! use guild_core::{CompanionTemplate, GuildConfig, GuildLedger, HireRequest};
//! use guild_core::types::{CompanionId, PlayerId};
//!
//! let mut ledger = GuildLedger::with_system_clock(GuildConfig::default());
//! ledger.load_catalog([CompanionTemplate::new("C1", 500)]);
//!
//! let receipt = ledger.hire(&HireRequest {
//!     player_id: PlayerId::new("p1"),
//!     gold: 1000,
//!     level: 1,
//!     reputation: 0,
//!     companion_id: CompanionId::new("C1"),
//! })?;
//! assert_eq!(receipt.gold_delta, -500);
//! # Ok::<(), guild_core::GuildError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod clock;
pub mod companion;
pub mod config;
pub mod economy;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod missions;
pub mod patron;
pub mod persistence;
pub mod quests;
pub mod relationship;
pub mod snapshot;
pub mod types;

pub use catalog::{CompanionCatalog, CompanionTemplate};
pub use clock::{Clock, ManualClock, SystemClock};
pub use companion::{CompanionInstance, CompanionState, RelationshipStatus};
pub use config::GuildConfig;
pub use error::{DismissError, GuildError, HireError, QuestError};
pub use ledger::{GuildLedger, HireReceipt, HireRequest, MissionResult, UpkeepReceipt};
pub use missions::MissionReport;
pub use patron::Patron;
pub use persistence::GuildStore;
pub use quests::{ActiveQuest, QuestCatalog, QuestDifficulty, QuestOutcome, QuestTemplate};
pub use relationship::{DepartureReason, DepartureRecord, RelationshipChange};
pub use snapshot::GuildSnapshot;
