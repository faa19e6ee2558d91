//! The guild ledger: catalog, rosters, availability pool and reputation.
//!
//! [`GuildLedger`] is the single stateful component of the crate. It owns
//! every map it touches; callers mutate only through its methods, so the
//! pool/roster invariants below hold as long as the ledger is used from one
//! thread at a time (it is `Send`, hosts wrap it in their own lock if they
//! need sharing).
//!
//! Invariants:
//! - every companion's relationship stays within 0–100;
//! - a companion id is never in the pool and in an active roster at once;
//! - departed companions stay in their owner's roster (inactive) and never
//!   return to the pool;
//! - a companion is on at most one quest, and cannot be dismissed until
//!   that quest is completed or cancelled.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::catalog::{CompanionCatalog, CompanionTemplate};
use crate::clock::{Clock, SystemClock};
use crate::companion::{CompanionInstance, CompanionState};
use crate::config::GuildConfig;
use crate::economy;
use crate::error::{DismissError, GuildError, HireError, QuestError, Result};
use crate::metrics::{GuildCounters, spans};
use crate::missions::{self, MissionProgress, MissionReport};
use crate::patron::Patron;
use crate::quests::{ActiveQuest, QuestCatalog, QuestDifficulty, QuestOutcome, QuestTemplate};
use crate::relationship::{self, DepartureRecord, RelationshipChange};
use crate::snapshot::{GuildSnapshot, SNAPSHOT_VERSION};
use crate::types::{CompanionId, PlayerId, QuestId, Timestamp};

/// Everything a hire decision needs to know about the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HireRequest {
    /// Hiring player.
    pub player_id: PlayerId,
    /// Gold the player holds.
    pub gold: i64,
    /// Player level.
    pub level: u32,
    /// Player guild reputation.
    pub reputation: i64,
    /// Companion to hire.
    pub companion_id: CompanionId,
}

/// A successful hire.
#[derive(Debug, Clone, PartialEq)]
pub struct HireReceipt {
    /// The new roster entry.
    pub companion: CompanionInstance,
    /// Gold change for the caller to apply (`-hire_cost`).
    pub gold_delta: i64,
}

/// Result of a recorded mission.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionResult {
    /// Experience, level and success-rate changes.
    pub progress: MissionProgress,
    /// Relationship change from the report's delta.
    pub relationship: RelationshipChange,
}

/// Result of a day's upkeep.
#[derive(Debug, Clone, PartialEq)]
pub struct UpkeepReceipt {
    /// Upkeep owed for the day.
    pub due: i64,
    /// Whether the player could cover it.
    pub paid: bool,
    /// Gold change for the caller to apply (`-due` when paid, else 0).
    pub gold_delta: i64,
    /// Companions who left over the unpaid-upkeep penalty.
    pub departures: Vec<DepartureRecord>,
}

/// The adventurer guild's books.
pub struct GuildLedger {
    config: GuildConfig,
    clock: Arc<dyn Clock>,
    catalog: CompanionCatalog,
    quest_catalog: QuestCatalog,
    active_quests: Vec<ActiveQuest>,
    pool: Vec<CompanionId>,
    rosters: BTreeMap<PlayerId, Vec<CompanionInstance>>,
    reputation: BTreeMap<PlayerId, i64>,
    departures: Vec<DepartureRecord>,
    counters: Arc<GuildCounters>,
    dirty: bool,
}

impl std::fmt::Debug for GuildLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildLedger")
            .field("templates", &self.catalog.len())
            .field("pool", &self.pool.len())
            .field("players", &self.rosters.len())
            .field("departures", &self.departures.len())
            .field("active_quests", &self.active_quests.len())
            .finish_non_exhaustive()
    }
}

impl GuildLedger {
    /// Create an empty ledger with an injected clock.
    pub fn new(config: GuildConfig, clock: impl Clock + 'static) -> Self {
        Self {
            config,
            clock: Arc::new(clock),
            catalog: CompanionCatalog::new(),
            quest_catalog: QuestCatalog::new(),
            active_quests: Vec::new(),
            pool: Vec::new(),
            rosters: BTreeMap::new(),
            reputation: BTreeMap::new(),
            departures: Vec::new(),
            counters: Arc::new(GuildCounters::new()),
            dirty: false,
        }
    }

    /// Create an empty ledger on the wall clock.
    #[must_use]
    pub fn with_system_clock(config: GuildConfig) -> Self {
        Self::new(config, SystemClock)
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Load (or reload) catalog rows and rebuild the availability pool.
    ///
    /// Rows overwrite existing templates with the same id. The pool is
    /// rebuilt from every template flagged `available_for_hire`, skipping
    /// ids currently held by an active roster entry or already departed.
    pub fn load_catalog<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = CompanionTemplate>,
    {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::CATALOG_LOAD).entered();

        let added = self.catalog.load(rows);

        let pool: Vec<CompanionId> = self
            .catalog
            .hireable()
            .filter(|t| !self.is_held(&t.id))
            .map(|t| t.id.clone())
            .collect();
        self.pool = pool;
        self.mark_dirty();

        info!(
            templates = self.catalog.len(),
            new = added,
            available = self.pool.len(),
            "Companion catalog loaded"
        );
    }

    /// The loaded catalog.
    #[must_use]
    pub fn catalog(&self) -> &CompanionCatalog {
        &self.catalog
    }

    // ------------------------------------------------------------------
    // Hire / dismiss
    // ------------------------------------------------------------------

    /// Hire a companion.
    ///
    /// Checks run in order and stop at the first failure: pool membership,
    /// template existence, funds, roster capacity, reputation. Nothing is
    /// mutated unless every check passes.
    ///
    /// # Errors
    /// [`GuildError::Hire`] with the failing check, or
    /// [`GuildError::Disabled`] when the guild is switched off.
    pub fn hire(&mut self, request: &HireRequest) -> Result<HireReceipt> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::HIRE).entered();

        if !self.config.general.enabled {
            return Err(GuildError::Disabled);
        }

        let template = match self.check_hire(request) {
            Ok(template) => template.clone(),
            Err(e) => {
                GuildCounters::bump(&self.counters.hire_rejections);
                warn!(
                    player = %request.player_id,
                    companion = %request.companion_id,
                    reason = %e,
                    "Hire refused"
                );
                return Err(e.into());
            }
        };

        let companion = CompanionInstance::hire(&template, request.player_id.clone(), self.clock.now());
        self.rosters
            .entry(request.player_id.clone())
            .or_default()
            .push(companion.clone());
        self.pool.retain(|id| *id != template.id);

        GuildCounters::bump(&self.counters.hires);
        self.mark_dirty();

        info!(
            player = %request.player_id,
            companion = %template.id,
            cost = template.hire_cost,
            "Companion hired"
        );

        Ok(HireReceipt {
            companion,
            gold_delta: -i64::from(template.hire_cost),
        })
    }

    fn check_hire(&self, request: &HireRequest) -> std::result::Result<&CompanionTemplate, HireError> {
        let id = &request.companion_id;

        if !self.is_available(id) {
            return Err(HireError::NotAvailable(id.clone()));
        }

        let template = self
            .catalog
            .get(id)
            .ok_or_else(|| HireError::UnknownCompanion(id.clone()))?;

        if request.gold < i64::from(template.hire_cost) {
            return Err(HireError::InsufficientFunds {
                cost: template.hire_cost,
                available: request.gold,
            });
        }

        let limit = self.max_companion_limit(request.level, request.reputation);
        let current = self.companion_count(&request.player_id);
        if current >= limit {
            return Err(HireError::RosterFull { limit, current });
        }

        if request.reputation < i64::from(template.required_reputation) {
            return Err(HireError::InsufficientReputation {
                required: template.required_reputation,
                current: request.reputation,
            });
        }

        Ok(template)
    }

    /// Hire on behalf of a [`Patron`], using the ledger's reputation for
    /// that player and charging the patron through [`Patron::apply_gold`].
    ///
    /// # Errors
    /// As [`GuildLedger::hire`]. The patron is untouched on error.
    pub fn hire_for<P: Patron + ?Sized>(
        &mut self,
        patron: &mut P,
        companion_id: &CompanionId,
    ) -> Result<CompanionInstance> {
        let player_id = patron.id();
        let request = HireRequest {
            reputation: self.reputation(&player_id),
            player_id,
            gold: patron.gold(),
            level: patron.level(),
            companion_id: companion_id.clone(),
        };
        let receipt = self.hire(&request)?;
        patron.apply_gold(receipt.gold_delta);
        Ok(receipt.companion)
    }

    /// Dismiss an active companion and return the compensation owed.
    ///
    /// The instance is removed from the roster and its id goes back into
    /// the pool.
    ///
    /// # Errors
    /// [`GuildError::Dismiss`] when no active instance matches or the
    /// companion is away on a quest, or [`GuildError::Disabled`] when the
    /// guild is switched off.
    pub fn dismiss(&mut self, player_id: &PlayerId, companion_id: &CompanionId) -> Result<i64> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::DISMISS).entered();

        if !self.config.general.enabled {
            return Err(GuildError::Disabled);
        }

        let not_found = || DismissError::NotFound {
            player: player_id.clone(),
            companion: companion_id.clone(),
        };

        let roster = self.rosters.get_mut(player_id).ok_or_else(not_found)?;
        let index = roster
            .iter()
            .position(|c| c.active && c.companion_id == *companion_id)
            .ok_or_else(not_found)?;
        if let Some(quest) = self
            .active_quests
            .iter()
            .find(|q| q.player_id == *player_id && q.includes(companion_id))
        {
            return Err(DismissError::OnQuest {
                companion: companion_id.clone(),
                quest: quest.quest_id.clone(),
            }
            .into());
        }
        let companion = roster.remove(index);

        let hire_cost = if let Some(template) = self.catalog.get(companion_id) {
            template.hire_cost
        } else {
            warn!(companion = %companion_id, "Dismissed companion has no catalog entry; paying minimum");
            0
        };
        let compensation =
            economy::dismissal_compensation(hire_cost, &companion, &self.config.compensation);

        if !self.pool.contains(companion_id) {
            self.pool.push(companion_id.clone());
        }

        GuildCounters::bump(&self.counters.dismissals);
        self.counters
            .compensation_paid
            .fetch_add(u64::try_from(compensation).unwrap_or(0), Ordering::Relaxed);
        self.mark_dirty();

        info!(
            player = %player_id,
            companion = %companion_id,
            compensation,
            "Companion dismissed"
        );

        Ok(compensation)
    }

    /// Dismiss on behalf of a [`Patron`], crediting the compensation.
    ///
    /// # Errors
    /// As [`GuildLedger::dismiss`].
    pub fn dismiss_for<P: Patron + ?Sized>(
        &mut self,
        patron: &mut P,
        companion_id: &CompanionId,
    ) -> Result<i64> {
        let compensation = self.dismiss(&patron.id(), companion_id)?;
        patron.apply_gold(compensation);
        Ok(compensation)
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Change an active companion's relationship by `delta`.
    ///
    /// A silent no-op (unchanged values, no departure) when relationships
    /// are disabled. Reaching the departure threshold deactivates the
    /// companion and appends to the departure log.
    ///
    /// # Errors
    /// [`GuildError::CompanionNotFound`] when no active instance matches.
    pub fn update_relationship(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
        delta: i32,
    ) -> Result<RelationshipChange> {
        let now = self.clock.now();
        self.change_relationship(player_id, companion_id, delta, now)
    }

    /// Spend time with a companion (`relationship.interaction_bonus`).
    ///
    /// # Errors
    /// As [`GuildLedger::update_relationship`].
    pub fn interact(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
    ) -> Result<RelationshipChange> {
        let bonus = self.config.relationship.interaction_bonus;
        self.update_relationship(player_id, companion_id, bonus)
    }

    /// Give a gift worth `value` relationship points.
    ///
    /// # Errors
    /// As [`GuildLedger::update_relationship`].
    pub fn give_gift(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
        value: i32,
    ) -> Result<RelationshipChange> {
        debug!(player = %player_id, companion = %companion_id, value, "Gift given");
        self.update_relationship(player_id, companion_id, value)
    }

    fn change_relationship(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
        delta: i32,
        now: Timestamp,
    ) -> Result<RelationshipChange> {
        let enabled = self.relationships_enabled();
        let threshold = self.config.relationship.departure_threshold;

        let companion = find_active_mut(&mut self.rosters, player_id, companion_id).ok_or_else(
            || GuildError::CompanionNotFound {
                player: player_id.clone(),
                companion: companion_id.clone(),
            },
        )?;

        if !enabled {
            return Ok(RelationshipChange {
                previous: companion.relationship,
                current: companion.relationship,
                departure: None,
            });
        }

        let change = relationship::apply_delta(companion, delta, now, threshold);
        debug!(
            player = %player_id,
            companion = %companion_id,
            delta,
            relationship = change.current,
            "Relationship changed"
        );
        self.note_change(&change);
        Ok(change)
    }

    fn note_change(&mut self, change: &RelationshipChange) {
        GuildCounters::bump(&self.counters.relationship_updates);
        if let Some(record) = &change.departure {
            GuildCounters::bump(&self.counters.departures);
            warn!(
                player = %record.owner_id,
                companion = %record.companion_id,
                reason = %record.reason,
                "Companion departed"
            );
            self.departures.push(record.clone());
        }
        self.mark_dirty();
    }

    /// Apply natural relationship decay at `now` using the configured
    /// interval and amount, then advance quests. Returns the departures
    /// this call caused.
    pub fn tick(&mut self, now: Timestamp) -> Vec<DepartureRecord> {
        let interval = self.config.relationship.decay_interval_minutes;
        let amount = self.config.relationship.decay_amount;
        self.tick_with(now, interval, amount)
    }

    /// [`GuildLedger::tick`] with an explicit interval and amount.
    ///
    /// Every active companion idle for more than `interval_minutes` loses
    /// `amount` per whole interval elapsed, applied once with `now` as the
    /// new interaction time. Repeated calls at the same `now` are no-ops.
    pub fn tick_with(&mut self, now: Timestamp, interval_minutes: i64, amount: i32) -> Vec<DepartureRecord> {
        let departed = if self.relationships_enabled() {
            self.decay(now, interval_minutes, amount)
        } else {
            Vec::new()
        };
        if self.quests_enabled() {
            self.update_quests(now);
        }
        departed
    }

    fn decay(&mut self, now: Timestamp, interval_minutes: i64, amount: i32) -> Vec<DepartureRecord> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::DECAY_TICK).entered();
        let start = Instant::now();
        let threshold = self.config.relationship.departure_threshold;

        let mut changes = Vec::new();
        for roster in self.rosters.values_mut() {
            for companion in roster.iter_mut().filter(|c| c.active) {
                if let Some(delta) = relationship::pending_decay(companion, now, interval_minutes, amount) {
                    changes.push(relationship::apply_delta(companion, delta, now, threshold));
                }
            }
        }

        let mut departed = Vec::new();
        for change in &changes {
            self.note_change(change);
            if let Some(record) = &change.departure {
                departed.push(record.clone());
            }
        }

        let elapsed = start.elapsed();
        GuildCounters::bump(&self.counters.decay_ticks);
        self.counters
            .last_tick_us
            .store(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);

        debug!(
            decayed = changes.len(),
            departed = departed.len(),
            elapsed_us = elapsed.as_micros(),
            "Relationship decay tick"
        );

        departed
    }

    fn relationships_enabled(&self) -> bool {
        self.config.general.enabled && self.config.relationship.enabled
    }

    // ------------------------------------------------------------------
    // Missions
    // ------------------------------------------------------------------

    /// Fold a mission outcome into an active companion's record.
    ///
    /// Experience, level and success rate update unconditionally; the
    /// report's relationship delta goes through the shared relationship
    /// path and may trigger a departure.
    ///
    /// # Errors
    /// [`GuildError::CompanionNotFound`] when no active instance matches, or
    /// [`GuildError::Disabled`] when the guild is switched off.
    pub fn record_mission(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
        report: &MissionReport,
    ) -> Result<MissionResult> {
        if !self.config.general.enabled {
            return Err(GuildError::Disabled);
        }

        let now = self.clock.now();
        let companion = find_active_mut(&mut self.rosters, player_id, companion_id).ok_or_else(
            || GuildError::CompanionNotFound {
                player: player_id.clone(),
                companion: companion_id.clone(),
            },
        )?;
        let progress = missions::apply_mission(companion, report, &self.config.missions);
        GuildCounters::bump(&self.counters.missions_recorded);

        if progress.levels_gained > 0 {
            info!(
                player = %player_id,
                companion = %companion_id,
                level = companion.level,
                "Companion levelled up"
            );
        }

        let relationship =
            self.change_relationship(player_id, companion_id, report.relationship_delta, now)?;
        self.mark_dirty();

        Ok(MissionResult {
            progress,
            relationship,
        })
    }

    // ------------------------------------------------------------------
    // Trust
    // ------------------------------------------------------------------

    /// Change an active companion's trust by `delta`, clamped to 0–100.
    /// Returns the new trust.
    ///
    /// Trust never causes a departure. A silent no-op when relationships
    /// are disabled.
    ///
    /// # Errors
    /// [`GuildError::CompanionNotFound`] when no active instance matches.
    pub fn adjust_trust(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
        delta: i32,
    ) -> Result<i32> {
        let enabled = self.relationships_enabled();
        let companion = find_active_mut(&mut self.rosters, player_id, companion_id).ok_or_else(
            || GuildError::CompanionNotFound {
                player: player_id.clone(),
                companion: companion_id.clone(),
            },
        )?;
        if !enabled {
            return Ok(companion.trust);
        }

        companion.trust = relationship::clamp_relationship(companion.trust, delta);
        let trust = companion.trust;
        debug!(player = %player_id, companion = %companion_id, delta, trust, "Trust changed");
        self.mark_dirty();
        Ok(trust)
    }

    /// Raise trust by `amount`.
    ///
    /// # Errors
    /// As [`GuildLedger::adjust_trust`].
    pub fn increase_trust(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
        amount: u32,
    ) -> Result<i32> {
        let delta = i32::try_from(amount).unwrap_or(i32::MAX);
        self.adjust_trust(player_id, companion_id, delta)
    }

    /// Lower trust by `amount`.
    ///
    /// # Errors
    /// As [`GuildLedger::adjust_trust`].
    pub fn decrease_trust(
        &mut self,
        player_id: &PlayerId,
        companion_id: &CompanionId,
        amount: u32,
    ) -> Result<i32> {
        let delta = i32::try_from(amount).map_or(i32::MIN, |a| -a);
        self.adjust_trust(player_id, companion_id, delta)
    }

    // ------------------------------------------------------------------
    // Quests
    // ------------------------------------------------------------------

    /// Load (or reload) quest rows. Rows overwrite quests with the same id;
    /// quests already under way keep running.
    pub fn load_quests<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = QuestTemplate>,
    {
        let added = self.quest_catalog.load(rows);
        info!(quests = self.quest_catalog.len(), new = added, "Quest catalog loaded");
    }

    /// The loaded quest table.
    #[must_use]
    pub fn quest_catalog(&self) -> &QuestCatalog {
        &self.quest_catalog
    }

    /// A quest definition by id.
    #[must_use]
    pub fn quest(&self, quest_id: &QuestId) -> Option<&QuestTemplate> {
        self.quest_catalog.get(quest_id)
    }

    /// Quests on the board, in table order.
    #[must_use]
    pub fn available_quests(&self) -> Vec<&QuestTemplate> {
        self.quest_catalog.available().collect()
    }

    /// Available quests of the given type.
    #[must_use]
    pub fn quests_by_type(&self, quest_type: &str) -> Vec<&QuestTemplate> {
        self.quest_catalog
            .available()
            .filter(|q| q.quest_type.eq_ignore_ascii_case(quest_type))
            .collect()
    }

    /// Available quests of the given difficulty.
    #[must_use]
    pub fn quests_by_difficulty(&self, difficulty: QuestDifficulty) -> Vec<&QuestTemplate> {
        self.quest_catalog
            .available()
            .filter(|q| q.difficulty == difficulty)
            .collect()
    }

    /// Send a party of the player's active companions on a quest.
    ///
    /// The party must hold at least `required_companions` distinct members,
    /// each active in the player's roster, not already away and at or above
    /// the quest's `required_level`. Nothing is mutated on error.
    ///
    /// # Errors
    /// [`GuildError::Quest`] with the failing check, or
    /// [`GuildError::Disabled`] when the guild or quests are switched off.
    pub fn start_quest(
        &mut self,
        player_id: &PlayerId,
        quest_id: &QuestId,
        companions: &[CompanionId],
    ) -> Result<ActiveQuest> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::QUEST_START).entered();

        if !self.quests_enabled() {
            return Err(GuildError::Disabled);
        }

        let duration = match self.check_quest(player_id, quest_id, companions) {
            Ok(template) => template.duration(),
            Err(e) => {
                warn!(player = %player_id, quest = %quest_id, reason = %e, "Quest refused");
                return Err(e.into());
            }
        };

        let now = self.clock.now();
        let quest = ActiveQuest {
            quest_id: quest_id.clone(),
            player_id: player_id.clone(),
            companions: companions.to_vec(),
            started_at: now,
            ends_at: now + duration,
        };
        self.active_quests.push(quest.clone());

        GuildCounters::bump(&self.counters.quests_started);
        self.mark_dirty();

        info!(
            player = %player_id,
            quest = %quest_id,
            party = companions.len(),
            ends_at = %quest.ends_at,
            "Quest started"
        );

        Ok(quest)
    }

    fn check_quest(
        &self,
        player_id: &PlayerId,
        quest_id: &QuestId,
        companions: &[CompanionId],
    ) -> std::result::Result<&QuestTemplate, QuestError> {
        let template = self
            .quest_catalog
            .get(quest_id)
            .ok_or_else(|| QuestError::UnknownQuest(quest_id.clone()))?;
        if !template.available {
            return Err(QuestError::Unavailable(quest_id.clone()));
        }

        let mut running = 0u32;
        for quest in self.active_quests.iter().filter(|q| q.player_id == *player_id) {
            if quest.quest_id == *quest_id {
                return Err(QuestError::AlreadyActive(quest_id.clone()));
            }
            running += 1;
        }
        let limit = self.config.quests.max_active_per_player;
        if running >= limit {
            return Err(QuestError::TooManyActive { limit });
        }

        let mut seen = HashSet::new();
        for id in companions {
            if !seen.insert(id) {
                return Err(QuestError::DuplicateMember(id.clone()));
            }
        }
        let provided = u32::try_from(companions.len()).unwrap_or(u32::MAX);
        if provided < template.required_companions.max(1) {
            return Err(QuestError::PartyTooSmall {
                required: template.required_companions.max(1),
                provided,
            });
        }

        let roster = self.roster_for(player_id);
        for id in companions {
            let member = roster
                .iter()
                .find(|c| c.active && c.companion_id == *id)
                .ok_or_else(|| QuestError::NotInRoster(id.clone()))?;
            if let Some(quest) = self.quest_holding(player_id, id) {
                return Err(QuestError::Busy {
                    companion: id.clone(),
                    quest: quest.quest_id.clone(),
                });
            }
            if member.level < template.required_level {
                return Err(QuestError::LevelTooLow {
                    companion: id.clone(),
                    required: template.required_level,
                    level: member.level,
                });
            }
        }

        Ok(template)
    }

    /// Bring a finished quest home and pay out its rewards.
    ///
    /// Every party member still active gets a successful mission worth the
    /// quest's experience, `quests.relationship_reward` through the shared
    /// relationship path and `quests.trust_reward` trust. Members who
    /// departed while away get nothing. The gold reward is returned as a
    /// delta for the caller to apply.
    ///
    /// # Errors
    /// [`GuildError::Quest`] when the player is not running the quest, its
    /// definition is gone, or its duration has not elapsed; in every case
    /// the quest stays under way. [`GuildError::Disabled`] when the guild
    /// is switched off.
    pub fn complete_quest(&mut self, player_id: &PlayerId, quest_id: &QuestId) -> Result<QuestOutcome> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::QUEST_COMPLETE).entered();

        if !self.config.general.enabled {
            return Err(GuildError::Disabled);
        }

        let index = self
            .active_quests
            .iter()
            .position(|q| q.player_id == *player_id && q.quest_id == *quest_id)
            .ok_or_else(|| QuestError::NotStarted(quest_id.clone()))?;
        let template = self
            .quest_catalog
            .get(quest_id)
            .cloned()
            .ok_or_else(|| QuestError::UnknownQuest(quest_id.clone()))?;
        let now = self.clock.now();
        let quest = &self.active_quests[index];
        if !quest.is_finished(now) {
            // Progress is within 0–1, so the percentage fits.
            let percent = (quest.progress(now) * 100.0).floor() as u32;
            return Err(QuestError::NotFinished {
                quest: quest_id.clone(),
                percent,
            }
            .into());
        }
        let quest = self.active_quests.remove(index);

        let report = MissionReport {
            succeeded: true,
            experience: template.experience_reward,
            relationship_delta: self.config.quests.relationship_reward,
        };
        let trust_reward = self.config.quests.trust_reward;

        let mut rewarded = Vec::new();
        let mut levels_gained = Vec::new();
        for id in &quest.companions {
            if find_active_mut(&mut self.rosters, player_id, id).is_none() {
                debug!(player = %player_id, companion = %id, "Departed quest member skipped");
                continue;
            }
            let result = self.record_mission(player_id, id, &report)?;
            if !result.relationship.departed() {
                self.adjust_trust(player_id, id, trust_reward)?;
            }
            rewarded.push(id.clone());
            levels_gained.push(result.progress.levels_gained);
        }

        GuildCounters::bump(&self.counters.quests_completed);
        self.mark_dirty();

        info!(
            player = %player_id,
            quest = %quest_id,
            rewarded = rewarded.len(),
            gold = template.gold_reward,
            "Quest completed"
        );

        Ok(QuestOutcome {
            quest_id: quest_id.clone(),
            gold_delta: i64::from(template.gold_reward),
            item_rewards: template.item_rewards,
            experience_each: template.experience_reward,
            rewarded,
            levels_gained,
        })
    }

    /// Complete a quest for a [`Patron`], crediting the gold reward.
    ///
    /// # Errors
    /// As [`GuildLedger::complete_quest`]. The patron is untouched on error.
    pub fn complete_quest_for<P: Patron + ?Sized>(
        &mut self,
        patron: &mut P,
        quest_id: &QuestId,
    ) -> Result<QuestOutcome> {
        let outcome = self.complete_quest(&patron.id(), quest_id)?;
        patron.apply_gold(outcome.gold_delta);
        Ok(outcome)
    }

    /// Call a party home early. No rewards are paid and the members are
    /// free again at once.
    ///
    /// # Errors
    /// [`GuildError::Quest`] when the player is not running the quest, or
    /// [`GuildError::Disabled`] when the guild is switched off.
    pub fn cancel_quest(&mut self, player_id: &PlayerId, quest_id: &QuestId) -> Result<ActiveQuest> {
        if !self.config.general.enabled {
            return Err(GuildError::Disabled);
        }

        let index = self
            .active_quests
            .iter()
            .position(|q| q.player_id == *player_id && q.quest_id == *quest_id)
            .ok_or_else(|| QuestError::NotStarted(quest_id.clone()))?;
        let quest = self.active_quests.remove(index);
        self.mark_dirty();

        info!(player = %player_id, quest = %quest_id, "Quest cancelled");
        Ok(quest)
    }

    /// Fraction of a running quest's duration elapsed, within 0–1.
    #[must_use]
    pub fn quest_progress(&self, player_id: &PlayerId, quest_id: &QuestId) -> Option<f64> {
        let now = self.clock.now();
        self.active_quests
            .iter()
            .find(|q| q.player_id == *player_id && q.quest_id == *quest_id)
            .map(|q| q.progress(now))
    }

    /// Quests a player is running, oldest first.
    pub fn active_quests_for<'a>(&'a self, player_id: &'a PlayerId) -> impl Iterator<Item = &'a ActiveQuest> + 'a {
        self.active_quests.iter().filter(move |q| q.player_id == *player_id)
    }

    /// Every quest under way.
    #[must_use]
    pub fn active_quests(&self) -> &[ActiveQuest] {
        &self.active_quests
    }

    /// Whether `companion_id` is away on one of the player's quests.
    #[must_use]
    pub fn is_on_quest(&self, player_id: &PlayerId, companion_id: &CompanionId) -> bool {
        self.quest_holding(player_id, companion_id).is_some()
    }

    /// Drop quests whose whole party has departed and log the ones that
    /// are ready to complete.
    fn update_quests(&mut self, now: Timestamp) {
        let rosters = &self.rosters;
        let before = self.active_quests.len();
        self.active_quests.retain(|quest| {
            let anyone_left = quest.companions.iter().any(|id| {
                rosters
                    .get(&quest.player_id)
                    .is_some_and(|r| r.iter().any(|c| c.active && c.companion_id == *id))
            });
            if !anyone_left {
                warn!(
                    player = %quest.player_id,
                    quest = %quest.quest_id,
                    "Quest abandoned, whole party departed"
                );
            }
            anyone_left
        });
        if self.active_quests.len() != before {
            self.mark_dirty();
        }

        let ready = self.active_quests.iter().filter(|q| q.is_finished(now)).count();
        if ready > 0 {
            debug!(ready, running = self.active_quests.len(), "Quests ready to complete");
        }
    }

    fn quests_enabled(&self) -> bool {
        self.config.general.enabled && self.config.quests.enabled
    }

    fn quest_holding(&self, player_id: &PlayerId, companion_id: &CompanionId) -> Option<&ActiveQuest> {
        self.active_quests
            .iter()
            .find(|q| q.player_id == *player_id && q.includes(companion_id))
    }

    // ------------------------------------------------------------------
    // Upkeep
    // ------------------------------------------------------------------

    /// Upkeep a player owes per day for their active companions.
    #[must_use]
    pub fn total_daily_costs(&self, player_id: &PlayerId) -> i64 {
        economy::daily_upkeep(
            self.roster_for(player_id)
                .iter()
                .filter(|c| c.active)
                .filter_map(|c| self.catalog.get(&c.companion_id))
                .map(|t| t.daily_cost),
        )
    }

    /// Settle one day of upkeep for a player holding `gold`.
    ///
    /// When `gold` covers the day's total the receipt carries `-due` as the
    /// gold delta. Otherwise nothing is charged and every active companion
    /// loses `upkeep.unpaid_relationship_penalty` relationship (through the
    /// shared path, so departures can follow) and
    /// `upkeep.unpaid_trust_penalty` trust.
    ///
    /// # Errors
    /// [`GuildError::Disabled`] when the guild is switched off.
    pub fn pay_daily_costs(&mut self, player_id: &PlayerId, gold: i64) -> Result<UpkeepReceipt> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::UPKEEP).entered();

        if !self.config.general.enabled {
            return Err(GuildError::Disabled);
        }

        let due = if self.config.upkeep.enabled {
            self.total_daily_costs(player_id)
        } else {
            0
        };
        if due == 0 || gold >= due {
            debug!(player = %player_id, due, "Upkeep paid");
            return Ok(UpkeepReceipt {
                due,
                paid: true,
                gold_delta: -due,
                departures: Vec::new(),
            });
        }

        GuildCounters::bump(&self.counters.upkeep_missed);
        warn!(player = %player_id, due, gold, "Upkeep unpaid");

        let relationship_penalty = self.config.upkeep.unpaid_relationship_penalty;
        let trust_penalty = self.config.upkeep.unpaid_trust_penalty;
        let now = self.clock.now();
        let members: Vec<CompanionId> = self
            .roster_for(player_id)
            .iter()
            .filter(|c| c.active)
            .map(|c| c.companion_id.clone())
            .collect();

        let mut departures = Vec::new();
        for id in &members {
            self.adjust_trust(player_id, id, trust_penalty.saturating_neg())?;
            let change = self.change_relationship(player_id, id, relationship_penalty.saturating_neg(), now)?;
            if let Some(record) = change.departure {
                departures.push(record);
            }
        }

        Ok(UpkeepReceipt {
            due,
            paid: false,
            gold_delta: 0,
            departures,
        })
    }

    /// Settle a day of upkeep for a [`Patron`], charging it when it can pay.
    ///
    /// # Errors
    /// As [`GuildLedger::pay_daily_costs`].
    pub fn pay_daily_costs_for<P: Patron + ?Sized>(&mut self, patron: &mut P) -> Result<UpkeepReceipt> {
        let receipt = self.pay_daily_costs(&patron.id(), patron.gold())?;
        if receipt.gold_delta != 0 {
            patron.apply_gold(receipt.gold_delta);
        }
        Ok(receipt)
    }

    // ------------------------------------------------------------------
    // Reputation
    // ------------------------------------------------------------------

    /// A player's guild reputation (0 if never recorded).
    #[must_use]
    pub fn reputation(&self, player_id: &PlayerId) -> i64 {
        self.reputation.get(player_id).copied().unwrap_or(0)
    }

    /// Add (or with a negative amount, remove) reputation. Returns the new value.
    pub fn add_reputation(&mut self, player_id: &PlayerId, amount: i64) -> i64 {
        let entry = self.reputation.entry(player_id.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
        let value = *entry;
        self.mark_dirty();
        debug!(player = %player_id, amount, reputation = value, "Guild reputation changed");
        value
    }

    /// Roster capacity for a player of `level` with `reputation`.
    #[must_use]
    pub fn max_companion_limit(&self, level: u32, reputation: i64) -> u32 {
        economy::max_companion_limit(level, reputation, &self.config.roster)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Templates currently hireable, in pool order.
    #[must_use]
    pub fn available_companions(&self) -> Vec<&CompanionTemplate> {
        self.pool.iter().filter_map(|id| self.catalog.get(id)).collect()
    }

    /// Available templates of the given class.
    #[must_use]
    pub fn companions_by_class(&self, class: &str) -> Vec<&CompanionTemplate> {
        self.available_companions()
            .into_iter()
            .filter(|t| t.class.eq_ignore_ascii_case(class))
            .collect()
    }

    /// Available templates of the given rarity.
    #[must_use]
    pub fn companions_by_rarity(&self, rarity: &str) -> Vec<&CompanionTemplate> {
        self.available_companions()
            .into_iter()
            .filter(|t| t.rarity.eq_ignore_ascii_case(rarity))
            .collect()
    }

    /// Whether `companion_id` is in the availability pool.
    #[must_use]
    pub fn is_available(&self, companion_id: &CompanionId) -> bool {
        self.pool.contains(companion_id)
    }

    /// The availability pool, in listing order.
    #[must_use]
    pub fn availability_pool(&self) -> &[CompanionId] {
        &self.pool
    }

    /// All of a player's companions, active and departed, in hire order.
    #[must_use]
    pub fn roster_for(&self, player_id: &PlayerId) -> &[CompanionInstance] {
        self.rosters.get(player_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of active companions a player holds.
    #[must_use]
    pub fn companion_count(&self, player_id: &PlayerId) -> u32 {
        let count = self.roster_for(player_id).iter().filter(|c| c.active).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// A player's instance of `companion_id` (active first, else departed).
    #[must_use]
    pub fn companion(&self, player_id: &PlayerId, companion_id: &CompanionId) -> Option<&CompanionInstance> {
        let roster = self.roster_for(player_id);
        roster
            .iter()
            .find(|c| c.active && c.companion_id == *companion_id)
            .or_else(|| roster.iter().find(|c| c.companion_id == *companion_id))
    }

    /// Lifecycle state of `companion_id` from `player_id`'s point of view.
    ///
    /// `None` when the player never held it and it is not in the pool.
    #[must_use]
    pub fn state_of(&self, player_id: &PlayerId, companion_id: &CompanionId) -> Option<CompanionState> {
        match self.companion(player_id, companion_id) {
            Some(c) => Some(c.state()),
            None if self.is_available(companion_id) => Some(CompanionState::Available),
            None => None,
        }
    }

    /// The full departure log, oldest first.
    #[must_use]
    pub fn departures(&self) -> &[DepartureRecord] {
        &self.departures
    }

    /// Departures from one player's roster.
    pub fn departures_for<'a>(&'a self, player_id: &'a PlayerId) -> impl Iterator<Item = &'a DepartureRecord> + 'a {
        self.departures.iter().filter(move |d| d.owner_id == *player_id)
    }

    /// Shared handle to the ledger's counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<GuildCounters> {
        &self.counters
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GuildConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Copy out the mutable state.
    #[must_use]
    pub fn snapshot(&self) -> GuildSnapshot {
        GuildSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: self.clock.now(),
            rosters: self.rosters.clone(),
            availability_pool: self.pool.clone(),
            reputation: self.reputation.clone(),
            departures: self.departures.clone(),
            active_quests: self.active_quests.clone(),
        }
    }

    /// Replace the mutable state with `snapshot`, keeping the catalogs.
    ///
    /// Pool ids without a catalog entry, ids already held by a roster
    /// (active or departed) and repeated ids are dropped with a warning, so
    /// the pool never offers a companion someone already has. Quests whose
    /// members are missing from their owner's roster are dropped too.
    pub fn restore(&mut self, snapshot: GuildSnapshot) {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::PERSIST_LOAD).entered();

        let GuildSnapshot {
            rosters,
            availability_pool,
            reputation,
            departures,
            active_quests,
            ..
        } = snapshot;

        let held: HashSet<&CompanionId> = rosters.values().flatten().map(|c| &c.companion_id).collect();
        let mut pool: Vec<CompanionId> = Vec::with_capacity(availability_pool.len());
        for id in availability_pool {
            if !self.catalog.contains(&id) {
                warn!(companion = %id, "Dropping pool entry missing from catalog");
            } else if held.contains(&id) {
                warn!(companion = %id, "Dropping pool entry already held by a roster");
            } else if pool.contains(&id) {
                warn!(companion = %id, "Dropping repeated pool entry");
            } else {
                pool.push(id);
            }
        }

        let (active_quests, orphaned): (Vec<ActiveQuest>, Vec<ActiveQuest>) =
            active_quests.into_iter().partition(|quest| {
                let roster = rosters.get(&quest.player_id).map(Vec::as_slice).unwrap_or(&[]);
                quest
                    .companions
                    .iter()
                    .all(|id| roster.iter().any(|c| c.companion_id == *id))
            });
        for quest in &orphaned {
            warn!(player = %quest.player_id, quest = %quest.quest_id, "Dropping quest with unknown party members");
        }

        self.pool = pool;
        self.rosters = rosters;
        self.reputation = reputation;
        self.departures = departures;
        self.active_quests = active_quests;
        self.dirty = false;

        info!(
            players = self.rosters.len(),
            available = self.pool.len(),
            departures = self.departures.len(),
            quests = self.active_quests.len(),
            "Guild state restored"
        );
    }

    /// Whether state changed since the last call, clearing the flag.
    ///
    /// Only ever true when `persistence.auto_save` is enabled.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn mark_dirty(&mut self) {
        if self.config.persistence.auto_save {
            self.dirty = true;
        }
    }

    /// Whether `companion_id` is held by an active roster entry or has departed.
    fn is_held(&self, companion_id: &CompanionId) -> bool {
        self.rosters
            .values()
            .flatten()
            .any(|c| c.companion_id == *companion_id)
    }
}

fn find_active_mut<'a>(
    rosters: &'a mut BTreeMap<PlayerId, Vec<CompanionInstance>>,
    player_id: &PlayerId,
    companion_id: &CompanionId,
) -> Option<&'a mut CompanionInstance> {
    rosters
        .get_mut(player_id)?
        .iter_mut()
        .find(|c| c.active && c.companion_id == *companion_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().expect("valid date")
    }

    fn template(id: &str, cost: u32, reputation: u32, relationship: i32) -> CompanionTemplate {
        let mut t = CompanionTemplate::new(id, cost);
        t.required_reputation = reputation;
        t.base_relationship = relationship;
        t
    }

    fn ledger() -> (GuildLedger, ManualClock) {
        let clock = ManualClock::new(start());
        let mut ledger = GuildLedger::new(GuildConfig::default(), clock.clone());
        ledger.load_catalog([template("C1", 500, 0, 50)]);
        (ledger, clock)
    }

    fn request(gold: i64, level: u32, reputation: i64, companion: &str) -> HireRequest {
        HireRequest {
            player_id: PlayerId::new("p1"),
            gold,
            level,
            reputation,
            companion_id: CompanionId::new(companion),
        }
    }

    fn p1() -> PlayerId {
        PlayerId::new("p1")
    }

    fn c1() -> CompanionId {
        CompanionId::new("C1")
    }

    #[test]
    fn hire_succeeds_and_leaves_pool() {
        let (mut ledger, _) = ledger();

        let receipt = ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        assert_eq!(receipt.companion.relationship, 50);
        assert_eq!(receipt.gold_delta, -500);
        assert!(!ledger.is_available(&c1()));
        assert_eq!(ledger.companion_count(&p1()), 1);
        assert_eq!(ledger.roster_for(&p1())[0].hire_time, start());
    }

    #[test]
    fn hire_insufficient_funds_mutates_nothing() {
        let (mut ledger, _) = ledger();

        let err = ledger.hire(&request(400, 1, 0, "C1")).expect_err("too poor");

        assert!(matches!(
            err,
            GuildError::Hire(HireError::InsufficientFunds { cost: 500, available: 400 })
        ));
        assert!(ledger.is_available(&c1()));
        assert!(ledger.roster_for(&p1()).is_empty());
        assert_eq!(ledger.counters().snapshot().hire_rejections, 1);
    }

    #[test]
    fn hire_not_available_checked_first() {
        let (mut ledger, _) = ledger();
        // Also too poor, but availability wins.
        let err = ledger.hire(&request(0, 1, 0, "missing")).expect_err("not in pool");
        assert!(matches!(err, GuildError::Hire(HireError::NotAvailable(_))));
    }

    #[test]
    fn hire_roster_full_before_reputation() {
        let (mut ledger, _) = ledger();
        ledger.load_catalog([
            template("C2", 10, 0, 50),
            template("C3", 10, 500, 50),
        ]);
        ledger.hire(&request(10_000, 1, 0, "C1")).expect("first");
        ledger.hire(&request(10_000, 1, 0, "C2")).expect("second");

        let err = ledger.hire(&request(10_000, 1, 0, "C3")).expect_err("full");
        assert!(matches!(
            err,
            GuildError::Hire(HireError::RosterFull { limit: 2, current: 2 })
        ));
    }

    #[test]
    fn hire_insufficient_reputation() {
        let (mut ledger, _) = ledger();
        ledger.load_catalog([template("elite", 100, 200, 50)]);

        let err = ledger.hire(&request(1000, 1, 150, "elite")).expect_err("reputation");
        assert!(matches!(
            err,
            GuildError::Hire(HireError::InsufficientReputation { required: 200, current: 150 })
        ));
    }

    #[test]
    fn hire_disabled_guild() {
        let clock = ManualClock::new(start());
        let mut config = GuildConfig::default();
        config.general.enabled = false;
        let mut ledger = GuildLedger::new(config, clock);
        ledger.load_catalog([template("C1", 500, 0, 50)]);

        let err = ledger.hire(&request(1000, 1, 0, "C1")).expect_err("disabled");
        assert!(matches!(err, GuildError::Disabled));
        assert!(ledger.is_available(&c1()));
    }

    #[test]
    fn dismiss_pays_compensation_and_returns_to_pool() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        {
            let c = find_active_mut(&mut ledger.rosters, &p1(), &c1()).expect("active");
            c.relationship = 40;
            c.experience = 500;
            c.mission_count = 5;
        }

        let refund = ledger.dismiss(&p1(), &c1()).expect("dismiss");

        assert_eq!(refund, 127);
        assert!(ledger.is_available(&c1()));
        assert!(ledger.roster_for(&p1()).is_empty());
    }

    #[test]
    fn second_dismiss_is_not_found() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        ledger.dismiss(&p1(), &c1()).expect("first dismiss");

        let err = ledger.dismiss(&p1(), &c1()).expect_err("second dismiss");
        assert!(matches!(err, GuildError::Dismiss(DismissError::NotFound { .. })));
    }

    #[test]
    fn departure_at_zero_not_at_one() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        let change = ledger.update_relationship(&p1(), &c1(), -49).expect("update");
        assert_eq!(change.current, 1);
        assert!(!change.departed());
        assert!(ledger.departures().is_empty());

        let change = ledger.update_relationship(&p1(), &c1(), -1).expect("update");
        assert!(change.departed());
        assert_eq!(ledger.departures().len(), 1);
        assert_eq!(ledger.companion_count(&p1()), 0);
        assert_eq!(ledger.roster_for(&p1()).len(), 1);
        assert_eq!(ledger.state_of(&p1(), &c1()), Some(CompanionState::Departed));
    }

    #[test]
    fn departed_companion_cannot_be_updated_or_dismissed() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        ledger.update_relationship(&p1(), &c1(), -100).expect("depart");

        assert!(matches!(
            ledger.update_relationship(&p1(), &c1(), 10),
            Err(GuildError::CompanionNotFound { .. })
        ));
        assert!(ledger.dismiss(&p1(), &c1()).is_err());
        assert!(!ledger.is_available(&c1()));
    }

    #[test]
    fn relationship_disabled_is_silent_noop() {
        let clock = ManualClock::new(start());
        let mut config = GuildConfig::default();
        config.relationship.enabled = false;
        let mut ledger = GuildLedger::new(config, clock.clone());
        ledger.load_catalog([template("C1", 500, 0, 50)]);
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        let change = ledger.update_relationship(&p1(), &c1(), -100).expect("no-op");
        assert_eq!(change.current, 50);
        assert!(!change.departed());

        clock.advance_minutes(10_000);
        assert!(ledger.tick(clock.now()).is_empty());
        assert_eq!(ledger.roster_for(&p1())[0].relationship, 50);
    }

    #[test]
    fn tick_decays_once_per_call() {
        let (mut ledger, clock) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        clock.advance_minutes(300);
        let now = clock.now();
        ledger.tick_with(now, 120, 1);
        assert_eq!(ledger.roster_for(&p1())[0].relationship, 48);

        ledger.tick_with(now, 120, 1);
        assert_eq!(ledger.roster_for(&p1())[0].relationship, 48);
        assert_eq!(ledger.roster_for(&p1())[0].last_interaction_time, now);
    }

    #[test]
    fn tick_reports_departures() {
        let (mut ledger, clock) = ledger();
        ledger.load_catalog([template("fragile", 10, 0, 2)]);
        ledger.hire(&request(1000, 1, 0, "fragile")).expect("hire");

        clock.advance_minutes(241);
        let departed = ledger.tick(clock.now());

        assert_eq!(departed.len(), 1);
        assert_eq!(departed[0].companion_id, CompanionId::new("fragile"));
        assert_eq!(ledger.departures().len(), 1);
    }

    #[test]
    fn reload_does_not_readd_held_ids() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        ledger.load_catalog([template("C1", 600, 0, 50), template("C2", 10, 0, 50)]);

        assert!(!ledger.is_available(&c1()));
        assert!(ledger.is_available(&CompanionId::new("C2")));
        assert_eq!(ledger.catalog().get(&c1()).map(|t| t.hire_cost), Some(600));
    }

    #[test]
    fn interaction_and_gift_raise_relationship() {
        let (mut ledger, clock) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        clock.advance_minutes(5);
        ledger.interact(&p1(), &c1()).expect("interact");
        ledger.give_gift(&p1(), &c1(), 10).expect("gift");

        let c = ledger.companion(&p1(), &c1()).expect("companion");
        assert_eq!(c.relationship, 61);
        assert_eq!(c.last_interaction_time, start() + Duration::minutes(5));
    }

    #[test]
    fn mission_updates_record_and_relationship() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        let result = ledger
            .record_mission(
                &p1(),
                &c1(),
                &MissionReport {
                    succeeded: true,
                    experience: 1500,
                    relationship_delta: 5,
                },
            )
            .expect("mission");

        assert_eq!(result.progress.levels_gained, 1);
        assert_eq!(result.relationship.current, 55);
        let c = ledger.companion(&p1(), &c1()).expect("companion");
        assert_eq!(c.mission_count, 1);
        assert_eq!(c.level, 2);
    }

    #[test]
    fn reputation_accumulates() {
        let (mut ledger, _) = ledger();
        assert_eq!(ledger.reputation(&p1()), 0);
        ledger.add_reputation(&p1(), 150);
        assert_eq!(ledger.add_reputation(&p1(), 100), 250);
        assert_eq!(ledger.max_companion_limit(30, ledger.reputation(&p1())), 6);
    }

    #[test]
    fn dirty_flag_tracks_mutations() {
        let (mut ledger, _) = ledger();
        assert!(ledger.take_dirty());
        assert!(!ledger.take_dirty());

        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        assert!(ledger.take_dirty());

        let _ = ledger.hire(&request(0, 1, 0, "C1"));
        assert!(!ledger.take_dirty());
    }

    #[test]
    fn filter_queries() {
        let clock = ManualClock::new(start());
        let mut ledger = GuildLedger::new(GuildConfig::default(), clock);
        let mut mage = template("mage", 10, 0, 50);
        mage.class = "Mage".to_string();
        mage.rarity = "Epic".to_string();
        let mut archer = template("archer", 10, 0, 50);
        archer.class = "Archer".to_string();
        archer.rarity = "Common".to_string();
        ledger.load_catalog([mage, archer]);

        assert_eq!(ledger.companions_by_class("mage").len(), 1);
        assert_eq!(ledger.companions_by_rarity("Common")[0].id.as_str(), "archer");
    }

    #[test]
    fn restore_drops_pool_ids_already_held() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        let mut snapshot = ledger.snapshot();
        snapshot.availability_pool.push(c1());
        snapshot.availability_pool.push(c1());
        ledger.restore(snapshot);

        assert!(!ledger.availability_pool().contains(&c1()));
        let mut other = request(1000, 1, 0, "C1");
        other.player_id = PlayerId::new("p2");
        let err = ledger.hire(&other).expect_err("already held");
        assert!(matches!(err, GuildError::Hire(HireError::NotAvailable(_))));
    }

    #[test]
    fn restore_drops_departed_ids_from_pool() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        ledger.update_relationship(&p1(), &c1(), -100).expect("update");

        let mut snapshot = ledger.snapshot();
        snapshot.availability_pool = vec![c1()];
        ledger.restore(snapshot);

        assert!(ledger.availability_pool().is_empty());
    }

    #[test]
    fn hire_unknown_template_checked_before_funds() {
        let (mut ledger, _) = ledger();
        let ghost = CompanionId::new("ghost");
        ledger.pool.push(ghost.clone());

        let err = ledger.hire(&request(0, 1, 0, "ghost")).expect_err("no template");

        assert!(matches!(err, GuildError::Hire(HireError::UnknownCompanion(ref id)) if *id == ghost));
        assert!(ledger.is_available(&ghost));
    }

    #[test]
    fn record_mission_refused_when_disabled() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        ledger.config.general.enabled = false;

        let report = MissionReport {
            succeeded: true,
            experience: 5000,
            relationship_delta: 5,
        };
        let err = ledger.record_mission(&p1(), &c1(), &report).expect_err("disabled");

        assert!(matches!(err, GuildError::Disabled));
        let c = ledger.companion(&p1(), &c1()).expect("companion");
        assert_eq!(c.level, 1);
        assert_eq!(c.mission_count, 0);
        assert_eq!(c.relationship, 50);
    }

    fn quest(id: &str, party: u32, level: u32, hours: f64) -> QuestTemplate {
        let mut q = QuestTemplate::new(id);
        q.required_companions = party;
        q.required_level = level;
        q.duration_hours = hours;
        q
    }

    fn party_ledger() -> (GuildLedger, ManualClock) {
        let (mut ledger, clock) = ledger();
        ledger.load_catalog([template("C2", 100, 0, 50)]);
        ledger.load_quests([quest("Q1", 2, 1, 2.0), quest("Q2", 1, 10, 1.0)]);
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire C1");
        ledger.hire(&request(1000, 1, 0, "C2")).expect("hire C2");
        (ledger, clock)
    }

    fn q1() -> QuestId {
        QuestId::new("Q1")
    }

    fn c2() -> CompanionId {
        CompanionId::new("C2")
    }

    #[test]
    fn quest_start_checks_party() {
        let (mut ledger, _) = party_ledger();

        let err = ledger.start_quest(&p1(), &q1(), &[c1()]).expect_err("too small");
        assert!(matches!(
            err,
            GuildError::Quest(QuestError::PartyTooSmall { required: 2, provided: 1 })
        ));

        let err = ledger.start_quest(&p1(), &q1(), &[c1(), c1()]).expect_err("duplicate");
        assert!(matches!(err, GuildError::Quest(QuestError::DuplicateMember(_))));

        let stranger = CompanionId::new("C9");
        let err = ledger.start_quest(&p1(), &q1(), &[c1(), stranger]).expect_err("not hired");
        assert!(matches!(err, GuildError::Quest(QuestError::NotInRoster(_))));

        let err = ledger
            .start_quest(&p1(), &QuestId::new("Q2"), &[c1()])
            .expect_err("level 1 < 10");
        assert!(matches!(
            err,
            GuildError::Quest(QuestError::LevelTooLow { required: 10, level: 1, .. })
        ));

        let err = ledger.start_quest(&p1(), &QuestId::new("nope"), &[c1()]).expect_err("unknown");
        assert!(matches!(err, GuildError::Quest(QuestError::UnknownQuest(_))));

        assert!(ledger.active_quests().is_empty());
        assert_eq!(ledger.counters().snapshot().quests_started, 0);
    }

    #[test]
    fn companions_on_quest_are_locked() {
        let (mut ledger, _) = party_ledger();
        ledger.start_quest(&p1(), &q1(), &[c1(), c2()]).expect("start");

        assert!(ledger.is_on_quest(&p1(), &c1()));
        let err = ledger.dismiss(&p1(), &c1()).expect_err("away");
        assert!(matches!(err, GuildError::Dismiss(DismissError::OnQuest { .. })));

        let err = ledger.start_quest(&p1(), &q1(), &[c1(), c2()]).expect_err("running");
        assert!(matches!(err, GuildError::Quest(QuestError::AlreadyActive(_))));

        ledger.load_quests([quest("Q3", 1, 1, 1.0)]);
        let err = ledger.start_quest(&p1(), &QuestId::new("Q3"), &[c2()]).expect_err("busy");
        assert!(matches!(err, GuildError::Quest(QuestError::Busy { .. })));
    }

    #[test]
    fn quest_completes_after_duration_with_rewards() {
        let (mut ledger, clock) = party_ledger();
        ledger.start_quest(&p1(), &q1(), &[c1(), c2()]).expect("start");

        clock.advance_minutes(30);
        let progress = ledger.quest_progress(&p1(), &q1()).expect("running");
        assert!((progress - 0.25).abs() < 1e-9);
        let err = ledger.complete_quest(&p1(), &q1()).expect_err("not yet");
        assert!(matches!(
            err,
            GuildError::Quest(QuestError::NotFinished { percent: 25, .. })
        ));

        clock.advance_minutes(90);
        let outcome = ledger.complete_quest(&p1(), &q1()).expect("complete");

        assert_eq!(outcome.gold_delta, 1000);
        assert_eq!(outcome.rewarded, vec![c1(), c2()]);
        assert_eq!(outcome.experience_each, 500);
        for id in [c1(), c2()] {
            let c = ledger.companion(&p1(), &id).expect("companion");
            assert_eq!(c.experience, 500);
            assert_eq!(c.mission_count, 1);
            assert_eq!(c.relationship, 52);
            assert_eq!(c.trust, 5);
        }
        assert!(!ledger.is_on_quest(&p1(), &c1()));
        assert!(ledger.quest_progress(&p1(), &q1()).is_none());
        let counters = ledger.counters().snapshot();
        assert_eq!(counters.quests_started, 1);
        assert_eq!(counters.quests_completed, 1);
        assert_eq!(counters.missions_recorded, 2);

        ledger.dismiss(&p1(), &c1()).expect("free again");
    }

    #[test]
    fn departed_member_gets_no_quest_reward() {
        let (mut ledger, clock) = party_ledger();
        ledger.start_quest(&p1(), &q1(), &[c1(), c2()]).expect("start");
        ledger.update_relationship(&p1(), &c2(), -100).expect("leave");

        clock.advance_minutes(120);
        let outcome = ledger.complete_quest(&p1(), &q1()).expect("complete");

        assert_eq!(outcome.rewarded, vec![c1()]);
        assert_eq!(ledger.companion(&p1(), &c2()).map(|c| c.experience), Some(0));
    }

    #[test]
    fn cancel_frees_party_without_rewards() {
        let (mut ledger, _) = party_ledger();
        ledger.start_quest(&p1(), &q1(), &[c1(), c2()]).expect("start");

        let cancelled = ledger.cancel_quest(&p1(), &q1()).expect("cancel");

        assert_eq!(cancelled.companions.len(), 2);
        assert!(!ledger.is_on_quest(&p1(), &c1()));
        assert_eq!(ledger.companion(&p1(), &c1()).map(|c| c.experience), Some(0));
        let err = ledger.cancel_quest(&p1(), &q1()).expect_err("gone");
        assert!(matches!(err, GuildError::Quest(QuestError::NotStarted(_))));
    }

    #[test]
    fn quest_limit_and_disabled_flag() {
        let (mut ledger, _) = party_ledger();
        ledger.config.quests.max_active_per_player = 1;
        ledger.load_quests([quest("Q3", 1, 1, 1.0)]);
        ledger.start_quest(&p1(), &QuestId::new("Q3"), &[c1()]).expect("start");

        let err = ledger.start_quest(&p1(), &q1(), &[c2()]).expect_err("limit");
        assert!(matches!(err, GuildError::Quest(QuestError::TooManyActive { limit: 1 })));

        ledger.config.quests.enabled = false;
        let err = ledger.start_quest(&p1(), &q1(), &[c2()]).expect_err("disabled");
        assert!(matches!(err, GuildError::Disabled));
    }

    #[test]
    fn tick_abandons_quest_when_whole_party_departs() {
        let (mut ledger, clock) = party_ledger();
        ledger.start_quest(&p1(), &q1(), &[c1(), c2()]).expect("start");
        ledger.update_relationship(&p1(), &c1(), -100).expect("leave");
        ledger.tick(clock.now());
        assert_eq!(ledger.active_quests().len(), 1);

        ledger.update_relationship(&p1(), &c2(), -100).expect("leave");
        ledger.tick(clock.now());
        assert!(ledger.active_quests().is_empty());
    }

    #[test]
    fn quest_queries_filter_board() {
        let (mut ledger, _) = party_ledger();
        let mut escort = quest("E1", 1, 1, 1.0);
        escort.quest_type = "Escort".to_string();
        escort.difficulty = QuestDifficulty::Hard;
        let mut hidden = quest("H1", 1, 1, 1.0);
        hidden.available = false;
        ledger.load_quests([escort, hidden]);

        assert_eq!(ledger.available_quests().len(), 3);
        assert_eq!(ledger.quests_by_type("escort")[0].id.as_str(), "E1");
        assert_eq!(ledger.quests_by_difficulty(QuestDifficulty::Hard).len(), 1);
        assert_eq!(ledger.quests_by_difficulty(QuestDifficulty::Normal).len(), 2);
        assert!(ledger.quest(&QuestId::new("H1")).is_some());
    }

    #[test]
    fn quests_survive_snapshot_restore() {
        let (mut ledger, _) = party_ledger();
        let started = ledger.start_quest(&p1(), &q1(), &[c1(), c2()]).expect("start");
        let snapshot = ledger.snapshot();

        ledger.cancel_quest(&p1(), &q1()).expect("cancel");
        ledger.restore(snapshot);

        assert_eq!(ledger.active_quests(), &[started]);
        assert!(ledger.is_on_quest(&p1(), &c2()));
    }

    #[test]
    fn trust_clamps_and_never_departs() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        assert_eq!(ledger.increase_trust(&p1(), &c1(), 30).expect("up"), 30);
        assert_eq!(ledger.increase_trust(&p1(), &c1(), u32::MAX).expect("up"), 100);
        assert_eq!(ledger.decrease_trust(&p1(), &c1(), 500).expect("down"), 0);
        assert_eq!(ledger.companion(&p1(), &c1()).map(|c| c.active), Some(true));

        ledger.config.relationship.enabled = false;
        assert_eq!(ledger.increase_trust(&p1(), &c1(), 10).expect("noop"), 0);
    }

    #[test]
    fn upkeep_paid_when_affordable() {
        let clock = ManualClock::new(start());
        let mut ledger = GuildLedger::new(GuildConfig::default(), clock);
        let mut t = template("C1", 100, 0, 50);
        t.daily_cost = 500;
        let mut u = template("C2", 100, 0, 50);
        u.daily_cost = 250;
        ledger.load_catalog([t, u]);
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        ledger.hire(&request(1000, 1, 0, "C2")).expect("hire");

        assert_eq!(ledger.total_daily_costs(&p1()), 750);
        let receipt = ledger.pay_daily_costs(&p1(), 750).expect("pay");
        assert!(receipt.paid);
        assert_eq!(receipt.gold_delta, -750);
        assert_eq!(ledger.companion(&p1(), &c1()).map(|c| c.relationship), Some(50));
    }

    #[test]
    fn unpaid_upkeep_penalises_companions() {
        let clock = ManualClock::new(start());
        let mut ledger = GuildLedger::new(GuildConfig::default(), clock);
        let mut t = template("C1", 100, 0, 50);
        t.daily_cost = 500;
        t.base_trust = 20;
        let mut low = template("C2", 100, 0, 5);
        low.daily_cost = 10;
        ledger.load_catalog([t, low]);
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");
        ledger.hire(&request(1000, 1, 0, "C2")).expect("hire");

        let receipt = ledger.pay_daily_costs(&p1(), 100).expect("settle");

        assert!(!receipt.paid);
        assert_eq!(receipt.due, 510);
        assert_eq!(receipt.gold_delta, 0);
        let c = ledger.companion(&p1(), &c1()).expect("companion");
        assert_eq!(c.relationship, 45);
        assert_eq!(c.trust, 15);
        assert_eq!(receipt.departures.len(), 1);
        assert_eq!(receipt.departures[0].companion_id, c2());
        assert_eq!(ledger.total_daily_costs(&p1()), 500);
        assert_eq!(ledger.counters().snapshot().upkeep_missed, 1);
    }

    #[test]
    fn upkeep_free_when_disabled_or_zero() {
        let (mut ledger, _) = ledger();
        ledger.hire(&request(1000, 1, 0, "C1")).expect("hire");

        let receipt = ledger.pay_daily_costs(&p1(), -50).expect("nothing due");
        assert!(receipt.paid);
        assert_eq!(receipt.gold_delta, 0);

        ledger.config.general.enabled = false;
        assert!(matches!(ledger.pay_daily_costs(&p1(), 0), Err(GuildError::Disabled)));
    }
}
