//! Runtime counters and tracing span names for the guild ledger.
//!
//! Counters are lock-free `AtomicU64`s bumped on the hot path and read on
//! dashboard export. The ledger holds them behind an `Arc` so the host can
//! keep a handle for its own metrics endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for guild events.
#[derive(Debug)]
pub struct GuildCounters {
    /// Successful hires.
    pub hires: AtomicU64,
    /// Hire requests refused by a precondition.
    pub hire_rejections: AtomicU64,
    /// Successful dismissals.
    pub dismissals: AtomicU64,
    /// Total gold paid out as dismissal compensation.
    pub compensation_paid: AtomicU64,
    /// Relationship changes applied (including decay).
    pub relationship_updates: AtomicU64,
    /// Companions that departed.
    pub departures: AtomicU64,
    /// Decay ticks run.
    pub decay_ticks: AtomicU64,
    /// Microseconds spent in the most recent decay tick.
    pub last_tick_us: AtomicU64,
    /// Mission reports recorded.
    pub missions_recorded: AtomicU64,
    /// Snapshot saves completed.
    pub saves_completed: AtomicU64,
    /// Quests started.
    pub quests_started: AtomicU64,
    /// Quests completed with rewards.
    pub quests_completed: AtomicU64,
    /// Days of upkeep that went unpaid.
    pub upkeep_missed: AtomicU64,
}

impl GuildCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hires: AtomicU64::new(0),
            hire_rejections: AtomicU64::new(0),
            dismissals: AtomicU64::new(0),
            compensation_paid: AtomicU64::new(0),
            relationship_updates: AtomicU64::new(0),
            departures: AtomicU64::new(0),
            decay_ticks: AtomicU64::new(0),
            last_tick_us: AtomicU64::new(0),
            missions_recorded: AtomicU64::new(0),
            saves_completed: AtomicU64::new(0),
            quests_started: AtomicU64::new(0),
            quests_completed: AtomicU64::new(0),
            upkeep_missed: AtomicU64::new(0),
        }
    }

    /// Increment a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hires: self.hires.load(Ordering::Relaxed),
            hire_rejections: self.hire_rejections.load(Ordering::Relaxed),
            dismissals: self.dismissals.load(Ordering::Relaxed),
            compensation_paid: self.compensation_paid.load(Ordering::Relaxed),
            relationship_updates: self.relationship_updates.load(Ordering::Relaxed),
            departures: self.departures.load(Ordering::Relaxed),
            decay_ticks: self.decay_ticks.load(Ordering::Relaxed),
            last_tick_us: self.last_tick_us.load(Ordering::Relaxed),
            missions_recorded: self.missions_recorded.load(Ordering::Relaxed),
            saves_completed: self.saves_completed.load(Ordering::Relaxed),
            quests_started: self.quests_started.load(Ordering::Relaxed),
            quests_completed: self.quests_completed.load(Ordering::Relaxed),
            upkeep_missed: self.upkeep_missed.load(Ordering::Relaxed),
        }
    }
}

impl Default for GuildCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Successful hires.
    pub hires: u64,
    /// Refused hires.
    pub hire_rejections: u64,
    /// Successful dismissals.
    pub dismissals: u64,
    /// Gold paid as compensation.
    pub compensation_paid: u64,
    /// Relationship changes applied.
    pub relationship_updates: u64,
    /// Departures.
    pub departures: u64,
    /// Decay ticks run.
    pub decay_ticks: u64,
    /// Duration of the last tick in microseconds.
    pub last_tick_us: u64,
    /// Mission reports recorded.
    pub missions_recorded: u64,
    /// Snapshot saves completed.
    pub saves_completed: u64,
    /// Quests started.
    pub quests_started: u64,
    /// Quests completed.
    pub quests_completed: u64,
    /// Unpaid upkeep days.
    pub upkeep_missed: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP guild_hires_total Companions hired\n\
             # TYPE guild_hires_total counter\n\
             guild_hires_total {}\n\
             # HELP guild_hire_rejections_total Hire requests refused\n\
             # TYPE guild_hire_rejections_total counter\n\
             guild_hire_rejections_total {}\n\
             # HELP guild_dismissals_total Companions dismissed\n\
             # TYPE guild_dismissals_total counter\n\
             guild_dismissals_total {}\n\
             # HELP guild_compensation_paid_total Gold paid as dismissal compensation\n\
             # TYPE guild_compensation_paid_total counter\n\
             guild_compensation_paid_total {}\n\
             # HELP guild_relationship_updates_total Relationship changes applied\n\
             # TYPE guild_relationship_updates_total counter\n\
             guild_relationship_updates_total {}\n\
             # HELP guild_departures_total Companions departed over low relationship\n\
             # TYPE guild_departures_total counter\n\
             guild_departures_total {}\n\
             # HELP guild_decay_ticks_total Decay ticks run\n\
             # TYPE guild_decay_ticks_total counter\n\
             guild_decay_ticks_total {}\n\
             # HELP guild_last_tick_microseconds Duration of the last decay tick\n\
             # TYPE guild_last_tick_microseconds gauge\n\
             guild_last_tick_microseconds {}\n\
             # HELP guild_missions_recorded_total Mission reports recorded\n\
             # TYPE guild_missions_recorded_total counter\n\
             guild_missions_recorded_total {}\n\
             # HELP guild_saves_completed_total Snapshot saves completed\n\
             # TYPE guild_saves_completed_total counter\n\
             guild_saves_completed_total {}\n\
             # HELP guild_quests_started_total Group quests started\n\
             # TYPE guild_quests_started_total counter\n\
             guild_quests_started_total {}\n\
             # HELP guild_quests_completed_total Group quests completed\n\
             # TYPE guild_quests_completed_total counter\n\
             guild_quests_completed_total {}\n\
             # HELP guild_upkeep_missed_total Days of companion upkeep left unpaid\n\
             # TYPE guild_upkeep_missed_total counter\n\
             guild_upkeep_missed_total {}\n",
            self.hires,
            self.hire_rejections,
            self.dismissals,
            self.compensation_paid,
            self.relationship_updates,
            self.departures,
            self.decay_ticks,
            self.last_tick_us,
            self.missions_recorded,
            self.saves_completed,
            self.quests_started,
            self.quests_completed,
            self.upkeep_missed,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// Catalog load.
    pub const CATALOG_LOAD: &str = "guild::catalog::load";
    /// Hire request.
    pub const HIRE: &str = "guild::hire";
    /// Dismissal.
    pub const DISMISS: &str = "guild::dismiss";
    /// Relationship decay tick.
    pub const DECAY_TICK: &str = "guild::decay";
    /// Snapshot save.
    pub const PERSIST_SAVE: &str = "guild::persist::save";
    /// Snapshot load.
    pub const PERSIST_LOAD: &str = "guild::persist::load";
    /// Quest start.
    pub const QUEST_START: &str = "guild::quest::start";
    /// Quest completion.
    pub const QUEST_COMPLETE: &str = "guild::quest::complete";
    /// Daily upkeep payment.
    pub const UPKEEP: &str = "guild::upkeep";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
