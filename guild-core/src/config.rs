//! Configuration for the adventurer guild ledger.
//!
//! Maps directly to `guild.toml`. Every field has a default, so an empty
//! file (or no file) yields the stock tuning.

use serde::{Deserialize, Serialize};

/// Top-level guild configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Relationship decay and departure tuning.
    #[serde(default)]
    pub relationship: RelationshipConfig,
    /// Roster capacity formula.
    #[serde(default)]
    pub roster: RosterConfig,
    /// Dismissal compensation weights.
    #[serde(default)]
    pub compensation: CompensationConfig,
    /// Mission bookkeeping.
    #[serde(default)]
    pub missions: MissionConfig,
    /// Group quest settings.
    #[serde(default)]
    pub quests: QuestConfig,
    /// Daily upkeep settings.
    #[serde(default)]
    pub upkeep: UpkeepConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl GuildConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `GuildError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::GuildError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the adventurer guild is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Relationship system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Whether relationships change at all. When off, updates and decay
    /// are silent no-ops.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minutes without interaction before one decay step applies.
    #[serde(default = "default_120")]
    pub decay_interval_minutes: i64,
    /// Relationship lost per elapsed interval.
    #[serde(default = "default_1")]
    pub decay_amount: i32,
    /// A companion departs once relationship is at or below this value.
    #[serde(default)]
    pub departure_threshold: i32,
    /// Relationship gained from a plain interaction.
    #[serde(default = "default_1")]
    pub interaction_bonus: i32,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_interval_minutes: 120,
            decay_amount: 1,
            departure_threshold: 0,
            interaction_bonus: 1,
        }
    }
}

/// Roster capacity: `base_limit + level / levels_per_bonus + reputation / reputation_per_bonus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Companions every player may hold.
    #[serde(default = "default_2")]
    pub base_limit: u32,
    /// Player levels per extra slot.
    #[serde(default = "default_15")]
    pub levels_per_bonus: u32,
    /// Reputation points per extra slot.
    #[serde(default = "default_100")]
    pub reputation_per_bonus: u32,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            base_limit: 2,
            levels_per_bonus: 15,
            reputation_per_bonus: 100,
        }
    }
}

/// Dismissal compensation weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationConfig {
    /// Bonus fraction per 1000 experience.
    #[serde(default = "default_0_3")]
    pub experience_weight: f64,
    /// Bonus fraction per 10 missions.
    #[serde(default = "default_0_2")]
    pub mission_weight: f64,
    /// Floor on any payout.
    #[serde(default = "default_1_i64")]
    pub minimum_payout: i64,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            experience_weight: 0.3,
            mission_weight: 0.2,
            minimum_payout: 1,
        }
    }
}

/// Mission bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfig {
    /// Experience needed per companion level.
    #[serde(default = "default_1000")]
    pub experience_per_level: u32,
    /// Hard level cap for companions.
    #[serde(default = "default_80")]
    pub max_level: u32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            experience_per_level: 1000,
            max_level: 80,
        }
    }
}

/// Group quest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestConfig {
    /// Whether quests can be started and progress in the tick.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Quests one player may run at once.
    #[serde(default = "default_3")]
    pub max_active_per_player: u32,
    /// Trust each surviving party member gains on completion.
    #[serde(default = "default_5")]
    pub trust_reward: i32,
    /// Relationship each surviving party member gains on completion.
    #[serde(default = "default_2_i32")]
    pub relationship_reward: i32,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_active_per_player: 3,
            trust_reward: 5,
            relationship_reward: 2,
        }
    }
}

/// Daily upkeep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpkeepConfig {
    /// Whether companions cost anything per day.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Relationship lost by every active companion when upkeep goes unpaid.
    #[serde(default = "default_5")]
    pub unpaid_relationship_penalty: i32,
    /// Trust lost by every active companion when upkeep goes unpaid.
    #[serde(default = "default_5")]
    pub unpaid_trust_penalty: i32,
}

impl Default for UpkeepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unpaid_relationship_penalty: 5,
            unpaid_trust_penalty: 5,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Flag the ledger dirty after every mutation so the host saves.
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Use WAL mode for the snapshot database.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Number of save backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            wal_mode: true,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_0_2() -> f64 { 0.2 }
fn default_0_3() -> f64 { 0.3 }
fn default_1() -> i32 { 1 }
fn default_1_i64() -> i64 { 1 }
fn default_2_i32() -> i32 { 2 }
fn default_5() -> i32 { 5 }
fn default_2() -> u32 { 2 }
fn default_3() -> u32 { 3 }
fn default_15() -> u32 { 15 }
fn default_80() -> u32 { 80 }
fn default_100() -> u32 { 100 }
fn default_120() -> i64 { 120 }
fn default_1000() -> u32 { 1000 }
