//! Group quests: multi-companion jobs that run over in-game time.
//!
//! A [`QuestTemplate`] is a static row like a companion template. Starting
//! one locks the selected companions into an [`ActiveQuest`] until its
//! duration has elapsed on the ledger's clock; the ledger then pays out
//! the rewards through the normal mission path.

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{GuildError, Result};
use crate::types::{CompanionId, PlayerId, QuestId, Timestamp};

/// Longest quest duration honoured, about a century of game time.
pub const MAX_QUEST_HOURS: f64 = 876_000.0;

/// How hard a quest is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuestDifficulty {
    /// Routine work.
    Easy,
    /// The default.
    #[default]
    Normal,
    /// Needs a seasoned party.
    Hard,
    /// Needs a strong party.
    Expert,
    /// The hardest jobs on the board.
    Master,
}

impl QuestDifficulty {
    /// Difficulty factor in the scale [`crate::missions::mission_success_chance`] takes.
    #[must_use]
    pub fn mission_difficulty(self) -> f32 {
        match self {
            Self::Easy => 0.6,
            Self::Normal => 1.0,
            Self::Hard => 1.4,
            Self::Expert => 1.8,
            Self::Master => 2.4,
        }
    }
}

/// A static quest definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestTemplate {
    /// Unique row id.
    pub id: QuestId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Flavour text.
    #[serde(default)]
    pub description: String,
    /// Quest type (Combat, Exploration, Gathering, Escort, Rescue).
    #[serde(default)]
    pub quest_type: String,
    /// Difficulty bucket.
    #[serde(default)]
    pub difficulty: QuestDifficulty,
    /// Level every party member must have reached.
    #[serde(default = "default_one")]
    pub required_level: u32,
    /// Minimum party size.
    #[serde(default = "default_one")]
    pub required_companions: u32,
    /// Gold paid to the player on completion.
    #[serde(default = "default_gold_reward")]
    pub gold_reward: u32,
    /// Experience each surviving member gains on completion.
    #[serde(default = "default_experience_reward")]
    pub experience_reward: u32,
    /// Item keys handed to the host on completion.
    #[serde(default)]
    pub item_rewards: Vec<String>,
    /// In-game hours from start to completion.
    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
    /// Whether the quest is currently on the board.
    #[serde(default = "default_true")]
    pub available: bool,
}

impl QuestTemplate {
    /// Build a template with stock rewards and a one-hour duration.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: QuestId::new(id),
            name: String::new(),
            description: String::new(),
            quest_type: String::new(),
            difficulty: QuestDifficulty::Normal,
            required_level: 1,
            required_companions: 1,
            gold_reward: default_gold_reward(),
            experience_reward: default_experience_reward(),
            item_rewards: Vec::new(),
            duration_hours: default_duration_hours(),
            available: true,
        }
    }

    /// Quest duration on the ledger clock, capped at [`MAX_QUEST_HOURS`].
    /// Negative or NaN hours count as zero.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.duration_hours.is_nan() || self.duration_hours <= 0.0 {
            return Duration::zero();
        }
        let millis = (self.duration_hours.min(MAX_QUEST_HOURS) * 3_600_000.0).round();
        Duration::milliseconds(millis as i64)
    }
}

fn default_one() -> u32 {
    1
}

fn default_gold_reward() -> u32 {
    1000
}

fn default_experience_reward() -> u32 {
    500
}

fn default_duration_hours() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Insertion-ordered quest table.
#[derive(Debug, Clone, Default)]
pub struct QuestCatalog {
    order: Vec<QuestId>,
    quests: HashMap<QuestId, QuestTemplate>,
}

impl QuestCatalog {
    /// Create an empty quest catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of quest rows.
    ///
    /// # Errors
    /// Returns [`GuildError::Serialization`] if the JSON is malformed or a
    /// row has no `id`.
    pub fn rows_from_json(json: &str) -> Result<Vec<QuestTemplate>> {
        serde_json::from_str(json).map_err(|e| GuildError::Serialization(e.to_string()))
    }

    /// Insert or overwrite quests. Returns how many rows were new ids.
    pub fn load<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = QuestTemplate>,
    {
        let mut added = 0;
        for row in rows {
            if !self.quests.contains_key(&row.id) {
                self.order.push(row.id.clone());
                added += 1;
            }
            self.quests.insert(row.id.clone(), row);
        }
        added
    }

    /// Look up a quest.
    #[must_use]
    pub fn get(&self, id: &QuestId) -> Option<&QuestTemplate> {
        self.quests.get(id)
    }

    /// Quests in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &QuestTemplate> {
        self.order.iter().filter_map(|id| self.quests.get(id))
    }

    /// Quests flagged `available`, in insertion order.
    pub fn available(&self) -> impl Iterator<Item = &QuestTemplate> {
        self.iter().filter(|q| q.available)
    }

    /// Number of quests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no quests are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A quest a player's party is currently on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveQuest {
    /// Quest being run.
    pub quest_id: QuestId,
    /// Player who sent the party.
    pub player_id: PlayerId,
    /// Party members, in selection order.
    pub companions: Vec<CompanionId>,
    /// When the party set out.
    pub started_at: Timestamp,
    /// When the quest can be completed.
    pub ends_at: Timestamp,
}

impl ActiveQuest {
    /// Fraction of the duration elapsed at `now`, within 0–1.
    #[must_use]
    pub fn progress(&self, now: Timestamp) -> f64 {
        let total = (self.ends_at - self.started_at).num_milliseconds();
        if total <= 0 {
            return 1.0;
        }
        let elapsed = (now - self.started_at).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Whether the quest can be completed at `now`.
    #[must_use]
    pub fn is_finished(&self, now: Timestamp) -> bool {
        now >= self.ends_at
    }

    /// Whether `companion_id` is in the party.
    #[must_use]
    pub fn includes(&self, companion_id: &CompanionId) -> bool {
        self.companions.contains(companion_id)
    }
}

/// What completing a quest paid out.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestOutcome {
    /// Completed quest.
    pub quest_id: QuestId,
    /// Gold for the caller to apply (`+gold_reward`).
    pub gold_delta: i64,
    /// Item keys for the host to grant.
    pub item_rewards: Vec<String>,
    /// Experience each surviving member received.
    pub experience_each: u32,
    /// Members still active at completion, who received rewards.
    pub rewarded: Vec<CompanionId>,
    /// Levels gained per rewarded member, in the same order.
    pub levels_gained: Vec<u32>,
}
