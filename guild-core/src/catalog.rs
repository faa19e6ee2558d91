//! Companion catalog: the static templates every hire is stamped from.
//!
//! Rows come from the host's data table (already parsed, or as JSON via
//! [`CompanionCatalog::rows_from_json`]). Loading a row whose id already
//! exists overwrites it in place, keeping its original position so that
//! availability listings stay stable across reloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GuildError, Result};
use crate::types::CompanionId;

/// A static catalog definition of a companion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionTemplate {
    /// Unique row id.
    pub id: CompanionId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Combat class (Warrior, Mage, Archer, Cleric, Rogue).
    #[serde(default)]
    pub class: String,
    /// Rarity bucket (Common, Rare, Epic, Legendary).
    #[serde(default)]
    pub rarity: String,
    /// Gold charged on hire.
    pub hire_cost: u32,
    /// Guild reputation needed to hire.
    #[serde(default)]
    pub required_reputation: u32,
    /// Relationship a fresh hire starts at (0–100).
    #[serde(default = "default_base_relationship")]
    pub base_relationship: i32,
    /// Starting level.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Whether the guild offers this companion at all.
    #[serde(default = "default_true")]
    pub available_for_hire: bool,
    /// Trust a fresh hire starts at (0–100).
    #[serde(default)]
    pub base_trust: i32,
    /// Upkeep owed per in-game day while the companion is hired.
    #[serde(default)]
    pub daily_cost: u32,
}

impl CompanionTemplate {
    /// Build a template with the given id and cost and stock defaults for
    /// everything else.
    #[must_use]
    pub fn new(id: impl Into<String>, hire_cost: u32) -> Self {
        Self {
            id: CompanionId::new(id),
            name: String::new(),
            class: String::new(),
            rarity: String::new(),
            hire_cost,
            required_reputation: 0,
            base_relationship: default_base_relationship(),
            level: default_level(),
            available_for_hire: true,
            base_trust: 0,
            daily_cost: 0,
        }
    }

    /// Base relationship clamped into the valid range.
    #[must_use]
    pub fn starting_relationship(&self) -> i32 {
        self.base_relationship.clamp(0, 100)
    }

    /// Base trust clamped into the valid range.
    #[must_use]
    pub fn starting_trust(&self) -> i32 {
        self.base_trust.clamp(0, 100)
    }
}

fn default_base_relationship() -> i32 {
    50
}

fn default_level() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Insertion-ordered template cache keyed by companion id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanionCatalog {
    order: Vec<CompanionId>,
    templates: HashMap<CompanionId, CompanionTemplate>,
}

impl CompanionCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of template rows.
    ///
    /// # Errors
    /// Returns [`GuildError::Serialization`] if the JSON is malformed or a
    /// required column (`id`, `hire_cost`) is missing.
    pub fn rows_from_json(json: &str) -> Result<Vec<CompanionTemplate>> {
        serde_json::from_str(json).map_err(|e| GuildError::Serialization(e.to_string()))
    }

    /// Insert or overwrite templates. Returns how many rows were new ids.
    pub fn load<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = CompanionTemplate>,
    {
        let mut added = 0;
        for row in rows {
            if !self.templates.contains_key(&row.id) {
                self.order.push(row.id.clone());
                added += 1;
            }
            self.templates.insert(row.id.clone(), row);
        }
        added
    }

    /// Look up a template.
    #[must_use]
    pub fn get(&self, id: &CompanionId) -> Option<&CompanionTemplate> {
        self.templates.get(id)
    }

    /// Whether a template exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &CompanionId) -> bool {
        self.templates.contains_key(id)
    }

    /// Templates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CompanionTemplate> {
        self.order.iter().filter_map(|id| self.templates.get(id))
    }

    /// Templates flagged `available_for_hire`, in insertion order.
    pub fn hireable(&self) -> impl Iterator<Item = &CompanionTemplate> {
        self.iter().filter(|t| t.available_for_hire)
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the catalog holds no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
