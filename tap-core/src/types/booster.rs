//! Booster types
//!
//! Boosters are permanent upgrades. The set of kinds is closed; levels are
//! persisted as a serialized `{kind: level}` mapping and validated every time
//! they cross the store boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::constants::MAX_BOOSTER_LEVEL;
use crate::error::{GameError, GameResult};

/// Booster kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoosterKind {
    /// Raises max energy
    EnergyCapacity,
    /// Shortens energy regeneration
    EnergyRegen,
    /// Raises coins earned per tap
    CoinsPerTap,
}

impl BoosterKind {
    pub const ALL: [BoosterKind; 3] = [
        BoosterKind::EnergyCapacity,
        BoosterKind::EnergyRegen,
        BoosterKind::CoinsPerTap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BoosterKind::EnergyCapacity => "energyCapacity",
            BoosterKind::EnergyRegen => "energyRegen",
            BoosterKind::CoinsPerTap => "coinsPerTap",
        }
    }
}

impl std::fmt::Display for BoosterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoosterKind {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BoosterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GameError::InvalidState(format!("Unknown booster kind: {}", s)))
    }
}

/// Owned booster levels, one entry per kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<BoosterKind, u32>",
    into = "BTreeMap<BoosterKind, u32>"
)]
pub struct Boosters {
    levels: BTreeMap<BoosterKind, u32>,
}

impl Boosters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, kind: BoosterKind) -> u32 {
        self.levels.get(&kind).copied().unwrap_or(0)
    }

    /// Set a level, rejecting values above the cap
    pub fn set_level(&mut self, kind: BoosterKind, level: u32) -> GameResult<()> {
        if level > MAX_BOOSTER_LEVEL {
            return Err(GameError::InvalidState(format!(
                "Booster {} level {} exceeds max level {}",
                kind, level, MAX_BOOSTER_LEVEL
            )));
        }
        self.levels.insert(kind, level);
        Ok(())
    }

    /// Raise one kind by a single level
    pub fn increment(&mut self, kind: BoosterKind) -> GameResult<u32> {
        let current = self.level(kind);
        if current >= MAX_BOOSTER_LEVEL {
            return Err(GameError::MaxLevelReached {
                kind,
                max: MAX_BOOSTER_LEVEL,
            });
        }
        self.levels.insert(kind, current + 1);
        Ok(current + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BoosterKind, u32)> + '_ {
        BoosterKind::ALL.into_iter().map(|kind| (kind, self.level(kind)))
    }

    /// Parse the persisted mapping
    pub fn from_json(raw: &str) -> GameResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize to the persisted mapping
    pub fn to_json(&self) -> GameResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl TryFrom<BTreeMap<BoosterKind, u32>> for Boosters {
    type Error = GameError;

    fn try_from(levels: BTreeMap<BoosterKind, u32>) -> Result<Self, Self::Error> {
        let mut boosters = Boosters::new();
        for (kind, level) in levels {
            boosters.set_level(kind, level)?;
        }
        Ok(boosters)
    }
}

impl From<Boosters> for BTreeMap<BoosterKind, u32> {
    fn from(boosters: Boosters) -> Self {
        boosters.iter().collect()
    }
}
