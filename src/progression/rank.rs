//! Ranks and the level → rank table

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse tier derived from level; also the difficulty of a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    E,
    D,
    C,
    B,
    A,
    S,
}

impl Rank {
    pub const ALL: [Rank; 6] = [Rank::E, Rank::D, Rank::C, Rank::B, Rank::A, Rank::S];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// How many tiers `self` sits above `other` (0 when not above)
    pub fn steps_above(self, other: Rank) -> u8 {
        self.ordinal().saturating_sub(other.ordinal())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::E => "E",
            Rank::D => "D",
            Rank::C => "C",
            Rank::B => "B",
            Rank::A => "A",
            Rank::S => "S",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" => Ok(Rank::E),
            "D" => Ok(Rank::D),
            "C" => Ok(Rank::C),
            "B" => Ok(Rank::B),
            "A" => Ok(Rank::A),
            "S" => Ok(Rank::S),
            other => Err(EngineError::Validation(format!("Unknown rank: {}", other))),
        }
    }
}

/// Inclusive level range mapped to a rank; `max_level = None` is unbounded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTier {
    pub rank: Rank,
    pub min_level: u32,
    #[serde(default)]
    pub max_level: Option<u32>,
}

impl RankTier {
    pub fn new(rank: Rank, min_level: u32, max_level: Option<u32>) -> Self {
        Self {
            rank,
            min_level,
            max_level,
        }
    }

    fn contains(&self, level: u32) -> bool {
        level >= self.min_level && self.max_level.map_or(true, |max| level <= max)
    }
}

/// Disjoint, ordered, gap-free rank table starting at level 1
#[derive(Debug, Clone)]
pub struct RankTable {
    tiers: Vec<RankTier>,
}

impl RankTable {
    pub fn new(tiers: Vec<RankTier>) -> EngineResult<Self> {
        let invalid = |msg: String| Err(EngineError::Validation(msg));

        let Some(first) = tiers.first() else {
            return invalid("Rank table is empty".into());
        };
        if first.min_level != 1 {
            return invalid(format!("First rank tier must start at level 1, got {}", first.min_level));
        }

        for (i, tier) in tiers.iter().enumerate() {
            let is_last = i + 1 == tiers.len();
            match (tier.max_level, is_last) {
                (None, false) => {
                    return invalid(format!("Only the last rank tier may be unbounded ({})", tier.rank))
                }
                (Some(_), true) => {
                    return invalid(format!("Last rank tier ({}) must be unbounded", tier.rank))
                }
                (Some(max), false) => {
                    if max < tier.min_level {
                        return invalid(format!("Rank tier {} has max below min", tier.rank));
                    }
                    let next = &tiers[i + 1];
                    if next.min_level != max + 1 {
                        return invalid(format!(
                            "Rank tiers {} and {} are not contiguous",
                            tier.rank, next.rank
                        ));
                    }
                    if next.rank <= tier.rank {
                        return invalid(format!(
                            "Rank tiers must be in increasing rank order ({} then {})",
                            tier.rank, next.rank
                        ));
                    }
                }
                (None, true) => {}
            }
        }

        Ok(Self { tiers })
    }

    pub fn rank_for_level(&self, level: u32) -> Rank {
        self.tiers
            .iter()
            .find(|t| t.contains(level))
            .or_else(|| self.tiers.first())
            .map(|t| t.rank)
            .unwrap_or(Rank::E)
    }

    pub fn tiers(&self) -> &[RankTier] {
        &self.tiers
    }
}

impl Default for RankTable {
    fn default() -> Self {
        Self {
            tiers: crate::config::ProgressionConfig::default().rank_tiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_boundaries() {
        let table = RankTable::default();
        assert_eq!(table.rank_for_level(1), Rank::E);
        assert_eq!(table.rank_for_level(5), Rank::E);
        assert_eq!(table.rank_for_level(6), Rank::D);
        assert_eq!(table.rank_for_level(10), Rank::D);
        assert_eq!(table.rank_for_level(11), Rank::C);
        assert_eq!(table.rank_for_level(50), Rank::A);
        assert_eq!(table.rank_for_level(51), Rank::S);
        assert_eq!(table.rank_for_level(9_999), Rank::S);
    }

    #[test]
    fn test_default_table_validates() {
        assert!(RankTable::new(RankTable::default().tiers).is_ok());
    }

    #[test]
    fn test_overlap_rejected() {
        let tiers = vec![
            RankTier::new(Rank::E, 1, Some(5)),
            RankTier::new(Rank::D, 5, None),
        ];
        assert!(RankTable::new(tiers).is_err());
    }

    #[test]
    fn test_bounded_last_tier_rejected() {
        let tiers = vec![
            RankTier::new(Rank::E, 1, Some(5)),
            RankTier::new(Rank::D, 6, Some(10)),
        ];
        assert!(RankTable::new(tiers).is_err());
    }

    #[test]
    fn test_steps_above() {
        assert_eq!(Rank::C.steps_above(Rank::E), 2);
        assert_eq!(Rank::E.steps_above(Rank::C), 0);
        assert_eq!("b".parse::<Rank>().unwrap(), Rank::B);
    }
}
