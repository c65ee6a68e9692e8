//! Engine Configuration
//!
//! Defines every tunable of the progression engine:
//! - Level curve and rank table
//! - Streak milestone bonuses
//! - Workout XP breakdown
//! - Personal-record weight bucketing
//! - Challenge spawning odds, caps and stretch bonuses
//!
//! All sections have defaults, so a config file only needs the keys it
//! overrides.

use crate::error::{EngineError, EngineResult};
use crate::progression::{LevelCurve, Rank, RankTable, RankTier};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub progression: ProgressionConfig,
    pub workout_xp: WorkoutXpConfig,
    pub records: RecordConfig,
    pub spawn: SpawnConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(raw)
            .map_err(|e| EngineError::Validation(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Validation(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check ranges and the rank table
    pub fn validate(&self) -> EngineResult<()> {
        self.progression.level_curve()?;
        self.progression.rank_table()?;

        if self.workout_xp.volume_unit <= 0.0 || !self.workout_xp.volume_unit.is_finite() {
            return Err(EngineError::Validation(
                "workout_xp.volume_unit must be positive".into(),
            ));
        }
        if self.records.weight_bucket <= 0.0 || !self.records.weight_bucket.is_finite() {
            return Err(EngineError::Validation(
                "records.weight_bucket must be positive".into(),
            ));
        }

        let spawn = &self.spawn;
        for (name, p) in [
            ("spawn.spawn_chance", spawn.spawn_chance),
            ("spawn.rare_gate_chance", spawn.rare_gate_chance),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(EngineError::Validation(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        if spawn.rare_gate_multiplier < 1.0 || !spawn.rare_gate_multiplier.is_finite() {
            return Err(EngineError::Validation(
                "spawn.rare_gate_multiplier must be >= 1.0".into(),
            ));
        }
        if spawn.max_concurrent == 0 {
            return Err(EngineError::Validation(
                "spawn.max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Leveling, ranks and streaks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// xp_required(L) = floor(level_base * L^level_exponent)
    pub level_base: f64,
    pub level_exponent: f64,
    pub rank_tiers: Vec<RankTier>,
    /// Bonus when a streak reaches a multiple of 7 days
    pub weekly_streak_bonus: u64,
    /// Bonus when a streak reaches 30 days
    pub monthly_streak_bonus: u64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            level_base: 100.0,
            level_exponent: 1.5,
            rank_tiers: vec![
                RankTier::new(Rank::E, 1, Some(5)),
                RankTier::new(Rank::D, 6, Some(10)),
                RankTier::new(Rank::C, 11, Some(20)),
                RankTier::new(Rank::B, 21, Some(35)),
                RankTier::new(Rank::A, 36, Some(50)),
                RankTier::new(Rank::S, 51, None),
            ],
            weekly_streak_bonus: 100,
            monthly_streak_bonus: 500,
        }
    }
}

impl ProgressionConfig {
    pub fn level_curve(&self) -> EngineResult<LevelCurve> {
        LevelCurve::new(self.level_base, self.level_exponent)
    }

    pub fn rank_table(&self) -> EngineResult<RankTable> {
        RankTable::new(self.rank_tiers.clone())
    }
}

/// XP breakdown for a submitted workout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutXpConfig {
    /// Flat reward for completing a workout
    pub base_xp: u64,
    /// Volume (weight x reps) per tier
    pub volume_unit: f64,
    pub volume_tier_xp: u64,
    /// Per non-warmup squat/bench/deadlift working set
    pub big_three_set_xp: u64,
    pub pr_xp: u64,
}

impl Default for WorkoutXpConfig {
    fn default() -> Self {
        Self {
            base_xp: 50,
            volume_unit: 1000.0,
            volume_tier_xp: 5,
            big_three_set_xp: 5,
            pr_xp: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Rep records are tracked per weight rounded to this bucket
    pub weight_bucket: f64,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self { weight_bucket: 2.5 }
    }
}

/// Challenge spawning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Hard cap on available + active instances per user
    pub max_concurrent: usize,
    /// Probability an unforced spawn attempt produces a challenge
    pub spawn_chance: f64,
    pub rare_gate_chance: f64,
    pub rare_gate_multiplier: f64,
    /// Reward bonus for a challenge one rank above the user
    pub stretch_bonus_pct: u32,
    /// Reward bonus for two or more ranks above the user
    pub very_stretch_bonus_pct: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            spawn_chance: 0.35,
            rare_gate_chance: 0.05,
            rare_gate_multiplier: 1.5,
            stretch_bonus_pct: 25,
            very_stretch_bonus_pct: 50,
        }
    }
}
