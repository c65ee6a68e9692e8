//! Challenge catalog templates

use crate::error::{EngineError, EngineResult};
use crate::progression::Rank;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What an objective counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    TotalReps,
    TotalVolume,
    TotalSets,
    CompoundLiftSets,
    WorkoutCount,
    ExerciseSpecificSets,
    PrCount,
    StreakMaintained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeObjectiveDefinition {
    pub id: String,
    pub kind: ObjectiveKind,
    pub target: f64,
    /// Required for `ExerciseSpecificSets`; any alias of the lift works
    #[serde(default)]
    pub target_exercise: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Extra XP for completing an optional objective
    #[serde(default)]
    pub bonus_reward: u64,
    #[serde(default)]
    pub order: u32,
}

fn default_true() -> bool {
    true
}

impl ChallengeObjectiveDefinition {
    pub fn required(id: &str, kind: ObjectiveKind, target: f64) -> Self {
        Self {
            id: id.to_string(),
            kind,
            target,
            target_exercise: None,
            required: true,
            bonus_reward: 0,
            order: 0,
        }
    }

    pub fn optional(id: &str, kind: ObjectiveKind, target: f64, bonus_reward: u64) -> Self {
        Self {
            required: false,
            bonus_reward,
            ..Self::required(id, kind, target)
        }
    }

    pub fn for_exercise(mut self, exercise: &str) -> Self {
        self.target_exercise = Some(exercise.to_string());
        self
    }

    pub fn at(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.target.is_finite() && self.target > 0.0) {
            return Err(EngineError::Validation(format!(
                "Objective {} target must be positive, got {}",
                self.id, self.target
            )));
        }
        if self.kind == ObjectiveKind::ExerciseSpecificSets
            && self
                .target_exercise
                .as_deref()
                .map_or(true, |e| e.trim().is_empty())
        {
            return Err(EngineError::Validation(format!(
                "Objective {} needs a target exercise",
                self.id
            )));
        }
        Ok(())
    }
}

/// Longest window a challenge may stay open: one year
pub const MAX_DURATION_HOURS: u32 = 24 * 365;

/// A challenge template the spawner draws from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDefinition {
    pub id: String,
    pub name: String,
    pub rank: Rank,
    pub duration_hours: u32,
    pub base_reward: u64,
    pub spawn_weight: u32,
    pub min_level: u32,
    /// `None` means no upper bound
    #[serde(default)]
    pub max_level: Option<u32>,
    pub objectives: Vec<ChallengeObjectiveDefinition>,
    #[serde(default)]
    pub is_boss: bool,
    #[serde(default)]
    pub is_event: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ChallengeDefinition {
    pub fn eligible_at(&self, level: u32) -> bool {
        self.is_active
            && self.spawn_weight > 0
            && level >= self.min_level
            && self.max_level.map_or(true, |max| level <= max)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.duration_hours == 0 {
            return Err(EngineError::Validation(format!(
                "Challenge {} has zero duration",
                self.id
            )));
        }
        if self.duration_hours > MAX_DURATION_HOURS {
            return Err(EngineError::Validation(format!(
                "Challenge {} lasts {} hours, limit is {}",
                self.id, self.duration_hours, MAX_DURATION_HOURS
            )));
        }
        if let Some(max) = self.max_level {
            if max < self.min_level {
                return Err(EngineError::Validation(format!(
                    "Challenge {} has max_level below min_level",
                    self.id
                )));
            }
        }
        if !self.objectives.iter().any(|o| o.required) {
            return Err(EngineError::Validation(format!(
                "Challenge {} has no required objective",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for objective in &self.objectives {
            objective.validate()?;
            if !seen.insert(objective.id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "Challenge {} repeats objective id {}",
                    self.id, objective.id
                )));
            }
        }
        Ok(())
    }
}

/// Validated set of challenge definitions
#[derive(Debug, Clone, Default)]
pub struct ChallengeCatalog {
    definitions: Vec<ChallengeDefinition>,
}

impl ChallengeCatalog {
    pub fn new(definitions: Vec<ChallengeDefinition>) -> EngineResult<Self> {
        let mut ids = HashSet::new();
        for def in &definitions {
            def.validate()?;
            if !ids.insert(def.id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "Duplicate challenge id {}",
                    def.id
                )));
            }
        }
        Ok(Self { definitions })
    }

    pub fn from_json(raw: &str) -> EngineResult<Self> {
        let definitions: Vec<ChallengeDefinition> = serde_json::from_str(raw)
            .map_err(|e| EngineError::Validation(format!("Invalid challenge catalog: {}", e)))?;
        Self::new(definitions)
    }

    pub fn get(&self, id: &str) -> Option<&ChallengeDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn eligible(&self, level: u32) -> Vec<&ChallengeDefinition> {
        self.definitions.iter().filter(|d| d.eligible_at(level)).collect()
    }

    pub fn definitions(&self) -> &[ChallengeDefinition] {
        &self.definitions
    }
}
