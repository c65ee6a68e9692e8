//! Workout submissions as seen by the engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One logged set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    /// Exercise name or catalog id, as the user logged it
    pub exercise: String,
    /// Load in the user's unit; 0 for bodyweight
    #[serde(default)]
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub is_warmup: bool,
}

impl WorkoutSet {
    pub fn new(exercise: impl Into<String>, weight: f64, reps: u32) -> Self {
        Self {
            exercise: exercise.into(),
            weight,
            reps,
            is_warmup: false,
        }
    }

    pub fn warmup(exercise: impl Into<String>, weight: f64, reps: u32) -> Self {
        Self {
            is_warmup: true,
            ..Self::new(exercise, weight, reps)
        }
    }

    /// weight x reps, with bodyweight sets counting as zero
    pub fn volume(&self) -> f64 {
        if self.weight > 0.0 {
            self.weight * self.reps as f64
        } else {
            0.0
        }
    }
}

/// A completed workout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutEvent {
    /// Calendar day the workout counts toward for streaks
    pub performed_on: NaiveDate,
    pub performed_at: DateTime<Utc>,
    pub sets: Vec<WorkoutSet>,
    /// Personal records set in this workout (filled in on submission)
    #[serde(default)]
    pub pr_count: u32,
    /// Streak after this workout (filled in on submission)
    #[serde(default)]
    pub current_streak: u32,
}

impl WorkoutEvent {
    pub fn new(performed_at: DateTime<Utc>, sets: Vec<WorkoutSet>) -> Self {
        Self {
            performed_on: performed_at.date_naive(),
            performed_at,
            sets,
            pr_count: 0,
            current_streak: 0,
        }
    }

    pub fn working_sets(&self) -> impl Iterator<Item = &WorkoutSet> {
        self.sets.iter().filter(|s| !s.is_warmup)
    }

    pub fn total_volume(&self) -> f64 {
        self.working_sets().map(WorkoutSet::volume).sum()
    }

    pub fn total_reps(&self) -> u64 {
        self.working_sets().map(|s| s.reps as u64).sum()
    }
}
