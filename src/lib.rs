//! GymQuest Progression & Challenge Engine
//!
//! Turns logged workouts into XP, levels, ranks, streaks and personal
//! records, and runs time-boxed "dungeon" challenges on top of them.
//!
//! ## Module Structure
//!
//! - `exercise/`: exercise-name canonicalization
//! - `progression/`: XP, level curve, ranks, streaks, workout XP
//! - `records/`: personal-record detection and derived bests
//! - `challenge/`: dungeon catalog, spawning and lifecycle
//! - `storage/`: persistence (in-memory and SQLite)
//! - `engine`: the façade tying everything to a store and a clock

/// Shared utilities (clock)
pub mod util;

/// Error types
pub mod error;

/// Engine configuration
pub mod config;

/// Workout submissions
pub mod workout;

/// Exercise canonicalization
pub mod exercise;

/// XP, levels, ranks and streaks
pub mod progression;

/// Personal records
pub mod records;

/// Dungeon challenges
pub mod challenge;

/// Data persistence layer
pub mod storage;

/// Engine façade
pub mod engine;

pub use challenge::{
    ChallengeCatalog, ChallengeDefinition, ChallengeInstance, ChallengeObjectiveDefinition,
    ChallengeSpawner, ChallengeStatus, ChallengeView, ObjectiveKind, StretchTier,
};
pub use config::{EngineConfig, ProgressionConfig, RecordConfig, SpawnConfig, WorkoutXpConfig};
pub use engine::{ClaimOutcome, ProgressionEngine, WorkoutOutcome};
pub use error::{EngineError, EngineResult, StorageError};
pub use exercise::{CanonicalExerciseGroup, ExerciseCanonicalizer, GroupId};
pub use progression::{
    LevelCurve, LevelProgress, ProgressionLedger, ProgressionState, Rank, RankTable, RankTier,
    StreakChange, XpAward, XpBreakdown,
};
pub use records::{count_record_sets, BestView, PersonalRecord, RecordDetector, RecordKind};
pub use storage::{MemoryStore, ProgressionStore, SqliteStore, StoreOps};
pub use util::clock::{Clock, ManualClock, SystemClock};
pub use workout::{WorkoutEvent, WorkoutSet};
