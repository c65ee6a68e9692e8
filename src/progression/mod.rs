//! Leveling, ranks, streaks and workout XP.

pub mod ledger;
pub mod level;
pub mod rank;
pub mod workout_xp;

pub use ledger::{LevelProgress, ProgressionLedger, ProgressionState, StreakChange, XpAward};
pub use level::LevelCurve;
pub use rank::{Rank, RankTable, RankTier};
pub use workout_xp::{compute_workout_xp, XpBreakdown};
