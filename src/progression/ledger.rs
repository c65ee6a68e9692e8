//! Progression Ledger
//!
//! XP, level, rank and streak bookkeeping for one user.
//!
//! `level` and `rank` on [`ProgressionState`] are caches of pure functions of
//! `total_xp`. Every mutation goes through [`ProgressionLedger::refresh`],
//! which recomputes both, so they can never drift from the XP total.

use super::level::LevelCurve;
use super::rank::{Rank, RankTable};
use crate::config::ProgressionConfig;
use crate::error::EngineResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-user progression record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub user_id: String,
    pub total_xp: u64,
    pub level: u32,
    pub rank: Rank,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub total_workouts: u64,
    pub total_volume: f64,
    pub total_prs: u64,
    pub updated_at: DateTime<Utc>,
}

impl ProgressionState {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            total_xp: 0,
            level: 1,
            rank: Rank::E,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            total_workouts: 0,
            total_volume: 0.0,
            total_prs: 0,
            updated_at: now,
        }
    }
}

/// How an activity date moved the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreakChange {
    /// Same day as the last activity
    Unchanged,
    /// First activity ever
    Started,
    /// Consecutive day
    Extended,
    /// Gap of two or more days
    Reset,
    /// Activity dated before the last one; streak left alone
    Backdated,
}

/// Result of one XP award
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpAward {
    pub xp_earned: u64,
    pub streak_bonus: u64,
    pub total_xp: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub leveled_up: bool,
    pub old_rank: Rank,
    pub new_rank: Rank,
    pub rank_changed: bool,
    pub current_streak: u32,
    pub streak_change: StreakChange,
}

/// Where a user stands inside their current level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub rank: Rank,
    pub xp_into_level: u64,
    pub xp_for_next: u64,
    pub percent: f64,
}

pub struct ProgressionLedger {
    curve: LevelCurve,
    ranks: RankTable,
    weekly_streak_bonus: u64,
    monthly_streak_bonus: u64,
}

impl ProgressionLedger {
    pub fn new(config: &ProgressionConfig) -> EngineResult<Self> {
        Ok(Self {
            curve: config.level_curve()?,
            ranks: config.rank_table()?,
            weekly_streak_bonus: config.weekly_streak_bonus,
            monthly_streak_bonus: config.monthly_streak_bonus,
        })
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    pub fn ranks(&self) -> &RankTable {
        &self.ranks
    }

    pub fn rank_for_level(&self, level: u32) -> Rank {
        self.ranks.rank_for_level(level)
    }

    /// Recompute the derived level and rank from `total_xp`
    pub fn refresh(&self, state: &mut ProgressionState) {
        state.level = self.curve.level_for_xp(state.total_xp);
        state.rank = self.ranks.rank_for_level(state.level);
    }

    /// Bonus XP for reaching `streak` days
    pub fn streak_milestone_bonus(&self, streak: u32) -> u64 {
        if streak == 30 {
            self.monthly_streak_bonus
        } else if streak > 0 && streak % 7 == 0 {
            self.weekly_streak_bonus
        } else {
            0
        }
    }

    /// Apply an activity date to the streak, returning the milestone bonus earned
    pub fn update_streak(&self, state: &mut ProgressionState, date: NaiveDate) -> (StreakChange, u64) {
        let change = match state.last_activity_date {
            None => {
                state.current_streak = 1;
                StreakChange::Started
            }
            Some(last) => match (date - last).num_days() {
                0 => StreakChange::Unchanged,
                1 => {
                    state.current_streak += 1;
                    StreakChange::Extended
                }
                d if d > 1 => {
                    state.current_streak = 1;
                    StreakChange::Reset
                }
                _ => StreakChange::Backdated,
            },
        };

        if matches!(change, StreakChange::Started | StreakChange::Extended | StreakChange::Reset) {
            state.last_activity_date = Some(date);
        }
        state.longest_streak = state.longest_streak.max(state.current_streak);

        let bonus = if change == StreakChange::Extended {
            self.streak_milestone_bonus(state.current_streak)
        } else {
            0
        };
        if bonus > 0 {
            debug!(
                "Streak milestone for {}: {} days, +{} XP",
                state.user_id, state.current_streak, bonus
            );
        }
        (change, bonus)
    }

    /// Credit XP for activity on `activity_date`.
    ///
    /// The streak is updated first so a milestone bonus joins the same
    /// level-up pass as the award itself.
    pub fn award_xp(
        &self,
        state: &mut ProgressionState,
        amount: u64,
        activity_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> XpAward {
        let old_level = state.level;
        let old_rank = state.rank;

        let (streak_change, streak_bonus) = self.update_streak(state, activity_date);
        state.total_xp = state
            .total_xp
            .saturating_add(amount)
            .saturating_add(streak_bonus);
        self.refresh(state);
        state.updated_at = now;

        let award = XpAward {
            xp_earned: amount,
            streak_bonus,
            total_xp: state.total_xp,
            old_level,
            new_level: state.level,
            leveled_up: state.level > old_level,
            old_rank,
            new_rank: state.rank,
            rank_changed: state.rank != old_rank,
            current_streak: state.current_streak,
            streak_change,
        };

        if award.leveled_up {
            info!(
                "User {} leveled up: {} -> {} ({} XP total)",
                state.user_id, old_level, state.level, state.total_xp
            );
        }
        if award.rank_changed {
            info!("User {} rank changed: {} -> {}", state.user_id, old_rank, state.rank);
        }
        award
    }

    pub fn level_progress(&self, state: &ProgressionState) -> LevelProgress {
        let level = self.curve.level_for_xp(state.total_xp);
        // Level 1 starts at zero XP rather than at xp_required(1)
        let floor = if level == 1 {
            0
        } else {
            self.curve.xp_required(level)
        };
        let next = self.curve.xp_required(level.saturating_add(1));
        let span = next.saturating_sub(floor);
        let into = state.total_xp.saturating_sub(floor);
        LevelProgress {
            level,
            rank: self.ranks.rank_for_level(level),
            xp_into_level: into,
            xp_for_next: next.saturating_sub(state.total_xp),
            percent: if span > 0 {
                (into as f64 / span as f64 * 100.0).min(100.0)
            } else {
                0.0
            },
        }
    }
}

impl Default for ProgressionLedger {
    fn default() -> Self {
        Self {
            curve: LevelCurve::default(),
            ranks: RankTable::default(),
            weekly_streak_bonus: 100,
            monthly_streak_bonus: 500,
        }
    }
}
