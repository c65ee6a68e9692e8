//! XP breakdown for a submitted workout

use crate::config::WorkoutXpConfig;
use crate::exercise::ExerciseCanonicalizer;
use crate::workout::WorkoutEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpBreakdown {
    pub base: u64,
    pub volume_bonus: u64,
    pub compound_bonus: u64,
    pub pr_bonus: u64,
    pub total: u64,
    pub total_volume: f64,
    pub big_three_sets: u32,
}

/// Aggregate a workout into XP. Warm-up sets count toward nothing; bodyweight
/// sets count as zero volume.
pub fn compute_workout_xp(
    config: &WorkoutXpConfig,
    canonicalizer: &ExerciseCanonicalizer,
    event: &WorkoutEvent,
    pr_count: u32,
) -> XpBreakdown {
    let total_volume = event.total_volume();
    let tiers = if config.volume_unit > 0.0 && total_volume.is_finite() {
        (total_volume / config.volume_unit).floor() as u64
    } else {
        0
    };

    let big_three_sets = event
        .working_sets()
        .filter(|s| s.reps > 0)
        .filter(|s| canonicalizer.is_big_three(&canonicalizer.resolve(&s.exercise)))
        .count() as u32;

    let base = config.base_xp;
    let volume_bonus = tiers.saturating_mul(config.volume_tier_xp);
    let compound_bonus = (big_three_sets as u64).saturating_mul(config.big_three_set_xp);
    let pr_bonus = (pr_count as u64).saturating_mul(config.pr_xp);

    XpBreakdown {
        base,
        volume_bonus,
        compound_bonus,
        pr_bonus,
        total: base
            .saturating_add(volume_bonus)
            .saturating_add(compound_bonus)
            .saturating_add(pr_bonus),
        total_volume,
        big_three_sets,
    }
}
