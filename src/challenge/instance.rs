//! Challenge instances and their lifecycle
//!
//! ```text
//! available ──accept──> active ──all required done──> completed ──claim──> claimed
//!     │                   │
//!     └──── now > expires_at ────> expired      active ──abandon──> abandoned
//! ```
//!
//! Expiry is lazy. [`ChallengeInstance::effective_status`] reports an
//! overdue open instance as expired without touching it; the stored status
//! only changes through [`ChallengeInstance::expire_if_due`], which write
//! paths call before anything else.

use super::definition::{ChallengeDefinition, ChallengeObjectiveDefinition, ObjectiveKind};
use crate::error::{EngineError, EngineResult};
use crate::exercise::ExerciseCanonicalizer;
use crate::progression::Rank;
use crate::workout::WorkoutEvent;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Available,
    Active,
    Completed,
    Claimed,
    Expired,
    Abandoned,
}

impl ChallengeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeStatus::Available => "available",
            ChallengeStatus::Active => "active",
            ChallengeStatus::Completed => "completed",
            ChallengeStatus::Claimed => "claimed",
            ChallengeStatus::Expired => "expired",
            ChallengeStatus::Abandoned => "abandoned",
        }
    }

    /// Counts toward the concurrent-instance cap and can still expire
    pub fn is_open(self) -> bool {
        matches!(self, ChallengeStatus::Available | ChallengeStatus::Active)
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "claimed" => Ok(Self::Claimed),
            "expired" => Ok(Self::Expired),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(EngineError::Validation(format!(
                "Unknown challenge status: {}",
                other
            ))),
        }
    }
}

/// How far above the user's rank a challenge was spawned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StretchTier {
    #[default]
    None,
    Stretch,
    VeryStretch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveProgress {
    pub objective: ChallengeObjectiveDefinition,
    pub progress: f64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ObjectiveProgress {
    fn new(objective: ChallengeObjectiveDefinition) -> Self {
        Self {
            objective,
            progress: 0.0,
            completed: false,
            completed_at: None,
        }
    }

    /// Raise progress to `candidate` (capped at target). Returns true on change.
    fn raise_to(&mut self, candidate: f64, now: DateTime<Utc>) -> bool {
        let target = self.objective.target;
        let next = candidate.min(target);
        if next <= self.progress {
            return false;
        }
        self.progress = next;
        if !self.completed && self.progress >= target {
            self.completed = true;
            self.completed_at = Some(now);
        }
        true
    }
}

/// A challenge spawned for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeInstance {
    pub id: Uuid,
    pub user_id: String,
    pub definition_id: String,
    pub name: String,
    pub rank: Rank,
    pub is_boss: bool,
    pub status: ChallengeStatus,
    pub spawned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub base_reward: u64,
    pub earned_reward: Option<u64>,
    pub stretch: StretchTier,
    pub stretch_bonus_pct: u32,
    pub rare_gate: bool,
    pub rare_multiplier: f64,
    pub objectives: Vec<ObjectiveProgress>,
}

/// Read model with the lazily-expired status applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub instance: ChallengeInstance,
    pub effective_status: ChallengeStatus,
    /// Seconds until `expires_at`, zero once past
    pub seconds_remaining: i64,
}

impl ChallengeInstance {
    /// New `available` instance; the deadline is fixed here
    pub fn spawn(
        definition: &ChallengeDefinition,
        user_id: &str,
        now: DateTime<Utc>,
        stretch: StretchTier,
        stretch_bonus_pct: u32,
        rare_multiplier: Option<f64>,
    ) -> Self {
        let mut objectives: Vec<ObjectiveProgress> = definition
            .objectives
            .iter()
            .cloned()
            .map(ObjectiveProgress::new)
            .collect();
        objectives.sort_by_key(|o| o.objective.order);

        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            definition_id: definition.id.clone(),
            name: definition.name.clone(),
            rank: definition.rank,
            is_boss: definition.is_boss,
            status: ChallengeStatus::Available,
            spawned_at: now,
            accepted_at: None,
            expires_at: now
                .checked_add_signed(Duration::hours(definition.duration_hours as i64))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            completed_at: None,
            claimed_at: None,
            finished_at: None,
            base_reward: definition.base_reward,
            earned_reward: None,
            stretch,
            stretch_bonus_pct,
            rare_gate: rare_multiplier.is_some(),
            rare_multiplier: rare_multiplier.unwrap_or(1.0),
            objectives,
        }
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> ChallengeStatus {
        if self.status.is_open() && now > self.expires_at {
            ChallengeStatus::Expired
        } else {
            self.status
        }
    }

    /// Persistable expiry transition; false when nothing changed
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.effective_status(now) == ChallengeStatus::Expired && self.status.is_open() {
            info!("Challenge {} for {} expired", self.id, self.user_id);
            self.status = ChallengeStatus::Expired;
            self.finished_at = Some(now);
            return true;
        }
        false
    }

    pub fn view(&self, now: DateTime<Utc>) -> ChallengeView {
        ChallengeView {
            instance: self.clone(),
            effective_status: self.effective_status(now),
            seconds_remaining: (self.expires_at - now).num_seconds().max(0),
        }
    }

    fn require(&self, required: ChallengeStatus, now: DateTime<Utc>) -> EngineResult<()> {
        let current = self.effective_status(now);
        if current != required {
            return Err(EngineError::StateConflict {
                instance: self.id,
                current,
                required,
            });
        }
        Ok(())
    }

    /// `available -> active`. `other_active` is the user's currently active
    /// instance, if any. The deadline does not move.
    pub fn accept(&mut self, now: DateTime<Utc>, other_active: Option<Uuid>) -> EngineResult<()> {
        self.require(ChallengeStatus::Available, now)?;
        if let Some(active) = other_active.filter(|id| *id != self.id) {
            return Err(EngineError::AlreadyActive {
                user: self.user_id.clone(),
                active,
            });
        }
        self.status = ChallengeStatus::Active;
        self.accepted_at = Some(now);
        info!("Challenge {} accepted by {}", self.id, self.user_id);
        Ok(())
    }

    /// `active -> abandoned`; no reward, no penalty, not resumable
    pub fn abandon(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        self.require(ChallengeStatus::Active, now)?;
        self.status = ChallengeStatus::Abandoned;
        self.finished_at = Some(now);
        info!("Challenge {} abandoned by {}", self.id, self.user_id);
        Ok(())
    }

    /// Fold a workout into objective progress. Returns whether anything moved.
    pub fn record_progress(
        &mut self,
        event: &WorkoutEvent,
        canonicalizer: &ExerciseCanonicalizer,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        self.require(ChallengeStatus::Active, now)?;

        let mut changed = false;
        for objective in &mut self.objectives {
            let candidate = match objective.objective.kind {
                ObjectiveKind::StreakMaintained => event.current_streak as f64,
                _ => objective.progress + contribution(&objective.objective, event, canonicalizer),
            };
            changed |= objective.raise_to(candidate, now);
        }

        if self.required_complete() {
            self.status = ChallengeStatus::Completed;
            self.completed_at = Some(now);
            info!("Challenge {} completed by {}", self.id, self.user_id);
        } else if changed {
            debug!("Challenge {} progressed for {}", self.id, self.user_id);
        }
        Ok(changed)
    }

    pub fn required_complete(&self) -> bool {
        self.objectives
            .iter()
            .filter(|o| o.objective.required)
            .all(|o| o.completed)
    }

    /// base + stretch bonus + completed optional bonuses, times the rare multiplier
    pub fn compute_reward(&self) -> u64 {
        let stretch_bonus = self.base_reward.saturating_mul(self.stretch_bonus_pct as u64) / 100;
        let optional = self
            .objectives
            .iter()
            .filter(|o| !o.objective.required && o.completed)
            .fold(0u64, |sum, o| sum.saturating_add(o.objective.bonus_reward));
        let subtotal = self
            .base_reward
            .saturating_add(stretch_bonus)
            .saturating_add(optional);
        if self.rare_gate {
            (subtotal as f64 * self.rare_multiplier).floor() as u64
        } else {
            subtotal
        }
    }

    /// `completed -> claimed`, returning the XP to credit
    pub fn claim(&mut self, now: DateTime<Utc>) -> EngineResult<u64> {
        self.require(ChallengeStatus::Completed, now)?;
        let reward = self.compute_reward();
        self.status = ChallengeStatus::Claimed;
        self.claimed_at = Some(now);
        self.finished_at = Some(now);
        self.earned_reward = Some(reward);
        Ok(reward)
    }
}

/// What one workout adds to an additive objective
fn contribution(
    objective: &ChallengeObjectiveDefinition,
    event: &WorkoutEvent,
    canonicalizer: &ExerciseCanonicalizer,
) -> f64 {
    let counted = event.working_sets().filter(|s| s.reps > 0);
    match objective.kind {
        ObjectiveKind::TotalReps => event.total_reps() as f64,
        ObjectiveKind::TotalVolume => event.total_volume(),
        ObjectiveKind::TotalSets => counted.count() as f64,
        ObjectiveKind::CompoundLiftSets => counted
            .filter(|s| canonicalizer.is_compound(&canonicalizer.resolve(&s.exercise)))
            .count() as f64,
        ObjectiveKind::WorkoutCount => 1.0,
        ObjectiveKind::ExerciseSpecificSets => match &objective.target_exercise {
            Some(target) => {
                let group = canonicalizer.resolve(target);
                counted
                    .filter(|s| canonicalizer.resolve(&s.exercise) == group)
                    .count() as f64
            }
            None => 0.0,
        },
        ObjectiveKind::PrCount => event.pr_count as f64,
        ObjectiveKind::StreakMaintained => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workout::WorkoutSet;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn definition() -> ChallengeDefinition {
        ChallengeDefinition {
            id: "squat_den".to_string(),
            name: "Squat Den".to_string(),
            rank: Rank::D,
            duration_hours: 72,
            base_reward: 200,
            spawn_weight: 10,
            min_level: 1,
            max_level: None,
            objectives: vec![
                ChallengeObjectiveDefinition::required(
                    "squat_sets",
                    ObjectiveKind::ExerciseSpecificSets,
                    5.0,
                )
                .for_exercise("Squat")
                .at(1),
                ChallengeObjectiveDefinition::required("workouts", ObjectiveKind::WorkoutCount, 2.0)
                    .at(0),
                ChallengeObjectiveDefinition::optional("prs", ObjectiveKind::PrCount, 1.0, 40).at(2),
            ],
            is_boss: false,
            is_event: false,
            is_active: true,
        }
    }

    fn squat_workout(sets: u32, at: DateTime<Utc>) -> WorkoutEvent {
        WorkoutEvent::new(
            at,
            (0..sets)
                .map(|i| {
                    if i % 2 == 0 {
                        WorkoutSet::new("Back Squat", 200.0, 5)
                    } else {
                        WorkoutSet::new("Barbell Back Squat", 200.0, 5)
                    }
                })
                .collect(),
        )
    }

    fn accepted() -> ChallengeInstance {
        let mut inst = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        inst.accept(t0(), None).unwrap();
        inst
    }

    #[test]
    fn test_spawn_fixes_deadline_and_orders_objectives() {
        let inst = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        assert_eq!(inst.status, ChallengeStatus::Available);
        assert_eq!(inst.expires_at, t0() + Duration::hours(72));
        let ids: Vec<_> = inst.objectives.iter().map(|o| o.objective.id.as_str()).collect();
        assert_eq!(ids, vec!["workouts", "squat_sets", "prs"]);
    }

    #[test]
    fn test_lazy_expiry_on_read() {
        let inst = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        let later = t0() + Duration::hours(73);
        assert_eq!(inst.effective_status(later), ChallengeStatus::Expired);
        // reading never mutates
        assert_eq!(inst.status, ChallengeStatus::Available);
        assert_eq!(inst.effective_status(t0() + Duration::hours(72)), ChallengeStatus::Available);
    }

    #[test]
    fn test_expire_if_due_is_idempotent() {
        let mut inst = accepted();
        let later = t0() + Duration::hours(80);
        assert!(inst.expire_if_due(later));
        assert!(!inst.expire_if_due(later));
        assert_eq!(inst.status, ChallengeStatus::Expired);
    }

    #[test]
    fn test_accept_does_not_extend_deadline() {
        let mut inst = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        inst.accept(t0() + Duration::hours(70), None).unwrap();
        assert_eq!(inst.expires_at, t0() + Duration::hours(72));
        assert_eq!(inst.accepted_at, Some(t0() + Duration::hours(70)));
    }

    #[test]
    fn test_accept_expired_is_state_conflict() {
        let mut inst = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        let err = inst.accept(t0() + Duration::hours(73), None).unwrap_err();
        match err {
            EngineError::StateConflict { current, required, .. } => {
                assert_eq!(current, ChallengeStatus::Expired);
                assert_eq!(required, ChallengeStatus::Available);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_accept_twice_and_single_active_rule() {
        let mut inst = accepted();
        assert!(matches!(
            inst.accept(t0(), None),
            Err(EngineError::StateConflict { .. })
        ));

        let mut other = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        let err = other.accept(t0(), Some(inst.id)).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyActive { .. }));
        assert!(err.is_conflict());
        assert_eq!(other.status, ChallengeStatus::Available);
    }

    #[test]
    fn test_progress_caps_and_completes() {
        let mut inst = accepted();
        let canon = ExerciseCanonicalizer::standard();

        assert!(inst.record_progress(&squat_workout(3, t0()), &canon, t0()).unwrap());
        assert_eq!(inst.status, ChallengeStatus::Active);
        assert_eq!(inst.objectives[1].progress, 3.0);

        let done_at = t0() + Duration::hours(24);
        inst.record_progress(&squat_workout(4, done_at), &canon, done_at).unwrap();
        assert_eq!(inst.objectives[1].progress, 5.0);
        assert!(inst.objectives[1].completed);
        assert_eq!(inst.objectives[0].progress, 2.0);
        assert_eq!(inst.status, ChallengeStatus::Completed);
        assert_eq!(inst.completed_at, Some(done_at));
        // optional objective never gated completion
        assert!(!inst.objectives[2].completed);
    }

    #[test]
    fn test_progress_requires_active() {
        let mut inst = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        let canon = ExerciseCanonicalizer::standard();
        assert!(inst.record_progress(&squat_workout(3, t0()), &canon, t0()).is_err());
    }

    #[test]
    fn test_streak_objective_takes_max() {
        let mut def = definition();
        def.objectives = vec![ChallengeObjectiveDefinition::required(
            "streak",
            ObjectiveKind::StreakMaintained,
            5.0,
        )];
        let mut inst = ChallengeInstance::spawn(&def, "u1", t0(), StretchTier::None, 0, None);
        inst.accept(t0(), None).unwrap();
        let canon = ExerciseCanonicalizer::standard();

        let mut event = squat_workout(1, t0());
        event.current_streak = 3;
        inst.record_progress(&event, &canon, t0()).unwrap();
        event.current_streak = 1;
        assert!(!inst.record_progress(&event, &canon, t0()).unwrap());
        assert_eq!(inst.objectives[0].progress, 3.0);

        event.current_streak = 6;
        inst.record_progress(&event, &canon, t0()).unwrap();
        assert_eq!(inst.objectives[0].progress, 5.0);
        assert_eq!(inst.status, ChallengeStatus::Completed);
    }

    #[test]
    fn test_claim_reward_with_bonuses() {
        let mut inst =
            ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::Stretch, 25, Some(1.5));
        inst.accept(t0(), None).unwrap();
        let canon = ExerciseCanonicalizer::standard();

        let mut event = squat_workout(5, t0());
        event.pr_count = 1;
        inst.record_progress(&event, &canon, t0()).unwrap();
        inst.record_progress(&squat_workout(1, t0()), &canon, t0()).unwrap();
        assert_eq!(inst.status, ChallengeStatus::Completed);

        // (200 + 50 + 40) * 1.5
        let reward = inst.claim(t0()).unwrap();
        assert_eq!(reward, 435);
        assert_eq!(inst.earned_reward, Some(435));
        assert_eq!(inst.status, ChallengeStatus::Claimed);

        assert!(matches!(
            inst.claim(t0()),
            Err(EngineError::StateConflict {
                current: ChallengeStatus::Claimed,
                ..
            })
        ));
    }

    #[test]
    fn test_reward_saturates_on_huge_catalog_values() {
        let mut def = definition();
        def.base_reward = u64::MAX;
        def.objectives[2].bonus_reward = u64::MAX;
        let mut inst = ChallengeInstance::spawn(&def, "u1", t0(), StretchTier::Stretch, 50, None);
        for objective in &mut inst.objectives {
            objective.completed = true;
        }
        assert_eq!(inst.compute_reward(), u64::MAX);

        inst.rare_gate = true;
        inst.rare_multiplier = 1.5;
        assert_eq!(inst.compute_reward(), u64::MAX);
    }

    #[test]
    fn test_deadline_clamps_at_end_of_time() {
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let inst = ChallengeInstance::spawn(&definition(), "u1", near_end, StretchTier::None, 0, None);
        assert_eq!(inst.expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(inst.effective_status(near_end), ChallengeStatus::Available);
    }

    #[test]
    fn test_claim_before_complete_fails() {
        let mut inst = accepted();
        let err = inst.claim(t0()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::StateConflict {
                current: ChallengeStatus::Active,
                required: ChallengeStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn test_abandon_only_from_active() {
        let mut inst = ChallengeInstance::spawn(&definition(), "u1", t0(), StretchTier::None, 0, None);
        assert!(inst.abandon(t0()).is_err());
        inst.accept(t0(), None).unwrap();
        inst.abandon(t0()).unwrap();
        assert_eq!(inst.status, ChallengeStatus::Abandoned);
        assert!(inst.accept(t0(), None).is_err());
        assert!(inst.abandon(t0()).is_err());
    }

    #[test]
    fn test_completed_does_not_expire() {
        let mut inst = accepted();
        let canon = ExerciseCanonicalizer::standard();
        inst.record_progress(&squat_workout(5, t0()), &canon, t0()).unwrap();
        inst.record_progress(&squat_workout(1, t0()), &canon, t0()).unwrap();
        let much_later = t0() + Duration::days(30);
        assert_eq!(inst.effective_status(much_later), ChallengeStatus::Completed);
        assert!(inst.claim(much_later).is_ok());
    }
}
