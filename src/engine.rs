//! Progression Engine
//!
//! Ties the canonicalizer, ledger, record detector, spawner and challenge
//! lifecycle to a [`ProgressionStore`] and a [`Clock`].
//!
//! Every write operation holds the caller's per-user lock for its whole
//! duration, so operations for one user are serialized while different
//! users proceed independently. Lock entries are dropped once idle.
//!
//! Each write reads and writes through a single
//! [`ProgressionStore::atomically`] unit. Two engines sharing one database
//! (two CLI processes on the same file, say) therefore never overwrite each
//! other's XP, and a failed submission leaves no half-applied state behind.
//!
//! Write paths sweep the user's overdue instances to `expired` (and persist
//! them, in a unit of their own) before doing anything else; reads only
//! report the effective status.

use crate::challenge::{
    default_catalog, ChallengeCatalog, ChallengeInstance, ChallengeSpawner, ChallengeStatus,
    ChallengeView,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StorageError};
use crate::exercise::{ExerciseCanonicalizer, GroupId};
use crate::progression::{
    compute_workout_xp, LevelProgress, ProgressionLedger, ProgressionState, Rank, XpAward,
    XpBreakdown,
};
use crate::records::{count_record_sets, BestView, PersonalRecord, RecordDetector};
use crate::storage::{ProgressionStore, StoreOps};
use crate::util::clock::Clock;
use crate::workout::{WorkoutEvent, WorkoutSet};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything a workout submission changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutOutcome {
    pub records: Vec<PersonalRecord>,
    pub xp: XpBreakdown,
    pub award: XpAward,
    /// Active challenges whose progress moved
    pub progressed_challenges: Vec<Uuid>,
}

/// Result of a successful claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub instance: ChallengeInstance,
    pub reward: u64,
    pub award: XpAward,
}

pub struct ProgressionEngine {
    config: EngineConfig,
    store: Arc<dyn ProgressionStore>,
    clock: Arc<dyn Clock>,
    canonicalizer: ExerciseCanonicalizer,
    ledger: ProgressionLedger,
    detector: RecordDetector,
    spawner: ChallengeSpawner,
    catalog: ChallengeCatalog,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProgressionEngine {
    /// Engine over the built-in exercise and dungeon catalogs
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ProgressionStore>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        Self::with_catalogs(
            config,
            store,
            clock,
            ExerciseCanonicalizer::standard(),
            default_catalog()?,
        )
    }

    pub fn with_catalogs(
        config: EngineConfig,
        store: Arc<dyn ProgressionStore>,
        clock: Arc<dyn Clock>,
        canonicalizer: ExerciseCanonicalizer,
        catalog: ChallengeCatalog,
    ) -> EngineResult<Self> {
        config.validate()?;
        let ledger = ProgressionLedger::new(&config.progression)?;
        let detector = RecordDetector::new(config.records.weight_bucket)?;
        let spawner = ChallengeSpawner::new(config.spawn.clone());

        info!(
            "Progression engine ready: {} exercise groups, {} challenge definitions",
            canonicalizer.groups().count(),
            catalog.definitions().len()
        );

        Ok(Self {
            config,
            store,
            clock,
            canonicalizer,
            ledger,
            detector,
            spawner,
            catalog,
            user_locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn canonicalizer(&self) -> &ExerciseCanonicalizer {
        &self.canonicalizer
    }

    pub fn catalog(&self) -> &ChallengeCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &ProgressionLedger {
        &self.ledger
    }

    /// Run `f` under the per-user lock, dropping the lock entry afterwards
    /// when no other caller holds or waits on it.
    fn with_user_lock<T>(
        &self,
        user_id: &str,
        f: impl FnOnce() -> EngineResult<T>,
    ) -> EngineResult<T> {
        let lock = self
            .user_locks
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        // one reference in the map, one here
        self.user_locks.remove_if(user_id, |_, l| Arc::strong_count(l) == 2);
        result
    }

    /// Run `work` as one store unit and hand back what it produced
    fn unit<T>(
        &self,
        mut work: impl FnMut(&dyn StoreOps) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut produced = None;
        self.store.atomically(&mut |tx: &dyn StoreOps| -> EngineResult<()> {
            produced = Some(work(tx)?);
            Ok(())
        })?;
        produced.ok_or_else(|| {
            EngineError::Storage(StorageError::Corrupt(
                "store committed a unit without running it".into(),
            ))
        })
    }

    fn check_user(user_id: &str) -> EngineResult<()> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Validation("User id must not be empty".into()));
        }
        Ok(())
    }

    fn load_state<S: StoreOps + ?Sized>(
        &self,
        store: &S,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ProgressionState> {
        let mut state = match store.load_progression(user_id)? {
            Some(state) => state,
            None => ProgressionState::new(user_id, now),
        };
        // level and rank follow the configured curve, not whatever was stored
        self.ledger.refresh(&mut state);
        Ok(state)
    }

    fn load_owned<S: StoreOps + ?Sized>(
        store: &S,
        user_id: &str,
        id: Uuid,
    ) -> EngineResult<ChallengeInstance> {
        store
            .load_instance(id)?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| EngineError::NotFound(format!("challenge {}", id)))
    }

    /// Persist expiry for every overdue open instance of `user_id` in a unit
    /// of its own, so it sticks even if the caller's operation then fails.
    /// Returns how many expired.
    fn sweep(&self, user_id: &str, now: DateTime<Utc>) -> EngineResult<usize> {
        self.unit(|tx| {
            let mut expired = 0;
            for mut instance in tx.instances_for_user(user_id)? {
                if instance.expire_if_due(now) {
                    tx.save_instance(&instance)?;
                    expired += 1;
                }
            }
            Ok(expired)
        })
    }

    // ========================================================================
    // EXERCISES & XP
    // ========================================================================

    pub fn canonicalize(&self, name: &str) -> GroupId {
        self.canonicalizer.resolve(name)
    }

    /// Credit `amount` XP for activity on `date`
    pub fn award_xp(&self, user_id: &str, amount: u64, date: NaiveDate) -> EngineResult<XpAward> {
        Self::check_user(user_id)?;
        self.with_user_lock(user_id, || {
            let now = self.clock.now();
            self.unit(|tx| {
                let mut state = self.load_state(tx, user_id, now)?;
                let award = self.ledger.award_xp(&mut state, amount, date, now);
                tx.save_progression(&state)?;
                Ok(award)
            })
        })
    }

    /// XP breakdown for `event`, using its `pr_count`
    pub fn compute_workout_xp(&self, event: &WorkoutEvent) -> XpBreakdown {
        compute_workout_xp(
            &self.config.workout_xp,
            &self.canonicalizer,
            event,
            event.pr_count,
        )
    }

    pub fn progression(&self, user_id: &str) -> EngineResult<ProgressionState> {
        Self::check_user(user_id)?;
        self.load_state(&*self.store, user_id, self.clock.now())
    }

    pub fn level_progress(&self, user_id: &str) -> EngineResult<LevelProgress> {
        let state = self.progression(user_id)?;
        Ok(self.ledger.level_progress(&state))
    }

    // ========================================================================
    // PERSONAL RECORDS
    // ========================================================================

    /// Detect records for `group` among `sets` and append them to the log.
    /// Sets that resolve to a different group are ignored.
    pub fn detect_records(
        &self,
        user_id: &str,
        group: &GroupId,
        sets: &[WorkoutSet],
    ) -> EngineResult<Vec<PersonalRecord>> {
        Self::check_user(user_id)?;
        let matching: Vec<WorkoutSet> = sets
            .iter()
            .filter(|s| &self.canonicalizer.resolve(&s.exercise) == group)
            .cloned()
            .collect();

        self.with_user_lock(user_id, || {
            let now = self.clock.now();
            self.unit(|tx| {
                let found = self.detect_group(tx, user_id, group, &matching, now)?;
                tx.append_records(&found)?;
                Ok(found)
            })
        })
    }

    fn detect_group(
        &self,
        tx: &dyn StoreOps,
        user_id: &str,
        group: &GroupId,
        sets: &[WorkoutSet],
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<PersonalRecord>> {
        let history = tx.records_for(user_id, group)?;
        self.detector
            .detect_records(&self.canonicalizer, user_id, group, &history, sets, now)
    }

    pub fn current_bests(&self, user_id: &str, group: &GroupId) -> EngineResult<BestView> {
        Self::check_user(user_id)?;
        let log = self.store.records_for(user_id, group)?;
        Ok(BestView::from_log(&log, self.detector.bucket_size()))
    }

    // ========================================================================
    // WORKOUT SUBMISSION
    // ========================================================================

    /// Full submission path: records, then XP and streak, then challenges.
    /// All three land in one store unit or not at all.
    pub fn submit_workout(
        &self,
        user_id: &str,
        event: WorkoutEvent,
    ) -> EngineResult<WorkoutOutcome> {
        Self::check_user(user_id)?;
        if event.sets.is_empty() {
            return Err(EngineError::Validation("Workout has no sets".into()));
        }
        if let Some(bad) = event
            .sets
            .iter()
            .find(|s| !s.weight.is_finite() || s.weight < 0.0)
        {
            return Err(EngineError::Validation(format!(
                "Invalid weight {} for {}",
                bad.weight, bad.exercise
            )));
        }

        // group working sets by canonical group, in order of first appearance
        let mut by_group: Vec<(GroupId, Vec<WorkoutSet>)> = Vec::new();
        for set in event.working_sets() {
            let group = self.canonicalizer.resolve(&set.exercise);
            match by_group.iter_mut().find(|(g, _)| *g == group) {
                Some((_, sets)) => sets.push(set.clone()),
                None => by_group.push((group, vec![set.clone()])),
            }
        }

        let outcome = self.with_user_lock(user_id, || {
            let now = self.clock.now();
            self.sweep(user_id, now)?;
            self.unit(|tx| {
                let mut records = Vec::new();
                for (group, sets) in &by_group {
                    records.extend(self.detect_group(tx, user_id, group, sets, now)?);
                }
                tx.append_records(&records)?;

                let pr_count = count_record_sets(&records);
                let xp = compute_workout_xp(
                    &self.config.workout_xp,
                    &self.canonicalizer,
                    &event,
                    pr_count,
                );

                let mut state = self.load_state(tx, user_id, now)?;
                let award = self
                    .ledger
                    .award_xp(&mut state, xp.total, event.performed_on, now);
                state.total_workouts += 1;
                state.total_volume += xp.total_volume;
                state.total_prs += pr_count as u64;
                tx.save_progression(&state)?;

                let mut scored = event.clone();
                scored.pr_count = pr_count;
                scored.current_streak = state.current_streak;
                let progressed_challenges = self.progress_in(tx, user_id, &scored, now)?;

                Ok(WorkoutOutcome {
                    records,
                    xp,
                    award,
                    progressed_challenges,
                })
            })
        })?;

        info!(
            "Workout for {}: {} XP, {} records, {} challenges progressed",
            user_id,
            outcome.xp.total,
            outcome.records.len(),
            outcome.progressed_challenges.len()
        );
        Ok(outcome)
    }

    // ========================================================================
    // CHALLENGES
    // ========================================================================

    /// Roll for a new challenge at the user's stored level and rank
    pub fn maybe_spawn(&self, user_id: &str, force: bool) -> EngineResult<Option<ChallengeInstance>> {
        Self::check_user(user_id)?;
        let mut rng = StdRng::from_entropy();
        self.with_user_lock(user_id, || {
            self.spawn_locked(user_id, None, force, &mut rng, self.clock.now())
        })
    }

    /// Spawn with an explicit level, rank and random source
    pub fn maybe_spawn_with<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        level: u32,
        rank: Rank,
        force: bool,
        rng: &mut R,
    ) -> EngineResult<Option<ChallengeInstance>> {
        Self::check_user(user_id)?;
        self.with_user_lock(user_id, || {
            self.spawn_locked(user_id, Some((level, rank)), force, rng, self.clock.now())
        })
    }

    /// `at` overrides the stored level and rank
    fn spawn_locked<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        at: Option<(u32, Rank)>,
        force: bool,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<ChallengeInstance>> {
        self.sweep(user_id, now)?;
        self.unit(|tx| {
            let (level, rank) = match at {
                Some(at) => at,
                None => {
                    let state = self.load_state(tx, user_id, now)?;
                    (state.level, state.rank)
                }
            };
            let open = tx
                .instances_for_user(user_id)?
                .iter()
                .filter(|i| i.status.is_open())
                .count();

            let spawned = self.spawner.maybe_spawn(
                &self.catalog,
                user_id,
                level,
                rank,
                open,
                force,
                &mut *rng,
                now,
            )?;
            if let Some(instance) = &spawned {
                tx.insert_instance(instance)?;
            }
            Ok(spawned)
        })
    }

    pub fn accept_challenge(&self, user_id: &str, id: Uuid) -> EngineResult<ChallengeView> {
        Self::check_user(user_id)?;
        self.with_user_lock(user_id, || {
            let now = self.clock.now();
            self.sweep(user_id, now)?;
            self.unit(|tx| {
                let instances = tx.instances_for_user(user_id)?;
                let mut instance = instances
                    .iter()
                    .find(|i| i.id == id)
                    .cloned()
                    .ok_or_else(|| EngineError::NotFound(format!("challenge {}", id)))?;
                let other_active = instances
                    .iter()
                    .find(|i| i.status == ChallengeStatus::Active && i.id != id)
                    .map(|i| i.id);

                instance.accept(now, other_active)?;
                tx.save_instance(&instance)?;
                Ok(instance.view(now))
            })
        })
    }

    pub fn abandon_challenge(&self, user_id: &str, id: Uuid) -> EngineResult<ChallengeView> {
        Self::check_user(user_id)?;
        self.with_user_lock(user_id, || {
            let now = self.clock.now();
            self.sweep(user_id, now)?;
            self.unit(|tx| {
                let mut instance = Self::load_owned(tx, user_id, id)?;
                instance.abandon(now)?;
                tx.save_instance(&instance)?;
                Ok(instance.view(now))
            })
        })
    }

    /// Claim a completed challenge, crediting its reward exactly once.
    ///
    /// The status check, the claim and the XP credit share one store unit, so
    /// a second claim (from this or another engine) sees `claimed` and fails.
    pub fn claim_challenge(&self, user_id: &str, id: Uuid) -> EngineResult<ClaimOutcome> {
        Self::check_user(user_id)?;
        let outcome = self.with_user_lock(user_id, || {
            let now = self.clock.now();
            self.sweep(user_id, now)?;
            self.unit(|tx| {
                let mut instance = Self::load_owned(tx, user_id, id)?;
                let reward = instance.claim(now)?;

                let mut state = self.load_state(tx, user_id, now)?;
                let award = self.ledger.award_xp(&mut state, reward, now.date_naive(), now);
                tx.save_instance(&instance)?;
                tx.save_progression(&state)?;
                Ok(ClaimOutcome {
                    instance,
                    reward,
                    award,
                })
            })
        })?;

        info!(
            "Challenge {} claimed by {}: +{} XP (level {})",
            id, user_id, outcome.reward, outcome.award.new_level
        );
        Ok(outcome)
    }

    /// Fold `event` into every active challenge of the user. Returns the ids
    /// of instances whose progress moved.
    pub fn record_challenge_progress(
        &self,
        user_id: &str,
        event: &WorkoutEvent,
    ) -> EngineResult<Vec<Uuid>> {
        Self::check_user(user_id)?;
        self.with_user_lock(user_id, || {
            let now = self.clock.now();
            self.sweep(user_id, now)?;
            self.unit(|tx| self.progress_in(tx, user_id, event, now))
        })
    }

    fn progress_in(
        &self,
        tx: &dyn StoreOps,
        user_id: &str,
        event: &WorkoutEvent,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Uuid>> {
        let mut progressed = Vec::new();
        for mut instance in tx
            .instances_for_user(user_id)?
            .into_iter()
            .filter(|i| i.effective_status(now) == ChallengeStatus::Active)
        {
            if instance.record_progress(event, &self.canonicalizer, now)? {
                tx.save_instance(&instance)?;
                progressed.push(instance.id);
            }
        }
        if progressed.is_empty() {
            debug!("No active challenge progressed for {}", user_id);
        }
        Ok(progressed)
    }

    /// All of a user's challenges with effective statuses; never writes
    pub fn list_challenges(&self, user_id: &str) -> EngineResult<Vec<ChallengeView>> {
        Self::check_user(user_id)?;
        let now = self.clock.now();
        Ok(self
            .store
            .instances_for_user(user_id)?
            .iter()
            .map(|i| i.view(now))
            .collect())
    }

    pub fn get_challenge(&self, user_id: &str, id: Uuid) -> EngineResult<ChallengeView> {
        Self::check_user(user_id)?;
        Ok(Self::load_owned(&*self.store, user_id, id)?.view(self.clock.now()))
    }

    /// Persist expiry for overdue instances; returns how many changed
    pub fn expire_stale(&self, user_id: &str) -> EngineResult<usize> {
        Self::check_user(user_id)?;
        let expired = self.with_user_lock(user_id, || self.sweep(user_id, self.clock.now()))?;
        if expired > 0 {
            info!("Expired {} challenges for {}", expired, user_id);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::util::clock::ManualClock;
    use chrono::TimeZone;

    fn engine() -> ProgressionEngine {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap());
        ProgressionEngine::new(
            EngineConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(clock),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_user_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.progression("  "),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_new_user_reads_default_state() {
        let engine = engine();
        let state = engine.progression("u1").unwrap();
        assert_eq!(state.total_xp, 0);
        assert_eq!(state.level, 1);
        assert_eq!(state.rank, Rank::E);
    }

    #[test]
    fn test_detect_records_ignores_other_groups() {
        let engine = engine();
        let squat = engine.canonicalize("Back Squat");
        let records = engine
            .detect_records(
                "u1",
                &squat,
                &[
                    WorkoutSet::new("Squat", 100.0, 5),
                    WorkoutSet::new("Bench Press", 300.0, 5),
                ],
            )
            .unwrap();
        assert!(records.iter().all(|r| r.group_id == squat));
        assert_eq!(engine.current_bests("u1", &squat).unwrap().rep_max_at(100.0), 5);
    }

    #[test]
    fn test_bad_weight_rejected_before_any_write() {
        let engine = engine();
        let now = Utc::now();
        let event = WorkoutEvent::new(
            now,
            vec![
                WorkoutSet::new("Squat", 100.0, 5),
                WorkoutSet::new("Squat", f64::NAN, 5),
            ],
        );
        assert!(engine.submit_workout("u1", event).is_err());
        assert_eq!(engine.progression("u1").unwrap().total_workouts, 0);
        let squat = engine.canonicalize("Squat");
        assert_eq!(engine.current_bests("u1", &squat).unwrap().estimated_max, 0.0);
    }

    #[test]
    fn test_user_locks_released_when_idle() {
        let engine = engine();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        for n in 0..50 {
            engine.award_xp(&format!("user{}", n), 10, date).unwrap();
        }
        assert!(engine.user_locks.is_empty());

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..25 {
                        engine.award_xp("shared", 1, date).unwrap();
                    }
                });
            }
        });
        assert!(engine.user_locks.is_empty());
        assert_eq!(engine.progression("shared").unwrap().total_xp, 100);
    }
}
