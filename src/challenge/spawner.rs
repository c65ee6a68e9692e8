//! Challenge Spawner
//!
//! Draws a new challenge for a user from the catalog:
//! 1. refuse when the user already holds `max_concurrent` open instances
//! 2. unless forced, roll `spawn_chance`
//! 3. weighted draw over definitions eligible at the user's level
//! 4. classify stretch (definition rank above the user's) and roll the rare gate
//!
//! Randomness always comes from the caller's `Rng`, so tests can seed it.

use super::definition::{ChallengeCatalog, ChallengeDefinition};
use super::instance::{ChallengeInstance, StretchTier};
use crate::config::SpawnConfig;
use crate::error::{EngineError, EngineResult};
use crate::progression::Rank;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

/// Cumulative-weight pick. `roll` is uniform in [0, 1).
pub fn weighted_pick<'a>(
    entries: &[&'a ChallengeDefinition],
    roll: f64,
) -> Option<&'a ChallengeDefinition> {
    let total: u64 = entries.iter().map(|d| d.spawn_weight as u64).sum();
    if total == 0 {
        return None;
    }
    let target = roll.clamp(0.0, 1.0) * total as f64;
    let mut cumulative = 0u64;
    for entry in entries {
        cumulative += entry.spawn_weight as u64;
        if target < cumulative as f64 {
            return Some(*entry);
        }
    }
    // roll == 1.0 lands past the last bucket
    entries.iter().rev().find(|d| d.spawn_weight > 0).copied()
}

pub struct ChallengeSpawner {
    config: SpawnConfig,
}

impl ChallengeSpawner {
    pub fn new(config: SpawnConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpawnConfig {
        &self.config
    }

    pub fn stretch_for(&self, challenge_rank: Rank, user_rank: Rank) -> (StretchTier, u32) {
        match challenge_rank.steps_above(user_rank) {
            0 => (StretchTier::None, 0),
            1 => (StretchTier::Stretch, self.config.stretch_bonus_pct),
            _ => (StretchTier::VeryStretch, self.config.very_stretch_bonus_pct),
        }
    }

    /// Try to spawn a challenge. `open_count` is the user's current number of
    /// available + active instances. `force` skips only the chance roll.
    #[allow(clippy::too_many_arguments)]
    pub fn maybe_spawn<R: Rng + ?Sized>(
        &self,
        catalog: &ChallengeCatalog,
        user_id: &str,
        level: u32,
        rank: Rank,
        open_count: usize,
        force: bool,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<ChallengeInstance>> {
        if open_count >= self.config.max_concurrent {
            return Err(EngineError::Capacity {
                user: user_id.to_string(),
                limit: self.config.max_concurrent,
            });
        }

        if !force && rng.gen::<f64>() >= self.config.spawn_chance {
            debug!("No spawn for {} this time", user_id);
            return Ok(None);
        }

        let eligible = catalog.eligible(level);
        let Some(definition) = weighted_pick(&eligible, rng.gen::<f64>()) else {
            debug!("No eligible challenges for {} at level {}", user_id, level);
            return Ok(None);
        };

        let (stretch, bonus_pct) = self.stretch_for(definition.rank, rank);
        let rare = rng.gen::<f64>() < self.config.rare_gate_chance;
        let instance = ChallengeInstance::spawn(
            definition,
            user_id,
            now,
            stretch,
            bonus_pct,
            rare.then_some(self.config.rare_gate_multiplier),
        );

        info!(
            "Spawned {} ({}-rank{}{}) for {} expiring {}",
            instance.definition_id,
            instance.rank,
            match stretch {
                StretchTier::None => "",
                StretchTier::Stretch => ", stretch",
                StretchTier::VeryStretch => ", very stretch",
            },
            if rare { ", rare gate" } else { "" },
            user_id,
            instance.expires_at
        );
        Ok(Some(instance))
    }
}

impl Default for ChallengeSpawner {
    fn default() -> Self {
        Self::new(SpawnConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::definition::{ChallengeObjectiveDefinition, ObjectiveKind};
    use crate::challenge::ChallengeStatus;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn def(id: &str, rank: Rank, weight: u32, min: u32, max: Option<u32>) -> ChallengeDefinition {
        ChallengeDefinition {
            id: id.to_string(),
            name: id.to_string(),
            rank,
            duration_hours: 72,
            base_reward: 100,
            spawn_weight: weight,
            min_level: min,
            max_level: max,
            objectives: vec![ChallengeObjectiveDefinition::required(
                "w",
                ObjectiveKind::WorkoutCount,
                1.0,
            )],
            is_boss: false,
            is_event: false,
            is_active: true,
        }
    }

    #[test]
    fn test_weighted_pick_boundaries() {
        let a = def("a", Rank::E, 1, 1, None);
        let b = def("b", Rank::E, 3, 1, None);
        let entries = vec![&a, &b];

        assert_eq!(weighted_pick(&entries, 0.0).unwrap().id, "a");
        assert_eq!(weighted_pick(&entries, 0.2499).unwrap().id, "a");
        assert_eq!(weighted_pick(&entries, 0.25).unwrap().id, "b");
        assert_eq!(weighted_pick(&entries, 0.9999).unwrap().id, "b");
        assert_eq!(weighted_pick(&entries, 1.0).unwrap().id, "b");
        assert!(weighted_pick(&[], 0.5).is_none());
    }

    #[test]
    fn test_weighted_pick_skips_zero_weight() {
        let a = def("a", Rank::E, 0, 1, None);
        let b = def("b", Rank::E, 2, 1, None);
        assert_eq!(weighted_pick(&[&a, &b], 0.0).unwrap().id, "b");
        assert!(weighted_pick(&[&a], 0.3).is_none());
    }

    #[test]
    fn test_draw_frequencies_follow_weights() {
        let catalog = ChallengeCatalog::new(vec![
            def("common", Rank::E, 9, 1, None),
            def("rare", Rank::E, 1, 1, None),
        ])
        .unwrap();
        let spawner = ChallengeSpawner::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<String, u32> = HashMap::new();

        for _ in 0..5000 {
            let inst = spawner
                .maybe_spawn(&catalog, "u1", 1, Rank::E, 0, true, &mut rng, Utc::now())
                .unwrap()
                .unwrap();
            *counts.entry(inst.definition_id).or_default() += 1;
        }
        let common = counts["common"] as f64 / 5000.0;
        assert!((common - 0.9).abs() < 0.03, "common share {}", common);
    }

    #[test]
    fn test_capacity_enforced_even_when_forced() {
        let catalog = ChallengeCatalog::new(vec![def("a", Rank::E, 1, 1, None)]).unwrap();
        let spawner = ChallengeSpawner::default();
        let mut rng = StdRng::seed_from_u64(1);
        let err = spawner
            .maybe_spawn(&catalog, "u1", 1, Rank::E, 3, true, &mut rng, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::Capacity { limit: 3, .. }));
    }

    #[test]
    fn test_chance_gate_and_force() {
        let catalog = ChallengeCatalog::new(vec![def("a", Rank::E, 1, 1, None)]).unwrap();
        let spawner = ChallengeSpawner::new(SpawnConfig {
            spawn_chance: 0.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();

        assert!(spawner
            .maybe_spawn(&catalog, "u1", 1, Rank::E, 0, false, &mut rng, now)
            .unwrap()
            .is_none());
        let inst = spawner
            .maybe_spawn(&catalog, "u1", 1, Rank::E, 0, true, &mut rng, now)
            .unwrap()
            .unwrap();
        assert_eq!(inst.status, ChallengeStatus::Available);
        assert_eq!(inst.expires_at, now + Duration::hours(72));
    }

    #[test]
    fn test_level_window_filters_catalog() {
        let catalog = ChallengeCatalog::new(vec![
            def("low", Rank::E, 1, 1, Some(5)),
            def("high", Rank::C, 1, 20, None),
        ])
        .unwrap();
        let spawner = ChallengeSpawner::default();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            let inst = spawner
                .maybe_spawn(&catalog, "u1", 25, Rank::B, 0, true, &mut rng, Utc::now())
                .unwrap()
                .unwrap();
            assert_eq!(inst.definition_id, "high");
        }
        assert!(spawner
            .maybe_spawn(&catalog, "u1", 10, Rank::D, 0, true, &mut rng, Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_stretch_classification() {
        let spawner = ChallengeSpawner::default();
        assert_eq!(spawner.stretch_for(Rank::E, Rank::D), (StretchTier::None, 0));
        assert_eq!(spawner.stretch_for(Rank::D, Rank::D), (StretchTier::None, 0));
        assert_eq!(spawner.stretch_for(Rank::C, Rank::D), (StretchTier::Stretch, 25));
        assert_eq!(spawner.stretch_for(Rank::A, Rank::D), (StretchTier::VeryStretch, 50));
    }

    #[test]
    fn test_rare_gate_leaves_objectives_alone() {
        let catalog = ChallengeCatalog::new(vec![def("a", Rank::E, 1, 1, None)]).unwrap();
        let spawner = ChallengeSpawner::new(SpawnConfig {
            rare_gate_chance: 1.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(11);
        let inst = spawner
            .maybe_spawn(&catalog, "u1", 1, Rank::E, 0, true, &mut rng, Utc::now())
            .unwrap()
            .unwrap();
        assert!(inst.rare_gate);
        assert_eq!(inst.rare_multiplier, 1.5);
        assert_eq!(inst.objectives.len(), 1);
        assert_eq!(inst.objectives[0].objective.target, 1.0);
    }
}
