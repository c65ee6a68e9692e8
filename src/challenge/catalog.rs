//! Built-in dungeon catalog.

use super::definition::{
    ChallengeCatalog, ChallengeDefinition, ChallengeObjectiveDefinition as Objective,
    ObjectiveKind::*,
};
use crate::error::EngineResult;
use crate::progression::Rank;

#[allow(clippy::too_many_arguments)]
fn dungeon(
    id: &str,
    name: &str,
    rank: Rank,
    duration_hours: u32,
    base_reward: u64,
    spawn_weight: u32,
    levels: (u32, Option<u32>),
    objectives: Vec<Objective>,
) -> ChallengeDefinition {
    ChallengeDefinition {
        id: id.to_string(),
        name: name.to_string(),
        rank,
        duration_hours,
        base_reward,
        spawn_weight,
        min_level: levels.0,
        max_level: levels.1,
        objectives,
        is_boss: false,
        is_event: false,
        is_active: true,
    }
}

pub fn default_definitions() -> Vec<ChallengeDefinition> {
    let mut defs = vec![
        dungeon(
            "goblin_cellar",
            "Goblin Cellar",
            Rank::E,
            48,
            150,
            30,
            (1, Some(10)),
            vec![
                Objective::required("workouts", WorkoutCount, 2.0).at(0),
                Objective::required("sets", TotalSets, 20.0).at(1),
                Objective::optional("reps", TotalReps, 150.0, 40).at(2),
            ],
        ),
        dungeon(
            "iron_crypt",
            "Iron Crypt",
            Rank::E,
            72,
            200,
            20,
            (1, Some(15)),
            vec![
                Objective::required("squat_sets", ExerciseSpecificSets, 10.0)
                    .for_exercise("Squat")
                    .at(0),
                Objective::optional("volume", TotalVolume, 10_000.0, 50).at(1),
            ],
        ),
        dungeon(
            "orc_barracks",
            "Orc Barracks",
            Rank::D,
            72,
            350,
            20,
            (4, Some(20)),
            vec![
                Objective::required("compound", CompoundLiftSets, 25.0).at(0),
                Objective::required("workouts", WorkoutCount, 3.0).at(1),
                Objective::optional("pr", PrCount, 1.0, 75).at(2),
            ],
        ),
        dungeon(
            "bench_citadel",
            "Bench Citadel",
            Rank::C,
            96,
            600,
            15,
            (8, Some(30)),
            vec![
                Objective::required("bench_sets", ExerciseSpecificSets, 15.0)
                    .for_exercise("Bench Press")
                    .at(0),
                Objective::required("volume", TotalVolume, 40_000.0).at(1),
                Objective::optional("streak", StreakMaintained, 4.0, 100).at(2),
            ],
        ),
        dungeon(
            "wyvern_peak",
            "Wyvern Peak",
            Rank::B,
            120,
            1_000,
            10,
            (18, None),
            vec![
                Objective::required("deadlift_sets", ExerciseSpecificSets, 15.0)
                    .for_exercise("Deadlift")
                    .at(0),
                Objective::required("workouts", WorkoutCount, 4.0).at(1),
                Objective::optional("prs", PrCount, 2.0, 200).at(2),
            ],
        ),
        dungeon(
            "titan_forge",
            "Titan Forge",
            Rank::A,
            144,
            1_800,
            6,
            (30, None),
            vec![
                Objective::required("volume", TotalVolume, 150_000.0).at(0),
                Objective::required("streak", StreakMaintained, 5.0).at(1),
            ],
        ),
    ];

    let mut monarch = dungeon(
        "shadow_monarch",
        "Shadow Monarch's Throne",
        Rank::S,
        168,
        5_000,
        2,
        (45, None),
        vec![
            Objective::required("compound", CompoundLiftSets, 80.0).at(0),
            Objective::required("prs", PrCount, 3.0).at(1),
            Objective::optional("streak", StreakMaintained, 7.0, 1_000).at(2),
        ],
    );
    monarch.is_boss = true;
    defs.push(monarch);
    defs
}

pub fn default_catalog() -> EngineResult<ChallengeCatalog> {
    ChallengeCatalog::new(default_definitions())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = default_catalog().unwrap();
        assert_eq!(catalog.definitions().len(), 7);
        assert!(catalog.get("shadow_monarch").unwrap().is_boss);
    }

    #[test]
    fn test_every_level_has_something_to_draw() {
        let catalog = default_catalog().unwrap();
        for level in 1..=100 {
            assert!(!catalog.eligible(level).is_empty(), "level {}", level);
        }
    }
}
