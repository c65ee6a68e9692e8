//! Built-in exercise equivalence table.

use super::CanonicalExerciseGroup;

pub fn default_groups() -> Vec<CanonicalExerciseGroup> {
    vec![
        CanonicalExerciseGroup::new(
            "squat",
            "Squat",
            &[
                "Back Squat",
                "Barbell Squat",
                "Barbell Back Squat",
                "High Bar Squat",
                "Low Bar Squat",
                "BB Squat",
            ],
        )
        .big_three(),
        CanonicalExerciseGroup::new(
            "bench_press",
            "Bench Press",
            &["Bench", "Flat Bench", "Flat Bench Press", "Barbell Bench Press"],
        )
        .big_three(),
        CanonicalExerciseGroup::new(
            "deadlift",
            "Deadlift",
            &[
                "Conventional Deadlift",
                "Barbell Deadlift",
                "Sumo Deadlift",
                "DL",
            ],
        )
        .big_three(),
        CanonicalExerciseGroup::new(
            "overhead_press",
            "Overhead Press",
            &["OHP", "Military Press", "Standing Press", "Strict Press"],
        )
        .compound(),
        CanonicalExerciseGroup::new(
            "barbell_row",
            "Barbell Row",
            &["Bent Over Row", "Bent Over Barbell Row", "Pendlay Row"],
        )
        .compound(),
        CanonicalExerciseGroup::new("pull_up", "Pull-up", &["Pullup", "Pull Ups", "Pullups"])
            .compound(),
        CanonicalExerciseGroup::new(
            "romanian_deadlift",
            "Romanian Deadlift",
            &["RDL", "Barbell RDL"],
        )
        .compound(),
        CanonicalExerciseGroup::new("dip", "Dip", &["Dips", "Parallel Bar Dip"]).compound(),
        CanonicalExerciseGroup::new("lunge", "Lunge", &["Lunges", "Walking Lunge"]).compound(),
        CanonicalExerciseGroup::new(
            "leg_press",
            "Leg Press",
            &["Machine Leg Press", "Sled Leg Press"],
        ),
    ]
}
