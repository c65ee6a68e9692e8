//! Dungeon challenges: catalog, spawning and lifecycle.

pub mod catalog;
pub mod definition;
pub mod instance;
pub mod spawner;

pub use catalog::{default_catalog, default_definitions};
pub use definition::{
    ChallengeCatalog, ChallengeDefinition, ChallengeObjectiveDefinition, ObjectiveKind,
};
pub use instance::{ChallengeInstance, ChallengeStatus, ChallengeView, ObjectiveProgress, StretchTier};
pub use spawner::{weighted_pick, ChallengeSpawner};
