//! Exercise canonicalization
//!
//! Users log the same lift under many names ("Squat", "Back Squat",
//! "Barbell Back Squat"). Records and challenge objectives compare lifts by
//! their canonical group, so every name is resolved through an
//! [`ExerciseCanonicalizer`] first.
//!
//! Resolution is a lookup in a map precomputed when the canonicalizer is
//! built, so the result never depends on catalog order:
//! 1. exact match on the normalized name, alias or catalog id
//! 2. the same lookup after stripping leading equipment/modifier words
//! 3. a singleton `custom:<normalized>` group

mod catalog;

pub use catalog::default_groups;

use crate::error::{EngineError, EngineResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::error;

pub const CUSTOM_PREFIX: &str = "custom:";

/// Leading words that never change which lift was performed
const MODIFIER_TOKENS: &[&str] = &[
    "barbell",
    "bb",
    "competition",
    "comp",
    "standard",
    "regular",
    "traditional",
    "paused",
];

static STANDARD: Lazy<ExerciseCanonicalizer> = Lazy::new(|| {
    ExerciseCanonicalizer::from_groups(default_groups()).unwrap_or_else(|e| {
        error!("Built-in exercise catalog rejected: {}", e);
        ExerciseCanonicalizer {
            groups: HashMap::new(),
            index: HashMap::new(),
        }
    })
});

/// Canonical exercise group identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn custom(normalized: &str) -> Self {
        Self(format!("{}{}", CUSTOM_PREFIX, normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Group synthesized for a name missing from the catalog
    pub fn is_custom(&self) -> bool {
        self.0.starts_with(CUSTOM_PREFIX)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An equivalence class of exercise names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalExerciseGroup {
    pub id: GroupId,
    pub display_name: String,
    /// Alternative names and catalog ids that mean this lift
    pub variants: Vec<String>,
    /// Multi-joint lift, counted by compound-lift objectives
    #[serde(default)]
    pub compound: bool,
    /// Squat, bench press or deadlift
    #[serde(default)]
    pub big_three: bool,
}

impl CanonicalExerciseGroup {
    pub fn new(id: &str, display_name: &str, variants: &[&str]) -> Self {
        Self {
            id: GroupId::new(id),
            display_name: display_name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
            compound: false,
            big_three: false,
        }
    }

    pub fn compound(mut self) -> Self {
        self.compound = true;
        self
    }

    pub fn big_three(mut self) -> Self {
        self.compound = true;
        self.big_three = true;
        self
    }
}

/// Lowercase, turn separators into spaces, collapse whitespace.
pub fn normalize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '-' | '_' | '.' | '/' | ',' | '(' | ')' => ' ',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Immutable name → group resolver
#[derive(Debug, Clone)]
pub struct ExerciseCanonicalizer {
    groups: HashMap<GroupId, CanonicalExerciseGroup>,
    index: HashMap<String, GroupId>,
}

impl ExerciseCanonicalizer {
    /// Build from groups, rejecting a name claimed by two groups
    pub fn from_groups(groups: Vec<CanonicalExerciseGroup>) -> EngineResult<Self> {
        let mut index: HashMap<String, GroupId> = HashMap::new();
        let mut by_id = HashMap::new();

        for group in groups {
            if group.id.is_custom() {
                return Err(EngineError::Validation(format!(
                    "Catalog group id {} uses the reserved custom prefix",
                    group.id
                )));
            }
            let names = std::iter::once(group.id.as_str())
                .chain(std::iter::once(group.display_name.as_str()))
                .chain(group.variants.iter().map(String::as_str));

            for name in names {
                let key = normalize(name);
                if key.is_empty() {
                    continue;
                }
                match index.get(&key) {
                    Some(existing) if existing != &group.id => {
                        return Err(EngineError::Validation(format!(
                            "Exercise name '{}' claimed by both {} and {}",
                            name, existing, group.id
                        )));
                    }
                    _ => {
                        index.insert(key, group.id.clone());
                    }
                }
            }

            if by_id.insert(group.id.clone(), group).is_some() {
                return Err(EngineError::Validation("Duplicate exercise group id".into()));
            }
        }

        Ok(Self {
            groups: by_id,
            index,
        })
    }

    /// Canonicalizer over the built-in catalog
    pub fn standard() -> Self {
        STANDARD.clone()
    }

    pub fn resolve(&self, name_or_id: &str) -> GroupId {
        let normalized = normalize(name_or_id);
        if let Some(id) = self.index.get(&normalized) {
            return id.clone();
        }

        let mut tokens: Vec<&str> = normalized.split(' ').collect();
        while tokens.len() > 1 && MODIFIER_TOKENS.contains(&tokens[0]) {
            tokens.remove(0);
            if let Some(id) = self.index.get(&tokens.join(" ")) {
                return id.clone();
            }
        }

        GroupId::custom(&normalized)
    }

    pub fn group(&self, id: &GroupId) -> Option<&CanonicalExerciseGroup> {
        self.groups.get(id)
    }

    /// Catalog group or a synthesized custom group
    pub fn contains(&self, id: &GroupId) -> bool {
        id.is_custom() || self.groups.contains_key(id)
    }

    pub fn is_compound(&self, id: &GroupId) -> bool {
        self.group(id).map(|g| g.compound).unwrap_or(false)
    }

    pub fn is_big_three(&self, id: &GroupId) -> bool {
        self.group(id).map(|g| g.big_three).unwrap_or(false)
    }

    pub fn groups(&self) -> impl Iterator<Item = &CanonicalExerciseGroup> {
        self.groups.values()
    }
}

impl Default for ExerciseCanonicalizer {
    fn default() -> Self {
        Self::standard()
    }
}
