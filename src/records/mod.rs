//! Personal Record Detection
//!
//! Records are an append-only log. The "current best" for a canonical group
//! is folded from that log on demand ([`BestView::from_log`]) and never stored
//! on its own.
//!
//! Two independent axes are tracked per group:
//! - estimated one-rep max (Epley)
//! - most reps at a weight, with weights rounded to a bucket so that
//!   102.49 and 102.5 count as the same load

use crate::error::{EngineError, EngineResult};
use crate::exercise::{ExerciseCanonicalizer, GroupId};
use crate::workout::WorkoutSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Tolerance for comparing estimated maxes
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    EstimatedMax,
    RepMaxAtWeight,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::EstimatedMax => "estimated_max",
            RecordKind::RepMaxAtWeight => "rep_max_at_weight",
        }
    }
}

/// The set that produced a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSet {
    pub exercise: String,
    pub weight: f64,
    pub reps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecord {
    pub id: Uuid,
    pub user_id: String,
    pub group_id: GroupId,
    pub kind: RecordKind,
    /// Estimated max in load units, or a rep count
    pub value: f64,
    /// Rounded load for rep records
    pub weight_bucket: Option<f64>,
    pub achieved_at: DateTime<Utc>,
    pub source_set: SourceSet,
}

/// Epley estimate; a single rep is its own max
pub fn estimated_max(weight: f64, reps: u32) -> f64 {
    if weight <= 0.0 || reps == 0 {
        return 0.0;
    }
    if reps == 1 {
        return weight;
    }
    weight * (1.0 + reps as f64 / 30.0)
}

fn bucket_index(weight: f64, bucket: f64) -> i64 {
    (weight / bucket).round() as i64
}

/// Current bests for one (user, group), folded from the record log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BestView {
    pub estimated_max: f64,
    /// bucket index -> best reps
    pub rep_max_by_bucket: BTreeMap<i64, u32>,
    pub bucket_size: f64,
}

impl BestView {
    pub fn from_log(log: &[PersonalRecord], bucket_size: f64) -> Self {
        let mut view = BestView {
            bucket_size,
            ..Default::default()
        };
        for record in log {
            match record.kind {
                RecordKind::EstimatedMax => {
                    view.estimated_max = view.estimated_max.max(record.value);
                }
                RecordKind::RepMaxAtWeight => {
                    let weight = record.weight_bucket.unwrap_or(record.source_set.weight);
                    let reps = record.value.max(0.0).round() as u32;
                    let slot = view
                        .rep_max_by_bucket
                        .entry(bucket_index(weight, bucket_size))
                        .or_insert(0);
                    *slot = (*slot).max(reps);
                }
            }
        }
        view
    }

    pub fn rep_max_at(&self, weight: f64) -> u32 {
        self.rep_max_by_bucket
            .get(&bucket_index(weight, self.bucket_size))
            .copied()
            .unwrap_or(0)
    }
}

pub struct RecordDetector {
    bucket_size: f64,
}

impl RecordDetector {
    pub fn new(bucket_size: f64) -> EngineResult<Self> {
        if !(bucket_size.is_finite() && bucket_size > 0.0) {
            return Err(EngineError::Validation(format!(
                "Weight bucket must be positive, got {}",
                bucket_size
            )));
        }
        Ok(Self { bucket_size })
    }

    pub fn bucket_size(&self) -> f64 {
        self.bucket_size
    }

    /// Rounded load a weight is tracked under
    pub fn bucket(&self, weight: f64) -> f64 {
        bucket_index(weight, self.bucket_size) as f64 * self.bucket_size
    }

    /// Detect new records for `group_id` among `sets`, in submission order.
    ///
    /// Each set is compared against a running best seeded from `history`, so
    /// several sets in one workout can each set a record.
    pub fn detect_records(
        &self,
        canonicalizer: &ExerciseCanonicalizer,
        user_id: &str,
        group_id: &GroupId,
        history: &[PersonalRecord],
        sets: &[WorkoutSet],
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<PersonalRecord>> {
        if !canonicalizer.contains(group_id) {
            return Err(EngineError::NotFound(format!("exercise group {}", group_id)));
        }
        if let Some(bad) = sets.iter().find(|s| !s.weight.is_finite() || s.weight < 0.0) {
            return Err(EngineError::Validation(format!(
                "Invalid weight {} for {}",
                bad.weight, bad.exercise
            )));
        }

        let mut running = BestView::from_log(history, self.bucket_size);
        let mut found = Vec::new();

        for set in sets.iter().filter(|s| !s.is_warmup && s.reps > 0) {
            let source = SourceSet {
                exercise: set.exercise.clone(),
                weight: set.weight,
                reps: set.reps,
            };

            let e1rm = estimated_max(set.weight, set.reps);
            if e1rm > running.estimated_max + EPSILON {
                running.estimated_max = e1rm;
                found.push(PersonalRecord {
                    id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    group_id: group_id.clone(),
                    kind: RecordKind::EstimatedMax,
                    value: e1rm,
                    weight_bucket: None,
                    achieved_at: now,
                    source_set: source.clone(),
                });
            }

            let index = bucket_index(set.weight, self.bucket_size);
            let best_reps = running.rep_max_by_bucket.entry(index).or_insert(0);
            if set.reps > *best_reps {
                *best_reps = set.reps;
                found.push(PersonalRecord {
                    id: Uuid::new_v4(),
                    user_id: user_id.to_string(),
                    group_id: group_id.clone(),
                    kind: RecordKind::RepMaxAtWeight,
                    value: set.reps as f64,
                    weight_bucket: Some(index as f64 * self.bucket_size),
                    achieved_at: now,
                    source_set: source,
                });
            }
        }

        if !found.is_empty() {
            debug!(
                "{} new records for {} on {}",
                found.len(),
                user_id,
                group_id
            );
        }
        Ok(found)
    }
}

/// Number of sets that produced at least one record. A set that raises
/// both axes emits two adjacent records but counts once.
pub fn count_record_sets(records: &[PersonalRecord]) -> u32 {
    let mut count = 0;
    let mut previous: Option<&PersonalRecord> = None;
    for record in records {
        let same_set = previous.map_or(false, |p| {
            p.group_id == record.group_id && p.source_set == record.source_set
        });
        if !same_set {
            count += 1;
        }
        previous = Some(record);
    }
    count
}

impl Default for RecordDetector {
    fn default() -> Self {
        Self { bucket_size: 2.5 }
    }
}
