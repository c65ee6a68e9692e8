//! Data persistence layer.
//!
//! [`StoreOps`] is the row-level surface. Every engine write runs inside
//! [`ProgressionStore::atomically`], which hands the work a view whose reads
//! and writes form one unit: state read in the unit is what the unit
//! overwrites, and if the work fails nothing it wrote is kept. Per-user
//! serialization inside one engine is handled by the engine's locks; the unit
//! is what keeps engines sharing one database from losing each other's writes.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::challenge::ChallengeInstance;
use crate::error::{EngineResult, StorageError};
use crate::exercise::GroupId;
use crate::progression::ProgressionState;
use crate::records::PersonalRecord;
use uuid::Uuid;

pub type StorageResult<T> = Result<T, StorageError>;

pub trait StoreOps {
    fn load_progression(&self, user_id: &str) -> StorageResult<Option<ProgressionState>>;

    fn save_progression(&self, state: &ProgressionState) -> StorageResult<()>;

    /// Append to the personal-record log; existing entries are never rewritten
    fn append_records(&self, records: &[PersonalRecord]) -> StorageResult<()>;

    /// Log entries for one user and canonical group, oldest first
    fn records_for(&self, user_id: &str, group: &GroupId) -> StorageResult<Vec<PersonalRecord>>;

    fn insert_instance(&self, instance: &ChallengeInstance) -> StorageResult<()>;

    fn load_instance(&self, id: Uuid) -> StorageResult<Option<ChallengeInstance>>;

    /// All of a user's instances, oldest spawn first
    fn instances_for_user(&self, user_id: &str) -> StorageResult<Vec<ChallengeInstance>>;

    fn save_instance(&self, instance: &ChallengeInstance) -> StorageResult<()>;
}

pub trait ProgressionStore: StoreOps + Send + Sync {
    /// Run `work` as one atomic unit against this store.
    ///
    /// Writes made through the view are kept only when `work` returns `Ok`.
    /// Other writers to the same store wait until the unit is done. `work`
    /// must only touch the store through the view it is given.
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn StoreOps) -> EngineResult<()>,
    ) -> EngineResult<()>;
}
