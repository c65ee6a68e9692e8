//! In-process store, used by tests and embedders that persist elsewhere.

use super::{ProgressionStore, StorageResult, StoreOps};
use crate::challenge::ChallengeInstance;
use crate::error::EngineResult;
use crate::exercise::GroupId;
use crate::progression::ProgressionState;
use crate::records::PersonalRecord;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default, Clone)]
struct Inner {
    progression: HashMap<String, ProgressionState>,
    records: HashMap<(String, GroupId), Vec<PersonalRecord>>,
    instances: HashMap<Uuid, ChallengeInstance>,
}

impl Inner {
    fn append_records(&mut self, records: &[PersonalRecord]) {
        for record in records {
            self.records
                .entry((record.user_id.clone(), record.group_id.clone()))
                .or_default()
                .push(record.clone());
        }
    }

    fn records_for(&self, user_id: &str, group: &GroupId) -> Vec<PersonalRecord> {
        self.records
            .get(&(user_id.to_string(), group.clone()))
            .cloned()
            .unwrap_or_default()
    }

    fn instances_for_user(&self, user_id: &str) -> Vec<ChallengeInstance> {
        let mut list: Vec<ChallengeInstance> = self
            .instances
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by_key(|i| i.spawned_at);
        list
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreOps for MemoryStore {
    fn load_progression(&self, user_id: &str) -> StorageResult<Option<ProgressionState>> {
        Ok(self.inner.read().progression.get(user_id).cloned())
    }

    fn save_progression(&self, state: &ProgressionState) -> StorageResult<()> {
        self.inner
            .write()
            .progression
            .insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    fn append_records(&self, records: &[PersonalRecord]) -> StorageResult<()> {
        self.inner.write().append_records(records);
        Ok(())
    }

    fn records_for(&self, user_id: &str, group: &GroupId) -> StorageResult<Vec<PersonalRecord>> {
        Ok(self.inner.read().records_for(user_id, group))
    }

    fn insert_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        self.inner
            .write()
            .instances
            .insert(instance.id, instance.clone());
        Ok(())
    }

    fn load_instance(&self, id: Uuid) -> StorageResult<Option<ChallengeInstance>> {
        Ok(self.inner.read().instances.get(&id).cloned())
    }

    fn instances_for_user(&self, user_id: &str) -> StorageResult<Vec<ChallengeInstance>> {
        Ok(self.inner.read().instances_for_user(user_id))
    }

    fn save_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        self.insert_instance(instance)
    }
}

/// Staged copy of the store, written back only when the unit succeeds
struct MemoryUnit {
    staged: Mutex<Inner>,
}

impl StoreOps for MemoryUnit {
    fn load_progression(&self, user_id: &str) -> StorageResult<Option<ProgressionState>> {
        Ok(self.staged.lock().progression.get(user_id).cloned())
    }

    fn save_progression(&self, state: &ProgressionState) -> StorageResult<()> {
        self.staged
            .lock()
            .progression
            .insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    fn append_records(&self, records: &[PersonalRecord]) -> StorageResult<()> {
        self.staged.lock().append_records(records);
        Ok(())
    }

    fn records_for(&self, user_id: &str, group: &GroupId) -> StorageResult<Vec<PersonalRecord>> {
        Ok(self.staged.lock().records_for(user_id, group))
    }

    fn insert_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        self.staged
            .lock()
            .instances
            .insert(instance.id, instance.clone());
        Ok(())
    }

    fn load_instance(&self, id: Uuid) -> StorageResult<Option<ChallengeInstance>> {
        Ok(self.staged.lock().instances.get(&id).cloned())
    }

    fn instances_for_user(&self, user_id: &str) -> StorageResult<Vec<ChallengeInstance>> {
        Ok(self.staged.lock().instances_for_user(user_id))
    }

    fn save_instance(&self, instance: &ChallengeInstance) -> StorageResult<()> {
        self.insert_instance(instance)
    }
}

impl ProgressionStore for MemoryStore {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn StoreOps) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write();
        let unit = MemoryUnit {
            staged: Mutex::new(inner.clone()),
        };
        work(&unit)?;
        *inner = unit.staged.into_inner();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use chrono::Utc;

    #[test]
    fn test_failed_unit_keeps_nothing() {
        let store = MemoryStore::new();
        let mut state = ProgressionState::new("u1", Utc::now());
        state.total_xp = 10;
        store.save_progression(&state).unwrap();

        let result = store.atomically(&mut |tx: &dyn StoreOps| -> EngineResult<()> {
            let mut state = tx.load_progression("u1")?.unwrap();
            state.total_xp += 90;
            tx.save_progression(&state)?;
            Err(EngineError::Validation("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.load_progression("u1").unwrap().unwrap().total_xp, 10);

        store
            .atomically(&mut |tx: &dyn StoreOps| -> EngineResult<()> {
                let mut state = tx.load_progression("u1")?.unwrap();
                state.total_xp += 90;
                tx.save_progression(&state)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.load_progression("u1").unwrap().unwrap().total_xp, 100);
    }
}
