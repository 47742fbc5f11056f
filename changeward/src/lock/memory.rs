use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::Utc;

use super::{LockRepository, to_chrono};
use crate::{errors::MigrationResult, types::LockEntry};

/// In-process lock store. Clones share the same records, so several
/// drivers built from clones behave like processes sharing one database.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockRepository {
    records: Arc<Mutex<HashMap<String, LockEntry>>>,
}

impl MemoryLockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a record directly, bypassing the compare-and-swap rules.
    pub fn force(&self, entry: LockEntry) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.key.clone(), entry);
    }
}

impl LockRepository for MemoryLockRepository {
    async fn initialize(&self) -> MigrationResult<()> {
        Ok(())
    }

    async fn acquire(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = records.get(key)
            && current.owner != owner
            && current.is_held_at(now)
        {
            return Ok(false);
        }
        records.insert(
            key.to_string(),
            LockEntry {
                key: key.to_string(),
                owner: owner.to_string(),
                lock_until: now + to_chrono(lease),
            },
        );
        Ok(true)
    }

    async fn extend(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(key) {
            Some(current) if current.owner == owner => {
                current.lock_until = now + to_chrono(lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, owner: &str) -> MigrationResult<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.get(key).is_some_and(|current| current.owner == owner) {
            records.remove(key);
        }
        Ok(())
    }

    async fn is_held_by_someone_else(&self, key: &str, owner: &str) -> MigrationResult<bool> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(key)
            .is_some_and(|current| current.owner != owner && current.is_held_at(Utc::now())))
    }

    async fn find(&self, key: &str) -> MigrationResult<Option<LockEntry>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }
}
