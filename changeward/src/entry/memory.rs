use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde_json::Value;

use super::ChangeEntryRepository;
use crate::{
    errors::MigrationResult,
    types::{ChangeEntry, ChangeUnitKey},
};

#[derive(Debug, Default)]
struct Tables {
    latest: HashMap<ChangeUnitKey, ChangeEntry>,
    history: Vec<ChangeEntry>,
    legacy: HashMap<String, Vec<Value>>,
}

/// In-process change-entry store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryChangeEntryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryChangeEntryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes records available to a legacy import reading `origin`.
    pub fn seed_legacy(&self, origin: impl Into<String>, records: Vec<Value>) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .legacy
            .insert(origin.into(), records);
    }
}

impl ChangeEntryRepository for MemoryChangeEntryRepository {
    async fn initialize(&self) -> MigrationResult<()> {
        Ok(())
    }

    async fn find_latest(&self, key: &ChangeUnitKey) -> MigrationResult<Option<ChangeEntry>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.latest.get(key).cloned())
    }

    async fn save(&self, entry: &ChangeEntry) -> MigrationResult<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if !entry.run_always {
            tables.latest.insert(entry.key(), entry.clone());
        }
        tables.history.push(entry.clone());
        Ok(())
    }

    async fn latest_entries(&self) -> MigrationResult<Vec<ChangeEntry>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = tables.latest.values().cloned().collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key().cmp(&b.key())));
        Ok(entries)
    }

    async fn history(&self) -> MigrationResult<Vec<ChangeEntry>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.history.clone())
    }

    async fn load_legacy_records(&self, origin: &str) -> MigrationResult<Vec<Value>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.legacy.get(origin).cloned().unwrap_or_default())
    }
}
