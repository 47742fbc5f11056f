//! Change-entry tracking: which change units have already run.

mod memory;
mod redis_repository;

pub use memory::MemoryChangeEntryRepository;
pub use redis_repository::{CHANGE_ENTRY_SCHEMA_VERSION, RedisChangeEntryRepository};

use log::info;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    errors::MigrationResult,
    types::{ChangeEntry, ChangeState, ChangeUnitKey},
};

/// Persistence contract for change entries.
///
/// Writes are not internally serialized: callers hold the shared lock.
#[allow(async_fn_in_trait)]
pub trait ChangeEntryRepository {
    /// Idempotently prepares storage. Safe to call on every process start.
    async fn initialize(&self) -> MigrationResult<()>;

    /// Latest entry recorded for a non-run-always unit.
    async fn find_latest(&self, key: &ChangeUnitKey) -> MigrationResult<Option<ChangeEntry>>;

    /// Appends to the history and, unless the entry is run-always, replaces the latest entry.
    async fn save(&self, entry: &ChangeEntry) -> MigrationResult<()>;

    async fn latest_entries(&self) -> MigrationResult<Vec<ChangeEntry>>;

    /// Every entry, oldest first.
    async fn history(&self) -> MigrationResult<Vec<ChangeEntry>>;

    /// Raw records left by a previous tool under `origin`.
    async fn load_legacy_records(&self, origin: &str) -> MigrationResult<Vec<Value>>;
}

/// Policy layer over a [`ChangeEntryRepository`].
pub struct ChangeEntryService<R> {
    repository: R,
}

impl<R> ChangeEntryService<R>
where
    R: ChangeEntryRepository,
{
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn initialize(&self) -> MigrationResult<()> {
        self.repository.initialize().await
    }

    /// True if a non-run-always EXECUTED entry exists for the unit.
    pub async fn is_already_executed(&self, change_id: &str, author: &str) -> MigrationResult<bool> {
        let key = ChangeUnitKey::new(change_id, author);
        Ok(self
            .repository
            .find_latest(&key)
            .await?
            .is_some_and(|entry| entry.counts_as_executed()))
    }

    /// Persists an entry. The caller must hold the lock.
    pub async fn save(&self, entry: &ChangeEntry) -> MigrationResult<()> {
        self.repository.save(entry).await
    }

    pub async fn entries(&self) -> MigrationResult<Vec<ChangeEntry>> {
        self.repository.latest_entries().await
    }

    pub async fn history(&self) -> MigrationResult<Vec<ChangeEntry>> {
        self.repository.history().await
    }

    pub async fn load_legacy_records(&self, origin: &str) -> MigrationResult<Vec<Value>> {
        self.repository.load_legacy_records(origin).await
    }

    /// Records an operator correction, e.g. marking a unit applied by hand.
    ///
    /// Like [`save`](Self::save), the caller must hold the lock; see
    /// [`ConnectionDriver::resolve_change`](crate::driver::ConnectionDriver::resolve_change).
    pub async fn resolve(&self, key: &ChangeUnitKey, state: ChangeState) -> MigrationResult<ChangeEntry> {
        let mut entry = ChangeEntry::new(key, state, format!("manual-{}", Uuid::new_v4()));
        entry.metadata.insert("resolved".into(), json!(true));
        self.repository.save(&entry).await?;
        info!("change unit {key} resolved as {state}");
        Ok(entry)
    }
}
