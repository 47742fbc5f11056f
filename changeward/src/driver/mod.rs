//! Connection drivers: the wiring between storage adapters and the executor.
//!
//! A driver owns a lock repository, a change-entry service and the lock
//! manager built over them, lends them to the executor, and validates the
//! static configuration before anything is locked.

mod memory;
mod redis_driver;
mod validation;

use std::{collections::BTreeMap, time::Duration};

use log::warn;

pub use memory::MemoryDriver;
pub use redis_driver::{CONNECTION_DEPENDENCY, RedisDriver};
pub use validation::validate;

use crate::{
    change::ChangeCatalog,
    config::{LockSettings, MigrationConfig},
    entry::{ChangeEntryRepository, ChangeEntryService},
    errors::{ConfigurationError, MigrationResult},
    lock::{LockManager, LockRepository},
    registry::Dependencies,
    types::{ChangeEntry, ChangeState, ChangeUnitKey},
};

/// Parameter name under which drivers refuse to hand out their lock store.
pub const LOCK_REPOSITORY_PARAMETER: &str = "lock_repository";
/// Parameter name under which drivers refuse to hand out their change-entry store.
pub const CHANGE_ENTRY_REPOSITORY_PARAMETER: &str = "change_entry_repository";

#[allow(async_fn_in_trait)]
pub trait ConnectionDriver {
    type LockRepo: LockRepository;
    type EntryRepo: ChangeEntryRepository;

    fn lock_repository(&self) -> &Self::LockRepo;

    fn change_entry_service(&self) -> &ChangeEntryService<Self::EntryRepo>;

    fn lock_manager(&self) -> &LockManager<Self::LockRepo>;

    /// Resources the driver lends to change units.
    fn dependencies(&self) -> &Dependencies;

    fn forbidden_parameters(&self) -> &ForbiddenParametersMap;

    /// Prepares the lock store, then change tracking.
    ///
    /// The order matters: change tracking is never trusted without lock
    /// infrastructure, even if a crash interrupts initialization.
    async fn initialize(&self) -> MigrationResult<()> {
        self.lock_repository().initialize().await?;
        self.change_entry_service().initialize().await
    }

    /// Records an operator correction while holding the lock.
    ///
    /// Makes a single acquisition attempt: a lock held by a running migration
    /// fails with `LockNotAvailable` instead of racing its writes.
    async fn resolve_change(&self, key: &ChangeUnitKey, state: ChangeState) -> MigrationResult<ChangeEntry> {
        let base = self.lock_manager().settings();
        let lock = self
            .lock_manager()
            .scoped(LockSettings::new(base.lock_acquired_for, 1, Duration::ZERO));
        lock.acquire_lock_default().await?;

        let outcome = self.change_entry_service().resolve(key, state).await;
        if let Err(err) = lock.release_lock_default().await {
            warn!("failed to release lock after resolving {key}: {err}");
        }
        outcome
    }

    /// Checks the configuration and catalog once, before any lock attempt.
    ///
    /// `extra` holds dependencies supplied by the caller on top of the driver's own.
    fn run_validation(
        &self,
        config: &MigrationConfig,
        catalog: &ChangeCatalog,
        extra: &Dependencies,
    ) -> Result<(), ConfigurationError> {
        let available = self.dependencies().merged(extra);
        let settings = config.lock_settings(self.lock_manager().settings());
        validate(
            config,
            &settings,
            catalog,
            &available,
            self.forbidden_parameters(),
        )
    }
}

/// Parameters a driver disallows, alone or in combination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForbiddenParametersMap {
    forbidden: BTreeMap<String, String>,
    exclusive: Vec<(String, String)>,
}

impl ForbiddenParametersMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbids `name`; `hint` tells the user what to use instead.
    pub fn forbid(mut self, name: impl Into<String>, hint: impl Into<String>) -> Self {
        self.forbidden.insert(name.into(), hint.into());
        self
    }

    /// Forbids setting `left` and `right` together.
    pub fn forbid_together(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.exclusive.push((left.into(), right.into()));
        self
    }

    pub fn hint(&self, name: &str) -> Option<&str> {
        self.forbidden.get(name).map(String::as_str)
    }

    pub fn is_forbidden(&self, name: &str) -> bool {
        self.forbidden.contains_key(name)
    }

    pub fn exclusive_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exclusive.iter().map(|(left, right)| (left.as_str(), right.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty() && self.exclusive.is_empty()
    }

    /// The map every bundled driver starts from: change units never get the driver's own stores.
    pub fn driver_defaults() -> Self {
        Self::new()
            .forbid(
                LOCK_REPOSITORY_PARAMETER,
                "the lock record is managed by the executor; change units must not touch it",
            )
            .forbid(
                CHANGE_ENTRY_REPOSITORY_PARAMETER,
                "change entries are written by the executor after each unit succeeds",
            )
    }
}
