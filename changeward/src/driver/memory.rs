use std::any::Any;

use super::{ConnectionDriver, ForbiddenParametersMap};
use crate::{
    config::LockSettings,
    entry::{ChangeEntryService, MemoryChangeEntryRepository},
    keys::DEFAULT_LOCK_NAME,
    lock::{LockManager, MemoryLockRepository},
    registry::Dependencies,
};

/// Driver over the in-memory adapters.
///
/// Drivers built with [`MemoryDriver::shared`] from clones of the same
/// repositories act like separate processes sharing one store.
pub struct MemoryDriver {
    lock_repository: MemoryLockRepository,
    change_entry_service: ChangeEntryService<MemoryChangeEntryRepository>,
    lock_manager: LockManager<MemoryLockRepository>,
    dependencies: Dependencies,
    forbidden: ForbiddenParametersMap,
}

impl MemoryDriver {
    pub fn new(settings: LockSettings) -> Self {
        Self::shared(MemoryLockRepository::new(), MemoryChangeEntryRepository::new(), settings)
    }

    pub fn shared(
        lock_repository: MemoryLockRepository,
        change_entries: MemoryChangeEntryRepository,
        settings: LockSettings,
    ) -> Self {
        Self {
            lock_manager: LockManager::new(lock_repository.clone(), settings, DEFAULT_LOCK_NAME),
            lock_repository,
            change_entry_service: ChangeEntryService::new(change_entries),
            dependencies: Dependencies::new(),
            forbidden: ForbiddenParametersMap::driver_defaults(),
        }
    }

    /// Replaces the random lock owner, e.g. to give simulated processes readable names.
    pub fn with_lock_owner(mut self, owner: impl Into<String>) -> Self {
        let settings = *self.lock_manager.settings();
        self.lock_manager = LockManager::with_owner(self.lock_repository.clone(), settings, DEFAULT_LOCK_NAME, owner);
        self
    }

    pub fn with_dependency<T>(mut self, name: impl Into<String>, instance: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.dependencies = self.dependencies.with(name, instance);
        self
    }

    pub fn with_forbidden_parameters(mut self, forbidden: ForbiddenParametersMap) -> Self {
        self.forbidden = forbidden;
        self
    }
}

impl ConnectionDriver for MemoryDriver {
    type LockRepo = MemoryLockRepository;
    type EntryRepo = MemoryChangeEntryRepository;

    fn lock_repository(&self) -> &MemoryLockRepository {
        &self.lock_repository
    }

    fn change_entry_service(&self) -> &ChangeEntryService<MemoryChangeEntryRepository> {
        &self.change_entry_service
    }

    fn lock_manager(&self) -> &LockManager<MemoryLockRepository> {
        &self.lock_manager
    }

    fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    fn forbidden_parameters(&self) -> &ForbiddenParametersMap {
        &self.forbidden
    }
}
