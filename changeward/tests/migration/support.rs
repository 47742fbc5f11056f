pub(crate) use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub(crate) use changeward::{
    ChangeCatalog, ChangeContext, ChangeEntry, ChangeState, ChangeUnit, ChangeUnitDescriptor, ChangeUnitKey,
    ConnectionDriver, FailurePhase, LockFailure, LockManager, LockRepository, LockSettings, MemoryDriver,
    MigrationConfig, MigrationError, MigrationExecutor, RunState,
    entry::{ChangeEntryService, MemoryChangeEntryRepository},
    errors::MigrationResult,
    keys::DEFAULT_LOCK_NAME,
    lock::MemoryLockRepository,
    registry::Dependencies,
    types::LockEntry,
};
pub(crate) use chrono::Utc;

use changeward::ForbiddenParametersMap;

/// Long lease, single attempt: for runs that never contend.
pub(crate) fn quick_settings() -> LockSettings {
    LockSettings::new(Duration::from_secs(60), 1, Duration::ZERO)
}

/// Settings for processes that wait on each other.
pub(crate) fn patient_settings() -> LockSettings {
    LockSettings::new(Duration::from_secs(60), 400, Duration::from_secs(4)).with_retry_interval(Duration::from_millis(10))
}

/// Drivers over one shared store, one per simulated process.
pub(crate) fn processes(count: usize, settings: LockSettings) -> Vec<MemoryDriver> {
    let locks = MemoryLockRepository::new();
    let entries = MemoryChangeEntryRepository::new();
    (0..count)
        .map(|idx| {
            MemoryDriver::shared(locks.clone(), entries.clone(), settings).with_lock_owner(format!("process-{idx}"))
        })
        .collect()
}

/// Order in which delegates ran, shared across runs.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn record(&self, id: &str) {
        self.0.lock().unwrap().push(id.to_string());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A unit that appends its id to `journal` and succeeds.
pub(crate) fn recorded(descriptor: ChangeUnitDescriptor, journal: &Journal) -> ChangeUnit {
    let journal = journal.clone();
    ChangeUnit::new(descriptor, move |ctx: ChangeContext| {
        let journal = journal.clone();
        async move {
            journal.record(&ctx.key().change_id);
            anyhow::Ok(())
        }
    })
}

/// A unit whose delegate always fails.
pub(crate) fn failing(descriptor: ChangeUnitDescriptor) -> ChangeUnit {
    ChangeUnit::new(descriptor, |ctx: ChangeContext| async move {
        Err::<(), _>(anyhow::anyhow!("{} exploded", ctx.key()))
    })
}

pub(crate) fn change_ids(entries: &[ChangeEntry]) -> Vec<String> {
    entries.iter().map(|entry| entry.change_id.clone()).collect()
}

pub(crate) fn foreign_lock(owner: &str, lease: chrono::Duration) -> LockEntry {
    LockEntry {
        key: DEFAULT_LOCK_NAME.into(),
        owner: owner.into(),
        lock_until: Utc::now() + lease,
    }
}

/// In-memory lock store that counts acquisition attempts.
#[derive(Clone, Default)]
pub(crate) struct CountingLockRepository {
    pub(crate) inner: MemoryLockRepository,
    acquires: Arc<AtomicUsize>,
}

impl CountingLockRepository {
    pub(crate) fn acquire_attempts(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }
}

impl LockRepository for CountingLockRepository {
    async fn initialize(&self) -> MigrationResult<()> {
        self.inner.initialize().await
    }

    async fn acquire(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire(key, owner, lease).await
    }

    async fn extend(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        self.inner.extend(key, owner, lease).await
    }

    async fn release(&self, key: &str, owner: &str) -> MigrationResult<()> {
        self.inner.release(key, owner).await
    }

    async fn is_held_by_someone_else(&self, key: &str, owner: &str) -> MigrationResult<bool> {
        self.inner.is_held_by_someone_else(key, owner).await
    }

    async fn find(&self, key: &str) -> MigrationResult<Option<LockEntry>> {
        self.inner.find(key).await
    }
}

/// Driver wired to a [`CountingLockRepository`].
pub(crate) struct CountingDriver {
    locks: CountingLockRepository,
    entries: ChangeEntryService<MemoryChangeEntryRepository>,
    manager: LockManager<CountingLockRepository>,
    dependencies: Dependencies,
    forbidden: ForbiddenParametersMap,
}

impl CountingDriver {
    pub(crate) fn new(locks: CountingLockRepository, settings: LockSettings) -> Self {
        Self {
            manager: LockManager::new(locks.clone(), settings, DEFAULT_LOCK_NAME),
            locks,
            entries: ChangeEntryService::new(MemoryChangeEntryRepository::new()),
            dependencies: Dependencies::new(),
            forbidden: ForbiddenParametersMap::driver_defaults(),
        }
    }
}

impl ConnectionDriver for CountingDriver {
    type LockRepo = CountingLockRepository;
    type EntryRepo = MemoryChangeEntryRepository;

    fn lock_repository(&self) -> &CountingLockRepository {
        &self.locks
    }

    fn change_entry_service(&self) -> &ChangeEntryService<MemoryChangeEntryRepository> {
        &self.entries
    }

    fn lock_manager(&self) -> &LockManager<CountingLockRepository> {
        &self.manager
    }

    fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    fn forbidden_parameters(&self) -> &ForbiddenParametersMap {
        &self.forbidden
    }
}
