use redis::aio::ConnectionManager;

use super::{ConnectionDriver, ForbiddenParametersMap};
use crate::{
    config::LockSettings,
    entry::{ChangeEntryService, RedisChangeEntryRepository},
    errors::MigrationResult,
    keys::{DEFAULT_LOCK_NAME, KeyContext},
    lock::{LockManager, RedisLockRepository},
    registry::Dependencies,
};

/// Name under which change units receive the Redis connection.
pub const CONNECTION_DEPENDENCY: &str = "connection";

/// Driver storing the lock and change entries in Redis under `prefix`.
pub struct RedisDriver {
    lock_repository: RedisLockRepository,
    change_entry_service: ChangeEntryService<RedisChangeEntryRepository>,
    lock_manager: LockManager<RedisLockRepository>,
    dependencies: Dependencies,
    forbidden: ForbiddenParametersMap,
}

impl RedisDriver {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, settings: LockSettings) -> Self {
        let prefix = prefix.into();
        let lock_repository = RedisLockRepository::new(conn.clone());
        let lock_key = KeyContext::new(&prefix).lock(DEFAULT_LOCK_NAME);
        Self {
            lock_manager: LockManager::new(lock_repository.clone(), settings, lock_key),
            lock_repository,
            change_entry_service: ChangeEntryService::new(RedisChangeEntryRepository::new(conn.clone(), prefix)),
            dependencies: Dependencies::new().with(CONNECTION_DEPENDENCY, conn),
            forbidden: ForbiddenParametersMap::driver_defaults(),
        }
    }

    /// Opens a connection manager for `url` and builds the driver over it.
    pub async fn connect(url: &str, prefix: impl Into<String>, settings: LockSettings) -> MigrationResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix, settings))
    }

    pub fn with_forbidden_parameters(mut self, forbidden: ForbiddenParametersMap) -> Self {
        self.forbidden = forbidden;
        self
    }
}

impl ConnectionDriver for RedisDriver {
    type LockRepo = RedisLockRepository;
    type EntryRepo = RedisChangeEntryRepository;

    fn lock_repository(&self) -> &RedisLockRepository {
        &self.lock_repository
    }

    fn change_entry_service(&self) -> &ChangeEntryService<RedisChangeEntryRepository> {
        &self.change_entry_service
    }

    fn lock_manager(&self) -> &LockManager<RedisLockRepository> {
        &self.lock_manager
    }

    fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    fn forbidden_parameters(&self) -> &ForbiddenParametersMap {
        &self.forbidden
    }
}
