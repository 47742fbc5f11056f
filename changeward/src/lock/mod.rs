//! Distributed lock: the repository contract and the policy layer above it.
//!
//! - `LockRepository` - atomic acquire/extend/release over one shared record
//! - `LockManager` - bounded retries, keep-alive and release for one owner
//! - `MemoryLockRepository` / `RedisLockRepository` - bundled adapters

mod manager;
mod memory;
mod redis_repository;

use std::time::Duration;

pub use manager::LockManager;
pub use memory::MemoryLockRepository;
pub use redis_repository::RedisLockRepository;

use crate::{errors::MigrationResult, types::LockEntry};

/// Persistence contract for the shared lock record.
///
/// `acquire` and `extend` must be atomic relative to the store: they succeed
/// only if no other owner holds an unexpired lease, or the caller already
/// holds it. Competing acquirers get no fairness guarantee.
#[allow(async_fn_in_trait)]
pub trait LockRepository {
    /// Idempotently prepares storage. Safe to call on every process start.
    async fn initialize(&self) -> MigrationResult<()>;

    async fn acquire(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool>;

    async fn extend(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool>;

    /// Removes the record if `owner` holds it; otherwise does nothing.
    async fn release(&self, key: &str, owner: &str) -> MigrationResult<()>;

    async fn is_held_by_someone_else(&self, key: &str, owner: &str) -> MigrationResult<bool>;

    async fn find(&self, key: &str) -> MigrationResult<Option<LockEntry>>;
}

impl<R> LockRepository for &R
where
    R: LockRepository,
{
    async fn initialize(&self) -> MigrationResult<()> {
        (**self).initialize().await
    }

    async fn acquire(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        (**self).acquire(key, owner, lease).await
    }

    async fn extend(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        (**self).extend(key, owner, lease).await
    }

    async fn release(&self, key: &str, owner: &str) -> MigrationResult<()> {
        (**self).release(key, owner).await
    }

    async fn is_held_by_someone_else(&self, key: &str, owner: &str) -> MigrationResult<bool> {
        (**self).is_held_by_someone_else(key, owner).await
    }

    async fn find(&self, key: &str) -> MigrationResult<Option<LockEntry>> {
        (**self).find(key).await
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52))
}
