use std::{collections::HashMap, time::Duration};

use chrono::DateTime;
use redis::aio::ConnectionManager;

use super::LockRepository;
use crate::{
    errors::{MigrationError, MigrationResult},
    runtime::scripts::{
        LOCK_ACQUIRE_SCRIPT, LOCK_EXTEND_SCRIPT, LOCK_HELD_BY_OTHER_SCRIPT, LOCK_RELEASE_SCRIPT, lock_scripts,
    },
    types::LockEntry,
};

/// Lock store backed by a Redis hash.
///
/// Every primitive runs as a Lua script and reads the Redis server clock, so
/// lease expiry does not depend on the clocks of competing processes.
#[derive(Clone)]
pub struct RedisLockRepository {
    conn: ConnectionManager,
}

impl RedisLockRepository {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn lease_millis(lease: Duration) -> u64 {
    u64::try_from(lease.as_millis()).unwrap_or(u64::MAX)
}

impl LockRepository for RedisLockRepository {
    async fn initialize(&self) -> MigrationResult<()> {
        let mut conn = self.conn.clone();
        for body in lock_scripts() {
            let _sha: String = redis::cmd("SCRIPT").arg("LOAD").arg(body).query_async(&mut conn).await?;
        }
        Ok(())
    }

    async fn acquire(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        let mut conn = self.conn.clone();
        let acquired: i64 = LOCK_ACQUIRE_SCRIPT
            .key(key)
            .arg(owner)
            .arg(lease_millis(lease))
            .arg(key)
            .invoke_async(&mut conn)
            .await?;
        Ok(acquired == 1)
    }

    async fn extend(&self, key: &str, owner: &str, lease: Duration) -> MigrationResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = LOCK_EXTEND_SCRIPT
            .key(key)
            .arg(owner)
            .arg(lease_millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release(&self, key: &str, owner: &str) -> MigrationResult<()> {
        let mut conn = self.conn.clone();
        let _released: i64 = LOCK_RELEASE_SCRIPT.key(key).arg(owner).invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn is_held_by_someone_else(&self, key: &str, owner: &str) -> MigrationResult<bool> {
        let mut conn = self.conn.clone();
        let held: i64 = LOCK_HELD_BY_OTHER_SCRIPT.key(key).arg(owner).invoke_async(&mut conn).await?;
        Ok(held == 1)
    }

    async fn find(&self, key: &str) -> MigrationResult<Option<LockEntry>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?;
        let (Some(owner), Some(lock_until)) = (fields.get("owner"), fields.get("lock_until")) else {
            return Ok(None);
        };
        let lock_until = lock_until
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| MigrationError::other(format!("lock record {key} has an invalid lock_until")))?;
        Ok(Some(LockEntry {
            key: fields.get("key").cloned().unwrap_or_else(|| key.to_string()),
            owner: owner.clone(),
            lock_until,
        }))
    }
}
