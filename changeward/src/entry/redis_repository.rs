use std::collections::HashMap;

use redis::aio::ConnectionManager;
use serde_json::Value;

use super::ChangeEntryRepository;
use crate::{
    errors::{MigrationError, MigrationResult},
    keys::{KeyContext, entry_field},
    runtime::scripts::CHANGE_ENTRY_SAVE_SCRIPT,
    types::{ChangeEntry, ChangeUnitKey},
};

/// Layout version written to the schema marker key.
pub const CHANGE_ENTRY_SCHEMA_VERSION: u32 = 1;

/// Change entries stored as JSON strings: a hash of the latest entry per unit
/// and a list holding every entry in write order.
#[derive(Clone)]
pub struct RedisChangeEntryRepository {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisChangeEntryRepository {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn keys(&self) -> KeyContext<'_> {
        KeyContext::new(&self.prefix)
    }
}

fn decode_all(raw: Vec<String>) -> MigrationResult<Vec<ChangeEntry>> {
    raw.iter()
        .map(|json| serde_json::from_str::<ChangeEntry>(json).map_err(MigrationError::from))
        .collect()
}

impl ChangeEntryRepository for RedisChangeEntryRepository {
    async fn initialize(&self) -> MigrationResult<()> {
        let mut conn = self.conn.clone();
        let schema_key = self.keys().change_schema();
        let _created: Option<String> = redis::cmd("SET")
            .arg(&schema_key)
            .arg(CHANGE_ENTRY_SCHEMA_VERSION)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        let stored: Option<u32> = redis::cmd("GET").arg(&schema_key).query_async(&mut conn).await?;
        match stored {
            Some(version) if version == CHANGE_ENTRY_SCHEMA_VERSION => Ok(()),
            other => Err(MigrationError::other(format!(
                "change entry layout version {other:?} under {schema_key} is not supported (expected {CHANGE_ENTRY_SCHEMA_VERSION})"
            ))),
        }
    }

    async fn find_latest(&self, key: &ChangeUnitKey) -> MigrationResult<Option<ChangeEntry>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(self.keys().change_state())
            .arg(entry_field(key))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(MigrationError::from))
            .transpose()
    }

    async fn save(&self, entry: &ChangeEntry) -> MigrationResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(entry)?;
        let keys = self.keys();
        let _length: i64 = CHANGE_ENTRY_SAVE_SCRIPT
            .key(keys.change_state())
            .key(keys.change_log())
            .arg(entry_field(&entry.key()))
            .arg(payload)
            .arg(if entry.run_always { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn latest_entries(&self) -> MigrationResult<Vec<ChangeEntry>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.keys().change_state())
            .query_async(&mut conn)
            .await?;
        let mut entries = decode_all(raw.into_values().collect())?;
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key().cmp(&b.key())));
        Ok(entries)
    }

    async fn history(&self) -> MigrationResult<Vec<ChangeEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(self.keys().change_log())
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        decode_all(raw)
    }

    async fn load_legacy_records(&self, origin: &str) -> MigrationResult<Vec<Value>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE").arg(origin).arg(0).arg(-1).query_async(&mut conn).await?;
        raw.iter()
            .map(|json| serde_json::from_str::<Value>(json).map_err(MigrationError::from))
            .collect()
    }
}
