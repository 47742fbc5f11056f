//! Import of change-tracking records written by a previous migration tool.
//!
//! Legacy records are arbitrary JSON objects. `LegacyMigrationMappingFields`
//! names the properties that hold each piece of a change entry; every record
//! that names a change id and an author becomes an EXECUTED entry.

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{ChangeEntry, ChangeState, ChangeUnitKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyMigration {
    /// Collection (Redis key) holding the legacy records.
    pub origin: String,
    #[serde(default)]
    pub mapping_fields: LegacyMigrationMappingFields,
    /// Re-import on every run instead of once.
    #[serde(default)]
    pub run_always: bool,
}

impl LegacyMigration {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            mapping_fields: LegacyMigrationMappingFields::default(),
            run_always: false,
        }
    }

    pub fn with_mapping_fields(mut self, mapping_fields: LegacyMigrationMappingFields) -> Self {
        self.mapping_fields = mapping_fields;
        self
    }

    pub fn with_run_always(mut self, run_always: bool) -> Self {
        self.run_always = run_always;
        self
    }

    /// Converts raw records into change entries, skipping records without an identity.
    pub fn convert(&self, records: &[Value], execution_id: &str) -> Vec<ChangeEntry> {
        records
            .iter()
            .filter_map(|record| {
                let entry = self.mapping_fields.map_record(record, execution_id);
                if entry.is_none() {
                    warn!("skipping legacy record from {} without change id or author", self.origin);
                }
                entry
            })
            .map(|mut entry| {
                entry
                    .metadata
                    .insert("legacy_origin".into(), Value::String(self.origin.clone()));
                entry
            })
            .collect()
    }
}

/// Property names used to read legacy records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyMigrationMappingFields {
    pub change_id: String,
    pub author: String,
    pub timestamp: Option<String>,
    pub change_log_class: Option<String>,
    pub change_set_method: Option<String>,
    pub metadata: Option<String>,
}

impl Default for LegacyMigrationMappingFields {
    fn default() -> Self {
        Self {
            change_id: "changeId".into(),
            author: "author".into(),
            timestamp: Some("timestamp".into()),
            change_log_class: Some("changeLogClass".into()),
            change_set_method: Some("changeSetMethod".into()),
            metadata: Some("metadata".into()),
        }
    }
}

impl LegacyMigrationMappingFields {
    fn map_record(&self, record: &Value, execution_id: &str) -> Option<ChangeEntry> {
        let change_id = string_field(record, &self.change_id)?;
        let author = string_field(record, &self.author)?;
        let mut entry = ChangeEntry::new(&ChangeUnitKey::new(change_id, author), ChangeState::Executed, execution_id);

        if let Some(timestamp) = self.timestamp.as_deref().and_then(|field| record.get(field)) {
            match parse_timestamp(timestamp) {
                Some(parsed) => entry.timestamp = parsed,
                None => warn!("legacy record {} has an unreadable timestamp", entry.key()),
            }
        }

        let mut metadata = Map::new();
        if let Some(value) = self.change_log_class.as_deref().and_then(|field| string_field(record, field)) {
            metadata.insert("change_log_class".into(), Value::String(value));
        }
        if let Some(value) = self.change_set_method.as_deref().and_then(|field| string_field(record, field)) {
            metadata.insert("change_set_method".into(), Value::String(value));
        }
        match self.metadata.as_deref().and_then(|field| record.get(field)) {
            Some(Value::Object(map)) => metadata.extend(map.clone()),
            Some(Value::Null) | None => {}
            Some(other) => {
                metadata.insert("legacy_metadata".into(), other.clone());
            }
        }
        entry.metadata = metadata;
        Some(entry)
    }
}

fn string_field(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(millis) => millis
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
