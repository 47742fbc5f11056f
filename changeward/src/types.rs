use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity of a change unit: the `(change_id, author)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeUnitKey {
    pub change_id: String,
    pub author: String,
}

impl ChangeUnitKey {
    pub fn new(change_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            change_id: change_id.into(),
            author: author.into(),
        }
    }
}

impl fmt::Display for ChangeUnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.change_id, self.author)
    }
}

/// Outcome recorded for a change unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeState {
    Executed,
    RolledBack,
    Failed,
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Executed => "EXECUTED",
            Self::RolledBack => "ROLLED_BACK",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Persisted record of a finished change unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub change_id: String,
    pub author: String,
    pub state: ChangeState,
    pub timestamp: DateTime<Utc>,
    /// Identifier of the executor run that wrote the entry.
    pub execution_id: String,
    #[serde(default)]
    pub execution_millis: u64,
    #[serde(default)]
    pub run_always: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_version: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ChangeEntry {
    pub fn new(key: &ChangeUnitKey, state: ChangeState, execution_id: impl Into<String>) -> Self {
        Self {
            change_id: key.change_id.clone(),
            author: key.author.clone(),
            state,
            timestamp: Utc::now(),
            execution_id: execution_id.into(),
            execution_millis: 0,
            run_always: false,
            system_version: None,
            metadata: Map::new(),
        }
    }

    pub fn key(&self) -> ChangeUnitKey {
        ChangeUnitKey::new(&self.change_id, &self.author)
    }

    /// Whether this entry proves the unit must not run again.
    pub fn counts_as_executed(&self) -> bool {
        self.state == ChangeState::Executed && !self.run_always
    }
}

/// The single shared lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub key: String,
    pub owner: String,
    pub lock_until: DateTime<Utc>,
}

impl LockEntry {
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        self.lock_until > now
    }
}

/// Dotted version used for `start_system_version`/`end_system_version` bounds.
///
/// Numeric segments compare numerically, other segments lexically, and
/// missing trailing segments count as zero (`1.2` == `1.2.0`).
#[derive(Debug, Clone)]
pub struct SystemVersion {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Number(u64),
    Text(String),
}

impl SystemVersion {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .trim()
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.parse::<u64>() {
                Ok(number) => Segment::Number(number),
                Err(_) => Segment::Text(segment.to_ascii_lowercase()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `self` lies within `[start, end]`.
    pub fn is_between(&self, start: &SystemVersion, end: &SystemVersion) -> bool {
        self >= start && self <= end
    }
}

impl Ord for SystemVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let zero = Segment::Number(0);
        let len = self.segments.len().max(other.segments.len());
        for idx in 0..len {
            let left = self.segments.get(idx).unwrap_or(&zero);
            let right = other.segments.get(idx).unwrap_or(&zero);
            match left.cmp(right) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for SystemVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SystemVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SystemVersion {}

impl fmt::Display for SystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
