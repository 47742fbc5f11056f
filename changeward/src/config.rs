//! Immutable run configuration.
//!
//! `MigrationConfig` is deserialized once (from TOML or built in code), checked
//! by driver validation, and then only read. Lock timings live in
//! [`LockSettings`], which a driver receives at construction; the lock
//! options of a config override them for one run.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    errors::{ConfigurationError, ConfigurationIssue},
    legacy::LegacyMigration,
    types::SystemVersion,
};

pub const DEFAULT_LOCK_ACQUIRED_FOR_MINUTES: u64 = 3;
pub const DEFAULT_MAX_WAITING_FOR_LOCK_MINUTES: u64 = 4;
pub const DEFAULT_MAX_TRIES: u32 = 3;
pub const DEFAULT_START_SYSTEM_VERSION: &str = "0";
pub const DEFAULT_END_SYSTEM_VERSION: &str = "2147483647";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Packages scanned by the host's discovery step. Carried for the host, unused here.
    pub change_logs_scan_package: Vec<String>,
    pub start_system_version: String,
    pub end_system_version: String,
    /// Lock options left unset fall back to the driver's [`LockSettings`].
    pub lock_acquired_for_minutes: Option<u64>,
    pub max_tries: Option<u32>,
    pub max_waiting_for_lock_minutes: Option<u64>,
    pub throw_exception_if_cannot_obtain_lock: bool,
    pub enabled: bool,
    /// Attached verbatim to every change entry written by the run.
    pub metadata: Map<String, Value>,
    pub legacy_migration: Option<LegacyMigration>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            change_logs_scan_package: Vec::new(),
            start_system_version: DEFAULT_START_SYSTEM_VERSION.to_string(),
            end_system_version: DEFAULT_END_SYSTEM_VERSION.to_string(),
            lock_acquired_for_minutes: None,
            max_tries: None,
            max_waiting_for_lock_minutes: None,
            throw_exception_if_cannot_obtain_lock: false,
            enabled: true,
            metadata: Map::new(),
            legacy_migration: None,
        }
    }
}

impl MigrationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(raw).map_err(|err| ConfigurationError::single("config", "parse_error", err.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ConfigurationError::single(
                "config",
                "unreadable",
                format!("failed to read {}: {err}", path.display()),
            )
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_throw_exception_if_cannot_obtain_lock(mut self, throw: bool) -> Self {
        self.throw_exception_if_cannot_obtain_lock = throw;
        self
    }

    pub fn with_lock_acquired_for_minutes(mut self, minutes: u64) -> Self {
        self.lock_acquired_for_minutes = Some(minutes);
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    pub fn with_max_waiting_for_lock_minutes(mut self, minutes: u64) -> Self {
        self.max_waiting_for_lock_minutes = Some(minutes);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_system_versions(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_system_version = start.into();
        self.end_system_version = end.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_legacy_migration(mut self, legacy: LegacyMigration) -> Self {
        self.legacy_migration = Some(legacy);
        self
    }

    pub fn start_version(&self) -> SystemVersion {
        SystemVersion::parse(&self.start_system_version)
    }

    pub fn end_version(&self) -> SystemVersion {
        SystemVersion::parse(&self.end_system_version)
    }

    /// The settings a run uses: `base` with every lock option of this config applied.
    ///
    /// Derived knobs fall back to their defaults once an option they derive from is overridden.
    pub fn lock_settings(&self, base: &LockSettings) -> LockSettings {
        let mut settings = *base;
        if let Some(minutes) = self.lock_acquired_for_minutes {
            settings.lock_acquired_for = from_minutes(minutes);
            settings.refresh_margin = None;
        }
        if let Some(max_tries) = self.max_tries {
            settings.max_tries = max_tries;
            settings.retry_interval = None;
        }
        if let Some(minutes) = self.max_waiting_for_lock_minutes {
            settings.max_waiting_for_lock = from_minutes(minutes);
            settings.retry_interval = None;
        }
        settings
    }

    /// Names of the options that are set or differ from their defaults.
    ///
    /// Forbidden-parameter validation checks these names.
    pub fn set_options(&self) -> Vec<&'static str> {
        let defaults = Self::default();
        let mut set = Vec::new();
        if !self.change_logs_scan_package.is_empty() {
            set.push("change_logs_scan_package");
        }
        if self.start_system_version != defaults.start_system_version {
            set.push("start_system_version");
        }
        if self.end_system_version != defaults.end_system_version {
            set.push("end_system_version");
        }
        if self.lock_acquired_for_minutes.is_some() {
            set.push("lock_acquired_for_minutes");
        }
        if self.max_tries.is_some() {
            set.push("max_tries");
        }
        if self.max_waiting_for_lock_minutes.is_some() {
            set.push("max_waiting_for_lock_minutes");
        }
        if self.throw_exception_if_cannot_obtain_lock {
            set.push("throw_exception_if_cannot_obtain_lock");
        }
        if !self.enabled {
            set.push("enabled");
        }
        if !self.metadata.is_empty() {
            set.push("metadata");
        }
        if self.legacy_migration.is_some() {
            set.push("legacy_migration");
        }
        set
    }

    pub(crate) fn issues(&self) -> Vec<ConfigurationIssue> {
        let mut issues = Vec::new();
        if self.start_version() > self.end_version() {
            issues.push(ConfigurationIssue::new(
                "start_system_version",
                "inverted_bounds",
                format!(
                    "start_system_version {} is greater than end_system_version {}",
                    self.start_system_version, self.end_system_version
                ),
            ));
        }
        if let Some(legacy) = &self.legacy_migration
            && legacy.origin.trim().is_empty()
        {
            issues.push(ConfigurationIssue::new(
                "legacy_migration.origin",
                "missing",
                "legacy migration origin must name the collection to import",
            ));
        }
        issues
    }
}

/// Lock timing policy, immutable for the lifetime of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub lock_acquired_for: Duration,
    pub max_tries: u32,
    pub max_waiting_for_lock: Duration,
    retry_interval: Option<Duration>,
    refresh_margin: Option<Duration>,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self::from_minutes(
            DEFAULT_LOCK_ACQUIRED_FOR_MINUTES,
            DEFAULT_MAX_TRIES,
            DEFAULT_MAX_WAITING_FOR_LOCK_MINUTES,
        )
    }
}

impl LockSettings {
    pub fn new(lock_acquired_for: Duration, max_tries: u32, max_waiting_for_lock: Duration) -> Self {
        Self {
            lock_acquired_for,
            max_tries,
            max_waiting_for_lock,
            retry_interval: None,
            refresh_margin: None,
        }
    }

    pub fn from_minutes(lock_acquired_for_minutes: u64, max_tries: u32, max_waiting_for_lock_minutes: u64) -> Self {
        Self::new(
            from_minutes(lock_acquired_for_minutes),
            max_tries,
            from_minutes(max_waiting_for_lock_minutes),
        )
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = Some(margin);
        self
    }

    /// Fixed sleep between acquisition attempts.
    ///
    /// Defaults to spreading `max_waiting_for_lock` evenly over the gaps between attempts.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval.unwrap_or_else(|| {
            let gaps = self.max_tries.saturating_sub(1).max(1);
            self.max_waiting_for_lock / gaps
        })
    }

    /// How close to expiry a lease must be before keep-alive extends it.
    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin.unwrap_or(self.lock_acquired_for / 3)
    }

    pub(crate) fn issues(&self) -> Vec<ConfigurationIssue> {
        let mut issues = Vec::new();
        if self.max_tries == 0 {
            issues.push(ConfigurationIssue::new(
                "max_tries",
                "out_of_range",
                "max_tries must be at least 1",
            ));
        }
        if self.lock_acquired_for.is_zero() {
            issues.push(ConfigurationIssue::new(
                "lock_acquired_for_minutes",
                "out_of_range",
                "lock lease must be longer than zero",
            ));
        }
        if self.refresh_margin() >= self.lock_acquired_for && !self.lock_acquired_for.is_zero() {
            issues.push(ConfigurationIssue::new(
                "refresh_margin",
                "out_of_range",
                "refresh margin must be shorter than the lock lease",
            ));
        }
        issues
    }
}

fn from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}
