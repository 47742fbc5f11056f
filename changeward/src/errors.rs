use std::{borrow::Cow, fmt};

use thiserror::Error;

use crate::types::ChangeUnitKey;

/// Top-level error type returned by changeward drivers and executors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Static configuration is invalid. Never retried.
    #[error("configuration invalid")]
    Configuration(#[from] ConfigurationError),

    /// The shared lock could not be obtained, or was lost while running.
    #[error("lock not available: {reason}")]
    LockNotAvailable { reason: LockFailure },

    /// A change unit's own logic failed.
    #[error("change unit {change_id} by {author} failed: {source}")]
    ChangeExecution {
        change_id: String,
        author: String,
        #[source]
        source: anyhow::Error,
    },

    /// A change unit was reached before one of its dependencies was executed.
    #[error("change unit {change} depends on {dependency}, which has not been executed")]
    UnsatisfiedDependency { change: ChangeUnitKey, dependency: ChangeUnitKey },

    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

/// The phase of a run in which an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    Validation,
    LockAcquisition,
    LockKeepAlive,
    ChangeUnit,
    Storage,
}

impl MigrationError {
    pub fn other(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Other { message: message.into() }
    }

    pub fn phase(&self) -> FailurePhase {
        match self {
            Self::Configuration(_) => FailurePhase::Validation,
            Self::LockNotAvailable {
                reason: LockFailure::Exhausted { .. },
            } => FailurePhase::LockAcquisition,
            Self::LockNotAvailable { .. } => FailurePhase::LockKeepAlive,
            Self::ChangeExecution { .. } | Self::UnsatisfiedDependency { .. } => FailurePhase::ChangeUnit,
            Self::Redis(_) | Self::Serialization(_) | Self::Other { .. } => FailurePhase::Storage,
        }
    }

    pub fn is_lock_not_available(&self) -> bool {
        matches!(self, Self::LockNotAvailable { .. })
    }
}

/// Why the lock manager gave up on the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockFailure {
    /// Every acquisition attempt found the lock held by another owner.
    Exhausted { attempts: u32, holder: Option<String> },
    /// Extending the lease failed because another owner took the lock over.
    LeaseLost,
    /// The manager was asked to keep alive a lock it never acquired.
    NotHeld,
}

impl fmt::Display for LockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts, holder: Some(holder) } => {
                write!(f, "still held by {holder} after {attempts} attempt(s)")
            }
            Self::Exhausted { attempts, holder: None } => write!(f, "not obtained after {attempts} attempt(s)"),
            Self::LeaseLost => f.write_str("lease lost to another owner"),
            Self::NotHeld => f.write_str("lock is not held by this process"),
        }
    }
}

/// Collection of configuration issues found while validating a run.
#[derive(Debug, Error)]
#[error("configuration errors: {issues:?}")]
pub struct ConfigurationError {
    pub issues: Vec<ConfigurationIssue>,
}

impl ConfigurationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ConfigurationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-issue configuration error.
    pub fn single(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ConfigurationIssue::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

/// A single configuration problem, keyed by the option or change unit at fault.
#[derive(Debug, Clone)]
pub struct ConfigurationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ConfigurationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;
