use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use super::{LockRepository, to_chrono};
use crate::{
    config::LockSettings,
    errors::{LockFailure, MigrationError, MigrationResult},
};

/// Lock policy for one owner identity.
///
/// The manager remembers when its own lease expires so keep-alive only
/// touches the store when the lease is close to running out.
pub struct LockManager<R> {
    repository: R,
    settings: LockSettings,
    lock_key: String,
    owner: String,
    lease_expires_at: Mutex<Option<DateTime<Utc>>>,
}

impl<R> LockManager<R>
where
    R: LockRepository,
{
    /// Creates a manager with a fresh random owner identity.
    pub fn new(repository: R, settings: LockSettings, lock_key: impl Into<String>) -> Self {
        Self::with_owner(repository, settings, lock_key, Uuid::new_v4().to_string())
    }

    pub fn with_owner(
        repository: R,
        settings: LockSettings,
        lock_key: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            settings,
            lock_key: lock_key.into(),
            owner: owner.into(),
            lease_expires_at: Mutex::new(None),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// A manager for the same key and owner over this repository, with other timings.
    ///
    /// It tracks its own lease; this manager's view is left untouched.
    pub fn scoped(&self, settings: LockSettings) -> LockManager<&R> {
        LockManager::with_owner(&self.repository, settings, self.lock_key.clone(), self.owner.clone())
    }

    pub fn lock_expires_at(&self) -> Option<DateTime<Utc>> {
        *self.lease_expires_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether this manager believes it still holds an unexpired lease.
    pub fn is_lock_held(&self) -> bool {
        self.lock_expires_at().is_some_and(|expires_at| expires_at > Utc::now())
    }

    fn set_lease(&self, expires_at: Option<DateTime<Utc>>) {
        *self.lease_expires_at.lock().unwrap_or_else(PoisonError::into_inner) = expires_at;
    }

    /// Tries to take the lock up to `max_tries` times.
    ///
    /// Attempts are separated by the fixed retry interval, each sleep capped
    /// by what is left of `max_waiting_for_lock`.
    pub async fn acquire_lock_default(&self) -> MigrationResult<()> {
        let max_tries = self.settings.max_tries.max(1);
        let interval = self.settings.retry_interval();
        let deadline = Instant::now() + self.settings.max_waiting_for_lock;

        for attempt in 1..=max_tries {
            let requested_at = Utc::now();
            if self
                .repository
                .acquire(&self.lock_key, &self.owner, self.settings.lock_acquired_for)
                .await?
            {
                self.set_lease(Some(requested_at + to_chrono(self.settings.lock_acquired_for)));
                info!("lock {} acquired by {} on attempt {attempt}", self.lock_key, self.owner);
                return Ok(());
            }

            debug!("lock {} busy, attempt {attempt}/{max_tries} by {}", self.lock_key, self.owner);
            if attempt < max_tries {
                let remaining = deadline.saturating_duration_since(Instant::now());
                sleep(interval.min(remaining)).await;
            }
        }

        let holder = self.repository.find(&self.lock_key).await?.map(|entry| entry.owner);
        Err(MigrationError::LockNotAvailable {
            reason: LockFailure::Exhausted {
                attempts: max_tries,
                holder,
            },
        })
    }

    /// Re-asserts ownership, extending the lease when it is about to expire.
    ///
    /// An error means another owner may be mutating state; callers must stop.
    pub async fn ensure_lock_default(&self) -> MigrationResult<()> {
        let Some(expires_at) = self.lock_expires_at() else {
            return Err(MigrationError::LockNotAvailable {
                reason: LockFailure::NotHeld,
            });
        };

        if Utc::now() + to_chrono(self.settings.refresh_margin()) < expires_at {
            return Ok(());
        }

        let requested_at = Utc::now();
        if self
            .repository
            .extend(&self.lock_key, &self.owner, self.settings.lock_acquired_for)
            .await?
        {
            self.set_lease(Some(requested_at + to_chrono(self.settings.lock_acquired_for)));
            debug!("lock {} lease extended by {}", self.lock_key, self.owner);
            Ok(())
        } else {
            self.set_lease(None);
            Err(MigrationError::LockNotAvailable {
                reason: LockFailure::LeaseLost,
            })
        }
    }

    /// Releases the lock if this owner holds it. Never fails for a lock held elsewhere.
    pub async fn release_lock_default(&self) -> MigrationResult<()> {
        self.set_lease(None);
        self.repository.release(&self.lock_key, &self.owner).await?;
        debug!("lock {} released by {}", self.lock_key, self.owner);
        Ok(())
    }
}
