//! Runs a catalog of change units exactly once across all processes.
//!
//! A run walks `Idle -> AcquiringLock -> Running -> Releasing` and ends in
//! `Completed` or `Failed`. Every unit is executed under the shared lock,
//! and the lease is re-asserted before and after each unit so nothing is
//! recorded once ownership has been lost.

mod plan;
mod state;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use log::{debug, info, warn};
use serde_json::{Value, json};
use uuid::Uuid;

pub use state::{MigrationReport, RunState};

use crate::{
    change::{ChangeCatalog, ChangeContext, ChangeUnit},
    config::MigrationConfig,
    driver::ConnectionDriver,
    errors::{MigrationError, MigrationResult},
    legacy::LegacyMigration,
    lock::LockManager,
    registry::Dependencies,
    types::{ChangeEntry, ChangeState, ChangeUnitKey},
};

/// Change id under which a finished legacy import is recorded.
pub const LEGACY_MIGRATION_CHANGE_ID: &str = "changeward-legacy-migration";
pub const LEGACY_MIGRATION_AUTHOR: &str = "changeward";

pub struct MigrationExecutor<'d, D> {
    driver: &'d D,
    config: MigrationConfig,
    extra_dependencies: Dependencies,
    state: Mutex<RunState>,
}

impl<'d, D> MigrationExecutor<'d, D>
where
    D: ConnectionDriver,
{
    pub fn new(driver: &'d D, config: MigrationConfig) -> Self {
        Self {
            driver,
            config,
            extra_dependencies: Dependencies::new(),
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Dependencies supplied by the caller on top of the driver's own.
    pub fn with_dependencies(mut self, dependencies: Dependencies) -> Self {
        self.extra_dependencies = dependencies;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, execution_id: &str, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("run {execution_id}: {} -> {next}", *state);
        *state = next;
    }

    /// Executes every pending unit of `catalog`.
    ///
    /// Returns `Ok` with `lock_obtained == false` when the run is disabled or
    /// the lock stays busy and `throw_exception_if_cannot_obtain_lock` is off.
    /// Any failure after the lock was obtained is returned as an error, and
    /// the lock is released before returning either way.
    pub async fn run(&self, catalog: &ChangeCatalog) -> MigrationResult<MigrationReport> {
        let started = Instant::now();
        let execution_id = Uuid::new_v4().to_string();
        let mut report = MigrationReport::new(&execution_id);
        self.transition(&execution_id, RunState::Idle);

        if !self.config.enabled {
            info!("changeward is disabled, skipping {} change unit(s)", catalog.len());
            return Ok(self.finish(report, RunState::Completed, started));
        }

        let settings = self.config.lock_settings(self.driver.lock_manager().settings());
        let lock = self.driver.lock_manager().scoped(settings);

        self.transition(&execution_id, RunState::AcquiringLock);
        match lock.acquire_lock_default().await {
            Ok(()) => report.lock_obtained = true,
            Err(err) if err.is_lock_not_available() && !self.config.throw_exception_if_cannot_obtain_lock => {
                info!("lock not obtained, skipping this run: {err}");
                return Ok(self.finish(report, RunState::Completed, started));
            }
            Err(err) => {
                self.transition(&execution_id, RunState::Failed);
                return Err(err);
            }
        }

        self.transition(&execution_id, RunState::Running);
        let outcome = self.run_units(catalog, &lock, &execution_id, &mut report).await;

        self.transition(&execution_id, RunState::Releasing);
        if let Err(err) = lock.release_lock_default().await {
            warn!("failed to release lock after run {execution_id}: {err}");
        }

        match outcome {
            Ok(()) => {
                info!(
                    "run {execution_id} completed: {} executed, {} skipped",
                    report.executed.len(),
                    report.skipped.len()
                );
                Ok(self.finish(report, RunState::Completed, started))
            }
            Err(err) => {
                warn!("run {execution_id} failed: {err}");
                self.transition(&execution_id, RunState::Failed);
                Err(err)
            }
        }
    }

    fn finish(&self, mut report: MigrationReport, state: RunState, started: Instant) -> MigrationReport {
        self.transition(&report.execution_id, state);
        report.state = state;
        report.elapsed_ms = millis_since(started);
        report
    }

    async fn run_units(
        &self,
        catalog: &ChangeCatalog,
        lock: &LockManager<&D::LockRepo>,
        execution_id: &str,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        if let Some(legacy) = &self.config.legacy_migration {
            report.legacy_imported = self.import_legacy(legacy, lock, execution_id).await?;
        }

        let start = self.config.start_version();
        let end = self.config.end_version();
        let mut eligible: Vec<&ChangeUnit> = Vec::with_capacity(catalog.len());
        for unit in catalog.units() {
            if unit.descriptor.version().is_between(&start, &end) {
                eligible.push(unit);
            } else {
                debug!("change unit {} is outside system versions {start}..={end}", unit.key());
                report.out_of_range.push(unit.key());
            }
        }

        let service = self.driver.change_entry_service();
        let metadata = Arc::new(self.config.metadata.clone());
        let dependencies = self.driver.dependencies().merged(&self.extra_dependencies);
        let mut satisfied: HashSet<ChangeUnitKey> = HashSet::new();

        for unit in plan::execution_order(&eligible)? {
            let descriptor = &unit.descriptor;
            let key = unit.key();

            if !descriptor.run_always && service.is_already_executed(&key.change_id, &key.author).await? {
                debug!("change unit {key} already executed");
                satisfied.insert(key.clone());
                report.skipped.push(key);
                continue;
            }

            for dependency in &descriptor.depends_on {
                if satisfied.contains(dependency) {
                    continue;
                }
                if !service
                    .is_already_executed(&dependency.change_id, &dependency.author)
                    .await?
                {
                    return Err(MigrationError::UnsatisfiedDependency {
                        change: key,
                        dependency: dependency.clone(),
                    });
                }
                satisfied.insert(dependency.clone());
            }

            lock.ensure_lock_default().await?;
            info!("executing change unit {key}");
            let unit_started = Instant::now();
            let ctx = ChangeContext::new(
                key.clone(),
                execution_id.to_string(),
                Arc::clone(&metadata),
                dependencies.clone(),
            );
            unit.execute(ctx)
                .await
                .map_err(|source| MigrationError::ChangeExecution {
                    change_id: key.change_id.clone(),
                    author: key.author.clone(),
                    source,
                })?;
            lock.ensure_lock_default().await?;

            let mut entry = ChangeEntry::new(&key, ChangeState::Executed, execution_id);
            entry.execution_millis = millis_since(unit_started);
            entry.run_always = descriptor.run_always;
            entry.system_version = Some(descriptor.system_version.clone());
            entry.metadata = self.config.metadata.clone();
            service.save(&entry).await?;

            debug!("change unit {key} recorded in {} ms", entry.execution_millis);
            satisfied.insert(key.clone());
            report.executed.push(key);
        }
        Ok(())
    }

    /// Copies records left by a previous tool into the change-entry store.
    ///
    /// Records whose unit is already tracked are left alone. The import is
    /// recorded as its own entry so it runs once unless marked run-always.
    async fn import_legacy(
        &self,
        legacy: &LegacyMigration,
        lock: &LockManager<&D::LockRepo>,
        execution_id: &str,
    ) -> MigrationResult<usize> {
        let service = self.driver.change_entry_service();
        let marker = ChangeUnitKey::new(LEGACY_MIGRATION_CHANGE_ID, LEGACY_MIGRATION_AUTHOR);

        if !legacy.run_always && service.is_already_executed(&marker.change_id, &marker.author).await? {
            debug!("legacy records from {} already imported", legacy.origin);
            return Ok(0);
        }

        lock.ensure_lock_default().await?;
        let records = service.load_legacy_records(&legacy.origin).await?;
        let mut imported = 0;
        for entry in legacy.convert(&records, execution_id) {
            if service.is_already_executed(&entry.change_id, &entry.author).await? {
                continue;
            }
            service.save(&entry).await?;
            imported += 1;
        }

        lock.ensure_lock_default().await?;
        let mut done = ChangeEntry::new(&marker, ChangeState::Executed, execution_id);
        done.run_always = legacy.run_always;
        done.metadata.insert("legacy_origin".into(), Value::String(legacy.origin.clone()));
        done.metadata.insert("imported".into(), json!(imported));
        service.save(&done).await?;

        info!("imported {imported} legacy change entries from {}", legacy.origin);
        Ok(imported)
    }
}

fn millis_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
