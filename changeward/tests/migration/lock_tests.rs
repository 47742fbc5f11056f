use crate::support::*;

#[tokio::test]
async fn concurrent_acquisitions_are_exclusive() {
    let repo = MemoryLockRepository::new();
    let managers: Vec<_> = (0..5)
        .map(|idx| LockManager::with_owner(repo.clone(), quick_settings(), DEFAULT_LOCK_NAME, format!("p{idx}")))
        .collect();

    let (r0, r1, r2, r3, r4) = tokio::join!(
        managers[0].acquire_lock_default(),
        managers[1].acquire_lock_default(),
        managers[2].acquire_lock_default(),
        managers[3].acquire_lock_default(),
        managers[4].acquire_lock_default(),
    );
    let results = [r0, r1, r2, r3, r4];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    for err in results.iter().filter_map(|result| result.as_ref().err()) {
        assert_eq!(err.phase(), FailurePhase::LockAcquisition);
    }

    let holder = repo.find(DEFAULT_LOCK_NAME).await.unwrap().unwrap();
    let winners: Vec<_> = managers.iter().filter(|manager| manager.is_lock_held()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].owner(), holder.owner);
}

#[tokio::test]
async fn waiting_processes_hold_the_lock_one_at_a_time() {
    let repo = MemoryLockRepository::new();
    let managers: Vec<_> = (0..3)
        .map(|idx| LockManager::with_owner(repo.clone(), patient_settings(), DEFAULT_LOCK_NAME, format!("p{idx}")))
        .collect();
    let inside = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    let (inside, peak) = (&inside, &peak);
    let critical_section = |idx: usize| {
        let manager = &managers[idx];
        async move {
            manager.acquire_lock_default().await?;
            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
            manager.release_lock_default().await
        }
    };

    let (a, b, c) = tokio::join!(
        critical_section(0),
        critical_section(1),
        critical_section(2),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(repo.find(DEFAULT_LOCK_NAME).await.unwrap().is_none());
}

#[tokio::test]
async fn busy_lock_fails_after_exactly_max_tries_when_configured_to_throw() {
    let locks = CountingLockRepository::default();
    locks.inner.force(foreign_lock("other-process", chrono::Duration::minutes(10)));
    let settings = LockSettings::new(Duration::from_secs(60), 3, Duration::from_millis(90));
    let driver = CountingDriver::new(locks.clone(), settings);
    let journal = Journal::default();
    let catalog: ChangeCatalog = [recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal)]
        .into_iter()
        .collect();

    let executor = MigrationExecutor::new(
        &driver,
        MigrationConfig::default().with_throw_exception_if_cannot_obtain_lock(true),
    );
    let err = executor.run(&catalog).await.unwrap_err();

    match &err {
        MigrationError::LockNotAvailable {
            reason: LockFailure::Exhausted { attempts, holder },
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(holder.as_deref(), Some("other-process"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(locks.acquire_attempts(), 3);
    assert_eq!(executor.state(), RunState::Failed);
    assert!(journal.entries().is_empty());
    assert!(driver.change_entry_service().history().await.unwrap().is_empty());
}

#[tokio::test]
async fn busy_lock_completes_silently_by_default() {
    let locks = CountingLockRepository::default();
    locks.inner.force(foreign_lock("other-process", chrono::Duration::minutes(10)));
    let settings = LockSettings::new(Duration::from_secs(60), 2, Duration::from_millis(20));
    let driver = CountingDriver::new(locks.clone(), settings);
    let journal = Journal::default();
    let catalog: ChangeCatalog = [recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal)]
        .into_iter()
        .collect();

    let executor = MigrationExecutor::new(&driver, MigrationConfig::default());
    let report = executor.run(&catalog).await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert!(!report.lock_obtained);
    assert_eq!(report.executed_count(), 0);
    assert_eq!(locks.acquire_attempts(), 2);
    assert!(journal.entries().is_empty());
    let holder = locks.find(DEFAULT_LOCK_NAME).await.unwrap().unwrap();
    assert_eq!(holder.owner, "other-process");
}

#[tokio::test]
async fn expired_lease_of_a_crashed_process_is_taken_over() {
    let driver = MemoryDriver::new(quick_settings());
    driver
        .lock_repository()
        .force(foreign_lock("crashed-process", chrono::Duration::seconds(-1)));
    let journal = Journal::default();
    let catalog: ChangeCatalog = [recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal)]
        .into_iter()
        .collect();

    let report = MigrationExecutor::new(&driver, MigrationConfig::default())
        .run(&catalog)
        .await
        .unwrap();
    assert!(report.lock_obtained);
    assert_eq!(journal.entries(), vec!["a"]);
}

#[tokio::test]
async fn config_lock_options_override_the_driver_settings() {
    let locks = CountingLockRepository::default();
    locks.inner.force(foreign_lock("other-process", chrono::Duration::minutes(10)));
    let settings = LockSettings::new(Duration::from_secs(60), 3, Duration::from_millis(30));
    let driver = CountingDriver::new(locks.clone(), settings);
    let journal = Journal::default();
    let catalog: ChangeCatalog = [recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal)]
        .into_iter()
        .collect();

    let config = MigrationConfig::default()
        .with_max_tries(1)
        .with_throw_exception_if_cannot_obtain_lock(true);
    let err = changeward::start(config, &driver, catalog).await.unwrap_err();

    assert!(matches!(
        err,
        MigrationError::LockNotAvailable {
            reason: LockFailure::Exhausted { attempts: 1, .. }
        }
    ));
    assert_eq!(locks.acquire_attempts(), 1);
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn zero_lease_in_config_is_rejected_before_locking() {
    let locks = CountingLockRepository::default();
    let driver = CountingDriver::new(locks.clone(), quick_settings());
    let journal = Journal::default();
    let catalog: ChangeCatalog = [recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal)]
        .into_iter()
        .collect();

    let config = MigrationConfig::default().with_lock_acquired_for_minutes(0).with_max_tries(0);
    let err = changeward::start(config, &driver, catalog).await.unwrap_err();

    assert_eq!(err.phase(), FailurePhase::Validation);
    match &err {
        MigrationError::Configuration(config_err) => {
            let fields: Vec<_> = config_err.issues.iter().map(|issue| issue.field.as_str()).collect();
            assert!(fields.contains(&"lock_acquired_for_minutes"));
            assert!(fields.contains(&"max_tries"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(locks.acquire_attempts(), 0);
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn resolve_is_refused_while_another_process_holds_the_lock() {
    let drivers = processes(2, quick_settings());
    let key = ChangeUnitKey::new("a", "ana");
    drivers[0].lock_manager().acquire_lock_default().await.unwrap();

    let err = drivers[1]
        .resolve_change(&key, ChangeState::RolledBack)
        .await
        .unwrap_err();
    assert!(err.is_lock_not_available());
    assert!(drivers[1].change_entry_service().history().await.unwrap().is_empty());
    let holder = drivers[1].lock_repository().find(DEFAULT_LOCK_NAME).await.unwrap().unwrap();
    assert_eq!(holder.owner, "process-0");

    drivers[0].lock_manager().release_lock_default().await.unwrap();
    let entry = drivers[1].resolve_change(&key, ChangeState::RolledBack).await.unwrap();
    assert_eq!(entry.state, ChangeState::RolledBack);
    assert_eq!(drivers[1].change_entry_service().history().await.unwrap().len(), 1);
    assert!(drivers[1].lock_repository().find(DEFAULT_LOCK_NAME).await.unwrap().is_none());
}
