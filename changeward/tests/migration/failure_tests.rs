use crate::support::*;

#[tokio::test]
async fn failing_unit_keeps_earlier_entries_and_releases_the_lock() {
    let driver = MemoryDriver::new(quick_settings());
    let journal = Journal::default();
    let catalog: ChangeCatalog = [
        recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal),
        failing(ChangeUnitDescriptor::new("b", "ana", 2)),
        recorded(ChangeUnitDescriptor::new("c", "ana", 3), &journal),
    ]
    .into_iter()
    .collect();

    let executor = MigrationExecutor::new(&driver, MigrationConfig::default());
    let err = executor.run(&catalog).await.unwrap_err();

    match &err {
        MigrationError::ChangeExecution { change_id, author, source } => {
            assert_eq!(change_id, "b");
            assert_eq!(author, "ana");
            assert!(source.to_string().contains("exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.phase(), FailurePhase::ChangeUnit);
    assert_eq!(executor.state(), RunState::Failed);
    assert_eq!(journal.entries(), vec!["a"]);
    let history = driver.change_entry_service().history().await.unwrap();
    assert_eq!(change_ids(&history), vec!["a"]);
    assert!(driver.lock_repository().find(DEFAULT_LOCK_NAME).await.unwrap().is_none());
}

#[tokio::test]
async fn fixed_unit_resumes_where_the_failed_run_stopped() {
    let driver = MemoryDriver::new(quick_settings());
    let journal = Journal::default();
    let broken: ChangeCatalog = [
        recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal),
        failing(ChangeUnitDescriptor::new("b", "ana", 2)),
    ]
    .into_iter()
    .collect();
    let fixed: ChangeCatalog = [
        recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal),
        recorded(ChangeUnitDescriptor::new("b", "ana", 2), &journal),
    ]
    .into_iter()
    .collect();

    changeward::start(MigrationConfig::default(), &driver, broken).await.unwrap_err();
    let report = changeward::start(MigrationConfig::default(), &driver, fixed).await.unwrap();

    assert_eq!(report.skipped, vec![ChangeUnitKey::new("a", "ana")]);
    assert_eq!(journal.entries(), vec!["a", "b"]);
}

#[tokio::test]
async fn lease_lost_during_a_unit_records_nothing() {
    let settings = LockSettings::new(Duration::from_millis(50), 1, Duration::ZERO)
        .with_refresh_margin(Duration::from_millis(20));
    let driver = MemoryDriver::new(settings);
    let locks = driver.lock_repository().clone();
    let catalog = ChangeCatalog::new().with(ChangeUnitDescriptor::new("slow", "ana", 1), move |_ctx: ChangeContext| {
        let locks = locks.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            locks.force(foreign_lock("intruder", chrono::Duration::minutes(1)));
            anyhow::Ok(())
        }
    });

    let executor = MigrationExecutor::new(&driver, MigrationConfig::default());
    let err = executor.run(&catalog).await.unwrap_err();

    assert!(matches!(
        err,
        MigrationError::LockNotAvailable {
            reason: LockFailure::LeaseLost
        }
    ));
    assert_eq!(err.phase(), FailurePhase::LockKeepAlive);
    assert_eq!(executor.state(), RunState::Failed);
    assert!(driver.change_entry_service().history().await.unwrap().is_empty());
    let holder = driver.lock_repository().find(DEFAULT_LOCK_NAME).await.unwrap().unwrap();
    assert_eq!(holder.owner, "intruder");
}

#[tokio::test]
async fn long_units_keep_the_lease_alive() {
    let settings = LockSettings::new(Duration::from_millis(200), 1, Duration::ZERO)
        .with_refresh_margin(Duration::from_millis(150));
    let driver = MemoryDriver::new(settings);
    let catalog: ChangeCatalog = (1..=3)
        .map(|idx| {
            ChangeUnit::new(
                ChangeUnitDescriptor::new(format!("step-{idx}"), "ana", idx),
                |_ctx: ChangeContext| async {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    anyhow::Ok(())
                },
            )
        })
        .collect();

    let report = MigrationExecutor::new(&driver, MigrationConfig::default())
        .run(&catalog)
        .await
        .unwrap();
    assert_eq!(report.executed_count(), 3);
}

#[tokio::test]
async fn missing_dependency_stops_the_run() {
    let driver = MemoryDriver::new(quick_settings());
    let journal = Journal::default();
    let catalog: ChangeCatalog = [
        recorded(ChangeUnitDescriptor::new("a", "ana", 1).system_version("1"), &journal),
        recorded(
            ChangeUnitDescriptor::new("b", "ana", 2)
                .system_version("2")
                .depends_on("a", "ana"),
            &journal,
        ),
    ]
    .into_iter()
    .collect();

    let config = MigrationConfig::default().with_system_versions("2", "3");
    let err = changeward::start(config, &driver, catalog).await.unwrap_err();

    match err {
        MigrationError::UnsatisfiedDependency { change, dependency } => {
            assert_eq!(change, ChangeUnitKey::new("b", "ana"));
            assert_eq!(dependency, ChangeUnitKey::new("a", "ana"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(journal.entries().is_empty());
}
