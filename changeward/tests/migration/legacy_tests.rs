use changeward::LegacyMigration;
use serde_json::json;

use crate::support::*;

const ORIGIN: &str = "mongockChangeLog";

fn seeded_driver() -> MemoryDriver {
    let entries = MemoryChangeEntryRepository::new();
    entries.seed_legacy(
        ORIGIN,
        vec![
            json!({"changeId": "a", "author": "ana", "timestamp": "2021-03-04T05:06:07Z"}),
            json!({"changeId": "retired", "author": "bo", "changeLogClass": "OldChangeLog"}),
            json!({"author": "nobody"}),
        ],
    );
    MemoryDriver::shared(MemoryLockRepository::new(), entries, quick_settings())
}

#[tokio::test]
async fn imported_units_are_not_executed_again() {
    let driver = seeded_driver();
    let journal = Journal::default();
    let catalog: ChangeCatalog = [
        recorded(ChangeUnitDescriptor::new("a", "ana", 1), &journal),
        recorded(ChangeUnitDescriptor::new("b", "ana", 2).depends_on("a", "ana"), &journal),
    ]
    .into_iter()
    .collect();
    let config = MigrationConfig::default().with_legacy_migration(LegacyMigration::new(ORIGIN));

    let report = changeward::start(config.clone(), &driver, catalog.clone()).await.unwrap();
    assert_eq!(report.legacy_imported, 2);
    assert_eq!(report.skipped, vec![ChangeUnitKey::new("a", "ana")]);
    assert_eq!(journal.entries(), vec!["b"]);

    let service = driver.change_entry_service();
    assert!(service.is_already_executed("retired", "bo").await.unwrap());
    let history = service.history().await.unwrap();
    let imported = history.iter().find(|entry| entry.change_id == "a").unwrap();
    assert_eq!(imported.timestamp.to_rfc3339(), "2021-03-04T05:06:07+00:00");
    assert_eq!(imported.metadata["legacy_origin"], json!(ORIGIN));

    let again = changeward::start(config, &driver, catalog).await.unwrap();
    assert_eq!(again.legacy_imported, 0);
    assert_eq!(journal.entries(), vec!["b"]);
}

#[tokio::test]
async fn run_always_import_never_duplicates_tracked_units() {
    let driver = seeded_driver();
    let config =
        MigrationConfig::default().with_legacy_migration(LegacyMigration::new(ORIGIN).with_run_always(true));

    let first = changeward::start(config.clone(), &driver, ChangeCatalog::new()).await.unwrap();
    let second = changeward::start(config, &driver, ChangeCatalog::new()).await.unwrap();

    assert_eq!(first.legacy_imported, 2);
    assert_eq!(second.legacy_imported, 0);
    let history = driver.change_entry_service().history().await.unwrap();
    let markers = history
        .iter()
        .filter(|entry| entry.change_id == changeward::executor::LEGACY_MIGRATION_CHANGE_ID)
        .count();
    assert_eq!(markers, 2);
}

#[tokio::test]
async fn missing_origin_imports_nothing() {
    let driver = MemoryDriver::new(quick_settings());
    let config = MigrationConfig::default().with_legacy_migration(LegacyMigration::new("absent"));
    let report = changeward::start(config, &driver, ChangeCatalog::new()).await.unwrap();
    assert_eq!(report.legacy_imported, 0);
}
