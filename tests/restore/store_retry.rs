//! Transient store failures are retried; persistent ones surface

use crate::common::*;
use ranchvault::testing::FlakyRecordStore;
use std::sync::Arc;

fn flaky_target() -> Arc<FlakyRecordStore<MemoryRecordStore>> {
    let inner = MemoryRecordStore::new();
    inner.create_ranch(TARGET);
    Arc::new(FlakyRecordStore::new(inner))
}

fn restore_into(
    env: &Env,
    records: &Arc<FlakyRecordStore<MemoryRecordStore>>,
    handle: &ArchiveHandle,
) -> VaultResult<RestoreSummary> {
    env.orchestrator_over(records.clone(), env.blobs.clone(), fast_config())
        .restore(
            handle,
            RestoreOptions::missing(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
}

#[test]
fn transient_reads_are_retried_during_restore() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let records = flaky_target();
    records.fail_next_reads(2);

    let summary = restore_into(&env, &records, &handle).unwrap();
    assert!(summary.settings_restored);
    assert_eq!(summary.animals_restored, 5);
    assert_eq!(records.inner().all_animals(TARGET).len(), 5);
}

#[test]
fn persistent_read_failure_surfaces_as_store_error() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let records = flaky_target();
    records.fail_all_reads();

    let err = restore_into(&env, &records, &handle).unwrap_err();
    match err {
        VaultError::Store { context, source } => {
            assert_eq!(context, "settings");
            assert!(source.is_transient());
        }
        other => panic!("expected store error, got {:?}", other),
    }
    assert!(records.inner().all_animals(TARGET).is_empty());
}

#[test]
fn transient_reads_are_retried_during_export() {
    let env = Env::new();
    let source = MemoryRecordStore::new();
    source.create_ranch(SOURCE);
    source.insert_animal(SOURCE, &animal(1, "A")).unwrap();
    let records = Arc::new(FlakyRecordStore::new(source));
    records.fail_next_reads(3);

    let report = SnapshotBuilder::new(records.clone(), env.blobs.clone(), fast_config())
        .export(
            SOURCE,
            &env.archive_path("flaky"),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(report.entity_counts["animals"], 1);
    assert!(records.read_calls() > 3);
}
