//! Cancellation stops at the next boundary and releases the lock

use crate::common::*;

#[test]
fn cancel_during_validation_changes_nothing() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.insert_animals(TARGET, &[animal(9, "KEEP-9")]);

    let restore = env.orchestrator(fast_config());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let err = restore
        .restore(
            &handle,
            RestoreOptions::replace(TARGET),
            &mut |msg: &str| {
                if msg == "Checking archive consistency" {
                    trigger.cancel();
                }
            },
            &cancel,
        )
        .unwrap_err();

    assert!(matches!(err, VaultError::Cancelled));
    let animals = env.records.all_animals(TARGET);
    assert_eq!(animals.len(), 1);
    assert_eq!(animals[0].tag, "KEEP-9");
    assert!(!restore.locks().is_locked(TARGET));
}

#[test]
fn cancelled_restore_can_be_resumed_in_missing_mode() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);

    let config = VaultConfig {
        progress_every_records: 1,
        ..fast_config()
    };
    let restore = env.orchestrator(config);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let err = restore
        .restore(
            &handle,
            RestoreOptions::missing(TARGET),
            &mut |msg: &str| {
                // First animal batch holds three animals at page size 3
                if msg == "Restored 3 animals (0 skipped)" {
                    trigger.cancel();
                }
            },
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, VaultError::Cancelled));
    assert_eq!(env.records.all_animals(TARGET).len(), 3);
    assert!(!restore.locks().is_locked(TARGET));

    let summary = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(summary.animals_restored, 2);
    assert_eq!(summary.animals_skipped, 3);
    assert_eq!(env.records.all_animals(TARGET).len(), 5);
    assert_parent_links_resolve(&env.records, TARGET);
}

#[test]
fn cancelled_export_leaves_no_file() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let dest = env.archive_path("cancelled");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = SnapshotBuilder::new(env.records.clone(), env.blobs.clone(), fast_config())
        .export(SOURCE, &dest, &mut NoProgress, &cancel)
        .unwrap_err();
    assert!(matches!(err, VaultError::Cancelled));
    assert!(!dest.exists());
}
