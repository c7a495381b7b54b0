//! One restore per ranch

use crate::common::*;
use ranchvault::{RanchLocks, RestoreLockError};

#[test]
fn nested_restore_of_same_ranch_is_rejected() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.insert_animals(TARGET, &[animal(9, "KEEP-9")]);

    let restore = env.orchestrator(fast_config());
    let mut nested = None;
    let summary = restore
        .restore(
            &handle,
            RestoreOptions::missing(TARGET),
            &mut |msg: &str| {
                if msg == "Validating archive" && nested.is_none() {
                    // Replace mode would delete KEEP-9 if it got through
                    nested = Some(restore.restore(
                        &handle,
                        RestoreOptions::replace(TARGET),
                        &mut NoProgress,
                        &CancellationToken::new(),
                    ));
                }
            },
            &CancellationToken::new(),
        )
        .unwrap();

    let nested = nested.expect("progress reached validation");
    assert!(matches!(
        nested,
        Err(VaultError::RestoreLock(RestoreLockError { ranch: TARGET }))
    ));
    assert_eq!(summary.animals_restored, 5);
    assert_eq!(summary.animals_deleted, 0);
    assert_eq!(env.records.all_animals(TARGET).len(), 6);
    assert!(!restore.locks().is_locked(TARGET));
}

#[test]
fn other_ranches_are_not_blocked() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.records.create_ranch(RanchId(3));

    let restore = env.orchestrator(fast_config());
    let _held = restore.locks().try_acquire(TARGET).unwrap();
    let summary = restore
        .restore(
            &handle,
            RestoreOptions::missing(RanchId(3)),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(summary.animals_restored, 5);
    assert!(env.records.all_animals(TARGET).is_empty());
}

#[test]
fn shared_registry_spans_orchestrators() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let locks = RanchLocks::isolated();
    let first = env.orchestrator(fast_config()).with_locks(locks.clone());
    let second = env.orchestrator(fast_config()).with_locks(locks);

    let held = first.locks().try_acquire(TARGET).unwrap();
    let err = second
        .restore(
            &handle,
            RestoreOptions::replace(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, VaultError::RestoreLock(_)));

    drop(held);
    assert!(second
        .restore(
            &handle,
            RestoreOptions::replace(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .is_ok());
}

#[test]
fn lock_files_exclude_separate_registries() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let lock_dir = env.dir.path().join("locks");
    let first = env.orchestrator(fast_config().with_lock_dir(&lock_dir));
    // Its own in-process registry, as another process would have
    let second = env
        .orchestrator(fast_config())
        .with_locks(RanchLocks::isolated().lock_files_in(&lock_dir));

    let held = first.locks().try_acquire(TARGET).unwrap();
    assert!(lock_dir.join("ranch-2.restore.lock").exists());
    let err = second
        .restore(
            &handle,
            RestoreOptions::missing(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(err.is_pre_mutation());
    assert!(env.records.all_animals(TARGET).is_empty());

    drop(held);
    let summary = second
        .restore(
            &handle,
            RestoreOptions::missing(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(summary.animals_restored, 5);
}

#[test]
fn default_orchestrators_share_process_locks() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    // Ranch id no other test locks through the process-wide registry
    let ranch = RanchId(4_201);
    env.records.create_ranch(ranch);
    env.insert_animals(ranch, &[animal(9, "KEEP-9")]);

    let first = RestoreOrchestrator::new(env.records.clone(), env.blobs.clone(), fast_config());
    let second = RestoreOrchestrator::new(env.records.clone(), env.blobs.clone(), fast_config());

    let held = first.locks().try_acquire(ranch).unwrap();
    let err = second
        .restore(
            &handle,
            RestoreOptions::replace(ranch),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::RestoreLock(RestoreLockError { ranch: RanchId(4_201) })
    ));
    let tags: Vec<String> = env.records.all_animals(ranch).into_iter().map(|a| a.tag).collect();
    assert_eq!(tags, vec!["KEEP-9".to_string()]);

    drop(held);
    let summary = second
        .restore(
            &handle,
            RestoreOptions::replace(ranch),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(summary.animals_deleted, 1);
    assert_eq!(summary.animals_restored, 5);
    assert!(!first.locks().is_locked(ranch));
}
