//! Bad archives and bad targets fail before the ranch is touched

use crate::common::*;
use ranchvault::{EntityKind, ReconciliationError};

fn settings(name: &str) -> RanchSettings {
    RanchSettings {
        ranch_name: name.to_string(),
        timezone: "UTC".to_string(),
        weight_unit: "kg".to_string(),
        extra: Default::default(),
    }
}

/// TARGET holds a seeded herd; returns its animal count
fn live_target(env: &Env) -> usize {
    env.seed_herd(TARGET);
    env.records.all_animals(TARGET).len()
}

fn assert_untouched(env: &Env, animals: usize) {
    assert_eq!(env.records.all_animals(TARGET).len(), animals);
    assert_eq!(
        env.records.settings(TARGET).unwrap().unwrap().ranch_name,
        "Bar K"
    );
    assert_eq!(medical_by_tag(&env.records, TARGET).len(), 4);
}

#[test]
fn corrupt_archive_leaves_ranch_intact() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let before = live_target(&env);
    corrupt(&handle.path);

    let err = env
        .restore(&handle, RestoreOptions::replace(TARGET))
        .unwrap_err();
    assert!(matches!(err, VaultError::ArchiveFormat(_)), "got {:?}", err);
    assert!(err.is_pre_mutation());
    assert_untouched(&env, before);
}

#[test]
fn truncated_archive_is_rejected() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let before = live_target(&env);
    let bytes = std::fs::read(&handle.path).unwrap();
    std::fs::write(&handle.path, &bytes[..bytes.len() * 2 / 3]).unwrap();

    let err = env
        .restore(&handle, RestoreOptions::replace(TARGET))
        .unwrap_err();
    assert!(matches!(err, VaultError::ArchiveFormat(_)), "got {:?}", err);
    assert_untouched(&env, before);
}

#[test]
fn duplicate_animal_ids_are_rejected() {
    let env = Env::new();
    let before = live_target(&env);
    let path = env.archive_path("dup");
    write_archive(
        &path,
        &[BatchRecords::Animals(vec![animal(1, "A"), animal(1, "B")])],
    );

    let err = env
        .restore(&ArchiveHandle::new(&path), RestoreOptions::replace(TARGET))
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Reconciliation(ReconciliationError::DuplicateIdentifier {
            kind: EntityKind::Animals,
            id: 1,
        })
    ));
    assert!(err.is_pre_mutation());
    assert_untouched(&env, before);
}

#[test]
fn duplicate_subordinate_ids_are_rejected() {
    let env = Env::new();
    let before = live_target(&env);
    let path = env.archive_path("dup-medical");
    write_archive(
        &path,
        &[
            BatchRecords::Animals(vec![animal(1, "A")]),
            BatchRecords::MedicalHistory(vec![medical(1, "first"), medical(1, "second")]),
        ],
    );

    let err = env
        .restore(&ArchiveHandle::new(&path), RestoreOptions::missing(TARGET))
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Reconciliation(ReconciliationError::DuplicateIdentifier {
            kind: EntityKind::MedicalHistory,
            ..
        })
    ));
    assert_untouched(&env, before);
}

#[test]
fn multiple_settings_rows_are_rejected() {
    let env = Env::new();
    let before = live_target(&env);
    let path = env.archive_path("settings");
    write_archive(
        &path,
        &[BatchRecords::Settings(vec![settings("One"), settings("Two")])],
    );

    let err = env
        .restore(&ArchiveHandle::new(&path), RestoreOptions::replace(TARGET))
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Reconciliation(ReconciliationError::MultipleSettings(2))
    ));
    assert_untouched(&env, before);
}

#[test]
fn unknown_target_ranch() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);

    let err = env
        .restore(&handle, RestoreOptions::replace(RanchId(42)))
        .unwrap_err();
    assert!(matches!(err, VaultError::TargetRanchNotFound(RanchId(42))));
    assert!(err.is_pre_mutation());
}

#[test]
fn verify_reports_counts_without_restoring() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);

    let info = RestoreOrchestrator::verify_archive(&handle.path).unwrap();
    assert_eq!(info.ranch_id, SOURCE);
    assert_eq!(info.entity_counts["animals"], 5);
    assert_eq!(info.entity_counts["medical_history"], 4);
    assert!(env.records.all_animals(TARGET).is_empty());
}
