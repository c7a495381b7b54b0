//! Collision policies and unresolvable references

use crate::common::*;
use ranchvault::ReconciliationError;

fn numbered_medical(id: u64, animal: u64, text: &str) -> MedicalHistoryRecord {
    MedicalHistoryRecord {
        id: RecordId(id),
        ..medical(animal, text)
    }
}

fn numbered_value(id: u64, animal: u64, field: u64, text: &str) -> CustomFieldValue {
    CustomFieldValue {
        id: RecordId(id),
        ..value(animal, field, text)
    }
}

#[test]
fn overwrite_updates_live_animal_in_place() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.insert_animals(TARGET, &[animal(3, "OLD-3")]);
    env.records
        .insert_medical_record(TARGET, &medical(3, "old"))
        .unwrap();

    let config = fast_config().with_collision_policy(CollisionPolicy::Overwrite);
    let summary = env
        .orchestrator(config)
        .restore(
            &handle,
            RestoreOptions::missing(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(summary.animals_restored, 4);
    assert_eq!(summary.animals_updated, 1);
    assert_eq!(summary.animals_skipped, 0);

    let animals = env.records.all_animals(TARGET);
    assert_eq!(animals.len(), 5);
    assert!(animals.iter().all(|a| a.tag != "OLD-3"));

    // Archived history is added next to the live row
    let medical = medical_by_tag(&env.records, TARGET);
    assert!(medical.contains(&("CALF-3".to_string(), "old".to_string())));
    assert!(medical.contains(&("CALF-3".to_string(), "brucellosis".to_string())));

    let topology = parent_topology(&env.records, TARGET);
    assert_eq!(
        topology["CALF-3"],
        (Some("COW-1".to_string()), Some("BULL-2".to_string()))
    );
    assert_parent_links_resolve(&env.records, TARGET);
}

#[test]
fn fail_policy_refuses_any_collision() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.insert_animals(TARGET, &[animal(5, "LIVE-5")]);

    let config = fast_config().with_collision_policy(CollisionPolicy::Fail);
    let err = env
        .orchestrator(config)
        .restore(
            &handle,
            RestoreOptions::missing(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Reconciliation(ReconciliationError::IdentityConflict {
            id: AnimalId(5),
            ..
        })
    ));
    assert_eq!(env.records.all_animals(TARGET).len(), 1);
    assert!(env.records.settings(TARGET).unwrap().is_none());
    assert!(env.records.all_custom_field_definitions(TARGET).is_empty());
}

#[test]
fn fail_policy_ignores_replace_mode() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.insert_animals(TARGET, &[animal(5, "LIVE-5")]);

    let config = fast_config().with_collision_policy(CollisionPolicy::Fail);
    let summary = env
        .orchestrator(config)
        .restore(
            &handle,
            RestoreOptions::replace(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(summary.animals_deleted, 1);
    assert_eq!(summary.animals_restored, 5);
}

#[test]
fn unresolvable_subordinates_are_dropped() {
    let env = Env::new();
    let path = env.archive_path("orphans");
    write_archive(
        &path,
        &[
            BatchRecords::CustomFieldDefinitions(vec![definition(10, "Brand")]),
            BatchRecords::Animals(vec![animal(1, "A")]),
            BatchRecords::MedicalHistory(vec![
                numbered_medical(1, 1, "kept"),
                numbered_medical(2, 9, "no such animal"),
            ]),
            BatchRecords::CustomFieldValues(vec![
                numbered_value(1, 1, 10, "K-bar"),
                numbered_value(2, 1, 77, "no such field"),
            ]),
        ],
    );

    let summary = env
        .restore(&ArchiveHandle::new(&path), RestoreOptions::missing(TARGET))
        .unwrap();
    assert_eq!(summary.animals_restored, 1);
    assert_eq!(summary.medical_restored, 1);
    assert_eq!(summary.custom_values_restored, 1);
    assert_eq!(summary.records_dropped, 2);
    assert_eq!(
        medical_by_tag(&env.records, TARGET),
        vec![("A".to_string(), "kept".to_string())]
    );
}

#[test]
fn values_may_reference_live_definitions() {
    let env = Env::new();
    env.records
        .insert_custom_field_definition(TARGET, &definition(77, "Live field"))
        .unwrap();
    let path = env.archive_path("live-field");
    write_archive(
        &path,
        &[
            BatchRecords::Animals(vec![animal(1, "A")]),
            BatchRecords::CustomFieldValues(vec![numbered_value(1, 1, 77, "set")]),
        ],
    );

    let summary = env
        .restore(&ArchiveHandle::new(&path), RestoreOptions::missing(TARGET))
        .unwrap();
    assert_eq!(summary.custom_values_restored, 1);
    assert_eq!(summary.records_dropped, 0);
    assert!(custom_values(&env.records, TARGET).contains(&(
        "A".to_string(),
        "Live field".to_string(),
        "set".to_string()
    )));
}

#[test]
fn live_definitions_and_settings_are_reused() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.records
        .insert_custom_field_definition(TARGET, &definition(10, "Brand (live)"))
        .unwrap();
    env.records
        .put_settings(
            TARGET,
            &RanchSettings {
                ranch_name: "Live".to_string(),
                timezone: "UTC".to_string(),
                weight_unit: "kg".to_string(),
                extra: Default::default(),
            },
        )
        .unwrap();

    let summary = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(summary.definitions_reused, 1);
    assert_eq!(summary.definitions_restored, 1);
    assert!(!summary.settings_restored);
    assert_eq!(
        env.records.settings(TARGET).unwrap().unwrap().ranch_name,
        "Live"
    );

    // Values for field 10 land on the live definition
    let values = custom_values(&env.records, TARGET);
    assert!(values.contains(&(
        "CALF-3".to_string(),
        "Brand (live)".to_string(),
        "K-bar".to_string()
    )));
}

#[test]
fn replace_mode_overwrites_settings() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.records
        .put_settings(
            TARGET,
            &RanchSettings {
                ranch_name: "Live".to_string(),
                timezone: "UTC".to_string(),
                weight_unit: "kg".to_string(),
                extra: Default::default(),
            },
        )
        .unwrap();

    let summary = env.restore(&handle, RestoreOptions::replace(TARGET)).unwrap();
    assert!(summary.settings_restored);
    assert_eq!(
        env.records.settings(TARGET).unwrap().unwrap().ranch_name,
        "Bar K"
    );
}
