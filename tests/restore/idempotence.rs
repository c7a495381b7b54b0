//! Restoring the same archive twice in missing mode changes nothing

use crate::common::*;

fn state(env: &Env) -> (Vec<AnimalRecord>, Vec<(String, String)>, usize, usize) {
    (
        env.records.all_animals(TARGET),
        medical_by_tag(&env.records, TARGET),
        env.records.all_custom_field_values(TARGET).len(),
        env.records.all_photos(TARGET).len(),
    )
}

#[test]
fn second_missing_restore_is_a_no_op() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);

    let first = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(first.animals_restored, 5);
    assert!(first.settings_restored);
    let after_first = state(&env);
    let blobs_after_first = env.blobs.len();

    let second = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(second.animals_restored, 0);
    assert_eq!(second.animals_skipped, 5);
    assert_eq!(second.medical_restored, 0);
    assert_eq!(second.custom_values_restored, 0);
    assert_eq!(second.photos_restored, 0);
    assert_eq!(second.media_restored, 0);
    assert_eq!(second.definitions_restored, 0);
    assert_eq!(second.definitions_reused, 2);
    assert!(!second.settings_restored);

    assert_eq!(state(&env), after_first);
    assert_eq!(env.blobs.len(), blobs_after_first);
}

#[test]
fn repeated_replace_restores_same_herd() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);

    env.restore(&handle, RestoreOptions::replace(TARGET)).unwrap();
    let topology = parent_topology(&env.records, TARGET);
    let medical = medical_by_tag(&env.records, TARGET);

    let second = env.restore(&handle, RestoreOptions::replace(TARGET)).unwrap();
    assert_eq!(second.animals_deleted, 5);
    assert_eq!(second.animals_restored, 5);
    assert_eq!(parent_topology(&env.records, TARGET), topology);
    assert_eq!(medical_by_tag(&env.records, TARGET), medical);
    assert_eq!(env.records.all_photos(TARGET).len(), 3);
}
