//! Parent links always resolve after a restore

use crate::common::*;

#[test]
fn links_to_skipped_duplicates_are_nulled() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    // A different cow already holds id 1 in the target
    env.insert_animals(TARGET, &[animal(1, "OTHER-1")]);

    let summary = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(summary.animals_restored, 4);
    assert_eq!(summary.animals_skipped, 1);
    // CALF-3 and HEIFER-4 lose their dam, YRL-5 its unrecorded sire
    assert_eq!(summary.parent_links_nulled, 3);
    assert_parent_links_resolve(&env.records, TARGET);

    let topology = parent_topology(&env.records, TARGET);
    assert_eq!(
        topology["CALF-3"],
        (None, Some("BULL-2".to_string()))
    );
    assert_eq!(
        topology["YRL-5"],
        (Some("HEIFER-4".to_string()), None)
    );

    // The skipped cow's records stay out
    let medical = medical_by_tag(&env.records, TARGET);
    assert!(!medical.iter().any(|(_, d)| d == "blackleg"));
    assert!(!env.blobs.contains(&blob_path(TARGET, 1, "cow.jpg")));
    assert_eq!(env.records.all_photos(TARGET).len(), 2);
}

#[test]
fn parent_cycle_restores_without_looping() {
    let env = Env::new();
    let path = env.archive_path("cycle");
    write_archive(
        &path,
        &[BatchRecords::Animals(vec![
            animal(1, "X").with_parents(Some(AnimalId(2)), None),
            animal(2, "Y").with_parents(Some(AnimalId(1)), None),
        ])],
    );

    let summary = env
        .restore(&ArchiveHandle::new(&path), RestoreOptions::replace(TARGET))
        .unwrap();
    assert_eq!(summary.animals_restored, 2);
    assert_eq!(summary.parent_links_nulled, 0);
    assert_parent_links_resolve(&env.records, TARGET);
    let topology = parent_topology(&env.records, TARGET);
    assert_eq!(topology["X"].0.as_deref(), Some("Y"));
    assert_eq!(topology["Y"].0.as_deref(), Some("X"));
}
