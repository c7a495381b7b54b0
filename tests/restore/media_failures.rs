//! Media that cannot be restored flags its photo instead of failing

use crate::common::*;
use ranchvault::testing::FaultyBlobStore;
use std::sync::Arc;

fn faulty_target() -> Arc<FaultyBlobStore<MemoryBlobStore>> {
    Arc::new(FaultyBlobStore::new(MemoryBlobStore::new()))
}

fn restore_into(
    env: &Env,
    blobs: &Arc<FaultyBlobStore<MemoryBlobStore>>,
    handle: &ArchiveHandle,
) -> RestoreSummary {
    env.orchestrator_over(env.records.clone(), blobs.clone(), fast_config())
        .restore(
            handle,
            RestoreOptions::replace(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap()
}

fn flagged(env: &Env) -> Vec<String> {
    let mut paths: Vec<String> = env
        .records
        .all_photos(TARGET)
        .into_iter()
        .filter(|p| p.media_missing)
        .map(|p| p.storage_path.to_string())
        .collect();
    paths.sort();
    paths
}

#[test]
fn failed_uploads_are_counted_and_flagged() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let blobs = faulty_target();
    blobs.fail_put_always("2/1/cow.jpg");
    blobs.fail_put_always("2/5/yearling.png");

    let summary = restore_into(&env, &blobs, &handle);
    assert_eq!(summary.animals_restored, 5);
    assert_eq!(summary.media_restored, 1);
    assert_eq!(summary.media_failed, 2);
    assert_eq!(summary.media_failures.len(), 2);
    assert!(summary.media_failures.iter().all(|f| f.attempts == 3));

    assert_eq!(summary.photos_restored, 3);
    assert_eq!(env.records.all_photos(TARGET).len(), 3);
    assert_eq!(flagged(&env), vec!["2/1/cow.jpg", "2/5/yearling.png"]);
    assert_eq!(
        blobs.inner().bytes(&blob_path(TARGET, 3, "calf.jpg")).unwrap(),
        photo_bytes("calf.jpg", 70_000)
    );
    assert!(!blobs.inner().contains(&blob_path(TARGET, 1, "cow.jpg")));
}

#[test]
fn transient_upload_failures_are_retried() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let blobs = faulty_target();
    blobs.fail_put_times("2/3/calf.jpg", 2);

    let summary = restore_into(&env, &blobs, &handle);
    assert_eq!(summary.media_restored, 3);
    assert_eq!(summary.media_failed, 0);
    assert!(flagged(&env).is_empty());
    // Two failed attempts plus one success for calf, one each for the rest
    assert_eq!(blobs.put_attempts(), 5);
}

#[test]
fn media_missing_at_export_flags_restored_photo() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    // Photo row whose bytes were never stored
    env.records
        .insert_photo(SOURCE, &photo(SOURCE, 2, "bull.jpg", 512))
        .unwrap();
    let handle = env.export(SOURCE);

    let summary = env.restore(&handle, RestoreOptions::replace(TARGET)).unwrap();
    assert_eq!(summary.media_restored, 3);
    assert_eq!(summary.media_failed, 1);
    let failure = &summary.media_failures[0];
    assert_eq!(failure.path, "2/2/bull.jpg");
    assert!(
        failure.reason.contains("missing at export"),
        "unexpected reason: {}",
        failure.reason
    );

    let bull_photo = env
        .records
        .all_photos(TARGET)
        .into_iter()
        .find(|p| p.storage_path.to_string() == "2/2/bull.jpg")
        .unwrap();
    assert!(bull_photo.media_missing);
    assert_eq!(bull_photo.byte_size, 512);
}

#[test]
fn skipped_owner_takes_its_media_with_it() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    env.insert_animals(TARGET, &[animal(3, "LIVE-3")]);

    let summary = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(summary.animals_skipped, 1);
    assert_eq!(summary.media_restored, 2);
    assert_eq!(summary.media_failed, 0);
    assert!(!env.blobs.contains(&blob_path(TARGET, 3, "calf.jpg")));
}

/// Archive where animals 1 and 2 each have a photo row naming `1/1/cow.jpg`
fn shared_media_archive(env: &Env) -> ArchiveHandle {
    let bytes = photo_bytes("cow.jpg", 600);
    let first = PhotoRecord {
        id: RecordId(1),
        ..photo(SOURCE, 1, "cow.jpg", 600)
    };
    let second = PhotoRecord {
        id: RecordId(2),
        animal_id: AnimalId(2),
        ..photo(SOURCE, 1, "cow.jpg", 600)
    };
    let (archive, _) = ranchvault_archive::write_to_vec(
        SOURCE,
        &[
            BatchRecords::Animals(vec![animal(1, "COW-1"), animal(2, "BULL-2")]),
            BatchRecords::Photos(vec![first, second]),
        ],
        &[(blob_path(SOURCE, 1, "cow.jpg"), bytes)],
    )
    .unwrap();
    let path = env.archive_path("shared-media");
    std::fs::write(&path, archive).unwrap();
    ArchiveHandle { path }
}

#[test]
fn shared_archived_path_is_uploaded_for_each_animal() {
    let env = Env::new();
    let handle = shared_media_archive(&env);

    let summary = env.restore(&handle, RestoreOptions::replace(TARGET)).unwrap();
    assert_eq!(summary.photos_restored, 2);
    assert_eq!(summary.media_restored, 2);
    assert_eq!(summary.media_failed, 0);
    assert!(flagged(&env).is_empty());
    for animal in [1, 2] {
        assert_eq!(
            env.blobs.bytes(&blob_path(TARGET, animal, "cow.jpg")).unwrap(),
            photo_bytes("cow.jpg", 600)
        );
    }
}

#[test]
fn shared_archived_path_flags_only_the_failed_target() {
    let env = Env::new();
    let handle = shared_media_archive(&env);
    let blobs = faulty_target();
    blobs.fail_put_always("2/2/cow.jpg");

    let summary = restore_into(&env, &blobs, &handle);
    assert_eq!(summary.media_restored, 1);
    assert_eq!(summary.media_failed, 1);
    assert_eq!(summary.media_failures[0].path, "2/2/cow.jpg");
    assert_eq!(flagged(&env), vec!["2/2/cow.jpg"]);
    assert!(blobs.inner().contains(&blob_path(TARGET, 1, "cow.jpg")));
    assert!(!blobs.inner().contains(&blob_path(TARGET, 2, "cow.jpg")));
}

#[test]
fn oversized_media_is_flagged_after_one_read() {
    let env = Env::new();
    env.seed_herd(SOURCE);
    let handle = env.export(SOURCE);
    let config = VaultConfig {
        max_media_bytes: 100,
        ..fast_config()
    };

    let summary = env
        .orchestrator(config)
        .restore(
            &handle,
            RestoreOptions::replace(TARGET),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(summary.media_restored, 1);
    assert_eq!(summary.media_failed, 2);
    for failure in &summary.media_failures {
        assert_eq!(failure.attempts, 1);
        assert!(failure.reason.starts_with("too large"), "{}", failure.reason);
        assert!(failure.to_string().contains("after 1 attempt(s)"));
    }
    assert_eq!(flagged(&env), vec!["2/1/cow.jpg", "2/3/calf.jpg"]);
}
