//! Small herds with known outcomes

use crate::common::*;

fn abc(env: &Env) -> ArchiveHandle {
    env.insert_animals(
        SOURCE,
        &[
            animal(1, "A"),
            animal(2, "B").with_parents(Some(AnimalId(1)), None),
            animal(3, "C").with_parents(Some(AnimalId(1)), Some(AnimalId(99))),
        ],
    );
    env.export(SOURCE)
}

fn find(env: &Env, tag: &str) -> AnimalRecord {
    env.records
        .all_animals(TARGET)
        .into_iter()
        .find(|a| a.tag == tag)
        .unwrap()
}

#[test]
fn absent_parent_resolves_to_null() {
    let env = Env::new();
    let handle = abc(&env);

    let summary = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(summary.animals_restored, 3);
    assert_eq!(summary.animals_skipped, 0);
    assert_eq!(summary.parent_links_nulled, 1);
    assert_eq!(env.records.all_animals(TARGET).len(), 3);

    let a = find(&env, "A");
    let b = find(&env, "B");
    let c = find(&env, "C");
    assert_eq!(b.mother_id, Some(a.id));
    assert_eq!(c.mother_id, Some(a.id));
    assert_eq!(c.father_id, None);
}

#[test]
fn repeat_restore_skips_everything() {
    let env = Env::new();
    let handle = abc(&env);
    env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();

    let again = env.restore(&handle, RestoreOptions::missing(TARGET)).unwrap();
    assert_eq!(again.animals_restored, 0);
    assert_eq!(again.animals_skipped, 3);
    assert_eq!(env.records.all_animals(TARGET).len(), 3);
    assert_eq!(find(&env, "B").mother_id, Some(find(&env, "A").id));
}

#[test]
fn empty_ranch_exports_and_restores() {
    let env = Env::new();
    let handle = env.export(SOURCE);

    let summary = env.restore(&handle, RestoreOptions::replace(TARGET)).unwrap();
    assert_eq!(summary.animals_restored, 0);
    assert_eq!(summary.media_restored, 0);
    assert!(!summary.settings_restored);
    assert!(env.records.all_animals(TARGET).is_empty());
}

#[test]
fn progress_messages_cover_each_phase() {
    let env = Env::new();
    let handle = abc(&env);
    let mut messages = Vec::new();
    let summary = env
        .orchestrator(fast_config())
        .restore(
            &handle,
            RestoreOptions::replace(TARGET),
            &mut |msg: &str| messages.push(msg.to_string()),
            &CancellationToken::new(),
        )
        .unwrap();

    for expected in [
        "Locking ranch 2",
        "Validating archive",
        "Checking archive consistency",
        "Assigning animal identities",
        "Deleting animals of ranch 2",
        "Restoring records",
        "Rewriting parent links",
    ] {
        assert!(messages.iter().any(|m| m == expected), "missing {:?}", expected);
    }
    assert_eq!(summary.last_progress.as_ref(), messages.last());
}
