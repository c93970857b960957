use std::sync::{Arc, Mutex};

use curator_core::{PolicySession, PolicyStore};
use pretty_assertions::assert_eq;

fn init_logging() {
    curator_logging::initialize_for_tests();
}

#[test]
fn session_starts_at_generation_one() {
    let session = PolicySession::new(vec!["politics".to_string()]);
    assert_eq!(session.generation(), 1);
    assert_eq!(session.active_filters(), &["politics".to_string()]);
}

#[test]
fn replacing_filters_bumps_generation_every_time() {
    init_logging();
    let store = PolicyStore::new(Vec::new());
    assert!(!store.get_active_policy().has_categories());

    assert_eq!(store.replace_filters(vec!["a".to_string()]), 2);
    assert_eq!(store.replace_filters(vec!["a".to_string()]), 3);

    let snapshot = store.get_active_policy();
    assert_eq!(snapshot.generation, 3);
    assert!(snapshot.has_categories());
    assert_eq!(store.generation(), 3);
}

#[test]
fn snapshots_are_not_affected_by_later_edits() {
    init_logging();
    let store = PolicyStore::new(vec!["a".to_string()]);
    let before = store.get_active_policy();
    store.replace_filters(vec!["b".to_string()]);
    assert_eq!(&*before.filters, &["a".to_string()]);
    assert_eq!(before.generation, 1);
}

#[test]
fn listeners_see_new_snapshot_and_may_read_the_store() {
    init_logging();
    let store = PolicyStore::new(Vec::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let reader = store.clone();
    store.on_policy_changed(move |snapshot| {
        let live = reader.generation();
        sink.lock().unwrap().push((snapshot.generation, live));
    });

    store.replace_filters(vec!["x".to_string()]);
    store.replace_filters(Vec::new());
    assert_eq!(*seen.lock().unwrap(), vec![(2, 2), (3, 3)]);
}
