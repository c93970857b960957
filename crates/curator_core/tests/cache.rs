use std::time::{Duration, Instant};

use curator_core::{Decision, DecisionCache, ItemId, Verdict};
use pretty_assertions::assert_eq;

fn init_logging() {
    curator_logging::initialize_for_tests();
}

fn decision(id: &str, verdict: Verdict, generation: u64, at: Instant) -> Decision {
    Decision::new(ItemId::new(id), verdict, generation, at)
}

#[test]
fn only_live_generation_is_served() {
    init_logging();
    let now = Instant::now();
    let mut cache = DecisionCache::new(1, 100);
    cache.put(decision("a", Verdict::Deny, 1, now));

    let a = ItemId::new("a");
    assert_eq!(cache.get(&a, 1).map(|d| d.verdict), Some(Verdict::Deny));
    assert_eq!(cache.get(&a, 2), None);

    cache.prune(2);
    assert_eq!(cache.get(&a, 1), None);
    assert_eq!(cache.get(&a, 2), None);
    assert!(cache.is_empty());
}

#[test]
fn superseded_put_is_stored_but_never_served() {
    init_logging();
    let now = Instant::now();
    let mut cache = DecisionCache::new(1, 100);
    cache.prune(3);

    cache.put(decision("a", Verdict::Allow, 2, now));
    let a = ItemId::new("a");
    assert_eq!(cache.get(&a, 2), None);
    assert_eq!(cache.get(&a, 3), None);
    assert_eq!(cache.stored(&a, 2).map(|d| d.verdict), Some(Verdict::Allow));
}

#[test]
fn prune_never_moves_backwards() {
    init_logging();
    let mut cache = DecisionCache::new(5, 10);
    cache.prune(3);
    assert_eq!(cache.live_generation(), 5);
}

#[test]
fn over_capacity_evicts_superseded_then_oldest() {
    init_logging();
    let t0 = Instant::now();
    let mut cache = DecisionCache::new(2, 2);
    cache.put(decision("old", Verdict::Deny, 1, t0 + Duration::from_secs(5)));
    cache.put(decision("a", Verdict::Allow, 2, t0));
    cache.put(decision("b", Verdict::Allow, 2, t0 + Duration::from_secs(1)));

    assert_eq!(cache.len(), 2);
    assert!(cache.stored(&ItemId::new("old"), 1).is_none());

    cache.put(decision("c", Verdict::Allow, 2, t0 + Duration::from_secs(2)));
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&ItemId::new("a"), 2).is_none());
    assert!(cache.get(&ItemId::new("b"), 2).is_some());
    assert!(cache.get(&ItemId::new("c"), 2).is_some());
}

#[test]
fn put_replaces_same_item_and_generation() {
    init_logging();
    let now = Instant::now();
    let mut cache = DecisionCache::new(1, 10);
    cache.put(decision("a", Verdict::Unknown, 1, now));
    cache.put(decision("a", Verdict::Deny, 1, now));
    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.get(&ItemId::new("a"), 1).map(|d| d.verdict),
        Some(Verdict::Deny)
    );
}
