use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use curator_core::{ChangeWatcher, SignalReason, WatchError, WatcherConfig};
use pretty_assertions::assert_eq;

fn init_logging() {
    curator_logging::initialize_for_tests();
}

fn watcher() -> ChangeWatcher {
    ChangeWatcher::new(
        "feed",
        &WatcherConfig {
            debounce_ms: 100,
            poll_interval_ms: 500,
        },
    )
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn burst_inside_one_window_fires_once() {
    init_logging();
    let mut watcher = watcher();
    let t0 = Instant::now();

    watcher.notify(1, t0);
    watcher.notify(3, t0 + ms(40));
    watcher.notify(2, t0 + ms(90));
    assert_eq!(watcher.next_deadline(), Some(t0 + ms(100)));
    assert_eq!(watcher.poll(t0 + ms(99)), None);

    let signal = watcher.poll(t0 + ms(100)).expect("signal");
    assert_eq!(signal.records, 6);
    assert_eq!(signal.reason, SignalReason::HostChanges);
    assert_eq!(signal.region, "feed");
    assert_eq!(watcher.poll(t0 + ms(300)), None);
    assert_eq!(watcher.stats().fired, 1);
    assert_eq!(watcher.stats().received, 6);
}

#[test]
fn window_is_not_extended_by_late_records() {
    init_logging();
    let mut watcher = watcher();
    let t0 = Instant::now();

    watcher.notify(1, t0);
    watcher.notify(1, t0 + ms(99));
    assert_eq!(watcher.next_deadline(), Some(t0 + ms(100)));
    assert!(watcher.poll(t0 + ms(100)).is_some());

    watcher.notify(1, t0 + ms(101));
    assert_eq!(watcher.next_deadline(), Some(t0 + ms(201)));
}

#[test]
fn zero_records_open_no_window() {
    init_logging();
    let mut watcher = watcher();
    watcher.notify(0, Instant::now());
    assert_eq!(watcher.next_deadline(), None);
}

#[test]
fn suspended_records_become_one_signal_after_release() {
    init_logging();
    let mut watcher = watcher();
    let t0 = Instant::now();

    let token = watcher.suspend().expect("not yet suspended");
    assert!(watcher.is_suspended());
    assert_eq!(watcher.suspend().err(), Some(WatchError::AlreadySuspended));

    watcher.notify(4, t0);
    assert_eq!(watcher.poll(t0 + ms(500)), None);
    assert_eq!(watcher.next_deadline(), None);

    watcher.release(token, t0 + ms(10));
    assert!(!watcher.is_suspended());
    assert_eq!(watcher.next_deadline(), Some(t0 + ms(110)));

    let signal = watcher.poll(t0 + ms(110)).expect("signal");
    assert_eq!(signal.reason, SignalReason::AfterSuspension);
    assert_eq!(signal.records, 4);
    assert_eq!(watcher.stats().suppressed, 4);
}

#[test]
fn release_without_suppressed_records_is_silent() {
    init_logging();
    let mut watcher = watcher();
    let t0 = Instant::now();
    let token = watcher.suspend().expect("suspend");
    watcher.release(token, t0);
    assert_eq!(watcher.next_deadline(), None);
}

#[test]
fn subscribers_receive_signals_and_can_unsubscribe_themselves() {
    init_logging();
    let mut watcher = watcher();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle_slot = Arc::new(Mutex::new(None::<curator_core::WatchHandle>));

    let sink = seen.clone();
    let slot = handle_slot.clone();
    let handle = watcher.subscribe(move |signal| {
        sink.lock().unwrap().push(signal.records);
        if let Some(own) = slot.lock().unwrap().as_ref() {
            own.unsubscribe();
        }
    });
    *handle_slot.lock().unwrap() = Some(handle.clone());

    let other_seen = Arc::new(Mutex::new(0));
    let counter = other_seen.clone();
    let _other = watcher.subscribe(move |_| *counter.lock().unwrap() += 1);

    let t0 = Instant::now();
    watcher.notify(2, t0);
    watcher.poll(t0 + ms(100));
    watcher.notify(5, t0 + ms(200));
    watcher.poll(t0 + ms(300));

    assert_eq!(*seen.lock().unwrap(), vec![2]);
    assert!(!handle.is_active());
    assert_eq!(*other_seen.lock().unwrap(), 2);
}

#[test]
fn missing_region_switches_to_polling() {
    init_logging();
    let mut watcher = watcher();
    let t0 = Instant::now();

    watcher.notify(1, t0);
    watcher.region_lost(t0 + ms(10));
    assert!(watcher.is_polling());
    assert_eq!(watcher.next_deadline(), Some(t0 + ms(510)));

    watcher.notify(3, t0 + ms(20));
    assert_eq!(watcher.poll(t0 + ms(200)), None);

    assert!(!watcher.probe_due(t0 + ms(509)));
    assert!(watcher.probe_due(t0 + ms(510)));
    watcher.probe_missed(t0 + ms(510));
    assert_eq!(watcher.next_deadline(), Some(t0 + ms(1_010)));

    watcher.region_restored(t0 + ms(1_010));
    assert!(!watcher.is_polling());
    let signal = watcher.poll(t0 + ms(1_110)).expect("signal after restore");
    assert_eq!(signal.reason, SignalReason::RegionRestored);
    assert_eq!(watcher.stats().probes, 2);
}
