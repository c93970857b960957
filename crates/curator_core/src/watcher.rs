//! Debounced change detection for one observed region.
//!
//! The watcher never reads a clock: callers pass `now` and drive it by calling
//! [`ChangeWatcher::poll`] at [`ChangeWatcher::next_deadline`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use curator_logging::{curator_debug, curator_trace};
use thiserror::Error;

use crate::WatcherConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalReason {
    HostChanges,
    /// Records arrived while the watcher was suspended.
    AfterSuspension,
    RegionRestored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignal {
    pub region: String,
    pub reason: SignalReason,
    pub records: usize,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("watcher is already suspended")]
    AlreadySuspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatcherStats {
    pub received: u64,
    pub suppressed: u64,
    pub fired: u64,
    pub probes: u64,
}

/// Proof that the watcher is blinded. Consumed by [`ChangeWatcher::release`].
#[must_use = "a suspended watcher stays blind until the token is released"]
#[derive(Debug)]
pub struct SuspendToken {
    _private: (),
}

/// Subscription handle; clones share the same subscription.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    active: Arc<AtomicBool>,
}

impl WatchHandle {
    /// Safe to call from inside the subscriber's own callback.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct Subscriber {
    active: Arc<AtomicBool>,
    on_change: Box<dyn FnMut(&ChangeSignal) + Send>,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Observing,
    Polling { next_probe: Instant },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    deadline: Instant,
    records: usize,
    reason: SignalReason,
}

pub struct ChangeWatcher {
    region: String,
    debounce: Duration,
    poll_interval: Duration,
    mode: Mode,
    window: Option<Window>,
    suspended: bool,
    suppressed: usize,
    subscribers: Vec<Subscriber>,
    stats: WatcherStats,
}

impl ChangeWatcher {
    pub fn new(region: impl Into<String>, config: &WatcherConfig) -> Self {
        Self {
            region: region.into(),
            debounce: config.debounce(),
            poll_interval: config.poll_interval(),
            mode: Mode::Observing,
            window: None,
            suspended: false,
            suppressed: 0,
            subscribers: Vec::new(),
            stats: WatcherStats::default(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn stats(&self) -> WatcherStats {
        self.stats
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.mode, Mode::Polling { .. })
    }

    pub fn subscribe(
        &mut self,
        on_change: impl FnMut(&ChangeSignal) + Send + 'static,
    ) -> WatchHandle {
        let active = Arc::new(AtomicBool::new(true));
        self.subscribers.push(Subscriber {
            active: active.clone(),
            on_change: Box::new(on_change),
        });
        WatchHandle { active }
    }

    /// Records raw structural notifications from the host.
    pub fn notify(&mut self, records: usize, now: Instant) {
        if records == 0 {
            return;
        }
        self.stats.received += records as u64;
        if self.is_polling() {
            curator_trace!("{}: {} record(s) ignored while polling", self.region, records);
            return;
        }
        if self.suspended {
            self.suppressed += records;
            self.stats.suppressed += records as u64;
            return;
        }
        self.open_window(now, records, SignalReason::HostChanges);
    }

    pub fn suspend(&mut self) -> Result<SuspendToken, WatchError> {
        if self.suspended {
            return Err(WatchError::AlreadySuspended);
        }
        self.suspended = true;
        Ok(SuspendToken { _private: () })
    }

    /// Lifts suspension. Suppressed records, if any, produce exactly one
    /// signal one debounce window from `now`.
    pub fn release(&mut self, token: SuspendToken, now: Instant) {
        let SuspendToken { .. } = token;
        self.suspended = false;
        let suppressed = std::mem::take(&mut self.suppressed);
        if suppressed == 0 {
            return;
        }
        let deadline = now + self.debounce;
        let window = match self.window.take() {
            Some(open) => Window {
                deadline: open.deadline.max(deadline),
                records: open.records + suppressed,
                reason: open.reason,
            },
            None => Window {
                deadline,
                records: suppressed,
                reason: SignalReason::AfterSuspension,
            },
        };
        self.window = Some(window);
    }

    /// Fires the pending signal once its window closed.
    pub fn poll(&mut self, now: Instant) -> Option<ChangeSignal> {
        if self.suspended {
            return None;
        }
        let window = self.window.filter(|w| w.deadline <= now)?;
        self.window = None;
        let signal = ChangeSignal {
            region: self.region.clone(),
            reason: window.reason,
            records: window.records,
            at: now,
        };
        self.stats.fired += 1;
        self.dispatch(&signal);
        Some(signal)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let window = self.window.filter(|_| !self.suspended).map(|w| w.deadline);
        let probe = match self.mode {
            Mode::Polling { next_probe } => Some(next_probe),
            Mode::Observing => None,
        };
        match (window, probe) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Switches to the polling fallback. Pending signals are dropped.
    pub fn region_lost(&mut self, now: Instant) {
        if self.is_polling() {
            return;
        }
        curator_debug!("{}: region missing, polling every {:?}", self.region, self.poll_interval);
        self.window = None;
        self.mode = Mode::Polling {
            next_probe: now + self.poll_interval,
        };
    }

    pub fn probe_due(&self, now: Instant) -> bool {
        matches!(self.mode, Mode::Polling { next_probe } if next_probe <= now)
    }

    /// Records an unsuccessful presence probe and schedules the next one.
    pub fn probe_missed(&mut self, now: Instant) {
        self.stats.probes += 1;
        if self.is_polling() {
            self.mode = Mode::Polling {
                next_probe: now + self.poll_interval,
            };
        }
    }

    /// Resumes observing; one signal follows after a debounce window.
    pub fn region_restored(&mut self, now: Instant) {
        if !self.is_polling() {
            return;
        }
        self.stats.probes += 1;
        curator_debug!("{}: region restored", self.region);
        self.mode = Mode::Observing;
        self.window = Some(Window {
            deadline: now + self.debounce,
            records: 0,
            reason: SignalReason::RegionRestored,
        });
    }

    fn open_window(&mut self, now: Instant, records: usize, reason: SignalReason) {
        match self.window.as_mut() {
            Some(open) => open.records += records,
            None => {
                self.window = Some(Window {
                    deadline: now + self.debounce,
                    records,
                    reason,
                })
            }
        }
    }

    fn dispatch(&mut self, signal: &ChangeSignal) {
        for subscriber in self.subscribers.iter_mut() {
            if subscriber.active.load(Ordering::SeqCst) {
                (subscriber.on_change)(signal);
            }
        }
        self.subscribers
            .retain(|subscriber| subscriber.active.load(Ordering::SeqCst));
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("region", &self.region)
            .field("mode", &self.mode)
            .field("window", &self.window)
            .field("suspended", &self.suspended)
            .field("subscribers", &self.subscribers.len())
            .field("stats", &self.stats)
            .finish()
    }
}
