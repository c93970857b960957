//! The reconciliation cycle: `Idle → Scanning → (AwaitingClassification) →
//! Applying → Idle`.
//!
//! The reconciler is sans-IO. The engine calls [`Reconciler::begin_cycle`],
//! submits the returned batch, and hands the result back through
//! [`Reconciler::complete_classification`]. Everything between those calls
//! runs to completion without yielding.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use curator_logging::{curator_debug, curator_error, curator_info, curator_warn, set_cycle};

use crate::plan::{plan_moves, TreeOp};
use crate::{
    BatchItem, BatchOutcome, BatchRequest, BatchResult, ChangeWatcher, Decision, DecisionCache,
    Extracted, FailureMode, Generation, HostError, HostTree, ItemExtractor, ItemId, ItemRecord,
    PolicySnapshot, ReconcilerConfig, RequestId, Verdict,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Initial,
    Change,
    PolicyBump,
    ManualRefresh,
    /// The breaker fallback window closed; undecided items can be classified.
    FallbackExpired,
    /// A trigger arrived while the previous cycle was busy.
    Reentry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Scanning,
    AwaitingClassification,
    Applying,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcilerState {
    pub last_applied_order: Vec<ItemId>,
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub generation: Generation,
    pub extracted: usize,
    pub skipped: usize,
    pub visible: Vec<ItemId>,
    pub removed: usize,
    pub placed: usize,
    pub region_missing: bool,
    /// Another cycle is owed because a trigger arrived mid-cycle.
    pub reentry: bool,
}

impl CycleReport {
    pub fn mutations(&self) -> usize {
        self.removed + self.placed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStep {
    Submit(BatchRequest),
    Completed(CycleReport),
    /// The trigger was folded into a pending re-entry.
    Coalesced,
    /// A classification result nobody was waiting for; its decisions were stored.
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct CycleContext {
    number: u64,
    trigger: Trigger,
    generation: Generation,
    awaiting: Option<RequestId>,
}

struct Scan<H> {
    items: Vec<ItemRecord<H>>,
    noise: Vec<H>,
    skipped: usize,
}

pub struct Reconciler<T: HostTree, X> {
    tree: T,
    extractor: X,
    config: ReconcilerConfig,
    cache: DecisionCache,
    watcher: ChangeWatcher,
    policy: PolicySnapshot,
    state: ReconcilerState,
    phase: Phase,
    pending_reentry: bool,
    parked: Vec<ItemRecord<T::Handle>>,
    fallback_until: Option<Instant>,
    cycles: u64,
    current: Option<CycleContext>,
}

impl<T, X> Reconciler<T, X>
where
    T: HostTree,
    X: ItemExtractor<T>,
{
    pub fn new(tree: T, extractor: X, config: ReconcilerConfig, policy: PolicySnapshot) -> Self {
        let watcher = ChangeWatcher::new(config.region.clone(), &config.watcher);
        let cache = DecisionCache::new(policy.generation, config.cache_capacity);
        Self {
            tree,
            extractor,
            config,
            cache,
            watcher,
            policy,
            state: ReconcilerState::default(),
            phase: Phase::Idle,
            pending_reentry: false,
            parked: Vec::new(),
            fallback_until: None,
            cycles: 0,
            current: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    pub fn policy(&self) -> &PolicySnapshot {
        &self.policy
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }

    pub fn watcher_mut(&mut self) -> &mut ChangeWatcher {
        &mut self.watcher
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn parked_ids(&self) -> Vec<ItemId> {
        self.parked.iter().map(|p| p.id.clone()).collect()
    }

    pub fn fallback_active(&self, now: Instant) -> bool {
        self.fallback_until.is_some_and(|until| now < until)
    }

    /// Adopts a newer policy. Returns `true` when the generation advanced.
    pub fn policy_changed(&mut self, snapshot: PolicySnapshot) -> bool {
        if snapshot.generation <= self.policy.generation {
            return false;
        }
        curator_info!(
            "{}: policy generation {} -> {}",
            self.config.region,
            self.policy.generation,
            snapshot.generation
        );
        self.cache.prune(snapshot.generation);
        self.policy = snapshot;
        if self.phase != Phase::Idle {
            self.pending_reentry = true;
        }
        true
    }

    /// Pulls the host's queued change records into the watcher.
    pub fn ingest_host_changes(&mut self, now: Instant) {
        if !self.tree.region_present() {
            let _ = self.tree.take_records();
            self.watcher.region_lost(now);
            return;
        }
        if self.watcher.is_polling() {
            self.region_restored(now);
        }
        let records = self.tree.take_records();
        self.watcher.notify(records, now);
    }

    /// Advances timers; returns a trigger when a cycle should start.
    pub fn tick(&mut self, now: Instant) -> Option<Trigger> {
        if self.watcher.probe_due(now) {
            if self.tree.region_present() {
                self.region_restored(now);
            } else {
                self.watcher.probe_missed(now);
            }
        }

        let fallback_expired = match self.fallback_until {
            Some(until) if now >= until => {
                self.fallback_until = None;
                true
            }
            _ => false,
        };

        if self.watcher.poll(now).is_some() {
            Some(Trigger::Change)
        } else if fallback_expired {
            Some(Trigger::FallbackExpired)
        } else {
            None
        }
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        match (self.watcher.next_deadline(), self.fallback_until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn begin_cycle(&mut self, trigger: Trigger, now: Instant) -> CycleStep {
        if self.phase != Phase::Idle {
            curator_debug!("{}: {:?} coalesced into re-entry", self.config.region, trigger);
            self.pending_reentry = true;
            return CycleStep::Coalesced;
        }

        self.cycles += 1;
        set_cycle(self.cycles);
        self.pending_reentry = false;
        self.phase = Phase::Scanning;
        self.current = Some(CycleContext {
            number: self.cycles,
            trigger,
            generation: self.policy.generation,
            awaiting: None,
        });
        curator_debug!(
            "{}: cycle start ({:?}, gen {})",
            self.config.region,
            trigger,
            self.policy.generation
        );

        if !self.tree.region_present() {
            self.watcher.region_lost(now);
            return CycleStep::Completed(self.finish(CycleReport {
                region_missing: true,
                ..CycleReport::default()
            }));
        }

        let scan = self.scan();
        self.refresh_parked(&scan.items);

        if !self.policy.has_categories() {
            return CycleStep::Completed(self.apply(now));
        }

        let generation = self.policy.generation;
        let needs: Vec<BatchItem> = scan
            .items
            .iter()
            .chain(self.parked.iter())
            .filter(|record| self.cache.get(&record.id, generation).is_none())
            .map(|record| BatchItem {
                id: record.id.clone(),
                title: record.title.clone(),
                metadata: record.metadata.clone(),
            })
            .collect();

        if needs.is_empty() {
            return CycleStep::Completed(self.apply(now));
        }

        curator_debug!(
            "{}: {} item(s) need classification, {} known",
            self.config.region,
            needs.len(),
            scan.items.len() + self.parked.len() - needs.len()
        );
        self.phase = Phase::AwaitingClassification;
        CycleStep::Submit(BatchRequest {
            generation,
            filters: self.policy.filters.clone(),
            items: needs,
        })
    }

    /// Tags the in-flight cycle with the client's request id.
    pub fn batch_opened(&mut self, request_id: RequestId) {
        if self.phase != Phase::AwaitingClassification {
            return;
        }
        if let Some(ctx) = self.current.as_mut() {
            ctx.awaiting = Some(request_id);
        }
    }

    pub fn complete_classification(&mut self, result: BatchResult, now: Instant) -> CycleStep {
        self.record_outcome(&result, now);

        let awaited = self.current.and_then(|ctx| ctx.awaiting);
        if self.phase != Phase::AwaitingClassification || awaited != Some(result.request_id) {
            curator_debug!(
                "{}: result for request {} not awaited (awaiting {:?})",
                self.config.region,
                result.request_id,
                awaited
            );
            return CycleStep::Ignored;
        }

        if result.superseded || result.generation != self.policy.generation {
            curator_debug!(
                "{}: request {} answered for superseded gen {}",
                self.config.region,
                result.request_id,
                result.generation
            );
            self.pending_reentry = true;
        }
        CycleStep::Completed(self.apply(now))
    }

    fn record_outcome(&mut self, result: &BatchResult, now: Instant) {
        match &result.outcome {
            BatchOutcome::Classified(verdicts) => {
                for (id, verdict) in verdicts {
                    self.cache
                        .put(Decision::new(id.clone(), *verdict, result.generation, now));
                }
            }
            BatchOutcome::Failed {
                kind,
                items,
                breaker_open_until,
            } => {
                curator_warn!(
                    "{}: request {} failed ({}); {} item(s) left unknown",
                    self.config.region,
                    result.request_id,
                    kind,
                    items.len()
                );
                for id in items {
                    self.cache
                        .put(Decision::new(id.clone(), Verdict::Unknown, result.generation, now));
                }
                if let Some(until) = breaker_open_until {
                    curator_info!(
                        "{}: breaker opened; unknown items shown unfiltered until it recovers",
                        self.config.region
                    );
                    self.extend_fallback(*until);
                }
            }
            BatchOutcome::Rejected { retry_at, items } => {
                curator_info!(
                    "{}: classification halted; {} item(s) shown unfiltered until breaker recovers",
                    self.config.region,
                    items.len()
                );
                self.extend_fallback(*retry_at);
            }
        }
    }

    fn extend_fallback(&mut self, until: Instant) {
        self.fallback_until = Some(self.fallback_until.map_or(until, |current| current.max(until)));
    }

    fn scan(&self) -> Scan<T::Handle> {
        let mut scan = Scan {
            items: Vec::new(),
            noise: Vec::new(),
            skipped: 0,
        };
        for entry in self.extractor.extract(&self.tree) {
            match entry {
                Extracted::Item(record) => scan.items.push(record),
                Extracted::Noise(handle) => scan.noise.push(handle),
                Extracted::Skipped { handle, error } => {
                    curator_debug!("{}: skipped {:?}: {}", self.config.region, handle, error);
                    scan.skipped += 1;
                }
            }
        }
        scan
    }

    /// Parked items the host put back itself are live again.
    fn refresh_parked(&mut self, live: &[ItemRecord<T::Handle>]) {
        let live_ids: HashSet<&ItemId> = live.iter().map(|r| &r.id).collect();
        self.parked.retain(|p| !live_ids.contains(&p.id));
    }

    fn is_visible(&self, id: &ItemId, fallback: bool) -> bool {
        if !self.policy.has_categories() {
            return true;
        }
        match self.cache.get(id, self.policy.generation).map(|d| d.verdict) {
            Some(Verdict::Allow) => true,
            Some(Verdict::Deny) => false,
            Some(Verdict::Unknown) | None => {
                fallback || self.config.visibility.failure_mode == FailureMode::FailOpen
            }
        }
    }

    fn apply(&mut self, now: Instant) -> CycleReport {
        self.phase = Phase::Applying;
        let generation = self.policy.generation;

        if !self.tree.region_present() {
            self.watcher.region_lost(now);
            return self.finish(CycleReport {
                generation,
                region_missing: true,
                ..CycleReport::default()
            });
        }

        let scan = self.scan();
        self.refresh_parked(&scan.items);
        let fallback = self.fallback_active(now);

        let mut target: Vec<&ItemRecord<T::Handle>> = scan
            .items
            .iter()
            .chain(self.parked.iter())
            .filter(|record| self.is_visible(&record.id, fallback))
            .collect();
        if let Some(max) = self.config.visibility.max_visible {
            target.truncate(max);
        }
        let target_ids: Vec<ItemId> = target.iter().map(|r| r.id.clone()).collect();
        let target_handles: Vec<T::Handle> = target.iter().map(|r| r.handle.clone()).collect();

        let mut live_handles: Vec<T::Handle> = scan.items.iter().map(|r| r.handle.clone()).collect();
        if self.config.visibility.strip_noise {
            live_handles.extend(scan.noise.iter().cloned());
        }

        self.note_host_drift(&scan.items);

        let ops = plan_moves(&live_handles, &target_handles);
        let mut report = CycleReport {
            generation,
            extracted: scan.items.len(),
            skipped: scan.skipped,
            visible: target_ids.clone(),
            ..CycleReport::default()
        };
        if ops.is_empty() {
            self.state.last_applied_order = target_ids;
            return self.finish(report);
        }

        // Host records queued so far are not ours to suppress.
        let host_records = self.tree.take_records();
        self.watcher.notify(host_records, now);
        let token = match self.watcher.suspend() {
            Ok(token) => token,
            Err(err) => {
                curator_error!("{}: cannot apply: {}", self.config.region, err);
                self.pending_reentry = true;
                return self.finish(report);
            }
        };
        self.state.suspended = true;

        let records: HashMap<T::Handle, ItemRecord<T::Handle>> = scan
            .items
            .iter()
            .chain(self.parked.iter())
            .map(|r| (r.handle.clone(), r.clone()))
            .collect();
        let mut complete = true;
        for op in &ops {
            match op.apply(&mut self.tree) {
                Ok(()) => match op {
                    TreeOp::Remove(handle) => {
                        report.removed += 1;
                        if let Some(record) = records.get(handle) {
                            self.parked.push(record.clone());
                        }
                    }
                    _ => {
                        report.placed += 1;
                        self.parked.retain(|p| &p.handle != op.handle());
                    }
                },
                Err(HostError::StaleHandle) if !matches!(op, TreeOp::Remove(_)) => {
                    curator_warn!(
                        "{}: handle {:?} went stale; dropping it",
                        self.config.region,
                        op.handle()
                    );
                    self.parked.retain(|p| &p.handle != op.handle());
                    complete = false;
                    self.pending_reentry = true;
                    break;
                }
                Err(err) => {
                    curator_warn!(
                        "{}: write {:?} failed: {}",
                        self.config.region,
                        op,
                        err
                    );
                    complete = false;
                    self.pending_reentry = true;
                    break;
                }
            }
        }

        let own_records = self.tree.take_records();
        self.watcher.notify(own_records, now);
        self.watcher.release(token, now);
        self.state.suspended = false;

        self.state.last_applied_order = if complete {
            target_ids
        } else {
            self.scan().items.into_iter().map(|r| r.id).collect()
        };
        self.enforce_parked_bound();

        curator_info!(
            "{}: applied {} removal(s), {} placement(s); {} visible",
            self.config.region,
            report.removed,
            report.placed,
            self.state.last_applied_order.len()
        );
        self.finish(report)
    }

    /// Prunes `last_applied_order` to what is extractable and logs when the
    /// host changed the live order since the last apply.
    fn note_host_drift(&mut self, live: &[ItemRecord<T::Handle>]) {
        let live_ids: HashSet<&ItemId> = live.iter().map(|r| &r.id).collect();
        self.state
            .last_applied_order
            .retain(|id| live_ids.contains(id));
        let live_order: Vec<&ItemId> = live.iter().map(|r| &r.id).collect();
        let applied: Vec<&ItemId> = self.state.last_applied_order.iter().collect();
        if applied != live_order {
            curator_debug!(
                "{}: host drift since last apply ({} applied, {} live)",
                self.config.region,
                applied.len(),
                live_order.len()
            );
        }
    }

    fn enforce_parked_bound(&mut self) {
        let max = self.config.max_parked;
        if self.parked.len() > max {
            let excess = self.parked.len() - max;
            self.parked.drain(..excess);
        }
    }

    fn region_restored(&mut self, now: Instant) {
        self.watcher.region_restored(now);
        self.parked.clear();
        self.state.last_applied_order.clear();
    }

    fn finish(&mut self, mut report: CycleReport) -> CycleReport {
        if let Some(ctx) = self.current.take() {
            report.cycle = ctx.number;
            curator_debug!(
                "{}: cycle {} ({:?}) done under gen {}",
                self.config.region,
                ctx.number,
                ctx.trigger,
                ctx.generation
            );
        }
        self.phase = Phase::Idle;
        report.reentry = self.pending_reentry;
        report
    }
}

impl<T: HostTree, X> std::fmt::Debug for Reconciler<T, X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("region", &self.config.region)
            .field("phase", &self.phase)
            .field("generation", &self.policy.generation)
            .field("state", &self.state)
            .field("parked", &self.parked.len())
            .field("pending_reentry", &self.pending_reentry)
            .finish_non_exhaustive()
    }
}
