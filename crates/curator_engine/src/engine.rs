use std::time::{Duration, Instant};

use curator_core::{
    BatchResult, CycleReport, CycleStep, HostTree, ItemExtractor, Phase, PolicyStore, Reconciler,
    Trigger,
};
use curator_logging::{curator_debug, curator_info, curator_warn};
use futures_util::future::{BoxFuture, FutureExt, OptionFuture};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ClassificationClient;

/// Consecutive re-entries run back to back before waiting for the next event.
const MAX_IMMEDIATE_REENTRIES: usize = 3;

/// Pause before a re-entry that hit the limit above runs.
const DEFERRED_REENTRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// The host queued structural change records.
    HostChanged,
    Refresh,
    PolicyChanged,
}

/// Clonable front for host glue. Every method is fire-and-forget.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    cancel: CancellationToken,
}

impl EngineHandle {
    pub fn host_changed(&self) {
        let _ = self.cmd_tx.send(EngineCommand::HostChanged);
    }

    pub fn refresh(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Refresh);
    }

    pub fn policy_changed(&self) {
        let _ = self.cmd_tx.send(EngineCommand::PolicyChanged);
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.cmd_tx.is_closed()
    }
}

/// Drives one [`Reconciler`] on the current task.
pub struct CurationEngine<T: HostTree, X> {
    reconciler: Reconciler<T, X>,
    client: ClassificationClient,
    policy: PolicyStore,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    cancel: CancellationToken,
    reports: Option<mpsc::UnboundedSender<CycleReport>>,
    in_flight: Option<BoxFuture<'static, BatchResult>>,
    deferred_reentry: Option<tokio::time::Instant>,
}

impl<T, X> CurationEngine<T, X>
where
    T: HostTree,
    X: ItemExtractor<T>,
{
    /// Subscribes to `policy`; its listener lives as long as the store.
    pub fn new(
        reconciler: Reconciler<T, X>,
        client: ClassificationClient,
        policy: PolicyStore,
    ) -> (Self, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = EngineHandle {
            cmd_tx: cmd_tx.clone(),
            cancel: cancel.clone(),
        };
        policy.on_policy_changed(move |_| {
            let _ = cmd_tx.send(EngineCommand::PolicyChanged);
        });

        let engine = Self {
            reconciler,
            client,
            policy,
            cmd_rx,
            cancel,
            reports: None,
            in_flight: None,
            deferred_reentry: None,
        };
        (engine, handle)
    }

    /// Every completed cycle is also sent to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<CycleReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn reconciler(&self) -> &Reconciler<T, X> {
        &self.reconciler
    }

    /// Runs until shutdown or until every handle is dropped, then hands the
    /// reconciler back.
    pub async fn run(mut self) -> Reconciler<T, X> {
        curator_info!("{}: engine started", self.reconciler.config().region);
        self.start_cycle(Trigger::Initial);

        loop {
            let wakeup = match (
                self.reconciler
                    .next_wakeup()
                    .map(tokio::time::Instant::from_std),
                self.deferred_reentry,
            ) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let has_wakeup = wakeup.is_some();
            let deadline = wakeup.unwrap_or_else(tokio::time::Instant::now);
            let awaiting = self.in_flight.is_some();

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(result) = OptionFuture::from(self.in_flight.as_mut()), if awaiting => {
                    self.in_flight = None;
                    self.finish_classification(result);
                }
                _ = tokio::time::sleep_until(deadline), if has_wakeup => self.on_wakeup(),
            }
        }

        if self.in_flight.take().is_some() {
            curator_debug!("dropping in-flight classification on shutdown");
        }
        curator_info!("{}: engine stopped", self.reconciler.config().region);
        self.reconciler
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::HostChanged => self.reconciler.ingest_host_changes(now()),
            EngineCommand::Refresh => self.start_cycle(Trigger::ManualRefresh),
            EngineCommand::PolicyChanged => {
                if self.reconciler.policy_changed(self.policy.get_active_policy()) {
                    self.start_cycle(Trigger::PolicyBump);
                }
            }
        }
    }

    fn on_wakeup(&mut self) {
        if self
            .deferred_reentry
            .is_some_and(|at| at <= tokio::time::Instant::now())
        {
            self.deferred_reentry = None;
            self.start_cycle(Trigger::Reentry);
        }
        if let Some(trigger) = self.reconciler.tick(now()) {
            self.start_cycle(trigger);
        }
    }

    fn start_cycle(&mut self, trigger: Trigger) {
        // An idle start folds in any owed re-entry.
        if self.reconciler.phase() == Phase::Idle {
            self.deferred_reentry = None;
        }
        let step = self.reconciler.begin_cycle(trigger, now());
        self.drive(step);
    }

    fn finish_classification(&mut self, result: BatchResult) {
        let step = self.reconciler.complete_classification(result, now());
        self.drive(step);
    }

    fn drive(&mut self, mut step: CycleStep) {
        let mut reentries = 0;
        loop {
            match step {
                CycleStep::Submit(request) => {
                    let batch = self.client.open_batch(request);
                    self.reconciler.batch_opened(batch.request_id);
                    let client = self.client.clone();
                    self.in_flight = Some(async move { client.submit(batch).await }.boxed());
                    return;
                }
                CycleStep::Completed(report) => {
                    let reentry = report.reentry;
                    self.publish(report);
                    if !reentry {
                        return;
                    }
                    if reentries == MAX_IMMEDIATE_REENTRIES {
                        curator_warn!(
                            "{}: {} re-entries in a row; next one in {:?}",
                            self.reconciler.config().region,
                            reentries,
                            DEFERRED_REENTRY_DELAY
                        );
                        self.deferred_reentry =
                            Some(tokio::time::Instant::now() + DEFERRED_REENTRY_DELAY);
                        return;
                    }
                    reentries += 1;
                    step = self.reconciler.begin_cycle(Trigger::Reentry, now());
                }
                CycleStep::Coalesced | CycleStep::Ignored => return,
            }
        }
    }

    fn publish(&mut self, report: CycleReport) {
        if let Some(tx) = &self.reports {
            if tx.send(report).is_err() {
                self.reports = None;
            }
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
