use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use curator_core::{
    BatchOutcome, BatchRequest, BatchResult, FailureKind, ItemId, PolicyStore, RequestId, Verdict,
};
use curator_logging::{curator_debug, curator_warn};

use crate::{CircuitBreaker, ClassifyError, ClassifyRequest, ClassifyResponse, Classifier};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(500),
            breaker_threshold: 3,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

/// A batch with its request id, ready for [`ClassificationClient::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub request_id: RequestId,
    pub request: BatchRequest,
}

/// Sends batches to a [`Classifier`] with timeout, one retry and a breaker.
///
/// Clones share the breaker and the request id sequence.
#[derive(Clone)]
pub struct ClassificationClient {
    classifier: Arc<dyn Classifier>,
    policy: PolicyStore,
    settings: ClientSettings,
    breaker: Arc<Mutex<CircuitBreaker>>,
    next_request_id: Arc<AtomicU64>,
}

impl ClassificationClient {
    pub fn new(classifier: Arc<dyn Classifier>, policy: PolicyStore, settings: ClientSettings) -> Self {
        let breaker = CircuitBreaker::new(settings.breaker_threshold, settings.breaker_cooldown);
        Self {
            classifier,
            policy,
            settings,
            breaker: Arc::new(Mutex::new(breaker)),
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn breaker(&self) -> CircuitBreaker {
        self.lock_breaker().clone()
    }

    pub fn open_batch(&self, request: BatchRequest) -> Batch {
        Batch {
            request_id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            request,
        }
    }

    /// Never fails: the failure travels inside [`BatchOutcome`].
    pub async fn submit(&self, batch: Batch) -> BatchResult {
        let Batch {
            request_id,
            request,
        } = batch;
        let items = request.item_ids();
        let generation = request.generation;

        let admitted = self.lock_breaker().admit(now());
        if let Err(retry_at) = admitted {
            curator_debug!("request {}: breaker open, {} item(s) rejected", request_id, items.len());
            return BatchResult {
                request_id,
                generation,
                superseded: self.policy.generation() > generation,
                outcome: BatchOutcome::Rejected { retry_at, items },
            };
        }

        let wire = ClassifyRequest::from_batch(&request);
        let mut attempt = self.attempt(&wire).await;
        if matches!(&attempt, Err(err) if err.kind == FailureKind::Timeout) {
            curator_warn!(
                "request {}: timed out, retrying in {:?}",
                request_id,
                self.settings.retry_backoff
            );
            tokio::time::sleep(self.settings.retry_backoff).await;
            attempt = self.attempt(&wire).await;
        }

        let outcome = match attempt {
            Ok(response) => {
                self.lock_breaker().record_success();
                BatchOutcome::Classified(verdicts_for(request_id, &items, response))
            }
            Err(err) => {
                curator_warn!("request {}: {}", request_id, err);
                let breaker_open_until = self.lock_breaker().record_failure(now());
                BatchOutcome::Failed {
                    kind: err.kind,
                    items,
                    breaker_open_until,
                }
            }
        };

        let superseded = self.policy.generation() > generation;
        if superseded {
            curator_debug!("request {}: generation {} superseded", request_id, generation);
        }
        BatchResult {
            request_id,
            generation,
            superseded,
            outcome,
        }
    }

    async fn attempt(&self, wire: &ClassifyRequest) -> Result<ClassifyResponse, ClassifyError> {
        match tokio::time::timeout(self.settings.request_timeout, self.classifier.classify(wire))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ClassifyError::new(
                FailureKind::Timeout,
                format!("no response within {:?}", self.settings.request_timeout),
            )),
        }
    }

    fn lock_breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ClassificationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationClient")
            .field("settings", &self.settings)
            .field("breaker", &*self.lock_breaker())
            .finish_non_exhaustive()
    }
}

/// Requested ids the service left out become `Unknown`; ids nobody asked
/// for are dropped; the first verdict for a repeated id wins.
fn verdicts_for(
    request_id: RequestId,
    requested: &[ItemId],
    response: ClassifyResponse,
) -> HashMap<ItemId, Verdict> {
    let wanted: HashSet<&ItemId> = requested.iter().collect();
    let mut verdicts = HashMap::with_capacity(requested.len());
    let mut unrequested = 0usize;
    for decision in response.decisions {
        if !wanted.contains(&decision.id) {
            unrequested += 1;
            continue;
        }
        verdicts.entry(decision.id).or_insert(decision.verdict);
    }

    let missing = wanted.len().saturating_sub(verdicts.len());
    if missing > 0 || unrequested > 0 {
        curator_debug!(
            "request {}: {} id(s) missing from response, {} unrequested ignored",
            request_id,
            missing,
            unrequested
        );
    }
    for id in requested {
        verdicts.entry(id.clone()).or_insert(Verdict::Unknown);
    }
    verdicts
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
