use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::{Generation, ItemId, RequestId, Verdict};

/// One item as sent to the classification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: ItemId,
    pub title: String,
    pub metadata: BTreeMap<String, String>,
}

/// Everything the reconciler wants classified in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub generation: Generation,
    pub filters: Arc<[String]>,
    pub items: Vec<BatchItem>,
}

impl BatchRequest {
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ServiceError,
    MalformedResponse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ServiceError => write!(f, "service error"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A verdict for every requested item; ids the service left out are `Unknown`.
    Classified(HashMap<ItemId, Verdict>),
    /// Terminal failure: the items become unknown-sticky. `breaker_open_until`
    /// is set when this failure opened the circuit breaker.
    Failed {
        kind: FailureKind,
        items: Vec<ItemId>,
        breaker_open_until: Option<Instant>,
    },
    /// The circuit breaker refused the batch; nothing is recorded.
    Rejected { retry_at: Instant, items: Vec<ItemId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub request_id: RequestId,
    pub generation: Generation,
    /// The policy advanced past `generation` before the response arrived.
    pub superseded: bool,
    pub outcome: BatchOutcome,
}
