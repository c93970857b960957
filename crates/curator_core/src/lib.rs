//! Curator core: host-tree abstraction, change watcher, decision cache and the sans-IO reconciler.
mod cache;
mod classify;
mod config;
mod extract;
mod host;
mod identity;
mod memory;
mod plan;
mod policy;
mod reconciler;
mod types;
mod watcher;

pub use cache::DecisionCache;
pub use classify::{BatchItem, BatchOutcome, BatchRequest, BatchResult, FailureKind};
pub use config::{FailureMode, ReconcilerConfig, VisibilityConfig, WatcherConfig};
pub use extract::{SurfaceExtractor, SurfaceProfile};
pub use host::{Extracted, ExtractionError, HostError, HostTree, ItemExtractor};
pub use identity::item_id_from_link;
pub use memory::{MemoryTree, NodeId};
pub use plan::{plan_moves, TreeOp};
pub use policy::{PolicySession, PolicySnapshot, PolicyStore};
pub use reconciler::{CycleReport, CycleStep, Phase, Reconciler, ReconcilerState, Trigger};
pub use types::{Decision, Generation, ItemId, ItemRecord, RequestId, Verdict};
pub use watcher::{
    ChangeSignal, ChangeWatcher, SignalReason, SuspendToken, WatchError, WatchHandle, WatcherStats,
};
