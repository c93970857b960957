use std::fmt;
use std::hash::Hash;

use thiserror::Error;

use crate::ItemRecord;

/// Capability-scoped view of the externally owned tree region.
///
/// Reads are unrestricted; writes only move, remove or reinsert nodes that
/// already exist. Nothing here creates or clones host nodes.
pub trait HostTree {
    type Handle: Clone + Eq + Hash + fmt::Debug;

    /// Whether the observed region is attached right now.
    fn region_present(&self) -> bool;

    /// Children of the region in document order; empty when the region is missing.
    fn children(&self) -> Vec<Self::Handle>;

    fn tag(&self, handle: &Self::Handle) -> Option<String>;

    fn attribute(&self, handle: &Self::Handle, name: &str) -> Option<String>;

    fn remove(&mut self, handle: &Self::Handle) -> Result<(), HostError>;

    fn insert_before(&mut self, handle: &Self::Handle, anchor: &Self::Handle)
        -> Result<(), HostError>;

    fn insert_after(&mut self, handle: &Self::Handle, anchor: &Self::Handle)
        -> Result<(), HostError>;

    fn append(&mut self, handle: &Self::Handle) -> Result<(), HostError>;

    /// Drains the structural change records queued since the last call.
    fn take_records(&mut self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("handle no longer belongs to the host tree")]
    StaleHandle,
    #[error("anchor is not a child of the region")]
    MissingAnchor,
    #[error("observed region is not attached")]
    RegionMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no stable id could be derived")]
    MissingId,
    #[error("id {0} already extracted in this pass")]
    DuplicateId(String),
    #[error("item unreadable: {0}")]
    Unreadable(String),
}

/// One entry of an extraction pass, in region order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<H> {
    Item(ItemRecord<H>),
    /// A recognised non-item element the policy always strips (shelves, chip bars).
    Noise(H),
    Skipped { handle: H, error: ExtractionError },
}

/// Pluggable per-surface extraction. Must not mutate the tree.
pub trait ItemExtractor<T: HostTree> {
    fn extract(&self, tree: &T) -> Vec<Extracted<T::Handle>>;
}
