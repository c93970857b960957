use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub type Generation = u64;
pub type RequestId = u64;

/// Stable identity of one logical item, derived from a durable attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny,
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Deny => write!(f, "deny"),
            Verdict::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub item_id: ItemId,
    pub verdict: Verdict,
    pub policy_generation: Generation,
    pub decided_at: Instant,
}

impl Decision {
    pub fn new(
        item_id: ItemId,
        verdict: Verdict,
        policy_generation: Generation,
        decided_at: Instant,
    ) -> Self {
        Self {
            item_id,
            verdict,
            policy_generation,
            decided_at,
        }
    }
}

/// One candidate content unit as seen by the extractor.
///
/// `handle` refers to the host's node; cloning it clones the reference, not
/// the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord<H> {
    pub id: ItemId,
    pub title: String,
    pub metadata: BTreeMap<String, String>,
    pub handle: H,
}

impl<H> ItemRecord<H> {
    pub fn new(id: ItemId, title: impl Into<String>, handle: H) -> Self {
        Self {
            id,
            title: title.into(),
            metadata: BTreeMap::new(),
            handle,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
