use std::collections::HashMap;

use curator_logging::curator_debug;

use crate::{Decision, Generation, ItemId};

/// Generation-aware store of classification decisions.
///
/// Entries are keyed by `(item, generation)`; only the live generation is
/// ever surfaced by [`DecisionCache::get`].
#[derive(Debug, Clone)]
pub struct DecisionCache {
    live_generation: Generation,
    capacity: usize,
    entries: HashMap<(ItemId, Generation), Decision>,
}

impl DecisionCache {
    pub fn new(live_generation: Generation, capacity: usize) -> Self {
        Self {
            live_generation,
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn live_generation(&self) -> Generation {
        self.live_generation
    }

    pub fn get(&self, item_id: &ItemId, generation: Generation) -> Option<&Decision> {
        if generation != self.live_generation {
            return None;
        }
        self.entries.get(&(item_id.clone(), generation))
    }

    pub fn put(&mut self, decision: Decision) {
        if decision.policy_generation < self.live_generation {
            curator_debug!(
                "storing superseded decision for {} (gen {} < live {})",
                decision.item_id,
                decision.policy_generation,
                self.live_generation
            );
        }
        let key = (decision.item_id.clone(), decision.policy_generation);
        self.entries.insert(key, decision);
        if self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Drops every entry older than `generation` and makes it the live one.
    pub fn prune(&mut self, generation: Generation) {
        if generation > self.live_generation {
            self.live_generation = generation;
        }
        let before = self.entries.len();
        self.entries.retain(|(_, entry_gen), _| *entry_gen >= generation);
        curator_debug!(
            "cache pruned to generation {}: {} -> {} entries",
            generation,
            before,
            self.entries.len()
        );
    }

    /// Inspects an entry regardless of the live generation.
    pub fn stored(&self, item_id: &ItemId, generation: Generation) -> Option<&Decision> {
        self.entries.get(&(item_id.clone(), generation))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Superseded entries go first, then the oldest live ones.
    fn evict_oldest(&mut self) {
        let live = self.live_generation;
        let oldest = self
            .entries
            .iter()
            .min_by_key(|((_, generation), decision)| (*generation >= live, decision.decided_at))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
