//! In-memory host tree.
//!
//! Stands in for the host's live region in tests and the demo host. Clones
//! share one tree, so a test can mutate it "as the host" while the engine
//! holds another clone.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{HostError, HostTree};

pub type NodeId = u64;

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    discarded: bool,
}

#[derive(Debug)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
    children: Vec<NodeId>,
    present: bool,
    next_id: NodeId,
    pending_records: usize,
    engine_writes: usize,
}

type ChangeHook = Box<dyn Fn() + Send>;

#[derive(Clone)]
pub struct MemoryTree {
    inner: Arc<Mutex<Inner>>,
    hook: Arc<Mutex<Option<ChangeHook>>>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes: HashMap::new(),
                children: Vec::new(),
                present: true,
                next_id: 1,
                pending_records: 0,
                engine_writes: 0,
            })),
            hook: Arc::new(Mutex::new(None)),
        }
    }

    /// Called after every structural change, host or engine, once the tree
    /// lock is released.
    pub fn set_change_hook(&self, hook: impl Fn() + Send + 'static) {
        *self.hook.lock().unwrap_or_else(|p| p.into_inner()) = Some(Box::new(hook));
    }

    /// Creates a detached node.
    pub fn create_node(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.nodes.insert(
            id,
            Node {
                tag: tag.to_string(),
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                discarded: false,
            },
        );
        id
    }

    /// Appends a new node to the region as the host would.
    pub fn push_node(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = self.create_node(tag, attributes);
        self.host_insert(usize::MAX, id);
        id
    }

    /// Appends a feed item with the default `item` tag, `href` and `title`.
    pub fn push_item(&self, href: &str, title: &str) -> NodeId {
        self.push_node("item", &[("href", href), ("title", title)])
    }

    /// Host-side insertion at `index` (clamped); moves the node if attached.
    pub fn host_insert(&self, index: usize, node: NodeId) {
        {
            let mut inner = self.lock();
            if !inner.present {
                return;
            }
            inner.children.retain(|&c| c != node);
            let index = index.min(inner.children.len());
            inner.children.insert(index, node);
            inner.pending_records += 1;
        }
        self.fire_hook();
    }

    pub fn host_remove(&self, node: NodeId) {
        let removed = {
            let mut inner = self.lock();
            let before = inner.children.len();
            inner.children.retain(|&c| c != node);
            let removed = inner.children.len() != before;
            if removed {
                inner.pending_records += 1;
            }
            removed
        };
        if removed {
            self.fire_hook();
        }
    }

    /// Removes the node and invalidates its handle for good.
    pub fn discard(&self, node: NodeId) {
        self.host_remove(node);
        if let Some(n) = self.lock().nodes.get_mut(&node) {
            n.discarded = true;
        }
    }

    /// The whole region disappears, e.g. on navigation.
    pub fn detach_region(&self) {
        {
            let mut inner = self.lock();
            let old = std::mem::take(&mut inner.children);
            for id in old {
                if let Some(n) = inner.nodes.get_mut(&id) {
                    n.discarded = true;
                }
            }
            inner.present = false;
            inner.pending_records += 1;
        }
        self.fire_hook();
    }

    /// A fresh, empty region appears.
    pub fn attach_region(&self) {
        {
            let mut inner = self.lock();
            inner.present = true;
            inner.pending_records += 1;
        }
        self.fire_hook();
    }

    pub fn child_ids(&self) -> Vec<NodeId> {
        self.lock().children.clone()
    }

    pub fn attribute_of(&self, node: NodeId, name: &str) -> Option<String> {
        self.lock()
            .nodes
            .get(&node)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    /// Values of `name` for every child that carries it, in region order.
    pub fn visible_attribute(&self, name: &str) -> Vec<String> {
        let inner = self.lock();
        inner
            .children
            .iter()
            .filter_map(|id| inner.nodes.get(id))
            .filter_map(|n| n.attributes.get(name).cloned())
            .collect()
    }

    /// Number of writes performed through [`HostTree`].
    pub fn engine_writes(&self) -> usize {
        self.lock().engine_writes
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fire_hook(&self) {
        if let Some(hook) = self.hook.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            hook();
        }
    }

    fn engine_write(
        &mut self,
        handle: NodeId,
        place: impl FnOnce(&mut Vec<NodeId>) -> Result<(), HostError>,
    ) -> Result<(), HostError> {
        {
            let mut inner = self.lock();
            if !inner.present {
                return Err(HostError::RegionMissing);
            }
            match inner.nodes.get(&handle) {
                Some(node) if !node.discarded => {}
                _ => return Err(HostError::StaleHandle),
            }
            place(&mut inner.children)?;
            inner.pending_records += 1;
            inner.engine_writes += 1;
        }
        self.fire_hook();
        Ok(())
    }
}

fn position(children: &[NodeId], node: NodeId) -> Option<usize> {
    children.iter().position(|&c| c == node)
}

impl HostTree for MemoryTree {
    type Handle = NodeId;

    fn region_present(&self) -> bool {
        self.lock().present
    }

    fn children(&self) -> Vec<NodeId> {
        self.child_ids()
    }

    fn tag(&self, handle: &NodeId) -> Option<String> {
        self.lock().nodes.get(handle).map(|n| n.tag.clone())
    }

    fn attribute(&self, handle: &NodeId, name: &str) -> Option<String> {
        self.attribute_of(*handle, name)
    }

    fn remove(&mut self, handle: &NodeId) -> Result<(), HostError> {
        let node = *handle;
        self.engine_write(node, |children| {
            let index = position(children, node).ok_or(HostError::StaleHandle)?;
            children.remove(index);
            Ok(())
        })
    }

    fn insert_before(&mut self, handle: &NodeId, anchor: &NodeId) -> Result<(), HostError> {
        let (node, anchor) = (*handle, *anchor);
        self.engine_write(node, |children| {
            if node == anchor || position(children, anchor).is_none() {
                return Err(HostError::MissingAnchor);
            }
            children.retain(|&c| c != node);
            let index = position(children, anchor).ok_or(HostError::MissingAnchor)?;
            children.insert(index, node);
            Ok(())
        })
    }

    fn insert_after(&mut self, handle: &NodeId, anchor: &NodeId) -> Result<(), HostError> {
        let (node, anchor) = (*handle, *anchor);
        self.engine_write(node, |children| {
            if node == anchor || position(children, anchor).is_none() {
                return Err(HostError::MissingAnchor);
            }
            children.retain(|&c| c != node);
            let index = position(children, anchor).ok_or(HostError::MissingAnchor)?;
            children.insert(index + 1, node);
            Ok(())
        })
    }

    fn append(&mut self, handle: &NodeId) -> Result<(), HostError> {
        let node = *handle;
        self.engine_write(node, |children| {
            children.retain(|&c| c != node);
            children.push(node);
            Ok(())
        })
    }

    fn take_records(&mut self) -> usize {
        std::mem::take(&mut self.lock().pending_records)
    }
}

impl std::fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTree")
            .field("inner", &*self.lock())
            .finish_non_exhaustive()
    }
}
