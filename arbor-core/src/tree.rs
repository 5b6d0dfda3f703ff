//! Render Node Tree
//!
//! The live instance tree, stored in an arena keyed by [`NodeId`]. Forward
//! edges (a node's child slots) are the ownership relation; the parent link
//! is a plain id. Ids come from a global counter and are never reused, so a
//! handle to an unmounted instance simply stops resolving.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::element::Element;
use crate::error::{Error, Result};
use crate::hooks::{EffectSlot, HookStore};
use crate::target::TargetNode;

/// Unique identifier for a render node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live instance paired with the description it currently represents.
pub(crate) struct RenderNode {
    pub(crate) element: Element,
    pub(crate) parent: Option<NodeId>,
    /// Positional child slots; `None` marks a child that renders nothing.
    pub(crate) children: Vec<Option<NodeId>>,
    /// Native node; always `None` for components.
    pub(crate) target: Option<TargetNode>,
    /// Hook storage; `Some` for components, except while their render
    /// function is running.
    pub(crate) hooks: Option<HookStore>,
    pub(crate) mounted: bool,
}

impl RenderNode {
    pub(crate) fn new(element: Element, parent: Option<NodeId>) -> Self {
        let hooks = matches!(element, Element::Component(_)).then(HookStore::default);
        Self {
            element,
            parent,
            children: Vec::new(),
            target: None,
            hooks,
            mounted: false,
        }
    }

    pub(crate) fn is_component(&self) -> bool {
        matches!(self.element, Element::Component(_))
    }
}

/// Arena of render nodes plus the synthetic root.
#[derive(Default)]
pub(crate) struct Tree {
    nodes: HashMap<NodeId, RenderNode>,
    root: Option<NodeId>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, node: RenderNode) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, node);
        id
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<RenderNode> {
        self.nodes.remove(&id)
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&RenderNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::internal(format!("dangling render node {id}")))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut RenderNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::internal(format!("dangling render node {id}")))
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: Option<NodeId>) {
        self.root = root;
    }

    /// Effect slot `slot` of component `id`, if both still exist.
    pub(crate) fn effect_slot_mut(&mut self, id: NodeId, slot: usize) -> Option<&mut EffectSlot> {
        self.nodes.get_mut(&id)?.hooks.as_mut()?.effect_mut(slot)
    }

    /// Store `child` in `parent`'s slot `index`, growing the slot list.
    pub(crate) fn set_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: Option<NodeId>,
    ) -> Result<()> {
        let children = &mut self.get_mut(parent)?.children;
        if children.len() <= index {
            children.resize(index + 1, None);
        }
        children[index] = child;
        Ok(())
    }

    /// Target of the closest ancestor that owns one.
    pub(crate) fn nearest_target_ancestor(&self, id: NodeId) -> Result<TargetNode> {
        let mut current = self.get(id)?.parent;
        while let Some(ancestor) = current {
            let node = self.get(ancestor)?;
            if let Some(target) = node.target {
                return Ok(target);
            }
            current = node.parent;
        }
        Err(Error::internal(format!("render node {id} has no ancestor with a target")))
    }

    /// First mounted target at or below `id`, in document order.
    ///
    /// A node with a target answers for its whole subtree.
    fn first_mounted_target(&self, id: NodeId) -> Option<TargetNode> {
        let node = self.nodes.get(&id)?;
        match node.target {
            Some(target) => node.mounted.then_some(target),
            None => node
                .children
                .iter()
                .flatten()
                .find_map(|child| self.first_mounted_target(*child)),
        }
    }

    /// Index of `id` in its parent's child slots.
    fn position(&self, id: NodeId, parent_id: NodeId) -> Result<usize> {
        self.get(parent_id)?
            .children
            .iter()
            .position(|slot| *slot == Some(id))
            .ok_or_else(|| {
                Error::internal(format!("render node {id} missing from parent {parent_id}"))
            })
    }

    /// The mounted target that `id`'s target must be inserted before.
    /// `None` means append.
    pub(crate) fn next_sibling_target(&self, id: NodeId) -> Result<Option<TargetNode>> {
        match self.get(id)?.parent {
            Some(parent) => self.insertion_point(parent, self.position(id, parent)?),
            None => Ok(None),
        }
    }

    /// The mounted target that a node in slot `index` of `parent` must be
    /// inserted before.
    ///
    /// Looks at following siblings, walking out through component
    /// ancestors until one owns a target. `None` means append.
    pub(crate) fn insertion_point(
        &self,
        parent: NodeId,
        index: usize,
    ) -> Result<Option<TargetNode>> {
        let (mut parent_id, mut index) = (parent, index);
        loop {
            let parent = self.get(parent_id)?;
            let following = parent
                .children
                .iter()
                .skip(index + 1)
                .flatten()
                .find_map(|sibling| self.first_mounted_target(*sibling));
            if following.is_some() || parent.target.is_some() {
                return Ok(following);
            }
            let Some(grandparent) = parent.parent else {
                return Ok(None);
            };
            index = self.position(parent_id, grandparent)?;
            parent_id = grandparent;
        }
    }
}
