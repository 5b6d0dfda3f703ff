//! Reconciliation Engine
//!
//! Brings a live render-node subtree in line with a freshly computed
//! description and mutates the render target as little as possible.
//!
//! # Lifecycle
//!
//! - **instantiate** builds render nodes (and their targets) for a
//!   description, invoking component render functions on the way. Nothing
//!   is attached to the render target yet.
//! - **mount** attaches targets top-down and schedules each component's
//!   effects.
//! - **unmount** runs effect cleanups top-down, detaches and releases the
//!   outermost targets and drops the nodes (and with them all hook
//!   storage).
//!
//! # Matching
//!
//! Children are matched by position only. An old node is patched in place
//! when the new description has the same kind (equal tag, or the same render
//! function); otherwise it is unmounted and the new description is mounted
//! in the same slot. A description is only instantiated when no compatible
//! old node exists, so a matching component renders once per pass.

use std::rc::Weak;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::element::{normalize_children, Child, Element};
use crate::error::{Error, Result};
use crate::hooks::HookContext;
use crate::renderer::Runtime;
use crate::scheduler::{EffectQueue, EffectTask};
use crate::target::{apply_props, RenderTarget, TargetNode};
use crate::tree::{NodeId, RenderNode, Tree};

/// How an old node relates to the description replacing it.
enum PatchKind {
    Text { changed: bool },
    Host,
    Component,
    Replace,
}

/// Native parent plus the sibling to insert before (`None` appends).
type Place = (TargetNode, Option<TargetNode>);

/// Everything one synchronous render pass works on.
pub(crate) struct Pass<'a> {
    pub(crate) tree: &'a mut Tree,
    target: &'a dyn RenderTarget,
    effects: &'a mut EffectQueue,
    runtime: &'a Weak<Runtime>,
    effect_delay: Duration,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(
        tree: &'a mut Tree,
        target: &'a dyn RenderTarget,
        effects: &'a mut EffectQueue,
        runtime: &'a Weak<Runtime>,
        effect_delay: Duration,
    ) -> Self {
        Self {
            tree,
            target,
            effects,
            runtime,
            effect_delay,
        }
    }

    /// Build the render node subtree for `element`.
    ///
    /// `target` is only supplied for the synthetic root; its props are left
    /// untouched. On failure every node created here is discarded again.
    pub(crate) fn instantiate(
        &mut self,
        element: Element,
        parent: Option<NodeId>,
        target: Option<TargetNode>,
    ) -> Result<NodeId> {
        let (native, children) = match &element {
            Element::Text(text) => (Some(self.target.create_text(text)), Vec::new()),
            Element::Host(host) => {
                if host.tag.is_empty() {
                    return Err(Error::InvalidDescription("host element with an empty tag".into()));
                }
                let native = match target {
                    Some(native) => native,
                    None => {
                        let native = self.target.create_element(&host.tag);
                        apply_props(self.target, native, None, &host.props);
                        native
                    }
                };
                (Some(native), normalize_children(host.props.children()))
            }
            Element::Component(_) => (None, Vec::new()),
        };

        let mut node = RenderNode::new(element, parent);
        node.target = native;
        let is_component = node.is_component();
        let id = self.tree.insert(node);
        trace!(node = %id, parent = ?parent, "instantiated");

        let built = if is_component {
            self.render_component(id)
                .and_then(|children| self.instantiate_children(id, children))
        } else {
            self.instantiate_children(id, children)
        };
        if let Err(err) = built {
            self.discard(id);
            return Err(err);
        }
        Ok(id)
    }

    fn instantiate_children(&mut self, id: NodeId, children: Vec<Option<Element>>) -> Result<()> {
        for child in children {
            let child_id = match child {
                Some(element) => Some(self.instantiate(element, Some(id), None)?),
                None => None,
            };
            self.tree.get_mut(id)?.children.push(child_id);
        }
        Ok(())
    }

    /// Drop a subtree that was never mounted.
    fn discard(&mut self, id: NodeId) {
        if let Some(node) = self.tree.remove(id) {
            // a parentless node wraps the caller's root target
            if let (Some(native), Some(_)) = (node.target, node.parent) {
                self.target.release(native);
            }
            for child in node.children.into_iter().flatten() {
                self.discard(child);
            }
        }
    }

    /// Run component `id`'s render function against its hook storage and
    /// return the normalized output.
    fn render_component(&mut self, id: NodeId) -> Result<Vec<Option<Element>>> {
        let node = self.tree.get_mut(id)?;
        let (render, props) = match &node.element {
            Element::Component(component) => (component.render, component.props.clone()),
            other => {
                let kind = other.kind_name();
                return Err(Error::internal(format!(
                    "render node {id} is a {kind} element, not a component"
                )));
            }
        };
        let mut store = node
            .hooks
            .take()
            .ok_or_else(|| Error::internal(format!("component {id} re-entered its own render")))?;

        let mut cx = HookContext::for_instance(id, &mut store, self.runtime.clone());
        let output = render(&mut cx, &props);
        let finished = cx.finish();
        self.tree.get_mut(id)?.hooks = Some(store);

        for (slot, epoch) in finished? {
            self.schedule_effect(id, slot, epoch);
        }
        trace!(node = %id, "rendered component");
        Ok(normalize_children(std::slice::from_ref::<Child>(&output)))
    }

    /// Attach `id`'s subtree to the render target and schedule effects.
    pub(crate) fn mount(&mut self, id: NodeId) -> Result<()> {
        let place = match self.tree.get(id)?.parent {
            Some(_) => Some((
                self.tree.nearest_target_ancestor(id)?,
                self.tree.next_sibling_target(id)?,
            )),
            None => None,
        };
        self.mount_at(id, place)
    }

    /// Mount `id` into native `(parent, before)`.
    ///
    /// Only the subtree root needs a sibling lookup: descendants of a fresh
    /// target are appended to it, and the children of a component share
    /// the component's insertion point.
    fn mount_at(&mut self, id: NodeId, place: Option<Place>) -> Result<()> {
        let native = self.tree.get(id)?.target;
        if let (Some(native), Some((parent, before))) = (native, place) {
            self.target.insert_before(parent, native, before)?;
        }

        let node = self.tree.get_mut(id)?;
        node.mounted = true;
        let children = node.children.clone();
        let runs = node
            .hooks
            .as_mut()
            .map(|hooks| hooks.schedule_all())
            .unwrap_or_default();
        for (slot, epoch) in runs {
            self.schedule_effect(id, slot, epoch);
        }

        let inner = match native {
            Some(native) => Some((native, None)),
            None => place,
        };
        for child in children.into_iter().flatten() {
            self.mount_at(child, inner)?;
        }
        Ok(())
    }

    /// Tear down `id`'s subtree.
    ///
    /// Cleanups run top-down before anything is detached. With `detach`, the
    /// outermost targets are removed from their native parents and released;
    /// targets below them leave together with their ancestor.
    pub(crate) fn unmount(&mut self, id: NodeId, detach: bool) -> Result<()> {
        let cleanups = self
            .tree
            .get_mut(id)?
            .hooks
            .as_mut()
            .map(|hooks| hooks.take_cleanups())
            .unwrap_or_default();
        if !cleanups.is_empty() {
            trace!(node = %id, count = cleanups.len(), "running cleanups");
        }
        for cleanup in cleanups {
            cleanup.run();
        }

        let node = self.tree.get(id)?;
        let (native, mounted, children) = (node.target, node.mounted, node.children.clone());
        let mut detach_children = detach;
        if let Some(native) = native {
            if detach && mounted {
                let parent = self.tree.nearest_target_ancestor(id)?;
                self.target.remove_child(parent, native)?;
            }
            if detach {
                self.target.release(native);
            }
            detach_children = false;
        }

        for child in children.into_iter().flatten() {
            self.unmount(child, detach_children)?;
        }
        self.tree.remove(id);
        Ok(())
    }

    /// Reconcile slot `index` of `parent`: `old` is the node currently in
    /// the slot, `next` the description that should be there.
    pub(crate) fn reconcile(
        &mut self,
        parent: NodeId,
        index: usize,
        old: Option<NodeId>,
        next: Option<Element>,
    ) -> Result<()> {
        match (old, next) {
            (None, None) => Ok(()),
            (None, Some(element)) => self.create(parent, index, element),
            (Some(old), None) => self.remove(parent, index, old),
            (Some(old), Some(element)) => self.patch(parent, index, old, element),
        }
    }

    fn create(&mut self, parent: NodeId, index: usize, element: Element) -> Result<()> {
        let id = self.instantiate(element, Some(parent), None)?;
        self.tree.set_child(parent, index, Some(id))?;
        debug!(node = %id, %parent, index, "mounting");
        let place = (
            self.tree.nearest_target_ancestor(id)?,
            self.tree.insertion_point(parent, index)?,
        );
        self.mount_at(id, Some(place))
    }

    fn remove(&mut self, parent: NodeId, index: usize, old: NodeId) -> Result<()> {
        debug!(node = %old, %parent, index, "unmounting");
        self.tree.set_child(parent, index, None)?;
        self.unmount(old, true)
    }

    fn patch(&mut self, parent: NodeId, index: usize, id: NodeId, next: Element) -> Result<()> {
        let kind = match (&self.tree.get(id)?.element, &next) {
            (Element::Text(old), Element::Text(new)) => PatchKind::Text { changed: old != new },
            (Element::Host(old), Element::Host(new)) if old.tag == new.tag => PatchKind::Host,
            (Element::Component(old), Element::Component(new)) if old.same_component(new) => {
                PatchKind::Component
            }
            _ => PatchKind::Replace,
        };

        match kind {
            PatchKind::Text { changed } => {
                let node = self.tree.get_mut(id)?;
                node.element = next;
                if changed {
                    let native = node
                        .target
                        .ok_or_else(|| Error::internal(format!("text node {id} has no target")))?;
                    if let Element::Text(text) = &node.element {
                        trace!(node = %id, "patching text");
                        self.target.set_text(native, text);
                    }
                }
                Ok(())
            }
            PatchKind::Host => {
                let node = self.tree.get_mut(id)?;
                let previous = std::mem::replace(&mut node.element, next);
                let native = node
                    .target
                    .ok_or_else(|| Error::internal(format!("host node {id} has no target")))?;
                let children = match (&previous, &node.element) {
                    (Element::Host(old), Element::Host(new)) => {
                        apply_props(self.target, native, Some(&old.props), &new.props);
                        normalize_children(new.props.children())
                    }
                    _ => {
                        return Err(Error::internal(format!(
                            "host node {id} changed kind during patch"
                        )))
                    }
                };
                self.reconcile_children(id, children)
            }
            PatchKind::Component => {
                self.tree.get_mut(id)?.element = next;
                self.rerender(id)
            }
            PatchKind::Replace => {
                debug!(node = %id, to = next.kind_name(), "replacing");
                self.remove(parent, index, id)?;
                self.create(parent, index, next)
            }
        }
    }

    /// Reconcile `id`'s child slots against `next`, pairwise by index.
    /// Slots beyond the new length are unmounted and dropped.
    pub(crate) fn reconcile_children(
        &mut self,
        id: NodeId,
        next: Vec<Option<Element>>,
    ) -> Result<()> {
        let old = self.tree.get(id)?.children.clone();
        let len = next.len();
        let mut next = next.into_iter();
        for index in 0..old.len().max(len) {
            let previous = old.get(index).copied().flatten();
            let element = next.next().flatten();
            self.reconcile(id, index, previous, element)?;
        }
        self.tree.get_mut(id)?.children.truncate(len);
        Ok(())
    }

    /// Re-run component `id` with its stored props and diff its output.
    pub(crate) fn rerender(&mut self, id: NodeId) -> Result<()> {
        debug!(node = %id, "re-rendering");
        let children = self.render_component(id)?;
        self.reconcile_children(id, children)
    }

    /// Re-render `id` if it is still part of the tree.
    pub(crate) fn rerender_live(&mut self, id: NodeId) -> Result<()> {
        match self.tree.get(id) {
            Ok(node) if node.is_component() && node.mounted => self.rerender(id),
            Ok(_) => Err(Error::internal(format!("re-render requested for non-component {id}"))),
            Err(_) => {
                trace!(node = %id, "re-render for an unmounted instance skipped");
                Ok(())
            }
        }
    }

    fn schedule_effect(&mut self, node: NodeId, slot: usize, epoch: u64) {
        let due = Instant::now() + self.effect_delay;
        trace!(%node, slot, epoch, "effect scheduled");
        self.effects.push(EffectTask { node, slot, epoch, due });
    }
}
