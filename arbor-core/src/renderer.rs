//! Render Entry Point
//!
//! [`Renderer`] owns the render-node tree, the effect queue and the render
//! target. It bootstraps the root, runs every render pass, and drives
//! deferred effects.
//!
//! # Passes and re-entrancy
//!
//! A pass holds the tree exclusively. A state setter that fires while a
//! pass is running (from a render function or an unmount cleanup) stores
//! its value and queues the owning instance; queued instances re-render at
//! the end of the same pass. Setters that fire outside a pass (event
//! handlers, effects) start a pass of their own.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::RendererConfig;
use crate::element::{host, normalize_children, Element, Props};
use crate::error::{Error, Result};
use crate::reconcile::Pass;
use crate::scheduler::{EffectQueue, EffectTask};
use crate::target::{RenderTarget, TargetNode};
use crate::tree::{NodeId, Tree};

/// Shared engine state. Setters hold a weak handle to it.
pub(crate) struct Runtime {
    tree: RefCell<Tree>,
    effects: RefCell<EffectQueue>,
    pending: RefCell<VecDeque<NodeId>>,
    target: Rc<dyn RenderTarget>,
    config: RendererConfig,
    this: Weak<Runtime>,
}

impl Runtime {
    /// Run `work` as one render pass, then drain re-renders queued during
    /// it.
    fn pass<R>(&self, work: impl FnOnce(&mut Pass<'_>) -> Result<R>) -> Result<R> {
        let mut tree = self
            .tree
            .try_borrow_mut()
            .map_err(|_| Error::internal("render pass started inside another pass"))?;
        let mut effects = self
            .effects
            .try_borrow_mut()
            .map_err(|_| Error::internal("effect queue busy at pass start"))?;
        let mut pass = Pass::new(
            &mut tree,
            &*self.target,
            &mut effects,
            &self.this,
            self.config.effect_delay(),
        );

        let result = work(&mut pass).and_then(|out| {
            self.drain_pending(&mut pass)?;
            Ok(out)
        });
        if result.is_err() {
            self.pending.borrow_mut().clear();
        }
        result
    }

    fn drain_pending(&self, pass: &mut Pass<'_>) -> Result<()> {
        let limit = self.config.max_update_rounds;
        let mut rounds = 0;
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(id) = next else {
                return Ok(());
            };
            rounds += 1;
            if rounds > limit {
                warn!(limit, "re-renders did not settle");
                return Err(Error::UpdateLoop(limit));
            }
            pass.rerender_live(id)?;
        }
    }

    /// Re-render `id` now, or after the running pass.
    pub(crate) fn request_rerender(&self, id: NodeId) -> Result<()> {
        if self.tree.try_borrow_mut().is_err() {
            let mut pending = self.pending.borrow_mut();
            if !pending.contains(&id) {
                trace!(node = %id, "re-render deferred until the pass ends");
                pending.push_back(id);
            }
            return Ok(());
        }
        self.pass(|pass| pass.rerender_live(id))
    }

    /// Run one effect task. Returns whether it ran or was stale.
    fn run_effect(&self, task: EffectTask) -> Result<bool> {
        let (cleanup, callback) = {
            let mut tree = self
                .tree
                .try_borrow_mut()
                .map_err(|_| Error::internal("effect ran inside a render pass"))?;
            let Some(slot) = tree.effect_slot_mut(task.node, task.slot) else {
                trace!(node = %task.node, slot = task.slot, "stale effect: instance gone");
                return Ok(false);
            };
            if slot.epoch != task.epoch {
                trace!(
                    node = %task.node,
                    slot = task.slot,
                    epoch = task.epoch,
                    current = slot.epoch,
                    "stale effect skipped"
                );
                return Ok(false);
            }
            (slot.cleanup.take(), Rc::clone(&slot.callback))
        };

        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
        let Some(next) = callback() else {
            return Ok(true);
        };

        let orphaned = {
            let mut tree = self
                .tree
                .try_borrow_mut()
                .map_err(|_| Error::internal("effect returned inside a render pass"))?;
            match tree.effect_slot_mut(task.node, task.slot) {
                Some(slot) => {
                    slot.cleanup = Some(next);
                    None
                }
                None => Some(next),
            }
        };
        if let Some(cleanup) = orphaned {
            trace!(node = %task.node, "instance unmounted during its effect, cleaning up");
            cleanup.run();
        }
        Ok(true)
    }

    fn pop_task(&self, now: Option<Instant>) -> Option<EffectTask> {
        let mut effects = self.effects.borrow_mut();
        match now {
            Some(now) => effects.pop_due(now),
            None => effects.pop_front(),
        }
    }

    fn queued(&self) -> usize {
        self.effects.borrow().len()
    }
}

/// The engine's public entry point.
///
/// A renderer manages exactly one root. Cloning is not supported; share it
/// behind an `Rc` if several handlers need it.
pub struct Renderer {
    runtime: Rc<Runtime>,
}

impl Renderer {
    pub fn new(target: Rc<dyn RenderTarget>) -> Self {
        Self::with_config(target, RendererConfig::default())
    }

    pub fn with_config(target: Rc<dyn RenderTarget>, config: RendererConfig) -> Self {
        let runtime = Rc::new_cyclic(|this| Runtime {
            tree: RefCell::new(Tree::new()),
            effects: RefCell::new(EffectQueue::new()),
            pending: RefCell::new(VecDeque::new()),
            target,
            config,
            this: this.clone(),
        });
        Self { runtime }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.runtime.config
    }

    /// Mount `element` under the existing native node `root`.
    ///
    /// The root is wrapped in a synthetic host instance whose tag is taken
    /// from the target; its props are never touched. Fails with
    /// [`Error::AlreadyMounted`] if this renderer already has a root.
    pub fn render(&self, element: Element, root: TargetNode) -> Result<()> {
        let tag = self
            .runtime
            .target
            .tag_name(root)
            .ok_or_else(|| {
                Error::InvalidDescription(format!("root target {root} is not an element"))
            })?
            .to_ascii_lowercase();
        let wrapper = host(tag, Props::new(), vec![element.into()]);

        self.runtime.pass(|pass| {
            if pass.tree.root().is_some() {
                return Err(Error::AlreadyMounted);
            }
            let id = pass.instantiate(wrapper, None, Some(root))?;
            pass.tree.set_root(Some(id));
            debug!(node = %id, target = %root, "mounting root");
            pass.mount(id)
        })
    }

    /// Reconcile the mounted root against a new description.
    pub fn update_root(&self, element: Element) -> Result<()> {
        self.runtime.pass(|pass| {
            let root = pass.tree.root().ok_or(Error::NotMounted)?;
            debug!(node = %root, "updating root");
            pass.reconcile_children(root, normalize_children(&[element.into()]))
        })
    }

    /// Unmount everything below the root target, running all cleanups.
    /// The root target itself stays in place and can be rendered into
    /// again.
    pub fn unmount_root(&self) -> Result<()> {
        self.runtime.pass(|pass| {
            let root = pass.tree.root().ok_or(Error::NotMounted)?;
            debug!(node = %root, "unmounting root");
            pass.reconcile_children(root, Vec::new())?;
            pass.tree.remove(root);
            pass.tree.set_root(None);
            Ok(())
        })
    }

    /// Run every queued effect now, including effects queued by those runs.
    /// Returns how many ran (stale tasks are not counted).
    pub fn flush_effects(&self) -> Result<usize> {
        let limit = self.runtime.config.max_update_rounds;
        let mut ran = 0;
        let mut rounds = 0;
        loop {
            let batch = self.runtime.queued();
            if batch == 0 {
                return Ok(ran);
            }
            rounds += 1;
            if rounds > limit {
                warn!(limit, "effects kept scheduling further effects");
                return Err(Error::UpdateLoop(limit));
            }
            for _ in 0..batch {
                let Some(task) = self.runtime.pop_task(None) else {
                    break;
                };
                if self.runtime.run_effect(task)? {
                    ran += 1;
                }
            }
        }
    }

    /// Run the effects that are due at `now`. Effects they schedule wait for
    /// a later call.
    pub fn run_due(&self, now: Instant) -> Result<usize> {
        let mut ran = 0;
        for _ in 0..self.runtime.queued() {
            let Some(task) = self.runtime.pop_task(Some(now)) else {
                break;
            };
            if self.runtime.run_effect(task)? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Sleep on the tokio clock until the effect queue is empty.
    pub async fn settle(&self) -> Result<()> {
        let limit = self.runtime.config.max_update_rounds;
        let mut rounds = 0;
        loop {
            let next = self.runtime.effects.borrow().next_due();
            let Some(due) = next else {
                return Ok(());
            };
            rounds += 1;
            if rounds > limit {
                return Err(Error::UpdateLoop(limit));
            }
            tokio::time::sleep_until(due).await;
            self.run_due(Instant::now())?;
        }
    }

    /// Number of queued effect tasks, stale ones included.
    pub fn pending_effects(&self) -> usize {
        self.runtime.queued()
    }

    /// Number of live render nodes, including the synthetic root.
    pub fn node_count(&self) -> usize {
        self.runtime.tree.borrow().len()
    }

    /// The native node the root was rendered into.
    pub fn root_target(&self) -> Option<TargetNode> {
        let tree = self.runtime.tree.borrow();
        tree.root()
            .and_then(|root| tree.get(root).ok())
            .and_then(|node| node.target)
    }
}
