//! Hooks
//!
//! Hooks give a component function state and side effects that persist
//! across render passes. Slots are correlated by call order: the n-th
//! `use_state` call of a pass always addresses the n-th state slot of the
//! instance, so a component must call its hooks the same number of times
//! and in the same order on every pass.
//!
//! # Render-pass context
//!
//! There is no ambient "current component". The engine passes a
//! [`HookContext`] into every render function; it carries the active
//! instance and two cursors (next state slot, next effect slot). A context
//! with no instance ([`HookContext::inert`]) answers every hook with inert
//! defaults.
//!
//! # State
//!
//! Each state slot is a shared cell. A [`StateSetter`] holds a weak handle
//! to its cell, so setters stay valid across passes, compare equal for the
//! same slot, and quietly do nothing once the instance is unmounted.
//!
//! # Effects
//!
//! Effects never run during a render pass. The first call records the
//! effect; mounting schedules it. Later calls schedule a re-run when the
//! dependency list is absent or differs from the previous snapshot. Every
//! scheduled run bumps the slot's epoch, and the scheduler drops tasks whose
//! epoch is no longer current.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use crate::element::Value;
use crate::error::{Error, Result};
use crate::renderer::Runtime;
use crate::tree::NodeId;

/// Dependency snapshot of an effect.
pub type Deps = SmallVec<[Value; 4]>;

/// Build an effect dependency list: `deps![a, b]`, or `deps![]` to run once.
#[macro_export]
macro_rules! deps {
    () => {
        ::core::option::Option::Some($crate::Deps::new())
    };
    ($($dep:expr),+ $(,)?) => {{
        let mut deps = $crate::Deps::new();
        $(deps.push($crate::Value::from($dep));)+
        ::core::option::Option::Some(deps)
    }};
}

/// Teardown returned by an effect callback.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(cleanup))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

pub(crate) type EffectFn = Rc<dyn Fn() -> Option<Cleanup>>;

/// One effect call site of a component instance.
pub(crate) struct EffectSlot {
    pub(crate) callback: EffectFn,
    pub(crate) deps: Option<Deps>,
    pub(crate) cleanup: Option<Cleanup>,
    pub(crate) epoch: u64,
}

impl EffectSlot {
    fn new(callback: EffectFn, deps: Option<Deps>) -> Self {
        Self {
            callback,
            deps,
            cleanup: None,
            epoch: 0,
        }
    }

    /// Mark a new run as due, returning its epoch.
    fn bump(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }
}

/// Hook slots of one component instance.
#[derive(Default)]
pub(crate) struct HookStore {
    states: Vec<Rc<dyn Any>>,
    effects: Vec<EffectSlot>,
    /// Slot counts after the first completed pass.
    baseline: Option<(usize, usize)>,
}

impl HookStore {
    pub(crate) fn effect_mut(&mut self, slot: usize) -> Option<&mut EffectSlot> {
        self.effects.get_mut(slot)
    }

    #[cfg(test)]
    pub(crate) fn state_count(&self) -> usize {
        self.states.len()
    }

    #[cfg(test)]
    pub(crate) fn effect_count(&self) -> usize {
        self.effects.len()
    }

    /// Schedule every effect slot, as on mount. Returns `(slot, epoch)`
    /// pairs.
    pub(crate) fn schedule_all(&mut self) -> Vec<(usize, u64)> {
        self.effects
            .iter_mut()
            .enumerate()
            .map(|(index, slot)| (index, slot.bump()))
            .collect()
    }

    /// Take every pending cleanup, in slot order. Bumps epochs so that
    /// already scheduled runs are dropped.
    pub(crate) fn take_cleanups(&mut self) -> Vec<Cleanup> {
        self.effects
            .iter_mut()
            .filter_map(|slot| {
                slot.bump();
                slot.cleanup.take()
            })
            .collect()
    }
}

struct ActiveInstance<'a> {
    node: NodeId,
    store: &'a mut HookStore,
    runtime: Weak<Runtime>,
    due: Vec<(usize, u64)>,
    violation: Option<String>,
}

/// The render-pass context handed to every component render function.
pub struct HookContext<'a> {
    instance: Option<ActiveInstance<'a>>,
    state_cursor: usize,
    effect_cursor: usize,
}

impl<'a> HookContext<'a> {
    /// A context with no active instance: hooks return inert defaults.
    pub fn inert() -> Self {
        Self {
            instance: None,
            state_cursor: 0,
            effect_cursor: 0,
        }
    }

    pub(crate) fn for_instance(
        node: NodeId,
        store: &'a mut HookStore,
        runtime: Weak<Runtime>,
    ) -> Self {
        Self {
            instance: Some(ActiveInstance {
                node,
                store,
                runtime,
                due: Vec::new(),
                violation: None,
            }),
            state_cursor: 0,
            effect_cursor: 0,
        }
    }

    /// The instance being rendered, if any.
    pub fn node(&self) -> Option<NodeId> {
        self.instance.as_ref().map(|i| i.node)
    }

    /// State slot at the current call index.
    ///
    /// Creates the slot with `initial` on the first pass; afterwards returns
    /// the stored value and `initial` is ignored.
    pub fn use_state<T>(&mut self, initial: T) -> (T, StateSetter<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        let index = self.state_cursor;
        self.state_cursor += 1;

        let Some(instance) = self.instance.as_mut() else {
            return (initial, StateSetter::inert());
        };

        if index == instance.store.states.len() {
            let cell: Rc<dyn Any> = Rc::new(RefCell::new(initial.clone()));
            instance.store.states.push(cell);
        }

        match Rc::clone(&instance.store.states[index]).downcast::<RefCell<T>>() {
            Ok(cell) => {
                let value = cell.borrow().clone();
                let setter = StateSetter {
                    cell: Rc::downgrade(&cell),
                    node: Some(instance.node),
                    runtime: instance.runtime.clone(),
                };
                (value, setter)
            }
            Err(_) => {
                instance.violation.get_or_insert_with(|| {
                    format!(
                        "state slot {index} was read as `{}` but holds another type",
                        type_name::<T>()
                    )
                });
                (initial, StateSetter::inert())
            }
        }
    }

    /// Effect at the current call index.
    ///
    /// `deps: None` re-runs after every pass; `Some(list)` re-runs only when
    /// an element differs (by strict equality) from the previous pass;
    /// `deps![]` runs once after mount. The callback may return a
    /// [`Cleanup`], run before the next run and at unmount.
    pub fn use_effect<F>(&mut self, deps: Option<Deps>, callback: F)
    where
        F: Fn() -> Option<Cleanup> + 'static,
    {
        let index = self.effect_cursor;
        self.effect_cursor += 1;

        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        let callback: EffectFn = Rc::new(callback);

        match instance.store.effects.get_mut(index) {
            None => instance.store.effects.push(EffectSlot::new(callback, deps)),
            Some(slot) => {
                let changed = match (&deps, &slot.deps) {
                    (Some(next), Some(previous)) => next != previous,
                    _ => true,
                };
                if changed {
                    slot.callback = callback;
                    slot.deps = deps;
                    let epoch = slot.bump();
                    trace!(node = %instance.node, slot = index, epoch, "effect due");
                    instance.due.push((index, epoch));
                }
            }
        }
    }

    /// Close the pass: validate hook usage and return the effect runs it
    /// made due.
    pub(crate) fn finish(self) -> Result<Vec<(usize, u64)>> {
        let Some(instance) = self.instance else {
            return Ok(Vec::new());
        };

        let mut violation = instance.violation;
        if let Some((states, effects)) = instance.store.baseline {
            if violation.is_none() && self.state_cursor != states {
                let got = self.state_cursor;
                violation = Some(format!("expected {states} state hooks, got {got}"));
            }
            if violation.is_none() && self.effect_cursor != effects {
                let got = self.effect_cursor;
                violation = Some(format!("expected {effects} effect hooks, got {got}"));
            }
        }
        if let Some(detail) = violation {
            return Err(Error::HookOrder {
                node: instance.node,
                detail,
            });
        }

        instance.store.baseline.get_or_insert((self.state_cursor, self.effect_cursor));
        Ok(instance.due)
    }
}

/// Setter for one state slot.
///
/// `set` and `update` store the new value and re-render the owning instance
/// when it differs from the current one. A setter whose instance has been
/// unmounted, or that came from an inert context, does nothing.
pub struct StateSetter<T> {
    cell: Weak<RefCell<T>>,
    node: Option<NodeId>,
    runtime: Weak<Runtime>,
}

impl<T> StateSetter<T> {
    fn inert() -> Self {
        Self {
            cell: Weak::new(),
            node: None,
            runtime: Weak::new(),
        }
    }

    /// Whether the owning instance is still alive.
    pub fn is_live(&self) -> bool {
        self.cell.strong_count() > 0
    }
}

impl<T: Clone> StateSetter<T> {
    /// Current slot value, if the instance is still alive.
    pub fn get(&self) -> Option<T> {
        self.cell.upgrade().map(|cell| cell.borrow().clone())
    }
}

impl<T: PartialEq + 'static> StateSetter<T> {
    pub fn set(&self, value: T) -> Result<()> {
        self.apply(|_| value)
    }

    /// Compute the new value from the current one.
    pub fn update<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.apply(updater)
    }

    fn apply<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let Some(cell) = self.cell.upgrade() else {
            trace!(node = ?self.node, "setter for an unmounted instance ignored");
            return Ok(());
        };

        let next = {
            let current = cell.borrow();
            let next = updater(&*current);
            if *current == next {
                return Ok(());
            }
            next
        };
        *cell.borrow_mut() = next;

        match (self.node, self.runtime.upgrade()) {
            (Some(node), Some(runtime)) => runtime.request_rerender(node),
            _ => Ok(()),
        }
    }
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            node: self.node,
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> PartialEq for StateSetter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.ptr_eq(&other.cell)
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("node", &self.node)
            .field("live", &self.is_live())
            .finish()
    }
}
