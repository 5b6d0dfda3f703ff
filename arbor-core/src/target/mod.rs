//! Render Targets
//!
//! A render target is the native tree the engine projects into: a browser
//! document, a widget toolkit, or the in-memory [`MemoryDocument`] used by
//! tests. The engine only talks to it through [`RenderTarget`], addressing
//! native nodes by copyable [`TargetNode`] handles.
//!
//! All methods take `&self`. Implementations use interior mutability so that
//! event dispatch (which calls back into the engine) never overlaps a
//! mutable borrow of the target.

mod memory;
mod projection;

pub use memory::MemoryDocument;
pub use projection::{attribute_name, event_name};
pub(crate) use projection::apply_props;

use std::fmt;
use std::rc::Rc;

use crate::error::Result;

/// Handle to a native node owned by a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetNode(u64);

impl TargetNode {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A native event delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Lower-case event name, e.g. `click` or `keyup`.
    pub kind: String,
    pub target: TargetNode,
    /// The target's current value (form controls).
    pub value: String,
    /// The key involved, for keyboard events.
    pub key: Option<String>,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: TargetNode) -> Self {
        Self {
            kind: kind.into(),
            target,
            value: String::new(),
            key: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A shared event listener, compared by identity.
///
/// Handlers return the result of the render pass they trigger, so errors
/// reach the code that dispatched the event.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event) -> Result<()>>);

impl EventHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Event) -> Result<()> + 'static,
    {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) -> Result<()> {
        (self.0)(event)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0))
    }
}

/// The native tree the engine renders into.
pub trait RenderTarget {
    fn create_element(&self, tag: &str) -> TargetNode;

    fn create_text(&self, text: &str) -> TargetNode;

    /// Tag of an element node; `None` for text nodes and unknown handles.
    fn tag_name(&self, node: TargetNode) -> Option<String>;

    fn set_text(&self, node: TargetNode, text: &str);

    fn set_attribute(&self, node: TargetNode, name: &str, value: &str);

    fn remove_attribute(&self, node: TargetNode, name: &str);

    fn set_class_name(&self, node: TargetNode, class_name: &str);

    fn add_listener(&self, node: TargetNode, event: &str, handler: EventHandler);

    fn remove_listener(&self, node: TargetNode, event: &str, handler: &EventHandler);

    /// Insert `child` under `parent` before `before`, or append when `before`
    /// is `None`. A child that already has a parent is moved.
    fn insert_before(
        &self,
        parent: TargetNode,
        child: TargetNode,
        before: Option<TargetNode>,
    ) -> Result<()>;

    fn remove_child(&self, parent: TargetNode, child: TargetNode) -> Result<()>;

    /// Drop `node` and everything below it. The engine calls this once a
    /// subtree has left the tree for good and never uses the handles again.
    fn release(&self, _node: TargetNode) {}
}
