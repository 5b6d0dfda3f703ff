//! Arbor Core
//!
//! This crate provides the core runtime for the Arbor component rendering
//! engine. It implements:
//!
//! - An immutable element description model (text, host tags, components)
//! - A live render-node tree paired with a native render target
//! - Call-order indexed hooks (`use_state`, `use_effect`)
//! - Positional diff/patch reconciliation
//! - A deferred, epoch-tagged effect scheduler
//!
//! Everything runs on a single thread. A render pass is fully synchronous;
//! only effect callbacks are deferred until after the pass has returned.
//!
//! # Architecture
//!
//! - `element`: element descriptions, property values and children
//! - `hooks`: the render-pass context and hook slot storage
//! - `tree`: the render-node arena
//! - `reconcile`: instantiate / mount / unmount / patch
//! - `scheduler`: the deferred effect queue
//! - `renderer`: the public entry point
//! - `target`: the render-target trait and an in-memory document
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use arbor_core::{component, host, Child, HookContext, MemoryDocument, Props, Renderer};
//!
//! fn counter(cx: &mut HookContext<'_>, _props: &Props) -> Child {
//!     let (count, set_count) = cx.use_state(0_i64);
//!     host(
//!         "button",
//!         Props::new().on("onClick", move |_| set_count.update(|c| c + 1)),
//!         vec![count.into()],
//!     )
//!     .into()
//! }
//!
//! let document = MemoryDocument::new();
//! let root = document.create_root("main");
//! let renderer = Renderer::new(Rc::new(document.clone()));
//! renderer.render(component(counter, Props::new(), vec![]), root)?;
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod hooks;
mod reconcile;
pub mod renderer;
mod scheduler;
pub mod target;
mod tree;

pub use config::RendererConfig;
pub use element::{
    component, describe, host, Child, ComponentElement, Element, ElementType, HostElement, Props,
    RenderFn, Value,
};
pub use error::{Error, Result};
pub use hooks::{Cleanup, Deps, HookContext, StateSetter};
pub use renderer::Renderer;
pub use target::{Event, EventHandler, MemoryDocument, RenderTarget, TargetNode};
pub use tree::NodeId;
