//! Error types for the rendering engine.
//!
//! Failures fall into two classes. Caller contract violations (hooks called
//! out of order, malformed descriptions, misuse of the entry point) and
//! internal invariant breaches (a node that must own a target does not).
//! Both are local to one render pass and are returned to whoever triggered
//! that pass.

use thiserror::Error;

use crate::tree::NodeId;

/// Crate-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by a render pass.
#[derive(Debug, Error)]
pub enum Error {
    /// A component instance did not call its hooks the same way as on its
    /// first pass.
    #[error("hook order violated by component instance {node}: {detail}")]
    HookOrder { node: NodeId, detail: String },

    #[error("invalid element description: {0}")]
    InvalidDescription(String),

    #[error("renderer already has a mounted root")]
    AlreadyMounted,

    #[error("renderer has no mounted root")]
    NotMounted,

    /// State updates kept triggering further updates.
    #[error("updates did not settle after {0} rounds")]
    UpdateLoop(usize),

    /// A reconciliation-engine bug, not a caller error.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("invalid renderer configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Whether this error indicates an engine bug rather than caller misuse.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
