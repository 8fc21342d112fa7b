//! Error type for the checked entry points of the crate.
//!
//! Most of the API cannot fail: arithmetic follows IEEE semantics and
//! the typed handles ([`Var`](crate::Var), [`MultiDual`](crate::MultiDual))
//! make invalid states unrepresentable. The variants below cover the
//! places where a caller hands in a raw [`ValueId`](crate::ValueId) or
//! a runtime index.

use thiserror::Error;

/// Errors reported by checked graph and dual-number operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdError {
    /// A `ValueId` does not address a node of this graph.
    #[error("unknown value #{index} (graph has {len} nodes)")]
    UnknownValue { index: usize, len: usize },

    /// An override was requested for a node produced by an operation.
    #[error("value #{index} is not a leaf")]
    NotALeaf { index: usize },

    /// A forward-mode variable index is outside `0..N`.
    #[error("variable index {index} out of bounds for N={n}")]
    VariableIndex { index: usize, n: usize },

    /// The arena violates one of its structural invariants.
    #[error("broken invariant at value #{index}: {reason}")]
    BrokenInvariant { index: usize, reason: String },
}
