//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`StrataError`] covers two families of failure:
//! - **Configuration errors**: the caller broke an invariant of the scene
//!   graph (stale handle, cycle, render-group operation on a detached node).
//! - **Backend errors**: failures raised by a [`RenderBackend`] or a render
//!   pipe, forwarded unchanged.
//!
//! A renderable that no longer fits its batch is *not* an error: the
//! validator reports it as a boolean and the frame falls back to a rebuild.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, StrataError>`.
//!
//! ```rust,ignore
//! use strata::errors::Result;
//!
//! fn build(scene: &mut Scene, parent: NodeHandle) -> Result<()> {
//!     let child = scene.create_node();
//!     scene.add_child(parent, child)?;
//!     Ok(())
//! }
//! ```
//!
//! [`RenderBackend`]: crate::renderer::RenderBackend

use thiserror::Error;

use crate::renderer::backend::BackendError;
use crate::scene::{NodeHandle, RenderGroupHandle};

/// The main error type for the crate.
#[derive(Error, Debug)]
pub enum StrataError {
    // ========================================================================
    // Scene Graph Errors
    // ========================================================================
    /// The handle does not refer to a live node.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    /// The handle does not refer to a live render group.
    #[error("Render group not found: {0:?}")]
    RenderGroupNotFound(RenderGroupHandle),

    /// A node was asked to become its own parent.
    #[error("Node {0:?} cannot be its own parent")]
    SelfParent(NodeHandle),

    /// Attaching would create a cycle in the hierarchy.
    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    CyclicHierarchy {
        /// The requested parent
        parent: NodeHandle,
        /// The node being attached
        child: NodeHandle,
    },

    /// The node is not a child of the given parent.
    #[error("Node {child:?} is not a child of {parent:?}")]
    NotAChild {
        /// The parent that was searched
        parent: NodeHandle,
        /// The node that was expected among its children
        child: NodeHandle,
    },

    /// Child insertion index is past the end of the child list.
    #[error("Child index {index} out of bounds (len: {len})")]
    ChildIndexOutOfBounds {
        /// The requested insertion index
        index: usize,
        /// Current number of children
        len: usize,
    },

    // ========================================================================
    // Render Group Errors
    // ========================================================================
    /// The node is not attached to any render group.
    #[error("Node {0:?} does not belong to a render group")]
    NotInRenderGroup(NodeHandle),

    /// The node is not the root of a render group.
    #[error("Node {0:?} is not a render group root")]
    NotARenderGroup(NodeHandle),

    // ========================================================================
    // Pipe & Backend Errors
    // ========================================================================
    /// No render or effect pipe is registered under this id.
    #[error("Unknown render pipe: {0}")]
    UnknownPipe(String),

    /// Error raised by the render backend or a pipe.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Alias for `Result<T, StrataError>`.
pub type Result<T> = std::result::Result<T, StrataError>;
