//! Scene Graph Module
//!
//! Owns the node tree and its partition into render groups:
//!
//! - [`Node`]: tree entity with local transform, appearance and display state
//! - [`Transform`]: 2D position / scale / rotation / skew / pivot with a
//!   lazily rebuilt local matrix
//! - [`RenderGroup`]: partition root with its own world space, depth-bucketed
//!   update queue and instruction set
//! - [`Scene`]: arena owner and the only place tree structure is mutated
//! - [`transform_system`]: incremental per-group world state propagation
//!
//! Nodes and groups live in slot maps and reference each other only through
//! [`NodeHandle`] and [`RenderGroupHandle`]. No reference counting is used
//! for parent, child or group links.

pub mod bounds;
pub mod node;
pub mod render_group;
pub mod scene;
pub mod transform;
pub mod transform_system;

pub use bounds::Rect;
pub use node::{BlendMode, DisplayStatus, Effect, Node, UpdateFlags, View};
pub use render_group::{CacheAsTextureOptions, RenderGroup, ScaleMode};
pub use scene::{OnRenderFn, Scene};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a [`Node`] stored in a [`Scene`].
    pub struct NodeHandle;
    /// Handle to a [`RenderGroup`] stored in a [`Scene`].
    pub struct RenderGroupHandle;
}
