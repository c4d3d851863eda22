//! Axis-aligned bounds.

use glam::{Affine2, Vec2};
use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::node::Node;

/// Axis-aligned rectangle given by its min and max corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub const ZERO: Self = Self { min: Vec2::ZERO, max: Vec2::ZERO };

    #[inline]
    #[must_use]
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    #[inline]
    #[must_use]
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(Vec2::new(x, y), Vec2::new(x + width, y + height))
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// `true` when the rectangle encloses no area.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }

    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Bounds of the four transformed corners.
    #[must_use]
    pub fn transformed(&self, matrix: &Affine2) -> Rect {
        let corners = [
            matrix.transform_point2(self.min),
            matrix.transform_point2(Vec2::new(self.max.x, self.min.y)),
            matrix.transform_point2(self.max),
            matrix.transform_point2(Vec2::new(self.min.x, self.max.y)),
        ];
        let mut min = corners[0];
        let mut max = corners[0];
        for corner in &corners[1..] {
            min = min.min(*corner);
            max = max.max(*corner);
        }
        Rect::new(min, max)
    }

    /// Expands outwards to whole units.
    #[must_use]
    pub fn round_out(&self) -> Rect {
        Rect::new(self.min.floor(), self.max.ceil())
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Union of the view bounds of every displayed node under `root`, in
/// `root`'s local space.
///
/// Hidden, non-renderable and culled subtrees are skipped. Matrices are
/// computed from the current transform components, so the result does not
/// depend on a propagation having run.
#[must_use]
pub fn local_bounds(nodes: &SlotMap<NodeHandle, Node>, root: NodeHandle) -> Rect {
    let mut bounds = Rect::ZERO;
    let Some(root_node) = nodes.get(root) else {
        return bounds;
    };

    if let Some(view) = &root_node.view {
        bounds = bounds.union(&view.bounds);
    }

    let mut stack: Vec<(NodeHandle, Affine2)> = root_node
        .children
        .iter()
        .rev()
        .map(|&child| (child, Affine2::IDENTITY))
        .collect();

    while let Some((handle, parent_matrix)) = stack.pop() {
        let Some(node) = nodes.get(handle) else {
            continue;
        };
        if !node.local_display_status.is_fully_visible() {
            continue;
        }

        let matrix = parent_matrix * node.transform.compute_matrix();
        if let Some(view) = &node.view {
            bounds = bounds.union(&view.bounds.transformed(&matrix));
        }
        for &child in node.children.iter().rev() {
            stack.push((child, matrix));
        }
    }

    bounds
}
