//! Render Groups
//!
//! A render group is a partition of the scene tree rooted at one node. It
//! owns:
//!
//! | Field                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `world_transform`      | World space of the root; members are relative    |
//! | `children_to_update`   | Pending nodes, bucketed by group-relative depth  |
//! | `renderables_to_update`| Nodes whose drawable data changed                |
//! | `instruction_set`      | Output of the last successful build              |
//! | `structure_did_change` | Set by any add / remove / regroup                |
//! | `cache`                | Optional cache-as-texture state                  |
//!
//! Membership is maintained by [`group_add_child`] and
//! [`group_remove_child`], which walk a subtree and stop at nested group
//! roots. A node is registered in at most one group's buckets at a time:
//! every regroup removes first and adds second.

use std::cell::Cell;

use bitflags::bitflags;
use glam::{Affine2, Vec2};
use slotmap::SlotMap;

use crate::renderer::instruction::InstructionSet;
use crate::renderer::texture_pool::TextureId;
use crate::scene::bounds::Rect;
use crate::scene::node::{Node, UpdateFlags};
use crate::scene::{NodeHandle, RenderGroupHandle};
use crate::utils::color::pack_color_alpha;

// ─── Cache-as-Texture Types ───────────────────────────────────────────────────

/// Sampling filter used when a cached texture is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScaleMode {
    Nearest,
    #[default]
    Linear,
}

/// Per-group overrides for cache-as-texture. Unset fields fall back to
/// [`RendererSettings`](crate::renderer::RendererSettings).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheAsTextureOptions {
    pub resolution: Option<f32>,
    pub antialias: Option<bool>,
    pub scale_mode: Option<ScaleMode>,
}

bitflags! {
    /// One bit per lazily computed cache matrix.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct MatrixDirty: u8 {
        const INVERSE_WORLD = 0b001;
        const TEXTURE_OFFSET_INVERSE = 0b010;
        const INVERSE_PARENT_TEXTURE = 0b100;
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub(crate) enabled: bool,
    pub(crate) options: CacheAsTextureOptions,
    pub(crate) texture: Option<TextureId>,
    pub(crate) texture_bounds: Rect,
    /// Filter resolved when the texture was acquired.
    pub(crate) scale_mode: ScaleMode,
    pub(crate) needs_update: bool,
}

/// Lazily computed matrices mapping into and out of cached texture space.
#[derive(Debug)]
struct CacheMatrices {
    dirty: Cell<MatrixDirty>,
    inverse_world: Cell<Affine2>,
    texture_offset_inverse: Cell<Affine2>,
    inverse_parent_texture: Cell<Affine2>,
}

impl Default for CacheMatrices {
    fn default() -> Self {
        Self {
            dirty: Cell::new(MatrixDirty::all()),
            inverse_world: Cell::new(Affine2::IDENTITY),
            texture_offset_inverse: Cell::new(Affine2::IDENTITY),
            inverse_parent_texture: Cell::new(Affine2::IDENTITY),
        }
    }
}

// ─── Render Group ─────────────────────────────────────────────────────────────

/// A cacheable partition of the scene tree. See the [module docs](self).
#[derive(Debug)]
pub struct RenderGroup {
    pub(crate) root: NodeHandle,
    pub(crate) parent: Option<RenderGroupHandle>,
    pub(crate) children: Vec<RenderGroupHandle>,

    pub(crate) world_transform: Affine2,
    pub(crate) world_color: u32,
    pub(crate) world_alpha: f32,

    pub(crate) update_tick: u64,
    pub(crate) structure_did_change: bool,

    /// `children_to_update[depth]` holds nodes queued at that relative depth.
    pub(crate) children_to_update: Vec<Vec<NodeHandle>>,
    pub(crate) renderables_to_update: Vec<NodeHandle>,
    pub(crate) on_render_nodes: Vec<NodeHandle>,

    pub(crate) instruction_set: InstructionSet,
    /// Build target; swapped with `instruction_set` on success.
    pub(crate) scratch_set: InstructionSet,

    pub(crate) cache: CacheState,
    /// Nearest ancestor group that is cached as a texture.
    pub(crate) parent_cache_group: Option<RenderGroupHandle>,
    matrices: CacheMatrices,
}

impl RenderGroup {
    pub(crate) fn new(root: NodeHandle) -> Self {
        Self {
            root,
            parent: None,
            children: Vec::new(),
            world_transform: Affine2::IDENTITY,
            world_color: 0xFF_FFFF,
            world_alpha: 1.0,
            update_tick: 0,
            structure_did_change: true,
            children_to_update: Vec::new(),
            renderables_to_update: Vec::new(),
            on_render_nodes: Vec::new(),
            instruction_set: InstructionSet::new(),
            scratch_set: InstructionSet::new(),
            cache: CacheState::default(),
            parent_cache_group: None,
            matrices: CacheMatrices::default(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// The enclosing group, `None` for a top-level group.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<RenderGroupHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[RenderGroupHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn world_transform(&self) -> &Affine2 {
        &self.world_transform
    }

    #[inline]
    #[must_use]
    pub fn world_color(&self) -> u32 {
        self.world_color
    }

    #[inline]
    #[must_use]
    pub fn world_alpha(&self) -> f32 {
        self.world_alpha
    }

    #[inline]
    #[must_use]
    pub fn world_color_alpha(&self) -> u32 {
        pack_color_alpha(self.world_color, self.world_alpha)
    }

    #[inline]
    #[must_use]
    pub fn update_tick(&self) -> u64 {
        self.update_tick
    }

    #[inline]
    #[must_use]
    pub fn structure_did_change(&self) -> bool {
        self.structure_did_change
    }

    #[inline]
    #[must_use]
    pub fn instruction_set(&self) -> &InstructionSet {
        &self.instruction_set
    }

    /// Nodes queued for propagation at `depth`.
    #[must_use]
    pub fn pending_at_depth(&self, depth: usize) -> &[NodeHandle] {
        self.children_to_update.get(depth).map_or(&[][..], Vec::as_slice)
    }

    /// `true` if `node` is queued at any depth.
    #[must_use]
    pub fn is_pending(&self, node: NodeHandle) -> bool {
        self.children_to_update.iter().any(|bucket| bucket.contains(&node))
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.children_to_update.iter().map(Vec::len).sum()
    }

    #[inline]
    #[must_use]
    pub fn renderables_to_update(&self) -> &[NodeHandle] {
        &self.renderables_to_update
    }

    #[inline]
    #[must_use]
    pub fn on_render_nodes(&self) -> &[NodeHandle] {
        &self.on_render_nodes
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Queues `node` for propagation at `depth`.
    pub(crate) fn child_updated(&mut self, node: NodeHandle, depth: usize) {
        if self.children_to_update.len() <= depth {
            self.children_to_update.resize_with(depth + 1, Vec::new);
        }
        self.children_to_update[depth].push(node);
    }

    pub(crate) fn remove_pending(&mut self, node: NodeHandle, depth: usize) {
        if let Some(bucket) = self.children_to_update.get_mut(depth)
            && let Some(index) = bucket.iter().position(|&n| n == node)
        {
            bucket.swap_remove(index);
        }
    }

    pub(crate) fn child_view_updated(&mut self, node: NodeHandle) {
        self.renderables_to_update.push(node);
    }

    // ========================================================================
    // Cache-as-Texture
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn is_cached_as_texture(&self) -> bool {
        self.cache.enabled
    }

    #[inline]
    #[must_use]
    pub fn texture(&self) -> Option<TextureId> {
        self.cache.texture
    }

    /// `true` until the cached texture has been redrawn.
    #[inline]
    #[must_use]
    pub fn texture_needs_update(&self) -> bool {
        self.cache.needs_update
    }

    /// Bounds of the cached content in root-local space.
    #[inline]
    #[must_use]
    pub fn texture_bounds(&self) -> Rect {
        self.cache.texture_bounds
    }

    #[inline]
    #[must_use]
    pub fn cache_options(&self) -> &CacheAsTextureOptions {
        &self.cache.options
    }

    #[inline]
    #[must_use]
    pub fn parent_cache_group(&self) -> Option<RenderGroupHandle> {
        self.parent_cache_group
    }

    /// Marks every cache matrix for recomputation.
    pub fn invalidate_matrices(&self) {
        self.matrices.dirty.set(MatrixDirty::all());
    }

    fn take_dirty(&self, bit: MatrixDirty) -> bool {
        let dirty = self.matrices.dirty.get();
        if dirty.contains(bit) {
            self.matrices.dirty.set(dirty - bit);
            true
        } else {
            false
        }
    }

    /// Inverse of the world transform.
    #[must_use]
    pub fn inverse_world_transform(&self) -> Affine2 {
        if self.take_dirty(MatrixDirty::INVERSE_WORLD) {
            self.matrices.inverse_world.set(self.world_transform.inverse());
        }
        self.matrices.inverse_world.get()
    }

    /// Maps world space into this group's cached texture space.
    #[must_use]
    pub fn texture_offset_inverse_transform(&self) -> Affine2 {
        if self.take_dirty(MatrixDirty::TEXTURE_OFFSET_INVERSE) {
            let offset = Affine2::from_translation(-self.cache.texture_bounds.min);
            self.matrices.texture_offset_inverse.set(offset * self.inverse_world_transform());
        }
        self.matrices.texture_offset_inverse.get()
    }

    /// Maps this group's space into the texture of `parent_cache`, which must
    /// be this group's nearest cached ancestor. Without a cached ancestor
    /// this is the world transform.
    #[must_use]
    pub fn inverse_parent_texture_transform(&self, parent_cache: Option<&RenderGroup>) -> Affine2 {
        let Some(parent_cache) = parent_cache else {
            return self.world_transform;
        };
        if self.take_dirty(MatrixDirty::INVERSE_PARENT_TEXTURE) {
            let offset = Affine2::from_translation(-parent_cache.cache.texture_bounds.min);
            self.matrices
                .inverse_parent_texture
                .set(offset * parent_cache.inverse_world_transform() * self.world_transform);
        }
        self.matrices.inverse_parent_texture.get()
    }

    /// Converts a point from world space into cached texture space.
    #[must_use]
    pub fn world_to_texture(&self, point: Vec2) -> Vec2 {
        self.texture_offset_inverse_transform().transform_point2(point)
    }

    /// `false` when the root is hidden or the group is fully transparent.
    #[must_use]
    pub fn is_renderable(&self, nodes: &SlotMap<NodeHandle, Node>) -> bool {
        nodes
            .get(self.root)
            .is_some_and(|root| root.local_display_status.is_fully_visible() && self.world_alpha > 0.0)
    }
}

// ─── Membership ───────────────────────────────────────────────────────────────

/// Claims `child` and its subtree for `group`, stopping at nested group
/// roots, which are linked as child groups instead.
///
/// Every claimed node gets its depth recomputed, all update flags set and is
/// queued in the matching bucket.
pub(crate) fn group_add_child(
    nodes: &mut SlotMap<NodeHandle, Node>,
    groups: &mut SlotMap<RenderGroupHandle, RenderGroup>,
    group: RenderGroupHandle,
    child: NodeHandle,
) {
    let Some(render_group) = groups.get_mut(group) else {
        return;
    };
    render_group.structure_did_change = true;
    let root = render_group.root;

    let mut stack = vec![child];
    while let Some(handle) = stack.pop() {
        let parent_depth = nodes
            .get(handle)
            .and_then(|node| node.parent)
            .filter(|&parent| parent != root)
            .and_then(|parent| nodes.get(parent))
            .map(|parent| parent.relative_render_group_depth);

        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };
        debug_assert!(!node.did_change || node.parent_render_group.is_none(), "node {handle:?} registered twice");

        let depth = parent_depth.map_or(1, |depth| depth + 1);
        node.parent_render_group = Some(group);
        node.relative_render_group_depth = depth;
        node.update_tick = None;
        node.update_flags = UpdateFlags::all();
        node.did_change = true;
        groups[group].child_updated(handle, depth);

        if let Some(nested) = node.render_group {
            add_render_group_child(groups, group, nested);
            continue;
        }

        if let Some(view) = node.view.as_mut() {
            view.did_view_update = false;
        }
        if node.has_on_render {
            groups[group].on_render_nodes.push(handle);
        }
        stack.extend(node.children.iter().rev().copied());
    }
}

/// Releases `child` and its subtree from `group`, mirroring
/// [`group_add_child`].
///
/// A nested group root is unqueued and unlinked, but its subtree stays with
/// its own group.
pub(crate) fn group_remove_child(
    nodes: &mut SlotMap<NodeHandle, Node>,
    groups: &mut SlotMap<RenderGroupHandle, RenderGroup>,
    group: RenderGroupHandle,
    child: NodeHandle,
) {
    let Some(render_group) = groups.get_mut(group) else {
        return;
    };
    render_group.structure_did_change = true;

    let mut stack = vec![child];
    while let Some(handle) = stack.pop() {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };
        let render_group = &mut groups[group];

        if node.did_change {
            render_group.remove_pending(handle, node.relative_render_group_depth);
            node.did_change = false;
        }
        node.parent_render_group = None;

        if let Some(nested) = node.render_group {
            remove_render_group_child(groups, group, nested);
            continue;
        }

        if node.has_on_render {
            render_group.on_render_nodes.retain(|&n| n != handle);
        }
        if let Some(view) = node.view.as_mut()
            && view.did_view_update
        {
            render_group.renderables_to_update.retain(|&n| n != handle);
            view.did_view_update = false;
        }
        stack.extend(node.children.iter().rev().copied());
    }
}

/// Links `child` under `parent`, detaching it from any previous parent group.
pub(crate) fn add_render_group_child(
    groups: &mut SlotMap<RenderGroupHandle, RenderGroup>,
    parent: RenderGroupHandle,
    child: RenderGroupHandle,
) {
    let previous = groups.get(child).and_then(|group| group.parent);
    if let Some(previous) = previous
        && previous != parent
    {
        remove_render_group_child(groups, previous, child);
    }

    if let Some(group) = groups.get_mut(child) {
        group.parent = Some(parent);
        group.invalidate_matrices();
    }
    if let Some(group) = groups.get_mut(parent)
        && !group.children.contains(&child)
    {
        group.children.push(child);
    }
}

pub(crate) fn remove_render_group_child(
    groups: &mut SlotMap<RenderGroupHandle, RenderGroup>,
    parent: RenderGroupHandle,
    child: RenderGroupHandle,
) {
    if let Some(group) = groups.get_mut(parent) {
        group.children.retain(|&g| g != child);
    }
    if let Some(group) = groups.get_mut(child)
        && group.parent == Some(parent)
    {
        group.parent = None;
        group.parent_cache_group = None;
        group.invalidate_matrices();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrices_recompute_only_when_invalidated() {
        let mut group = RenderGroup::new(NodeHandle::default());
        group.world_transform = Affine2::from_translation(Vec2::new(10.0, 0.0));
        let inverse = group.inverse_world_transform();
        assert!(inverse.translation.abs_diff_eq(Vec2::new(-10.0, 0.0), 1e-6));

        // Stale until invalidated.
        group.world_transform = Affine2::from_translation(Vec2::new(20.0, 0.0));
        assert!(group.inverse_world_transform().translation.abs_diff_eq(Vec2::new(-10.0, 0.0), 1e-6));

        group.invalidate_matrices();
        assert!(group.inverse_world_transform().translation.abs_diff_eq(Vec2::new(-20.0, 0.0), 1e-6));
    }

    #[test]
    fn texture_offset_applies_bounds() {
        let mut group = RenderGroup::new(NodeHandle::default());
        group.world_transform = Affine2::from_translation(Vec2::new(100.0, 50.0));
        group.cache.texture_bounds = Rect::from_xywh(-5.0, -5.0, 10.0, 10.0);
        group.invalidate_matrices();
        let p = group.world_to_texture(Vec2::new(100.0, 50.0));
        assert!(p.abs_diff_eq(Vec2::new(5.0, 5.0), 1e-5));
    }

    #[test]
    fn inverse_parent_texture_without_cache_is_world() {
        let mut group = RenderGroup::new(NodeHandle::default());
        group.world_transform = Affine2::from_scale(Vec2::splat(2.0));
        assert_eq!(group.inverse_parent_texture_transform(None), group.world_transform);
    }

    #[test]
    fn pending_buckets_grow_by_depth() {
        let mut group = RenderGroup::new(NodeHandle::default());
        let node = NodeHandle::default();
        group.child_updated(node, 3);
        assert_eq!(group.pending_at_depth(3), &[node]);
        assert!(group.pending_at_depth(1).is_empty());
        group.remove_pending(node, 3);
        assert_eq!(group.pending_count(), 0);
    }
}
