use glam::{Affine2, Vec2};
use slotmap::{SlotMap, SparseSecondaryMap};

use crate::errors::{Result, StrataError};
use crate::renderer::pipe::PipeId;
use crate::renderer::texture_pool::TextureId;
use crate::scene::bounds::{self, Rect};
use crate::scene::node::{BlendMode, DisplayStatus, Effect, Node, UpdateFlags, View};
use crate::scene::render_group::{CacheAsTextureOptions, RenderGroup, group_add_child, group_remove_child};
use crate::scene::transform::Transform;
use crate::scene::transform_system;
use crate::scene::{NodeHandle, RenderGroupHandle};
use crate::utils::color::{Tint, clamp_alpha, multiply_colors, pack_color_alpha};

/// Per-frame hook run by the frame driver before its group is reconciled.
///
/// Hooks may mutate the scene freely, including its structure.
pub type OnRenderFn = Box<dyn FnMut(&mut Scene, NodeHandle)>;

/// Scene graph storage.
///
/// `Scene` owns every [`Node`] and [`RenderGroup`] and is the only place
/// tree structure changes. Property setters never recompute anything: they
/// record what changed and queue the node with its render group. The
/// renderer reconciles the queues once per frame.
///
/// # Render groups
///
/// Any node can be promoted to a render group root with
/// [`enable_render_group`](Self::enable_render_group). The renderer always
/// promotes the node it is asked to render.
pub struct Scene {
    pub(crate) nodes: SlotMap<NodeHandle, Node>,
    pub(crate) groups: SlotMap<RenderGroupHandle, RenderGroup>,
    pub(crate) on_render: SparseSecondaryMap<NodeHandle, OnRenderFn>,

    /// Cache textures released since the last frame.
    pub(crate) retired_textures: Vec<TextureId>,
    /// Renderables of destroyed nodes, released on the next frame.
    pub(crate) destroyed_renderables: Vec<(NodeHandle, PipeId)>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            groups: SlotMap::with_key(),
            on_render: SparseSecondaryMap::new(),
            retired_textures: Vec::new(),
            destroyed_renderables: Vec::new(),
        }
    }

    // ========================================================================
    // Node Lifecycle
    // ========================================================================

    pub fn create_node(&mut self) -> NodeHandle {
        self.nodes.insert(Node::new())
    }

    pub fn create_node_with_name(&mut self, name: &str) -> NodeHandle {
        let mut node = Node::new();
        node.name = Some(name.to_string());
        self.nodes.insert(node)
    }

    /// Creates a drawable node.
    pub fn create_view_node(&mut self, view: View) -> NodeHandle {
        self.nodes.insert(Node::with_view(view))
    }

    /// Destroys `handle` and its whole subtree.
    ///
    /// Owned render groups are released, cache textures and renderables are
    /// queued for release on the next frame, and on-render hooks dropped.
    pub fn destroy_node(&mut self, handle: NodeHandle) -> Result<()> {
        self.remove_from_parent(handle)?;

        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.remove(current) else {
                continue;
            };
            stack.extend(node.children.iter().copied());

            if let Some(group) = node.render_group
                && let Some(render_group) = self.groups.remove(group)
            {
                if let Some(texture) = render_group.cache.texture {
                    self.retired_textures.push(texture);
                }
                log::debug!("render group {group:?} released with its root {current:?}");
            }
            if let Some(view) = node.view {
                self.destroyed_renderables.push((current, view.pipe));
            }
            self.on_render.remove(current);
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes.iter()
    }

    fn node_ref(&self, handle: NodeHandle) -> Result<&Node> {
        self.nodes.get(handle).ok_or(StrataError::NodeNotFound(handle))
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut Node> {
        self.nodes.get_mut(handle).ok_or(StrataError::NodeNotFound(handle))
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(handle).and_then(Node::parent)
    }

    pub fn children(&self, handle: NodeHandle) -> &[NodeHandle] {
        self.nodes.get(handle).map_or(&[][..], Node::children)
    }

    pub fn set_name(&mut self, handle: NodeHandle, name: &str) -> Result<()> {
        self.node_mut(handle)?.name = Some(name.to_string());
        Ok(())
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Appends `child` to `parent`'s children.
    ///
    /// A child already under another parent is moved. A child already under
    /// `parent` is moved to the end.
    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        let len = self.node_ref(parent)?.children.len();
        self.insert_child(parent, child, len, true)
    }

    /// Inserts `child` at `index` in `parent`'s children.
    pub fn add_child_at(&mut self, parent: NodeHandle, child: NodeHandle, index: usize) -> Result<()> {
        self.insert_child(parent, child, index, false)
    }

    fn insert_child(&mut self, parent: NodeHandle, child: NodeHandle, index: usize, append: bool) -> Result<()> {
        if parent == child {
            return Err(StrataError::SelfParent(child));
        }
        self.node_ref(child)?;
        self.check_not_ancestor(child, parent)?;

        if self.node_ref(child)?.parent == Some(parent) {
            // Positions are counted without the child itself.
            let len = self.node_ref(parent)?.children.len() - 1;
            if !append && index > len {
                return Err(StrataError::ChildIndexOutOfBounds { index, len });
            }
            let parent_node = self.node_mut(parent)?;
            parent_node.children.retain(|&c| c != child);
            let index = if append { len } else { index };
            parent_node.children.insert(index, child);
            if parent_node.sortable_children {
                parent_node.sort_dirty = true;
            }
            let group = parent_node.content_group();
            self.mark_structure_changed(group);
            return Ok(());
        }

        let len = self.node_ref(parent)?.children.len();
        if index > len {
            return Err(StrataError::ChildIndexOutOfBounds { index, len });
        }

        if let Some(old_parent) = self.node_ref(child)?.parent {
            self.detach(old_parent, child);
        }

        let parent_node = self.node_mut(parent)?;
        parent_node.children.insert(index, child);
        if parent_node.sortable_children {
            parent_node.sort_dirty = true;
        }
        let group = parent_node.content_group();

        let child_node = self.node_mut(child)?;
        child_node.parent = Some(parent);
        child_node.update_flags = UpdateFlags::all();

        if let Some(group) = group {
            group_add_child(&mut self.nodes, &mut self.groups, group, child);
        }
        Ok(())
    }

    /// Fails if `node` is `ancestor` or lies above it.
    fn check_not_ancestor(&self, node: NodeHandle, start: NodeHandle) -> Result<()> {
        let mut current = Some(start);
        while let Some(handle) = current {
            if handle == node {
                return Err(StrataError::CyclicHierarchy { parent: start, child: node });
            }
            current = self.node_ref(handle)?.parent;
        }
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        if self.node_ref(child)?.parent != Some(parent) {
            return Err(StrataError::NotAChild { parent, child });
        }
        self.detach(parent, child);
        Ok(())
    }

    /// Detaches `handle` from its parent, if it has one.
    pub fn remove_from_parent(&mut self, handle: NodeHandle) -> Result<()> {
        if let Some(parent) = self.node_ref(handle)?.parent {
            self.detach(parent, handle);
        }
        Ok(())
    }

    fn detach(&mut self, parent: NodeHandle, child: NodeHandle) {
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|&c| c != child);
        }
        let group = self.nodes.get(child).and_then(|node| node.parent_render_group);
        if let Some(group) = group {
            group_remove_child(&mut self.nodes, &mut self.groups, group, child);
        }
        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parent = None;
        }
    }

    // ========================================================================
    // Dirty Tracking
    // ========================================================================

    /// Records `flags` and queues the node once with its group.
    fn on_update(&mut self, handle: NodeHandle, flags: UpdateFlags) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        node.update_flags |= flags;
        if node.did_change {
            return;
        }
        node.did_change = true;
        if let Some(group) = node.parent_render_group
            && let Some(render_group) = self.groups.get_mut(group)
        {
            render_group.child_updated(handle, node.relative_render_group_depth);
        }
    }

    /// Queues a drawable node for a view update once.
    fn on_view_update(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        let group = node.content_group();
        let Some(view) = node.view.as_mut() else {
            return;
        };
        if view.did_view_update {
            return;
        }
        view.did_view_update = true;
        if let Some(render_group) = group.and_then(|group| self.groups.get_mut(group)) {
            render_group.child_view_updated(handle);
        }
    }

    fn mark_structure_changed(&mut self, group: Option<RenderGroupHandle>) {
        if let Some(render_group) = group.and_then(|group| self.groups.get_mut(group)) {
            render_group.structure_did_change = true;
        }
    }

    fn update_transform(&mut self, handle: NodeHandle, apply: impl FnOnce(&mut Transform) -> bool) -> Result<()> {
        let node = self.node_mut(handle)?;
        if apply(&mut node.transform) {
            node.transform.mark_dirty();
            self.on_update(handle, UpdateFlags::TRANSFORM);
        }
        Ok(())
    }

    // ========================================================================
    // Transform Setters
    // ========================================================================

    pub fn set_position(&mut self, handle: NodeHandle, position: Vec2) -> Result<()> {
        self.update_transform(handle, |t| {
            let changed = t.position != position;
            t.position = position;
            changed
        })
    }

    pub fn set_scale(&mut self, handle: NodeHandle, scale: Vec2) -> Result<()> {
        self.update_transform(handle, |t| {
            let changed = t.scale != scale;
            t.scale = scale;
            changed
        })
    }

    /// Rotation in radians.
    pub fn set_rotation(&mut self, handle: NodeHandle, rotation: f32) -> Result<()> {
        self.update_transform(handle, |t| {
            let changed = t.rotation != rotation;
            t.rotation = rotation;
            changed
        })
    }

    pub fn set_skew(&mut self, handle: NodeHandle, skew: Vec2) -> Result<()> {
        self.update_transform(handle, |t| {
            let changed = t.skew != skew;
            t.skew = skew;
            changed
        })
    }

    pub fn set_pivot(&mut self, handle: NodeHandle, pivot: Vec2) -> Result<()> {
        self.update_transform(handle, |t| {
            let changed = t.pivot != pivot;
            t.pivot = pivot;
            changed
        })
    }

    /// Decomposes `matrix` into the node's transform components.
    pub fn set_local_matrix(&mut self, handle: NodeHandle, matrix: &Affine2) -> Result<()> {
        self.update_transform(handle, |t| {
            t.set_from_matrix(matrix);
            true
        })
    }

    // ========================================================================
    // Appearance Setters
    // ========================================================================

    /// Local alpha. Composed values are clamped to `[0, 1]`; the local value
    /// is stored as given.
    pub fn set_alpha(&mut self, handle: NodeHandle, alpha: f32) -> Result<()> {
        let node = self.node_mut(handle)?;
        if node.local_alpha == alpha {
            return Ok(());
        }
        node.local_alpha = alpha;
        let drawable = node.view.is_some();
        self.on_update(handle, UpdateFlags::COLOR);
        if drawable {
            self.on_view_update(handle);
        }
        Ok(())
    }

    pub fn set_tint(&mut self, handle: NodeHandle, tint: impl Into<Tint>) -> Result<()> {
        let tint = tint.into();
        let node = self.node_mut(handle)?;
        if node.local_tint == tint {
            return Ok(());
        }
        node.local_tint = tint;
        let drawable = node.view.is_some();
        self.on_update(handle, UpdateFlags::COLOR);
        if drawable {
            self.on_view_update(handle);
        }
        Ok(())
    }

    /// Blend changes alter the emitted instructions and force a rebuild.
    pub fn set_blend_mode(&mut self, handle: NodeHandle, mode: BlendMode) -> Result<()> {
        let node = self.node_mut(handle)?;
        if node.local_blend_mode == mode {
            return Ok(());
        }
        node.local_blend_mode = mode;
        let (own, parent) = (node.render_group, node.parent_render_group);
        self.on_update(handle, UpdateFlags::BLEND);
        self.mark_structure_changed(parent);

        // Nested groups resolve inherited blend against their ancestors.
        let mut stack: Vec<RenderGroupHandle> = own.or(parent).into_iter().collect();
        while let Some(group) = stack.pop() {
            if let Some(render_group) = self.groups.get_mut(group) {
                render_group.structure_did_change = true;
                stack.extend(render_group.children.iter().copied());
            }
        }
        Ok(())
    }

    // ========================================================================
    // Display Setters
    // ========================================================================

    pub fn set_visible(&mut self, handle: NodeHandle, visible: bool) -> Result<()> {
        self.set_display_bit(handle, DisplayStatus::VISIBLE, visible)
    }

    pub fn set_renderable(&mut self, handle: NodeHandle, renderable: bool) -> Result<()> {
        self.set_display_bit(handle, DisplayStatus::RENDERABLE, renderable)
    }

    pub fn set_culled(&mut self, handle: NodeHandle, culled: bool) -> Result<()> {
        self.set_display_bit(handle, DisplayStatus::UNCULLED, !culled)
    }

    /// Display changes add or remove instructions, so the group that places
    /// this node is rebuilt.
    fn set_display_bit(&mut self, handle: NodeHandle, bit: DisplayStatus, value: bool) -> Result<()> {
        let node = self.node_mut(handle)?;
        if node.local_display_status.contains(bit) == value {
            return Ok(());
        }
        node.local_display_status.set(bit, value);
        let group = node.parent_render_group;
        self.mark_structure_changed(group);
        self.on_update(handle, UpdateFlags::VISIBLE);
        Ok(())
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Sets the draw order key among siblings. Turns on child sorting for
    /// the parent.
    pub fn set_z_index(&mut self, handle: NodeHandle, z_index: i32) -> Result<()> {
        let node = self.node_mut(handle)?;
        if node.z_index == z_index {
            return Ok(());
        }
        node.z_index = z_index;
        let (parent, group) = (node.parent, node.parent_render_group);

        if let Some(parent_node) = parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent_node.sortable_children = true;
            parent_node.sort_dirty = true;
        }
        self.mark_structure_changed(group);
        Ok(())
    }

    pub fn set_sortable_children(&mut self, handle: NodeHandle, sortable: bool) -> Result<()> {
        let node = self.node_mut(handle)?;
        if node.sortable_children == sortable {
            return Ok(());
        }
        node.sortable_children = sortable;
        node.sort_dirty = sortable;
        let group = node.content_group();
        self.mark_structure_changed(group);
        Ok(())
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Adds an effect, keeping the list ordered by priority. Effects with
    /// equal priority keep insertion order.
    pub fn add_effect(&mut self, handle: NodeHandle, effect: Effect) -> Result<()> {
        let node = self.node_mut(handle)?;
        node.effects.push(effect);
        node.effects.sort_by_key(|effect| effect.priority);
        let group = node.content_group();
        self.mark_structure_changed(group);
        Ok(())
    }

    /// Removes the first effect equal to `effect`. Returns whether one was
    /// found.
    pub fn remove_effect(&mut self, handle: NodeHandle, effect: &Effect) -> Result<bool> {
        let node = self.node_mut(handle)?;
        let Some(index) = node.effects.iter().position(|e| e == effect) else {
            return Ok(false);
        };
        node.effects.remove(index);
        let group = node.content_group();
        self.mark_structure_changed(group);
        Ok(true)
    }

    pub fn clear_effects(&mut self, handle: NodeHandle) -> Result<()> {
        let node = self.node_mut(handle)?;
        if node.effects.is_empty() {
            return Ok(());
        }
        node.effects.clear();
        let group = node.content_group();
        self.mark_structure_changed(group);
        Ok(())
    }

    // ========================================================================
    // View
    // ========================================================================

    /// Replaces the drawable view. The previous renderable is released on
    /// the next frame.
    pub fn set_view(&mut self, handle: NodeHandle, view: Option<View>) -> Result<()> {
        let node = self.node_mut(handle)?;
        let group = node.content_group();
        let previous = std::mem::replace(&mut node.view, view);

        if let Some(previous) = previous {
            self.destroyed_renderables.push((handle, previous.pipe));
            if previous.did_view_update
                && let Some(render_group) = group.and_then(|group| self.groups.get_mut(group))
            {
                render_group.renderables_to_update.retain(|&n| n != handle);
            }
        }
        self.mark_structure_changed(group);
        Ok(())
    }

    /// Swaps the texture of a drawable node. No-op for nodes without a view.
    pub fn set_texture(&mut self, handle: NodeHandle, texture: Option<TextureId>) -> Result<()> {
        let node = self.node_mut(handle)?;
        let Some(view) = node.view.as_mut() else {
            return Ok(());
        };
        if view.texture == texture {
            return Ok(());
        }
        view.texture = texture;
        self.on_view_update(handle);
        Ok(())
    }

    pub fn set_view_bounds(&mut self, handle: NodeHandle, bounds: Rect) -> Result<()> {
        let node = self.node_mut(handle)?;
        let Some(view) = node.view.as_mut() else {
            return Ok(());
        };
        if view.bounds == bounds {
            return Ok(());
        }
        view.bounds = bounds;
        self.on_view_update(handle);
        Ok(())
    }

    /// Flags drawable data as changed without touching any field, e.g. after
    /// a geometry edit the scene graph does not see.
    pub fn touch_view(&mut self, handle: NodeHandle) -> Result<()> {
        self.node_ref(handle)?;
        self.on_view_update(handle);
        Ok(())
    }

    // ========================================================================
    // On-Render Hooks
    // ========================================================================

    /// Installs or clears the per-frame hook of a node.
    pub fn set_on_render(&mut self, handle: NodeHandle, hook: Option<OnRenderFn>) -> Result<()> {
        let node = self.node_mut(handle)?;
        let had_hook = node.has_on_render;
        node.has_on_render = hook.is_some();
        let group = node.content_group();

        match hook {
            Some(hook) => {
                self.on_render.insert(handle, hook);
                if !had_hook && let Some(render_group) = group.and_then(|group| self.groups.get_mut(group)) {
                    render_group.on_render_nodes.push(handle);
                }
            }
            None => {
                self.on_render.remove(handle);
                if let Some(render_group) = group.and_then(|group| self.groups.get_mut(group)) {
                    render_group.on_render_nodes.retain(|&n| n != handle);
                }
            }
        }
        Ok(())
    }

    /// Runs the hook of `handle`, restoring it afterwards unless the hook
    /// replaced or removed itself.
    pub(crate) fn run_on_render(&mut self, handle: NodeHandle) {
        let Some(mut hook) = self.on_render.remove(handle) else {
            return;
        };
        hook(self, handle);
        let keep = self.nodes.get(handle).is_some_and(|node| node.has_on_render);
        if keep && !self.on_render.contains_key(handle) {
            self.on_render.insert(handle, hook);
        }
    }

    // ========================================================================
    // Render Groups
    // ========================================================================

    /// Promotes `handle` to a render group root and claims its subtree.
    ///
    /// Returns the existing group if the node already is a root.
    pub fn enable_render_group(&mut self, handle: NodeHandle) -> Result<RenderGroupHandle> {
        let node = self.node_ref(handle)?;
        if let Some(group) = node.render_group {
            return Ok(group);
        }
        let parent_group = node.parent_render_group;

        if let Some(parent_group) = parent_group {
            group_remove_child(&mut self.nodes, &mut self.groups, parent_group, handle);
        }

        let group = self.groups.insert(RenderGroup::new(handle));
        log::debug!("render group {group:?} created for {handle:?}");

        let node = self.node_mut(handle)?;
        node.render_group = Some(group);
        if let Some(view) = node.view.as_mut() {
            view.did_view_update = false;
        }
        let has_on_render = node.has_on_render;
        let children = node.children.clone();

        if has_on_render {
            self.groups[group].on_render_nodes.push(handle);
        }
        for child in children {
            group_add_child(&mut self.nodes, &mut self.groups, group, child);
        }
        if let Some(parent_group) = parent_group {
            group_add_child(&mut self.nodes, &mut self.groups, parent_group, handle);
        }
        Ok(group)
    }

    /// Dissolves the render group rooted at `handle`; its subtree rejoins the
    /// enclosing group. Does nothing if the node is not a root.
    pub fn disable_render_group(&mut self, handle: NodeHandle) -> Result<()> {
        let node = self.node_ref(handle)?;
        let Some(group) = node.render_group else {
            return Ok(());
        };
        let parent_group = node.parent_render_group;
        let children = node.children.clone();

        if let Some(parent_group) = parent_group {
            group_remove_child(&mut self.nodes, &mut self.groups, parent_group, handle);
        }
        for child in children {
            group_remove_child(&mut self.nodes, &mut self.groups, group, child);
        }

        if let Some(render_group) = self.groups.remove(group) {
            if let Some(texture) = render_group.cache.texture {
                self.retired_textures.push(texture);
            }
            for nested in render_group.children {
                if let Some(nested_group) = self.groups.get_mut(nested) {
                    nested_group.parent = None;
                }
            }
        }
        log::debug!("render group {group:?} released from {handle:?}");

        let node = self.node_mut(handle)?;
        node.render_group = None;
        if let Some(view) = node.view.as_mut() {
            view.did_view_update = false;
        }
        if let Some(parent_group) = parent_group {
            group_add_child(&mut self.nodes, &mut self.groups, parent_group, handle);
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn render_group(&self, group: RenderGroupHandle) -> Option<&RenderGroup> {
        self.groups.get(group)
    }

    pub fn render_groups(&self) -> impl Iterator<Item = (RenderGroupHandle, &RenderGroup)> {
        self.groups.iter()
    }

    /// Blend mode a group draws its `Inherit` content with, resolved through
    /// the enclosing groups. `Normal` at the top.
    #[must_use]
    pub fn render_group_blend_mode(&self, group: RenderGroupHandle) -> BlendMode {
        let mut current = Some(group);
        while let Some(render_group) = current.and_then(|group| self.groups.get(group)) {
            let mode = self
                .nodes
                .get(render_group.root)
                .map_or(BlendMode::Inherit, |root| root.group_blend_mode);
            if mode != BlendMode::Inherit {
                return mode;
            }
            current = render_group.parent;
        }
        BlendMode::Normal
    }

    /// The group that draws `handle`.
    #[must_use]
    pub fn render_group_of(&self, handle: NodeHandle) -> Option<RenderGroupHandle> {
        self.nodes.get(handle).and_then(Node::content_group)
    }

    /// The group whose update buckets hold `handle`.
    #[must_use]
    pub fn parent_render_group(&self, handle: NodeHandle) -> Option<RenderGroupHandle> {
        self.nodes.get(handle).and_then(Node::parent_render_group)
    }

    fn group_ref(&self, group: RenderGroupHandle) -> Result<&RenderGroup> {
        self.groups.get(group).ok_or(StrataError::RenderGroupNotFound(group))
    }

    fn owned_group(&self, handle: NodeHandle) -> Result<RenderGroupHandle> {
        self.node_ref(handle)?.render_group.ok_or(StrataError::NotARenderGroup(handle))
    }

    // ========================================================================
    // Cache-as-Texture
    // ========================================================================

    /// Renders the subtree of `handle` into an offscreen texture that is
    /// reused until [`update_cache_texture`](Self::update_cache_texture).
    pub fn enable_cache_as_texture(
        &mut self,
        handle: NodeHandle,
        options: CacheAsTextureOptions,
    ) -> Result<RenderGroupHandle> {
        let group = self.enable_render_group(handle)?;
        let render_group = &mut self.groups[group];
        render_group.cache.enabled = true;
        render_group.cache.options = options;
        render_group.cache.needs_update = true;
        let parent = render_group.parent;
        self.mark_structure_changed(parent);
        Ok(group)
    }

    /// Stops caching. The texture goes back to the pool on the next frame.
    /// The render group itself stays.
    pub fn disable_cache_as_texture(&mut self, handle: NodeHandle) -> Result<()> {
        let group = self.owned_group(handle)?;
        let render_group = &mut self.groups[group];
        if !render_group.cache.enabled {
            return Ok(());
        }
        render_group.cache.enabled = false;
        render_group.cache.needs_update = false;
        let texture = render_group.cache.texture.take();
        let parent = render_group.parent;

        if let Some(texture) = texture {
            self.retired_textures.push(texture);
        }
        self.mark_structure_changed(parent);
        Ok(())
    }

    /// Requests a redraw of the cached texture, and of every cached ancestor
    /// that contains it.
    pub fn update_cache_texture(&mut self, handle: NodeHandle) -> Result<()> {
        let group = self.owned_group(handle)?;
        let render_group = &mut self.groups[group];
        if render_group.cache.enabled {
            render_group.cache.needs_update = true;
        }

        let mut current = render_group.parent_cache_group;
        while let Some(render_group) = current.and_then(|group| self.groups.get_mut(group)) {
            if render_group.cache.needs_update {
                break;
            }
            render_group.cache.needs_update = true;
            current = render_group.parent_cache_group;
        }
        Ok(())
    }

    /// Maps `group`'s space into the texture of its nearest cached ancestor.
    pub fn inverse_parent_texture_transform(&self, group: RenderGroupHandle) -> Result<Affine2> {
        let render_group = self.group_ref(group)?;
        let parent = render_group.parent_cache_group.and_then(|parent| self.groups.get(parent));
        Ok(render_group.inverse_parent_texture_transform(parent))
    }

    /// Texture-space mapping of the nearest cached ancestor, if any.
    pub fn cache_to_local_transform(&self, group: RenderGroupHandle) -> Result<Option<Affine2>> {
        let render_group = self.group_ref(group)?;
        Ok(render_group
            .parent_cache_group
            .and_then(|parent| self.groups.get(parent))
            .map(RenderGroup::texture_offset_inverse_transform))
    }

    // ========================================================================
    // World-Space Queries
    // ========================================================================
    //
    // Values reflect the last rendered frame.

    pub fn world_transform(&self, handle: NodeHandle) -> Result<Affine2> {
        let (node, group) = self.node_and_group(handle)?;
        Ok(group.world_transform * node.group_transform())
    }

    pub fn world_alpha(&self, handle: NodeHandle) -> Result<f32> {
        let (node, group) = self.node_and_group(handle)?;
        if node.render_group.is_some() {
            return Ok(group.world_alpha);
        }
        Ok(clamp_alpha(group.world_alpha * node.group_alpha))
    }

    /// World tint and alpha packed as `0xAARRGGBB`.
    pub fn world_color_alpha(&self, handle: NodeHandle) -> Result<u32> {
        let (node, group) = self.node_and_group(handle)?;
        if node.render_group.is_some() {
            return Ok(group.world_color_alpha());
        }
        let color = multiply_colors(node.group_color, group.world_color);
        Ok(pack_color_alpha(color, group.world_alpha * node.group_alpha))
    }

    pub fn to_global(&self, handle: NodeHandle, point: Vec2) -> Result<Vec2> {
        Ok(self.world_transform(handle)?.transform_point2(point))
    }

    pub fn to_local(&self, handle: NodeHandle, point: Vec2) -> Result<Vec2> {
        Ok(self.world_transform(handle)?.inverse().transform_point2(point))
    }

    /// World transform recomposed from local transforms alone, ignoring
    /// everything cached by the last frame.
    #[must_use]
    pub fn compute_world_transform(&self, handle: NodeHandle) -> Option<Affine2> {
        transform_system::compute_world_transform_from_scratch(&self.nodes, &self.groups, handle)
    }

    /// Bounds of the displayed subtree in the node's local space.
    pub fn local_bounds(&self, handle: NodeHandle) -> Result<Rect> {
        self.node_ref(handle)?;
        Ok(bounds::local_bounds(&self.nodes, handle))
    }

    fn node_and_group(&self, handle: NodeHandle) -> Result<(&Node, &RenderGroup)> {
        let node = self.node_ref(handle)?;
        let group = node.content_group().ok_or(StrataError::NotInRenderGroup(handle))?;
        Ok((node, self.group_ref(group)?))
    }
}
