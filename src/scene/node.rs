use bitflags::bitflags;
use glam::Affine2;
use smallvec::SmallVec;

use crate::renderer::pipe::PipeId;
use crate::renderer::texture_pool::TextureId;
use crate::scene::bounds::Rect;
use crate::scene::transform::Transform;
use crate::scene::{NodeHandle, RenderGroupHandle};
use crate::utils::color::{OPAQUE_WHITE, Tint, pack_color_alpha};

// ─── Flags ────────────────────────────────────────────────────────────────────

bitflags! {
    /// Which derived properties must be recomposed on the next propagation.
    ///
    /// Transform is always recomposed for a visited node. `TRANSFORM` only
    /// records that a transform component changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateFlags: u8 {
        const COLOR = 0b0001;
        const BLEND = 0b0010;
        const VISIBLE = 0b0100;
        const TRANSFORM = 0b1000;
    }
}

impl UpdateFlags {
    /// Bits that require colour / blend / visibility recomposition.
    pub const APPEARANCE: Self = Self::COLOR.union(Self::BLEND).union(Self::VISIBLE);

    #[inline]
    #[must_use]
    pub fn needs_appearance_update(self) -> bool {
        self.intersects(Self::APPEARANCE)
    }
}

bitflags! {
    /// Display state of a node. A node is drawn only when all three bits
    /// are set, both locally and for every ancestor in its group.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DisplayStatus: u8 {
        const RENDERABLE = 0b001;
        const VISIBLE = 0b010;
        const UNCULLED = 0b100;
    }
}

impl DisplayStatus {
    #[inline]
    #[must_use]
    pub fn is_fully_visible(self) -> bool {
        self.is_all()
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::all()
    }
}

// ─── Blend Mode ───────────────────────────────────────────────────────────────

/// Blend mode of a node. `Inherit` takes the composed mode of the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Inherit,
    Normal,
    Add,
    Multiply,
    Screen,
    Erase,
}

impl BlendMode {
    /// Composes this mode over a parent's composed mode.
    #[inline]
    #[must_use]
    pub fn resolve(self, parent: BlendMode) -> BlendMode {
        if self == BlendMode::Inherit { parent } else { self }
    }
}

// ─── View & Effects ───────────────────────────────────────────────────────────

/// The drawable part of a node.
///
/// `pipe` selects the [`RenderPipe`](crate::renderer::RenderPipe) that
/// batches this node. `did_view_update` is set when drawable data changed
/// and cleared once the pipe has been told about it.
#[derive(Debug, Clone)]
pub struct View {
    pub(crate) pipe: PipeId,
    pub(crate) texture: Option<TextureId>,
    pub(crate) bounds: Rect,
    pub(crate) did_view_update: bool,
}

impl View {
    #[must_use]
    pub fn new(pipe: PipeId) -> Self {
        Self {
            pipe,
            texture: None,
            bounds: Rect::ZERO,
            did_view_update: false,
        }
    }

    #[must_use]
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Local-space bounds of the drawable content.
    #[must_use]
    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    #[inline]
    #[must_use]
    pub fn pipe(&self) -> PipeId {
        self.pipe
    }

    #[inline]
    #[must_use]
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    #[inline]
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    #[inline]
    #[must_use]
    pub fn did_view_update(&self) -> bool {
        self.did_view_update
    }
}

/// A push/pop wrapper around a node's content (mask, filter, clip...).
///
/// `payload` is opaque to the scene graph; the effect pipe registered under
/// `pipe` interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    pub pipe: PipeId,
    pub priority: i32,
    pub payload: u64,
}

impl Effect {
    #[must_use]
    pub fn new(pipe: PipeId, payload: u64) -> Self {
        Self { pipe, priority: 0, payload }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

// ─── Node ─────────────────────────────────────────────────────────────────────

/// A scene tree entity.
///
/// # Local vs composed state
///
/// Setters on [`Scene`](crate::scene::Scene) write the *local* fields and
/// only mark the node dirty. The *group* fields are composed by the
/// [transform system](crate::scene::transform_system) relative to the root
/// of the render group the node belongs to:
///
/// | Local                 | Composed                   |
/// |-----------------------|----------------------------|
/// | `transform`           | `relative_group_transform` |
/// | `local_alpha`         | `group_alpha`              |
/// | `local_tint`          | `group_color`              |
/// | `local_blend_mode`    | `group_blend_mode`         |
/// | `local_display_status`| `global_display_status`    |
///
/// World values are obtained by combining the composed values with the
/// owning [`RenderGroup`](crate::scene::RenderGroup)'s world state.
#[derive(Debug, Clone)]
pub struct Node {
    // === Hierarchy ===
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
    pub(crate) name: Option<String>,

    // === Local State ===
    pub(crate) transform: Transform,
    pub(crate) local_alpha: f32,
    pub(crate) local_tint: Tint,
    pub(crate) local_blend_mode: BlendMode,
    pub(crate) local_display_status: DisplayStatus,
    pub(crate) z_index: i32,
    pub(crate) sortable_children: bool,
    pub(crate) sort_dirty: bool,

    // === Composed State ===
    pub(crate) relative_group_transform: Affine2,
    pub(crate) group_alpha: f32,
    pub(crate) group_color: u32,
    pub(crate) group_blend_mode: BlendMode,
    pub(crate) global_display_status: DisplayStatus,

    // === Update Tracking ===
    pub(crate) update_flags: UpdateFlags,
    pub(crate) update_tick: Option<u64>,
    /// Set while the node sits in its group's update bucket.
    pub(crate) did_change: bool,

    // === Render Group Links ===
    /// The group this node is the root of.
    pub(crate) render_group: Option<RenderGroupHandle>,
    /// The group whose buckets this node is registered in.
    pub(crate) parent_render_group: Option<RenderGroupHandle>,
    pub(crate) relative_render_group_depth: usize,

    // === Drawable ===
    pub(crate) view: Option<View>,
    pub(crate) effects: SmallVec<[Effect; 2]>,
    pub(crate) has_on_render: bool,
}

impl Node {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            name: None,

            transform: Transform::new(),
            local_alpha: 1.0,
            local_tint: Tint::WHITE,
            local_blend_mode: BlendMode::Inherit,
            local_display_status: DisplayStatus::all(),
            z_index: 0,
            sortable_children: false,
            sort_dirty: false,

            relative_group_transform: Affine2::IDENTITY,
            group_alpha: 1.0,
            group_color: Tint::WHITE.rgb(),
            group_blend_mode: BlendMode::Inherit,
            global_display_status: DisplayStatus::all(),

            update_flags: UpdateFlags::all(),
            update_tick: None,
            did_change: false,

            render_group: None,
            parent_render_group: None,
            relative_render_group_depth: 0,

            view: None,
            effects: SmallVec::new(),
            has_on_render: false,
        }
    }

    #[must_use]
    pub fn with_view(view: View) -> Self {
        let mut node = Self::new();
        node.view = Some(view);
        node
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    // ========================================================================
    // Local State
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.local_alpha
    }

    #[inline]
    #[must_use]
    pub fn tint(&self) -> Tint {
        self.local_tint
    }

    #[inline]
    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.local_blend_mode
    }

    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.local_display_status.contains(DisplayStatus::VISIBLE)
    }

    #[inline]
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.local_display_status.contains(DisplayStatus::RENDERABLE)
    }

    #[inline]
    #[must_use]
    pub fn is_culled(&self) -> bool {
        !self.local_display_status.contains(DisplayStatus::UNCULLED)
    }

    #[inline]
    #[must_use]
    pub fn local_display_status(&self) -> DisplayStatus {
        self.local_display_status
    }

    #[inline]
    #[must_use]
    pub fn z_index(&self) -> i32 {
        self.z_index
    }

    #[inline]
    #[must_use]
    pub fn sortable_children(&self) -> bool {
        self.sortable_children
    }

    // ========================================================================
    // Composed State
    // ========================================================================

    /// Transform relative to the owning group's world space.
    ///
    /// Identity for group roots, whose placement is carried by the group's
    /// own world transform.
    #[inline]
    #[must_use]
    pub fn group_transform(&self) -> Affine2 {
        if self.render_group.is_some() {
            Affine2::IDENTITY
        } else {
            self.relative_group_transform
        }
    }

    /// Transform relative to the group this node is registered in, even for
    /// group roots.
    #[inline]
    #[must_use]
    pub fn relative_group_transform(&self) -> &Affine2 {
        &self.relative_group_transform
    }

    /// Alpha relative to the owning group. `1.0` for group roots, whose
    /// alpha is folded into the group's world alpha.
    #[inline]
    #[must_use]
    pub fn group_alpha(&self) -> f32 {
        if self.render_group.is_some() { 1.0 } else { self.group_alpha }
    }

    /// Composed tint as `0xRRGGBB`. White for group roots.
    #[inline]
    #[must_use]
    pub fn group_color(&self) -> u32 {
        if self.render_group.is_some() {
            Tint::WHITE.rgb()
        } else {
            self.group_color
        }
    }

    /// Composed tint and alpha packed as `0xAARRGGBB`.
    #[inline]
    #[must_use]
    pub fn group_color_alpha(&self) -> u32 {
        if self.render_group.is_some() {
            OPAQUE_WHITE
        } else {
            pack_color_alpha(self.group_color, self.group_alpha)
        }
    }

    /// Blend mode composed up to the group root. `Inherit` means the node
    /// uses whatever mode its render group draws with.
    #[inline]
    #[must_use]
    pub fn group_blend_mode(&self) -> BlendMode {
        self.group_blend_mode
    }

    #[inline]
    #[must_use]
    pub fn global_display_status(&self) -> DisplayStatus {
        self.global_display_status
    }

    #[inline]
    #[must_use]
    pub fn is_fully_visible(&self) -> bool {
        self.global_display_status.is_fully_visible()
    }

    #[inline]
    #[must_use]
    pub fn update_flags(&self) -> UpdateFlags {
        self.update_flags
    }

    #[inline]
    #[must_use]
    pub fn update_tick(&self) -> Option<u64> {
        self.update_tick
    }

    /// `true` while the node is queued in its group's update bucket.
    #[inline]
    #[must_use]
    pub fn did_change(&self) -> bool {
        self.did_change
    }

    // ========================================================================
    // Render Group Links
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn render_group(&self) -> Option<RenderGroupHandle> {
        self.render_group
    }

    #[inline]
    #[must_use]
    pub fn parent_render_group(&self) -> Option<RenderGroupHandle> {
        self.parent_render_group
    }

    #[inline]
    #[must_use]
    pub fn is_render_group_root(&self) -> bool {
        self.render_group.is_some()
    }

    /// The group that draws this node's own view and effects.
    #[inline]
    #[must_use]
    pub fn content_group(&self) -> Option<RenderGroupHandle> {
        self.render_group.or(self.parent_render_group)
    }

    #[inline]
    #[must_use]
    pub fn relative_render_group_depth(&self) -> usize {
        self.relative_render_group_depth
    }

    // ========================================================================
    // Drawable
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn view(&self) -> Option<&View> {
        self.view.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
