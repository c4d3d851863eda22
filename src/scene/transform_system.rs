//! Transform System
//!
//! Turns one render group's pending-update buckets into authoritative
//! composed state. Like the rest of the systems it borrows only the node
//! and group slot maps, never the whole [`Scene`](crate::scene::Scene).
//!
//! # Algorithm
//!
//! 1. Recompose the group's world transform / colour / alpha from its root
//!    and its parent group (or from the root's local state if top-level).
//! 2. Bump `update_tick`.
//! 3. Walk the depth buckets in ascending order. Each pending node not yet
//!    visited this tick has its transform recomposed and, when its own or an
//!    inherited update flag asks for it, its colour / blend / visibility.
//!    The walk continues into children but stops at nested group roots.
//! 4. Drawable nodes reached while the group's structure is unchanged are
//!    pushed straight to their pipe (fast path).
//!
//! Buckets are cleared in place so their storage is reused next frame.

use std::mem;

use glam::Affine2;
use slotmap::SlotMap;

use crate::scene::node::{BlendMode, DisplayStatus, Node, UpdateFlags};
use crate::scene::render_group::RenderGroup;
use crate::scene::{NodeHandle, RenderGroupHandle};
use crate::utils::color::{clamp_alpha, multiply_colors};

/// Receives drawable nodes whose composed state changed without a
/// structural change.
pub trait RenderableUpdater {
    fn update_renderable(&mut self, handle: NodeHandle, node: &Node);
}

/// Composed appearance of a parent, as seen by its children.
#[derive(Debug, Clone, Copy)]
struct Composed {
    color: u32,
    alpha: f32,
    blend: BlendMode,
    display: DisplayStatus,
}

impl Composed {
    /// What the direct children of a group root compose against. Blend is
    /// left unresolved; the builder resolves it against the group's own.
    const NEUTRAL: Self = Self {
        color: 0xFF_FFFF,
        alpha: 1.0,
        blend: BlendMode::Inherit,
        display: DisplayStatus::all(),
    };

    fn of(node: &Node) -> Self {
        Self {
            color: node.group_color,
            alpha: node.group_alpha,
            blend: node.group_blend_mode,
            display: node.global_display_status,
        }
    }
}

fn compose_appearance(node: &mut Node, parent: &Composed, flags: UpdateFlags) {
    if flags.contains(UpdateFlags::COLOR) {
        node.group_color = multiply_colors(node.local_tint.rgb(), parent.color);
        node.group_alpha = clamp_alpha(node.local_alpha * parent.alpha);
    }
    if flags.contains(UpdateFlags::BLEND) {
        node.group_blend_mode = node.local_blend_mode.resolve(parent.blend);
    }
    if flags.contains(UpdateFlags::VISIBLE) {
        node.global_display_status = node.local_display_status & parent.display;
    }
}

/// Runs one propagation pass for `group`.
///
/// Returns the number of renderables pushed to `updater`.
pub fn update_render_group_transform(
    nodes: &mut SlotMap<NodeHandle, Node>,
    groups: &mut SlotMap<RenderGroupHandle, RenderGroup>,
    group: RenderGroupHandle,
    updater: &mut dyn RenderableUpdater,
) -> usize {
    let Some(render_group) = groups.get(group) else {
        return 0;
    };
    let root = render_group.root;
    let parent_world = render_group
        .parent
        .and_then(|parent| groups.get(parent))
        .map(|parent| (parent.world_transform, parent.world_color, parent.world_alpha));

    let Some(root_node) = nodes.get_mut(root) else {
        log::warn!("render group {group:?} has no root node; skipped");
        return 0;
    };

    let (world_transform, world_color, world_alpha) = match parent_world {
        Some((transform, color, alpha)) => (
            transform * root_node.relative_group_transform,
            multiply_colors(root_node.group_color, color),
            root_node.group_alpha * alpha,
        ),
        None => {
            // Top-level roots are never queued anywhere; compose them here.
            root_node.transform.update_local_matrix();
            root_node.relative_group_transform = *root_node.transform.local_matrix();
            let flags = root_node.update_flags;
            if flags.needs_appearance_update() {
                compose_appearance(root_node, &Composed::NEUTRAL, flags);
            }
            root_node.update_flags = UpdateFlags::empty();
            root_node.did_change = false;
            (
                root_node.relative_group_transform,
                root_node.local_tint.rgb(),
                root_node.local_alpha,
            )
        }
    };

    let render_group = &mut groups[group];
    render_group.world_transform = world_transform;
    render_group.world_color = world_color;
    render_group.world_alpha = clamp_alpha(world_alpha);
    render_group.update_tick += 1;
    render_group.invalidate_matrices();

    let tick = render_group.update_tick;
    let structure_did_change = render_group.structure_did_change;
    let mut buckets = mem::take(&mut render_group.children_to_update);

    let mut updated = 0;
    let mut stack: Vec<(NodeHandle, UpdateFlags)> = Vec::with_capacity(64);

    for (depth, bucket) in buckets.iter_mut().enumerate() {
        for handle in bucket.drain(..) {
            let stale = nodes.get(handle).is_none_or(|node| {
                node.parent_render_group != Some(group) || node.relative_render_group_depth != depth
            });
            debug_assert!(!stale, "stale entry {handle:?} in bucket {depth} of {group:?}");
            if stale {
                log::warn!("stale entry {handle:?} in bucket {depth} of {group:?}; skipped");
                continue;
            }

            stack.push((handle, UpdateFlags::empty()));
            updated += update_transform_and_children(nodes, &mut stack, tick, structure_did_change, updater);
        }
    }

    // Hand the drained buckets back so their storage is reused.
    groups[group].children_to_update = buckets;

    updated
}

/// Drains `stack`, recomposing each node against its already-current parent.
fn update_transform_and_children(
    nodes: &mut SlotMap<NodeHandle, Node>,
    stack: &mut Vec<(NodeHandle, UpdateFlags)>,
    tick: u64,
    structure_did_change: bool,
    updater: &mut dyn RenderableUpdater,
) -> usize {
    let mut updated = 0;

    while let Some((handle, inherited)) = stack.pop() {
        let Some(node) = nodes.get(handle) else {
            continue;
        };
        if node.update_tick == Some(tick) {
            continue;
        }

        // Children of a group root compose against identity.
        let parent_state = node
            .parent
            .and_then(|parent| nodes.get(parent))
            .filter(|parent| parent.render_group.is_none())
            .map(|parent| (parent.relative_group_transform, Composed::of(parent)));

        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };
        node.update_tick = Some(tick);
        node.did_change = false;
        node.transform.update_local_matrix();
        let local = *node.transform.local_matrix();

        let flags = match parent_state {
            Some((parent_transform, parent)) => {
                let flags = inherited | node.update_flags;
                node.relative_group_transform = parent_transform * local;
                if flags.needs_appearance_update() {
                    compose_appearance(node, &parent, flags);
                }
                flags
            }
            None => {
                let flags = node.update_flags;
                node.relative_group_transform = local;
                if flags.needs_appearance_update() {
                    compose_appearance(node, &Composed::NEUTRAL, flags);
                }
                flags
            }
        };
        node.update_flags = UpdateFlags::empty();

        if node.render_group.is_some() {
            continue;
        }

        for &child in node.children.iter().rev() {
            stack.push((child, flags));
        }

        if !structure_did_change
            && node.global_display_status.is_fully_visible()
            && let Some(view) = node.view.as_mut()
        {
            view.did_view_update = false;
            updater.update_renderable(handle, node);
            updated += 1;
        }
    }

    updated
}

/// Composes the world transform of `node` from scratch by walking up to its
/// group root. Used to cross-check incremental propagation.
#[must_use]
pub fn compute_world_transform_from_scratch(
    nodes: &SlotMap<NodeHandle, Node>,
    groups: &SlotMap<RenderGroupHandle, RenderGroup>,
    node: NodeHandle,
) -> Option<Affine2> {
    let mut chain = Affine2::IDENTITY;
    let mut current = node;

    loop {
        let current_node = nodes.get(current)?;
        if let Some(group) = current_node.render_group {
            return Some(group_world_from_scratch(nodes, groups, group)? * chain);
        }
        chain = current_node.transform.compute_matrix() * chain;
        current = current_node.parent?;
    }
}

fn group_world_from_scratch(
    nodes: &SlotMap<NodeHandle, Node>,
    groups: &SlotMap<RenderGroupHandle, RenderGroup>,
    group: RenderGroupHandle,
) -> Option<Affine2> {
    let render_group = groups.get(group)?;
    let root = nodes.get(render_group.root)?;
    let local = root.transform.compute_matrix();
    match root.parent {
        Some(parent) if render_group.parent.is_some() => {
            Some(compute_world_transform_from_scratch(nodes, groups, parent)? * local)
        }
        _ => Some(local),
    }
}
