//! Renderable Validation
//!
//! The fast path for a group whose tree shape did not change. Only nodes
//! queued on the group's view-update list are looked at.

use slotmap::SlotMap;

use crate::renderer::pipe::RenderPipes;
use crate::scene::NodeHandle;
use crate::scene::node::Node;
use crate::scene::render_group::RenderGroup;
use crate::scene::transform_system::RenderableUpdater;

/// Asks each queued renderable's pipe whether its batch entry still holds.
///
/// Stops at the first rejection, flags the group for a structural rebuild
/// and returns `true`. The list itself is left for the caller to clear.
pub(crate) fn validate_renderables(
    nodes: &SlotMap<NodeHandle, Node>,
    group: &mut RenderGroup,
    pipes: &mut RenderPipes,
) -> bool {
    for &handle in &group.renderables_to_update {
        let Some(node) = nodes.get(handle) else {
            continue;
        };
        if !pipes.validate_renderable(handle, node) {
            log::trace!("renderable {handle:?} rejected its batch entry");
            group.structure_did_change = true;
            return true;
        }
    }
    false
}

/// Flushes queued renderables that propagation has not already refreshed.
///
/// Returns the number of renderables updated. The list is emptied.
pub(crate) fn update_renderables(
    nodes: &mut SlotMap<NodeHandle, Node>,
    group: &mut RenderGroup,
    updater: &mut dyn RenderableUpdater,
) -> usize {
    let mut updated = 0;
    for handle in group.renderables_to_update.drain(..) {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };
        let visible = node.is_fully_visible();
        let Some(view) = node.view.as_mut() else {
            continue;
        };
        if !view.did_view_update {
            continue;
        }
        view.did_view_update = false;
        // Hidden renderables are re-added by the rebuild that shows them.
        if visible {
            updater.update_renderable(handle, node);
            updated += 1;
        }
    }
    updated
}

/// Empties the view-update list after a rebuild, so every queued node can
/// be queued again.
pub(crate) fn clear_renderables(nodes: &mut SlotMap<NodeHandle, Node>, group: &mut RenderGroup) {
    for handle in group.renderables_to_update.drain(..) {
        if let Some(view) = nodes.get_mut(handle).and_then(|node| node.view.as_mut()) {
            view.did_view_update = false;
        }
    }
}
