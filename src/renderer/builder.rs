//! Instruction Builder
//!
//! Regenerates a render group's [`InstructionSet`] from scratch with a
//! depth-first walk of its subtree.
//!
//! ```text
//! node ──► push effects (forward)
//!      ──► blend change? ──► pipe.add_renderable ──► gc.add_renderable
//!      ──► children (z-sorted if sortable)
//!      ──► pop effects (reverse)
//!
//! nested group root ──► Instruction::RenderGroup, no descent
//! hidden node       ──► skipped with its subtree
//! ```
//!
//! The build writes into the group's scratch set and is swapped in only on
//! success, so a failing pipe or backend leaves the previous frame's
//! instructions in place.

use std::mem;

use slotmap::SlotMap;

use crate::errors::Result;
use crate::renderer::backend::RenderBackend;
use crate::renderer::gc::RenderableGc;
use crate::renderer::instruction::{Instruction, InstructionSet};
use crate::renderer::pipe::RenderPipes;
use crate::scene::node::{BlendMode, Node};
use crate::scene::render_group::RenderGroup;
use crate::scene::{NodeHandle, RenderGroupHandle};

/// Collaborators an instruction build talks to.
pub(crate) struct BuildContext<'a> {
    pub pipes: &'a mut RenderPipes,
    pub backend: &'a mut dyn RenderBackend,
    pub gc: &'a mut dyn RenderableGc,
    /// Mode that `Inherit` content of this group resolves to.
    pub base_blend: BlendMode,
}

struct Collector<'a, 'b> {
    nodes: &'a mut SlotMap<NodeHandle, Node>,
    cx: &'a mut BuildContext<'b>,
    set: &'a mut InstructionSet,
    active_blend: Option<BlendMode>,
}

/// Rebuilds the instruction set of `group`.
///
/// On success the new set is published and `structure_did_change` cleared.
/// Returns the number of renderables emitted.
pub(crate) fn build_instructions(
    nodes: &mut SlotMap<NodeHandle, Node>,
    group: &mut RenderGroup,
    handle: RenderGroupHandle,
    cx: &mut BuildContext<'_>,
) -> Result<usize> {
    let mut set = mem::take(&mut group.scratch_set);
    set.reset();

    match build_into(nodes, group.root, handle, cx, &mut set) {
        Ok(()) => {
            mem::swap(&mut group.instruction_set, &mut set);
            group.scratch_set = set;
            group.structure_did_change = false;
            let count = group.instruction_set.renderable_count();
            log::debug!(
                "render group {handle:?} rebuilt: {} instructions, {count} renderables",
                group.instruction_set.len()
            );
            Ok(count)
        }
        Err(err) => {
            set.reset();
            group.scratch_set = set;
            log::debug!("render group {handle:?} rebuild failed; keeping previous instructions");
            Err(err)
        }
    }
}

fn build_into(
    nodes: &mut SlotMap<NodeHandle, Node>,
    root: NodeHandle,
    handle: RenderGroupHandle,
    cx: &mut BuildContext<'_>,
    set: &mut InstructionSet,
) -> Result<()> {
    cx.backend.build_start(handle, set)?;
    {
        let mut collector = Collector { nodes, cx: &mut *cx, set: &mut *set, active_blend: None };
        // The root's own display state gates the whole group at execution.
        collector.collect_with_effects(root)?;
    }
    cx.backend.build_end(handle, set)?;
    Ok(())
}

impl Collector<'_, '_> {
    fn collect_child(&mut self, handle: NodeHandle) -> Result<()> {
        let Some(node) = self.nodes.get(handle) else {
            return Ok(());
        };
        if !node.is_fully_visible() {
            return Ok(());
        }
        if let Some(group) = node.render_group {
            self.set.push(Instruction::RenderGroup(group));
            self.active_blend = None;
            return Ok(());
        }
        self.collect_with_effects(handle)
    }

    fn collect_with_effects(&mut self, handle: NodeHandle) -> Result<()> {
        let Some(node) = self.nodes.get(handle) else {
            return Ok(());
        };
        if node.effects.is_empty() {
            return self.collect_simple(handle);
        }

        let effects = node.effects.clone();
        for effect in &effects {
            self.cx.pipes.push_effect(effect, handle, &self.nodes[handle], self.set)?;
            self.active_blend = None;
        }
        self.collect_simple(handle)?;
        for effect in effects.iter().rev() {
            self.cx.pipes.pop_effect(effect, handle, &self.nodes[handle], self.set)?;
            self.active_blend = None;
        }
        Ok(())
    }

    fn collect_simple(&mut self, handle: NodeHandle) -> Result<()> {
        self.sort_children(handle);

        let Some(node) = self.nodes.get(handle) else {
            return Ok(());
        };
        if let Some(pipe) = node.view.as_ref().map(|view| view.pipe) {
            let mode = node.group_blend_mode.resolve(self.cx.base_blend);
            if self.active_blend != Some(mode) {
                self.cx.backend.set_blend_mode(handle, mode, self.set)?;
                self.active_blend = Some(mode);
            }
            self.cx.pipes.add_renderable(pipe, handle, node, self.set)?;
            self.cx.gc.add_renderable(handle, pipe);
            if let Some(view) = self.nodes.get_mut(handle).and_then(|node| node.view.as_mut()) {
                view.did_view_update = false;
            }
        }

        let mut index = 0;
        while let Some(&child) = self.nodes.get(handle).and_then(|node| node.children.get(index)) {
            self.collect_child(child)?;
            index += 1;
        }
        Ok(())
    }

    /// Stable z-index sort, only when the order is known to be stale.
    fn sort_children(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if !(node.sortable_children && node.sort_dirty) {
            return;
        }
        node.sort_dirty = false;
        let mut children = mem::take(&mut node.children);

        let nodes = &*self.nodes;
        children.sort_by_key(|&child| nodes.get(child).map_or(0, Node::z_index));

        if let Some(node) = self.nodes.get_mut(handle) {
            node.children = children;
        }
    }
}
