//! Render Group System
//!
//! The per-frame driver. One call to [`RenderGroupSystem::render`] takes a
//! scene from "mutated since last frame" to "executed on the backend".
//!
//! # Frame Sequence
//!
//! ```text
//! 1. frame start     return retired cache textures
//!                    destroy renderables of removed views
//! 2. cache prepass   link groups to their nearest cache, acquire textures
//! 3. update pass     for each group, parent before children:
//!                      on-render hooks
//!                      validate (only if structure unchanged)
//!                      propagate transforms
//!                      rebuild or flush view updates
//!                      upload
//! 4. cache render    stale cached groups into their textures, deepest first
//! 5. execution       root group, recursing on RenderGroup instructions
//! 6. frame end       renderable GC, backend end_frame
//! ```

use crate::errors::Result;
use crate::renderer::backend::{GroupUniforms, RenderBackend};
use crate::renderer::builder::{BuildContext, build_instructions};
use crate::renderer::cache::{texture_space_uniforms, update_cached_groups};
use crate::renderer::gc::RenderableGc;
use crate::renderer::instruction::Instruction;
use crate::renderer::pipe::{PipeId, RenderPipes};
use crate::renderer::settings::RendererSettings;
use crate::renderer::texture_pool::TexturePool;
use crate::renderer::validate::{clear_renderables, update_renderables, validate_renderables};
use crate::scene::transform_system::update_render_group_transform;
use crate::scene::{NodeHandle, RenderGroupHandle, Scene};

/// Counters for one rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub groups_processed: usize,
    /// Groups whose instructions were rebuilt.
    pub rebuilds: usize,
    /// Groups reconciled without a rebuild.
    pub fast_paths: usize,
    pub renderables_updated: usize,
    pub instructions_executed: usize,
    pub cache_textures_rendered: usize,
}

/// Borrowed renderer subsystems for the duration of one frame.
pub(crate) struct RenderContext<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub pipes: &'a mut RenderPipes,
    pub textures: &'a mut dyn TexturePool,
    pub gc: &'a mut dyn RenderableGc,
    pub settings: &'a RendererSettings,
}

/// Frame driver state. Holds only scratch buffers reused across frames.
#[derive(Debug, Default)]
pub struct RenderGroupSystem {
    /// Groups visited by the update pass, in visiting order.
    frame_groups: Vec<RenderGroupHandle>,
    stack: Vec<RenderGroupHandle>,
    hooks: Vec<NodeHandle>,
    expired: Vec<(NodeHandle, PipeId)>,
}

impl RenderGroupSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups visited by the last update pass, parents before children.
    #[must_use]
    pub fn frame_groups(&self) -> &[RenderGroupHandle] {
        &self.frame_groups
    }

    pub(crate) fn render(&mut self, scene: &mut Scene, root: NodeHandle, cx: &mut RenderContext<'_>) -> Result<FrameStats> {
        let mut stats = FrameStats::default();
        let root_group = scene.enable_render_group(root)?;

        self.start_frame(scene, cx);
        update_cached_groups(scene, root_group, cx.textures, cx.settings)?;
        self.update_groups(scene, root_group, cx, &mut stats)?;
        self.render_cached_textures(scene, cx, &mut stats)?;

        execute_group(scene, root_group, None, cx, &mut stats)?;

        self.end_frame(scene, cx)?;
        log::trace!("frame done: {stats:?}");
        Ok(stats)
    }

    fn start_frame(&mut self, scene: &mut Scene, cx: &mut RenderContext<'_>) {
        for texture in scene.retired_textures.drain(..) {
            cx.textures.return_texture(texture);
        }
        for (node, pipe) in scene.destroyed_renderables.drain(..) {
            cx.pipes.destroy_renderable(pipe, node);
            cx.gc.forget(node);
        }
    }

    fn update_groups(
        &mut self,
        scene: &mut Scene,
        root_group: RenderGroupHandle,
        cx: &mut RenderContext<'_>,
        stats: &mut FrameStats,
    ) -> Result<()> {
        self.frame_groups.clear();
        self.stack.clear();
        self.stack.push(root_group);

        while let Some(group) = self.stack.pop() {
            self.run_hooks(scene, group);
            if !scene.groups.contains_key(group) {
                continue;
            }
            self.frame_groups.push(group);
            stats.groups_processed += 1;

            {
                let render_group = &mut scene.groups[group];
                if !render_group.structure_did_change && validate_renderables(&scene.nodes, render_group, cx.pipes) {
                    log::trace!("render group {group:?} failed validation");
                }
            }

            stats.renderables_updated +=
                update_render_group_transform(&mut scene.nodes, &mut scene.groups, group, cx.pipes);

            if scene.groups[group].structure_did_change {
                let base_blend = scene.render_group_blend_mode(group);
                let mut build = BuildContext { pipes: &mut *cx.pipes, backend: &mut *cx.backend, gc: &mut *cx.gc, base_blend };
                build_instructions(&mut scene.nodes, &mut scene.groups[group], group, &mut build)?;
                clear_renderables(&mut scene.nodes, &mut scene.groups[group]);
                stats.rebuilds += 1;
            } else {
                stats.renderables_updated += update_renderables(&mut scene.nodes, &mut scene.groups[group], cx.pipes);
                stats.fast_paths += 1;
            }

            let render_group = &scene.groups[group];
            cx.backend.upload(scene, group, render_group.instruction_set())?;

            let cache_is_fresh = render_group.cache.enabled
                && render_group.cache.texture.is_some()
                && !render_group.cache.needs_update;
            if !cache_is_fresh {
                self.stack.extend(render_group.children.iter().rev().copied());
            }
        }
        Ok(())
    }

    fn run_hooks(&mut self, scene: &mut Scene, group: RenderGroupHandle) {
        let Some(render_group) = scene.groups.get(group) else {
            return;
        };
        self.hooks.clear();
        self.hooks.extend_from_slice(&render_group.on_render_nodes);
        for &node in &self.hooks {
            scene.run_on_render(node);
        }
    }

    fn render_cached_textures(
        &mut self,
        scene: &mut Scene,
        cx: &mut RenderContext<'_>,
        stats: &mut FrameStats,
    ) -> Result<()> {
        // Reverse visiting order puts descendants before their ancestors.
        for &group in self.frame_groups.iter().rev() {
            let Some(render_group) = scene.groups.get(group) else {
                continue;
            };
            if !render_group.cache.enabled || !render_group.cache.needs_update {
                continue;
            }
            let Some(texture) = render_group.cache.texture else {
                continue;
            };

            cx.backend.push_render_target(texture, render_group.cache.texture_bounds)?;
            execute_group(scene, group, Some(group), cx, stats)?;
            cx.backend.pop_render_target()?;

            scene.groups[group].cache.needs_update = false;
            stats.cache_textures_rendered += 1;
            log::debug!("cache texture {texture:?} of render group {group:?} redrawn");
        }
        Ok(())
    }

    fn end_frame(&mut self, scene: &mut Scene, cx: &mut RenderContext<'_>) -> Result<()> {
        self.expired.clear();
        cx.gc.collect(&mut self.expired);
        for &(node, pipe) in &self.expired {
            cx.pipes.destroy_renderable(pipe, node);
            // Re-added by the rebuild if it is still part of the tree.
            let group = scene.render_group_of(node);
            if let Some(render_group) = group.and_then(|group| scene.groups.get_mut(group)) {
                render_group.structure_did_change = true;
            }
        }
        cx.backend.end_frame()?;
        Ok(())
    }
}

/// Executes `group`. `target` is the cached group whose texture is being
/// drawn into, if any.
fn execute_group(
    scene: &Scene,
    group: RenderGroupHandle,
    target: Option<RenderGroupHandle>,
    cx: &mut RenderContext<'_>,
    stats: &mut FrameStats,
) -> Result<()> {
    let Some(render_group) = scene.groups.get(group) else {
        return Ok(());
    };
    if !render_group.is_renderable(&scene.nodes) {
        return Ok(());
    }

    let uniforms = match target {
        Some(target) => texture_space_uniforms(scene, group, target),
        None => Some(GroupUniforms {
            world_transform: render_group.world_transform,
            world_color_alpha: render_group.world_color_alpha(),
        }),
    };
    let Some(uniforms) = uniforms else {
        return Ok(());
    };

    if target != Some(group)
        && render_group.cache.enabled
        && let Some(texture) = render_group.cache.texture
    {
        let cache = &render_group.cache;
        cx.backend.draw_cached_texture(group, texture, cache.texture_bounds, cache.scale_mode, &uniforms)?;
        stats.instructions_executed += 1;
        return Ok(());
    }

    cx.backend.push_group_uniforms(&uniforms);
    for instruction in render_group.instruction_set() {
        if let Instruction::RenderGroup(child) = *instruction {
            execute_group(scene, child, target, cx, stats)?;
            continue;
        }
        cx.backend.execute(scene, instruction)?;
        if let Some(node) = instruction.renderable() {
            cx.gc.mark_used(node);
        }
        stats.instructions_executed += 1;
    }
    cx.backend.pop_group_uniforms();
    Ok(())
}
