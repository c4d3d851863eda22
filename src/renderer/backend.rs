//! Render Backend Contract
//!
//! The core never talks to a GPU. Everything that would touch one goes
//! through [`RenderBackend`], which receives instruction sets to upload and
//! execute, group uniforms, and offscreen render targets for cached groups.
//!
//! ```text
//!  build_start ─► (set_blend_mode / pipe instructions)* ─► build_end
//!  upload
//!  push_group_uniforms ─► execute* ─► pop_group_uniforms
//!  push_render_target ─► ... ─► pop_render_target     (cached groups only)
//!  end_frame
//! ```
//!
//! Every hook except [`execute`](RenderBackend::execute) has a default so a
//! backend only implements what it needs.

use glam::Affine2;

use crate::renderer::instruction::{Instruction, InstructionSet};
use crate::renderer::texture_pool::TextureId;
use crate::scene::bounds::Rect;
use crate::scene::node::BlendMode;
use crate::scene::{NodeHandle, RenderGroupHandle, ScaleMode, Scene};
use crate::utils::color::premultiplied_rgba;

/// Error raised by a backend or pipe. Propagated unchanged.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Uniforms bound for the duration of one render group's execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupUniforms {
    pub world_transform: Affine2,
    /// Tint and alpha as `0xAARRGGBB`.
    pub world_color_alpha: u32,
}

impl GroupUniforms {
    #[must_use]
    pub fn premultiplied_color(&self) -> [f32; 4] {
        premultiplied_rgba(self.world_color_alpha)
    }
}

pub trait RenderBackend {
    /// Called before a render group's instructions are rebuilt.
    fn build_start(&mut self, _group: RenderGroupHandle, _set: &mut InstructionSet) -> Result<(), BackendError> {
        Ok(())
    }

    /// Called after a successful rebuild, before the set is published.
    fn build_end(&mut self, _group: RenderGroupHandle, _set: &mut InstructionSet) -> Result<(), BackendError> {
        Ok(())
    }

    /// Records a blend change in front of `node`'s renderable.
    fn set_blend_mode(
        &mut self,
        _node: NodeHandle,
        mode: BlendMode,
        set: &mut InstructionSet,
    ) -> Result<(), BackendError> {
        set.push(Instruction::BlendMode(mode));
        Ok(())
    }

    /// Uploads batched data for a group after it was reconciled.
    fn upload(&mut self, _scene: &Scene, _group: RenderGroupHandle, _set: &InstructionSet) -> Result<(), BackendError> {
        Ok(())
    }

    fn push_group_uniforms(&mut self, _uniforms: &GroupUniforms) {}

    fn pop_group_uniforms(&mut self) {}

    /// Executes one instruction. Nested render groups are resolved by the
    /// frame driver and never reach the backend.
    fn execute(&mut self, scene: &Scene, instruction: &Instruction) -> Result<(), BackendError>;

    /// Draws the texture of a cached group in place of its instructions,
    /// sampled with `scale_mode`.
    fn draw_cached_texture(
        &mut self,
        _group: RenderGroupHandle,
        _texture: TextureId,
        _bounds: Rect,
        _scale_mode: ScaleMode,
        _uniforms: &GroupUniforms,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn push_render_target(&mut self, _texture: TextureId, _bounds: Rect) -> Result<(), BackendError> {
        Ok(())
    }

    fn pop_render_target(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
