//! Render Pipes
//!
//! A pipe turns nodes of one kind (sprites, meshes, text...) into batch
//! entries. Pipes are looked up by an interned name: every [`View`] carries
//! the [`PipeId`] of the pipe that owns it, and every [`Effect`] the id of
//! the effect pipe that pushes and pops it.
//!
//! [`RenderPipes`] is an explicit registry owned by the renderer, with its
//! own string interner. Independent renderers never share state.
//!
//! [`View`]: crate::scene::View
//! [`Effect`]: crate::scene::Effect

use lasso::{Rodeo, Spur};
use rustc_hash::FxHashMap;

use crate::errors::{Result, StrataError};
use crate::renderer::backend::BackendError;
use crate::renderer::instruction::{Instruction, InstructionSet};
use crate::scene::node::{Effect, Node};
use crate::scene::transform_system::RenderableUpdater;
use crate::scene::NodeHandle;

/// Interned pipe name.
pub type PipeId = Spur;

/// Batches the renderables of one node kind.
pub trait RenderPipe {
    /// Appends instructions for `node` to `set`. Defaults to one batch entry.
    fn add_renderable(
        &mut self,
        handle: NodeHandle,
        node: &Node,
        set: &mut InstructionSet,
    ) -> std::result::Result<(), BackendError> {
        if let Some(view) = node.view() {
            set.add_to_batch(view.pipe(), handle);
        }
        Ok(())
    }

    /// Refreshes the batch entry of a renderable whose composed state or
    /// view data changed.
    fn update_renderable(&mut self, handle: NodeHandle, node: &Node);

    /// Whether the existing batch entry can still absorb the node's current
    /// view data. `false` forces a rebuild of the owning group.
    fn validate_renderable(&mut self, _handle: NodeHandle, _node: &Node) -> bool {
        true
    }

    /// Releases per-renderable resources.
    fn destroy_renderable(&mut self, _handle: NodeHandle) {}
}

/// Wraps content in push / pop instructions (masks, filters, clips).
pub trait EffectPipe {
    fn push(
        &mut self,
        effect: &Effect,
        handle: NodeHandle,
        _node: &Node,
        set: &mut InstructionSet,
    ) -> std::result::Result<(), BackendError> {
        set.push(Instruction::PushEffect { pipe: effect.pipe, node: handle, effect: *effect });
        Ok(())
    }

    fn pop(
        &mut self,
        effect: &Effect,
        handle: NodeHandle,
        _node: &Node,
        set: &mut InstructionSet,
    ) -> std::result::Result<(), BackendError> {
        set.push(Instruction::PopEffect { pipe: effect.pipe, node: handle, effect: *effect });
        Ok(())
    }
}

/// Registry of renderable and effect pipes.
pub struct RenderPipes {
    names: Rodeo,
    renderables: FxHashMap<PipeId, Box<dyn RenderPipe>>,
    effects: FxHashMap<PipeId, Box<dyn EffectPipe>>,
}

impl Default for RenderPipes {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPipes {
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: Rodeo::default(),
            renderables: FxHashMap::default(),
            effects: FxHashMap::default(),
        }
    }

    /// Interns `name` without registering anything under it.
    pub fn intern(&mut self, name: &str) -> PipeId {
        self.names.get_or_intern(name)
    }

    #[must_use]
    pub fn id(&self, name: &str) -> Option<PipeId> {
        self.names.get(name)
    }

    /// Name behind `id`.
    ///
    /// # Panics
    ///
    /// If `id` was interned by a different registry.
    #[must_use]
    pub fn name(&self, id: PipeId) -> &str {
        self.names.resolve(&id)
    }

    /// Registers a renderable pipe, replacing any previous one of that name.
    pub fn register_renderable(&mut self, name: &str, pipe: impl RenderPipe + 'static) -> PipeId {
        let id = self.intern(name);
        self.renderables.insert(id, Box::new(pipe));
        id
    }

    pub fn register_effect(&mut self, name: &str, pipe: impl EffectPipe + 'static) -> PipeId {
        let id = self.intern(name);
        self.effects.insert(id, Box::new(pipe));
        id
    }

    #[must_use]
    pub fn has_renderable(&self, id: PipeId) -> bool {
        self.renderables.contains_key(&id)
    }

    fn unknown(&self, id: PipeId) -> StrataError {
        let name = self.names.try_resolve(&id).map_or_else(|| format!("{id:?}"), str::to_string);
        StrataError::UnknownPipe(name)
    }

    pub(crate) fn add_renderable(
        &mut self,
        pipe: PipeId,
        handle: NodeHandle,
        node: &Node,
        set: &mut InstructionSet,
    ) -> Result<()> {
        let Some(render_pipe) = self.renderables.get_mut(&pipe) else {
            return Err(self.unknown(pipe));
        };
        render_pipe.add_renderable(handle, node, set)?;
        Ok(())
    }

    /// An unregistered pipe cannot vouch for anything, so it fails
    /// validation and the group is rebuilt, where the error surfaces.
    pub fn validate_renderable(&mut self, handle: NodeHandle, node: &Node) -> bool {
        let Some(view) = node.view() else {
            return true;
        };
        self.renderables
            .get_mut(&view.pipe())
            .is_some_and(|pipe| pipe.validate_renderable(handle, node))
    }

    pub fn update_renderable(&mut self, handle: NodeHandle, node: &Node) {
        if let Some(view) = node.view()
            && let Some(pipe) = self.renderables.get_mut(&view.pipe())
        {
            pipe.update_renderable(handle, node);
        }
    }

    pub fn destroy_renderable(&mut self, pipe: PipeId, handle: NodeHandle) {
        if let Some(render_pipe) = self.renderables.get_mut(&pipe) {
            render_pipe.destroy_renderable(handle);
        }
    }

    pub(crate) fn push_effect(
        &mut self,
        effect: &Effect,
        handle: NodeHandle,
        node: &Node,
        set: &mut InstructionSet,
    ) -> Result<()> {
        let Some(pipe) = self.effects.get_mut(&effect.pipe) else {
            return Err(self.unknown(effect.pipe));
        };
        pipe.push(effect, handle, node, set)?;
        Ok(())
    }

    pub(crate) fn pop_effect(
        &mut self,
        effect: &Effect,
        handle: NodeHandle,
        node: &Node,
        set: &mut InstructionSet,
    ) -> Result<()> {
        let Some(pipe) = self.effects.get_mut(&effect.pipe) else {
            return Err(self.unknown(effect.pipe));
        };
        pipe.pop(effect, handle, node, set)?;
        Ok(())
    }
}

impl RenderableUpdater for RenderPipes {
    fn update_renderable(&mut self, handle: NodeHandle, node: &Node) {
        RenderPipes::update_renderable(self, handle, node);
    }
}
