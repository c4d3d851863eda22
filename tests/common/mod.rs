//! Shared test doubles: a recording backend, a recording sprite pipe, a
//! recording effect pipe and a texture pool that counts returns.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use strata::renderer::{BackendError, CacheTextureDesc, EffectPipe, GroupUniforms, RenderPipe};
use strata::scene::{Node, NodeHandle, RenderGroupHandle, ScaleMode, Scene, View};
use strata::{Instruction, InstructionSet, PipeId, PooledTextures, Rect, RenderBackend, Renderer, RendererSettings, TextureId, TexturePool};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Backend
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BuildStart(RenderGroupHandle),
    BuildEnd(RenderGroupHandle),
    Upload(RenderGroupHandle),
    PushUniforms(GroupUniforms),
    PopUniforms,
    Execute(Instruction),
    DrawCached { group: RenderGroupHandle, texture: TextureId, scale_mode: ScaleMode },
    PushTarget(TextureId),
    PopTarget,
    EndFrame,
}

#[derive(Default)]
pub struct RecordingBackend {
    pub events: Vec<Event>,
}

impl RecordingBackend {
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Batch and draw instructions executed, in order.
    pub fn executed_renderables(&self) -> Vec<NodeHandle> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Execute(instruction) => instruction.renderable(),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }
}

impl RenderBackend for RecordingBackend {
    fn build_start(&mut self, group: RenderGroupHandle, _set: &mut InstructionSet) -> Result<(), BackendError> {
        self.events.push(Event::BuildStart(group));
        Ok(())
    }

    fn build_end(&mut self, group: RenderGroupHandle, _set: &mut InstructionSet) -> Result<(), BackendError> {
        self.events.push(Event::BuildEnd(group));
        Ok(())
    }

    fn upload(&mut self, _scene: &Scene, group: RenderGroupHandle, _set: &InstructionSet) -> Result<(), BackendError> {
        self.events.push(Event::Upload(group));
        Ok(())
    }

    fn push_group_uniforms(&mut self, uniforms: &GroupUniforms) {
        self.events.push(Event::PushUniforms(*uniforms));
    }

    fn pop_group_uniforms(&mut self) {
        self.events.push(Event::PopUniforms);
    }

    fn execute(&mut self, _scene: &Scene, instruction: &Instruction) -> Result<(), BackendError> {
        self.events.push(Event::Execute(*instruction));
        Ok(())
    }

    fn draw_cached_texture(
        &mut self,
        group: RenderGroupHandle,
        texture: TextureId,
        _bounds: Rect,
        scale_mode: ScaleMode,
        _uniforms: &GroupUniforms,
    ) -> Result<(), BackendError> {
        self.events.push(Event::DrawCached { group, texture, scale_mode });
        Ok(())
    }

    fn push_render_target(&mut self, texture: TextureId, _bounds: Rect) -> Result<(), BackendError> {
        self.events.push(Event::PushTarget(texture));
        Ok(())
    }

    fn pop_render_target(&mut self) -> Result<(), BackendError> {
        self.events.push(Event::PopTarget);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.events.push(Event::EndFrame);
        Ok(())
    }
}

// ============================================================================
// Pipes
// ============================================================================

#[derive(Default)]
pub struct PipeLog {
    pub added: Vec<NodeHandle>,
    pub updated: Vec<NodeHandle>,
    pub validated: Vec<NodeHandle>,
    pub destroyed: Vec<NodeHandle>,
    /// Renderables whose batch entry is reported invalid.
    pub invalid: HashSet<NodeHandle>,
    /// Makes every `add_renderable` fail.
    pub fail_add: bool,
}

impl PipeLog {
    pub fn clear(&mut self) {
        self.added.clear();
        self.updated.clear();
        self.validated.clear();
        self.destroyed.clear();
    }
}

pub struct TestPipe {
    pub log: Rc<RefCell<PipeLog>>,
}

impl RenderPipe for TestPipe {
    fn add_renderable(&mut self, handle: NodeHandle, node: &Node, set: &mut InstructionSet) -> Result<(), BackendError> {
        let mut log = self.log.borrow_mut();
        if log.fail_add {
            return Err("batcher out of space".into());
        }
        log.added.push(handle);
        if let Some(view) = node.view() {
            set.add_to_batch(view.pipe(), handle);
        }
        Ok(())
    }

    fn update_renderable(&mut self, handle: NodeHandle, _node: &Node) {
        self.log.borrow_mut().updated.push(handle);
    }

    fn validate_renderable(&mut self, handle: NodeHandle, _node: &Node) -> bool {
        let mut log = self.log.borrow_mut();
        log.validated.push(handle);
        !log.invalid.contains(&handle)
    }

    fn destroy_renderable(&mut self, handle: NodeHandle) {
        self.log.borrow_mut().destroyed.push(handle);
    }
}

/// Effect pipe relying on the default push / pop instructions.
pub struct MaskPipe;

impl EffectPipe for MaskPipe {}

// ============================================================================
// Texture Pool
// ============================================================================

#[derive(Default)]
pub struct CountingPool {
    pub inner: PooledTextures,
    pub acquired: Vec<TextureId>,
    pub returned: Vec<TextureId>,
}

impl CountingPool {
    pub fn returned_count(&self, texture: TextureId) -> usize {
        self.returned.iter().filter(|&&t| t == texture).count()
    }
}

impl TexturePool for CountingPool {
    fn get_optimal_texture(&mut self, desc: &CacheTextureDesc) -> Result<TextureId, BackendError> {
        let texture = self.inner.get_optimal_texture(desc)?;
        self.acquired.push(texture);
        Ok(texture)
    }

    fn return_texture(&mut self, texture: TextureId) {
        self.returned.push(texture);
        self.inner.return_texture(texture);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub renderer: Renderer<RecordingBackend, CountingPool>,
    pub scene: Scene,
    pub sprite: PipeId,
    pub mask: PipeId,
    pub log: Rc<RefCell<PipeLog>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(RendererSettings::default())
    }

    pub fn with_settings(settings: RendererSettings) -> Self {
        init_logger();
        let log = Rc::new(RefCell::new(PipeLog::default()));
        let mut renderer = Renderer::with_settings(RecordingBackend::default(), CountingPool::default(), settings);
        let sprite = renderer.pipes_mut().register_renderable("sprite", TestPipe { log: Rc::clone(&log) });
        let mask = renderer.pipes_mut().register_effect("mask", MaskPipe);
        Self { renderer, scene: Scene::new(), sprite, mask, log }
    }

    pub fn sprite(&mut self) -> NodeHandle {
        self.scene.create_view_node(View::new(self.sprite).with_bounds(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)))
    }

    /// Creates a sprite and appends it to `parent`.
    pub fn sprite_under(&mut self, parent: NodeHandle) -> NodeHandle {
        let sprite = self.sprite();
        self.scene.add_child(parent, sprite).unwrap();
        sprite
    }

    pub fn container_under(&mut self, parent: NodeHandle) -> NodeHandle {
        let node = self.scene.create_node();
        self.scene.add_child(parent, node).unwrap();
        node
    }

    pub fn render(&mut self, root: NodeHandle) -> strata::renderer::FrameStats {
        self.renderer.render(&mut self.scene, root).unwrap()
    }

    /// Renders and forgets everything recorded so far.
    pub fn settle(&mut self, root: NodeHandle) {
        self.render(root);
        self.renderer.backend_mut().clear();
        self.log.borrow_mut().clear();
    }

    pub fn events(&self) -> &[Event] {
        &self.renderer.backend().events
    }

    pub fn group_of(&self, node: NodeHandle) -> RenderGroupHandle {
        self.scene.node(node).unwrap().render_group().unwrap()
    }
}
