//! Renderer
//!
//! Turns a [`Scene`] into backend work once per frame.
//!
//! # Module Structure
//!
//! | Module          | Responsibility                                      |
//! |-----------------|-----------------------------------------------------|
//! | `backend`       | [`RenderBackend`] contract, group uniforms          |
//! | `pipe`          | [`RenderPipe`] / [`EffectPipe`] and their registry  |
//! | `instruction`   | [`InstructionSet`] produced per render group        |
//! | `builder`       | Full instruction rebuild                            |
//! | `validate`      | Fast-path renderable validation and flush           |
//! | `cache`         | Cache-as-texture bookkeeping                        |
//! | `texture_pool`  | Offscreen texture pooling                           |
//! | `gc`            | Release of long-unused renderables                  |
//! | `system`        | Frame driver                                        |
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut renderer = Renderer::new(MyBackend::default());
//! let sprite = renderer.pipes_mut().register_renderable("sprite", SpritePipe::default());
//!
//! let mut scene = Scene::new();
//! let stage = scene.create_node();
//! let bunny = scene.create_view_node(View::new(sprite));
//! scene.add_child(stage, bunny)?;
//!
//! loop {
//!     scene.set_rotation(bunny, t)?;
//!     let stats = renderer.render(&mut scene, stage)?;
//! }
//! ```

pub mod backend;
pub(crate) mod builder;
pub(crate) mod cache;
pub mod gc;
pub mod instruction;
pub mod pipe;
pub mod settings;
pub mod system;
pub mod texture_pool;
pub(crate) mod validate;

pub use backend::{BackendError, GroupUniforms, RenderBackend};
pub use gc::{RenderableGc, RenderableGcSystem};
pub use instruction::{Instruction, InstructionSet};
pub use pipe::{EffectPipe, PipeId, RenderPipe, RenderPipes};
pub use settings::{RenderableGcSettings, RendererSettings};
pub use system::{FrameStats, RenderGroupSystem};
pub use texture_pool::{CacheTextureDesc, PooledTextures, TextureId, TexturePool};

use crate::errors::Result;
use crate::scene::{NodeHandle, Scene};

use self::system::RenderContext;

/// Owns everything a frame needs besides the scene itself.
pub struct Renderer<B: RenderBackend, P: TexturePool = PooledTextures> {
    backend: B,
    pipes: RenderPipes,
    textures: P,
    gc: RenderableGcSystem,
    system: RenderGroupSystem,
    settings: RendererSettings,
    frame: u64,
    last_stats: FrameStats,
}

impl<B: RenderBackend> Renderer<B, PooledTextures> {
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, PooledTextures::new(), RendererSettings::default())
    }
}

impl<B: RenderBackend, P: TexturePool> Renderer<B, P> {
    pub fn with_settings(backend: B, textures: P, settings: RendererSettings) -> Self {
        Self {
            backend,
            pipes: RenderPipes::new(),
            textures,
            gc: RenderableGcSystem::new(settings.renderable_gc),
            system: RenderGroupSystem::new(),
            settings,
            frame: 0,
            last_stats: FrameStats::default(),
        }
    }

    /// Renders the subtree of `root`, promoting it to a render group if
    /// needed.
    pub fn render(&mut self, scene: &mut Scene, root: NodeHandle) -> Result<FrameStats> {
        let mut cx = RenderContext {
            backend: &mut self.backend,
            pipes: &mut self.pipes,
            textures: &mut self.textures,
            gc: &mut self.gc,
            settings: &self.settings,
        };
        let stats = self.system.render(scene, root, &mut cx)?;
        self.frame += 1;
        self.last_stats = stats;
        Ok(stats)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    #[must_use]
    pub fn pipes(&self) -> &RenderPipes {
        &self.pipes
    }

    #[inline]
    pub fn pipes_mut(&mut self) -> &mut RenderPipes {
        &mut self.pipes
    }

    #[inline]
    #[must_use]
    pub fn textures(&self) -> &P {
        &self.textures
    }

    #[inline]
    pub fn textures_mut(&mut self) -> &mut P {
        &mut self.textures
    }

    #[inline]
    #[must_use]
    pub fn gc(&self) -> &RenderableGcSystem {
        &self.gc
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn system(&self) -> &RenderGroupSystem {
        &self.system
    }

    /// Frames rendered successfully.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    #[must_use]
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }
}
