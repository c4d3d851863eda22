//! Renderer Settings
//!
//! ```rust,ignore
//! use strata::renderer::{RendererSettings, RenderableGcSettings};
//!
//! let settings = RendererSettings {
//!     resolution: 2.0,
//!     renderable_gc: RenderableGcSettings { max_unused_frames: 120, ..Default::default() },
//!     ..Default::default()
//! };
//! ```

use crate::scene::render_group::ScaleMode;

/// Renderer-wide configuration.
///
/// The cache fields are defaults for groups cached as textures; per-group
/// [`CacheAsTextureOptions`](crate::scene::CacheAsTextureOptions) override
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Pixels per scene unit of cache textures.
    pub resolution: f32,
    pub antialias: bool,
    pub cache_scale_mode: ScaleMode,
    pub renderable_gc: RenderableGcSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            antialias: false,
            cache_scale_mode: ScaleMode::Linear,
            renderable_gc: RenderableGcSettings::default(),
        }
    }
}

/// Release of renderables that have not been drawn for a while.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderableGcSettings {
    pub enabled: bool,
    /// Frames a renderable may go undrawn before it is released.
    pub max_unused_frames: u64,
    /// Frames between two collection passes.
    pub frequency: u64,
}

impl Default for RenderableGcSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_unused_frames: 600,
            frequency: 30,
        }
    }
}
