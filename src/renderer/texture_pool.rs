//! Cache Texture Pool
//!
//! Offscreen textures for cache-as-texture render groups are borrowed from a
//! [`TexturePool`] and handed back when the group is re-cached, un-cached or
//! destroyed. The core only deals in [`TextureId`]s; the backend maps ids to
//! real GPU textures.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  PooledTextures                     │
//! │                                                     │
//! │  outstanding: HashMap<TextureId, PoolKey>           │
//! │  free:        HashMap<PoolKey, Vec<FreeTexture>>    │
//! │                                                     │
//! │  get_optimal_texture(desc) → TextureId              │
//! │  return_texture(id)                                 │
//! │  trim(max_idle)         (periodic, &mut self)       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Requests are rounded up to power-of-two pixel sizes so that textures of
//! similar size share a bucket.

use rustc_hash::FxHashMap;

use crate::renderer::backend::BackendError;
use crate::scene::render_group::ScaleMode;

// ─── Public Types ─────────────────────────────────────────────────────────────

/// Opaque handle to a texture owned by the backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Request for a cache texture.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheTextureDesc {
    /// Logical width in scene units.
    pub width: f32,
    /// Logical height in scene units.
    pub height: f32,
    /// Pixels per scene unit.
    pub resolution: f32,
    pub antialias: bool,
    pub scale_mode: ScaleMode,
}

impl CacheTextureDesc {
    /// Pixel dimensions, at least one pixel on each side.
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        let to_pixels = |v: f32| ((v * self.resolution).ceil().max(1.0)) as u32;
        (to_pixels(self.width), to_pixels(self.height))
    }
}

/// Source of offscreen textures for cached render groups.
pub trait TexturePool {
    /// Returns a texture at least as large as `desc` asks for.
    fn get_optimal_texture(&mut self, desc: &CacheTextureDesc) -> Result<TextureId, BackendError>;

    /// Hands a texture back. Each id obtained from
    /// [`get_optimal_texture`](Self::get_optimal_texture) is returned once.
    fn return_texture(&mut self, texture: TextureId);
}

// ─── Internal Types ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct PoolKey {
    width: u32,
    height: u32,
    antialias: bool,
    scale_mode: ScaleMode,
}

impl PoolKey {
    fn from_desc(desc: &CacheTextureDesc) -> Self {
        let (width, height) = desc.pixel_size();
        Self {
            width: width.next_power_of_two(),
            height: height.next_power_of_two(),
            antialias: desc.antialias,
            scale_mode: desc.scale_mode,
        }
    }
}

struct FreeTexture {
    id: TextureId,
    idle_frames: u32,
}

// ─── Pool Implementation ──────────────────────────────────────────────────────

/// Id-level texture pool keyed by power-of-two size, antialiasing and
/// sampling filter.
pub struct PooledTextures {
    next_id: u64,
    outstanding: FxHashMap<TextureId, PoolKey>,
    free: FxHashMap<PoolKey, Vec<FreeTexture>>,
}

impl PooledTextures {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            outstanding: FxHashMap::default(),
            free: FxHashMap::default(),
        }
    }

    /// Pixel size of the bucket an outstanding texture was allocated from.
    #[must_use]
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.outstanding.get(&texture).map(|key| (key.width, key.height))
    }

    /// Number of textures currently lent out.
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Number of textures waiting for reuse.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Drops free textures idle for more than `max_idle_frames` calls.
    ///
    /// Returns the ids that were dropped so the backend can release them.
    pub fn trim(&mut self, max_idle_frames: u32) -> Vec<TextureId> {
        let mut released = Vec::new();
        for bucket in self.free.values_mut() {
            for texture in bucket.iter_mut() {
                texture.idle_frames += 1;
            }
            bucket.retain(|texture| {
                let keep = texture.idle_frames <= max_idle_frames;
                if !keep {
                    released.push(texture.id);
                }
                keep
            });
        }
        self.free.retain(|_, bucket| !bucket.is_empty());
        released
    }
}

impl TexturePool for PooledTextures {
    fn get_optimal_texture(&mut self, desc: &CacheTextureDesc) -> Result<TextureId, BackendError> {
        let key = PoolKey::from_desc(desc);

        let id = match self.free.get_mut(&key).and_then(Vec::pop) {
            Some(texture) => texture.id,
            None => {
                let id = TextureId(self.next_id);
                self.next_id += 1;
                log::debug!("cache texture {id:?} allocated at {}x{}", key.width, key.height);
                id
            }
        };

        self.outstanding.insert(id, key);
        Ok(id)
    }

    fn return_texture(&mut self, texture: TextureId) {
        let Some(key) = self.outstanding.remove(&texture) else {
            log::warn!("texture {texture:?} returned to the pool twice or never lent out; ignored");
            return;
        };
        self.free.entry(key).or_default().push(FreeTexture { id: texture, idle_frames: 0 });
    }
}

impl Default for PooledTextures {
    fn default() -> Self {
        Self::new()
    }
}
