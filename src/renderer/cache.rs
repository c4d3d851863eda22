//! Cache-as-Texture
//!
//! A cached render group draws its subtree once into an offscreen texture
//! and then draws only that texture until the cache is invalidated.
//!
//! ```text
//! frame start ── update_cached_groups ──► (re)acquire textures, link
//!                                          nested groups to their cache
//! update pass ── groups with a fresh texture are not descended into
//! after pass  ── stale caches rendered deepest-first into their texture
//! execution   ── cached child group ──► draw_cached_texture
//! ```
//!
//! Inside a texture, nested groups are placed with
//! [`RenderGroup::inverse_parent_texture_transform`] and coloured relative
//! to the cached group, whose own tint and alpha apply when the texture is
//! drawn.

use glam::Affine2;

use crate::errors::Result;
use crate::renderer::backend::GroupUniforms;
use crate::renderer::settings::RendererSettings;
use crate::renderer::texture_pool::{CacheTextureDesc, TexturePool};
use crate::scene::bounds;
use crate::scene::render_group::RenderGroup;
use crate::scene::{RenderGroupHandle, Scene};
use crate::utils::color::{OPAQUE_WHITE, multiply_colors, pack_color_alpha};

fn texture_desc(group: &RenderGroup, settings: &RendererSettings) -> CacheTextureDesc {
    let options = &group.cache.options;
    let bounds = group.cache.texture_bounds;
    CacheTextureDesc {
        width: bounds.width(),
        height: bounds.height(),
        resolution: options.resolution.unwrap_or(settings.resolution),
        antialias: options.antialias.unwrap_or(settings.antialias),
        scale_mode: options.scale_mode.unwrap_or(settings.cache_scale_mode),
    }
}

/// Walks the group tree under `root`, recording each group's nearest cached
/// ancestor and acquiring textures for caches that need a redraw.
pub(crate) fn update_cached_groups(
    scene: &mut Scene,
    root: RenderGroupHandle,
    textures: &mut dyn TexturePool,
    settings: &RendererSettings,
) -> Result<()> {
    let mut stack = vec![(root, None)];

    while let Some((group, closest)) = stack.pop() {
        let Some(render_group) = scene.groups.get_mut(group) else {
            continue;
        };
        render_group.parent_cache_group = closest;
        render_group.invalidate_matrices();

        let cached = render_group.cache.enabled;
        if cached && render_group.cache.needs_update {
            let bounds = bounds::local_bounds(&scene.nodes, render_group.root).round_out();
            let previous = render_group.cache.texture.take();
            if let Some(previous) = previous {
                textures.return_texture(previous);
            }

            render_group.cache.texture_bounds = bounds;
            let desc = texture_desc(render_group, settings);
            let texture = textures.get_optimal_texture(&desc)?;
            render_group.cache.texture = Some(texture);
            render_group.cache.scale_mode = desc.scale_mode;

            if previous != Some(texture)
                && let Some(parent) = render_group.parent
                && let Some(parent_group) = scene.groups.get_mut(parent)
            {
                parent_group.structure_did_change = true;
            }
        }

        let next = if cached { Some(group) } else { closest };
        for &child in scene.groups[group].children.iter().rev() {
            stack.push((child, next));
        }
    }
    Ok(())
}

/// Uniforms for executing `group` into the texture of `cache_group`, its
/// nearest cached ancestor or itself.
pub(crate) fn texture_space_uniforms(
    scene: &Scene,
    group: RenderGroupHandle,
    cache_group: RenderGroupHandle,
) -> Option<GroupUniforms> {
    let cache = scene.groups.get(cache_group)?;
    if group == cache_group {
        return Some(GroupUniforms {
            world_transform: Affine2::from_translation(-cache.cache.texture_bounds.min),
            world_color_alpha: OPAQUE_WHITE,
        });
    }

    let render_group = scene.groups.get(group)?;
    let mut color = 0xFF_FFFF;
    let mut alpha = 1.0;
    let mut current = Some(group);
    while let Some(handle) = current
        && handle != cache_group
    {
        let step = scene.groups.get(handle)?;
        let root = scene.nodes.get(step.root)?;
        color = multiply_colors(root.group_color, color);
        alpha *= root.group_alpha;
        current = step.parent;
    }

    Some(GroupUniforms {
        world_transform: render_group.inverse_parent_texture_transform(Some(cache)),
        world_color_alpha: pack_color_alpha(color, alpha),
    })
}
