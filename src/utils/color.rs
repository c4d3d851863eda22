//! Colour helpers.
//!
//! Colours are stored as `0xRRGGBB` integers. The composed colour of a node
//! is packed together with its alpha as `0xAARRGGBB` so a batch vertex can
//! carry both in a single `u32`.

/// Opaque white in packed `0xAARRGGBB` form.
pub const OPAQUE_WHITE: u32 = 0xFFFF_FFFF;

/// An RGB tint in `0xRRGGBB` form.
///
/// Built from any of the common colour notations:
///
/// | Source       | Example                 |
/// |--------------|-------------------------|
/// | `u32`        | `0xFF8800`              |
/// | `[u8; 3]`    | `[255, 136, 0]`         |
/// | `[f32; 3]`   | `[1.0, 0.533, 0.0]`     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tint(u32);

impl Tint {
    pub const WHITE: Self = Self(0xFF_FFFF);

    #[inline]
    #[must_use]
    pub const fn from_rgb(rgb: u32) -> Self {
        Self(rgb & 0xFF_FFFF)
    }

    /// The tint as `0xRRGGBB`.
    #[inline]
    #[must_use]
    pub const fn rgb(self) -> u32 {
        self.0
    }

    /// Individual channels in `[0, 1]`.
    #[must_use]
    pub fn to_f32_array(self) -> [f32; 3] {
        let [r, g, b] = channels(self.0);
        [f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0]
    }
}

impl Default for Tint {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<u32> for Tint {
    fn from(rgb: u32) -> Self {
        Self::from_rgb(rgb)
    }
}

impl From<[u8; 3]> for Tint {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self((u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b))
    }
}

impl From<[f32; 3]> for Tint {
    fn from([r, g, b]: [f32; 3]) -> Self {
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::from([to_u8(r), to_u8(g), to_u8(b)])
    }
}

#[inline]
fn channels(rgb: u32) -> [u8; 3] {
    [(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8]
}

/// Multiplies two `0xRRGGBB` colours channel by channel.
#[must_use]
pub fn multiply_colors(a: u32, b: u32) -> u32 {
    if a == 0xFF_FFFF {
        return b & 0xFF_FFFF;
    }
    if b == 0xFF_FFFF {
        return a & 0xFF_FFFF;
    }
    let [ar, ag, ab] = channels(a);
    let [br, bg, bb] = channels(b);
    let mul = |x: u8, y: u8| (u32::from(x) * u32::from(y)) / 255;
    (mul(ar, br) << 16) | (mul(ag, bg) << 8) | mul(ab, bb)
}

/// Clamps a composed alpha into `[0, 1]`. NaN collapses to zero.
#[inline]
#[must_use]
pub fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) }
}

/// Packs an RGB colour and an alpha into `0xAARRGGBB`.
#[inline]
#[must_use]
pub fn pack_color_alpha(rgb: u32, alpha: f32) -> u32 {
    let a = (clamp_alpha(alpha) * 255.0) as u32;
    (a << 24) | (rgb & 0xFF_FFFF)
}

/// Unpacks `0xAARRGGBB` into premultiplied `[r, g, b, a]` floats.
#[must_use]
pub fn premultiplied_rgba(color_alpha: u32) -> [f32; 4] {
    let a = ((color_alpha >> 24) & 0xFF) as f32 / 255.0;
    let [r, g, b] = Tint::from_rgb(color_alpha).to_f32_array();
    [r * a, g * a, b * a, a]
}
