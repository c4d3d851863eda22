use std::f32::consts::TAU;

use glam::{Affine2, Mat2, Vec2};

/// Transform component
///
/// Holds the 2D decomposition of a node's local transform together with the
/// cached local matrix. The matrix is rebuilt lazily by
/// [`update_local_matrix`](Self::update_local_matrix) when a setter has
/// flagged it dirty.
///
/// The local matrix maps a point `p` in node space to parent space as
/// `position + R·S·(p - pivot)` with skew folded into the rotation axes.
#[derive(Debug, Clone)]
pub struct Transform {
    pub(crate) position: Vec2,
    pub(crate) scale: Vec2,
    pub(crate) rotation: f32,
    pub(crate) skew: Vec2,
    pub(crate) pivot: Vec2,

    local_matrix: Affine2,
    dirty: bool,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            skew: Vec2::ZERO,
            pivot: Vec2::ZERO,
            local_matrix: Affine2::IDENTITY,
            dirty: false,
        }
    }

    // ========================================================================
    // Matrix Cache
    // ========================================================================

    /// Rebuilds the local matrix if a component changed since the last call.
    ///
    /// Returns `true` when the matrix was recomputed.
    pub fn update_local_matrix(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.local_matrix = self.compute_matrix();
        self.dirty = false;
        true
    }

    /// Computes the local matrix from the current components without
    /// touching the cache.
    #[must_use]
    pub fn compute_matrix(&self) -> Affine2 {
        let (sin_x, cos_x) = (self.rotation + self.skew.y).sin_cos();
        let (sin_y, cos_y) = (self.rotation - self.skew.x).sin_cos();

        let a = cos_x * self.scale.x;
        let b = sin_x * self.scale.x;
        let c = -sin_y * self.scale.y;
        let d = cos_y * self.scale.y;

        let translation = Vec2::new(
            self.position.x - (self.pivot.x * a + self.pivot.y * c),
            self.position.y - (self.pivot.x * b + self.pivot.y * d),
        );

        Affine2::from_mat2_translation(Mat2::from_cols(Vec2::new(a, b), Vec2::new(c, d)), translation)
    }

    /// The cached local matrix. Only current after
    /// [`update_local_matrix`](Self::update_local_matrix).
    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine2 {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // ========================================================================
    // Components
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Rotation in radians.
    #[inline]
    #[must_use]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    #[inline]
    #[must_use]
    pub fn skew(&self) -> Vec2 {
        self.skew
    }

    #[inline]
    #[must_use]
    pub fn pivot(&self) -> Vec2 {
        self.pivot
    }

    /// Overwrites the components so that they reproduce `matrix` around the
    /// current pivot.
    ///
    /// A matrix whose axes stay orthogonal decomposes into a pure rotation.
    /// Otherwise rotation is zeroed and the axis angles go into `skew`.
    pub fn set_from_matrix(&mut self, matrix: &Affine2) {
        let [a, b] = matrix.matrix2.x_axis.to_array();
        let [c, d] = matrix.matrix2.y_axis.to_array();

        let skew_x = -(-c).atan2(d);
        let skew_y = b.atan2(a);
        let delta = (skew_x + skew_y).abs();

        if delta < 1e-5 || (TAU - delta).abs() < 1e-5 {
            self.rotation = skew_y;
            self.skew = Vec2::ZERO;
        } else {
            self.rotation = 0.0;
            self.skew = Vec2::new(skew_x, skew_y);
        }

        self.scale = Vec2::new(a.hypot(b), c.hypot(d));
        self.position = Vec2::new(
            matrix.translation.x + (self.pivot.x * a + self.pivot.y * c),
            matrix.translation.y + (self.pivot.x * b + self.pivot.y * d),
        );
        self.dirty = true;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
