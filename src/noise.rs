//! Seeded 2D height noise
//!
//! Thin wrapper over [`noise::Perlin`] that maps samples into `[0, 1]` and
//! applies the cumulative height passes used by the terrain.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Linearly rescale `value` from `[in_min, in_max]` to `[out_min, out_max]`
#[inline]
pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

/// Seeded Perlin field
#[derive(Debug, Clone)]
pub struct NoiseField {
    seed: u32,
    perlin: Perlin,
}

impl NoiseField {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            perlin: Perlin::new(seed),
        }
    }

    #[inline]
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Sample at a noise-space offset, in `[0, 1]`
    pub fn sample(&self, offset_x: f32, offset_y: f32) -> f32 {
        let raw = self.perlin.get([offset_x as f64, offset_y as f64]) as f32;
        map_range(raw, -1.0, 1.0, 0.0, 1.0).clamp(0.0, 1.0)
    }
}

/// One layer of height noise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoisePass {
    /// Noise-space step between neighbouring vertices
    pub increment: f32,
    pub min_raise: f32,
    pub max_raise: f32,
}

impl NoisePass {
    /// Large rolling slopes
    pub const SLOPES: Self = Self {
        increment: 0.0111661,
        min_raise: 0.0,
        max_raise: 1.5,
    };

    /// Small bumps on top of the slopes
    pub const UNEVENNESS: Self = Self {
        increment: 0.98896165,
        min_raise: 0.0,
        max_raise: 0.1,
    };

    /// Add this pass onto a row-major height grid (`x` outer, `y` inner).
    ///
    /// The inner offset restarts at zero for every row while the outer
    /// offset keeps accumulating.
    pub fn apply(&self, field: &NoiseField, heights: &mut [f32], verts_x: usize, verts_y: usize) {
        debug_assert_eq!(heights.len(), verts_x * verts_y);
        let mut x_offset = 0.0_f32;
        for x in 0..verts_x {
            let mut y_offset = 0.0_f32;
            for y in 0..verts_y {
                let i = x * verts_y + y;
                let n = field.sample(x_offset, y_offset);
                heights[i] += map_range(n, 0.0, 1.0, self.min_raise, self.max_raise);
                y_offset += self.increment;
            }
            x_offset += self.increment;
        }
    }
}
