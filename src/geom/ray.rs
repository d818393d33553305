//! Rays and ray/triangle intersection

use glam::Vec3;

/// Parallel-ray rejection threshold for Möller–Trumbore
const EPSILON: f32 = 1e-7;

/// A ray with a unit direction (world space) or an arbitrary direction
/// (object space, where the parameter still measures world distance)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Create a world-space ray; the direction is normalized
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir: dir.normalize_or(Vec3::NEG_Y),
        }
    }

    /// Ray cast straight down from `origin`
    #[inline]
    pub fn down(origin: Vec3) -> Self {
        Self {
            origin,
            dir: Vec3::NEG_Y,
        }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }

    /// True when the ray is (close to) vertical in its own space
    #[inline]
    pub fn is_vertical(&self) -> bool {
        let horizontal = self.dir.x.abs().max(self.dir.z.abs());
        horizontal <= self.dir.y.abs() * 1e-4
    }
}

/// Double-sided ray/triangle test, returns the ray parameter of the hit
pub fn intersect_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let e1 = b - a;
    let e2 = c - a;
    let p = ray.dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = ray.dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}
