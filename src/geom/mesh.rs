//! Triangle meshes with mutable position buffers
//!
//! Meshes are the CPU-side half of what the renderer draws: the position and
//! index buffers are exposed as byte slices for upload, and the same data is
//! used for ground probes and collision rays.

use glam::{UVec3, Vec2, Vec3};

use super::aabb::Aabb;
use super::ray::{Ray, intersect_triangle};

/// Meshes with fewer triangles than this are always tested brute force
const COLUMN_INDEX_MIN_TRIANGLES: usize = 64;
/// Upper bound on column index cells per axis
const COLUMN_INDEX_MAX_CELLS: usize = 128;

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    indices: Vec<u32>,
    bounds: Aabb,
    columns: Option<ColumnIndex>,
}

impl Mesh {
    /// Create a mesh from raw buffers; normals and bounds are computed
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let mut mesh = Self {
            positions,
            normals: Vec::new(),
            indices,
            bounds: Aabb::EMPTY,
            columns: None,
        };
        mesh.refresh();
        mesh
    }

    /// Point cloud without triangles (rain); never hit by rays
    pub fn points(positions: Vec<Vec3>) -> Self {
        Self::new(positions, Vec::new())
    }

    /// Horizontal plane centred on the origin, `seg_x * seg_z` quads.
    ///
    /// Vertices are stored row-major with X as the outer axis, so vertex
    /// `(ix, iz)` lives at `ix * (seg_z + 1) + iz`.
    pub fn plane(size_x: f32, size_z: f32, seg_x: usize, seg_z: usize) -> Self {
        let seg_x = seg_x.max(1);
        let seg_z = seg_z.max(1);
        let mut positions = Vec::with_capacity((seg_x + 1) * (seg_z + 1));
        for ix in 0..=seg_x {
            let x = -size_x / 2.0 + size_x * ix as f32 / seg_x as f32;
            for iz in 0..=seg_z {
                let z = -size_z / 2.0 + size_z * iz as f32 / seg_z as f32;
                positions.push(Vec3::new(x, 0.0, z));
            }
        }

        let row = (seg_z + 1) as u32;
        let mut indices = Vec::with_capacity(seg_x * seg_z * 6);
        for ix in 0..seg_x as u32 {
            for iz in 0..seg_z as u32 {
                let a = ix * row + iz;
                let b = a + row;
                let c = a + 1;
                let d = b + 1;
                indices.extend_from_slice(&[a, c, b, c, d, b]);
            }
        }
        Self::new(positions, indices)
    }

    /// Box centred on the origin with every face subdivided
    pub fn cuboid(size: Vec3, segments: UVec3) -> Self {
        let seg = segments.max(UVec3::ONE);
        let h = size * 0.5;
        let mut positions = Vec::new();
        let mut indices = Vec::new();

        // (origin corner, u axis, v axis, u segments, v segments)
        let faces = [
            (Vec3::new(-h.x, -h.y, h.z), Vec3::X * size.x, Vec3::Y * size.y, seg.x, seg.y),
            (Vec3::new(h.x, -h.y, -h.z), Vec3::NEG_X * size.x, Vec3::Y * size.y, seg.x, seg.y),
            (Vec3::new(h.x, -h.y, h.z), Vec3::NEG_Z * size.z, Vec3::Y * size.y, seg.z, seg.y),
            (Vec3::new(-h.x, -h.y, -h.z), Vec3::Z * size.z, Vec3::Y * size.y, seg.z, seg.y),
            (Vec3::new(-h.x, h.y, h.z), Vec3::X * size.x, Vec3::NEG_Z * size.z, seg.x, seg.z),
            (Vec3::new(-h.x, -h.y, -h.z), Vec3::X * size.x, Vec3::Z * size.z, seg.x, seg.z),
        ];

        for (origin, u_axis, v_axis, us, vs) in faces {
            let base = positions.len() as u32;
            for iv in 0..=vs {
                for iu in 0..=us {
                    let p = origin
                        + u_axis * (iu as f32 / us as f32)
                        + v_axis * (iv as f32 / vs as f32);
                    positions.push(p);
                }
            }
            let row = us + 1;
            for iv in 0..vs {
                for iu in 0..us {
                    let a = base + iv * row + iu;
                    let b = a + 1;
                    let c = a + row;
                    let d = c + 1;
                    indices.extend_from_slice(&[a, b, c, b, d, c]);
                }
            }
        }
        Self::new(positions, indices)
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Position buffer as raw bytes for GPU upload
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Normal buffer as raw bytes for GPU upload
    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Mutate every vertex in place, then recompute normals and bounds
    pub fn update_positions(&mut self, mut f: impl FnMut(usize, Vec3) -> Vec3) {
        for (i, p) in self.positions.iter_mut().enumerate() {
            *p = f(i, *p);
        }
        self.refresh();
    }

    /// Replace the Y coordinate of every vertex
    pub fn set_heights(&mut self, heights: &[f32]) {
        debug_assert_eq!(heights.len(), self.positions.len());
        for (p, &y) in self.positions.iter_mut().zip(heights) {
            p.y = y;
        }
        self.refresh();
    }

    /// Area-weighted vertex normals
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let n = (self.positions[b] - self.positions[a])
                .cross(self.positions[c] - self.positions[a]);
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        for n in &mut normals {
            *n = n.normalize_or(Vec3::Y);
        }
        self.normals = normals;
    }

    fn refresh(&mut self) {
        self.recompute_normals();
        self.bounds = Aabb::from_points(self.positions.iter().copied());
        self.columns = ColumnIndex::build(self);
    }

    #[inline]
    fn triangle(&self, tri: usize) -> (Vec3, Vec3, Vec3) {
        let i = tri * 3;
        (
            self.positions[self.indices[i] as usize],
            self.positions[self.indices[i + 1] as usize],
            self.positions[self.indices[i + 2] as usize],
        )
    }

    /// Intersect a ray given in this mesh's space, pushing every hit parameter
    pub fn raycast(&self, ray: &Ray, hits: &mut Vec<f32>) {
        if self.indices.is_empty() || self.bounds.is_empty() {
            return;
        }

        if ray.is_vertical() {
            if !self.bounds.contains_xz(ray.origin.x, ray.origin.z) {
                return;
            }
            if let Some(columns) = &self.columns {
                for &tri in columns.candidates(ray.origin.x, ray.origin.z) {
                    let (a, b, c) = self.triangle(tri as usize);
                    if let Some(t) = intersect_triangle(ray, a, b, c) {
                        hits.push(t);
                    }
                }
                return;
            }
        }

        for tri in 0..self.triangle_count() {
            let (a, b, c) = self.triangle(tri);
            if let Some(t) = intersect_triangle(ray, a, b, c) {
                hits.push(t);
            }
        }
    }
}

/// Uniform XZ bucket grid over triangle footprints, for vertical rays
#[derive(Debug, Clone)]
struct ColumnIndex {
    origin: Vec2,
    cell: Vec2,
    cells_x: usize,
    cells_z: usize,
    buckets: Vec<Vec<u32>>,
}

impl ColumnIndex {
    fn build(mesh: &Mesh) -> Option<Self> {
        let tris = mesh.triangle_count();
        if tris < COLUMN_INDEX_MIN_TRIANGLES || mesh.bounds.is_empty() {
            return None;
        }

        let cells = ((tris as f32).sqrt().ceil() as usize).clamp(1, COLUMN_INDEX_MAX_CELLS);
        let origin = Vec2::new(mesh.bounds.min.x, mesh.bounds.min.z);
        let extent = Vec2::new(
            mesh.bounds.max.x - mesh.bounds.min.x,
            mesh.bounds.max.z - mesh.bounds.min.z,
        )
        .max(Vec2::splat(1e-4));
        let cell = extent / cells as f32;

        let mut index = Self {
            origin,
            cell,
            cells_x: cells,
            cells_z: cells,
            buckets: vec![Vec::new(); cells * cells],
        };

        for tri in 0..tris {
            let (a, b, c) = mesh.triangle(tri);
            let lo = a.min(b).min(c);
            let hi = a.max(b).max(c);
            let (x0, z0) = index.cell_of(lo.x, lo.z);
            let (x1, z1) = index.cell_of(hi.x, hi.z);
            for cx in x0..=x1 {
                for cz in z0..=z1 {
                    index.buckets[cx * index.cells_z + cz].push(tri as u32);
                }
            }
        }
        Some(index)
    }

    #[inline]
    fn cell_of(&self, x: f32, z: f32) -> (usize, usize) {
        let cx = ((x - self.origin.x) / self.cell.x).floor().max(0.0) as usize;
        let cz = ((z - self.origin.y) / self.cell.y).floor().max(0.0) as usize;
        (cx.min(self.cells_x - 1), cz.min(self.cells_z - 1))
    }

    fn candidates(&self, x: f32, z: f32) -> &[u32] {
        let (cx, cz) = self.cell_of(x, z);
        &self.buckets[cx * self.cells_z + cz]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_layout_is_x_major() {
        let plane = Mesh::plane(4.0, 2.0, 4, 2);
        assert_eq!(plane.vertex_count(), 15);
        assert_eq!(plane.triangle_count(), 16);
        // Vertex (1, 0) follows the three vertices of column x = 0
        assert_eq!(plane.positions()[3], Vec3::new(-1.0, 0.0, -1.0));
        assert!(plane.normals().iter().all(|n| (n.y - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_cuboid_bounds() {
        let b = Mesh::cuboid(Vec3::new(2.0, 1.0, 4.0), UVec3::new(3, 2, 1));
        assert_eq!(b.bounds().min, Vec3::new(-1.0, -0.5, -2.0));
        assert_eq!(b.bounds().max, Vec3::new(1.0, 0.5, 2.0));
    }

    #[test]
    fn test_vertical_ray_uses_nearest_surface() {
        let b = Mesh::cuboid(Vec3::ONE, UVec3::ONE);
        let mut hits = Vec::new();
        b.raycast(&Ray::down(Vec3::new(0.1, 3.0, -0.2)), &mut hits);
        hits.sort_by(f32::total_cmp);
        assert!((hits[0] - 2.5).abs() < 1e-5);
        assert!((hits[hits.len() - 1] - 3.5).abs() < 1e-5);
    }

    #[test]
    fn test_column_index_matches_brute_force() {
        let mut plane = Mesh::plane(10.0, 10.0, 20, 20);
        plane.update_positions(|_, p| Vec3::new(p.x, (p.x * 0.7).sin() + p.z * 0.1, p.z));
        assert!(plane.columns.is_some());

        for &(x, z) in &[(0.3, -2.1), (4.9, 4.9), (-3.3, 1.7)] {
            let ray = Ray::down(Vec3::new(x, 10.0, z));
            let mut indexed = Vec::new();
            plane.raycast(&ray, &mut indexed);

            let mut brute = Vec::new();
            for tri in 0..plane.triangle_count() {
                let (a, b, c) = plane.triangle(tri);
                if let Some(t) = intersect_triangle(&ray, a, b, c) {
                    brute.push(t);
                }
            }
            let nearest = |v: &[f32]| v.iter().copied().fold(f32::INFINITY, f32::min);
            assert!((nearest(&indexed) - nearest(&brute)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_set_heights_updates_bounds() {
        let mut plane = Mesh::plane(2.0, 2.0, 1, 1);
        plane.set_heights(&[0.0, 1.0, -2.0, 0.5]);
        assert_eq!(plane.bounds().min.y, -2.0);
        assert_eq!(plane.bounds().max.y, 1.0);
    }

    #[test]
    fn test_points_never_hit() {
        let cloud = Mesh::points(vec![Vec3::ZERO, Vec3::ONE]);
        let mut hits = Vec::new();
        cloud.raycast(&Ray::down(Vec3::new(0.0, 5.0, 0.0)), &mut hits);
        assert!(hits.is_empty());
        assert_eq!(cloud.position_bytes().len(), 24);
    }
}
