//! Terrain and cobbled path
//!
//! The ground is a square plane deformed by two layers of Perlin noise. The
//! path is a thin box bent sideways by a sigmoid and then draped over the
//! terrain vertex by vertex.

use glam::{UVec3, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::assets::{paths, MaterialSpec};
use super::context::BuildContext;
use super::coordinator::Phase;
use super::probe::{GroundProbe, ProbeScope};
use crate::consts::{PATH_BEND, PATH_NUDGE, PATH_THICKNESS, PATH_WIDTH, SOUTH, WEST};
use crate::geom::{Material, Mesh, Node, ShadowTag};
use crate::noise::{NoiseField, NoisePass};

/// How far above the tallest terrain vertex path probes start
const PATH_PROBE_CLEARANCE: f32 = 3.0;
/// Path box subdivisions (across, up, along)
const PATH_SEGMENTS: UVec3 = UVec3::new(10, 1, 50);
const GROUND_TEXTURE_REPEAT: [f32; 2] = [10.0, 10.0];
const GROUND_TEXTURE_OFFSET: [f32; 2] = [0.4, 0.2];
const GROUND_ROUGHNESS: f32 = 0.8;

/// Global extent of the sampled terrain heights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightRange {
    pub min: f32,
    pub max: f32,
}

impl Default for HeightRange {
    fn default() -> Self {
        // Placeholder until the height field is generated
        Self { min: 0.0, max: 1.5 }
    }
}

/// Row-major grid of height samples (`x` outer, `y` inner)
#[derive(Debug, Clone)]
pub struct HeightField {
    verts_x: usize,
    verts_y: usize,
    heights: Vec<f32>,
}

impl HeightField {
    pub fn flat(verts_x: usize, verts_y: usize) -> Self {
        Self {
            verts_x,
            verts_y,
            heights: vec![0.0; verts_x * verts_y],
        }
    }

    /// Slopes then unevenness, each from its own seeded field
    pub fn generate(verts_x: usize, verts_y: usize, slopes: &NoiseField, bumps: &NoiseField) -> Self {
        let mut field = Self::flat(verts_x, verts_y);
        field.apply(&NoisePass::SLOPES, slopes);
        field.apply(&NoisePass::UNEVENNESS, bumps);
        field
    }

    pub fn apply(&mut self, pass: &NoisePass, noise: &NoiseField) {
        pass.apply(noise, &mut self.heights, self.verts_x, self.verts_y);
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.heights[x * self.verts_y + y]
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// True min and max over every sample
    pub fn range(&self) -> HeightRange {
        let (min, max) = self
            .heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| (lo.min(h), hi.max(h)));
        if self.heights.is_empty() {
            HeightRange::default()
        } else {
            HeightRange { min, max }
        }
    }
}

/// Ground plane geometry for a height field covering `size` x `size`
pub fn ground_mesh(size: f32, segments: usize, field: &HeightField) -> Mesh {
    let mut mesh = Mesh::plane(size, size, segments, segments);
    mesh.set_heights(field.heights());
    mesh
}

/// Number of ground subdivisions per axis
pub fn ground_segments(ground_size: f32, density: f32) -> usize {
    ((ground_size * density).round() as usize).max(1)
}

/// Lateral bend of the path at along-axis coordinate `a`
#[inline]
pub fn path_bend(a: f32) -> f32 {
    PATH_BEND / (1.0 + (-a).exp())
}

/// Path footprint before grounding, in world space.
///
/// The path runs from the gate (south) towards the mausoleum (north) and
/// swings east by up to [`PATH_BEND`] along the way.
pub fn path_layout(graveyard_side: f32) -> Mesh {
    let length = path_length(graveyard_side);
    let centre = SOUTH * (graveyard_side - length) / 2.0 + (WEST + SOUTH) * PATH_NUDGE;
    let mut mesh = Mesh::cuboid(Vec3::new(PATH_WIDTH, PATH_THICKNESS, length), PATH_SEGMENTS);
    mesh.update_positions(|_, p| {
        // Along-axis coordinate grows towards the mausoleum
        let a = -p.z;
        Vec3::new(centre.x + p.x + path_bend(a), p.y, centre.z + p.z)
    });
    mesh
}

#[inline]
pub fn path_length(graveyard_side: f32) -> f32 {
    graveyard_side * 4.0 / 5.0
}

/// Drape the path over the terrain.
///
/// Vertices are processed in buffer order; a vertex with nothing below it
/// takes the height of the one before.
pub async fn snap_path(mut mesh: Mesh, probe: &GroundProbe, ground_min: f32, ground_max: f32) -> Mesh {
    let origin_y = ground_max + PATH_PROBE_CLEARANCE;
    let mut heights = Vec::with_capacity(mesh.vertex_count());
    let mut previous = None;
    for p in mesh.positions() {
        // p.y is the vertex's offset from the path's mid-plane
        let up = p.y;
        let snapped = match probe
            .distance_to_ground(Vec3::new(p.x, origin_y, p.z), ProbeScope::TerrainOnly)
            .await
        {
            Some(d) => origin_y - d + up,
            None => previous.unwrap_or(ground_min + up),
        };
        heights.push(snapped);
        previous = Some(snapped);
    }
    mesh.set_heights(&heights);
    mesh
}

/// Ground phase: terrain first, then the path draped over it
pub async fn build(ctx: BuildContext) {
    let (side, density, seeds) = {
        let mut state = ctx.scene.borrow_mut();
        let seeds: (u32, u32) = (state.rng.random(), state.rng.random());
        (state.config.graveyard_side, state.config.terrain_density, seeds)
    };
    let ground_size = side * 2.0;
    let segments = ground_segments(ground_size, density);
    let field = HeightField::generate(
        segments + 1,
        segments + 1,
        &NoiseField::new(seeds.0),
        &NoiseField::new(seeds.1),
    );
    let range = field.range();
    let mesh = ground_mesh(ground_size, segments, &field);

    let spec = MaterialSpec::new(paths::GROUND_DIFFUSE, paths::GROUND_NORMAL)
        .with_roughness(paths::GROUND_ROUGHNESS)
        .with_repeat(GROUND_TEXTURE_REPEAT, GROUND_TEXTURE_OFFSET);
    let Some(mut ground_mat) = ctx.material(spec).await else {
        return;
    };
    ground_mat.roughness = GROUND_ROUGHNESS;

    {
        let mut state = ctx.scene.borrow_mut();
        let mut ground = Node::new("Ground")
            .with_mesh(mesh)
            .with_shadow(ShadowTag::ReceiveOnly);
        ground.material = Some(ground_mat);
        let ground = state.graph.add_to_scene(ground);
        state.nodes.terrain = Some(ground);
        state.walkable.push(ground);
        state.heights = range;
        state.terrain_built.set();
        log::info!(
            "SceneBuilder: Terrain built ({segments}x{segments}, heights {:.3}..{:.3}).",
            range.min,
            range.max
        );
    }

    let length = path_length(side);
    let spec = MaterialSpec::new(paths::PATH_DIFFUSE, paths::PATH_NORMAL)
        .with_roughness(paths::PATH_ROUGHNESS)
        .with_repeat([length / PATH_WIDTH, 1.0], [0.0, 0.0]);
    let (path_mat, mesh) = futures::join!(
        ctx.material(spec),
        snap_path(path_layout(side), ctx.placement.probe(), range.min, range.max),
    );
    let path_mat = path_mat.unwrap_or_else(|| {
        log::warn!("SceneBuilder: path textures missing, using a plain material");
        Material::new()
    });

    {
        let mut state = ctx.scene.borrow_mut();
        let mut path = Node::new("Cobbled Path")
            .with_mesh(mesh)
            .with_shadow(ShadowTag::ReceiveOnly);
        path.material = Some(path_mat);
        let path = state.graph.add_to_scene(path);
        state.nodes.path = Some(path);
        state.walkable.push(path);
    }
    ctx.complete_phase(Phase::Ground).await;
}
