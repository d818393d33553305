//! Shared scene state
//!
//! Every async build task holds a [`SceneHandle`] and borrows the state only
//! between await points.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::assets::AssetError;
use super::coordinator::AssetLoadCoordinator;
use super::placement::PlacementFailure;
use super::readiness::ReadyFlag;
use super::terrain::HeightRange;
use super::weather::Weather;
use crate::consts::*;
use crate::geom::{NodeId, SceneGraph};

/// Build parameters, derived from [`crate::Settings`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Seed for every random decision of a build
    pub seed: u64,
    /// Extra logging of placement details
    pub debug: bool,
    /// Side of the fenced square
    pub graveyard_side: f32,
    /// Terrain subdivisions per unit of ground length
    pub terrain_density: f32,
    pub rain_particles: usize,
    /// Sky area (XZ) covered by one cloud
    pub sky_area_per_cloud: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            debug: false,
            graveyard_side: GRAVEYARD_SIDE,
            terrain_density: TERRAIN_DENSITY,
            rain_particles: 10_000,
            sky_area_per_cloud: SKY_AREA_PER_CLOUD,
        }
    }
}

impl SceneConfig {
    /// Ground extends past the fence into the fog
    #[inline]
    pub fn ground_size(&self) -> f32 {
        self.graveyard_side * 2.0
    }

    /// Distance from the centre to the fence line
    #[inline]
    pub fn half_side(&self) -> f32 {
        self.graveyard_side / 2.0
    }
}

/// Root nodes of every scene category, filled in as they are built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneNodes {
    pub terrain: Option<NodeId>,
    pub path: Option<NodeId>,
    pub fence: Option<NodeId>,
    pub gate: Option<NodeId>,
    pub mausoleum: Option<NodeId>,
    pub graves: Option<NodeId>,
    pub trees: Option<NodeId>,
    pub lanterns: Option<NodeId>,
    pub clutter: Option<NodeId>,
    pub key: Option<NodeId>,
    pub rain: Option<NodeId>,
    pub clouds: Option<NodeId>,
    pub lightning: Option<NodeId>,
}

#[derive(Debug)]
pub struct SceneState {
    pub config: SceneConfig,
    pub graph: SceneGraph,
    pub coordinator: AssetLoadCoordinator,
    /// Terrain mesh, height range and ground material are in place
    pub terrain_built: ReadyFlag,
    pub heights: HeightRange,
    pub nodes: SceneNodes,
    /// Surfaces the player walks on
    pub walkable: Vec<NodeId>,
    /// Obstacles blocking horizontal movement
    pub collidable: Vec<NodeId>,
    pub failures: Vec<PlacementFailure>,
    pub load_failures: Vec<AssetError>,
    pub weather: Option<Weather>,
    pub rng: Pcg32,
}

impl SceneState {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            graph: SceneGraph::default(),
            coordinator: AssetLoadCoordinator::new(),
            terrain_built: ReadyFlag::new(),
            heights: HeightRange::default(),
            nodes: SceneNodes::default(),
            walkable: Vec::new(),
            collidable: Vec::new(),
            failures: Vec::new(),
            load_failures: Vec::new(),
            weather: None,
            rng: Pcg32::seed_from_u64(config.seed),
        }
    }

    /// Uniform sample in `[0, 1)`
    #[inline]
    pub fn random(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    /// Average of two uniform samples, biased towards 0.5
    #[inline]
    pub fn random_centered(&mut self) -> f32 {
        (self.random() + self.random()) / 2.0
    }

    /// Random index into a collection of `len` items
    #[inline]
    pub fn random_index(&mut self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            self.rng.random_range(0..len)
        }
    }

    /// Random XZ position inside the fence, `padding` away from it
    pub fn random_xz_within_graveyard(&mut self, padding: f32) -> Vec3 {
        let side = self.config.graveyard_side - padding * 2.0;
        let x = side / 2.0 - self.random() * side;
        let z = side / 2.0 - self.random() * side;
        Vec3::new(x, 0.0, z)
    }
}

/// Shared, single-threaded handle to the scene under construction
#[derive(Debug, Clone)]
pub struct SceneHandle(Rc<RefCell<SceneState>>);

impl SceneHandle {
    pub fn new(state: SceneState) -> Self {
        Self(Rc::new(RefCell::new(state)))
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, SceneState> {
        self.0.borrow()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, SceneState> {
        self.0.borrow_mut()
    }

    pub fn random(&self) -> f32 {
        self.0.borrow_mut().random()
    }

    pub fn random_centered(&self) -> f32 {
        self.0.borrow_mut().random_centered()
    }

    pub fn random_index(&self, len: usize) -> usize {
        self.0.borrow_mut().random_index(len)
    }

    pub fn debug(&self) -> bool {
        self.0.borrow().config.debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let config = SceneConfig {
            seed: 99,
            ..Default::default()
        };
        let mut a = SceneState::new(config);
        let mut b = SceneState::new(config);
        for _ in 0..20 {
            assert_eq!(a.random(), b.random());
        }
    }

    #[test]
    fn test_random_xz_stays_inside_fence() {
        let mut state = SceneState::new(SceneConfig::default());
        let half = state.config.half_side() - 0.5;
        for _ in 0..200 {
            let p = state.random_xz_within_graveyard(0.5);
            assert!(p.x.abs() <= half && p.z.abs() <= half);
        }
    }
}
