//! Graveyard Walk - find the key, open the gate
//!
//! Core modules:
//! - `scene`: Procedural scene construction (terrain, placement, load coordination)
//! - `geom`: CPU-side meshes, rays and the scene graph
//! - `noise`: Height field noise passes
//! - `controller`: First-person ground following and collisions
//! - `game`: Key and gate state machine
//! - `settings`: Persisted player settings

pub mod controller;
pub mod game;
pub mod geom;
pub mod noise;
pub mod scene;
pub mod settings;

pub use controller::{ControllerSettings, MovementController, WorldView};
pub use game::{GameController, GameState};
pub use scene::{SceneBuilder, SceneConfig};
pub use settings::{QualityPreset, Settings};

/// World constants (metres, radians)
pub mod consts {
    use glam::Vec3;

    /// Side of the fenced square
    pub const GRAVEYARD_SIDE: f32 = 27.0;
    /// Terrain subdivisions per metre
    pub const TERRAIN_DENSITY: f32 = 2.0;
    /// Sky area (XZ) per cloud
    pub const SKY_AREA_PER_CLOUD: f32 = 150.0;
    pub const SKY_MIN: Vec3 = Vec3::new(-60.0, 30.0, -60.0);
    pub const SKY_MAX: Vec3 = Vec3::new(60.0, 50.0, 60.0);
    /// Start height for probes that may land on buildings
    pub const ALL_SURFACES_PROBE_HEIGHT: f32 = 50.0;

    /// Cardinal directions; north looks down -Z
    pub const NORTH: Vec3 = Vec3::new(0.0, 0.0, -1.0);
    pub const SOUTH: Vec3 = Vec3::new(0.0, 0.0, 1.0);
    pub const EAST: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    pub const WEST: Vec3 = Vec3::new(-1.0, 0.0, 0.0);

    /// Cobbled path shape
    pub const PATH_BEND: f32 = 2.3;
    pub const PATH_NUDGE: f32 = 2.2;
    pub const PATH_THICKNESS: f32 = 0.1;
    pub const PATH_WIDTH: f32 = 3.5;

    pub const MAUSOLEUM_DIST_FROM_FENCE: f32 = 5.0;

    /// Player
    pub const MIN_GROUND_DIST: f32 = 1.6;
    pub const MAX_GROUND_DIST: f32 = 1.7;
    pub const Y_MOVEMENT_INCREMENT: f32 = 0.3;
    pub const MOVEMENT_SPEED: f32 = 3.0;
    pub const MOVEMENT_SPEED_INCREMENT: f32 = 0.5;
    pub const FLY_SPEED: f32 = 5.0;
    pub const LOOK_SPEED: f32 = 0.00131;
    pub const COLLISION_DIST: f32 = 0.3;
    pub const INTERACT_DISTANCE: f32 = 2.0;
}
