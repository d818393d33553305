//! First-person movement over the finished scene
//!
//! The controller only sees the world through [`WorldView`]: one downward
//! ray for ground following and one for the binary collision check.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Read-only geometry queries the controller needs from the scene
pub trait WorldView {
    /// Distance from `from` straight down to the nearest walkable surface
    fn distance_to_walkable(&self, from: Vec3) -> Option<f32>;
    /// Nearest collidable point straight below `from`
    fn collision_point(&self, from: Vec3) -> Option<Vec3>;
    /// Lowest terrain height; collidable hits at or below it never block
    fn ground_min_height(&self) -> f32;
    /// Entry gate position, once the fence is built
    fn start_position(&self) -> Option<Vec3>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub min_ground_dist: f32,
    pub max_ground_dist: f32,
    /// Vertical correction speed while following the ground
    pub y_movement_increment: f32,
    pub movement_speed: f32,
    pub movement_speed_increment: f32,
    pub fly_speed: f32,
    /// Radians per pixel of mouse movement
    pub look_speed: f32,
    pub collision_dist: f32,
    pub collisions: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            min_ground_dist: MIN_GROUND_DIST,
            max_ground_dist: MAX_GROUND_DIST,
            y_movement_increment: Y_MOVEMENT_INCREMENT,
            movement_speed: MOVEMENT_SPEED,
            movement_speed_increment: MOVEMENT_SPEED_INCREMENT,
            fly_speed: FLY_SPEED,
            look_speed: LOOK_SPEED,
            collision_dist: COLLISION_DIST,
            collisions: false,
        }
    }
}

/// Held movement keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl MoveInput {
    /// Apply a key event by `KeyboardEvent.code`; returns false for keys
    /// that do not move the player
    pub fn set_key(&mut self, code: &str, pressed: bool) -> bool {
        let slot = match code {
            "KeyW" | "ArrowUp" => &mut self.forward,
            "KeyS" | "ArrowDown" => &mut self.backward,
            "KeyA" | "ArrowLeft" => &mut self.left,
            "KeyD" | "ArrowRight" => &mut self.right,
            "KeyR" => &mut self.up,
            "KeyF" => &mut self.down,
            _ => return false,
        };
        *slot = pressed;
        true
    }

    #[inline]
    pub fn is_moving(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }

    /// +1, -1 or 0 for a pair of opposing keys
    #[inline]
    fn axis(positive: bool, negative: bool) -> f32 {
        match (positive, negative) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MovementController {
    pub position: Vec3,
    /// Turn around +Y; zero looks north
    yaw: f32,
    pitch: f32,
    pub settings: ControllerSettings,
    pub input: MoveInput,
    fly: bool,
    positioned: bool,
    has_moved: bool,
}

impl MovementController {
    /// A controller parked just inside the south fence until the scene is
    /// built and [`Self::move_to_start`] runs
    pub fn new(settings: ControllerSettings, graveyard_side: f32) -> Self {
        let edge = graveyard_side / 2.0 - 1.0;
        Self {
            position: SOUTH * edge + Vec3::Y * settings.max_ground_dist,
            yaw: 0.0,
            pitch: 0.0,
            settings,
            input: MoveInput::default(),
            fly: false,
            positioned: false,
            has_moved: false,
        }
    }

    #[inline]
    pub fn is_flying(&self) -> bool {
        self.fly
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// View direction including pitch
    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    /// View direction flattened onto the ground plane
    pub fn flat_forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        Vec3::new(-sy, 0.0, -cy)
    }

    /// Turn the view by a mouse delta in pixels
    pub fn rotate_from_mouse(&mut self, dx: f32, dy: f32) {
        let limit = std::f32::consts::FRAC_PI_2 - 0.01;
        self.yaw -= dx * self.settings.look_speed;
        self.pitch = (self.pitch - dy * self.settings.look_speed).clamp(-limit, limit);
    }

    /// Turn to look level towards `target`
    pub fn face(&mut self, target: Vec3) {
        let dir = target - self.position;
        if dir.x != 0.0 || dir.z != 0.0 {
            self.yaw = (-dir.x).atan2(-dir.z);
            self.pitch = 0.0;
        }
    }

    /// Distance to the walkable surface below; `min_ground_dist` over a void
    pub fn distance_to_ground(&self, world: &impl WorldView) -> f32 {
        world
            .distance_to_walkable(self.position)
            .unwrap_or(self.settings.min_ground_dist)
    }

    /// Stand just inside the entry gate, facing into the graveyard.
    /// Returns false while the gate does not exist yet.
    pub fn move_to_start(&mut self, world: &impl WorldView) -> bool {
        let Some(gate) = world.start_position() else {
            return false;
        };
        self.position = Vec3::new(gate.x, 10.0, gate.z) + NORTH;
        self.position.y += self.settings.max_ground_dist - self.distance_to_ground(world);
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.positioned = true;
        true
    }

    /// Something collidable stands `collision_dist` ahead along `dir`
    pub fn is_colliding(&self, dir: Vec3, world: &impl WorldView) -> bool {
        let origin = self.position + dir * self.settings.collision_dist;
        world
            .collision_point(origin)
            .is_some_and(|p| p.y > world.ground_min_height())
    }

    pub fn update(&mut self, dt: f32, world: &impl WorldView) {
        if !self.positioned && !self.move_to_start(world) {
            return;
        }

        if !self.has_moved {
            let fly_vertical = self.fly && (self.input.up || self.input.down);
            if !self.input.is_moving() && !fly_vertical {
                return;
            }
            self.has_moved = true;
        }

        if self.fly {
            self.fly_step(dt);
        } else {
            self.walk_step(dt, world);
        }
    }

    fn fly_step(&mut self, dt: f32) {
        let input = &self.input;
        let forward = self.forward();
        let right = self.flat_forward().cross(Vec3::Y);
        let dir = forward * MoveInput::axis(input.forward, input.backward)
            + right * MoveInput::axis(input.right, input.left)
            + Vec3::Y * MoveInput::axis(input.up, input.down);
        self.position += dir.normalize_or_zero() * self.settings.fly_speed * dt;
    }

    fn walk_step(&mut self, dt: f32, world: &impl WorldView) {
        let forward = self.flat_forward();
        let left = forward.cross(Vec3::NEG_Y);
        let input = &self.input;
        let dir = (forward * MoveInput::axis(input.forward, input.backward)
            + left * MoveInput::axis(input.left, input.right))
        .normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }

        if self.settings.collisions && self.is_colliding(dir, world) {
            log::debug!("MovementController: collision ahead");
            return;
        }

        let step = dir * self.settings.movement_speed * dt;
        self.position.x += step.x;
        self.position.z += step.z;
        self.follow_ground(dt, world);
    }

    /// Nudge towards the `[min, max]` ground distance band without
    /// overshooting it
    fn follow_ground(&mut self, dt: f32, world: &impl WorldView) {
        let s = &self.settings;
        let dist = self.distance_to_ground(world);
        let max_step = s.y_movement_increment * dt;
        if dist > s.max_ground_dist {
            self.position.y -= max_step.min(dist - s.min_ground_dist);
        } else if dist < s.min_ground_dist {
            self.position.y += max_step.min(s.max_ground_dist - dist);
        }
    }

    /// Leaving fly mode levels the view and drops back onto the ground
    pub fn toggle_fly(&mut self, world: &impl WorldView) {
        self.fly = !self.fly;
        if !self.fly {
            self.yaw = 0.0;
            self.pitch = 0.0;
            self.position.y += self.settings.max_ground_dist - self.distance_to_ground(world);
        }
        log::info!("Fly mode {}.", if self.fly { "enabled" } else { "disabled" });
    }

    pub fn toggle_collisions(&mut self) -> bool {
        self.settings.collisions = !self.settings.collisions;
        log::info!(
            "Collisions {}.",
            if self.settings.collisions { "enabled" } else { "disabled" }
        );
        self.settings.collisions
    }

    /// Step the active speed (walk or fly) by `steps` increments
    pub fn change_speed(&mut self, steps: f32) {
        let delta = self.settings.movement_speed_increment * steps;
        let speed = if self.fly {
            &mut self.settings.fly_speed
        } else {
            &mut self.settings.movement_speed
        };
        *speed = (*speed + delta).max(0.0);
        log::debug!("MovementController: speed changed to {speed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat ground at `ground`, optionally with a wall north of `wall_z`
    struct FlatWorld {
        ground: f32,
        wall_z: Option<f32>,
        gate: Option<Vec3>,
    }

    impl FlatWorld {
        fn new(ground: f32) -> Self {
            Self {
                ground,
                wall_z: None,
                gate: Some(Vec3::new(0.0, ground, 13.0)),
            }
        }
    }

    impl WorldView for FlatWorld {
        fn distance_to_walkable(&self, from: Vec3) -> Option<f32> {
            (from.y >= self.ground).then(|| from.y - self.ground)
        }

        fn collision_point(&self, from: Vec3) -> Option<Vec3> {
            match self.wall_z {
                Some(z) if from.z < z => Some(Vec3::new(from.x, self.ground + 2.0, from.z)),
                _ => None,
            }
        }

        fn ground_min_height(&self) -> f32 {
            self.ground
        }

        fn start_position(&self) -> Option<Vec3> {
            self.gate
        }
    }

    fn walker(world: &FlatWorld) -> MovementController {
        let mut c = MovementController::new(ControllerSettings::default(), 27.0);
        assert!(c.move_to_start(world));
        c
    }

    #[test]
    fn test_move_to_start_inside_gate() {
        let world = FlatWorld::new(0.5);
        let c = walker(&world);
        assert!((c.position.z - 12.0).abs() < 1e-5);
        assert!((c.position.y - (0.5 + MAX_GROUND_DIST)).abs() < 1e-4);
    }

    #[test]
    fn test_waits_for_gate() {
        let mut world = FlatWorld::new(0.0);
        world.gate = None;
        let mut c = MovementController::new(ControllerSettings::default(), 27.0);
        let before = c.position;
        c.input.forward = true;
        c.update(0.1, &world);
        assert_eq!(c.position, before);
    }

    #[test]
    fn test_idle_until_first_input() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        c.position.y = 5.0;
        c.update(1.0, &world);
        assert_eq!(c.position.y, 5.0);
    }

    #[test]
    fn test_forward_moves_north() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        let start = c.position;
        c.input.forward = true;
        c.update(1.0, &world);
        assert!((start.z - c.position.z - MOVEMENT_SPEED).abs() < 1e-4);
        assert!((c.position.x - start.x).abs() < 1e-5);
    }

    #[test]
    fn test_diagonal_is_not_faster() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        let start = c.position;
        c.input.forward = true;
        c.input.left = true;
        c.update(1.0, &world);
        let moved = (c.position - start) * Vec3::new(1.0, 0.0, 1.0);
        assert!((moved.length() - MOVEMENT_SPEED).abs() < 1e-4);
        assert!(moved.x < 0.0);
    }

    #[test]
    fn test_ground_following_is_rate_limited() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        c.position.y = 5.0;
        c.input.forward = true;
        c.update(1.0, &world);
        assert!((c.position.y - (5.0 - Y_MOVEMENT_INCREMENT)).abs() < 1e-5);
    }

    #[test]
    fn test_ground_following_never_overshoots() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        c.position.y = 1.0;
        c.input.forward = true;
        c.update(10.0, &world);
        assert!((c.position.y - MAX_GROUND_DIST).abs() < 1e-5);

        c.position.y = 1.8;
        c.update(10.0, &world);
        assert!((c.position.y - MIN_GROUND_DIST).abs() < 1e-5);
    }

    #[test]
    fn test_collision_blocks_whole_step() {
        let mut world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        world.wall_z = Some(c.position.z - 0.1);
        c.settings.collisions = true;
        c.input.forward = true;
        c.input.left = true;
        let before = c.position;
        c.update(0.1, &world);
        assert_eq!(c.position, before);

        c.toggle_collisions();
        c.update(0.1, &world);
        assert_ne!(c.position, before);
    }

    #[test]
    fn test_low_collidable_hits_do_not_block() {
        let world = FlatWorld::new(0.0);
        let c = walker(&world);
        struct Low;
        impl WorldView for Low {
            fn distance_to_walkable(&self, _: Vec3) -> Option<f32> {
                None
            }
            fn collision_point(&self, from: Vec3) -> Option<Vec3> {
                Some(Vec3::new(from.x, -1.0, from.z))
            }
            fn ground_min_height(&self) -> f32 {
                -1.0
            }
            fn start_position(&self) -> Option<Vec3> {
                None
            }
        }
        assert!(!c.is_colliding(Vec3::NEG_Z, &Low));
    }

    #[test]
    fn test_leaving_fly_snaps_to_ground() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        c.toggle_fly(&world);
        c.rotate_from_mouse(100.0, 50.0);
        c.input.up = true;
        c.update(2.0, &world);
        assert!(c.position.y > MAX_GROUND_DIST + 1.0);

        c.toggle_fly(&world);
        assert!(!c.is_flying());
        assert_eq!((c.yaw(), c.pitch()), (0.0, 0.0));
        assert!((c.position.y - MAX_GROUND_DIST).abs() < 1e-4);
    }

    #[test]
    fn test_change_speed_targets_active_mode() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        c.change_speed(1.0);
        assert_eq!(c.settings.movement_speed, MOVEMENT_SPEED + MOVEMENT_SPEED_INCREMENT);
        c.toggle_fly(&world);
        c.change_speed(-1.0);
        assert_eq!(c.settings.fly_speed, FLY_SPEED - MOVEMENT_SPEED_INCREMENT);
        c.change_speed(-100.0);
        assert_eq!(c.settings.fly_speed, 0.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        c.rotate_from_mouse(0.0, -1.0e6);
        assert!(c.pitch() < std::f32::consts::FRAC_PI_2);
        assert!(c.forward().y > 0.99);
    }

    #[test]
    fn test_face_turns_towards_target() {
        let world = FlatWorld::new(0.0);
        let mut c = walker(&world);
        c.face(c.position + EAST * 3.0 + Vec3::Y);
        assert!((c.flat_forward() - EAST).length() < 1e-5);
        c.face(c.position + SOUTH);
        assert!((c.flat_forward() - SOUTH).length() < 1e-5);
    }

    #[test]
    fn test_key_mapping() {
        let mut input = MoveInput::default();
        assert!(input.set_key("ArrowUp", true));
        assert!(input.forward && input.is_moving());
        assert!(input.set_key("KeyW", false));
        assert!(!input.forward);
        assert!(!input.set_key("KeyE", true));
    }
}
