//! Scene orchestration
//!
//! [`SceneBuilder`] starts the misc, ground and objects phases and is the one
//! place the rest of the game asks whether the scene is ready and what can be
//! walked on or bumped into.

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use glam::Vec3;

use super::assets::{AssetError, AssetSource};
use super::context::BuildContext;
use super::layout::Layout;
use super::readiness::WaitReady;
use super::state::{SceneConfig, SceneHandle, SceneState};
use super::terrain::HeightRange;
use super::weather::Weather;
use super::{objects, terrain, weather};
use crate::controller::{MovementController, WorldView};
use crate::game::GameController;
use crate::geom::{NodeId, Ray};

pub struct SceneBuilder {
    config: SceneConfig,
    scene: SceneHandle,
    assets: Rc<dyn AssetSource>,
}

impl SceneBuilder {
    pub fn new(config: SceneConfig, assets: Rc<dyn AssetSource>) -> Self {
        Self {
            config,
            scene: SceneHandle::new(SceneState::new(config)),
            assets,
        }
    }

    #[inline]
    pub fn config(&self) -> SceneConfig {
        self.config
    }

    /// Takes effect on the next [`Self::build_all`]
    pub fn set_config(&mut self, config: SceneConfig) {
        self.config = config;
    }

    /// State of the current build cycle
    #[inline]
    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    /// Start a fresh build cycle and return the future driving it.
    ///
    /// The new cycle gets its own state with every readiness flag cleared and
    /// the RNG reseeded; tasks still running from an earlier cycle keep the
    /// old state and never touch the new one. Spawn the returned future on a
    /// local executor and poll [`Self::is_built`] or await
    /// [`Self::wait_built`].
    pub fn build_all(&mut self) -> LocalBoxFuture<'static, ()> {
        let mut state = SceneState::new(self.config);
        for group in objects::GROUPS {
            if let Err(err) = state.coordinator.register(group) {
                log::error!("SceneBuilder: {err}");
            }
        }
        state.coordinator.seal();
        let layout = Layout::generate(&mut state.rng);

        self.scene = SceneHandle::new(state);
        log::info!("SceneBuilder: building scene with seed {}", self.config.seed);

        let ctx = BuildContext::new(self.scene.clone(), self.assets.clone());
        async move {
            futures::join!(
                weather::build(ctx.clone()),
                terrain::build(ctx.clone()),
                objects::build_all(&ctx, layout),
            );
        }
        .boxed_local()
    }

    /// Every phase is done and finalization has run
    pub fn is_built(&self) -> bool {
        self.scene.borrow().coordinator.is_scene_built()
    }

    pub fn wait_built(&self) -> WaitReady {
        self.scene.borrow().coordinator.wait_scene_built()
    }

    pub fn walkable_objects(&self) -> Vec<NodeId> {
        self.scene.borrow().walkable.clone()
    }

    pub fn collidable_objects(&self) -> Vec<NodeId> {
        self.scene.borrow().collidable.clone()
    }

    pub fn heights(&self) -> HeightRange {
        self.scene.borrow().heights
    }

    pub fn key(&self) -> Option<NodeId> {
        self.scene.borrow().nodes.key
    }

    pub fn gate(&self) -> Option<NodeId> {
        self.scene.borrow().nodes.gate
    }

    /// Assets that failed to load this cycle; any entry stalls the build
    pub fn load_failures(&self) -> Vec<AssetError> {
        self.scene.borrow().load_failures.clone()
    }

    /// Objects still parked at a tentative height after the final retry
    pub fn placement_failures(&self) -> usize {
        self.scene.borrow().failures.len()
    }

    /// Game logic for the finished scene
    pub fn game(&self) -> Option<GameController> {
        if !self.is_built() {
            return None;
        }
        Some(GameController::new(self.key()?, self.gate()?))
    }

    /// Per-frame scene animation; does nothing until the scene is built
    pub fn update(&self, dt: f32) {
        if !self.is_built() {
            return;
        }
        let mut guard = self.scene.borrow_mut();
        let state = &mut *guard;
        if let Some(weather) = state.weather.as_mut() {
            weather.update(&mut state.graph, &mut state.rng, dt);
        }
    }

    /// One frame in fixed order: scene animation, then the player, then the
    /// game state check. Returns false once the game is over.
    pub fn advance(&self, dt: f32, player: &mut MovementController, game: Option<&GameController>) -> bool {
        if !self.is_built() {
            return true;
        }
        self.update(dt);
        player.update(dt, self);
        !game.is_some_and(GameController::has_finished)
    }

    fn with_weather<R>(&self, f: impl FnOnce(&mut Weather) -> R) -> Option<R> {
        self.scene.borrow_mut().weather.as_mut().map(f)
    }

    pub fn ambient_color(&self) -> Option<u32> {
        self.with_weather(|w| w.ambient.color())
    }

    pub fn toggle_ambient_light(&self) {
        if self.with_weather(|w| w.ambient.toggle()).is_some() {
            log::info!("Toggled ambient light.");
        }
    }

    pub fn toggle_rain(&self) {
        if let Some(visible) = self.with_weather(|w| {
            w.rain.visible = !w.rain.visible;
            w.rain.visible
        }) {
            log::info!("Rain {}.", if visible { "enabled" } else { "disabled" });
        }
    }

    pub fn toggle_lightning(&self) {
        if let Some(disabled) = self.with_weather(|w| {
            w.lightning.disabled = !w.lightning.disabled;
            w.lightning.disabled
        }) {
            log::info!("Lightning {}.", if disabled { "disabled" } else { "enabled" });
        }
    }

    pub fn toggle_infinite_lightning(&self) {
        if let Some(infinite) = self.with_weather(|w| {
            w.lightning.infinite = !w.lightning.infinite;
            w.lightning.infinite
        }) {
            log::info!("Infinite lightning {}.", if infinite { "enabled" } else { "disabled" });
        }
    }

    pub fn trigger_lightning(&self) {
        if self.with_weather(|w| w.lightning.trigger()).is_some() {
            log::info!("Lightning triggered.");
        }
    }

    /// Flip wireframe on every material; the first one found decides the new
    /// value for all of them
    pub fn toggle_wireframe(&self) -> bool {
        let mut state = self.scene.borrow_mut();
        let root = state.graph.root();
        let mut wire = None;
        for id in state.graph.descendants(root) {
            if let Some(material) = state.graph.node_mut(id).material.as_mut() {
                let on = *wire.get_or_insert(!material.wireframe);
                material.wireframe = on;
            }
        }
        log::info!("Toggled wireframes.");
        wire.unwrap_or(false)
    }
}

impl WorldView for SceneBuilder {
    fn distance_to_walkable(&self, from: Vec3) -> Option<f32> {
        let state = self.scene.borrow();
        state
            .graph
            .raycast(&state.walkable, &Ray::down(from), true)
            .first()
            .map(|hit| hit.distance)
    }

    fn collision_point(&self, from: Vec3) -> Option<Vec3> {
        let state = self.scene.borrow();
        state
            .graph
            .raycast(&state.collidable, &Ray::down(from), true)
            .first()
            .map(|hit| hit.point)
    }

    fn ground_min_height(&self) -> f32 {
        self.scene.borrow().heights.min
    }

    fn start_position(&self) -> Option<Vec3> {
        let state = self.scene.borrow();
        state.nodes.gate.map(|gate| state.graph.world_position(gate))
    }
}
