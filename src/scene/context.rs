//! Shared handles for the async build tasks

use std::rc::Rc;

use glam::Vec3;

use super::assets::{make_material, AssetError, AssetSource, MaterialSpec, Model};
use super::coordinator::{Phase, Transition};
use super::placement::{Placement, PlacementEngine};
use super::probe::ProbeScope;
use super::state::SceneHandle;
use crate::geom::{Material, NodeId, Texture};

/// Everything a category builder needs; cheap to clone into each task
#[derive(Clone)]
pub struct BuildContext {
    pub scene: SceneHandle,
    pub assets: Rc<dyn AssetSource>,
    pub placement: PlacementEngine,
}

impl BuildContext {
    pub fn new(scene: SceneHandle, assets: Rc<dyn AssetSource>) -> Self {
        let placement = PlacementEngine::new(scene.clone());
        Self {
            scene,
            assets,
            placement,
        }
    }

    fn record_failure(&self, err: AssetError) {
        log::error!("SceneBuilder: {err}");
        self.scene.borrow_mut().load_failures.push(err);
    }

    /// Load one model; failures are logged and recorded, never retried
    pub async fn load_model(&self, path: &str) -> Option<Model> {
        match self.assets.load(path).await {
            Ok(model) => Some(model),
            Err(err) => {
                self.record_failure(err);
                None
            }
        }
    }

    /// Load several models concurrently; `None` if any of them failed
    pub async fn load_models(&self, paths: &[&str]) -> Option<Vec<Model>> {
        let loads = paths.iter().map(|p| self.load_model(p));
        futures::future::join_all(loads).await.into_iter().collect()
    }

    pub async fn load_texture(&self, path: &str) -> Option<Texture> {
        match self.assets.load_texture(path).await {
            Ok(texture) => Some(texture),
            Err(err) => {
                self.record_failure(err);
                None
            }
        }
    }

    pub async fn material(&self, spec: MaterialSpec<'_>) -> Option<Material> {
        match make_material(self.assets.as_ref(), spec).await {
            Ok(material) => Some(material),
            Err(err) => {
                self.record_failure(err);
                None
            }
        }
    }

    /// Instantiate a model as a detached subtree
    pub fn instantiate(&self, model: &Model) -> NodeId {
        model.instantiate(&mut self.scene.borrow_mut().graph)
    }

    #[inline]
    pub async fn ground(&self, node: NodeId, test_points: Vec<Vec3>, offset: f32, scope: ProbeScope) -> Placement {
        self.placement.ground_object(node, test_points, offset, scope).await
    }

    /// Mark a load group done and finalize if that completed the scene
    pub async fn complete_group(&self, name: &str) {
        let transition = self.scene.borrow_mut().coordinator.mark_group_complete(name);
        match transition {
            Ok(t) => self.on_transition(t).await,
            Err(err) => log::error!("SceneBuilder: {err}"),
        }
    }

    pub async fn complete_phase(&self, phase: Phase) {
        let transition = self.scene.borrow_mut().coordinator.mark_phase_ready(phase);
        self.on_transition(transition).await;
    }

    async fn on_transition(&self, transition: Transition) {
        if transition == Transition::SceneReady {
            self.finalize().await;
        }
    }

    /// Runs once per build cycle: retry failed placements, resolve shadow
    /// flags, then announce the finished scene
    async fn finalize(&self) {
        self.placement.retry_failures().await;
        {
            let mut state = self.scene.borrow_mut();
            let meshes = state.graph.resolve_shadows();
            log::info!("SceneBuilder: Shadows Configured.");
            log::debug!("SceneBuilder: shadow flags set on {meshes} meshes");
            state.coordinator.mark_scene_built();
        }
    }
}
