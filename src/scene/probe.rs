//! Downward ground probes

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::coordinator::Phase;
use super::state::SceneHandle;
use crate::geom::{NodeId, Ray};

/// Groups whose geometry counts as ground for unrestricted probes
pub const SURFACE_GROUPS: [&str; 3] = ["fence", "mausoleum", "graves"];

/// Which surfaces a probe may land on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProbeScope {
    /// The terrain mesh only
    #[default]
    TerrainOnly,
    /// Terrain, path, fence, mausoleum and graves
    AllSurfaces,
}

/// Casts rays straight down into the scene under construction.
///
/// Probes suspend until the surfaces they may hit exist, so callers never
/// race the build order.
#[derive(Debug, Clone)]
pub struct GroundProbe {
    scene: SceneHandle,
}

impl GroundProbe {
    pub fn new(scene: SceneHandle) -> Self {
        Self { scene }
    }

    /// Resolve once every surface `scope` may hit is built
    pub async fn surfaces_ready(&self, scope: ProbeScope) {
        let terrain = self.scene.borrow().terrain_built.wait();
        terrain.await;
        if scope == ProbeScope::TerrainOnly {
            return;
        }

        let waits = {
            let state = self.scene.borrow();
            let mut waits = vec![state.coordinator.wait_phase(Phase::Ground)];
            waits.extend(
                SURFACE_GROUPS
                    .iter()
                    .filter_map(|g| state.coordinator.wait_group(g).ok()),
            );
            waits
        };
        futures::future::join_all(waits).await;
    }

    /// Distance from `point` straight down to the nearest surface in
    /// `scope`, or `None` if nothing lies below
    pub async fn distance_to_ground(&self, point: Vec3, scope: ProbeScope) -> Option<f32> {
        self.surfaces_ready(scope).await;
        self.cast(point, scope)
    }

    /// Non-waiting cast against whatever is built right now
    pub fn cast(&self, point: Vec3, scope: ProbeScope) -> Option<f32> {
        let state = self.scene.borrow();
        let nodes = &state.nodes;
        let (targets, recursive): (Vec<NodeId>, bool) = match scope {
            ProbeScope::TerrainOnly => (nodes.terrain.into_iter().collect(), false),
            ProbeScope::AllSurfaces => (
                [
                    nodes.terrain,
                    nodes.path,
                    nodes.fence,
                    nodes.mausoleum,
                    nodes.graves,
                ]
                .into_iter()
                .flatten()
                .collect(),
                true,
            ),
        };
        let hit = state
            .graph
            .raycast(&targets, &Ray::down(point), recursive)
            .first()
            .map(|h| h.distance);
        if state.config.debug {
            log::debug!("GroundProbe: {point} ({scope:?}) -> {hit:?}");
        }
        hit
    }
}
