//! Grounding objects onto the terrain
//!
//! An object is lowered until its test points rest on the surface below
//! them. Test points start from a height above everything in scope and the
//! largest probe distance wins, so the object settles at its lowest surface
//! sample and never hovers over a dip.

use glam::Vec3;

use super::probe::{GroundProbe, ProbeScope};
use super::state::SceneHandle;
use crate::consts::ALL_SURFACES_PROBE_HEIGHT;
use crate::geom::NodeId;

/// Start height above the tallest terrain vertex for terrain-only probes
const TERRAIN_PROBE_CLEARANCE: f32 = 0.0001;

/// An object whose test points all missed the ground
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementFailure {
    pub node: NodeId,
    pub test_points: Vec<Vec3>,
    pub offset: f32,
    pub scope: ProbeScope,
}

/// Result of one grounding attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Resting on a surface at local height `y`
    Grounded { y: f32 },
    /// Nothing below any test point; parked at a tentative height and queued
    Tentative { y: f32 },
}

impl Placement {
    #[inline]
    pub fn y(&self) -> f32 {
        match *self {
            Placement::Grounded { y } | Placement::Tentative { y } => y,
        }
    }

    #[inline]
    pub fn is_grounded(&self) -> bool {
        matches!(self, Placement::Grounded { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PlacementEngine {
    scene: SceneHandle,
    probe: GroundProbe,
}

impl PlacementEngine {
    pub fn new(scene: SceneHandle) -> Self {
        let probe = GroundProbe::new(scene.clone());
        Self { scene, probe }
    }

    #[inline]
    pub fn probe(&self) -> &GroundProbe {
        &self.probe
    }

    /// Height every test point is lifted to before probing
    pub fn probe_height(&self, scope: ProbeScope) -> f32 {
        match scope {
            ProbeScope::TerrainOnly => {
                self.scene.borrow().heights.max + TERRAIN_PROBE_CLEARANCE
            }
            ProbeScope::AllSurfaces => ALL_SURFACES_PROBE_HEIGHT,
        }
    }

    /// Lower `node` onto the ground beneath `test_points` (world XZ).
    ///
    /// A positive `offset` lifts the object, a negative one sinks it in.
    pub async fn ground_object(
        &self,
        node: NodeId,
        test_points: Vec<Vec3>,
        offset: f32,
        scope: ProbeScope,
    ) -> Placement {
        // The probe height depends on the terrain's height range
        let terrain = self.scene.borrow().terrain_built.wait();
        terrain.await;

        let top = self.probe_height(scope);
        let mut points = test_points;
        let mut max_dist: Option<f32> = None;
        for p in &mut points {
            p.y = top;
            if let Some(d) = self.probe.distance_to_ground(*p, scope).await {
                max_dist = Some(max_dist.map_or(d, |m: f32| m.max(d)));
            }
        }

        let mut state = self.scene.borrow_mut();
        let debug = state.config.debug;
        let dist = match max_dist {
            Some(d) => d,
            None => {
                if debug {
                    log::debug!(
                        "SceneBuilder: grounding failed on \"{}\"",
                        state.graph.node(node).name
                    );
                }
                state.failures.push(PlacementFailure {
                    node,
                    test_points: points,
                    offset,
                    scope,
                });
                0.0
            }
        };

        let parent_y = state
            .graph
            .parent(node)
            .map(|p| state.graph.node(p).position.y)
            .unwrap_or(0.0);
        let y = top - parent_y - dist + offset;
        let target = state.graph.node_mut(node);
        if debug {
            log::debug!(
                "SceneBuilder: grounding \"{}\" max_dist={dist} y {} -> {y}",
                target.name,
                target.position.y
            );
        }
        target.position.y = y;

        if max_dist.is_some() {
            Placement::Grounded { y }
        } else {
            Placement::Tentative { y }
        }
    }

    /// Re-ground every queued failure once, newest first. Entries that fail
    /// again stay queued.
    pub async fn retry_failures(&self) -> usize {
        let mut queue = std::mem::take(&mut self.scene.borrow_mut().failures);
        let mut recovered = 0;
        while let Some(f) = queue.pop() {
            let placement = self
                .ground_object(f.node, f.test_points, f.offset, f.scope)
                .await;
            if placement.is_grounded() {
                recovered += 1;
            }
        }
        if recovered > 0 {
            log::info!("SceneBuilder: {recovered} objects grounded on retry.");
        }
        recovered
    }

    pub fn pending_failures(&self) -> usize {
        self.scene.borrow().failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Mesh, Node};
    use crate::scene::probe::tests::flat_scene;
    use futures::executor::block_on;
    use glam::UVec3;

    fn ramp_scene() -> SceneHandle {
        // Terrain rising along +X: y = x / 10
        let scene = flat_scene(0.0);
        {
            let mut state = scene.borrow_mut();
            let terrain = state.nodes.terrain.unwrap();
            if let Some(mesh) = state.graph.node_mut(terrain).mesh_mut() {
                mesh.update_positions(|_, p| Vec3::new(p.x, p.x / 10.0, p.z));
            }
            state.heights.min = -1.0;
            state.heights.max = 1.0;
            state.terrain_built.set();
        }
        scene
    }

    fn spawn_box(scene: &SceneHandle) -> NodeId {
        scene.borrow_mut().graph.add_to_scene(
            Node::new("crate").with_mesh(Mesh::cuboid(Vec3::ONE, UVec3::ONE)),
        )
    }

    #[test]
    fn test_single_point_on_flat_ground() {
        let scene = flat_scene(0.5);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene.clone());
        let node = spawn_box(&scene);
        let placed = block_on(engine.ground_object(
            node,
            vec![Vec3::new(1.1, 99.0, 2.3)],
            0.0,
            ProbeScope::TerrainOnly,
        ));
        assert!(placed.is_grounded());
        assert!((placed.y() - 0.5).abs() < 1e-4);
        assert!((scene.borrow().graph.node(node).position.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_max_distance_settles_on_lowest_sample() {
        let scene = ramp_scene();
        let engine = PlacementEngine::new(scene.clone());
        let node = spawn_box(&scene);
        let placed = block_on(engine.ground_object(
            node,
            vec![Vec3::new(-5.1, 0.0, 0.3), Vec3::new(5.1, 0.0, 0.3)],
            0.0,
            ProbeScope::TerrainOnly,
        ));
        // Samples at -0.51 and +0.51; the deeper probe wins
        assert!((placed.y() - (-0.51)).abs() < 1e-3);
    }

    #[test]
    fn test_offset_and_parent_height() {
        let scene = flat_scene(2.0);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene.clone());
        let node = {
            let mut state = scene.borrow_mut();
            let parent = state
                .graph
                .add_to_scene(Node::new("group").with_position(Vec3::new(0.0, 0.5, 0.0)));
            let child = state.graph.spawn(Node::new("child"));
            state.graph.attach(parent, child);
            child
        };
        let placed = block_on(engine.ground_object(
            node,
            vec![Vec3::new(0.3, 0.0, 0.3)],
            -0.1,
            ProbeScope::TerrainOnly,
        ));
        assert!((placed.y() - (2.0 - 0.5 - 0.1)).abs() < 1e-4);
    }

    #[test]
    fn test_miss_is_tentative_and_queued() {
        let scene = flat_scene(1.0);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene.clone());
        let node = spawn_box(&scene);
        let placed = block_on(engine.ground_object(
            node,
            vec![Vec3::new(100.0, 0.0, 100.0)],
            0.25,
            ProbeScope::TerrainOnly,
        ));
        // Sentinel minus nothing, plus offset
        assert_eq!(placed, Placement::Tentative { y: 1.0 + 0.0001 + 0.25 });
        assert_eq!(engine.pending_failures(), 1);
        let failure = scene.borrow().failures[0].clone();
        assert_eq!(failure.node, node);
        assert_eq!(failure.offset, 0.25);
        assert_eq!(failure.scope, ProbeScope::TerrainOnly);
    }

    #[test]
    fn test_all_surfaces_uses_fixed_probe_height() {
        let scene = flat_scene(0.0);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene);
        assert_eq!(engine.probe_height(ProbeScope::AllSurfaces), 50.0);
        assert!((engine.probe_height(ProbeScope::TerrainOnly) - 0.0001).abs() < 1e-7);
    }

    #[test]
    fn test_retry_drains_lifo_once() {
        let scene = flat_scene(0.0);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene.clone());
        let a = spawn_box(&scene);
        let b = spawn_box(&scene);
        let miss = vec![Vec3::new(100.0, 0.0, 0.3)];
        block_on(engine.ground_object(a, miss.clone(), 0.0, ProbeScope::TerrainOnly));
        block_on(engine.ground_object(b, miss, 0.0, ProbeScope::TerrainOnly));

        // Stretch the terrain out under both
        {
            let mut state = scene.borrow_mut();
            let terrain = state.nodes.terrain.unwrap();
            state.graph.node_mut(terrain).scale = Vec3::new(20.0, 1.0, 1.0);
        }
        let recovered = block_on(engine.retry_failures());
        assert_eq!(recovered, 2);
        assert_eq!(engine.pending_failures(), 0);

        // Still-missing entries are re-queued, not retried again this cycle
        let c = spawn_box(&scene);
        block_on(engine.ground_object(
            c,
            vec![Vec3::new(0.0, 0.0, 500.0)],
            0.0,
            ProbeScope::TerrainOnly,
        ));
        assert_eq!(block_on(engine.retry_failures()), 0);
        assert_eq!(engine.pending_failures(), 1);
    }

    #[test]
    fn test_extra_points_on_flat_ground_keep_height() {
        let scene = flat_scene(0.7);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene.clone());
        let node = spawn_box(&scene);
        let one = vec![Vec3::new(0.4, 0.0, 0.9)];
        let three = vec![
            Vec3::new(0.4, 0.0, 0.9),
            Vec3::new(-3.3, 0.0, 2.1),
            Vec3::new(5.7, 0.0, -6.2),
        ];

        let single = block_on(engine.ground_object(node, one, 0.05, ProbeScope::TerrainOnly));
        let many = block_on(engine.ground_object(node, three, 0.05, ProbeScope::TerrainOnly));
        assert!(single.is_grounded() && many.is_grounded());
        assert!((single.y() - 0.75).abs() < 1e-4);
        assert!((many.y() - single.y()).abs() < 1e-5);
    }

    #[test]
    fn test_three_misses_record_one_failure() {
        let scene = flat_scene(1.0);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene.clone());
        let node = spawn_box(&scene);
        let misses = vec![
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -30.0),
            Vec3::new(-30.0, 0.0, 30.0),
        ];
        let placed = block_on(engine.ground_object(node, misses, 0.0, ProbeScope::TerrainOnly));

        // Distance 0 from the sentinel height
        assert_eq!(placed, Placement::Tentative { y: engine.probe_height(ProbeScope::TerrainOnly) });
        assert_eq!(engine.pending_failures(), 1);
        assert_eq!(scene.borrow().failures[0].test_points.len(), 3);
    }

    #[test]
    fn test_retry_keeps_only_the_still_failing_entry() {
        let scene = flat_scene(0.0);
        scene.borrow().terrain_built.set();
        let engine = PlacementEngine::new(scene.clone());
        let near = spawn_box(&scene);
        let far = spawn_box(&scene);
        block_on(engine.ground_object(near, vec![Vec3::new(100.0, 0.0, 0.3)], 0.0, ProbeScope::TerrainOnly));
        block_on(engine.ground_object(far, vec![Vec3::new(500.0, 0.0, 0.3)], 0.0, ProbeScope::TerrainOnly));
        assert_eq!(engine.pending_failures(), 2);

        // Terrain now reaches x = 200, enough for `near` only
        {
            let mut state = scene.borrow_mut();
            let terrain = state.nodes.terrain.unwrap();
            state.graph.node_mut(terrain).scale = Vec3::new(20.0, 1.0, 1.0);
        }
        assert_eq!(block_on(engine.retry_failures()), 1);
        assert_eq!(engine.pending_failures(), 1);
        assert_eq!(scene.borrow().failures[0].node, far);
        assert!(scene.borrow().graph.node(near).position.y.abs() < 1e-4);
    }
}
