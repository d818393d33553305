//! Fence borders and the entrance gate

use std::f32::consts::{FRAC_PI_2, PI};
use std::rc::Rc;

use glam::Vec3;

use crate::consts::{SOUTH, WEST};
use crate::geom::{Material, Node, NodeId, PointLight, SceneGraph, ShadowTag, Texture};
use crate::scene::assets::{paths, MaterialSpec, Model};
use crate::scene::context::BuildContext;
use crate::scene::probe::ProbeScope;

pub const GROUP: &str = "fence";

const SEGMENT_SCALE: f32 = 0.0357;
/// Overlap between consecutive segments, in model units
const SEGMENT_OVERLAP: f32 = 3.0;
const GATE_SCALE: f32 = 0.052;
/// Pulls the gate off-centre so it lines up with the wall gap
const GATE_NUDGE: f32 = -0.55;
const SINK: f32 = -0.02;
const GATE_LIGHT_COLOR: u32 = 0xf6e1ae;
const GATE_LIGHT_RANGE: f32 = 10.0;

/// One side of the fence: corner it starts from and its turn about Y
struct Border {
    name: &'static str,
    corner: Vec3,
    yaw: f32,
}

fn borders(edge: f32) -> [Border; 4] {
    [
        Border {
            name: "Fence Border North",
            corner: Vec3::new(edge, 0.0, -edge),
            yaw: FRAC_PI_2,
        },
        Border {
            name: "Fence Border East",
            corner: Vec3::new(edge, 0.0, edge),
            yaw: 0.0,
        },
        Border {
            name: "Fence Border West",
            corner: Vec3::new(-edge, 0.0, -edge),
            yaw: PI,
        },
        Border {
            name: "Fence Border South",
            corner: Vec3::new(-edge, 0.0, edge),
            yaw: -FRAC_PI_2,
        },
    ]
}

/// Segment geometry in model units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentMetrics {
    /// Pillar offset along the segment
    pub pillar_z: f32,
    /// World length of one segment
    pub length: f32,
    /// World distance between consecutive segments
    pub step: f32,
}

impl SegmentMetrics {
    pub fn new(wall_half_depth: f32, pillar_half_depth: f32) -> Self {
        let length = (wall_half_depth * 2.0 + pillar_half_depth * 2.0 - SEGMENT_OVERLAP) * SEGMENT_SCALE;
        Self {
            pillar_z: wall_half_depth + pillar_half_depth - SEGMENT_OVERLAP,
            length,
            step: length - SEGMENT_OVERLAP * SEGMENT_SCALE,
        }
    }

    /// Segments needed to cover one side (fractional)
    pub fn per_side(&self, side: f32) -> f32 {
        side / self.step
    }

    /// Local Z of segment `i` (1-based) along its border
    pub fn offset(&self, i: usize) -> f32 {
        -((i - 1) as f32 * self.step + self.length / 2.0)
    }
}

pub async fn build(ctx: BuildContext) {
    let fence = {
        let mut state = ctx.scene.borrow_mut();
        let fence = state
            .graph
            .add_to_scene(Node::new("Fence Whole").with_shadow(ShadowTag::CastAndReceive));
        state.nodes.fence = Some(fence);
        state.collidable.push(fence);
        fence
    };

    let (gate, walls) = futures::join!(build_gate(&ctx, fence), build_walls(&ctx, fence));
    if gate && walls {
        ctx.complete_group(GROUP).await;
    }
}

/// Horizontal gate position along the south edge
pub fn gate_position(graveyard_side: f32, gate_size: Vec3) -> Vec3 {
    let half = graveyard_side / 2.0;
    Vec3::new(
        SOUTH.x * half + WEST.x * (gate_size.x / 2.0 + GATE_NUDGE),
        0.0,
        SOUTH.z * half + WEST.z * (gate_size.z / 2.0 + GATE_NUDGE),
    )
}

async fn build_gate(ctx: &BuildContext, fence: NodeId) -> bool {
    let (model, gate_mat, pillar_mat, emission) = futures::join!(
        ctx.load_model(paths::GATE),
        ctx.material(MaterialSpec::new(paths::GATE_DIFFUSE, paths::GATE_NORMAL)),
        ctx.material(MaterialSpec::new(paths::GATE_PILLAR_DIFFUSE, paths::GATE_PILLAR_NORMAL)),
        ctx.load_texture(paths::GATE_LIGHT_EMISSION),
    );
    let (Some(model), Some(gate_mat), Some(pillar_mat), Some(emission)) = (model, gate_mat, pillar_mat, emission)
    else {
        return false;
    };

    let gate = ctx.instantiate(&model);
    let test_points = {
        let mut state = ctx.scene.borrow_mut();
        let side = state.config.graveyard_side;
        let graph = &mut state.graph;
        dress_gate(graph, gate, gate_mat, pillar_mat, emission);

        let node = graph.node_mut(gate);
        node.name = "Gate".into();
        node.scale = Vec3::splat(GATE_SCALE);
        let size = graph.world_bounds(gate).size();
        graph.node_mut(gate).position = gate_position(side, size);
        let bounds = graph.world_bounds(gate);
        vec![bounds.min, bounds.max]
    };

    ctx.ground(gate, test_points, SINK, ProbeScope::TerrainOnly).await;

    let mut state = ctx.scene.borrow_mut();
    state.graph.attach(fence, gate);
    state.nodes.gate = Some(gate);
    true
}

/// Materials, emissive lamp glass and lights for the gate's parts
fn dress_gate(
    graph: &mut SceneGraph,
    gate: NodeId,
    gate_mat: Material,
    pillar_mat: Material,
    emission: Texture,
) {
    let emission = Rc::new(emission);
    let parts: Vec<NodeId> = graph.children(gate).to_vec();
    for part in parts {
        let name = graph.node(part).name.clone();
        if name.contains("lightlower") {
            let mut glass = Material::new();
            glass.emissive = GATE_LIGHT_COLOR;
            glass.emissive_map = Some(emission.clone());
            glass.emissive_intensity = 1.0;
            let node = graph.node_mut(part);
            node.material = Some(glass);
            node.shadow_tag = Some(ShadowTag::Off);
        } else if name.contains("lightupper") {
            // Light sits at the centre of the lamp, in the gate's own units
            let centre = graph
                .node(part)
                .mesh
                .as_ref()
                .map(|m| m.bounds().center())
                .unwrap_or(Vec3::ZERO);
            let at = graph.node(part).local_matrix().transform_point3(centre);
            let light = Node::new(format!("{name} light"))
                .with_position(at)
                .with_shadow(ShadowTag::Off)
                .with_light(PointLight {
                    color: GATE_LIGHT_COLOR,
                    intensity: 1.0,
                    range: GATE_LIGHT_RANGE,
                    cast_shadow: true,
                });
            graph.spawn_child(gate, light);
            graph.node_mut(part).shadow_tag = Some(ShadowTag::Off);
        } else if name.contains("pillar") {
            let node = graph.node_mut(part);
            node.material = Some(pillar_mat.clone());
            node.shadow_tag = Some(ShadowTag::Off);
        } else {
            graph.node_mut(part).material = Some(gate_mat.clone());
        }
    }
}

async fn build_walls(ctx: &BuildContext, fence: NodeId) -> bool {
    let Some(models) = ctx.load_models(&[paths::FENCE_PILLAR, paths::FENCE_WALL]).await else {
        return false;
    };
    let [pillar_model, wall_model] = models.as_slice() else {
        return false;
    };
    let pillar_model = pillar_model.children.first().unwrap_or(pillar_model);

    let segments = {
        let mut state = ctx.scene.borrow_mut();
        let side = state.config.graveyard_side;
        let graph = &mut state.graph;

        let template = make_segment(graph, wall_model, pillar_model);
        let metrics = segment_metrics(graph, template);
        let count = metrics.per_side(side);
        let gap = (count / 2.0) as usize;
        log::debug!("SceneBuilder: {count:.2} fence segments per side, gap at {gap}");

        let edge = side / 2.0 - 0.0001;
        let mut segments = Vec::new();
        for border in borders(edge) {
            let mut node = Node::new(border.name).with_position(border.corner);
            node.rotate_world(Vec3::Y, border.yaw);
            let border_id = graph.spawn_child(fence, node);
            let south = border.name.ends_with("South");

            let mut i = 1;
            while (i as f32) < count {
                // South border leaves a gap for the gate; the pillar after it
                // would stand in the gateway
                if !(south && i == gap) {
                    let seg = graph.clone_subtree(template);
                    graph.node_mut(seg).position.z = metrics.offset(i);
                    graph.attach(border_id, seg);
                    if south && i == gap + 1 {
                        if let Some(&pillar) = graph.children(seg).get(1) {
                            graph.detach(pillar);
                        }
                    }
                    segments.push(seg);
                }
                i += 1;
            }
        }
        segments
    };

    let placements = segments.into_iter().map(|seg| {
        let bounds = ctx.scene.borrow().graph.world_bounds(seg);
        ctx.ground(seg, vec![bounds.min, bounds.max], SINK, ProbeScope::TerrainOnly)
    });
    futures::future::join_all(placements).await;
    true
}

/// Detached wall + pillar group, scaled to world units
fn make_segment(graph: &mut SceneGraph, wall: &Model, pillar: &Model) -> NodeId {
    let segment = graph.spawn(Node::new("Fence Wall Segment"));
    graph.node_mut(segment).scale = Vec3::splat(SEGMENT_SCALE);
    let wall = wall.instantiate(graph);
    graph.attach(segment, wall);
    let pillar = pillar.instantiate(graph);
    graph.node_mut(pillar).shadow_tag = Some(ShadowTag::Off);
    graph.attach(segment, pillar);
    segment
}

fn segment_metrics(graph: &mut SceneGraph, segment: NodeId) -> SegmentMetrics {
    let (wall, pillar) = match graph.children(segment) {
        [wall, pillar, ..] => (*wall, *pillar),
        _ => return SegmentMetrics::new(0.0, 0.0),
    };
    // The template is detached and uniformly scaled, so this is model units
    let half_depth = |graph: &SceneGraph, id: NodeId| graph.world_bounds(id).max.z / SEGMENT_SCALE;
    let metrics = SegmentMetrics::new(half_depth(graph, wall), half_depth(graph, pillar));
    graph.node_mut(pillar).position.z = metrics.pillar_z;
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_metrics() {
        let m = SegmentMetrics::new(41.5, 8.0);
        assert!((m.pillar_z - 46.5).abs() < 1e-5);
        assert!((m.length - 96.0 * 0.0357).abs() < 1e-5);
        assert!((m.step - 93.0 * 0.0357).abs() < 1e-5);
        assert!((m.offset(1) + m.length / 2.0).abs() < 1e-5);
        assert!((m.offset(3) + 2.0 * m.step + m.length / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_gate_sits_on_south_edge_west_of_centre() {
        let p = gate_position(27.0, Vec3::new(3.3, 3.0, 0.3));
        assert!((p.z - 13.5).abs() < 1e-5);
        assert!((p.x - -(1.65 - 0.55)).abs() < 1e-5);
    }

    #[test]
    fn test_borders_run_along_their_sides() {
        for border in borders(10.0) {
            let mut node = Node::new(border.name);
            node.rotate_world(Vec3::Y, border.yaw);
            // Segments extend along the border's local -Z
            let run = node.rotation * Vec3::NEG_Z;
            let end = border.corner + run * 20.0;
            assert!(end.x.abs() <= 10.0 + 1e-3 && end.z.abs() <= 10.0 + 1e-3, "{}", border.name);
        }
    }
}
