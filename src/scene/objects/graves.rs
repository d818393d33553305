//! Graves: a gravestone and a body (mound or stone coffin), each optional
//!
//! Templates are prepared once per build: gravestones are split out of
//! multi-stone models, stood upright, turned to face +Z and centred with
//! their base on the origin. Each grave then rolls its parts.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_8};

use futures::future::join_all;
use glam::{Vec2, Vec3};
use rand::Rng;

use crate::geom::{Node, NodeId, SceneGraph, ShadowTag};
use crate::scene::assets::{paths, MaterialSpec, Model};
use crate::scene::context::BuildContext;
use crate::scene::layout::Transform;
use crate::scene::probe::ProbeScope;

pub const GROUP: &str = "graves";

/// Chance that a part is left out
const MISSING_CHANCE: f32 = 0.1;
/// Chance that a present gravestone lies knocked over
const KNOCKED_CHANCE: f32 = 0.1;
/// Chance that a present body is a mound
const MOUND_CHANCE: f32 = 0.7;
/// Gap between the gravestone's centre and the body
const BODY_GAP: f32 = 0.3;
const MOUND_SIZE: Vec3 = Vec3::new(2.2, 2.2, 2.2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravestoneRoll {
    pub index: usize,
    pub knocked_over: bool,
    pub scale: f32,
    pub yaw: f32,
    pub offset: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyRoll {
    /// 0 is the mound, the rest are stone coffins
    pub index: usize,
    pub scale: f32,
    pub yaw: f32,
    pub offset: Vec2,
}

/// The random choices for one grave
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraveRecipe {
    pub gravestone: Option<GravestoneRoll>,
    pub body: Option<BodyRoll>,
}

impl GraveRecipe {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gravestone.is_none() && self.body.is_none()
    }
}

fn centered(rng: &mut impl Rng) -> f32 {
    (rng.random::<f32>() + rng.random::<f32>()) / 2.0
}

/// Random value in `[-range / 2, range / 2)`, centre-weighted
fn jitter(rng: &mut impl Rng, range: f32) -> f32 {
    centered(rng) * range - range / 2.0
}

/// Roll the parts of one grave from `gravestones` stone types and `bodies`
/// body types (mound first)
pub fn roll_grave(rng: &mut impl Rng, gravestones: usize, bodies: usize) -> GraveRecipe {
    let gravestone = (gravestones > 0 && rng.random::<f32>() > MISSING_CHANCE).then(|| {
        let index = ((rng.random::<f32>() * gravestones as f32) as usize).min(gravestones - 1);
        let knocked_over = rng.random::<f32>() < KNOCKED_CHANCE;
        let scale = 1.0 + jitter(rng, 0.4);
        let spread = FRAC_PI_8 * if knocked_over { 3.0 } else { 1.0 };
        let yaw = jitter(rng, spread);
        let offset = Vec2::new(jitter(rng, 0.2), jitter(rng, 0.2));
        GravestoneRoll {
            index,
            knocked_over,
            scale,
            yaw,
            offset,
        }
    });

    let body = (bodies > 0 && rng.random::<f32>() > MISSING_CHANCE).then(|| {
        let index = if bodies == 1 || rng.random::<f32>() < MOUND_CHANCE {
            0
        } else {
            1 + ((rng.random::<f32>() * (bodies - 1) as f32) as usize).min(bodies - 2)
        };
        let r = rng.random::<f32>();
        let scale = 1.0 + r * r * 0.4 - 0.2;
        let yaw = jitter(rng, FRAC_PI_8);
        let offset = Vec2::new(jitter(rng, 0.2), jitter(rng, 0.2));
        BodyRoll {
            index,
            scale,
            yaw,
            offset,
        }
    });

    GraveRecipe { gravestone, body }
}

/// Nodes of one assembled grave
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraveParts {
    pub root: NodeId,
    pub gravestone: Option<NodeId>,
    pub body: Option<NodeId>,
    pub knocked_over: bool,
}

/// Assemble a detached grave from prepared templates. `None` when the
/// recipe has no parts.
pub fn assemble(
    graph: &mut SceneGraph,
    recipe: &GraveRecipe,
    gravestones: &[NodeId],
    bodies: &[NodeId],
) -> Option<GraveParts> {
    if recipe.is_empty() {
        return None;
    }
    let root = graph.spawn(Node::new("Grave"));

    let gravestone = recipe.gravestone.and_then(|roll| {
        let template = *gravestones.get(roll.index)?;
        let stone = graph.clone_subtree(template);
        let node = graph.node_mut(stone);
        if roll.knocked_over {
            node.rotate_local(Vec3::X, -FRAC_PI_2);
        }
        node.scale *= roll.scale;
        node.rotate_world(Vec3::Y, roll.yaw);
        node.position.x += roll.offset.x;
        node.position.z += roll.offset.y;
        graph.attach(root, stone);
        Some(stone)
    });

    let body = recipe.body.and_then(|roll| {
        let template = *bodies.get(roll.index)?;
        let body = graph.clone_subtree(template);
        // Start just behind the gravestone
        let bounds = graph.world_bounds(body);
        let node = graph.node_mut(body);
        node.position.z += bounds.size().z - bounds.max.z + BODY_GAP;
        node.scale *= roll.scale;
        node.rotate_world(Vec3::Y, roll.yaw);
        node.position.x += roll.offset.x;
        node.position.z += roll.offset.y;
        graph.attach(root, body);
        Some(body)
    });

    Some(GraveParts {
        root,
        gravestone,
        body,
        knocked_over: recipe.gravestone.is_some_and(|g| g.knocked_over) && gravestone.is_some(),
    })
}

/// Stand a gravestone upright facing +Z, centred, base on the origin
pub fn prepare_gravestone(graph: &mut SceneGraph, template: NodeId) {
    let Some(&mesh) = graph.children(template).first() else {
        return;
    };
    {
        let node = graph.node_mut(mesh);
        node.position = Vec3::ZERO;
        node.rotation = glam::Quat::IDENTITY;
    }
    graph.scale_down(mesh, Vec3::ONE);

    let size = graph.world_bounds(mesh).size();
    if size.y < size.x || size.y < size.z {
        let axis = if size.x > size.z { Vec3::Z } else { Vec3::X };
        graph.node_mut(mesh).rotate_world(axis, FRAC_PI_2);
    }
    let size = graph.world_bounds(mesh).size();
    if size.x < size.z {
        graph.node_mut(mesh).rotate_world(Vec3::Y, -FRAC_PI_2);
    }

    let bounds = graph.world_bounds(mesh);
    let node = graph.node_mut(mesh);
    node.position.x += bounds.size().x / 2.0 - bounds.max.x;
    node.position.z += bounds.size().z / 2.0 - bounds.max.z;
    node.position.y -= bounds.min.y;
}

/// One template per stone: single-stone models are used whole, multi-stone
/// models are split
fn gravestone_templates(ctx: &BuildContext, models: &[Model]) -> Vec<NodeId> {
    let mut state = ctx.scene.borrow_mut();
    let graph = &mut state.graph;
    let mut templates = Vec::new();
    for model in models {
        if model.children.len() <= 1 {
            templates.push(model.instantiate(graph));
        } else {
            for (i, stone) in model.children.iter().enumerate() {
                let wrapper = graph.spawn(Node::new(format!("{} {i}", model.name)));
                let stone = stone.instantiate(graph);
                graph.attach(wrapper, stone);
                templates.push(wrapper);
            }
        }
    }
    for &t in &templates {
        prepare_gravestone(graph, t);
        graph.node_mut(t).name = "Gravestone".into();
    }
    templates
}

async fn prepare_gravestones(ctx: &BuildContext) -> Option<Vec<NodeId>> {
    let models = ctx.load_models(&paths::GRAVESTONES).await?;
    Some(gravestone_templates(ctx, &models))
}

/// Mound first, then one template per stone coffin
async fn prepare_bodies(ctx: &BuildContext) -> Option<Vec<NodeId>> {
    let mut paths_to_load = vec![paths::MOUND];
    paths_to_load.extend(paths::COFFINSTONES);
    let (models, mud) = futures::join!(
        ctx.load_models(&paths_to_load),
        ctx.material(MaterialSpec::new(paths::MUD_DIFFUSE, paths::MUD_NORMAL)),
    );
    let (models, mud) = (models?, mud?);
    let (mound_model, coffins) = models.split_first()?;

    let mut state = ctx.scene.borrow_mut();
    let graph = &mut state.graph;
    let mut bodies = Vec::with_capacity(models.len());

    let mound = mound_model.instantiate(graph);
    graph.node_mut(mound).name = "Mound Grave type 1".into();
    if let Some(&inner) = graph.children(mound).first() {
        graph.scale_down(inner, MOUND_SIZE);
        let node = graph.node_mut(inner);
        node.rotate_world(Vec3::Y, -FRAC_PI_2);
        node.material = Some(mud);
    }
    bodies.push(mound);

    for (i, model) in coffins.iter().enumerate() {
        let source = if model.children.len() > 1 {
            model
        } else {
            model.children.first().unwrap_or(model)
        };
        let coffin = source.instantiate(graph);
        graph.node_mut(coffin).name = format!("Stone Grave type {}", i + 1);
        bodies.push(coffin);
    }
    Some(bodies)
}

/// Footprint corners plus centre of a grave
fn grave_test_points(graph: &SceneGraph, grave: NodeId) -> Vec<Vec3> {
    let b = graph.world_bounds(grave);
    vec![
        b.min,
        b.max,
        Vec3::new(b.max.x, 0.0, b.min.z),
        Vec3::new(b.min.x, 0.0, b.max.z),
        b.center(),
    ]
}

async fn place_grave(ctx: &BuildContext, graves: NodeId, transform: Transform, stones: &[NodeId], bodies: &[NodeId]) {
    let parts = {
        let mut guard = ctx.scene.borrow_mut();
        let state = &mut *guard;
        let recipe = roll_grave(&mut state.rng, stones.len(), bodies.len());
        let Some(parts) = assemble(&mut state.graph, &recipe, stones, bodies) else {
            return;
        };
        transform.apply(state.graph.node_mut(parts.root));
        parts
    };

    let points = grave_test_points(&ctx.scene.borrow().graph, parts.root);
    ctx.ground(parts.root, points, 0.0, ProbeScope::TerrainOnly).await;

    if let (true, Some(stone)) = (parts.knocked_over, parts.gravestone) {
        let (points, lift) = {
            let state = ctx.scene.borrow();
            let b = state.graph.world_bounds(stone);
            (vec![b.min, b.max, b.center()], b.size().y / 2.0)
        };
        ctx.ground(stone, points, lift, ProbeScope::TerrainOnly).await;
    }

    let mut state = ctx.scene.borrow_mut();
    state.graph.attach(graves, parts.root);
    if let Some(body) = parts.body {
        state.walkable.push(body);
    }
}

pub async fn build(ctx: BuildContext, layout: Vec<Transform>) {
    let (stones, bodies) = futures::join!(prepare_gravestones(&ctx), prepare_bodies(&ctx));
    let (Some(stones), Some(bodies)) = (stones, bodies) else {
        return;
    };
    log::debug!(
        "SceneBuilder: {} gravestone and {} body templates",
        stones.len(),
        bodies.len()
    );

    let graves = {
        let mut state = ctx.scene.borrow_mut();
        let graves = state
            .graph
            .add_to_scene(Node::new("Graves").with_shadow(ShadowTag::CastAndReceive));
        state.nodes.graves = Some(graves);
        graves
    };

    join_all(
        layout
            .into_iter()
            .map(|t| place_grave(&ctx, graves, t, &stones, &bodies)),
    )
    .await;
    ctx.complete_group(GROUP).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Mesh;
    use glam::UVec3;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn block(graph: &mut SceneGraph, name: &str, size: Vec3) -> NodeId {
        let wrapper = graph.spawn(Node::new(name));
        let mesh = graph.spawn(Node::new("mesh").with_mesh(Mesh::cuboid(size, UVec3::ONE)));
        graph.attach(wrapper, mesh);
        wrapper
    }

    #[test]
    fn test_roll_frequencies() {
        let mut rng = Pcg32::seed_from_u64(11);
        let n = 20_000;
        let (mut stones, mut knocked, mut bodies, mut mounds, mut empty) = (0, 0, 0, 0, 0);
        for _ in 0..n {
            let r = roll_grave(&mut rng, 6, 3);
            if let Some(g) = r.gravestone {
                stones += 1;
                knocked += g.knocked_over as usize;
            }
            if let Some(b) = r.body {
                bodies += 1;
                mounds += (b.index == 0) as usize;
            }
            empty += r.is_empty() as usize;
        }
        let frac = |a: usize, b: usize| a as f32 / b as f32;
        assert!((frac(stones, n) - 0.9).abs() < 0.02);
        assert!((frac(knocked, stones) - 0.1).abs() < 0.02);
        assert!((frac(bodies, n) - 0.9).abs() < 0.02);
        assert!((frac(mounds, bodies) - 0.7).abs() < 0.02);
        assert!((frac(empty, n) - 0.01).abs() < 0.005);
    }

    proptest! {
        #[test]
        fn test_roll_ranges(seed in any::<u64>()) {
            let mut rng = Pcg32::seed_from_u64(seed);
            let r = roll_grave(&mut rng, 6, 3);
            if let Some(g) = r.gravestone {
                prop_assert!(g.index < 6);
                prop_assert!((0.8..1.2).contains(&g.scale));
                let spread = if g.knocked_over { 3.0 * FRAC_PI_8 } else { FRAC_PI_8 };
                prop_assert!(g.yaw.abs() <= spread / 2.0 + 1e-6);
                prop_assert!(g.offset.x.abs() <= 0.1 + 1e-6 && g.offset.y.abs() <= 0.1 + 1e-6);
            }
            if let Some(b) = r.body {
                prop_assert!(b.index < 3);
                prop_assert!((0.8..1.2).contains(&b.scale));
            }
        }
    }

    #[test]
    fn test_empty_recipe_is_skipped() {
        let mut graph = SceneGraph::default();
        let before = graph.len();
        let recipe = GraveRecipe {
            gravestone: None,
            body: None,
        };
        assert!(assemble(&mut graph, &recipe, &[], &[]).is_none());
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_missing_template_leaves_part_out() {
        let mut graph = SceneGraph::default();
        let stone = block(&mut graph, "stone", Vec3::new(0.6, 1.0, 0.15));
        let recipe = GraveRecipe {
            gravestone: Some(GravestoneRoll {
                index: 0,
                knocked_over: false,
                scale: 1.0,
                yaw: 0.0,
                offset: Vec2::ZERO,
            }),
            body: Some(BodyRoll {
                index: 4,
                scale: 1.0,
                yaw: 0.0,
                offset: Vec2::ZERO,
            }),
        };
        let parts = assemble(&mut graph, &recipe, &[stone], &[]).unwrap();
        assert!(parts.gravestone.is_some());
        assert!(parts.body.is_none());
        assert_eq!(graph.children(parts.root).len(), 1);
    }

    #[test]
    fn test_body_starts_behind_stone() {
        let mut graph = SceneGraph::default();
        let stone = block(&mut graph, "stone", Vec3::new(0.6, 1.0, 0.15));
        let mound = block(&mut graph, "mound", Vec3::new(1.0, 0.4, 2.0));
        let recipe = GraveRecipe {
            gravestone: None,
            body: Some(BodyRoll {
                index: 0,
                scale: 1.0,
                yaw: 0.0,
                offset: Vec2::ZERO,
            }),
        };
        let parts = assemble(&mut graph, &recipe, &[stone], &[mound]).unwrap();
        let b = graph.world_bounds(parts.body.unwrap());
        assert!((b.min.z - BODY_GAP).abs() < 1e-5);
    }

    #[test]
    fn test_knocked_over_stone_lies_flat() {
        let mut graph = SceneGraph::default();
        let stone = block(&mut graph, "stone", Vec3::new(0.6, 1.0, 0.15));
        prepare_gravestone(&mut graph, stone);
        let recipe = GraveRecipe {
            gravestone: Some(GravestoneRoll {
                index: 0,
                knocked_over: true,
                scale: 1.0,
                yaw: 0.0,
                offset: Vec2::ZERO,
            }),
            body: None,
        };
        let parts = assemble(&mut graph, &recipe, &[stone], &[]).unwrap();
        let size = graph.world_bounds(parts.gravestone.unwrap()).size();
        assert!(size.y < 0.2 && size.z > 0.9);
    }

    #[test]
    fn test_prepare_stands_stone_up_and_centres_it() {
        let mut graph = SceneGraph::default();
        // Lying on its back, and larger than a unit cube
        let stone = block(&mut graph, "stone", Vec3::new(1.2, 0.3, 1.8));
        prepare_gravestone(&mut graph, stone);
        let b = graph.world_bounds(stone);
        let size = b.size();
        assert!(size.y > size.x && size.x > size.z);
        assert!(size.max_element() <= 1.0 + 1e-5);
        assert!(b.min.y.abs() < 1e-5);
        assert!(b.center().x.abs() < 1e-5 && b.center().z.abs() < 1e-5);
    }

    #[test]
    fn test_prepare_turns_side_on_stone_to_face_forward() {
        let mut graph = SceneGraph::default();
        let stone = block(&mut graph, "stone", Vec3::new(0.18, 1.0, 0.7));
        prepare_gravestone(&mut graph, stone);
        let size = graph.world_bounds(stone).size();
        assert!((size.x - 0.7).abs() < 1e-4 && (size.z - 0.18).abs() < 1e-4);
    }
}
