//! Urns, rock piles and fallen branches
//!
//! Branches gather around every tree, so they wait for the trees group.

use futures::future::join_all;
use glam::Vec3;

use super::trees;
use crate::geom::{Node, NodeId, SceneGraph, ShadowTag};
use crate::scene::assets::{paths, Model};
use crate::scene::context::BuildContext;
use crate::scene::layout::Transform;
use crate::scene::probe::ProbeScope;

pub const GROUP: &str = "clutter";

const URN_SIZE: Vec3 = Vec3::splat(0.4);
const URN_CHANCE: f32 = 0.5;
const ROCK_SIZE: Vec3 = Vec3::splat(2.0);
const ROCK_CHANCE: f32 = 0.9;
const MAX_ROCKS: usize = 10;
const ROCK_SINK: f32 = -0.05;
const BRANCH_SCALE: f32 = 1.8;
const LOOSE_BRANCH_CHANCE: f32 = 0.75;
const MAX_LOOSE_BRANCHES: usize = 12;
const BRANCH_LIFT: f32 = 0.1;
/// Keep random spots this far inside the fence
const SPOT_PADDING: f32 = 0.5;

/// Repeat while `roll() < chance`, at most `max` times
pub fn geometric_count(mut roll: impl FnMut() -> f32, chance: f32, max: usize) -> usize {
    let mut n = 0;
    while n < max && roll() < chance {
        n += 1;
    }
    n
}

/// Number of branches around a tree; `multiplier` is 2 for the massive tree
pub fn branches_per_tree(centered: f32, multiplier: f32) -> usize {
    (centered * 5.0 * multiplier).ceil() as usize
}

fn spawn_group(graph: &mut SceneGraph, parent: NodeId, name: &str, tag: ShadowTag) -> NodeId {
    graph.spawn_child(parent, Node::new(name).with_shadow(tag))
}

async fn place_urn(ctx: &BuildContext, urns: NodeId, template: NodeId, transform: Transform) {
    let urn = {
        let mut guard = ctx.scene.borrow_mut();
        let state = &mut *guard;
        if state.random() > URN_CHANCE {
            return;
        }
        let urn = state.graph.clone_subtree(template);
        transform.apply(state.graph.node_mut(urn));
        state.graph.attach(urns, urn);
        urn
    };
    let points = {
        let state = ctx.scene.borrow();
        let b = state.graph.world_bounds(urn);
        vec![b.min, b.max, b.center()]
    };
    ctx.ground(urn, points, 0.0, ProbeScope::AllSurfaces).await;
    // Authored height lifts the urn onto whatever it stands on
    ctx.scene.borrow_mut().graph.node_mut(urn).position.y += transform.position.y;
}

async fn place_rock(ctx: &BuildContext, rocks: NodeId, template: NodeId) {
    let rock = {
        let mut guard = ctx.scene.borrow_mut();
        let state = &mut *guard;
        let rock = state.graph.clone_subtree(template);
        let position = state.random_xz_within_graveyard(SPOT_PADDING);
        let yaw = state.random() * std::f32::consts::TAU;
        let r = state.random();
        let node = state.graph.node_mut(rock);
        node.name = "Pile of rocks".into();
        node.position = position;
        node.rotate_local(Vec3::Y, yaw);
        node.scale *= 0.5 + r * r * r * 1.5;
        state.graph.attach(rocks, rock);
        rock
    };
    let at = ctx.scene.borrow().graph.node(rock).position;
    ctx.ground(rock, vec![at], ROCK_SINK, ProbeScope::TerrainOnly).await;
}

/// Copy a random branch template, turn the branch inside its pivot and push
/// it out by `reach`
fn scatter_branch(ctx: &BuildContext, templates: &[NodeId], reach: Option<(f32, f32)>) -> NodeId {
    let mut guard = ctx.scene.borrow_mut();
    let state = &mut *guard;
    let pick = state.random_index(templates.len());
    let branch = state.graph.clone_subtree(templates[pick]);
    let inner_yaw = state.random() * std::f32::consts::TAU;
    let outer_yaw = state.random() * std::f32::consts::TAU;
    let push = reach.map(|(base, spread)| base + state.random() * spread);
    if let Some(&inner) = state.graph.children(branch).first() {
        let node = state.graph.node_mut(inner);
        node.rotate_local(Vec3::Y, inner_yaw);
        if let Some(push) = push {
            node.position.x += push;
        }
    }
    state.graph.node_mut(branch).rotate_local(Vec3::Y, outer_yaw);
    branch
}

async fn ground_branch(ctx: &BuildContext, branch: NodeId) {
    let at = {
        let state = ctx.scene.borrow();
        let tip = state.graph.children(branch).first().copied().unwrap_or(branch);
        state.graph.world_position(tip)
    };
    ctx.ground(branch, vec![at], BRANCH_LIFT, ProbeScope::TerrainOnly).await;
}

async fn build_branches(ctx: &BuildContext, clutter: NodeId, templates: Vec<NodeId>) {
    let wait = ctx.scene.borrow().coordinator.wait_group(trees::GROUP);
    match wait {
        Ok(wait) => wait.await,
        Err(err) => log::warn!("SceneBuilder: branches not waiting on trees: {err}"),
    }
    if templates.is_empty() {
        return;
    }

    let (branches, tree_list) = {
        let mut state = ctx.scene.borrow_mut();
        let branches = spawn_group(&mut state.graph, clutter, "Branches", ShadowTag::ReceiveOnly);
        let tree_list: Vec<(NodeId, Vec3, bool)> = match state.nodes.trees {
            Some(group) => state
                .graph
                .children(group)
                .iter()
                .map(|&t| {
                    let node = state.graph.node(t);
                    (t, node.position, node.name == trees::MASSIVE_TREE_NAME)
                })
                .collect(),
            None => Vec::new(),
        };
        (branches, tree_list)
    };

    let mut placed = Vec::new();
    for (_, position, massive) in tree_list {
        let multiplier = if massive { 2.0 } else { 1.0 };
        let count = branches_per_tree(ctx.scene.random_centered(), multiplier);
        if count == 0 {
            continue;
        }
        let around = {
            let mut state = ctx.scene.borrow_mut();
            let node = Node::new("Branches around a tree").with_position(Vec3::new(position.x, 0.0, position.z));
            state.graph.spawn_child(branches, node)
        };
        for _ in 0..count {
            let branch = scatter_branch(ctx, &templates, Some((1.5 * multiplier, 2.0 * multiplier)));
            ctx.scene.borrow_mut().graph.attach(around, branch);
            placed.push(branch);
        }
    }

    let loose = geometric_count(|| ctx.scene.random(), LOOSE_BRANCH_CHANCE, MAX_LOOSE_BRANCHES);
    for _ in 0..loose {
        let branch = scatter_branch(ctx, &templates, None);
        let mut state = ctx.scene.borrow_mut();
        let position = state.random_xz_within_graveyard(SPOT_PADDING);
        state.graph.node_mut(branch).position = position;
        state.graph.attach(branches, branch);
        placed.push(branch);
    }

    join_all(placed.into_iter().map(|b| ground_branch(ctx, b))).await;
}

/// Each child of the branches model becomes its own template
fn branch_templates(graph: &mut SceneGraph, model: &Model) -> Vec<NodeId> {
    model
        .children
        .iter()
        .enumerate()
        .map(|(i, child)| {
            let wrapper = graph.spawn(Node::new(format!("Branch type {i}")));
            let branch = child.instantiate(graph);
            let node = graph.node_mut(branch);
            node.position = Vec3::ZERO;
            node.scale *= BRANCH_SCALE;
            graph.attach(wrapper, branch);
            wrapper
        })
        .collect()
}

pub async fn build(ctx: BuildContext, urn_layout: Vec<Transform>) {
    let Some(models) = ctx.load_models(&[paths::URN, paths::ROCKS, paths::BRANCHES]).await else {
        return;
    };
    let [urn_model, rock_model, branch_model] = models.as_slice() else {
        return;
    };

    let (clutter, urns, rocks, urn_template, rock_template, branch_templates) = {
        let mut state = ctx.scene.borrow_mut();
        let graph = &mut state.graph;

        let urn_template = graph.spawn(Node::new("Urn"));
        let urn = urn_model.instantiate(graph);
        graph.attach(urn_template, urn);
        graph.scale_down(urn, URN_SIZE);

        let rock_template = rock_model.instantiate(graph);
        graph.node_mut(rock_template).name = "Rock Pile".into();
        if let Some(&inner) = graph.children(rock_template).first() {
            graph.scale_down(inner, ROCK_SIZE);
        }

        let branch_templates = branch_templates(graph, branch_model);

        let root = graph.root();
        let clutter = spawn_group(graph, root, "Clutter", ShadowTag::Off);
        let urns = spawn_group(graph, clutter, "Urns", ShadowTag::CastAndReceive);
        let rocks = spawn_group(graph, clutter, "Rocks", ShadowTag::CastAndReceive);
        state.nodes.clutter = Some(clutter);
        (clutter, urns, rocks, urn_template, rock_template, branch_templates)
    };

    let urn_tasks = join_all(
        urn_layout
            .into_iter()
            .map(|t| place_urn(&ctx, urns, urn_template, t)),
    );
    let rock_count = geometric_count(|| ctx.scene.random(), ROCK_CHANCE, MAX_ROCKS);
    let rock_tasks = join_all((0..rock_count).map(|_| place_rock(&ctx, rocks, rock_template)));
    futures::join!(
        urn_tasks,
        rock_tasks,
        build_branches(&ctx, clutter, branch_templates)
    );
    ctx.complete_group(GROUP).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::assets::{AssetSource, ProceduralAssets};
    use futures::executor::block_on;

    #[test]
    fn test_geometric_count_stops_on_first_miss() {
        let rolls = [0.1, 0.2, 0.95, 0.0];
        let mut it = rolls.into_iter();
        assert_eq!(geometric_count(|| it.next().unwrap_or(1.0), 0.9, 10), 2);
    }

    #[test]
    fn test_geometric_count_is_capped() {
        assert_eq!(geometric_count(|| 0.0, 0.9, 10), 10);
        assert_eq!(geometric_count(|| 0.0, 0.75, 12), 12);
    }

    #[test]
    fn test_branches_per_tree() {
        assert_eq!(branches_per_tree(0.0, 1.0), 0);
        assert_eq!(branches_per_tree(0.5, 1.0), 3);
        assert_eq!(branches_per_tree(0.5, 2.0), 5);
        assert_eq!(branches_per_tree(0.99, 2.0), 10);
    }

    #[test]
    fn test_branch_templates_split_and_scale() {
        let mut graph = SceneGraph::default();
        let model = block_on(ProceduralAssets::new().load(paths::BRANCHES)).unwrap();
        let templates = branch_templates(&mut graph, &model);
        assert_eq!(templates.len(), model.children.len());
        let inner = graph.children(templates[0])[0];
        assert_eq!(graph.node(inner).scale, Vec3::splat(BRANCH_SCALE));
    }
}
