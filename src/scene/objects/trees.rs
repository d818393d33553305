use std::f32::consts::FRAC_PI_2;

use futures::future::join_all;
use glam::Vec3;

use crate::geom::{Node, NodeId, ShadowTag};
use crate::scene::assets::{paths, Model};
use crate::scene::context::BuildContext;
use crate::scene::layout::Transform;
use crate::scene::probe::ProbeScope;

pub const GROUP: &str = "trees";

/// Name of the one oversized tree; branch clutter doubles around it
pub const MASSIVE_TREE_NAME: &str = "Massive tree";

const MASSIVE_TREE_POSITION: Vec3 = Vec3::new(-9.0, 0.0, -3.0);
const MASSIVE_TREE_SIZE: Vec3 = Vec3::splat(20.0);
const MASSIVE_TREE_SINK: f32 = -0.2;
/// Imported tree models are tiny; blow them up before fitting them
const TREE_IMPORT_SCALE: f32 = 20.0;
const TREE_SIZE: Vec3 = Vec3::new(10.0, 15.0, 10.0);
const TREE_SINK: f32 = -0.01;

fn tree_template(ctx: &BuildContext, model: &Model, name: &str) -> NodeId {
    let mut state = ctx.scene.borrow_mut();
    let graph = &mut state.graph;
    let tree = model.instantiate(graph);
    graph.node_mut(tree).name = name.to_string();
    if let Some(&inner) = graph.children(tree).first() {
        graph.node_mut(inner).scale *= TREE_IMPORT_SCALE;
        graph.scale_down(inner, TREE_SIZE);
    }
    tree
}

async fn place_massive_tree(ctx: &BuildContext, trees: NodeId, model: &Model) {
    let tree = {
        let mut state = ctx.scene.borrow_mut();
        let graph = &mut state.graph;
        let tree = model.instantiate(graph);
        if let Some(&inner) = graph.children(tree).first() {
            graph.scale_down(inner, MASSIVE_TREE_SIZE);
        }
        let node = graph.node_mut(tree);
        node.name = MASSIVE_TREE_NAME.into();
        node.position = MASSIVE_TREE_POSITION;
        node.rotate_local(Vec3::Y, FRAC_PI_2);
        graph.attach(trees, tree);
        tree
    };
    ctx.ground(tree, vec![MASSIVE_TREE_POSITION], MASSIVE_TREE_SINK, ProbeScope::TerrainOnly)
        .await;
}

async fn place_tree(ctx: &BuildContext, trees: NodeId, templates: &[NodeId], transform: Transform) {
    let tree = {
        let mut guard = ctx.scene.borrow_mut();
        let state = &mut *guard;
        let pick = state.random_index(templates.len());
        let tree = state.graph.clone_subtree(templates[pick]);
        transform.apply(state.graph.node_mut(tree));
        state.graph.attach(trees, tree);
        tree
    };
    ctx.ground(tree, vec![transform.position], TREE_SINK, ProbeScope::TerrainOnly)
        .await;
}

pub async fn build(ctx: BuildContext, layout: Vec<Transform>) {
    let mut to_load = vec![paths::MASSIVE_TREE, paths::OLD_TREE];
    to_load.extend(paths::DEAD_TREES);
    let Some(models) = ctx.load_models(&to_load).await else {
        return;
    };
    let Some((massive, kinds)) = models.split_first() else {
        return;
    };

    let templates: Vec<NodeId> = kinds
        .iter()
        .enumerate()
        .map(|(i, model)| {
            let name = if i == 0 { "Old tree".to_string() } else { format!("Dead tree {i}") };
            tree_template(&ctx, model, &name)
        })
        .collect();

    let trees = {
        let mut state = ctx.scene.borrow_mut();
        let trees = state
            .graph
            .add_to_scene(Node::new("Trees").with_shadow(ShadowTag::CastAndReceive));
        state.nodes.trees = Some(trees);
        state.collidable.push(trees);
        trees
    };

    let layout_trees = join_all(
        layout
            .into_iter()
            .map(|t| place_tree(&ctx, trees, &templates, t)),
    );
    futures::join!(place_massive_tree(&ctx, trees, massive), layout_trees);
    ctx.complete_group(GROUP).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::assets::ProceduralAssets;
    use crate::scene::probe::tests::flat_scene;
    use futures::executor::block_on;
    use std::rc::Rc;

    #[test]
    fn test_templates_fit_tree_box() {
        let scene = flat_scene(0.0);
        let ctx = BuildContext::new(scene.clone(), Rc::new(ProceduralAssets::new()));
        for path in [paths::OLD_TREE, paths::DEAD_TREES[0]] {
            let model = block_on(ctx.load_model(path)).unwrap();
            let tree = tree_template(&ctx, &model, "t");
            let size = scene.borrow().graph.world_bounds(tree).size();
            assert!(size.x <= TREE_SIZE.x + 1e-3 && size.y <= TREE_SIZE.y + 1e-3 && size.z <= TREE_SIZE.z + 1e-3);
            // Small imports are enlarged by the import scale, never past the box
            assert!(size.y > 5.0);
        }
    }

    #[test]
    fn test_trees_are_grounded_and_collidable() {
        let scene = flat_scene(0.4);
        scene.borrow().terrain_built.set();
        scene.borrow_mut().coordinator.register(GROUP).unwrap();
        let ctx = BuildContext::new(scene.clone(), Rc::new(ProceduralAssets::new()));
        let layout = vec![Transform::from_degrees(Vec3::new(3.0, 0.0, 2.0), Vec3::new(0.0, 45.0, 0.0))];
        block_on(build(ctx, layout));

        let state = scene.borrow();
        assert_eq!(state.coordinator.is_group_complete(GROUP), Ok(true));
        let trees = state.nodes.trees.unwrap();
        assert!(state.collidable.contains(&trees));
        let children = state.graph.children(trees);
        assert_eq!(children.len(), 2);
        let massive = children
            .iter()
            .find(|&&c| state.graph.node(c).name == MASSIVE_TREE_NAME)
            .unwrap();
        assert!((state.graph.node(*massive).position.y - (0.4 - 0.2)).abs() < 1e-4);
    }
}
