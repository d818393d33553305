use futures::future::join_all;
use glam::Vec3;

use crate::geom::{Node, NodeId, PointLight, SceneGraph, ShadowTag};
use crate::scene::assets::{paths, Model};
use crate::scene::context::BuildContext;
use crate::scene::layout::Transform;
use crate::scene::probe::ProbeScope;

pub const GROUP: &str = "lanterns";

const LANTERN_SIZE: Vec3 = Vec3::new(1.0, 4.0, 1.0);
const LIGHT_COLOR: u32 = 0xf6e1ae;
const LIGHT_RANGE: f32 = 12.0;
/// Light hangs this far below the top of the lantern
const LIGHT_DROP: f32 = 0.3;
const SINK: f32 = -0.01;

pub const LIGHT_NAME: &str = "Lantern Light";

/// Fitted lantern with a light near the top and glowing glass
fn lantern_template(graph: &mut SceneGraph, model: &Model) -> NodeId {
    let lantern = model.instantiate(graph);
    graph.node_mut(lantern).name = "Lantern".into();
    if let Some(&inner) = graph.children(lantern).first() {
        graph.scale_down(inner, LANTERN_SIZE);
    }
    for id in graph.descendants(lantern) {
        if let Some(material) = graph.node_mut(id).material.as_mut() {
            material.emissive = LIGHT_COLOR;
            material.emissive_intensity = 1.0;
        }
    }
    let height = graph.world_bounds(lantern).size().y;
    graph.spawn_child(
        lantern,
        Node::new(LIGHT_NAME)
            .with_position(Vec3::Y * (height - LIGHT_DROP))
            .with_light(PointLight {
                color: LIGHT_COLOR,
                intensity: 1.0,
                range: LIGHT_RANGE,
                cast_shadow: true,
            }),
    );
    lantern
}

/// Remove the light and dim the glass of one lantern
pub fn put_out(graph: &mut SceneGraph, lantern: NodeId) {
    let light = graph
        .children(lantern)
        .iter()
        .copied()
        .find(|&c| graph.node(c).light.is_some());
    if let Some(light) = light {
        graph.detach(light);
    }
    for id in graph.descendants(lantern) {
        if let Some(material) = graph.node_mut(id).material.as_mut() {
            material.emissive_intensity = 0.0;
        }
    }
}

async fn place_lantern(ctx: &BuildContext, lanterns: NodeId, template: NodeId, transform: Transform) {
    let lantern = {
        let mut state = ctx.scene.borrow_mut();
        let lantern = state.graph.clone_subtree(template);
        transform.apply(state.graph.node_mut(lantern));
        state.graph.attach(lanterns, lantern);
        lantern
    };
    ctx.ground(lantern, vec![transform.position], SINK, ProbeScope::TerrainOnly)
        .await;
}

pub async fn build(ctx: BuildContext, layout: Vec<Transform>) {
    let Some(model) = ctx.load_model(paths::LANTERN).await else {
        return;
    };
    let (template, lanterns) = {
        let mut state = ctx.scene.borrow_mut();
        let template = lantern_template(&mut state.graph, &model);
        let lanterns = state
            .graph
            .add_to_scene(Node::new("Lanterns").with_shadow(ShadowTag::Off));
        state.nodes.lanterns = Some(lanterns);
        state.collidable.push(lanterns);
        (template, lanterns)
    };

    join_all(
        layout
            .into_iter()
            .map(|t| place_lantern(&ctx, lanterns, template, t)),
    )
    .await;

    {
        let mut guard = ctx.scene.borrow_mut();
        let state = &mut *guard;
        let placed = state.graph.children(lanterns).to_vec();
        if !placed.is_empty() {
            let unlit = placed[state.random_index(placed.len())];
            put_out(&mut state.graph, unlit);
        }
    }
    ctx.complete_group(GROUP).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::assets::{AssetSource, ProceduralAssets};
    use futures::executor::block_on;

    #[test]
    fn test_template_light_below_top() {
        let mut graph = SceneGraph::default();
        let model = block_on(ProceduralAssets::new().load(paths::LANTERN)).unwrap();
        let lantern = lantern_template(&mut graph, &model);
        let height = graph.world_bounds(lantern).size().y;
        assert!(height <= 4.0 + 1e-4);
        let light = graph
            .children(lantern)
            .iter()
            .copied()
            .find(|&c| graph.node(c).name == LIGHT_NAME)
            .unwrap();
        assert!((graph.node(light).position.y - (height - 0.3)).abs() < 1e-4);
    }

    #[test]
    fn test_put_out_removes_light_and_glow() {
        let mut graph = SceneGraph::default();
        let model = block_on(ProceduralAssets::new().load(paths::LANTERN)).unwrap();
        let lantern = lantern_template(&mut graph, &model);
        put_out(&mut graph, lantern);
        let ids = graph.descendants(lantern);
        assert!(ids.iter().all(|&id| graph.node(id).light.is_none()));
        assert!(ids
            .iter()
            .filter_map(|&id| graph.node(id).material.as_ref())
            .all(|m| m.emissive_intensity == 0.0));
    }
}
