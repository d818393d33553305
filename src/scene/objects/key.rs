use glam::Vec3;

use crate::geom::{Node, ShadowTag};
use crate::scene::assets::paths;
use crate::scene::context::BuildContext;
use crate::scene::layout::Transform;
use crate::scene::probe::ProbeScope;

pub const GROUP: &str = "key";

const KEY_SIZE: Vec3 = Vec3::splat(0.4);
const KEY_GLOW: u32 = 0xb6a473;
const KEY_GLOW_INTENSITY: f32 = 0.1;
/// Keeps the key from clipping into what it lies on
const KEY_LIFT: f32 = 0.02;

pub async fn build(ctx: BuildContext, spots: Vec<Transform>) {
    let Some(model) = ctx.load_model(paths::KEY).await else {
        return;
    };

    let (key, spot) = {
        let mut guard = ctx.scene.borrow_mut();
        let state = &mut *guard;
        if spots.is_empty() {
            log::error!("SceneBuilder: no spots to hide the key in");
            return;
        }
        let spot = spots[state.random_index(spots.len())];

        let graph = &mut state.graph;
        let key = graph.spawn(Node::new("Key").with_shadow(ShadowTag::ReceiveOnly));
        let inner = model.instantiate(graph);
        graph.attach(key, inner);
        for id in graph.descendants(key) {
            if let Some(material) = graph.node_mut(id).material.as_mut() {
                material.emissive = KEY_GLOW;
                material.emissive_intensity = KEY_GLOW_INTENSITY;
            }
        }
        graph.scale_down(inner, KEY_SIZE);
        spot.apply(graph.node_mut(key));
        (key, spot)
    };

    ctx.ground(key, vec![spot.position], spot.position.y + KEY_LIFT, ProbeScope::AllSurfaces)
        .await;

    {
        let mut state = ctx.scene.borrow_mut();
        let root = state.graph.root();
        state.graph.attach(root, key);
        state.nodes.key = Some(key);
    }
    ctx.complete_group(GROUP).await;
}
