use glam::Vec3;

use crate::consts::{MAUSOLEUM_DIST_FROM_FENCE, NORTH};
use crate::geom::{Aabb, ShadowTag};
use crate::scene::assets::paths;
use crate::scene::context::BuildContext;
use crate::scene::probe::ProbeScope;

pub const GROUP: &str = "mausoleum";

const SCALE: f32 = 0.014;
const SINK: f32 = -0.1;

/// Centre, both bound corners and the two opposite corners of the footprint
pub fn footprint(position: Vec3, bounds: Aabb) -> Vec<Vec3> {
    vec![
        position,
        bounds.min,
        bounds.max,
        Vec3::new(bounds.max.x, 0.0, bounds.min.z),
        Vec3::new(bounds.min.x, 0.0, bounds.max.z),
    ]
}

pub async fn build(ctx: BuildContext) {
    let Some(model) = ctx.load_model(paths::MAUSOLEUM).await else {
        return;
    };
    let inner = model.children.first().unwrap_or(&model);
    let mausoleum = ctx.instantiate(inner);

    let test_points = {
        let mut state = ctx.scene.borrow_mut();
        let half = state.config.half_side();
        let node = state.graph.node_mut(mausoleum);
        node.name = "Mausoleum".into();
        node.scale = Vec3::splat(SCALE);
        node.position = NORTH * (half - MAUSOLEUM_DIST_FROM_FENCE);
        node.shadow_tag = Some(ShadowTag::CastAndReceive);
        let position = node.position;
        footprint(position, state.graph.world_bounds(mausoleum))
    };

    ctx.ground(mausoleum, test_points, SINK, ProbeScope::TerrainOnly).await;

    {
        let mut state = ctx.scene.borrow_mut();
        let root = state.graph.root();
        state.graph.attach(root, mausoleum);
        state.nodes.mausoleum = Some(mausoleum);
        state.collidable.push(mausoleum);
    }
    ctx.complete_group(GROUP).await;
}
