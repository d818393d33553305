//! Object categories
//!
//! Each category is one load group: it registers before loading starts and
//! marks itself complete once all of its objects are placed.

pub mod clutter;
pub mod fence;
pub mod graves;
pub mod key;
pub mod lanterns;
pub mod mausoleum;
pub mod trees;

use super::context::BuildContext;
use super::layout::Layout;

/// Every load group, in registration order
pub const GROUPS: [&str; 7] = [
    fence::GROUP,
    mausoleum::GROUP,
    graves::GROUP,
    trees::GROUP,
    lanterns::GROUP,
    clutter::GROUP,
    key::GROUP,
];

/// Build every category concurrently
pub async fn build_all(ctx: &BuildContext, layout: Layout) {
    let Layout {
        graves: grave_spots,
        trees: tree_spots,
        lanterns: lantern_spots,
        urns,
        keys,
    } = layout;
    futures::join!(
        fence::build(ctx.clone()),
        mausoleum::build(ctx.clone()),
        graves::build(ctx.clone(), grave_spots),
        trees::build(ctx.clone(), tree_spots),
        lanterns::build(ctx.clone(), lantern_spots),
        clutter::build(ctx.clone(), urns),
        key::build(ctx.clone(), keys),
    );
}
