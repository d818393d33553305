//! Procedural graveyard construction
//!
//! - `terrain`: noise height field, ground mesh and the cobbled path
//! - `probe` / `placement`: downward raycasts and grounding with retry
//! - `coordinator` / `readiness`: load groups, phases and awaitable flags
//! - `objects`: one async builder per object category
//! - `weather`: ambient light, rain, clouds and lightning
//! - `builder`: the orchestrator everything else talks to

pub mod assets;
pub mod builder;
pub mod context;
pub mod coordinator;
pub mod layout;
pub mod objects;
pub mod placement;
pub mod probe;
pub mod readiness;
pub mod state;
pub mod terrain;
pub mod weather;

pub use assets::{AssetError, AssetSource, Model, ProceduralAssets};
pub use builder::SceneBuilder;
pub use coordinator::{AssetLoadCoordinator, CoordinatorError, Phase, Transition};
pub use placement::{Placement, PlacementEngine};
pub use probe::{GroundProbe, ProbeScope};
pub use readiness::{ReadyFlag, WaitReady};
pub use state::{SceneConfig, SceneHandle, SceneState};
pub use terrain::HeightRange;
