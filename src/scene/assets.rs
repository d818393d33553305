//! Model and texture sources
//!
//! Loading is asynchronous and single-attempt. [`ProceduralAssets`] is the
//! built-in source: it synthesises blocky stand-ins for every catalogued
//! path so a scene can be built headless or without an asset server.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use glam::{Quat, UVec3, Vec3};
use thiserror::Error;

use crate::geom::{Material, Mesh, Node, NodeId, SceneGraph, Texture};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },
}

impl AssetError {
    pub fn path(&self) -> &str {
        match self {
            AssetError::NotFound(path) | AssetError::Load { path, .. } => path,
        }
    }
}

/// A loaded model: a small node tree, detached from any scene
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub mesh: Option<Rc<Mesh>>,
    pub material: Option<Material>,
    pub children: Vec<Model>,
}

impl Model {
    pub fn group(name: impl Into<String>, children: Vec<Model>) -> Self {
        Self {
            name: name.into(),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            children,
            ..Default::default()
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            mesh: Some(Rc::new(mesh)),
            material: Some(Material::new()),
            ..Default::default()
        }
    }

    /// Box mesh whose base sits on the model origin
    pub fn block(name: impl Into<String>, size: Vec3) -> Self {
        let mut mesh = Mesh::cuboid(size, UVec3::ONE);
        mesh.update_positions(|_, p| p + Vec3::Y * size.y / 2.0);
        Self::mesh(name, mesh)
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotated(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scaled(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Copy this model into `graph` as a detached subtree
    pub fn instantiate(&self, graph: &mut SceneGraph) -> NodeId {
        let mut node = Node::new(self.name.clone());
        node.position = self.position;
        node.rotation = self.rotation;
        node.scale = self.scale;
        node.mesh = self.mesh.clone();
        node.material = self.material.clone();
        let id = graph.spawn(node);
        for child in &self.children {
            let c = child.instantiate(graph);
            graph.attach(id, c);
        }
        id
    }
}

/// Something that can fetch models and textures by path
pub trait AssetSource {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, Result<Model, AssetError>>;

    fn load_texture(&self, path: &str) -> LocalBoxFuture<'static, Result<Texture, AssetError>>;
}

/// Diffuse, normal and roughness maps plus how they wrap
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialSpec<'a> {
    pub diffuse: Option<&'a str>,
    pub normal: Option<&'a str>,
    pub roughness: Option<&'a str>,
    pub repeat: [f32; 2],
    pub offset: [f32; 2],
}

impl<'a> MaterialSpec<'a> {
    pub fn new(diffuse: &'a str, normal: &'a str) -> Self {
        Self {
            diffuse: Some(diffuse),
            normal: Some(normal),
            roughness: None,
            repeat: [1.0, 1.0],
            offset: [0.0, 0.0],
        }
    }

    pub fn with_roughness(mut self, path: &'a str) -> Self {
        self.roughness = Some(path);
        self
    }

    pub fn with_repeat(mut self, repeat: [f32; 2], offset: [f32; 2]) -> Self {
        self.repeat = repeat;
        self.offset = offset;
        self
    }
}

/// Load every map of `spec` concurrently and assemble the material
pub async fn make_material(assets: &dyn AssetSource, spec: MaterialSpec<'_>) -> Result<Material, AssetError> {
    let fetch = |path: Option<&str>| {
        let fut = path.map(|p| assets.load_texture(p));
        async move {
            match fut {
                Some(f) => f.await.map(|t| Some(Rc::new(t))),
                None => Ok(None),
            }
        }
    };
    let (diffuse, normal, roughness) =
        futures::join!(fetch(spec.diffuse), fetch(spec.normal), fetch(spec.roughness));
    let mut material = Material::new();
    material.diffuse = diffuse?;
    material.normal = normal?;
    material.roughness_map = roughness?;
    material.repeat = spec.repeat;
    material.offset = spec.offset;
    Ok(material)
}

/// Yields to the executor once before completing
#[derive(Debug, Default)]
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[derive(Debug, Default)]
struct ProceduralInner {
    failing: HashSet<String>,
    requests: Vec<String>,
}

/// Built-in asset source producing primitive stand-in models
#[derive(Debug, Clone, Default)]
pub struct ProceduralAssets {
    inner: Rc<RefCell<ProceduralInner>>,
}

impl ProceduralAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future load of `path` fail
    pub fn fail_path(&self, path: &str) {
        self.inner.borrow_mut().failing.insert(path.to_string());
    }

    /// Every path requested so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.inner.borrow().requests.clone()
    }

    fn begin(&self, path: &str) -> Result<(), AssetError> {
        let mut inner = self.inner.borrow_mut();
        inner.requests.push(path.to_string());
        if inner.failing.contains(path) {
            Err(AssetError::Load {
                path: path.to_string(),
                reason: "request failed".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl AssetSource for ProceduralAssets {
    fn load(&self, path: &str) -> LocalBoxFuture<'static, Result<Model, AssetError>> {
        let result = self
            .begin(path)
            .and_then(|_| catalog::model(path).ok_or_else(|| AssetError::NotFound(path.to_string())));
        async move {
            YieldOnce::default().await;
            result
        }
        .boxed_local()
    }

    fn load_texture(&self, path: &str) -> LocalBoxFuture<'static, Result<Texture, AssetError>> {
        let result = self.begin(path).map(|_| Texture {
            path: path.to_string(),
            width: 1024,
            height: 1024,
        });
        async move {
            YieldOnce::default().await;
            result
        }
        .boxed_local()
    }
}

/// Paths of every model and texture the scene asks for
pub mod paths {
    pub const GROUND_DIFFUSE: &str = "textures/grass_path_2/grass_path_2_diff_4k.jpg";
    pub const GROUND_NORMAL: &str = "textures/grass_path_2/grass_path_2_normal_4k.jpg";
    pub const GROUND_ROUGHNESS: &str = "textures/grass_path_2/grass_path_2_rough_4k.jpg";
    pub const PATH_DIFFUSE: &str = "textures/cobblestone/cobblestone_large_01_diff_2k.jpg";
    pub const PATH_NORMAL: &str = "textures/cobblestone/cobblestone_large_01_nor_gl_2k.png";
    pub const PATH_ROUGHNESS: &str = "textures/cobblestone/cobblestone_large_01_rough_2k.jpg";
    pub const MUD_DIFFUSE: &str = "textures/mud/brown_mud_dry_diff_2k.jpg";
    pub const MUD_NORMAL: &str = "textures/mud/brown_mud_dry_nor_gl_2k.jpg";
    pub const CLOUDS: [&str; 4] = [
        "textures/clouds/cloud1/cloud1.png",
        "textures/clouds/cloud2/cloud2.png",
        "textures/clouds/cloud3/cloud3.png",
        "textures/clouds/cloud4/cloud4.png",
    ];

    pub const GATE: &str = "models/gate/gate_obj.obj";
    pub const GATE_DIFFUSE: &str = "models/gate/textures/gate_diffuse.jpg";
    pub const GATE_NORMAL: &str = "models/gate/textures/gate_normal.jpg";
    pub const GATE_PILLAR_DIFFUSE: &str = "models/gate/textures/pillar_diffuse.jpg";
    pub const GATE_PILLAR_NORMAL: &str = "models/gate/textures/pillar_normal.jpg";
    pub const GATE_LIGHT_EMISSION: &str = "models/gate/textures/lightlower_emission.jpg";
    pub const FENCE_PILLAR: &str = "models/fence/pillar.glb";
    pub const FENCE_WALL: &str = "models/fence/wall.glb";
    pub const MAUSOLEUM: &str = "models/mausoleum/mausoleum.glb";
    pub const GRAVESTONES: [&str; 3] = [
        "models/graves/gravestone1/gravestone1.glb",
        "models/graves/gravestone2/gravestone2.glb",
        "models/graves/gravestones3456/gravestones3456.glb",
    ];
    pub const COFFINSTONES: [&str; 2] = [
        "models/graves/coffinstone1/coffinstone1.glb",
        "models/graves/coffinstone2/coffinstone2.glb",
    ];
    pub const MOUND: &str = "models/graves/mound/mound_custom.glb";
    pub const MASSIVE_TREE: &str = "models/trees/old mossy tree/old_mossy_tree.glb";
    pub const OLD_TREE: &str = "models/trees/old tree/old_tree.glb";
    pub const DEAD_TREES: [&str; 4] = [
        "models/trees/dead trees/tree1.glb",
        "models/trees/dead trees/tree2.glb",
        "models/trees/dead trees/tree3.glb",
        "models/trees/dead trees/tree4.glb",
    ];
    pub const LANTERN: &str = "models/lantern/lantern_post.glb";
    pub const URN: &str = "models/clutter/urn/urn.glb";
    pub const ROCKS: &str = "models/clutter/rocks/rocks.glb";
    pub const BRANCHES: &str = "models/clutter/branches/dry_branches_medium_01_2k.glb";
    pub const KEY: &str = "models/key/old_key.glb";
}

/// Stand-in geometry, sized like the authored models in their own units
mod catalog {
    use super::paths::*;
    use super::Model;
    use glam::Vec3;

    fn tree(name: &str, trunk: Vec3, crown: Vec3) -> Model {
        Model::group(
            name,
            vec![Model::group(
                "Tree mesh",
                vec![
                    Model::block("trunk", trunk),
                    Model::block("crown", crown).at(Vec3::Y * trunk.y),
                ],
            )],
        )
    }

    pub fn model(path: &str) -> Option<Model> {
        let model = match path {
            // Fence pieces in model units; the fence is scaled by 0.0357
            FENCE_WALL => Model::group("wall", vec![Model::block("wall", Vec3::new(4.0, 50.0, 83.0))]),
            FENCE_PILLAR => Model::group("pillar", vec![Model::block("pillar", Vec3::new(16.0, 60.0, 16.0))]),
            // Gate in model units; scaled by 0.052
            GATE => Model::group(
                "gate",
                vec![
                    Model::block("gate_main", Vec3::new(52.0, 40.0, 3.0)),
                    Model::block("pillar_left", Vec3::new(6.0, 48.0, 6.0)).at(Vec3::new(-29.0, 0.0, 0.0)),
                    Model::block("pillar_right", Vec3::new(6.0, 48.0, 6.0)).at(Vec3::new(29.0, 0.0, 0.0)),
                    Model::block("lightupper_left", Vec3::new(4.0, 4.0, 4.0)).at(Vec3::new(-29.0, 52.0, 0.0)),
                    Model::block("lightupper_right", Vec3::new(4.0, 4.0, 4.0)).at(Vec3::new(29.0, 52.0, 0.0)),
                    Model::block("lightlower_left", Vec3::new(5.0, 4.0, 5.0)).at(Vec3::new(-29.0, 48.0, 0.0)),
                    Model::block("lightlower_right", Vec3::new(5.0, 4.0, 5.0)).at(Vec3::new(29.0, 48.0, 0.0)),
                ],
            ),
            // Mausoleum in model units; scaled by 0.014
            MAUSOLEUM => Model::group(
                "scene",
                vec![Model::group(
                    "mausoleum",
                    vec![
                        Model::block("walls", Vec3::new(380.0, 300.0, 480.0)),
                        Model::block("roof", Vec3::new(420.0, 60.0, 520.0)).at(Vec3::Y * 300.0),
                    ],
                )],
            ),
            p if p == GRAVESTONES[0] => Model::group("scene", vec![Model::block("stone", Vec3::new(0.7, 1.1, 0.18))]),
            // Modelled lying on its back; prep stands it up
            p if p == GRAVESTONES[1] => Model::group("scene", vec![Model::block("stone", Vec3::new(0.6, 0.15, 0.9))]),
            p if p == GRAVESTONES[2] => Model::group(
                "scene",
                vec![
                    Model::block("stone3", Vec3::new(0.8, 1.2, 0.2)).at(Vec3::new(-3.0, 0.0, 0.0)),
                    Model::block("stone4", Vec3::new(0.5, 0.8, 0.12)).at(Vec3::new(-1.0, 0.0, 0.0)),
                    Model::block("stone5", Vec3::new(0.18, 1.0, 0.7)).at(Vec3::new(1.0, 0.0, 0.0)),
                    Model::block("stone6", Vec3::new(1.4, 1.8, 0.25)).at(Vec3::new(3.0, 0.0, 0.0)),
                ],
            ),
            p if p == COFFINSTONES[0] => Model::group("scene", vec![Model::block("coffin", Vec3::new(0.9, 0.45, 2.0))]),
            p if p == COFFINSTONES[1] => Model::group(
                "scene",
                vec![
                    Model::block("slab", Vec3::new(1.0, 0.2, 2.1)),
                    Model::block("lid", Vec3::new(0.8, 0.25, 1.9)).at(Vec3::Y * 0.2),
                ],
            ),
            MOUND => Model::group("scene", vec![Model::block("mound", Vec3::new(3.0, 0.6, 1.4))]),
            MASSIVE_TREE => tree("tree", Vec3::new(3.0, 14.0, 3.0), Vec3::new(24.0, 14.0, 24.0)),
            OLD_TREE => tree("tree", Vec3::new(0.05, 0.4, 0.05), Vec3::new(0.4, 0.5, 0.4)),
            p if DEAD_TREES.contains(&p) => {
                Model::group("scene", vec![Model::block("dead tree", Vec3::new(0.04, 0.6, 0.04))])
            }
            LANTERN => Model::group(
                "scene",
                vec![Model::group(
                    "lantern post",
                    vec![
                        Model::block("post", Vec3::new(0.2, 3.0, 0.2)),
                        Model::block("lamp", Vec3::new(0.4, 0.5, 0.4)).at(Vec3::Y * 3.0),
                    ],
                )],
            ),
            URN => Model::group("scene", vec![Model::block("urn", Vec3::new(0.3, 0.5, 0.3))]),
            ROCKS => Model::group("scene", vec![Model::block("rocks", Vec3::new(2.5, 0.8, 2.0))]),
            BRANCHES => Model::group(
                "scene",
                vec![
                    Model::block("branch0", Vec3::new(0.9, 0.06, 0.08)),
                    Model::block("branch1", Vec3::new(0.6, 0.05, 0.07)),
                    Model::block("branch2", Vec3::new(1.2, 0.08, 0.1)),
                ],
            ),
            KEY => Model::group("scene", vec![Model::block("key", Vec3::new(0.6, 0.05, 0.25))]),
            _ => return None,
        };
        Some(model)
    }
}
