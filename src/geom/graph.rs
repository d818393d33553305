//! Arena-backed scene graph
//!
//! Nodes are never freed; detaching a node just makes it unreachable from the
//! root. Templates live as detached subtrees and are copied with
//! [`SceneGraph::clone_subtree`].

use std::rc::Rc;

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use super::mesh::Mesh;
use super::ray::Ray;

/// Handle to a node in a [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Shadow category, assigned when a node is created and resolved once the
/// scene is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowTag {
    /// Neither casts nor receives
    Off,
    ReceiveOnly,
    CastAndReceive,
}

impl ShadowTag {
    /// (cast, receive)
    pub fn flags(self) -> (bool, bool) {
        match self {
            ShadowTag::Off => (false, false),
            ShadowTag::ReceiveOnly => (false, true),
            ShadowTag::CastAndReceive => (true, true),
        }
    }
}

/// Texture handle produced by an asset source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    pub path: String,
    pub width: u32,
    pub height: u32,
}

/// Surface description handed to the renderer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Material {
    pub diffuse: Option<Rc<Texture>>,
    pub normal: Option<Rc<Texture>>,
    pub roughness_map: Option<Rc<Texture>>,
    pub emissive_map: Option<Rc<Texture>>,
    /// Texture repeat (u, v)
    pub repeat: [f32; 2],
    pub offset: [f32; 2],
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: u32,
    pub emissive_intensity: f32,
    pub opacity: f32,
    pub wireframe: bool,
}

impl Material {
    pub fn new() -> Self {
        Self {
            repeat: [1.0, 1.0],
            roughness: 1.0,
            opacity: 1.0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: u32,
    pub intensity: f32,
    pub range: f32,
    pub cast_shadow: bool,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub visible: bool,
    pub mesh: Option<Rc<Mesh>>,
    pub material: Option<Material>,
    pub light: Option<PointLight>,
    pub shadow_tag: Option<ShadowTag>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            visible: true,
            mesh: None,
            material: None,
            light: None,
            shadow_tag: None,
            cast_shadow: false,
            receive_shadow: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(Rc::new(mesh));
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_shadow(mut self, tag: ShadowTag) -> Self {
        self.shadow_tag = Some(tag);
        self
    }

    pub fn with_light(mut self, light: PointLight) -> Self {
        self.light = Some(light);
        self
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Rotate about a world-space axis through the node's origin
    pub fn rotate_world(&mut self, axis: Vec3, angle: f32) {
        self.rotation = Quat::from_axis_angle(axis, angle) * self.rotation;
    }

    /// Rotate about one of the node's own axes
    pub fn rotate_local(&mut self, axis: Vec3, angle: f32) {
        self.rotation *= Quat::from_axis_angle(axis, angle);
    }

    /// Apply an authored Euler rotation as successive world-axis turns X, Y, Z
    pub fn rotate_euler_world(&mut self, euler: Vec3) {
        self.rotation = Quat::from_euler(EulerRot::ZYX, euler.z, euler.y, euler.x) * self.rotation;
    }

    /// Mutable access to the mesh, copying it first if it is shared
    pub fn mesh_mut(&mut self) -> Option<&mut Mesh> {
        self.mesh.as_mut().map(Rc::make_mut)
    }
}

/// A ray intersection against scene geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new("Main Scene")
    }
}

impl SceneGraph {
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![Node::new(root_name)],
            root: NodeId(0),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a detached node
    pub fn spawn(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            ..node
        });
        id
    }

    /// Add a node as a child of `parent`
    pub fn spawn_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.spawn(node);
        self.attach(parent, id);
        id
    }

    /// Add a node directly under the root
    pub fn add_to_scene(&mut self, node: Node) -> NodeId {
        let root = self.root;
        self.spawn_child(root, node)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Re-parent `child` under `parent`, detaching it from any previous parent
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    pub fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != child);
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Whether `id` is reachable from the scene root
    pub fn in_scene(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == self.root {
                return true;
            }
            cur = self.node(n).parent;
        }
        false
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let node = self.node(id);
        match node.parent {
            Some(p) => self.world_matrix(p) * node.local_matrix(),
            None => node.local_matrix(),
        }
    }

    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).transform_point3(Vec3::ZERO)
    }

    /// Depth-first pre-order walk of a subtree
    pub fn traverse(&self, id: NodeId, f: &mut impl FnMut(NodeId, &Node)) {
        let node = self.node(id);
        f(id, node);
        for &child in &node.children {
            self.traverse(child, f);
        }
    }

    /// Collect a subtree's ids in pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.traverse(id, &mut |n, _| out.push(n));
        out
    }

    /// World-space bounds of every mesh in the subtree
    pub fn world_bounds(&self, id: NodeId) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        self.accumulate_bounds(id, self.world_matrix(id), &mut bounds);
        bounds
    }

    fn accumulate_bounds(&self, id: NodeId, world: Mat4, out: &mut Aabb) {
        let node = self.node(id);
        if let Some(mesh) = &node.mesh {
            *out = out.union(mesh.bounds().transformed(&world));
        }
        for &child in &node.children {
            let child_world = world * self.node(child).local_matrix();
            self.accumulate_bounds(child, child_world, out);
        }
    }

    /// Deep copy a subtree; the copy is detached. Meshes are shared.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let copy = self.node(id).clone();
        let children = copy.children.clone();
        let new_id = self.spawn(copy);
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.attach(new_id, child_copy);
        }
        new_id
    }

    /// Uniformly shrink a node so its world bounds fit inside `max_size`.
    /// Never enlarges.
    pub fn scale_down(&mut self, id: NodeId, max_size: Vec3) {
        let size = self.world_bounds(id).size();
        let factor = 1.0_f32
            .max(size.x / max_size.x)
            .max(size.y / max_size.y)
            .max(size.z / max_size.z);
        self.node_mut(id).scale *= 1.0 / factor;
    }

    /// Intersect a world-space ray with the given nodes, nearest first
    pub fn raycast(&self, targets: &[NodeId], ray: &Ray, recursive: bool) -> Vec<RayHit> {
        let mut hits = Vec::new();
        let mut params = Vec::new();
        for &target in targets {
            let world = self.world_matrix(target);
            self.raycast_node(target, world, ray, recursive, &mut params, &mut hits);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn raycast_node(
        &self,
        id: NodeId,
        world: Mat4,
        ray: &Ray,
        recursive: bool,
        params: &mut Vec<f32>,
        hits: &mut Vec<RayHit>,
    ) {
        let node = self.node(id);
        if let Some(mesh) = &node.mesh {
            let inv = world.inverse();
            // Unnormalized local direction keeps t equal to world distance
            let local = Ray {
                origin: inv.transform_point3(ray.origin),
                dir: inv.transform_vector3(ray.dir),
            };
            params.clear();
            mesh.raycast(&local, params);
            for &t in params.iter() {
                hits.push(RayHit {
                    distance: t,
                    point: ray.at(t),
                    node: id,
                });
            }
        }
        if recursive {
            for &child in &node.children {
                let child_world = world * self.node(child).local_matrix();
                self.raycast_node(child, child_world, ray, recursive, params, hits);
            }
        }
    }

    /// Resolve every reachable mesh's shadow flags from the nearest tagged
    /// ancestor (or itself). Untagged chains neither cast nor receive.
    pub fn resolve_shadows(&mut self) -> usize {
        let mut stack = vec![(self.root, None::<ShadowTag>)];
        let mut resolved = 0;
        while let Some((id, inherited)) = stack.pop() {
            let tag = self.node(id).shadow_tag.or(inherited);
            let node = self.node_mut(id);
            if node.mesh.is_some() {
                let (cast, receive) = tag.map(ShadowTag::flags).unwrap_or((false, false));
                node.cast_shadow = cast;
                node.receive_shadow = receive;
                resolved += 1;
            }
            for &child in self.node(id).children.iter().rev() {
                stack.push((child, tag));
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec3;

    fn unit_box(graph: &mut SceneGraph, name: &str) -> NodeId {
        graph.spawn(Node::new(name).with_mesh(Mesh::cuboid(Vec3::ONE, UVec3::ONE)))
    }

    #[test]
    fn test_world_bounds_follow_parent_transform() {
        let mut graph = SceneGraph::default();
        let parent = graph.add_to_scene(Node::new("parent").with_position(Vec3::new(5.0, 0.0, 0.0)));
        graph.node_mut(parent).scale = Vec3::splat(2.0);
        let child = unit_box(&mut graph, "child");
        graph.attach(parent, child);
        graph.node_mut(child).position = Vec3::new(0.0, 1.0, 0.0);

        let b = graph.world_bounds(parent);
        assert!((b.min - Vec3::new(4.0, 1.0, -1.0)).length() < 1e-5);
        assert!((b.max - Vec3::new(6.0, 3.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_raycast_sorted_and_recursive() {
        let mut graph = SceneGraph::default();
        let group = graph.add_to_scene(Node::new("group"));
        let low = unit_box(&mut graph, "low");
        let high = unit_box(&mut graph, "high");
        graph.attach(group, low);
        graph.attach(group, high);
        graph.node_mut(high).position.y = 3.0;

        let ray = Ray::down(Vec3::new(0.1, 10.0, -0.2));
        assert!(graph.raycast(&[group], &ray, false).is_empty());

        let hits = graph.raycast(&[group], &ray, true);
        assert_eq!(hits[0].node, high);
        assert!((hits[0].distance - 6.5).abs() < 1e-5);
        assert!((hits[0].point.y - 3.5).abs() < 1e-5);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_raycast_through_rotated_scaled_node() {
        let mut graph = SceneGraph::default();
        let b = unit_box(&mut graph, "slab");
        graph.attach(graph.root(), b);
        let node = graph.node_mut(b);
        node.scale = Vec3::new(4.0, 0.5, 1.0);
        node.rotate_world(Vec3::Y, std::f32::consts::FRAC_PI_2);

        // After the turn the long axis runs along Z
        let hit = graph.raycast(&[b], &Ray::down(Vec3::new(0.1, 2.0, 1.5)), false);
        assert!((hit[0].distance - 1.75).abs() < 1e-4);
        let miss = graph.raycast(&[b], &Ray::down(Vec3::new(1.5, 2.0, 0.1)), false);
        assert!(miss.is_empty());
    }

    #[test]
    fn test_clone_subtree_is_detached_copy() {
        let mut graph = SceneGraph::default();
        let root = graph.spawn(Node::new("template"));
        let part = unit_box(&mut graph, "part");
        graph.attach(root, part);

        let copy = graph.clone_subtree(root);
        assert_ne!(copy, root);
        assert_eq!(graph.parent(copy), None);
        assert_eq!(graph.children(copy).len(), 1);
        assert_ne!(graph.children(copy)[0], part);
        assert!(!graph.in_scene(copy));
    }

    #[test]
    fn test_scale_down_only_shrinks() {
        let mut graph = SceneGraph::default();
        let b = graph.spawn(Node::new("big").with_mesh(Mesh::cuboid(Vec3::new(4.0, 2.0, 1.0), UVec3::ONE)));
        graph.scale_down(b, Vec3::new(2.0, 2.0, 2.0));
        assert!((graph.world_bounds(b).size().x - 2.0).abs() < 1e-5);

        let s = unit_box(&mut graph, "small");
        graph.scale_down(s, Vec3::splat(10.0));
        assert_eq!(graph.node(s).scale, Vec3::ONE);
    }

    #[test]
    fn test_resolve_shadows_inherits_nearest_tag() {
        let mut graph = SceneGraph::default();
        let fence = graph.add_to_scene(Node::new("fence").with_shadow(ShadowTag::CastAndReceive));
        let wall = unit_box(&mut graph, "wall");
        let pillar = graph.spawn(
            Node::new("pillar")
                .with_mesh(Mesh::cuboid(Vec3::ONE, UVec3::ONE))
                .with_shadow(ShadowTag::Off),
        );
        graph.attach(fence, wall);
        graph.attach(fence, pillar);
        let loose = graph.add_to_scene(Node::new("loose").with_mesh(Mesh::cuboid(Vec3::ONE, UVec3::ONE)));

        assert_eq!(graph.resolve_shadows(), 3);
        assert!(graph.node(wall).cast_shadow && graph.node(wall).receive_shadow);
        assert!(!graph.node(pillar).cast_shadow && !graph.node(pillar).receive_shadow);
        assert!(!graph.node(loose).receive_shadow);
    }
}
