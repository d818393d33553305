//! CPU-side geometry: meshes, rays, bounds and the scene graph
//!
//! Everything placement, probing and movement needs lives here; a renderer
//! only reads the finished graph.

pub mod aabb;
pub mod graph;
pub mod mesh;
pub mod ray;

pub use aabb::Aabb;
pub use graph::{Material, Node, NodeId, PointLight, RayHit, SceneGraph, ShadowTag, Texture};
pub use mesh::Mesh;
pub use ray::Ray;
