//! Hand-placed object transforms
//!
//! Positions are authored on the XZ plane; `y` is an offset applied after
//! grounding by the categories that honour it. Angles are authored in
//! degrees and converted once here.

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geom::Node;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in radians, applied as world X, Y then Z turns
    pub rotation: Vec3,
}

impl Transform {
    pub fn from_degrees(position: Vec3, degrees: Vec3) -> Self {
        Self {
            position,
            rotation: Vec3::new(
                degrees.x.to_radians(),
                degrees.y.to_radians(),
                degrees.z.to_radians(),
            ),
        }
    }

    /// Position and turn `node`
    pub fn apply(&self, node: &mut Node) {
        node.position = self.position;
        node.rotate_euler_world(self.rotation);
    }
}

/// Shorthand for authored entries: position, then degrees
fn t(px: f32, py: f32, pz: f32, rx: f32, ry: f32, rz: f32) -> Transform {
    Transform::from_degrees(Vec3::new(px, py, pz), Vec3::new(rx, ry, rz))
}

fn random_yaw(rng: &mut impl Rng) -> f32 {
    rng.random::<f32>() * 360.0
}

/// Every authored transform of one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub graves: Vec<Transform>,
    pub trees: Vec<Transform>,
    pub lanterns: Vec<Transform>,
    pub urns: Vec<Transform>,
    pub keys: Vec<Transform>,
}

impl Layout {
    pub fn generate(rng: &mut impl Rng) -> Self {
        let mut graves = grave_transforms();
        let trees = tree_transforms(rng, &mut graves);
        Self {
            graves,
            trees,
            lanterns: lantern_transforms(rng),
            urns: urn_transforms(rng),
            keys: key_transforms(rng),
        }
    }
}

/// Rows of graves on either side of the path
pub fn grave_transforms() -> Vec<Transform> {
    let mut out = Vec::new();
    let mut row = |xs: &[f32], zs: &[f32], yaw: f32| {
        for &x in xs {
            for &z in zs {
                out.push(t(x, 0.0, z, 0.0, yaw, 0.0));
            }
        }
    };

    // Two rows west of the mausoleum
    row(&[-12.0, -10.0, -8.0, -6.0, -4.0], &[-12.0], 0.0);
    row(&[-12.0, -10.0, -8.0, -6.0, -4.0], &[-8.0], 0.0);
    // Two rows west of the gate, facing the path
    row(&[-12.0], &[12.0, 10.0, 8.0, 4.0, 2.0, 0.0], 90.0);
    row(&[-8.0], &[12.0, 10.0, 8.0, 4.0, 2.0, 0.0], 90.0);
    // Four rows east of the mausoleum
    for z in [-12.0, -8.0, -3.0, 1.0] {
        row(&[12.0, 10.0, 8.0, 6.0, 4.0], &[z], 0.0);
    }
    // Two rows east of the gate, turned around
    row(&[12.0, 10.0, 8.0, 6.0, 4.0], &[12.0], 180.0);
    row(&[12.0, 10.0, 8.0, 6.0, 4.0], &[8.0], 180.0);
    out
}

/// Two trees by the entrance, plus 3-5 that take the place of random graves
pub fn tree_transforms(rng: &mut impl Rng, graves: &mut Vec<Transform>) -> Vec<Transform> {
    let mut trees = vec![t(2.0, 0.0, 11.0, 0.0, 90.0, 0.0), t(1.5, 0.0, 7.5, 0.0, 0.0, 0.0)];

    let centered = (rng.random::<f32>() + rng.random::<f32>()) / 2.0;
    let replaced = 3 + (centered * 3.0) as usize;
    for _ in 0..replaced {
        if graves.is_empty() {
            break;
        }
        let i = rng.random_range(0..graves.len());
        let grave = graves.swap_remove(i);
        let yaw = random_yaw(rng);
        trees.push(Transform::from_degrees(
            grave.position,
            Vec3::new(0.0, yaw, 0.0),
        ));
    }
    trees
}

/// Lanterns at the ends of the side paths and in front of the mausoleum
pub fn lantern_transforms(rng: &mut impl Rng) -> Vec<Transform> {
    [
        (11.8, 4.5),
        (12.1, -4.5),
        (-11.9, 6.0),
        // Behind the big tree
        (-12.0, -3.0),
        (-3.0, -3.5),
    ]
    .into_iter()
    .map(|(x, z)| t(x, 0.0, z, 0.0, random_yaw(rng), 0.0))
    .collect()
}

/// Spots where an urn may stand; `y` lifts it after grounding
pub fn urn_transforms(rng: &mut impl Rng) -> Vec<Transform> {
    vec![
        // Front of the mausoleum
        t(2.3, 0.0, -5.0, 0.0, random_yaw(rng), 0.0),
        // Fallen off the mausoleum, upside down
        t(-3.3, 0.01, -5.15, -10.0, 160.0, 180.0),
        t(-11.7, 0.0, 6.3, 0.0, random_yaw(rng), 0.0),
        // On a south-east fence pillar
        t(9.0, 0.0, 13.5, 0.0, random_yaw(rng), 0.0),
        t(6.0, 0.0, 0.7, 0.0, random_yaw(rng), 0.0),
        t(1.0, 0.0, 8.2, 0.0, random_yaw(rng), 0.0),
        // Outside the fence behind the big tree
        t(-14.0, 0.0, -1.7, 0.0, random_yaw(rng), 0.0),
    ]
}

/// Candidate hiding spots for the key; one is picked per scene
pub fn key_transforms(rng: &mut impl Rng) -> Vec<Transform> {
    let first = if rng.random_bool(0.5) {
        // On the south wall, west of the gate
        t(-11.0, 0.0, 13.5, 0.0, 0.0, 0.0)
    } else {
        // Just outside the south wall
        t(-11.0, 0.0, 14.0, 0.0, 100.0, 0.0)
    };
    vec![
        first,
        t(8.0, 0.0, 7.75, 0.0, 186.0, 0.0),
        t(2.25, 0.0, -8.35, 0.0, random_yaw(rng), 0.0),
        t(12.75, 0.0, -4.45, 0.0, random_yaw(rng), 0.0),
        // Under the big tree
        t(-8.7, 0.0, -4.4, 0.0, random_yaw(rng), 0.0),
    ]
}
