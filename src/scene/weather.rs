//! Ambient light, rain, clouds and lightning
//!
//! Rain and cloud motion were tuned per frame at 60 fps; updates scale by
//! `dt * 60` so they keep that speed at any frame rate.

use std::f32::consts::TAU;
use std::rc::Rc;

use glam::{Vec2, Vec3};
use rand::Rng;

use super::context::BuildContext;
use super::coordinator::Phase;
use crate::consts::{SKY_MAX, SKY_MIN};
use crate::geom::{Aabb, Material, Mesh, Node, NodeId, PointLight, SceneGraph, ShadowTag, Texture};
use crate::scene::assets::paths;

const AMBIENT_COLOR: u32 = 0x050505;
const AMBIENT_DEBUG_COLOR: u32 = 0xbbbbbb;

const REFERENCE_FPS: f32 = 60.0;
/// Drops are recycled once this far below the lowest terrain
const RAIN_FLOOR_MARGIN: f32 = 1.0;

const CLOUD_SIZE: f32 = 50.0;
const CLOUD_OPACITY: f32 = 0.6;
/// Cloud turn per reference frame, radians
const CLOUD_SPIN: f32 = 0.0001;

const LIGHTNING_COLOR: u32 = 0xdbe0e7;
const LIGHTNING_FIRST_TIMEOUT: f32 = 10.0;
const LIGHTNING_DURATION: (f32, f32) = (1.0, 3.0);
const LIGHTNING_POWER: (f32, f32) = (1.0, 7.0);
const LIGHTNING_TIMEOUT: (f32, f32) = (2.0, 30.0);
const LIGHTNING_MAX_TRAVEL: f32 = 5.0;

pub fn sky_bounds() -> Aabb {
    Aabb::new(SKY_MIN, SKY_MAX)
}

#[inline]
fn lerp_range(range: (f32, f32), t: f32) -> f32 {
    range.0 + t * (range.1 - range.0)
}

fn random_in(rng: &mut impl Rng, bounds: &Aabb) -> Vec3 {
    let size = bounds.size();
    bounds.min + Vec3::new(rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>()) * size
}

/// Dim scene light, swappable for a bright debug light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientLight {
    pub base: u32,
    pub debug_color: u32,
    pub debug: bool,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            base: AMBIENT_COLOR,
            debug_color: AMBIENT_DEBUG_COLOR,
            debug: false,
        }
    }
}

impl AmbientLight {
    pub fn toggle(&mut self) {
        self.debug = !self.debug;
    }

    #[inline]
    pub fn color(&self) -> u32 {
        if self.debug { self.debug_color } else { self.base }
    }
}

/// Slanted rain falling over an area shifted upwind
#[derive(Debug, Clone, PartialEq)]
pub struct Rain {
    /// Displacement per reference frame
    pub velocity: Vec3,
    pub area_min: Vec2,
    pub area_max: Vec2,
    pub min_height: f32,
    pub max_height: f32,
    pub visible: bool,
}

impl Rain {
    pub fn new(rng: &mut impl Rng, ground_size: f32, ground_min: f32, max_height: f32) -> Self {
        let velocity = Vec3::new(
            rng.random::<f32>() * 0.2 - 0.1,
            rng.random::<f32>() * -0.1 - 0.35,
            rng.random::<f32>() * 0.2 - 0.1,
        );
        // Drops drift downwind while falling, so start them upwind
        let centre = Vec2::new(-velocity.x * 100.0, -velocity.z * 100.0);
        let half = Vec2::splat(ground_size / 2.0);
        Self {
            velocity,
            area_min: centre - half,
            area_max: centre + half,
            min_height: ground_min - RAIN_FLOOR_MARGIN,
            max_height,
            visible: true,
        }
    }

    fn spawn_xz(&self, rng: &mut impl Rng) -> Vec2 {
        self.area_min + Vec2::new(rng.random::<f32>(), rng.random::<f32>()) * (self.area_max - self.area_min)
    }

    pub fn drops(&self, rng: &mut impl Rng, count: usize) -> Vec<Vec3> {
        (0..count)
            .map(|_| {
                let xz = self.spawn_xz(rng);
                let y = lerp_range((self.min_height, self.max_height), rng.random::<f32>());
                Vec3::new(xz.x, y, xz.y)
            })
            .collect()
    }

    /// Advance every drop; drops below the floor restart at the top
    pub fn update(&self, mesh: &mut Mesh, rng: &mut impl Rng, dt: f32) {
        if !self.visible {
            return;
        }
        let step = self.velocity * dt * REFERENCE_FPS;
        mesh.update_positions(|_, p| {
            let p = p + step;
            if p.y < self.min_height {
                let xz = self.spawn_xz(rng);
                Vec3::new(xz.x, self.max_height, xz.y)
            } else {
                p
            }
        });
    }
}

/// A roaming point light that strikes, crackles and rests
#[derive(Debug, Clone, PartialEq)]
pub struct Lightning {
    pub position: Vec3,
    pub visible: bool,
    /// Seconds until the next strike
    pub time_out: f32,
    /// Seconds left in the current strike
    pub duration: f32,
    pub power: f32,
    pub disabled: bool,
    /// Keep striking without timeouts or duration loss
    pub infinite: bool,
    sky: Aabb,
}

impl Lightning {
    pub fn new(sky: Aabb) -> Self {
        Self {
            position: sky.center(),
            visible: false,
            time_out: LIGHTNING_FIRST_TIMEOUT,
            duration: 0.0,
            power: LIGHTNING_POWER.0,
            disabled: false,
            infinite: false,
            sky,
        }
    }

    /// Strike on the next update
    pub fn trigger(&mut self) {
        self.time_out = 0.0;
    }

    pub fn update(&mut self, rng: &mut impl Rng, dt: f32) {
        if self.time_out > 0.0 && !self.infinite {
            self.time_out -= dt;
            self.visible = false;
        } else {
            self.strike(rng, dt);
        }
    }

    fn strike(&mut self, rng: &mut impl Rng, dt: f32) {
        if self.disabled {
            self.visible = false;
            return;
        }

        if !self.visible {
            self.position = random_in(rng, &self.sky);
            self.visible = true;
            // Short strikes are more likely
            self.duration = lerp_range(LIGHTNING_DURATION, rng.random::<f32>().powi(3));
        } else {
            if !self.infinite {
                self.duration -= dt;
            }
            // Travel a little across the sky, staying inside it
            let jitter = Vec3::new(rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>())
                * (LIGHTNING_MAX_TRAVEL * 2.0)
                - Vec3::splat(LIGHTNING_MAX_TRAVEL);
            let next = self.position + jitter;
            let (min, max) = (self.sky.min, self.sky.max);
            if (min.x..=max.x).contains(&next.x) {
                self.position.x = next.x;
            }
            if (min.z..=max.z).contains(&next.z) {
                self.position.z = next.z;
            }
            if (min.y..=max.y).contains(&next.y) {
                self.position.y = next.y;
            }
        }

        // Crackle
        let centered = (rng.random::<f32>() + rng.random::<f32>()) / 2.0;
        self.power = lerp_range(LIGHTNING_POWER, centered);

        if self.duration <= 0.0 {
            self.visible = false;
            self.time_out = lerp_range(LIGHTNING_TIMEOUT, rng.random::<f32>().powi(3));
            log::debug!("SceneBuilder: lightning resting for {:.1}s", self.time_out);
        }
    }
}

/// Everything the misc phase builds
#[derive(Debug, Clone)]
pub struct Weather {
    pub ambient: AmbientLight,
    pub rain: Rain,
    pub lightning: Lightning,
    pub rain_node: NodeId,
    pub lightning_node: NodeId,
    pub clouds: NodeId,
}

impl Weather {
    /// Per-frame update: clouds, then lightning, then rain
    pub fn update(&mut self, graph: &mut SceneGraph, rng: &mut impl Rng, dt: f32) {
        let spin = CLOUD_SPIN * dt * REFERENCE_FPS;
        for cloud in graph.children(self.clouds).to_vec() {
            graph.node_mut(cloud).rotate_world(Vec3::Y, spin);
        }

        self.lightning.update(rng, dt);
        let node = graph.node_mut(self.lightning_node);
        node.visible = self.lightning.visible;
        node.position = self.lightning.position;
        if let Some(light) = node.light.as_mut() {
            light.intensity = self.lightning.power;
        }

        let rain = graph.node_mut(self.rain_node);
        rain.visible = self.rain.visible;
        if let Some(mesh) = rain.mesh_mut() {
            self.rain.update(mesh, rng, dt);
        }
    }
}

/// Scatter `count` flat clouds through the sky with random types and turns
pub fn spawn_clouds(
    graph: &mut SceneGraph,
    rng: &mut impl Rng,
    group: NodeId,
    textures: &[Rc<Texture>],
    count: usize,
) {
    if textures.is_empty() {
        return;
    }
    let sky = sky_bounds();
    let plane = Rc::new(Mesh::plane(CLOUD_SIZE, CLOUD_SIZE, 1, 1));
    for _ in 0..count {
        let texture = textures[rng.random_range(0..textures.len())].clone();
        let mut material = Material::new();
        material.diffuse = Some(texture);
        material.opacity = CLOUD_OPACITY;
        let mut cloud = Node::new("Cloud").with_position(random_in(rng, &sky));
        cloud.mesh = Some(plane.clone());
        cloud.material = Some(material);
        cloud.rotate_world(Vec3::Y, rng.random::<f32>() * TAU);
        graph.spawn_child(group, cloud);
    }
}

/// Number of clouds covering the sky at `area_per_cloud`
pub fn cloud_count(sky: &Aabb, area_per_cloud: f32) -> usize {
    let size = sky.size();
    (size.x * size.z / area_per_cloud).ceil() as usize
}

/// Misc phase: lights, rain, clouds and lightning
pub async fn build(ctx: BuildContext) {
    let terrain = ctx.scene.borrow().terrain_built.wait();
    let textures = futures::future::join_all(paths::CLOUDS.iter().map(|p| ctx.load_texture(p)));
    let ((), textures) = futures::join!(terrain, textures);
    let Some(textures) = textures
        .into_iter()
        .map(|t| t.map(Rc::new))
        .collect::<Option<Vec<_>>>()
    else {
        return;
    };

    {
        let mut guard = ctx.scene.borrow_mut();
        let state = &mut *guard;
        let sky = sky_bounds();
        let config = state.config;

        let rain = Rain::new(&mut state.rng, config.ground_size(), state.heights.min, sky.max.y);
        let drops = rain.drops(&mut state.rng, config.rain_particles);
        let mut rain_node = Node::new("Rain").with_mesh(Mesh::points(drops));
        let mut rain_material = Material::new();
        rain_material.opacity = 0.4;
        rain_node.material = Some(rain_material);
        let rain_node = state.graph.add_to_scene(rain_node.with_shadow(ShadowTag::Off));

        let clouds = state
            .graph
            .add_to_scene(Node::new("Clouds").with_shadow(ShadowTag::Off));
        let count = cloud_count(&sky, config.sky_area_per_cloud);
        spawn_clouds(&mut state.graph, &mut state.rng, clouds, &textures, count);

        let lightning = Lightning::new(sky);
        let mut light = Node::new("Lightning")
            .with_position(lightning.position)
            .with_light(PointLight {
                color: LIGHTNING_COLOR,
                intensity: lightning.power,
                range: sky.max.x,
                cast_shadow: false,
            });
        light.visible = false;
        let lightning_node = state.graph.add_to_scene(light);

        state.nodes.rain = Some(rain_node);
        state.nodes.clouds = Some(clouds);
        state.nodes.lightning = Some(lightning_node);
        state.weather = Some(Weather {
            ambient: AmbientLight::default(),
            rain,
            lightning,
            rain_node,
            lightning_node,
            clouds,
        });
        log::debug!("SceneBuilder: {count} clouds, {} rain drops", config.rain_particles);
    }
    ctx.complete_phase(Phase::Misc).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_ambient_toggle() {
        let mut ambient = AmbientLight::default();
        assert_eq!(ambient.color(), 0x050505);
        ambient.toggle();
        assert_eq!(ambient.color(), 0xbbbbbb);
        ambient.toggle();
        assert_eq!(ambient.color(), 0x050505);
    }

    #[test]
    fn test_rain_area_is_upwind() {
        let mut rng = Pcg32::seed_from_u64(3);
        let rain = Rain::new(&mut rng, 54.0, -0.2, 50.0);
        let centre = (rain.area_min + rain.area_max) / 2.0;
        assert!((centre.x + rain.velocity.x * 100.0).abs() < 1e-4);
        assert!((centre.y + rain.velocity.z * 100.0).abs() < 1e-4);
        assert!(((rain.area_max - rain.area_min).x - 54.0).abs() < 1e-4);
        assert!((-0.45..-0.35).contains(&rain.velocity.y));
        assert!((rain.min_height - -1.2).abs() < 1e-6);
    }

    #[test]
    fn test_rain_drops_spawn_between_floor_and_sky() {
        let mut rng = Pcg32::seed_from_u64(4);
        let rain = Rain::new(&mut rng, 54.0, 0.0, 50.0);
        for d in rain.drops(&mut rng, 500) {
            assert!((-1.0..=50.0).contains(&d.y));
            assert!(d.x >= rain.area_min.x && d.x <= rain.area_max.x);
        }
    }

    #[test]
    fn test_rain_recycles_fallen_drops() {
        let mut rng = Pcg32::seed_from_u64(5);
        let rain = Rain::new(&mut rng, 54.0, 0.0, 50.0);
        let mut mesh = Mesh::points(vec![Vec3::new(0.0, -0.9, 0.0), Vec3::new(0.0, 20.0, 0.0)]);
        rain.update(&mut mesh, &mut rng, 1.0 / 60.0);
        let p = mesh.positions();
        assert_eq!(p[0].y, 50.0);
        assert!((p[1].y - (20.0 + rain.velocity.y)).abs() < 1e-4);
    }

    #[test]
    fn test_hidden_rain_is_frozen() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut rain = Rain::new(&mut rng, 54.0, 0.0, 50.0);
        rain.visible = false;
        let mut mesh = Mesh::points(vec![Vec3::new(0.0, 20.0, 0.0)]);
        rain.update(&mut mesh, &mut rng, 1.0);
        assert_eq!(mesh.positions()[0].y, 20.0);
    }

    #[test]
    fn test_lightning_waits_for_first_timeout() {
        let mut rng = Pcg32::seed_from_u64(6);
        let mut l = Lightning::new(sky_bounds());
        for _ in 0..9 {
            l.update(&mut rng, 1.0);
            assert!(!l.visible);
        }
        l.update(&mut rng, 1.0);
        l.update(&mut rng, 0.01);
        assert!(l.visible);
        assert!((1.0..=3.0).contains(&l.duration));
        assert!((1.0..=7.0).contains(&l.power));
    }

    #[test]
    fn test_lightning_strike_ends_in_timeout() {
        let mut rng = Pcg32::seed_from_u64(7);
        let sky = sky_bounds();
        let mut l = Lightning::new(sky);
        l.trigger();
        l.update(&mut rng, 0.1);
        assert!(l.visible);
        let mut frames = 0;
        while l.visible && frames < 40 {
            l.update(&mut rng, 0.1);
            assert!(sky.min.cmple(l.position).all() && l.position.cmple(sky.max).all());
            frames += 1;
        }
        assert!(!l.visible);
        assert!((2.0..=30.0).contains(&l.time_out));
    }

    #[test]
    fn test_disabled_and_infinite_lightning() {
        let mut rng = Pcg32::seed_from_u64(8);
        let mut l = Lightning::new(sky_bounds());
        l.disabled = true;
        l.trigger();
        l.update(&mut rng, 0.1);
        assert!(!l.visible);

        l.disabled = false;
        l.infinite = true;
        l.time_out = 100.0;
        l.update(&mut rng, 0.1);
        let duration = l.duration;
        for _ in 0..50 {
            l.update(&mut rng, 1.0);
        }
        assert!(l.visible);
        assert_eq!(l.duration, duration);
    }

    #[test]
    fn test_cloud_count_and_spin() {
        let sky = sky_bounds();
        assert_eq!(cloud_count(&sky, 150.0), 96);

        let mut graph = SceneGraph::default();
        let mut rng = Pcg32::seed_from_u64(9);
        let group = graph.add_to_scene(Node::new("Clouds"));
        let texture = Rc::new(Texture {
            path: "cloud".into(),
            width: 1,
            height: 1,
        });
        spawn_clouds(&mut graph, &mut rng, group, &[texture], 4);
        assert_eq!(graph.children(group).len(), 4);
        for &c in graph.children(group) {
            assert!(sky_bounds().min.cmple(graph.node(c).position).all());
        }
    }
}
