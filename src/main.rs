//! Graveyard Walk entry point
//!
//! Builds the scene, then runs the frame loop (browser) or a scripted
//! headless walk (native).

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use web_sys::{Document, KeyboardEvent, MouseEvent};

    use graveyard_walk::controller::{MovementController, WorldView};
    use graveyard_walk::game::GameController;
    use graveyard_walk::scene::{ProceduralAssets, SceneBuilder};
    use graveyard_walk::Settings;

    #[wasm_bindgen(inline_js = "
        export function request_pointer_lock() {
            const canvas = document.getElementById('canvas');
            if (canvas && document.pointerLockElement !== canvas) {
                canvas.requestPointerLock();
            }
        }

        export function exit_pointer_lock() {
            if (document.pointerLockElement) {
                document.exitPointerLock();
            }
        }

        export function is_pointer_locked() {
            return document.pointerLockElement !== null;
        }
    ")]
    extern "C" {
        fn request_pointer_lock();
        fn exit_pointer_lock();
        fn is_pointer_locked() -> bool;
    }

    /// Everything the frame loop touches
    struct Game {
        settings: Settings,
        builder: SceneBuilder,
        player: MovementController,
        game: Option<GameController>,
        loading: bool,
        last_time: f64,
    }

    impl Game {
        fn new(settings: Settings, seed: u64) -> Self {
            let config = settings.scene_config(seed);
            let player = MovementController::new(settings.controller, config.graveyard_side);
            Self {
                builder: SceneBuilder::new(config, Rc::new(ProceduralAssets::new())),
                player,
                game: None,
                loading: true,
                last_time: 0.0,
                settings,
            }
        }

        /// First frame with a finished scene
        fn on_scene_built(&mut self, document: &Document) {
            self.player.move_to_start(&self.builder);
            self.game = self.builder.game();
            if !self.settings.rain {
                self.builder.toggle_rain();
            }
            if !self.settings.lightning {
                self.builder.toggle_lightning();
            }
            if let Some(el) = document.get_element_by_id("loading-screen") {
                el.remove();
            }
            if self.settings.show_hint {
                toggle_hidden(document, "hint");
            }
            self.loading = false;
            log::info!("Scene ready; start at {:?}", self.builder.start_position());
        }

        /// Advance one frame; returns false once the game is over
        fn frame(&mut self, dt: f32, document: &Document) -> bool {
            if !self.builder.is_built() {
                return true;
            }
            if self.loading {
                self.on_scene_built(document);
            }
            if !self.builder.advance(dt, &mut self.player, self.game.as_ref()) {
                if let Some(el) = document.get_element_by_id("game-finished-screen") {
                    let _ = el.class_list().add_1("fade-in");
                }
                log::info!("Game finished; refresh to play again.");
                return false;
            }
            true
        }

        fn interact(&mut self, document: &Document) {
            let Some(game) = self.game.as_mut() else {
                return;
            };
            let outcome = game.interact(self.player.position, &mut self.builder.scene().borrow_mut().graph);
            if outcome.advanced() {
                toggle_hidden(document, "key");
            }
        }

        fn on_key_down(&mut self, event: &KeyboardEvent, document: &Document) {
            let code = event.code();
            if self.player.input.set_key(&code, true) {
                return;
            }
            match code.as_str() {
                "KeyE" => self.interact(document),
                "Escape" => exit_pointer_lock(),
                "NumpadAdd" => self.player.change_speed(1.0),
                "NumpadSubtract" => self.player.change_speed(-1.0),
                "Digit1" | "Numpad1" => {
                    self.player.toggle_fly(&self.builder);
                    if self.player.is_flying() {
                        exit_pointer_lock();
                    }
                }
                "Digit2" | "Numpad2" => {
                    self.player.toggle_collisions();
                }
                "Digit3" | "Numpad3" => self.builder.toggle_ambient_light(),
                "Digit4" | "Numpad4" => self.builder.toggle_rain(),
                "Digit5" | "Numpad5" => self.builder.toggle_lightning(),
                "Digit6" | "Numpad6" => self.builder.toggle_infinite_lightning(),
                "Digit7" | "Numpad7" => self.builder.trigger_lightning(),
                "Digit8" | "Numpad8" => {
                    self.builder.toggle_wireframe();
                }
                "Digit9" | "Numpad9" => {
                    toggle_hidden(document, "hint");
                    self.settings.show_hint = !self.settings.show_hint;
                    self.settings.save();
                }
                "KeyC" if self.settings.debug => {
                    log::info!(
                        "Camera at {:?}, yaw {:.1} deg, pitch {:.1} deg",
                        self.player.position,
                        self.player.yaw().to_degrees(),
                        self.player.pitch().to_degrees()
                    );
                }
                _ => {}
            }
        }
    }

    fn toggle_hidden(document: &Document, id: &str) {
        if let Some(el) = document.get_element_by_id(id) {
            let _ = el.class_list().toggle("hidden");
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(log::Level::Info).is_err() {
            web_sys::console::warn_1(&"Logger already initialised".into());
        }

        log::info!("Graveyard Walk starting...");

        let Some(window) = web_sys::window() else {
            return;
        };
        let Some(document) = window.document() else {
            return;
        };

        let settings = Settings::load();
        let seed = js_sys::Date::now() as u64;
        let game = Rc::new(RefCell::new(Game::new(settings, seed)));

        let build = game.borrow_mut().builder.build_all();
        wasm_bindgen_futures::spawn_local(build);
        log::info!("Scene build started with seed: {}", seed);

        setup_input_handlers(&document, game.clone());
        request_animation_frame(game);
    }

    fn setup_input_handlers(document: &Document, game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };

        // Click to look around
        if let Some(canvas) = document.get_element_by_id("canvas") {
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: MouseEvent| {
                if !game.borrow().player.is_flying() {
                    request_pointer_lock();
                }
            });
            let _ = canvas.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Mouse look
        {
            let game = game.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: MouseEvent| {
                if is_pointer_locked() {
                    game.borrow_mut()
                        .player
                        .rotate_from_mouse(event.movement_x() as f32, event.movement_y() as f32);
                }
            });
            let _ = document.add_event_listener_with_callback("mousemove", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Keyboard
        {
            let game = game.clone();
            let document = document.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                game.borrow_mut().on_key_down(&event, &document);
            });
            let _ = window.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            closure.forget();
        }
        {
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                game.borrow_mut().player.input.set_key(&event.code(), false);
            });
            let _ = window.add_event_listener_with_callback("keyup", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn request_animation_frame(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |time: f64| {
            game_loop(game, time);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(game: Rc<RefCell<Game>>, time: f64) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let running = {
            let mut g = game.borrow_mut();
            let dt = if g.last_time > 0.0 {
                ((time - g.last_time) / 1000.0) as f32
            } else {
                0.0
            };
            g.last_time = time;
            // Long stalls (tab in background) would teleport the player
            g.frame(dt.min(0.1), &document)
        };

        if running {
            request_animation_frame(game);
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_game::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

/// Headless run: build the scene, walk to the key, then back to the gate
#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::rc::Rc;

    use anyhow::{Context, bail};
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use glam::Vec3;

    use graveyard_walk::controller::{MovementController, WorldView};
    use graveyard_walk::game::GameController;
    use graveyard_walk::scene::{ProceduralAssets, SceneBuilder};
    use graveyard_walk::Settings;

    const FRAME_DT: f32 = 1.0 / 60.0;
    /// Give up on reaching a target after this many simulated seconds
    const MAX_WALK_SECONDS: f32 = 120.0;
    /// Close enough to interact from standing height
    const ARRIVE_DIST: f32 = 0.5;

    pub fn run() -> anyhow::Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("Graveyard Walk (native) starting...");

        let settings = match std::env::args().nth(1) {
            Some(path) => Settings::load_file(&path).with_context(|| format!("loading settings from {path}"))?,
            None => Settings::default(),
        };
        let seed = settings.seed.unwrap_or_else(rand::random);
        // Second argument: where to write the resolved settings, seed pinned
        if let Some(out) = std::env::args().nth(2) {
            let resolved = Settings {
                seed: Some(seed),
                ..settings.clone()
            };
            resolved.save_file(&out).with_context(|| format!("saving settings to {out}"))?;
        }

        let mut builder = SceneBuilder::new(settings.scene_config(seed), Rc::new(ProceduralAssets::new()));
        let mut pool = LocalPool::new();
        pool.spawner()
            .spawn_local(builder.build_all())
            .context("spawning the scene build")?;
        pool.run_until_stalled();

        if !builder.is_built() {
            let failed: Vec<String> = builder.load_failures().iter().map(|e| e.to_string()).collect();
            bail!("scene build stalled (seed {seed}); failed assets: {failed:?}");
        }

        let mut player = MovementController::new(settings.controller, settings.graveyard_side);
        let mut game = builder.game().context("built scene has no key or gate")?;
        if !player.move_to_start(&builder) {
            bail!("built scene has no entry gate");
        }
        let start = player.position;

        let key_at = world_position(&builder, builder.key())?;
        let mut seconds = walk_to(&mut player, &builder, key_at)?;
        interact(&mut game, &player, &builder);

        let gate_at = builder.start_position().context("gate missing")?;
        seconds += walk_to(&mut player, &builder, gate_at)?;
        interact(&mut game, &player, &builder);

        let state = builder.scene().borrow();
        log::info!("Seed: {seed}");
        log::info!("Scene nodes: {}", state.graph.len());
        log::info!(
            "Terrain heights: {:.3}..{:.3}",
            state.heights.min,
            state.heights.max
        );
        log::info!(
            "Walkable: {}, collidable: {}, unplaced: {}",
            state.walkable.len(),
            state.collidable.len(),
            state.failures.len()
        );
        log::info!("Start {start:.2}, key {key_at:.2}, walked {seconds:.1}s");
        log::info!("Game state: {}", game.state().as_str());
        Ok(())
    }

    fn world_position(builder: &SceneBuilder, node: Option<graveyard_walk::geom::NodeId>) -> anyhow::Result<Vec3> {
        let node = node.context("node missing from the built scene")?;
        Ok(builder.scene().borrow().graph.world_position(node))
    }

    /// Walk in a straight line until standing above `target`; returns the
    /// simulated time taken
    fn walk_to(player: &mut MovementController, builder: &SceneBuilder, target: Vec3) -> anyhow::Result<f32> {
        let mut seconds = 0.0;
        player.input.forward = true;
        while Vec3::new(target.x - player.position.x, 0.0, target.z - player.position.z).length() > ARRIVE_DIST {
            if seconds > MAX_WALK_SECONDS {
                bail!("could not reach {target:.2} from {:.2}", player.position);
            }
            player.face(target);
            builder.advance(FRAME_DT, player, None);
            seconds += FRAME_DT;
        }
        player.input.forward = false;
        Ok(seconds)
    }

    fn interact(game: &mut GameController, player: &MovementController, builder: &SceneBuilder) {
        let outcome = game.interact(player.position, &mut builder.scene().borrow_mut().graph);
        log::info!("Interact: {outcome:?} -> {}", game.state().as_str());
    }
}
