//! Find the key, open the gate
//!
//! The state only moves forward: Searching -> KeyFound -> GateOpened.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::consts::INTERACT_DISTANCE;
use crate::geom::{NodeId, SceneGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameState {
    #[default]
    Searching,
    KeyFound,
    GateOpened,
}

impl GameState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameState::Searching => "Searching",
            GameState::KeyFound => "KeyFound",
            GameState::GateOpened => "GateOpened",
        }
    }
}

/// Result of one interact action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractOutcome {
    PickedUpKey,
    KeyOutOfReach,
    OpenedGate,
    GateOutOfReach,
    /// The game is already over
    Finished,
}

impl InteractOutcome {
    /// The state changed
    #[inline]
    pub fn advanced(self) -> bool {
        matches!(self, InteractOutcome::PickedUpKey | InteractOutcome::OpenedGate)
    }
}

#[derive(Debug, Clone)]
pub struct GameController {
    key: NodeId,
    gate: NodeId,
    state: GameState,
    pub interact_distance: f32,
}

impl GameController {
    pub fn new(key: NodeId, gate: NodeId) -> Self {
        Self {
            key,
            gate,
            state: GameState::Searching,
            interact_distance: INTERACT_DISTANCE,
        }
    }

    #[inline]
    pub fn state(&self) -> GameState {
        self.state
    }

    #[inline]
    pub fn has_finished(&self) -> bool {
        self.state == GameState::GateOpened
    }

    fn in_reach(&self, player: Vec3, target: Vec3) -> bool {
        player.distance(target) <= self.interact_distance
    }

    /// The interact key: pick up the key, or use it on the gate
    pub fn interact(&mut self, player: Vec3, graph: &mut SceneGraph) -> InteractOutcome {
        match self.state {
            GameState::Searching => {
                if self.in_reach(player, graph.world_position(self.key)) {
                    graph.node_mut(self.key).visible = false;
                    self.state = GameState::KeyFound;
                    log::info!("Found a key!");
                    InteractOutcome::PickedUpKey
                } else {
                    log::info!("Key not found.");
                    InteractOutcome::KeyOutOfReach
                }
            }
            GameState::KeyFound => {
                if self.in_reach(player, graph.world_position(self.gate)) {
                    self.state = GameState::GateOpened;
                    log::info!("Gate opened.");
                    InteractOutcome::OpenedGate
                } else {
                    log::info!("Not close enough to the gate.");
                    InteractOutcome::GateOutOfReach
                }
            }
            GameState::GateOpened => InteractOutcome::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Node;

    fn setup() -> (SceneGraph, GameController) {
        let mut graph = SceneGraph::default();
        let key = graph.add_to_scene(Node::new("Key").with_position(Vec3::new(5.0, 0.0, 0.0)));
        let fence = graph.add_to_scene(Node::new("Fence Whole").with_position(Vec3::new(0.0, 0.0, 10.0)));
        let gate = graph.spawn_child(fence, Node::new("Gate").with_position(Vec3::new(0.0, 0.0, 3.0)));
        (graph, GameController::new(key, gate))
    }

    #[test]
    fn test_full_playthrough() {
        let (mut graph, mut game) = setup();
        assert_eq!(game.state(), GameState::Searching);

        assert_eq!(game.interact(Vec3::new(4.0, 1.0, 0.0), &mut graph), InteractOutcome::PickedUpKey);
        assert_eq!(game.state(), GameState::KeyFound);
        assert!(!graph.node(game.key).visible);

        // Gate sits at its world position, inside the fence group
        assert_eq!(game.interact(Vec3::new(0.0, 0.0, 3.0), &mut graph), InteractOutcome::GateOutOfReach);
        assert_eq!(game.interact(Vec3::new(0.0, 1.0, 12.0), &mut graph), InteractOutcome::OpenedGate);
        assert!(game.has_finished());
        assert_eq!(game.interact(Vec3::ZERO, &mut graph), InteractOutcome::Finished);
        assert_eq!(game.state(), GameState::GateOpened);
    }

    #[test]
    fn test_key_out_of_reach_keeps_searching() {
        let (mut graph, mut game) = setup();
        let outcome = game.interact(Vec3::new(2.9, 0.0, 0.0), &mut graph);
        assert_eq!(outcome, InteractOutcome::KeyOutOfReach);
        assert!(!outcome.advanced());
        assert_eq!(game.state(), GameState::Searching);
        assert!(graph.node(game.key).visible);
    }

    #[test]
    fn test_reach_boundary_is_inclusive() {
        let (mut graph, mut game) = setup();
        assert!(game.interact(Vec3::new(3.0, 0.0, 0.0), &mut graph).advanced());
    }

    #[test]
    fn test_gate_needs_key_first() {
        let (mut graph, mut game) = setup();
        let at_gate = Vec3::new(0.0, 0.0, 13.0);
        assert_eq!(game.interact(at_gate, &mut graph), InteractOutcome::KeyOutOfReach);
        assert_eq!(game.state(), GameState::Searching);
    }
}
