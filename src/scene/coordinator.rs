//! Load group and build phase bookkeeping
//!
//! Object categories register a named group before any loading starts and
//! mark it complete exactly once. The objects phase becomes ready when the
//! registration list is sealed and every group is done; the scene is ready
//! when the misc, ground and objects phases all are. The first time that
//! happens the caller is told (once) to run finalization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::readiness::{ReadyFlag, WaitReady};

/// Top-level build phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Lights, rain, clouds, lightning
    Misc,
    /// Terrain and path
    Ground,
    /// Every registered load group
    Objects,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Misc, Phase::Ground, Phase::Objects];

    #[inline]
    fn index(self) -> usize {
        match self {
            Phase::Misc => 0,
            Phase::Ground => 1,
            Phase::Objects => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Misc => "Misc",
            Phase::Ground => "Ground",
            Phase::Objects => "Objects",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("unknown load group `{0}`")]
    UnknownGroup(String),
    #[error("load group `{0}` registered twice")]
    DuplicateGroup(String),
    #[error("load group `{0}` registered after the group list was sealed")]
    Sealed(String),
}

/// What a state change produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing new became ready
    None,
    /// A phase became ready but the scene is still incomplete
    PhaseReady(Phase),
    /// Every phase is ready for the first time this cycle; finalize now
    SceneReady,
}

#[derive(Debug)]
struct LoadGroup {
    name: String,
    done: ReadyFlag,
}

#[derive(Debug, Default)]
pub struct AssetLoadCoordinator {
    groups: Vec<LoadGroup>,
    sealed: bool,
    phases: [ReadyFlag; 3],
    finalize_issued: bool,
    scene_built: ReadyFlag,
}

impl AssetLoadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str) -> Result<(), CoordinatorError> {
        if self.sealed {
            return Err(CoordinatorError::Sealed(name.to_string()));
        }
        if self.groups.iter().any(|g| g.name == name) {
            return Err(CoordinatorError::DuplicateGroup(name.to_string()));
        }
        self.groups.push(LoadGroup {
            name: name.to_string(),
            done: ReadyFlag::new(),
        });
        Ok(())
    }

    /// Close the group list; until then the objects phase cannot complete
    pub fn seal(&mut self) -> Transition {
        self.sealed = true;
        self.evaluate()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    /// Mark a group done. Marking a finished group again is a no-op.
    pub fn mark_group_complete(&mut self, name: &str) -> Result<Transition, CoordinatorError> {
        let group = self
            .groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| CoordinatorError::UnknownGroup(name.to_string()))?;
        if !group.done.set() {
            return Ok(Transition::None);
        }
        log::info!("SceneBuilder: {} built.", capitalize(name));
        Ok(self.evaluate())
    }

    pub fn is_group_complete(&self, name: &str) -> Result<bool, CoordinatorError> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.done.is_set())
            .ok_or_else(|| CoordinatorError::UnknownGroup(name.to_string()))
    }

    /// Future resolving when `name` completes
    pub fn wait_group(&self, name: &str) -> Result<WaitReady, CoordinatorError> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.done.wait())
            .ok_or_else(|| CoordinatorError::UnknownGroup(name.to_string()))
    }

    /// Sealed and every registered group done
    pub fn all_complete(&self) -> bool {
        self.sealed && self.groups.iter().all(|g| g.done.is_set())
    }

    pub fn mark_phase_ready(&mut self, phase: Phase) -> Transition {
        if !self.phases[phase.index()].set() {
            return Transition::None;
        }
        log::info!("SceneBuilder: {} built.", phase.as_str());
        self.evaluate_scene().unwrap_or(Transition::PhaseReady(phase))
    }

    #[inline]
    pub fn is_phase_ready(&self, phase: Phase) -> bool {
        self.phases[phase.index()].is_set()
    }

    pub fn wait_phase(&self, phase: Phase) -> WaitReady {
        self.phases[phase.index()].wait()
    }

    /// All three phases ready (finalization may still be running)
    pub fn is_scene_ready(&self) -> bool {
        Phase::ALL.iter().all(|p| self.is_phase_ready(*p))
    }

    /// Record that finalization ran; the scene is now usable
    pub fn mark_scene_built(&self) -> bool {
        let first = self.scene_built.set();
        if first {
            log::info!("SceneBuilder: Scene built.");
        }
        first
    }

    #[inline]
    pub fn is_scene_built(&self) -> bool {
        self.scene_built.is_set()
    }

    pub fn wait_scene_built(&self) -> WaitReady {
        self.scene_built.wait()
    }

    fn evaluate(&mut self) -> Transition {
        if self.all_complete() {
            self.mark_phase_ready(Phase::Objects)
        } else {
            Transition::None
        }
    }

    fn evaluate_scene(&mut self) -> Option<Transition> {
        if self.is_scene_ready() && !self.finalize_issued {
            self.finalize_issued = true;
            Some(Transition::SceneReady)
        } else {
            None
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
