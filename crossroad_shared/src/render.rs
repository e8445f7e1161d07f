//! Scene abstraction.
//!
//! The engine never draws anything itself. It drives a [`SceneBackend`] that
//! owns the visual entities, and a [`BoardSetup`] that sizes the board once.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    entity::{EntityHandle, EntityKind, SignalState},
    math::Vec3,
};

/// Visual side of the simulation.
pub trait SceneBackend: Send {
    fn create_visual_entity(&mut self, kind: EntityKind, position: Vec3, heading: f32)
        -> EntityHandle;
    fn destroy_visual_entity(&mut self, handle: EntityHandle);
    fn set_position(&mut self, handle: EntityHandle, position: Vec3);
    fn set_heading(&mut self, handle: EntityHandle, heading: f32);
    /// Brake/stop lights of a vehicle.
    fn set_indicator_state(&mut self, handle: EntityHandle, on: bool);
    fn set_signal_color(&mut self, id: &str, state: SignalState);
}

/// One-shot board geometry/camera adjustment.
pub trait BoardSetup: Send {
    fn configure_board(&mut self, width: i32, depth: i32);
}

/// Last known transform of an entity in a [`LogScene`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityView {
    pub kind: EntityKind,
    pub position: Vec3,
    pub heading: f32,
    pub indicator: bool,
}

/// Headless scene that keeps the last transform of every entity and reports
/// changes through `tracing`.
#[derive(Default)]
pub struct LogScene {
    next: u64,
    entities: HashMap<EntityHandle, EntityView>,
    signal_colors: HashMap<String, SignalState>,
    board: Option<(i32, i32)>,
}

impl LogScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&EntityView> {
        self.entities.get(&handle)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn signal_color(&self, id: &str) -> Option<SignalState> {
        self.signal_colors.get(id).copied()
    }

    pub fn board(&self) -> Option<(i32, i32)> {
        self.board
    }
}

impl SceneBackend for LogScene {
    fn create_visual_entity(&mut self, kind: EntityKind, position: Vec3, heading: f32) -> EntityHandle {
        self.next += 1;
        let handle = EntityHandle(self.next);
        self.entities.insert(
            handle,
            EntityView {
                kind,
                position,
                heading,
                indicator: false,
            },
        );
        debug!(?handle, ?kind, ?position, heading, "Entity created");
        handle
    }

    fn destroy_visual_entity(&mut self, handle: EntityHandle) {
        self.entities.remove(&handle);
        debug!(?handle, "Entity destroyed");
    }

    fn set_position(&mut self, handle: EntityHandle, position: Vec3) {
        if let Some(e) = self.entities.get_mut(&handle) {
            e.position = position;
        }
    }

    fn set_heading(&mut self, handle: EntityHandle, heading: f32) {
        if let Some(e) = self.entities.get_mut(&handle) {
            e.heading = heading;
        }
    }

    fn set_indicator_state(&mut self, handle: EntityHandle, on: bool) {
        if let Some(e) = self.entities.get_mut(&handle) {
            e.indicator = on;
        }
    }

    fn set_signal_color(&mut self, id: &str, state: SignalState) {
        debug!(signal = %id, %state, "Signal changed");
        self.signal_colors.insert(id.to_string(), state);
    }
}

impl BoardSetup for LogScene {
    fn configure_board(&mut self, width: i32, depth: i32) {
        debug!(width, depth, "Board configured");
        self.board = Some((width, depth));
    }
}
