//! Test doubles for driving a [`SimulationClient`](crate::SimulationClient)
//! without a server or a renderer.

use std::{
    collections::VecDeque,
    ops::Deref,
    sync::Mutex,
};

use async_trait::async_trait;
use crossroad_shared::{
    entity::{EntityHandle, EntityKind, SignalState},
    error::TransportError,
    math::Vec3,
    render::{BoardSetup, LogScene, SceneBackend},
};

use crate::transport::Transport;

/// Answers requests from a fixed script, in order.
///
/// Once the script runs out every request fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<String, TransportError>>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Result<String, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Request names received so far.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request_name: &str) -> Result<String, TransportError> {
        lock(&self.sent).push(request_name.to_string());
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new(request_name, "script exhausted")))
    }
}

/// [`LogScene`] that also counts every call it receives.
#[derive(Default)]
pub struct RecordingScene {
    inner: LogScene,
    calls: usize,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total scene calls, board setup included.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Deref for RecordingScene {
    type Target = LogScene;

    fn deref(&self) -> &LogScene {
        &self.inner
    }
}

impl SceneBackend for RecordingScene {
    fn create_visual_entity(&mut self, kind: EntityKind, position: Vec3, heading: f32) -> EntityHandle {
        self.calls += 1;
        self.inner.create_visual_entity(kind, position, heading)
    }

    fn destroy_visual_entity(&mut self, handle: EntityHandle) {
        self.calls += 1;
        self.inner.destroy_visual_entity(handle);
    }

    fn set_position(&mut self, handle: EntityHandle, position: Vec3) {
        self.calls += 1;
        self.inner.set_position(handle, position);
    }

    fn set_heading(&mut self, handle: EntityHandle, heading: f32) {
        self.calls += 1;
        self.inner.set_heading(handle, heading);
    }

    fn set_indicator_state(&mut self, handle: EntityHandle, on: bool) {
        self.calls += 1;
        self.inner.set_indicator_state(handle, on);
    }

    fn set_signal_color(&mut self, id: &str, state: SignalState) {
        self.calls += 1;
        self.inner.set_signal_color(id, state);
    }
}

impl BoardSetup for RecordingScene {
    fn configure_board(&mut self, width: i32, depth: i32) {
        self.calls += 1;
        self.inner.configure_board(width, depth);
    }
}
