//! Interpolation.
//!
//! The server sends discrete steps; the client renders at its own rate. Each
//! step lasts a fixed wall-clock duration, during which move intents are
//! lerped by normalized progress and turn intents integrate a constant
//! angular velocity around their pivot.

use crossroad_shared::{
    geometry::snap_heading,
    math::{normalize_degrees, Vec3},
    net::VehicleId,
    render::SceneBackend,
};
use tracing::warn;

use crate::reconcile::Reconciler;

/// Straight-line motion over the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionIntent {
    pub id: VehicleId,
    pub start: Vec3,
    pub end: Vec3,
}

impl MotionIntent {
    /// Position at progress `t`. Not clamped.
    pub fn position_at(&self, t: f32) -> Vec3 {
        self.start.lerp(self.end, t)
    }
}

/// Rotation around a pivot over the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnIntent {
    pub id: VehicleId,
    /// Signed yaw change over a full step, in degrees.
    pub sweep_degrees: f32,
    pub pivot: Vec3,
}

/// Transient per-step instruction produced by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    Move(MotionIntent),
    Turn(TurnIntent),
}

impl Intent {
    pub fn vehicle(&self) -> VehicleId {
        match self {
            Intent::Move(m) => m.id,
            Intent::Turn(t) => t.id,
        }
    }
}

/// Countdown over one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTimer {
    duration: f32,
    remaining: f32,
}

impl StepTimer {
    pub fn new(duration: f32) -> Self {
        Self {
            duration,
            remaining: duration,
        }
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn tick(&mut self, dt: f32) {
        self.remaining -= dt;
    }

    /// `1 - remaining / duration`. Exceeds 1.0 when a tick overshoots.
    pub fn progress(&self) -> f32 {
        1.0 - self.remaining / self.duration
    }

    pub fn expired(&self) -> bool {
        self.remaining <= 0.0
    }

    pub fn reset(&mut self) {
        self.remaining = self.duration;
    }
}

/// Drives move/turn intents once per frame.
#[derive(Debug)]
pub struct Scheduler {
    timer: StepTimer,
    moves: Vec<MotionIntent>,
    turns: Vec<TurnIntent>,
}

impl Scheduler {
    pub fn new(step_duration: f32) -> Self {
        Self {
            timer: StepTimer::new(step_duration),
            moves: Vec::new(),
            turns: Vec::new(),
        }
    }

    pub fn timer(&self) -> &StepTimer {
        &self.timer
    }

    pub fn moves(&self) -> &[MotionIntent] {
        &self.moves
    }

    pub fn turns(&self) -> &[TurnIntent] {
        &self.turns
    }

    pub fn enqueue(&mut self, intents: impl IntoIterator<Item = Intent>) {
        for intent in intents {
            match intent {
                Intent::Move(m) => self.moves.push(m),
                Intent::Turn(t) => self.turns.push(t),
            }
        }
    }

    /// Advances by `dt` seconds. Returns true when the step countdown expired
    /// on this tick; intents are cleared and the timer restarted by then.
    pub fn advance<S: SceneBackend>(
        &mut self,
        dt: f32,
        reconciler: &mut Reconciler,
        scene: &mut S,
    ) -> bool {
        self.timer.tick(dt);
        let t = self.timer.progress();

        for m in &self.moves {
            let Some(vehicle) = reconciler.vehicle_mut(m.id) else {
                warn!(vehicle = %m.id, "Move intent for missing vehicle");
                continue;
            };
            vehicle.position = m.position_at(t);
            scene.set_position(vehicle.handle, vehicle.position);
        }

        let fraction = dt / self.timer.duration();
        for turn in &self.turns {
            let Some(vehicle) = reconciler.vehicle_mut(turn.id) else {
                warn!(vehicle = %turn.id, "Turn intent for missing vehicle");
                continue;
            };
            let angle = turn.sweep_degrees * fraction;
            vehicle.position = vehicle.position.rotate_around_y(turn.pivot, angle);
            vehicle.heading = normalize_degrees(vehicle.heading + angle);
            scene.set_position(vehicle.handle, vehicle.position);
            scene.set_heading(vehicle.handle, vehicle.heading);
        }

        if !self.timer.expired() {
            return false;
        }

        self.correct_headings(reconciler, scene);
        self.clear();
        self.timer.reset();
        true
    }

    /// Snaps every turning vehicle to the heading grid.
    fn correct_headings<S: SceneBackend>(&self, reconciler: &mut Reconciler, scene: &mut S) {
        for turn in &self.turns {
            if let Some(vehicle) = reconciler.vehicle_mut(turn.id) {
                vehicle.heading = snap_heading(vehicle.heading);
                scene.set_heading(vehicle.handle, vehicle.heading);
            }
        }
    }

    pub fn clear(&mut self) {
        self.moves.clear();
        self.turns.clear();
    }

    /// Drops all intents and restarts the countdown.
    pub fn reset(&mut self) {
        self.clear();
        self.timer.reset();
    }
}
