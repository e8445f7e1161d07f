//! Intersection geometry.
//!
//! The board is a single four-way crossing with one signal per approach.
//! Turning vehicles rotate around a signal's position; which signal depends on
//! where the vehicle came from and whether it turns right.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ProtocolViolation, math::normalize_degrees};

/// Headings are snapped to multiples of this after every turn.
pub const HEADING_SNAP_DEGREES: f32 = 22.5;

/// Total sweep of a right turn over one step.
pub const RIGHT_TURN_SWEEP: f32 = -45.0;

/// Total sweep of any other turn over one step.
pub const OTHER_TURN_SWEEP: f32 = 22.5;

/// One of the four approaches to the crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::East => "East",
            Direction::South => "South",
            Direction::West => "West",
        }
    }

    /// Yaw given to a vehicle spawned on this approach.
    pub fn spawn_heading(self) -> f32 {
        match self {
            Direction::South => 90.0,
            Direction::West => 180.0,
            Direction::North => 270.0,
            Direction::East => 0.0,
        }
    }

    /// Yaw of the signal guarding this approach, so it faces the traffic it
    /// controls.
    pub fn signal_heading(self) -> f32 {
        match self {
            Direction::North => 90.0,
            Direction::East => 180.0,
            Direction::South => 270.0,
            Direction::West => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ProtocolViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "North" => Ok(Direction::North),
            "East" => Ok(Direction::East),
            "South" => Ok(Direction::South),
            "West" => Ok(Direction::West),
            other => Err(ProtocolViolation::UnknownDirection(other.to_string())),
        }
    }
}

/// Yaw for a signal keyed by an arbitrary id. Ids that are not a direction
/// name keep the identity heading.
pub fn signal_heading(id: &str) -> f32 {
    id.parse::<Direction>()
        .map(Direction::signal_heading)
        .unwrap_or(0.0)
}

/// Turn a vehicle announces for the crossing.
///
/// Only `right` has its own geometry. Every other value, including an empty or
/// missing one, turns the gentle way around the origin's own signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnDirection {
    Straight,
    Right,
    Left,
    Other,
}

impl TurnDirection {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "straight" => TurnDirection::Straight,
            "right" => TurnDirection::Right,
            "left" => TurnDirection::Left,
            _ => TurnDirection::Other,
        }
    }
}

/// Where and how far a turning vehicle rotates during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnGeometry {
    /// Signal whose position is the pivot.
    pub pivot_signal: Direction,
    /// Signed total yaw change over the step, in degrees.
    pub sweep_degrees: f32,
}

/// Pivot signal for a turn out of `origin`.
pub fn pivot_signal(origin: Direction, turn: TurnDirection) -> Direction {
    let right = turn == TurnDirection::Right;
    match (origin, right) {
        (Direction::North, true) => Direction::East,
        (Direction::West, true) => Direction::North,
        (Direction::South, true) => Direction::West,
        (Direction::East, true) => Direction::South,
        (origin, false) => origin,
    }
}

/// Signed sweep for a turn. Right turns are sharper and run the other way.
pub fn turn_sweep(turn: TurnDirection) -> f32 {
    match turn {
        TurnDirection::Right => RIGHT_TURN_SWEEP,
        _ => OTHER_TURN_SWEEP,
    }
}

pub fn resolve_turn(origin: Direction, turn: TurnDirection) -> TurnGeometry {
    TurnGeometry {
        pivot_signal: pivot_signal(origin, turn),
        sweep_degrees: turn_sweep(turn),
    }
}

/// Rounds a yaw to the nearest multiple of [`HEADING_SNAP_DEGREES`], wrapped
/// into `[0, 360)`.
pub fn snap_heading(yaw: f32) -> f32 {
    normalize_degrees((yaw / HEADING_SNAP_DEGREES).round() * HEADING_SNAP_DEGREES)
}
