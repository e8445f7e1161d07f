//! Entity vocabulary shared by the reconciler and the scene collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::ProtocolViolation, net::VehicleId};

/// Opaque handle to a visual entity owned by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHandle(pub u64);

/// What a visual entity depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Signal,
    Vehicle,
}

/// Display state of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    Red,
    Yellow,
    Green,
}

impl SignalState {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalState::Red => "red",
            SignalState::Yellow => "yellow",
            SignalState::Green => "green",
        }
    }

    /// Parses the wire value for signal `id`.
    pub fn parse(id: &str, state: &str) -> Result<Self, ProtocolViolation> {
        match state {
            "red" => Ok(SignalState::Red),
            "yellow" => Ok(SignalState::Yellow),
            "green" => Ok(SignalState::Green),
            other => Err(ProtocolViolation::UnknownSignalState {
                id: id.to_string(),
                state: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle action reported for a vehicle in a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleAction {
    Spawned,
    Destroyed,
    Moving,
    Turning,
    Stopped,
}

impl VehicleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleAction::Spawned => "spawned",
            VehicleAction::Destroyed => "destroyed",
            VehicleAction::Moving => "moving",
            VehicleAction::Turning => "turning",
            VehicleAction::Stopped => "stopped",
        }
    }

    /// Parses the wire value for vehicle `id`.
    pub fn parse(id: VehicleId, action: &str) -> Result<Self, ProtocolViolation> {
        match action {
            "spawned" => Ok(VehicleAction::Spawned),
            "destroyed" => Ok(VehicleAction::Destroyed),
            "moving" => Ok(VehicleAction::Moving),
            "turning" => Ok(VehicleAction::Turning),
            "stopped" => Ok(VehicleAction::Stopped),
            other => Err(ProtocolViolation::UnknownAction {
                id,
                action: other.to_string(),
            }),
        }
    }
}
