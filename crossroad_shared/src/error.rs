//! Error taxonomy.
//!
//! Transport failures are recoverable by deactivating the engine. Protocol
//! violations mean the local registries no longer agree with the server and
//! the engine halts.

use thiserror::Error;

use crate::net::VehicleId;

/// Connection or HTTP-level failure for a single request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("request `{request}` failed: {message}")]
pub struct TransportError {
    pub request: String,
    pub message: String,
}

impl TransportError {
    pub fn new(request: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            message: message.into(),
        }
    }
}

/// Server/client desync.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("vehicle {0} spawned twice")]
    DuplicateVehicle(VehicleId),
    #[error("signal `{0}` created twice")]
    DuplicateSignal(String),
    #[error("vehicle {0} is not registered")]
    UnknownVehicle(VehicleId),
    #[error("signal `{0}` is not registered")]
    UnknownSignal(String),
    #[error("vehicle {id}: unknown action `{action}`")]
    UnknownAction { id: VehicleId, action: String },
    #[error("unknown direction `{0}`")]
    UnknownDirection(String),
    #[error("signal `{id}`: unknown state `{state}`")]
    UnknownSignalState { id: String, state: String },
    #[error("malformed `{request}` payload: {reason}")]
    Malformed { request: String, reason: String },
}
