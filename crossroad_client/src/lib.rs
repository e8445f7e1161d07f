//! `crossroad_client`
//!
//! Client-side systems:
//! - Transport adapter (HTTP POST per named request)
//! - Protocol state machine (board, lights, then stepping)
//! - Entity reconciliation against the step payloads
//! - Interpolation of moves and turns between steps

pub mod client;
pub mod interp;
pub mod protocol;
pub mod reconcile;
pub mod testing;
pub mod transport;

pub use client::{SimulationClient, SimulationStatus};
