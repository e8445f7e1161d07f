//! `crossroad_shared`
//!
//! Libraries shared by the visual client and its tooling.
//!
//! - Wire protocol of the intersection simulation server.
//! - Direction, turn and heading tables of the four-way crossing.
//! - Scene/board collaborator traits the engine drives.
//! - Error taxonomy, config and small math.

pub mod config;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod math;
pub mod net;
pub mod render;
