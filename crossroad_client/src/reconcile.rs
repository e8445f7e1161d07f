//! Entity reconciliation.
//!
//! Maps server identities onto locally owned visual entities. Signals are
//! keyed by their string id and live for the whole session; vehicles are keyed
//! by their integer id and live from `spawned` to `destroyed`.
//!
//! Every vehicle named by a non-spawn record must already be registered.
//! Anything else is a desync and is reported, never papered over.

use std::collections::HashMap;

use crossroad_shared::{
    entity::{EntityHandle, EntityKind, SignalState, VehicleAction},
    error::ProtocolViolation,
    geometry::{resolve_turn, signal_heading, Direction, TurnDirection},
    math::Vec3,
    net::{CarStep, LightInit, LightStep, VehicleId},
    render::SceneBackend,
};
use tracing::debug;

use crate::interp::{Intent, MotionIntent, TurnIntent};

/// A signal guarding one approach.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub handle: EntityHandle,
    pub position: Vec3,
    pub heading: f32,
    pub state: SignalState,
}

/// A vehicle currently on the board.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub handle: EntityHandle,
    pub position: Vec3,
    pub heading: f32,
    /// Stop lights on.
    pub stopped: bool,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    signals: HashMap<String, Signal>,
    vehicles: HashMap<VehicleId, Vehicle>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self, id: &str) -> Option<&Signal> {
        self.signals.get(id)
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(&id)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Registered vehicle ids in ascending order.
    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        let mut ids: Vec<_> = self.vehicles.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Creates the signals announced by `lights-init`.
    pub fn apply_light_init<S: SceneBackend>(
        &mut self,
        records: &[LightInit],
        scene: &mut S,
    ) -> Result<(), ProtocolViolation> {
        for rec in records {
            if self.signals.contains_key(&rec.id) {
                return Err(ProtocolViolation::DuplicateSignal(rec.id.clone()));
            }
            let state = SignalState::parse(&rec.id, &rec.state)?;
            let position = Vec3::from_cell(rec.x, rec.y);
            let heading = signal_heading(&rec.id);
            let handle = scene.create_visual_entity(EntityKind::Signal, position, heading);
            scene.set_signal_color(&rec.id, state);
            debug!(signal = %rec.id, %state, ?position, "Signal created");
            self.signals.insert(
                rec.id.clone(),
                Signal {
                    handle,
                    position,
                    heading,
                    state,
                },
            );
        }
        Ok(())
    }

    /// Updates signal colours from a step.
    pub fn apply_light_step<S: SceneBackend>(
        &mut self,
        records: &[LightStep],
        scene: &mut S,
    ) -> Result<(), ProtocolViolation> {
        for rec in records {
            let state = SignalState::parse(&rec.id, &rec.state)?;
            let signal = self
                .signals
                .get_mut(&rec.id)
                .ok_or_else(|| ProtocolViolation::UnknownSignal(rec.id.clone()))?;
            if signal.state != state {
                signal.state = state;
                scene.set_signal_color(&rec.id, state);
            }
        }
        Ok(())
    }

    /// Applies vehicle lifecycle records in order and returns the intents they
    /// produce for the current step.
    pub fn apply_vehicle_steps<S: SceneBackend>(
        &mut self,
        records: &[CarStep],
        scene: &mut S,
    ) -> Result<Vec<Intent>, ProtocolViolation> {
        let mut intents: Vec<Intent> = Vec::new();
        for rec in records {
            let action = VehicleAction::parse(rec.id, &rec.action)?;
            // A straight turn moves whatever the action says.
            let straight = rec.turn == "straight";
            match (action, straight) {
                (VehicleAction::Spawned, _) => self.spawn(rec, scene)?,
                (VehicleAction::Destroyed, _) => {
                    self.destroy(rec.id, scene)?;
                    // Earlier records of this batch may have animated it.
                    intents.retain(|intent| intent.vehicle() != rec.id);
                }
                (VehicleAction::Moving, _) | (_, true) => {
                    let vehicle = self.existing(rec.id)?;
                    set_stopped(vehicle, false, scene);
                    intents.push(Intent::Move(MotionIntent {
                        id: rec.id,
                        start: Vec3::from_cell(rec.x1, rec.y1),
                        end: Vec3::from_cell(rec.x2, rec.y2),
                    }));
                }
                (VehicleAction::Turning, false) => {
                    let intent = self.turn_intent(rec)?;
                    let vehicle = self.existing(rec.id)?;
                    set_stopped(vehicle, false, scene);
                    intents.push(Intent::Turn(intent));
                }
                (VehicleAction::Stopped, false) => {
                    let vehicle = self.existing(rec.id)?;
                    set_stopped(vehicle, true, scene);
                }
            }
        }
        Ok(intents)
    }

    fn existing(&mut self, id: VehicleId) -> Result<&mut Vehicle, ProtocolViolation> {
        self.vehicles
            .get_mut(&id)
            .ok_or(ProtocolViolation::UnknownVehicle(id))
    }

    fn spawn<S: SceneBackend>(&mut self, rec: &CarStep, scene: &mut S) -> Result<(), ProtocolViolation> {
        if self.vehicles.contains_key(&rec.id) {
            return Err(ProtocolViolation::DuplicateVehicle(rec.id));
        }
        let origin: Direction = rec.origin.parse()?;
        let position = Vec3::from_cell(rec.x1, rec.y1);
        let heading = origin.spawn_heading();
        let handle = scene.create_visual_entity(EntityKind::Vehicle, position, heading);
        debug!(vehicle = %rec.id, %origin, ?position, "Vehicle spawned");
        self.vehicles.insert(
            rec.id,
            Vehicle {
                handle,
                position,
                heading,
                stopped: false,
            },
        );
        Ok(())
    }

    fn destroy<S: SceneBackend>(&mut self, id: VehicleId, scene: &mut S) -> Result<(), ProtocolViolation> {
        let vehicle = self
            .vehicles
            .remove(&id)
            .ok_or(ProtocolViolation::UnknownVehicle(id))?;
        scene.destroy_visual_entity(vehicle.handle);
        debug!(vehicle = %id, "Vehicle destroyed");
        Ok(())
    }

    fn turn_intent(&self, rec: &CarStep) -> Result<TurnIntent, ProtocolViolation> {
        if !self.vehicles.contains_key(&rec.id) {
            return Err(ProtocolViolation::UnknownVehicle(rec.id));
        }
        let origin: Direction = rec.origin.parse()?;
        let geometry = resolve_turn(origin, TurnDirection::from_wire(&rec.turn));
        let pivot_id = geometry.pivot_signal.as_str();
        let pivot = self
            .signals
            .get(pivot_id)
            .map(|s| s.position)
            .ok_or_else(|| ProtocolViolation::UnknownSignal(pivot_id.to_string()))?;
        Ok(TurnIntent {
            id: rec.id,
            sweep_degrees: geometry.sweep_degrees,
            pivot,
        })
    }
}

fn set_stopped<S: SceneBackend>(vehicle: &mut Vehicle, on: bool, scene: &mut S) {
    if vehicle.stopped != on {
        vehicle.stopped = on;
        scene.set_indicator_state(vehicle.handle, on);
    }
}

#[cfg(test)]
mod tests {
    use crossroad_shared::render::LogScene;

    use super::*;

    fn car(id: i64, action: &str) -> CarStep {
        CarStep {
            id: VehicleId(id),
            x1: 0,
            y1: 0,
            x2: 0,
            y2: 0,
            origin: "South".into(),
            action: action.into(),
            turn: String::new(),
        }
    }

    fn light(id: &str, x: i32, y: i32) -> LightInit {
        LightInit {
            id: id.into(),
            state: "red".into(),
            x,
            y,
        }
    }

    fn four_signals(rec: &mut Reconciler, scene: &mut LogScene) {
        rec.apply_light_init(
            &[
                light("North", 5, 9),
                light("East", 9, 5),
                light("South", 4, 0),
                light("West", 0, 4),
            ],
            scene,
        )
        .unwrap();
    }

    #[test]
    fn light_init_places_and_orients_signal() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        rec.apply_light_init(&[light("North", 5, 9)], &mut scene).unwrap();

        let s = rec.signal("North").unwrap();
        assert_eq!(s.state, SignalState::Red);
        assert_eq!(s.position, Vec3::new(5.0, 0.0, 9.0));
        assert_eq!(s.heading, 90.0);
        assert_eq!(scene.signal_color("North"), Some(SignalState::Red));
        assert_eq!(scene.entity(s.handle).unwrap().kind, EntityKind::Signal);
    }

    #[test]
    fn duplicate_signal_is_rejected() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        rec.apply_light_init(&[light("North", 5, 9)], &mut scene).unwrap();
        let err = rec
            .apply_light_init(&[light("North", 1, 1)], &mut scene)
            .unwrap_err();
        assert_eq!(err, ProtocolViolation::DuplicateSignal("North".into()));
    }

    #[test]
    fn light_step_updates_known_and_rejects_unknown() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        four_signals(&mut rec, &mut scene);
        rec.apply_light_step(
            &[LightStep {
                id: "East".into(),
                state: "green".into(),
            }],
            &mut scene,
        )
        .unwrap();
        assert_eq!(rec.signal("East").unwrap().state, SignalState::Green);
        assert_eq!(scene.signal_color("East"), Some(SignalState::Green));

        let err = rec
            .apply_light_step(
                &[LightStep {
                    id: "Up".into(),
                    state: "green".into(),
                }],
                &mut scene,
            )
            .unwrap_err();
        assert_eq!(err, ProtocolViolation::UnknownSignal("Up".into()));
    }

    #[test]
    fn spawn_uses_origin_heading() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        let mut spawn = car(1, "spawned");
        spawn.x1 = 5;
        let intents = rec.apply_vehicle_steps(&[spawn], &mut scene).unwrap();
        assert!(intents.is_empty());

        let v = rec.vehicle(VehicleId(1)).unwrap();
        assert_eq!(v.position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(v.heading, 90.0);
        assert_eq!(scene.entity(v.handle).unwrap().heading, 90.0);
    }

    #[test]
    fn registry_tracks_spawned_minus_destroyed() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        rec.apply_vehicle_steps(&[car(1, "spawned"), car(2, "spawned"), car(3, "spawned")], &mut scene)
            .unwrap();
        rec.apply_vehicle_steps(&[car(2, "destroyed"), car(4, "spawned")], &mut scene)
            .unwrap();
        rec.apply_vehicle_steps(&[car(1, "destroyed")], &mut scene).unwrap();
        assert_eq!(rec.vehicle_ids(), vec![VehicleId(3), VehicleId(4)]);
        // Visual entities follow the registry.
        assert_eq!(scene.entity_count(), 2);
    }

    #[test]
    fn lifecycle_violations() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        rec.apply_vehicle_steps(&[car(1, "spawned")], &mut scene).unwrap();

        assert_eq!(
            rec.apply_vehicle_steps(&[car(1, "spawned")], &mut scene).unwrap_err(),
            ProtocolViolation::DuplicateVehicle(VehicleId(1))
        );
        assert_eq!(
            rec.apply_vehicle_steps(&[car(2, "destroyed")], &mut scene).unwrap_err(),
            ProtocolViolation::UnknownVehicle(VehicleId(2))
        );
        assert_eq!(
            rec.apply_vehicle_steps(&[car(2, "moving")], &mut scene).unwrap_err(),
            ProtocolViolation::UnknownVehicle(VehicleId(2))
        );
        assert!(matches!(
            rec.apply_vehicle_steps(&[car(1, "reversing")], &mut scene).unwrap_err(),
            ProtocolViolation::UnknownAction { .. }
        ));
        let mut bad_origin = car(5, "spawned");
        bad_origin.origin = "Up".into();
        assert_eq!(
            rec.apply_vehicle_steps(&[bad_origin], &mut scene).unwrap_err(),
            ProtocolViolation::UnknownDirection("Up".into())
        );
    }

    #[test]
    fn moving_and_straight_records_move() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        rec.apply_vehicle_steps(&[car(1, "spawned"), car(2, "spawned")], &mut scene)
            .unwrap();
        rec.apply_vehicle_steps(&[car(1, "stopped")], &mut scene).unwrap();
        let handle = rec.vehicle(VehicleId(1)).unwrap().handle;
        assert!(scene.entity(handle).unwrap().indicator);

        let mut moving = car(1, "moving");
        moving.y2 = 1;
        let mut straight = car(2, "turning");
        straight.turn = "straight".into();
        straight.x1 = 3;
        straight.x2 = 4;

        let intents = rec.apply_vehicle_steps(&[moving, straight], &mut scene).unwrap();
        assert_eq!(
            intents,
            vec![
                Intent::Move(MotionIntent {
                    id: VehicleId(1),
                    start: Vec3::ZERO,
                    end: Vec3::new(0.0, 0.0, 1.0),
                }),
                Intent::Move(MotionIntent {
                    id: VehicleId(2),
                    start: Vec3::new(3.0, 0.0, 0.0),
                    end: Vec3::new(4.0, 0.0, 0.0),
                }),
            ]
        );
        assert!(!rec.vehicle(VehicleId(1)).unwrap().stopped);
        assert!(!scene.entity(handle).unwrap().indicator);
    }

    #[test]
    fn right_turn_from_south_pivots_on_west_signal() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        four_signals(&mut rec, &mut scene);
        rec.apply_vehicle_steps(&[car(1, "spawned")], &mut scene).unwrap();

        let mut turning = car(1, "turning");
        turning.turn = "right".into();
        let intents = rec.apply_vehicle_steps(&[turning], &mut scene).unwrap();
        assert_eq!(
            intents,
            vec![Intent::Turn(TurnIntent {
                id: VehicleId(1),
                sweep_degrees: -45.0,
                pivot: Vec3::new(0.0, 0.0, 4.0),
            })]
        );
    }

    #[test]
    fn turn_without_pivot_signal_is_a_desync() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        rec.apply_vehicle_steps(&[car(1, "spawned")], &mut scene).unwrap();
        let mut turning = car(1, "turning");
        turning.turn = "left".into();
        assert_eq!(
            rec.apply_vehicle_steps(&[turning], &mut scene).unwrap_err(),
            ProtocolViolation::UnknownSignal("South".into())
        );
    }

    #[test]
    fn unrecognised_turn_pivots_on_origin_signal() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        four_signals(&mut rec, &mut scene);
        rec.apply_vehicle_steps(&[car(1, "spawned")], &mut scene).unwrap();

        for turn in ["", "u-turn"] {
            let mut turning = car(1, "turning");
            turning.turn = turn.into();
            let intents = rec.apply_vehicle_steps(&[turning], &mut scene).unwrap();
            assert_eq!(
                intents,
                vec![Intent::Turn(TurnIntent {
                    id: VehicleId(1),
                    sweep_degrees: 22.5,
                    pivot: Vec3::new(4.0, 0.0, 0.0),
                })],
                "turn {turn:?}"
            );
        }
    }

    #[test]
    fn destroy_drops_intents_from_the_same_batch() {
        let mut rec = Reconciler::new();
        let mut scene = LogScene::new();
        rec.apply_vehicle_steps(&[car(1, "spawned"), car(2, "spawned")], &mut scene)
            .unwrap();

        let mut moving = car(1, "moving");
        moving.y2 = 1;
        let mut other = car(2, "moving");
        other.y2 = 1;
        let intents = rec
            .apply_vehicle_steps(&[moving, other, car(1, "destroyed")], &mut scene)
            .unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].vehicle(), VehicleId(2));
        assert!(rec.vehicle(VehicleId(1)).is_none());
    }
}
