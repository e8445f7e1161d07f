//! Protocol state machine.
//!
//! Owns the request sequence `board-init` → `lights-init` → `step`..., the
//! active flag that gates animation, and the freshness bookkeeping that keeps
//! a stale response from reviving a deactivated engine.
//!
//! The machine is synchronous. It hands out [`Ticket`]s for requests to send
//! and consumes the completed ticket together with the transport result.

use crossroad_shared::{
    error::{ProtocolViolation, TransportError},
    net::{decode_response, BoardInit, CarStep, ControlOrder, LightInit, LightStep, Payload, RequestKind, Response},
};
use tracing::{debug, error, info, warn};

/// Protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Nothing sent yet.
    Uninitialized,
    /// `board-init` in flight.
    AwaitingBoard,
    /// Board known, `lights-init` in flight. Already active.
    AwaitingLights,
    /// Stepping.
    Active,
    /// Server ordered a stop.
    Paused,
    /// Transport failure, protocol violation or shutdown. Terminal.
    Stopped,
}

/// A request the machine wants sent, tagged with the generation it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub request: RequestKind,
    pub generation: u64,
}

/// Payload the caller must route to the board collaborator or reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Board(BoardInit),
    Lights(Vec<LightInit>),
    Step {
        cars: Vec<CarStep>,
        lights: Vec<LightStep>,
    },
    /// Nothing to route: control order, stale or failed response.
    Nothing,
}

/// Result of consuming a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub routed: Routed,
    /// Follow-up request to send once `routed` has been applied.
    pub next: Option<Ticket>,
}

impl Outcome {
    fn nothing() -> Self {
        Self {
            routed: Routed::Nothing,
            next: None,
        }
    }
}

#[derive(Debug)]
pub struct ProtocolMachine {
    state: ProtocolState,
    generation: u64,
    in_flight: Option<Ticket>,
    step_deferred: bool,
    signals_ready: bool,
}

impl Default for ProtocolMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolMachine {
    pub fn new() -> Self {
        Self {
            state: ProtocolState::Uninitialized,
            generation: 0,
            in_flight: None,
            step_deferred: false,
            signals_ready: false,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Gates all downstream animation and the step cadence.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ProtocolState::AwaitingLights | ProtocolState::Active
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> Option<Ticket> {
        self.in_flight
    }

    pub fn step_deferred(&self) -> bool {
        self.step_deferred
    }

    /// Issues `board-init`. Only valid from `Uninitialized`.
    pub fn start(&mut self) -> Option<Ticket> {
        if self.state != ProtocolState::Uninitialized {
            return None;
        }
        self.state = ProtocolState::AwaitingBoard;
        self.issue(RequestKind::BoardInit)
    }

    /// Called when the step countdown expires. Issues `step` while active;
    /// defers it if another request is still in flight.
    pub fn on_step_boundary(&mut self) -> Option<Ticket> {
        if !self.is_active() {
            return None;
        }
        if self.in_flight.is_some() {
            debug!("Step due while a request is in flight, deferring");
            self.step_deferred = true;
            return None;
        }
        self.issue(RequestKind::Step)
    }

    fn issue(&mut self, request: RequestKind) -> Option<Ticket> {
        if self.in_flight.is_some() {
            return None;
        }
        let ticket = Ticket {
            request,
            generation: self.generation,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    fn deactivate(&mut self, to: ProtocolState) {
        self.state = to;
        self.generation += 1;
        self.step_deferred = false;
    }

    /// Server ordered a stop. Logs only on the active → inactive edge.
    fn pause(&mut self) {
        if self.is_active() {
            info!("Server stopped sending data");
        }
        if self.state != ProtocolState::Stopped {
            self.deactivate(ProtocolState::Paused);
        }
    }

    /// Halts on a protocol violation.
    pub fn halt(&mut self, violation: &ProtocolViolation) {
        if self.state != ProtocolState::Stopped {
            error!(error = %violation, "Protocol violation, halting");
            self.deactivate(ProtocolState::Stopped);
        }
    }

    /// Stops the engine for good.
    pub fn shutdown(&mut self) {
        if self.state != ProtocolState::Stopped {
            info!("Shutting down");
            self.deactivate(ProtocolState::Stopped);
        }
    }

    /// Leaves `Paused` once signals exist. Returns whether it resumed.
    pub fn resume(&mut self) -> bool {
        if self.state != ProtocolState::Paused || !self.signals_ready {
            return false;
        }
        info!("Resuming");
        self.state = ProtocolState::Active;
        true
    }

    /// Consumes the transport result of `ticket`.
    ///
    /// Transport failures are absorbed: the machine stops and the caller gets
    /// an empty outcome. Protocol violations halt the machine and are returned.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<String, TransportError>,
    ) -> Result<Outcome, ProtocolViolation> {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }

        if ticket.generation != self.generation
            || matches!(self.state, ProtocolState::Paused | ProtocolState::Stopped)
        {
            debug!(request = %ticket.request, generation = ticket.generation, "Dropping stale response");
            return Ok(Outcome::nothing());
        }

        let body = match result {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "No communication with the simulation server");
                self.deactivate(ProtocolState::Stopped);
                return Ok(Outcome::nothing());
            }
        };

        let response = match decode_response(ticket.request, &body) {
            Ok(r) => r,
            Err(violation) => {
                self.halt(&violation);
                return Err(violation);
            }
        };

        let mut outcome = match response {
            Response::Control(ControlOrder::Stop) => {
                self.pause();
                return Ok(Outcome::nothing());
            }
            Response::Control(ControlOrder::Wait) => {
                info!(request = %ticket.request, "Server asked to wait");
                Outcome::nothing()
            }
            Response::Payload(Payload::Board(board)) => {
                info!(m = board.m, n = board.n, "Board received");
                self.state = ProtocolState::AwaitingLights;
                Outcome {
                    routed: Routed::Board(board),
                    next: self.issue(RequestKind::LightsInit),
                }
            }
            Response::Payload(Payload::Lights(lights)) => {
                info!(signals = lights.len(), "Signals received");
                self.signals_ready = true;
                if self.state == ProtocolState::AwaitingLights {
                    self.state = ProtocolState::Active;
                }
                Outcome {
                    routed: Routed::Lights(lights),
                    next: None,
                }
            }
            Response::Payload(Payload::Step { cars, lights }) => Outcome {
                routed: Routed::Step { cars, lights },
                next: None,
            },
        };

        if outcome.next.is_none() && self.step_deferred && self.is_active() {
            self.step_deferred = false;
            outcome.next = self.issue(RequestKind::Step);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::*;

    fn ok(body: &str) -> Result<String, TransportError> {
        Ok(body.to_string())
    }

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` with a fmt subscriber writing into a buffer and returns the
    /// formatted output.
    fn logs_of(f: impl FnOnce()) -> String {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || Capture(Arc::clone(&sink)))
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buf.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn booted() -> ProtocolMachine {
        let mut m = ProtocolMachine::new();
        let t = m.start().unwrap();
        let out = m.complete(t, ok(r#"{"m":10,"n":10}"#)).unwrap();
        let lights = out.next.unwrap();
        m.complete(lights, ok(r#"{"Items":[]}"#)).unwrap();
        m
    }

    #[test]
    fn board_init_then_lights_init() {
        let mut m = ProtocolMachine::new();
        assert!(!m.is_active());
        let t = m.start().unwrap();
        assert_eq!(t.request, RequestKind::BoardInit);
        assert_eq!(m.state(), ProtocolState::AwaitingBoard);
        assert!(m.start().is_none());

        let out = m.complete(t, ok(r#"{"m":10,"n":10}"#)).unwrap();
        assert_eq!(out.routed, Routed::Board(BoardInit { m: 10, n: 10 }));
        assert_eq!(out.next.map(|t| t.request), Some(RequestKind::LightsInit));
        // Active is set by board-init, before the signals arrive.
        assert!(m.is_active());
        assert_eq!(m.state(), ProtocolState::AwaitingLights);

        let out = m.complete(out.next.unwrap(), ok(r#"{"Items":[]}"#)).unwrap();
        assert!(matches!(out.routed, Routed::Lights(ref l) if l.is_empty()));
        assert_eq!(m.state(), ProtocolState::Active);
    }

    #[test]
    fn stop_twice_deactivates_once() {
        let mut m = booted();
        let gen = m.generation();
        let t = m.on_step_boundary().unwrap();
        m.complete(t, ok(r#"{"order":"stop"}"#)).unwrap();
        assert_eq!(m.state(), ProtocolState::Paused);
        assert!(!m.is_active());
        assert_eq!(m.generation(), gen + 1);

        // A second stop for the same generation is stale; nothing changes.
        let again = Ticket {
            request: RequestKind::Step,
            generation: m.generation(),
        };
        m.complete(again, ok(r#"{"order": "stop"}"#)).unwrap();
        assert_eq!(m.state(), ProtocolState::Paused);
        assert_eq!(m.generation(), gen + 1);
    }

    #[test]
    fn stop_logs_only_on_the_active_edge() {
        let mut m = booted();
        let logs = logs_of(|| {
            for _ in 0..2 {
                let ticket = m.on_step_boundary().unwrap_or(Ticket {
                    request: RequestKind::Step,
                    generation: m.generation(),
                });
                m.complete(ticket, ok(r#"{"order": "stop"}"#)).unwrap();
            }
        });
        assert_eq!(m.state(), ProtocolState::Paused);
        assert_eq!(logs.matches("Server stopped sending data").count(), 1, "{logs}");

        // Not active yet, so no transition to report.
        let mut fresh = ProtocolMachine::new();
        let logs = logs_of(|| {
            let t = fresh.start().unwrap();
            fresh.complete(t, ok(r#"{"order": "stop"}"#)).unwrap();
        });
        assert_eq!(fresh.state(), ProtocolState::Paused);
        assert!(!logs.contains("Server stopped sending data"), "{logs}");
    }

    #[test]
    fn wait_leaves_state_untouched() {
        let mut m = booted();
        let t = m.on_step_boundary().unwrap();
        let out = m.complete(t, ok(r#"{"order": "wait"}"#)).unwrap();
        assert_eq!(out, Outcome::nothing());
        assert_eq!(m.state(), ProtocolState::Active);
        assert!(m.in_flight().is_none());
    }

    #[test]
    fn transport_error_stops_and_blocks_steps() {
        let mut m = booted();
        let t = m.on_step_boundary().unwrap();
        let out = m
            .complete(t, Err(TransportError::new("step", "connection refused")))
            .unwrap();
        assert_eq!(out, Outcome::nothing());
        assert_eq!(m.state(), ProtocolState::Stopped);
        assert!(m.on_step_boundary().is_none());
        assert!(!m.resume());
    }

    #[test]
    fn stale_response_cannot_reactivate() {
        let mut m = booted();
        let t = m.on_step_boundary().unwrap();
        m.shutdown();
        let out = m.complete(t, ok(r#"{"m":1,"n":1}"#)).unwrap();
        assert_eq!(out, Outcome::nothing());
        assert_eq!(m.state(), ProtocolState::Stopped);
    }

    #[test]
    fn step_due_while_in_flight_is_deferred() {
        let mut m = ProtocolMachine::new();
        let board = m.start().unwrap();
        let lights = m.complete(board, ok(r#"{"m":4,"n":4}"#)).unwrap().next.unwrap();
        // Countdown expires while lights-init is outstanding.
        assert!(m.on_step_boundary().is_none());
        assert!(m.step_deferred());

        let out = m.complete(lights, ok(r#"{"Items":[]}"#)).unwrap();
        assert_eq!(out.next.map(|t| t.request), Some(RequestKind::Step));
        assert!(!m.step_deferred());
    }

    #[test]
    fn malformed_payload_halts() {
        let mut m = booted();
        let t = m.on_step_boundary().unwrap();
        let err = m.complete(t, ok("{}")).unwrap_err();
        assert!(matches!(err, ProtocolViolation::Malformed { .. }));
        assert_eq!(m.state(), ProtocolState::Stopped);
    }

    #[test]
    fn resume_after_server_stop() {
        let mut m = booted();
        let t = m.on_step_boundary().unwrap();
        m.complete(t, ok(r#"{"order": "stop"}"#)).unwrap();
        assert!(m.resume());
        assert!(m.is_active());
        assert_eq!(
            m.on_step_boundary().map(|t| (t.request, t.generation)),
            Some((RequestKind::Step, m.generation()))
        );
    }

    #[test]
    fn stop_before_board_pauses_without_resume() {
        let mut m = ProtocolMachine::new();
        let t = m.start().unwrap();
        m.complete(t, ok(r#"{"order": "stop"}"#)).unwrap();
        assert_eq!(m.state(), ProtocolState::Paused);
        assert!(!m.resume());
    }
}
